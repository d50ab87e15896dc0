// src/address_space.rs - Minimal in-memory address-space collaborator
//
// The condition layer consumes a small surface of an address space: node
// lookup, typed references, variable read/write with synchronous
// value-change notification, method binding, and event bubbling up the
// notifier hierarchy. This module provides an in-memory implementation of
// exactly that surface; it is a host for conditions, not a full server.

use crate::error::{ConditionError, Result};
use crate::events::ConditionEvent;
use crate::node_id::{well_known, NodeId};
use crate::status::StatusCode;
use crate::variant::{DataValue, Variant, VariantKind};
use dashmap::DashMap;
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::trace;

/// Node class of an address-space node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeClass {
    /// Object node
    Object,
    /// Variable node
    Variable,
    /// Method node
    Method,
}

/// Typed reference kinds used by the condition layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReferenceKind {
    /// Structural component relationship
    HasComponent,
    /// Property relationship
    HasProperty,
    /// Source object to its condition instance
    HasCondition,
    /// Notifier hierarchy edge (Server downwards)
    HasNotifier,
    /// Event source edge
    HasEventSource,
}

#[derive(Debug, Clone)]
struct NodeInfo {
    browse_name: String,
    class: NodeClass,
    data_type: VariantKind,
    value: DataValue,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Reference {
    source: NodeId,
    kind: ReferenceKind,
    target: NodeId,
}

type ValueSubscriber = Arc<dyn Fn(&DataValue) + Send + Sync>;
type EventSubscriber = Arc<dyn Fn(&ConditionEvent) + Send + Sync>;
type MethodHandler = Box<dyn Fn(&[Variant]) -> StatusCode + Send + Sync>;

/// Token returned by [`AddressSpace::subscribe_value`], used to drop the
/// subscription again on dispose
pub type SubscriptionId = usize;

/// In-memory address space.
///
/// Thread-safe; all notification dispatch is synchronous and in
/// subscription order, on the thread performing the triggering write.
pub struct AddressSpace {
    nodes: DashMap<NodeId, NodeInfo>,
    references: RwLock<Vec<Reference>>,
    value_subscribers: RwLock<HashMap<NodeId, Vec<(SubscriptionId, ValueSubscriber)>>>,
    event_subscribers: RwLock<HashMap<NodeId, Vec<EventSubscriber>>>,
    methods: RwLock<HashMap<NodeId, MethodHandler>>,
    next_subscription: AtomicUsize,
    refresh_in_progress: AtomicBool,
}

impl AddressSpace {
    /// New address space containing only the Server object
    pub fn new() -> Arc<Self> {
        let space = Arc::new(Self {
            nodes: DashMap::new(),
            references: RwLock::new(Vec::new()),
            value_subscribers: RwLock::new(HashMap::new()),
            event_subscribers: RwLock::new(HashMap::new()),
            methods: RwLock::new(HashMap::new()),
            next_subscription: AtomicUsize::new(1),
            refresh_in_progress: AtomicBool::new(false),
        });
        space
            .add_object(well_known::server(), "Server")
            .expect("empty space accepts the Server object");
        space
    }

    /// NodeId of the Server object, root of the notifier hierarchy
    pub fn server_id(&self) -> NodeId {
        well_known::server()
    }

    fn insert_node(&self, node_id: NodeId, info: NodeInfo) -> Result<()> {
        if self.nodes.contains_key(&node_id) {
            return Err(ConditionError::Config(format!(
                "node {} already exists",
                node_id
            )));
        }
        self.nodes.insert(node_id, info);
        Ok(())
    }

    /// Add an object node
    pub fn add_object(&self, node_id: NodeId, browse_name: impl Into<String>) -> Result<()> {
        self.insert_node(
            node_id,
            NodeInfo {
                browse_name: browse_name.into(),
                class: NodeClass::Object,
                data_type: VariantKind::Any,
                value: DataValue::good(Variant::Null),
            },
        )
    }

    /// Add a variable node with an initial value
    pub fn add_variable(
        &self,
        node_id: NodeId,
        browse_name: impl Into<String>,
        data_type: VariantKind,
        initial: Variant,
    ) -> Result<()> {
        self.insert_node(
            node_id,
            NodeInfo {
                browse_name: browse_name.into(),
                class: NodeClass::Variable,
                data_type,
                value: DataValue::good(initial),
            },
        )
    }

    /// Add a method node
    pub fn add_method_node(
        &self,
        node_id: NodeId,
        browse_name: impl Into<String>,
    ) -> Result<()> {
        self.insert_node(
            node_id,
            NodeInfo {
                browse_name: browse_name.into(),
                class: NodeClass::Method,
                data_type: VariantKind::Any,
                value: DataValue::good(Variant::Null),
            },
        )
    }

    /// True if the node exists
    pub fn contains(&self, node_id: &NodeId) -> bool {
        self.nodes.contains_key(node_id)
    }

    /// Browse name of a node
    pub fn browse_name(&self, node_id: &NodeId) -> Option<String> {
        self.nodes.get(node_id).map(|n| n.browse_name.clone())
    }

    /// Node class of a node
    pub fn node_class(&self, node_id: &NodeId) -> Option<NodeClass> {
        self.nodes.get(node_id).map(|n| n.class)
    }

    /// Declared basic data type of a variable node
    pub fn data_type(&self, node_id: &NodeId) -> Option<VariantKind> {
        self.nodes.get(node_id).map(|n| n.data_type)
    }

    // ------------------------------------------------------------------
    // References
    // ------------------------------------------------------------------

    /// Add a typed reference between two existing nodes
    pub fn add_reference(
        &self,
        source: &NodeId,
        kind: ReferenceKind,
        target: &NodeId,
    ) -> Result<()> {
        if !self.contains(source) {
            return Err(ConditionError::NodeNotFound(source.to_string()));
        }
        if !self.contains(target) {
            return Err(ConditionError::NodeNotFound(target.to_string()));
        }
        let reference = Reference {
            source: source.clone(),
            kind,
            target: target.clone(),
        };
        let mut refs = self.references.write();
        if !refs.contains(&reference) {
            refs.push(reference);
        }
        Ok(())
    }

    /// Forward browse: targets of `kind` references leaving `source`
    pub fn targets_of(&self, source: &NodeId, kind: ReferenceKind) -> Vec<NodeId> {
        self.references
            .read()
            .iter()
            .filter(|r| r.kind == kind && &r.source == source)
            .map(|r| r.target.clone())
            .collect()
    }

    /// Inverse browse: sources of `kind` references arriving at `target`
    pub fn sources_of(&self, kind: ReferenceKind, target: &NodeId) -> Vec<NodeId> {
        self.references
            .read()
            .iter()
            .filter(|r| r.kind == kind && &r.target == target)
            .map(|r| r.source.clone())
            .collect()
    }

    /// Register `node` under `parent` in the notifier hierarchy so that
    /// events raised at `node` bubble up to `parent` (and onwards to the
    /// Server object).
    pub fn register_event_source(&self, parent: &NodeId, node: &NodeId) -> Result<()> {
        self.add_reference(parent, ReferenceKind::HasNotifier, node)?;
        self.add_reference(parent, ReferenceKind::HasEventSource, node)
    }

    /// True if `node` is reachable from the Server object through the
    /// notifier hierarchy
    pub fn is_event_source(&self, node: &NodeId) -> bool {
        let server = self.server_id();
        if node == &server {
            return true;
        }
        let mut visited = HashSet::new();
        let mut queue = VecDeque::from([server]);
        while let Some(current) = queue.pop_front() {
            if !visited.insert(current.clone()) {
                continue;
            }
            for kind in [ReferenceKind::HasNotifier, ReferenceKind::HasEventSource] {
                for target in self.targets_of(&current, kind) {
                    if &target == node {
                        return true;
                    }
                    queue.push_back(target);
                }
            }
        }
        false
    }

    // ------------------------------------------------------------------
    // Variable values
    // ------------------------------------------------------------------

    /// Read a variable's current value
    pub fn read_value(&self, node_id: &NodeId) -> Result<DataValue> {
        self.nodes
            .get(node_id)
            .map(|n| n.value.clone())
            .ok_or_else(|| ConditionError::NodeNotFound(node_id.to_string()))
    }

    /// Write a good-quality value from the source and notify subscribers
    pub fn set_value_from_source(&self, node_id: &NodeId, value: Variant) -> Result<()> {
        self.set_data_value(node_id, DataValue::good(value))
    }

    /// Write a full data value (value, status, timestamp) and notify
    /// subscribers synchronously, in subscription order
    pub fn set_data_value(&self, node_id: &NodeId, value: DataValue) -> Result<()> {
        {
            let mut node = self
                .nodes
                .get_mut(node_id)
                .ok_or_else(|| ConditionError::NodeNotFound(node_id.to_string()))?;
            trace!("set {} = {:?}", node_id, value.value);
            node.value = value.clone();
        }
        let listeners: Vec<ValueSubscriber> = self
            .value_subscribers
            .read()
            .get(node_id)
            .map(|subs| subs.iter().map(|(_, cb)| cb.clone()).collect())
            .unwrap_or_default();
        for listener in listeners {
            listener(&value);
        }
        Ok(())
    }

    /// Subscribe to value changes of a variable. The callback runs
    /// synchronously on the writing thread.
    pub fn subscribe_value(
        &self,
        node_id: &NodeId,
        callback: impl Fn(&DataValue) + Send + Sync + 'static,
    ) -> SubscriptionId {
        let token = self.next_subscription.fetch_add(1, Ordering::Relaxed);
        self.value_subscribers
            .write()
            .entry(node_id.clone())
            .or_default()
            .push((token, Arc::new(callback)));
        token
    }

    /// Drop a value-change subscription
    pub fn unsubscribe_value(&self, node_id: &NodeId, token: SubscriptionId) {
        if let Some(subs) = self.value_subscribers.write().get_mut(node_id) {
            subs.retain(|(t, _)| *t != token);
        }
    }

    // ------------------------------------------------------------------
    // Methods
    // ------------------------------------------------------------------

    /// Bind a handler to a method node
    pub fn bind_method(
        &self,
        node_id: &NodeId,
        handler: impl Fn(&[Variant]) -> StatusCode + Send + Sync + 'static,
    ) -> Result<()> {
        if self.node_class(node_id) != Some(NodeClass::Method) {
            return Err(ConditionError::NodeNotFound(node_id.to_string()));
        }
        self.methods
            .write()
            .insert(node_id.clone(), Box::new(handler));
        Ok(())
    }

    /// Invoke a bound method. Errors are encoded as status codes; unknown
    /// methods yield `BadMethodInvalid`.
    pub fn call_method(&self, node_id: &NodeId, args: &[Variant]) -> StatusCode {
        let methods = self.methods.read();
        match methods.get(node_id) {
            Some(handler) => handler(args),
            None => StatusCode::BadMethodInvalid,
        }
    }

    // ------------------------------------------------------------------
    // Event bubbling
    // ------------------------------------------------------------------

    /// Register an event listener on a node; it receives every event
    /// bubbling through that node
    pub fn subscribe_node_events(
        &self,
        node_id: &NodeId,
        callback: impl Fn(&ConditionEvent) + Send + Sync + 'static,
    ) {
        self.event_subscribers
            .write()
            .entry(node_id.clone())
            .or_default()
            .push(Arc::new(callback));
    }

    /// Deliver an event at `source` and walk it up the notifier hierarchy
    /// to the Server object, invoking listeners at every hop
    pub fn bubble_up_event(&self, source: &NodeId, event: &ConditionEvent) {
        let mut visited = HashSet::new();
        let mut queue = VecDeque::from([source.clone()]);
        while let Some(current) = queue.pop_front() {
            if !visited.insert(current.clone()) {
                continue;
            }
            let listeners: Vec<EventSubscriber> = self
                .event_subscribers
                .read()
                .get(&current)
                .map(|subs| subs.to_vec())
                .unwrap_or_default();
            for listener in listeners {
                listener(event);
            }
            for kind in [ReferenceKind::HasNotifier, ReferenceKind::HasEventSource] {
                for parent in self.sources_of(kind, &current) {
                    queue.push_back(parent);
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Refresh guard
    // ------------------------------------------------------------------

    /// Single-flight guard for ConditionRefresh. Returns false if another
    /// refresh is already in progress.
    pub fn begin_refresh(&self) -> bool {
        self.refresh_in_progress
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Release the refresh guard
    pub fn end_refresh(&self) {
        self.refresh_in_progress.store(false, Ordering::Release);
    }
}

impl std::fmt::Debug for AddressSpace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AddressSpace")
            .field("nodes", &self.nodes.len())
            .field("references", &self.references.read().len())
            .finish()
    }
}
