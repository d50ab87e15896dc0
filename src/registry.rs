// src/registry.rs - Condition registry and ConditionRefresh
//
// The registry tracks every instantiated condition of one address space so
// ConditionRefresh can replay retained events. Refresh is single-flight:
// the address-space-wide guard rejects a concurrent refresh instead of
// interleaving two walks.

use crate::address_space::AddressSpace;
use crate::alarm::Alarm;
use crate::condition::Condition;
use crate::events::{ConditionEvent, EventData};
use crate::node_id::{well_known, NodeId};
use crate::status::StatusCode;
use crate::variant::{DataValue, LocalizedText, Variant};
use chrono::Utc;
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Clone)]
enum Registered {
    Plain(Condition),
    Alarm(Alarm),
}

impl Registered {
    fn resend_retained(&self) -> usize {
        match self {
            Registered::Plain(condition) => condition.resend_retained(),
            Registered::Alarm(alarm) => alarm.resend_retained(),
        }
    }

    fn source_node(&self) -> NodeId {
        match self {
            Registered::Plain(condition) => condition.source_node(),
            Registered::Alarm(alarm) => alarm.source_node(),
        }
    }
}

/// Registry of all conditions living in one address space.
///
/// Conditions register themselves at instantiation; the registry also
/// binds the standard `ConditionRefresh` method node.
pub struct ConditionRegistry {
    space: Arc<AddressSpace>,
    conditions: RwLock<Vec<Registered>>,
}

impl ConditionRegistry {
    /// New registry over an address space
    pub fn new(space: Arc<AddressSpace>) -> Arc<Self> {
        let registry = Arc::new(Self {
            space: space.clone(),
            conditions: RwLock::new(Vec::new()),
        });
        for (method_id, name) in [
            (well_known::condition_refresh_method(), "ConditionRefresh"),
            (well_known::condition_refresh2_method(), "ConditionRefresh2"),
        ] {
            let bound = space.add_method_node(method_id.clone(), name).and_then(|_| {
                let weak = Arc::downgrade(&registry);
                space.bind_method(&method_id, move |_| match weak.upgrade() {
                    Some(registry) => registry.condition_refresh(),
                    None => StatusCode::BadMethodInvalid,
                })
            });
            if let Err(err) = bound {
                // A second registry over the same space keeps working;
                // only the method nodes already exist.
                warn!("{} method not bound: {}", name, err);
            }
        }
        registry
    }

    /// The underlying address space
    pub fn space(&self) -> &Arc<AddressSpace> {
        &self.space
    }

    /// Number of registered conditions
    pub fn len(&self) -> usize {
        self.conditions.read().len()
    }

    /// True when no condition has been instantiated yet
    pub fn is_empty(&self) -> bool {
        self.conditions.read().is_empty()
    }

    pub(crate) fn register_condition(&self, condition: Condition) {
        self.conditions.write().push(Registered::Plain(condition));
    }

    pub(crate) fn register_alarm(&self, alarm: Alarm) {
        self.conditions.write().push(Registered::Alarm(alarm));
    }

    /// Replay the events of every retained branch, bracketed by
    /// RefreshStart and RefreshEnd events at the Server object.
    ///
    /// Rejects with `BadRefreshInProgress` while another refresh runs.
    /// Replayed events keep their stored payloads and event ids verbatim.
    pub fn condition_refresh(&self) -> StatusCode {
        if !self.space.begin_refresh() {
            return StatusCode::BadRefreshInProgress;
        }
        let server = self.space.server_id();
        self.space.bubble_up_event(
            &server,
            &ConditionEvent::Raised(Arc::new(refresh_marker(
                well_known::refresh_start_event_type(),
                "Condition refresh started",
            ))),
        );
        self.space
            .bubble_up_event(&server, &ConditionEvent::RefreshStarted);

        let conditions: Vec<Registered> = self.conditions.read().clone();
        let mut resent = 0;
        for condition in &conditions {
            resent += condition.resend_retained();
        }

        self.space
            .bubble_up_event(&server, &ConditionEvent::RefreshEnded);
        self.space.bubble_up_event(
            &server,
            &ConditionEvent::Raised(Arc::new(refresh_marker(
                well_known::refresh_end_event_type(),
                "Condition refresh ended",
            ))),
        );
        self.space.end_refresh();
        info!("condition refresh replayed {} retained events", resent);
        StatusCode::Good
    }

    /// ConditionRefresh2. The per-monitored-item delivery distinction is a
    /// session concern outside this collaborator; the replay walk is the
    /// same one as [`condition_refresh`](Self::condition_refresh).
    pub fn condition_refresh2(&self) -> StatusCode {
        self.condition_refresh()
    }

    /// Node ids of all conditions attached to `source`
    pub fn conditions_of(&self, source: &NodeId) -> usize {
        self.conditions
            .read()
            .iter()
            .filter(|c| &c.source_node() == source)
            .count()
    }
}

/// Minimal RefreshStart/RefreshEnd event payload raised at the Server
fn refresh_marker(event_type: NodeId, message: &str) -> EventData {
    let mut data = EventData::new();
    data.insert(
        "EventId",
        DataValue::good(Variant::ByteString(Uuid::new_v4().as_bytes().to_vec())),
    );
    data.insert("EventType", DataValue::good(Variant::NodeId(event_type)));
    data.insert(
        "SourceNode",
        DataValue::good(Variant::NodeId(well_known::server())),
    );
    data.insert(
        "SourceName",
        DataValue::good(Variant::String("Server".to_string())),
    );
    data.insert("Time", DataValue::good(Variant::DateTime(Utc::now())));
    data.insert(
        "Message",
        DataValue::good(Variant::LocalizedText(LocalizedText::english(message))),
    );
    data.insert("Severity", DataValue::good(Variant::Int(0)));
    data
}
