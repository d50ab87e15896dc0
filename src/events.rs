// src/events.rs - Typed condition events and the synchronous event hub
//
// All pub/sub in the condition layer goes through an explicit typed event
// enum rather than an ambient emitter. Dispatch ordering is part of the
// contract: all listeners are invoked synchronously, in subscription order,
// before the triggering call returns. The branch-0 mirror relies on this.

use crate::node_id::NodeId;
use crate::status::StatusCode;
use crate::variant::{DataValue, LocalizedText};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Snapshot of all condition fields at the moment an event was raised,
/// keyed by browse path ("Severity", "ActiveState.Id", ...).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventData {
    fields: BTreeMap<String, DataValue>,
}

impl EventData {
    /// Empty payload
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a field by browse path
    pub fn insert(&mut self, path: impl Into<String>, value: DataValue) {
        self.fields.insert(path.into(), value);
    }

    /// Look up a field by browse path
    pub fn get(&self, path: &str) -> Option<&DataValue> {
        self.fields.get(path)
    }

    /// Iterate fields in path order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &DataValue)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of fields
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// True when no fields are present
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Administrative actions recorded through audit events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    /// Condition enabled
    Enable,
    /// Condition disabled
    Disable,
    /// Comment added to a branch
    AddComment,
    /// Branch acknowledged
    Acknowledge,
    /// Branch confirmed
    Confirm,
    /// Alarm shelved for a fixed duration
    TimedShelve,
    /// Alarm shelved until manually unshelved or the maximum elapses
    OneShotShelve,
    /// Alarm unshelved
    Unshelve,
}

/// Audit record emitted on successful administrative operations.
///
/// Rejected operations (an already-acknowledged branch, for example) emit
/// no audit event.
#[derive(Debug, Clone, PartialEq)]
pub struct AuditConditionEvent {
    /// What was done
    pub action: AuditAction,
    /// The condition node
    pub condition: NodeId,
    /// Event id of the affected branch, if any
    pub event_id: Vec<u8>,
    /// Comment supplied with the operation
    pub comment: Option<LocalizedText>,
    /// User that performed the operation
    pub client_user_id: String,
    /// Outcome of the operation
    pub status: StatusCode,
    /// When the operation happened
    pub time: DateTime<Utc>,
}

/// Events produced by the condition layer
#[derive(Debug, Clone)]
pub enum ConditionEvent {
    /// A condition event was raised (the constructed payload snapshot)
    Raised(Arc<EventData>),
    /// A branch was acknowledged
    Acknowledged {
        /// The condition node
        condition: NodeId,
        /// Branch id of the acknowledged snapshot (null for branch 0)
        branch: NodeId,
        /// Event id the acknowledge addressed
        event_id: Vec<u8>,
    },
    /// A branch was confirmed
    Confirmed {
        /// The condition node
        condition: NodeId,
        /// Branch id of the confirmed snapshot
        branch: NodeId,
        /// Event id the confirm addressed
        event_id: Vec<u8>,
    },
    /// A comment was attached to a branch
    CommentAdded {
        /// The condition node
        condition: NodeId,
        /// Branch id of the commented snapshot
        branch: NodeId,
        /// The comment
        comment: LocalizedText,
    },
    /// A no-longer-retained branch was dropped
    BranchDeleted {
        /// The condition node
        condition: NodeId,
        /// Branch id of the deleted snapshot
        branch: NodeId,
    },
    /// Administrative audit record
    Audit(AuditConditionEvent),
    /// ConditionRefresh started (marker event)
    RefreshStarted,
    /// ConditionRefresh finished (marker event)
    RefreshEnded,
}

type Subscriber = Arc<dyn Fn(&ConditionEvent) + Send + Sync>;

/// Synchronous publish/subscribe hub for condition events.
///
/// Listeners run on the emitting thread, in subscription order, before
/// `emit` returns. Listeners must not call back into the condition that is
/// emitting; the condition's interior lock is typically still held.
#[derive(Clone, Default)]
pub struct EventHub {
    subscribers: Arc<RwLock<Vec<Subscriber>>>,
}

impl EventHub {
    /// New hub with no subscribers
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener; it stays subscribed for the hub's lifetime
    pub fn subscribe(&self, listener: impl Fn(&ConditionEvent) + Send + Sync + 'static) {
        self.subscribers.write().push(Arc::new(listener));
    }

    /// Deliver an event to every listener, in subscription order
    pub fn emit(&self, event: &ConditionEvent) {
        // Snapshot the list so listeners may subscribe re-entrantly.
        let listeners: Vec<Subscriber> = self.subscribers.read().clone();
        for listener in listeners {
            listener(event);
        }
    }

    /// Number of registered listeners
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }
}

impl std::fmt::Debug for EventHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventHub")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::variant::Variant;
    use parking_lot::Mutex;

    #[test]
    fn test_emit_in_subscription_order() {
        let hub = EventHub::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        for tag in 0..4 {
            let order = order.clone();
            hub.subscribe(move |_| order.lock().push(tag));
        }

        hub.emit(&ConditionEvent::RefreshStarted);
        assert_eq!(*order.lock(), vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_emit_is_synchronous() {
        let hub = EventHub::new();
        let seen = Arc::new(Mutex::new(0));
        let seen2 = seen.clone();
        hub.subscribe(move |_| *seen2.lock() += 1);

        hub.emit(&ConditionEvent::RefreshEnded);
        // Listener already ran when emit returned.
        assert_eq!(*seen.lock(), 1);
    }

    #[test]
    fn test_event_data_lookup() {
        let mut data = EventData::new();
        data.insert("Severity", DataValue::good(Variant::Int(150)));
        data.insert("ActiveState.Id", DataValue::good(Variant::Bool(true)));

        assert_eq!(data.len(), 2);
        assert_eq!(
            data.get("Severity").unwrap().value,
            Variant::Int(150)
        );
        assert!(data.get("Message").is_none());
    }
}
