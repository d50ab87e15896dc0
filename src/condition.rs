// src/condition.rs - Root condition state machine
//
// ConditionCore carries the state shared by every condition type:
// enable/disable, branch bookkeeping, comment handling, and condition
// event raising. Alarm-specific behavior is layered on top by composition
// (src/alarm.rs), not by subclassing.

use crate::address_space::{AddressSpace, ReferenceKind};
use crate::events::{AuditAction, AuditConditionEvent, ConditionEvent, EventHub};
use crate::fields::{ConditionField, TwoState};
use crate::node_id::NodeId;
use crate::snapshot::ConditionSnapshot;
use crate::status::StatusCode;
use crate::variant::{DataValue, LocalizedText, Variant};
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Identifies one branch of a condition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BranchKey {
    /// Branch 0, the live mirrored snapshot
    Current,
    /// A retained secondary branch, keyed by its stringified node id
    Secondary(String),
}

/// The (message, severity, quality) triple describing a condition's state
/// after a transition, plus the retain flag the transition implies.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConditionInfo {
    /// New event message
    pub message: Option<LocalizedText>,
    /// New severity
    pub severity: Option<u16>,
    /// New quality
    pub quality: Option<StatusCode>,
    /// New retain flag
    pub retain: Option<bool>,
}

impl ConditionInfo {
    /// True when message, severity, and quality all match. Retain is a
    /// bookkeeping flag and does not participate in the comparison.
    pub fn same_state_as(&self, other: &ConditionInfo) -> bool {
        self.message == other.message
            && self.severity == other.severity
            && self.quality == other.quality
    }

    /// Apply the triple onto a snapshot
    pub fn apply_to(&self, snapshot: &mut ConditionSnapshot) {
        if let Some(message) = &self.message {
            snapshot.set_message(message.clone());
        }
        if let Some(severity) = self.severity {
            snapshot.set_severity(severity);
        }
        if let Some(quality) = self.quality {
            snapshot.set_quality(quality);
        }
        if let Some(retain) = self.retain {
            snapshot.set_retain(retain);
        }
    }
}

/// State shared by every condition type.
pub struct ConditionCore {
    pub(crate) space: Arc<AddressSpace>,
    pub(crate) node_id: NodeId,
    pub(crate) condition_name: String,
    pub(crate) current: ConditionSnapshot,
    pub(crate) branches: HashMap<String, ConditionSnapshot>,
    pub(crate) pre_disable_retain: Option<bool>,
    pub(crate) hub: EventHub,
}

impl ConditionCore {
    /// Whether EnabledState is currently true
    pub fn enabled(&self) -> bool {
        self.current.state_id(TwoState::Enabled)
    }

    /// The condition's node id
    pub fn node_id(&self) -> &NodeId {
        &self.node_id
    }

    /// Condition instance name
    pub fn condition_name(&self) -> &str {
        &self.condition_name
    }

    // ------------------------------------------------------------------
    // Enable / Disable
    // ------------------------------------------------------------------

    /// Disable the condition: remember the retain flag, force retain off,
    /// and raise one (masked) condition event so clients observe the
    /// transition.
    pub fn disable(&mut self, client_user_id: &str) -> StatusCode {
        if !self.enabled() {
            return StatusCode::BadConditionAlreadyDisabled;
        }
        self.pre_disable_retain = Some(self.current.retain());
        self.current.set_retain(false);
        self.current.set_state(TwoState::Enabled, false);
        info!("condition {} disabled", self.condition_name);
        self.raise_condition_event(&BranchKey::Current, true);
        self.audit(AuditAction::Disable, None, client_user_id);
        StatusCode::Good
    }

    /// First half of Enable: flip EnabledState back on. The caller runs
    /// its re-evaluation hook between this and [`finish_enable`].
    pub fn begin_enable(&mut self, client_user_id: &str) -> StatusCode {
        if self.enabled() {
            return StatusCode::BadConditionAlreadyEnabled;
        }
        self.current.set_state(TwoState::Enabled, true);
        info!("condition {} enabled", self.condition_name);
        self.audit(AuditAction::Enable, None, client_user_id);
        StatusCode::Good
    }

    /// Second half of Enable: restore the pre-disable retain flag and
    /// resend retained branch events (or raise one enablement event when
    /// nothing is retained).
    pub fn finish_enable(&mut self) {
        if let Some(saved) = self.pre_disable_retain.take() {
            self.current.set_retain(saved);
        }
        let resent = self.resend_retained_events(true);
        if resent == 0 {
            self.raise_condition_event(&BranchKey::Current, true);
        }
    }

    // ------------------------------------------------------------------
    // Branches
    // ------------------------------------------------------------------

    /// Fork the current branch under a fresh pseudo-random node id
    pub fn create_branch(&mut self) -> NodeId {
        let branch_id = NodeId::new_guid(1);
        let branch = self.current.fork(branch_id.clone());
        debug!(
            "condition {} created branch {}",
            self.condition_name, branch_id
        );
        self.branches.insert(branch_id.to_string(), branch);
        branch_id
    }

    /// Drop a secondary branch and announce its deletion
    pub fn delete_branch(&mut self, branch_id: &NodeId) {
        assert!(!branch_id.is_null(), "branch 0 cannot be deleted");
        if self.branches.remove(&branch_id.to_string()).is_some() {
            debug!(
                "condition {} deleted branch {}",
                self.condition_name, branch_id
            );
            self.hub.emit(&ConditionEvent::BranchDeleted {
                condition: self.node_id.clone(),
                branch: branch_id.clone(),
            });
        }
    }

    /// Number of retained secondary branches
    pub fn branch_count(&self) -> usize {
        self.branches.len()
    }

    /// Shared access to a branch
    pub fn branch(&self, key: &BranchKey) -> &ConditionSnapshot {
        match key {
            BranchKey::Current => &self.current,
            BranchKey::Secondary(id) => &self.branches[id],
        }
    }

    /// Mutable access to a branch
    pub fn branch_mut(&mut self, key: &BranchKey) -> &mut ConditionSnapshot {
        match key {
            BranchKey::Current => &mut self.current,
            BranchKey::Secondary(id) => self.branches.get_mut(id).expect("branch exists"),
        }
    }

    /// Resolve the branch whose stored EventId is byte-identical to the
    /// supplied one
    pub fn find_branch_by_event_id(&self, event_id: &[u8]) -> Option<BranchKey> {
        if self.current.event_id().as_deref() == Some(event_id) {
            return Some(BranchKey::Current);
        }
        self.branches
            .iter()
            .find(|(_, branch)| branch.event_id().as_deref() == Some(event_id))
            .map(|(id, _)| BranchKey::Secondary(id.clone()))
    }

    // ------------------------------------------------------------------
    // Comments
    // ------------------------------------------------------------------

    /// Attach a comment to the branch matching `event_id` and raise the
    /// corresponding audit and condition events
    pub fn add_comment(
        &mut self,
        event_id: &[u8],
        comment: LocalizedText,
        client_user_id: &str,
    ) -> StatusCode {
        if !self.enabled() {
            return StatusCode::BadConditionDisabled;
        }
        let Some(key) = self.find_branch_by_event_id(event_id) else {
            return StatusCode::BadEventIdUnknown;
        };
        {
            let snapshot = self.branch_mut(&key);
            snapshot.set_comment(comment.clone());
            if snapshot.has_field(ConditionField::ClientUserId) {
                snapshot.set_value(
                    ConditionField::ClientUserId,
                    Variant::String(client_user_id.to_string()),
                );
            }
        }
        self.audit_with_comment(
            AuditAction::AddComment,
            Some(event_id.to_vec()),
            Some(comment.clone()),
            client_user_id,
        );
        self.raise_condition_event(&key, true);
        self.hub.emit(&ConditionEvent::CommentAdded {
            condition: self.node_id.clone(),
            branch: self.branch(&key).branch_id().clone(),
            comment,
        });
        StatusCode::Good
    }

    // ------------------------------------------------------------------
    // Event raising
    // ------------------------------------------------------------------

    /// Raise the branch's condition event, optionally minting a fresh
    /// event id and time first, and bubble it up from the owning node.
    pub fn raise_condition_event(&mut self, key: &BranchKey, renew_event_id: bool) {
        let enabled = self.enabled();
        {
            let snapshot = self.branch_mut(key);
            if renew_event_id {
                snapshot.stamp_time();
                snapshot.renew_event_id();
            }
        }
        let snapshot = self.branch(key);
        Self::assert_core_fields(snapshot);
        let payload = Arc::new(snapshot.construct_event_data(enabled));
        let owner = self.owner_node();
        let event = ConditionEvent::Raised(payload);
        self.space.bubble_up_event(&owner, &event);
        self.hub.emit(&event);
    }

    /// Raise the branch's event, then drop the branch if it is a
    /// no-longer-retained secondary branch. Branches exist only as long as
    /// they are interesting.
    pub fn raise_new_branch_state(&mut self, key: &BranchKey) {
        self.raise_condition_event(key, false);
        if let BranchKey::Secondary(id) = key {
            if !self.branches[id].retain() {
                let branch_id: NodeId = id.parse().expect("branch keys are stringified node ids");
                self.delete_branch(&branch_id);
            }
        }
    }

    /// Re-raise the events of every retained branch. Returns how many
    /// events were raised.
    pub fn resend_retained_events(&mut self, renew_current_event_id: bool) -> usize {
        let mut raised = 0;
        if self.current.retain() {
            self.raise_condition_event(&BranchKey::Current, renew_current_event_id);
            raised += 1;
        }
        let keys: Vec<String> = self
            .branches
            .iter()
            .filter(|(_, branch)| branch.retain())
            .map(|(id, _)| id.clone())
            .collect();
        for id in keys {
            // Secondary branches keep their event id; they represent past
            // states the client may still be holding on to.
            self.raise_condition_event(&BranchKey::Secondary(id), false);
            raised += 1;
        }
        raised
    }

    /// The seven core fields every raised event must carry, with their
    /// expected data types. A miss here is a construction defect.
    fn assert_core_fields(snapshot: &ConditionSnapshot) {
        let checks: [(ConditionField, fn(&Variant) -> bool); 7] = [
            (ConditionField::EventId, |v| {
                matches!(v, Variant::ByteString(b) if !b.is_empty())
            }),
            (ConditionField::EventType, |v| {
                matches!(v, Variant::NodeId(_))
            }),
            (ConditionField::SourceNode, |v| {
                matches!(v, Variant::NodeId(_))
            }),
            (ConditionField::SourceName, |v| {
                matches!(v, Variant::String(_))
            }),
            (ConditionField::Time, |v| matches!(v, Variant::DateTime(_))),
            (ConditionField::Message, |v| {
                matches!(v, Variant::LocalizedText(_))
            }),
            (ConditionField::Severity, |v| matches!(v, Variant::Int(_))),
        ];
        for (field, check) in checks {
            let value = snapshot
                .value(field)
                .unwrap_or_else(|| panic!("event is missing {}", field.browse_path()));
            assert!(
                check(value),
                "event field {} has wrong data type: {:?}",
                field.browse_path(),
                value
            );
        }
    }

    /// The node this condition is a condition *of*, found through the
    /// inverse HasCondition reference. Exactly one owner is a structural
    /// requirement.
    pub fn owner_node(&self) -> NodeId {
        let owners = self
            .space
            .sources_of(ReferenceKind::HasCondition, &self.node_id);
        assert!(
            owners.len() == 1,
            "condition {} must have exactly one HasCondition owner, found {}",
            self.node_id,
            owners.len()
        );
        owners.into_iter().next().expect("one owner")
    }

    // ------------------------------------------------------------------
    // Audit events
    // ------------------------------------------------------------------

    pub(crate) fn audit(
        &self,
        action: AuditAction,
        event_id: Option<Vec<u8>>,
        client_user_id: &str,
    ) {
        self.audit_with_comment(action, event_id, None, client_user_id);
    }

    pub(crate) fn audit_with_comment(
        &self,
        action: AuditAction,
        event_id: Option<Vec<u8>>,
        comment: Option<LocalizedText>,
        client_user_id: &str,
    ) {
        let audit = ConditionEvent::Audit(AuditConditionEvent {
            action,
            condition: self.node_id.clone(),
            event_id: event_id.unwrap_or_default(),
            comment,
            client_user_id: client_user_id.to_string(),
            status: StatusCode::Good,
            time: Utc::now(),
        });
        self.space.bubble_up_event(&self.owner_node(), &audit);
        self.hub.emit(&audit);
    }

    /// Read one field of the current branch with disabled masking applied
    pub fn read_field(&self, field: ConditionField) -> DataValue {
        self.current.read_field(field, self.enabled())
    }
}

impl std::fmt::Debug for ConditionCore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConditionCore")
            .field("node_id", &self.node_id)
            .field("name", &self.condition_name)
            .field("branches", &self.branches.len())
            .finish()
    }
}

pub(crate) struct ConditionInner {
    pub(crate) core: ConditionCore,
    pub(crate) acknowledgeable: bool,
}

/// A plain condition instance (ConditionType or
/// AcknowledgeableConditionType), instantiated through
/// [`crate::builder::ConditionOptions`].
///
/// Cheaply cloneable handle; all state lives behind one lock.
#[derive(Clone)]
pub struct Condition {
    pub(crate) inner: Arc<Mutex<ConditionInner>>,
}

impl Condition {
    /// The condition's node id
    pub fn node_id(&self) -> NodeId {
        self.inner.lock().core.node_id.clone()
    }

    /// Whether EnabledState is currently true
    pub fn enabled(&self) -> bool {
        self.inner.lock().core.enabled()
    }

    /// Current retain flag of branch 0
    pub fn retain(&self) -> bool {
        self.inner.lock().core.current.retain()
    }

    /// Event id of the current branch
    pub fn current_event_id(&self) -> Option<Vec<u8>> {
        self.inner.lock().core.current.event_id()
    }

    /// Number of retained secondary branches
    pub fn branch_count(&self) -> usize {
        self.inner.lock().core.branch_count()
    }

    /// Enable the condition
    pub fn enable(&self) -> StatusCode {
        self.enable_by("")
    }

    /// Enable the condition on behalf of a user
    pub fn enable_by(&self, client_user_id: &str) -> StatusCode {
        let mut inner = self.inner.lock();
        let status = inner.core.begin_enable(client_user_id);
        if status.is_good() {
            inner.core.finish_enable();
        }
        status
    }

    /// Disable the condition
    pub fn disable(&self) -> StatusCode {
        self.inner.lock().core.disable("")
    }

    /// Attach a comment to the branch matching `event_id`
    pub fn add_comment(&self, event_id: &[u8], comment: &str, client_user_id: &str) -> StatusCode {
        self.inner
            .lock()
            .core
            .add_comment(event_id, LocalizedText::english(comment), client_user_id)
    }

    /// Acknowledge the branch matching `event_id`
    pub fn acknowledge(&self, event_id: &[u8], comment: &str, client_user_id: &str) -> StatusCode {
        let mut inner = self.inner.lock();
        if !inner.acknowledgeable {
            return StatusCode::BadMethodInvalid;
        }
        inner.core.acknowledge(event_id, comment, client_user_id)
    }

    /// Confirm the branch matching `event_id`
    pub fn confirm(&self, event_id: &[u8], comment: &str, client_user_id: &str) -> StatusCode {
        let mut inner = self.inner.lock();
        if !inner.acknowledgeable {
            return StatusCode::BadMethodInvalid;
        }
        inner.core.confirm(event_id, comment, client_user_id)
    }

    /// Read one field of the current branch with disabled masking applied
    pub fn read_field(&self, field: ConditionField) -> DataValue {
        self.inner.lock().core.read_field(field)
    }

    /// Subscribe to this condition's event hub.
    ///
    /// Listeners run synchronously while the condition's lock is held and
    /// must not call back into the condition.
    pub fn on_event(&self, listener: impl Fn(&ConditionEvent) + Send + Sync + 'static) {
        self.inner.lock().core.hub.subscribe(listener);
    }

    /// Re-raise the events of every retained branch (used by
    /// ConditionRefresh)
    pub(crate) fn resend_retained(&self) -> usize {
        self.inner.lock().core.resend_retained_events(false)
    }

    pub(crate) fn source_node(&self) -> NodeId {
        self.inner.lock().core.owner_node()
    }
}

impl std::fmt::Debug for Condition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Condition({})", self.inner.lock().core.node_id)
    }
}
