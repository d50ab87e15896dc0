// src/acknowledge.rs - Acknowledge and Confirm on a ConditionCore
//
// Capability module: the two-step acknowledge/confirm workflow is an impl
// block over ConditionCore so alarm types get it by composition. Both
// operations address a branch by event id, never by branch id.

use crate::condition::{BranchKey, ConditionCore};
use crate::events::{AuditAction, ConditionEvent};
use crate::fields::{ConditionField, TwoState};
use crate::node_id::NodeId;
use crate::status::StatusCode;
use crate::variant::{LocalizedText, Variant};
use tracing::info;

impl ConditionCore {
    /// Acknowledge the branch whose event id matches.
    ///
    /// Plain-condition variant: after the operation the current branch is
    /// retained only while it still needs attention.
    pub fn acknowledge(&mut self, event_id: &[u8], comment: &str, client_user_id: &str) -> StatusCode {
        self.acknowledge_with(event_id, comment, client_user_id, false)
    }

    /// Acknowledge with an explicit hint whether the current branch stays
    /// interesting regardless (alarms pass their active flag here).
    pub fn acknowledge_with(
        &mut self,
        event_id: &[u8],
        comment: &str,
        client_user_id: &str,
        current_interesting: bool,
    ) -> StatusCode {
        if !self.enabled() {
            return StatusCode::BadConditionDisabled;
        }
        let Some(key) = self.find_branch_by_event_id(event_id) else {
            return StatusCode::BadEventIdUnknown;
        };

        {
            let snapshot = self.branch_mut(&key);
            let status = snapshot.set_acked_state(true);
            if status.is_bad() {
                return status;
            }
            // Acknowledging re-opens the confirmation step when supported.
            if snapshot.has_state(TwoState::Confirmed) {
                snapshot.set_state(TwoState::Confirmed, false);
            }
            Self::record_operator(snapshot, comment, client_user_id);
        }
        info!(
            "condition {} branch {} acknowledged by {:?}",
            self.condition_name,
            self.branch(&key).branch_id(),
            client_user_id
        );

        let done = self.branch_addressed(&key);
        self.settle_branch(&key, current_interesting, done);
        self.audit_with_comment(
            AuditAction::Acknowledge,
            Some(event_id.to_vec()),
            Some(LocalizedText::english(comment)),
            client_user_id,
        );
        let branch = self.branch(&key).branch_id().clone();
        self.raise_condition_event(&key, true);
        self.drop_if_done(&key);
        self.hub.emit(&ConditionEvent::Acknowledged {
            condition: self.node_id().clone(),
            branch,
            event_id: event_id.to_vec(),
        });
        StatusCode::Good
    }

    /// Confirm the branch whose event id matches.
    pub fn confirm(&mut self, event_id: &[u8], comment: &str, client_user_id: &str) -> StatusCode {
        self.confirm_with(event_id, comment, client_user_id, false)
    }

    /// Confirm with the same current-branch hint as
    /// [`acknowledge_with`](Self::acknowledge_with).
    pub fn confirm_with(
        &mut self,
        event_id: &[u8],
        comment: &str,
        client_user_id: &str,
        current_interesting: bool,
    ) -> StatusCode {
        if !self.enabled() {
            return StatusCode::BadConditionDisabled;
        }
        if !self.current.has_state(TwoState::Confirmed) {
            return StatusCode::BadMethodInvalid;
        }
        let Some(key) = self.find_branch_by_event_id(event_id) else {
            return StatusCode::BadEventIdUnknown;
        };

        {
            let snapshot = self.branch_mut(&key);
            if snapshot.state_id(TwoState::Confirmed) {
                return StatusCode::BadConditionBranchAlreadyConfirmed;
            }
            snapshot.set_state(TwoState::Confirmed, true);
            Self::record_operator(snapshot, comment, client_user_id);
        }
        info!(
            "condition {} branch {} confirmed by {:?}",
            self.condition_name,
            self.branch(&key).branch_id(),
            client_user_id
        );

        // Confirmed branches need not be retained, acked or not.
        self.settle_branch(&key, current_interesting, true);
        self.audit_with_comment(
            AuditAction::Confirm,
            Some(event_id.to_vec()),
            Some(LocalizedText::english(comment)),
            client_user_id,
        );
        let branch = self.branch(&key).branch_id().clone();
        self.raise_condition_event(&key, true);
        self.drop_if_done(&key);
        self.hub.emit(&ConditionEvent::Confirmed {
            condition: self.node_id().clone(),
            branch,
            event_id: event_id.to_vec(),
        });
        StatusCode::Good
    }

    /// Server-initiated acknowledge followed immediately by a confirm,
    /// without a client round trip. Used for alarms that do not require a
    /// manual confirmation step.
    pub fn acknowledge_and_auto_confirm(
        &mut self,
        event_id: &[u8],
        comment: &str,
        client_user_id: &str,
    ) -> StatusCode {
        let Some(key) = self.find_branch_by_event_id(event_id) else {
            return StatusCode::BadEventIdUnknown;
        };
        let status = self.acknowledge(event_id, comment, client_user_id);
        if status.is_bad() || !self.current.has_state(TwoState::Confirmed) {
            return status;
        }
        // The acknowledge renewed the branch's event id; an unconfirmed
        // branch is still retained, so the key stays valid.
        let renewed = self
            .branch(&key)
            .event_id()
            .unwrap_or_else(|| event_id.to_vec());
        self.confirm(&renewed, comment, client_user_id)
    }

    /// True once the branch needs no further operator action: acknowledged,
    /// and confirmed where the condition supports confirmation.
    pub fn branch_addressed(&self, key: &BranchKey) -> bool {
        let snapshot = self.branch(key);
        snapshot.state_id(TwoState::Acked)
            && (!snapshot.has_state(TwoState::Confirmed) || snapshot.state_id(TwoState::Confirmed))
    }

    fn record_operator(
        snapshot: &mut crate::snapshot::ConditionSnapshot,
        comment: &str,
        client_user_id: &str,
    ) {
        if !comment.is_empty() {
            snapshot.set_comment(LocalizedText::english(comment));
        }
        if snapshot.has_field(ConditionField::ClientUserId) {
            snapshot.set_value(
                ConditionField::ClientUserId,
                Variant::String(client_user_id.to_string()),
            );
        }
    }

    /// Recompute retain flags after an acknowledge/confirm: a settled
    /// secondary branch stops being retained, and the current branch stays
    /// retained while it is interesting, still needs operator action, or
    /// secondary branches remain.
    fn settle_branch(&mut self, key: &BranchKey, current_interesting: bool, branch_done: bool) {
        if branch_done {
            if let BranchKey::Secondary(_) = key {
                self.branch_mut(key).set_retain(false);
            }
        }
        let current_pending = match key {
            BranchKey::Current => !branch_done && !self.branch_addressed(&BranchKey::Current),
            BranchKey::Secondary(_) => !self.branch_addressed(&BranchKey::Current),
        };
        let current_retain = current_interesting
            || current_pending
            || self
                .branches
                .values()
                .any(crate::snapshot::ConditionSnapshot::retain);
        if self.current.retain() != current_retain {
            self.current.set_retain(current_retain);
        }
    }

    /// Delete a secondary branch once it stopped being retained. Its final
    /// event has already been raised.
    fn drop_if_done(&mut self, key: &BranchKey) {
        if let BranchKey::Secondary(id) = key {
            if !self.branches[id].retain() {
                let branch_id: NodeId = id.parse().expect("branch keys are stringified node ids");
                self.delete_branch(&branch_id);
            }
        }
    }
}
