// src/snapshot.rs - ConditionSnapshot: one branch of a condition's values
//
// A snapshot is a consistent value-set for all condition variables of one
// branch. Branch 0 (the current branch, null branch id) writes through to
// the live address-space variables on every mutation; non-zero branches
// are detached copies kept only while they are retained.

use crate::address_space::AddressSpace;
use crate::events::EventData;
use crate::fields::{ConditionField, TwoState};
use crate::node_id::NodeId;
use crate::status::StatusCode;
use crate::variant::{DataValue, LocalizedText, Variant};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

/// Address-space node ids backing a two-state variable: the localized-text
/// state variable and its boolean `Id` property
#[derive(Debug, Clone)]
pub struct StateVarIds {
    /// The state variable node (holds the display text)
    pub state: NodeId,
    /// The `Id` property node (holds the boolean)
    pub id: NodeId,
}

/// Current value of a two-state variable
#[derive(Debug, Clone, PartialEq)]
pub struct TwoStateValue {
    /// Boolean state
    pub id: bool,
    /// Synchronized human-readable shadow value
    pub text: LocalizedText,
    /// When the state last changed
    pub transition_time: DateTime<Utc>,
}

/// Live mirror of branch 0 onto the condition's address-space variables
#[derive(Clone)]
pub(crate) struct Mirror {
    pub(crate) space: Arc<AddressSpace>,
    pub(crate) vars: Arc<HashMap<ConditionField, NodeId>>,
    pub(crate) state_vars: Arc<HashMap<TwoState, StateVarIds>>,
}

/// A consistent point-in-time value-set for all condition variables of one
/// branch.
///
/// The schema (which fields and two-state variables exist) is fixed at
/// instantiation from the condition type and requested optionals; touching
/// a variable outside the schema is a configuration defect and panics.
#[derive(Clone)]
pub struct ConditionSnapshot {
    branch_id: NodeId,
    values: HashMap<ConditionField, Variant>,
    states: HashMap<TwoState, TwoStateValue>,
    mirror: Option<Mirror>,
}

impl ConditionSnapshot {
    /// Branch 0 snapshot, mirrored live onto the address space.
    ///
    /// The schema is taken from the mirror's variable maps; every field
    /// starts out null and every state false.
    pub(crate) fn new_current(mirror: Mirror) -> Self {
        let now = Utc::now();
        let values = mirror
            .vars
            .keys()
            .map(|field| (*field, Variant::Null))
            .collect();
        let states = mirror
            .state_vars
            .keys()
            .map(|state| {
                (
                    *state,
                    TwoStateValue {
                        id: false,
                        text: LocalizedText::english(state.false_text()),
                        transition_time: now,
                    },
                )
            })
            .collect();
        Self {
            branch_id: NodeId::null(),
            values,
            states,
            mirror: Some(mirror),
        }
    }

    /// Detached copy of this snapshot under a new branch id.
    ///
    /// The fork keeps all current values (including the event id) but is
    /// no longer mirrored; it exists to preserve a not-yet-acknowledged
    /// state while the current branch moves on.
    pub fn fork(&self, branch_id: NodeId) -> Self {
        assert!(
            !branch_id.is_null(),
            "a secondary branch requires a non-null branch id"
        );
        let mut copy = Self {
            branch_id: branch_id.clone(),
            values: self.values.clone(),
            states: self.states.clone(),
            mirror: None,
        };
        if copy.values.contains_key(&ConditionField::BranchId) {
            copy.values
                .insert(ConditionField::BranchId, Variant::NodeId(branch_id));
        }
        copy
    }

    /// Branch id (null for the current branch)
    pub fn branch_id(&self) -> &NodeId {
        &self.branch_id
    }

    /// True for branch 0
    pub fn is_current(&self) -> bool {
        self.branch_id.is_null()
    }

    /// True if the field is part of this condition's schema
    pub fn has_field(&self, field: ConditionField) -> bool {
        self.values.contains_key(&field)
    }

    /// True if the two-state variable is part of this condition's schema
    pub fn has_state(&self, state: TwoState) -> bool {
        self.states.contains_key(&state)
    }

    // ------------------------------------------------------------------
    // Scalar fields
    // ------------------------------------------------------------------

    /// Current value of a field, if it is in the schema
    pub fn value(&self, field: ConditionField) -> Option<&Variant> {
        self.values.get(&field)
    }

    /// Set a field value. Writes through to the address space when this is
    /// the current branch.
    pub fn set_value(&mut self, field: ConditionField, value: Variant) {
        let slot = self.values.get_mut(&field).unwrap_or_else(|| {
            panic!(
                "condition does not expose the {} variable",
                field.browse_path()
            )
        });
        *slot = value.clone();
        if let Some(mirror) = &self.mirror {
            let node = &mirror.vars[&field];
            mirror
                .space
                .set_value_from_source(node, value)
                .expect("branch 0 mirror variable exists");
        }
    }

    /// Set the severity, automatically capturing the previous value into
    /// LastSeverity. Event severity is a 1..=1000 scale; larger values are
    /// clamped to the ceiling.
    pub fn set_severity(&mut self, severity: u16) {
        let severity = severity.min(1000);
        if self.has_field(ConditionField::LastSeverity) {
            let previous = self
                .value(ConditionField::Severity)
                .cloned()
                .unwrap_or(Variant::Int(0));
            let previous = if previous.is_null() {
                Variant::Int(0)
            } else {
                previous
            };
            self.set_value(ConditionField::LastSeverity, previous);
        }
        self.set_value(ConditionField::Severity, Variant::Int(severity as i64));
    }

    /// Current severity
    pub fn severity(&self) -> u16 {
        self.value(ConditionField::Severity)
            .and_then(|v| v.as_i64())
            .unwrap_or(0) as u16
    }

    /// Set the quality status
    pub fn set_quality(&mut self, quality: StatusCode) {
        self.set_value(ConditionField::Quality, Variant::StatusCode(quality));
    }

    /// Set the event message
    pub fn set_message(&mut self, message: LocalizedText) {
        self.set_value(ConditionField::Message, Variant::LocalizedText(message));
    }

    /// Set the operator comment
    pub fn set_comment(&mut self, comment: LocalizedText) {
        self.set_value(ConditionField::Comment, Variant::LocalizedText(comment));
    }

    /// Set the retain flag
    pub fn set_retain(&mut self, retain: bool) {
        self.set_value(ConditionField::Retain, Variant::Bool(retain));
    }

    /// Current retain flag
    pub fn retain(&self) -> bool {
        self.value(ConditionField::Retain)
            .and_then(|v| v.as_bool())
            .unwrap_or(false)
    }

    /// Stamp the event time (and receive time) with now
    pub fn stamp_time(&mut self) {
        let now = Utc::now();
        self.set_value(ConditionField::Time, Variant::DateTime(now));
        if self.has_field(ConditionField::ReceiveTime) {
            self.set_value(ConditionField::ReceiveTime, Variant::DateTime(now));
        }
    }

    /// Mint a fresh opaque event id
    pub fn renew_event_id(&mut self) {
        let bytes = Uuid::new_v4().as_bytes().to_vec();
        self.set_value(ConditionField::EventId, Variant::ByteString(bytes));
    }

    /// Current event id bytes, if one has been minted
    pub fn event_id(&self) -> Option<Vec<u8>> {
        self.value(ConditionField::EventId)
            .and_then(|v| v.as_bytes())
            .map(|b| b.to_vec())
    }

    // ------------------------------------------------------------------
    // Two-state variables
    // ------------------------------------------------------------------

    /// Current value of a two-state variable, if it is in the schema
    pub fn state(&self, state: TwoState) -> Option<&TwoStateValue> {
        self.states.get(&state)
    }

    /// Boolean value of a mandatory two-state variable.
    ///
    /// Panics if the condition type does not carry the state; callers use
    /// [`has_state`](Self::has_state) for optional states.
    pub fn state_id(&self, state: TwoState) -> bool {
        self.states
            .get(&state)
            .unwrap_or_else(|| panic!("condition has no {} variable", state.browse_name()))
            .id
    }

    /// Set a two-state variable, maintaining the localized-text shadow
    /// value and the transition time.
    ///
    /// Panics if the condition type does not carry the state.
    pub fn set_state(&mut self, state: TwoState, id: bool) {
        let text = LocalizedText::english(if id {
            state.true_text()
        } else {
            state.false_text()
        });
        let slot = self
            .states
            .get_mut(&state)
            .unwrap_or_else(|| panic!("condition has no {} variable", state.browse_name()));
        slot.id = id;
        slot.text = text.clone();
        slot.transition_time = Utc::now();

        if let Some(mirror) = &self.mirror {
            let ids = &mirror.state_vars[&state];
            mirror
                .space
                .set_value_from_source(&ids.id, Variant::Bool(id))
                .expect("branch 0 mirror state Id property exists");
            mirror
                .space
                .set_value_from_source(&ids.state, Variant::LocalizedText(text))
                .expect("branch 0 mirror state variable exists");
        }
    }

    /// Set AckedState with the re-acknowledge guard: acknowledging an
    /// already acknowledged branch is rejected, not a state toggle.
    pub fn set_acked_state(&mut self, acked: bool) -> StatusCode {
        if acked && self.state_id(TwoState::Acked) {
            return StatusCode::BadConditionBranchAlreadyAcked;
        }
        self.set_state(TwoState::Acked, acked);
        StatusCode::Good
    }

    // ------------------------------------------------------------------
    // Event payload construction
    // ------------------------------------------------------------------

    /// Verify that the branch 0 value map and the live address-space
    /// variables agree. A mismatch means the mirror invariant was broken
    /// somewhere and continuing would show clients stale data; this is a
    /// correctness guard, not a recoverable path.
    pub fn verify_mirror(&self) {
        let Some(mirror) = &self.mirror else { return };
        for (field, value) in &self.values {
            let live = mirror
                .space
                .read_value(&mirror.vars[field])
                .expect("branch 0 mirror variable exists");
            assert!(
                &live.value == value,
                "branch 0 mirror out of sync at {}: map has {:?}, node has {:?}",
                field.browse_path(),
                value,
                live.value
            );
        }
        for (state, two_state) in &self.states {
            let ids = &mirror.state_vars[state];
            let live_id = mirror
                .space
                .read_value(&ids.id)
                .expect("branch 0 mirror state Id property exists");
            assert!(
                live_id.value.as_bool() == Some(two_state.id),
                "branch 0 mirror out of sync at {}: map has {}, node has {:?}",
                state.id_path(),
                two_state.id,
                live_id.value
            );
        }
    }

    /// Build the outbound event payload.
    ///
    /// When the condition is disabled, every field outside the fixed
    /// allow-list is replaced by the `BadConditionDisabled` sentinel. For
    /// branch 0 the mirror consistency guard runs first.
    pub fn construct_event_data(&self, enabled: bool) -> EventData {
        if self.is_current() {
            self.verify_mirror();
        }
        let mut data = EventData::new();
        for (field, value) in &self.values {
            let cell = if enabled || field.readable_when_disabled() {
                DataValue::good(value.clone())
            } else {
                DataValue::with_status(StatusCode::BadConditionDisabled)
            };
            data.insert(field.browse_path(), cell);
        }
        for (state, two_state) in &self.states {
            if enabled || state.readable_when_disabled() {
                data.insert(
                    state.browse_name(),
                    DataValue::good(Variant::LocalizedText(two_state.text.clone())),
                );
                data.insert(state.id_path(), DataValue::good(Variant::Bool(two_state.id)));
            } else {
                data.insert(
                    state.browse_name(),
                    DataValue::with_status(StatusCode::BadConditionDisabled),
                );
                data.insert(
                    state.id_path(),
                    DataValue::with_status(StatusCode::BadConditionDisabled),
                );
            }
        }
        data
    }

    /// Read one field the way a client would: the disabled-condition mask
    /// applies to everything outside the allow-list.
    pub fn read_field(&self, field: ConditionField, enabled: bool) -> DataValue {
        if !self.has_field(field) {
            return DataValue::with_status(StatusCode::BadNodeIdUnknown);
        }
        if enabled || field.readable_when_disabled() {
            DataValue::good(self.values[&field].clone())
        } else {
            DataValue::with_status(StatusCode::BadConditionDisabled)
        }
    }
}

impl std::fmt::Debug for ConditionSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConditionSnapshot")
            .field("branch_id", &self.branch_id)
            .field("fields", &self.values.len())
            .field("states", &self.states.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::variant::VariantKind;

    fn test_mirror(fields: &[ConditionField], states: &[TwoState]) -> Mirror {
        let space = AddressSpace::new();
        let mut vars = HashMap::new();
        for field in fields {
            let id = NodeId::string(1, field.browse_path());
            space
                .add_variable(id.clone(), field.browse_path(), VariantKind::Any, Variant::Null)
                .unwrap();
            vars.insert(*field, id);
        }
        let mut state_vars = HashMap::new();
        for state in states {
            let state_id = NodeId::string(1, state.browse_name());
            let id_id = NodeId::string(1, state.id_path());
            space
                .add_variable(
                    state_id.clone(),
                    state.browse_name(),
                    VariantKind::LocalizedText,
                    Variant::Null,
                )
                .unwrap();
            space
                .add_variable(id_id.clone(), "Id", VariantKind::Bool, Variant::Bool(false))
                .unwrap();
            state_vars.insert(
                *state,
                StateVarIds {
                    state: state_id,
                    id: id_id,
                },
            );
        }
        Mirror {
            space,
            vars: Arc::new(vars),
            state_vars: Arc::new(state_vars),
        }
    }

    fn basic_snapshot() -> ConditionSnapshot {
        ConditionSnapshot::new_current(test_mirror(
            &[
                ConditionField::EventId,
                ConditionField::Severity,
                ConditionField::LastSeverity,
                ConditionField::Message,
                ConditionField::Retain,
                ConditionField::BranchId,
                ConditionField::Time,
            ],
            &[TwoState::Enabled, TwoState::Acked, TwoState::Active],
        ))
    }

    #[test]
    fn test_mirror_write_through() {
        let mut snapshot = basic_snapshot();
        let space = snapshot.mirror.as_ref().unwrap().space.clone();
        let severity_node = snapshot.mirror.as_ref().unwrap().vars[&ConditionField::Severity].clone();

        snapshot.set_severity(700);
        assert_eq!(
            space.read_value(&severity_node).unwrap().value,
            Variant::Int(700)
        );
        snapshot.verify_mirror();
    }

    #[test]
    fn test_last_severity_capture() {
        let mut snapshot = basic_snapshot();
        snapshot.set_severity(100);
        snapshot.set_severity(400);
        assert_eq!(snapshot.severity(), 400);
        assert_eq!(
            snapshot.value(ConditionField::LastSeverity).unwrap(),
            &Variant::Int(100)
        );
    }

    #[test]
    fn test_severity_clamped_to_scale() {
        let mut snapshot = basic_snapshot();
        snapshot.set_severity(5000);
        assert_eq!(snapshot.severity(), 1000);
        snapshot.set_severity(1000);
        assert_eq!(snapshot.severity(), 1000);
    }

    #[test]
    fn test_two_state_shadow_text() {
        let mut snapshot = basic_snapshot();
        snapshot.set_state(TwoState::Active, true);
        let state = snapshot.state(TwoState::Active).unwrap();
        assert!(state.id);
        assert_eq!(state.text.text, "Active");

        snapshot.set_state(TwoState::Active, false);
        assert_eq!(snapshot.state(TwoState::Active).unwrap().text.text, "Inactive");
    }

    #[test]
    #[should_panic(expected = "has no ConfirmedState")]
    fn test_missing_state_panics() {
        let mut snapshot = basic_snapshot();
        snapshot.set_state(TwoState::Confirmed, true);
    }

    #[test]
    fn test_acked_guard() {
        let mut snapshot = basic_snapshot();
        assert_eq!(snapshot.set_acked_state(true), StatusCode::Good);
        assert_eq!(
            snapshot.set_acked_state(true),
            StatusCode::BadConditionBranchAlreadyAcked
        );
        // Clearing is always allowed.
        assert_eq!(snapshot.set_acked_state(false), StatusCode::Good);
    }

    #[test]
    fn test_fork_is_detached() {
        let mut snapshot = basic_snapshot();
        snapshot.set_severity(300);
        snapshot.renew_event_id();

        let branch_id = NodeId::new_guid(1);
        let branch = snapshot.fork(branch_id.clone());
        assert!(!branch.is_current());
        assert_eq!(branch.severity(), 300);
        assert_eq!(branch.event_id(), snapshot.event_id());
        assert_eq!(
            branch.value(ConditionField::BranchId).unwrap(),
            &Variant::NodeId(branch_id)
        );

        // Forked branch mutation leaves the live variables alone.
        let space = snapshot.mirror.as_ref().unwrap().space.clone();
        let severity_node = snapshot.mirror.as_ref().unwrap().vars[&ConditionField::Severity].clone();
        let mut branch = branch;
        branch.set_severity(999);
        assert_eq!(
            space.read_value(&severity_node).unwrap().value,
            Variant::Int(300)
        );
    }

    #[test]
    #[should_panic(expected = "non-null branch id")]
    fn test_fork_rejects_null_branch() {
        let snapshot = basic_snapshot();
        let _ = snapshot.fork(NodeId::null());
    }

    #[test]
    fn test_disabled_masking() {
        let mut snapshot = basic_snapshot();
        snapshot.renew_event_id();
        snapshot.set_severity(500);
        snapshot.set_state(TwoState::Enabled, false);

        let data = snapshot.construct_event_data(false);
        // Allow-listed fields keep their value.
        assert!(data.get("EventId").unwrap().status.is_good());
        assert!(data.get("BranchId").unwrap().status.is_good());
        assert!(data.get("EnabledState.Id").unwrap().status.is_good());
        // Everything else reads as the disabled sentinel.
        assert_eq!(
            data.get("Severity").unwrap().status,
            StatusCode::BadConditionDisabled
        );
        assert_eq!(
            data.get("ActiveState.Id").unwrap().status,
            StatusCode::BadConditionDisabled
        );

        // The read wrapper behaves the same way.
        let read = snapshot.read_field(ConditionField::Severity, false);
        assert_eq!(read.status, StatusCode::BadConditionDisabled);
        let read = snapshot.read_field(ConditionField::EventId, false);
        assert!(read.status.is_good());
    }

    #[test]
    #[should_panic(expected = "mirror out of sync")]
    fn test_mirror_divergence_is_fatal() {
        let snapshot = basic_snapshot();
        let mirror = snapshot.mirror.as_ref().unwrap();
        // Corrupt the live variable behind the snapshot's back.
        mirror
            .space
            .set_value_from_source(
                &mirror.vars[&ConditionField::Severity],
                Variant::Int(123),
            )
            .unwrap();
        snapshot.verify_mirror();
    }
}
