// src/alarm.rs - Alarm conditions: ActiveState, input monitoring, branching
//
// An alarm is a ConditionCore plus an evaluation kind (limit, deviation or
// off-normal) driven by value-change subscriptions on its input node. The
// branching algorithm lives in signal_new_condition: an unacknowledged
// alarm that returns to normal is preserved as a secondary branch while
// the current branch normalizes.

use crate::address_space::SubscriptionId;
use crate::condition::{BranchKey, ConditionCore, ConditionInfo};
use crate::fields::{ConditionField, TwoState};
use crate::limit::{self, LimitFlags, Limits};
use crate::node_id::NodeId;
use crate::shelving::Shelving;
use crate::status::StatusCode;
use crate::variant::{DataValue, LocalizedText, Variant};
use crate::{discrete, events::ConditionEvent};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, warn};

/// Display label of a limit state
pub(crate) fn limit_label(state: TwoState) -> &'static str {
    match state {
        TwoState::HighHigh => "HighHigh",
        TwoState::High => "High",
        TwoState::Low => "Low",
        TwoState::LowLow => "LowLow",
        _ => unreachable!("not a limit state"),
    }
}

/// Threshold-driven evaluation state (limit and deviation alarms)
pub(crate) struct LimitKind {
    pub(crate) exclusive: bool,
    pub(crate) limits: Limits,
    /// Current non-exclusive picture
    pub(crate) flags: LimitFlags,
    /// Current exclusive state, if any
    pub(crate) exclusive_state: Option<TwoState>,
    /// Deviation alarms subtract this monitored setpoint from the input
    pub(crate) setpoint_node: Option<NodeId>,
    pub(crate) setpoint: Option<f64>,
}

/// Equality-driven evaluation state (off-normal / discrete alarms)
pub(crate) struct OffNormalKind {
    /// Variable holding the "normal" value; without one the cached value
    /// stays null and the alarm never fires
    pub(crate) normal_state_node: Option<NodeId>,
    pub(crate) normal_value: Variant,
}

/// What drives the alarm's ActiveState
pub(crate) enum AlarmKind {
    Limit(LimitKind),
    OffNormal(OffNormalKind),
}

pub(crate) struct AlarmInner {
    pub(crate) base: ConditionCore,
    pub(crate) kind: AlarmKind,
    pub(crate) input_node: NodeId,
    /// Value-change subscriptions to drop on dispose
    pub(crate) subscriptions: Vec<(NodeId, SubscriptionId)>,
    pub(crate) shelving: Shelving,
    /// Upper bound for shelving requests, milliseconds
    pub(crate) max_time_shelved: Option<u64>,
    /// ConditionInfo of the last signalled transition
    pub(crate) last_info: ConditionInfo,
    pub(crate) disposed: bool,
}

impl AlarmInner {
    pub(crate) fn active(&self) -> bool {
        self.base.current.state_id(TwoState::Active)
    }

    // ------------------------------------------------------------------
    // Input evaluation
    // ------------------------------------------------------------------

    /// Entry point for every input-node value change. Ignored while
    /// disabled or disposed; the live value is replayed on re-enable.
    pub(crate) fn handle_input_change(&mut self, value: &DataValue) {
        if self.disposed || !self.base.enabled() {
            return;
        }
        match &mut self.kind {
            AlarmKind::Limit(_) => self.evaluate_limit_input(value),
            AlarmKind::OffNormal(_) => self.evaluate_off_normal_input(&value.value),
        }
    }

    /// Re-read the input from the address space and evaluate. Used when
    /// the alarm is re-enabled and after construction.
    pub(crate) fn evaluate_from_space(&mut self) {
        let Ok(value) = self.base.space.read_value(&self.input_node) else {
            warn!(
                "alarm {}: input node {} disappeared",
                self.base.condition_name(),
                self.input_node
            );
            return;
        };
        self.handle_input_change(&value);
    }

    fn evaluate_limit_input(&mut self, value: &DataValue) {
        // Still waiting for the first sample: nothing to conclude.
        if value.status == StatusCode::BadWaitingForInitialData {
            return;
        }
        if value.status.is_bad() || value.value.is_null() {
            self.signal_bad_quality(value.status);
            return;
        }
        let Some(raw) = value.value.as_f64() else {
            self.signal_bad_quality(StatusCode::BadTypeMismatch);
            return;
        };

        let AlarmKind::Limit(kind) = &mut self.kind else {
            unreachable!("limit evaluation on a non-limit alarm")
        };
        let effective = match kind.setpoint_node {
            // Deviation alarms compare input minus setpoint; hold still
            // until the setpoint has been seen.
            Some(_) => match kind.setpoint {
                Some(setpoint) => raw - setpoint,
                None => return,
            },
            None => raw,
        };

        if kind.exclusive {
            let resolved = limit::evaluate_exclusive(&kind.limits, effective);
            if resolved == kind.exclusive_state {
                return;
            }
            kind.exclusive_state = resolved;
            let label = resolved.map(limit_label);
            self.apply_limit_state_field(label);
            self.signal_new_condition(
                resolved.is_some(),
                self.condition_info(label, effective, StatusCode::Good),
            );
        } else {
            let flags = limit::evaluate_non_exclusive(&kind.limits, effective);
            if flags == kind.flags {
                return;
            }
            kind.flags = flags;
            self.apply_limit_flags(flags);
            let label = flags.most_severe().map(limit_label);
            self.signal_new_condition(
                flags.any(),
                self.condition_info(label, effective, StatusCode::Good),
            );
        }
    }

    fn evaluate_off_normal_input(&mut self, input: &Variant) {
        let AlarmKind::OffNormal(kind) = &self.kind else {
            unreachable!("off-normal evaluation on a non-discrete alarm")
        };
        let Some(active) = discrete::evaluate_off_normal(input, &kind.normal_value) else {
            return;
        };
        if active == self.active() {
            return;
        }
        let info = if active {
            ConditionInfo {
                message: Some(LocalizedText::english(format!(
                    "Condition value is {} and state is off-normal",
                    input
                ))),
                severity: Some(150),
                quality: Some(StatusCode::Good),
                retain: Some(true),
            }
        } else {
            self.back_to_normal_info(StatusCode::Good)
        };
        self.signal_new_condition(active, info);
    }

    /// A new setpoint (deviation) or normal-state (off-normal) sample
    /// arrived; cache it and re-evaluate against the live input.
    pub(crate) fn handle_reference_change(&mut self, value: &DataValue) {
        if self.disposed {
            return;
        }
        if value.status.is_bad() {
            return;
        }
        match &mut self.kind {
            AlarmKind::Limit(kind) => {
                kind.setpoint = value.value.as_f64();
            }
            AlarmKind::OffNormal(kind) => {
                kind.normal_value = value.value.clone();
            }
        }
        if self.base.enabled() {
            self.evaluate_from_space();
        }
    }

    /// Input quality went bad: signal an inactive condition carrying the
    /// offending status as the new quality.
    fn signal_bad_quality(&mut self, status: StatusCode) {
        let mut exclusive = false;
        match &mut self.kind {
            AlarmKind::Limit(kind) => {
                kind.flags = LimitFlags::default();
                kind.exclusive_state = None;
                exclusive = kind.exclusive;
            }
            AlarmKind::OffNormal(_) => {}
        }
        let info = self.back_to_normal_info(status);
        if !self.active() && info.same_state_as(&self.last_info) {
            return;
        }
        if exclusive {
            self.apply_limit_state_field(None);
        } else {
            self.apply_limit_flags(LimitFlags::default());
        }
        self.signal_new_condition(false, info);
    }

    fn condition_info(&self, label: Option<&str>, value: f64, quality: StatusCode) -> ConditionInfo {
        match label {
            Some(label) => ConditionInfo {
                message: Some(LocalizedText::english(format!(
                    "Condition value is {} and state is {}",
                    value, label
                ))),
                severity: Some(150),
                quality: Some(quality),
                retain: Some(true),
            },
            None => self.back_to_normal_info(quality),
        }
    }

    fn back_to_normal_info(&self, quality: StatusCode) -> ConditionInfo {
        ConditionInfo {
            message: Some(LocalizedText::english("Back to normal")),
            severity: Some(0),
            quality: Some(quality),
            retain: None,
        }
    }

    /// Mirror the per-threshold booleans of a non-exclusive alarm
    fn apply_limit_flags(&mut self, flags: LimitFlags) {
        for (state, set) in [
            (TwoState::HighHigh, flags.high_high),
            (TwoState::High, flags.high),
            (TwoState::Low, flags.low),
            (TwoState::LowLow, flags.low_low),
        ] {
            if self.base.current.has_state(state) && self.base.current.state_id(state) != set {
                self.base.current.set_state(state, set);
            }
        }
    }

    /// Mirror the exclusive limit-state display value
    fn apply_limit_state_field(&mut self, label: Option<&str>) {
        if self.base.current.has_field(ConditionField::LimitStateCurrent) {
            self.base.current.set_value(
                ConditionField::LimitStateCurrent,
                Variant::LocalizedText(LocalizedText::english(label.unwrap_or(""))),
            );
        }
    }

    // ------------------------------------------------------------------
    // The branching algorithm
    // ------------------------------------------------------------------

    /// Transition the alarm to `active` with the given new condition info.
    ///
    /// Must only be called on an enabled alarm with info that actually
    /// differs from the previous transition; both are defects of the
    /// evaluation layer, not client-recoverable errors.
    pub(crate) fn signal_new_condition(&mut self, active: bool, info: ConditionInfo) {
        assert!(
            self.base.enabled(),
            "alarm {} signalled while disabled",
            self.base.condition_name()
        );
        assert!(
            !info.same_state_as(&self.last_info),
            "alarm {} signalled an unchanged condition info (duplicate event storm guard)",
            self.base.condition_name()
        );
        // A real transition supersedes the retain flag saved at disable.
        self.base.pre_disable_retain = None;

        if active {
            self.base.current.set_state(TwoState::Active, true);
            self.base.current.set_state(TwoState::Acked, false);
            if self.base.current.has_state(TwoState::Confirmed) {
                self.base.current.set_state(TwoState::Confirmed, false);
            }
            info.apply_to(&mut self.base.current);
            self.base.current.set_retain(true);
            self.base.raise_condition_event(&BranchKey::Current, true);
        } else {
            // Preserve a still-unacknowledged state as a secondary branch
            // before normalizing the current one. The branch keeps the
            // event id clients have seen; the current branch mints a new
            // one below.
            if !self.base.branch_addressed(&BranchKey::Current) && self.base.current.retain() {
                let branch_id = self.base.create_branch();
                self.base
                    .raise_new_branch_state(&BranchKey::Secondary(branch_id.to_string()));
            }
            self.base.current.set_state(TwoState::Active, false);
            self.base.current.set_state(TwoState::Acked, true);
            if self.base.current.has_state(TwoState::Confirmed) {
                self.base.current.set_state(TwoState::Confirmed, true);
            }
            info.apply_to(&mut self.base.current);
            let retain = self
                .base
                .branches
                .values()
                .any(crate::snapshot::ConditionSnapshot::retain);
            self.base.current.set_retain(retain);
            self.base.raise_condition_event(&BranchKey::Current, true);
        }
        debug!(
            "alarm {} transitioned to active={} ({} retained branches)",
            self.base.condition_name(),
            active,
            self.base.branch_count()
        );
        self.last_info = info;
    }

    // ------------------------------------------------------------------
    // Manual transitions
    // ------------------------------------------------------------------

    /// Force the alarm active without consulting the input
    pub(crate) fn activate_alarm(&mut self) {
        self.base.current.set_state(TwoState::Active, true);
        self.base.current.set_state(TwoState::Acked, false);
        self.base.current.set_retain(true);
        self.base.raise_condition_event(&BranchKey::Current, true);
    }

    /// Force the alarm inactive without consulting the input
    pub(crate) fn deactivate_alarm(&mut self, retain: bool) {
        self.base.current.set_state(TwoState::Active, false);
        self.base.current.set_state(TwoState::Acked, true);
        self.base.current.set_retain(retain);
        self.base.raise_condition_event(&BranchKey::Current, true);
    }

    // ------------------------------------------------------------------
    // Suppression / shelving visibility
    // ------------------------------------------------------------------

    /// Recompute the derived SuppressedOrShelved hint. Does not affect
    /// evaluation.
    pub(crate) fn update_suppressed_or_shelved(&mut self) {
        if !self
            .base
            .current
            .has_field(ConditionField::SuppressedOrShelved)
        {
            return;
        }
        let suppressed = self.base.current.has_state(TwoState::Suppressed)
            && self.base.current.state_id(TwoState::Suppressed);
        let shelved = self.shelving.is_shelved();
        self.base.current.set_value(
            ConditionField::SuppressedOrShelved,
            Variant::Bool(suppressed || shelved),
        );
    }

    pub(crate) fn set_suppressed(&mut self, suppressed: bool) -> StatusCode {
        if !self.base.current.has_state(TwoState::Suppressed) {
            return StatusCode::BadMethodInvalid;
        }
        if self.base.current.state_id(TwoState::Suppressed) == suppressed {
            return StatusCode::Good;
        }
        self.base.current.set_state(TwoState::Suppressed, suppressed);
        self.update_suppressed_or_shelved();
        self.base.raise_condition_event(&BranchKey::Current, true);
        StatusCode::Good
    }

    /// Tear down subscriptions and timers. Idempotent.
    pub(crate) fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;
        self.shelving.clear_timer();
        for (node, token) in self.subscriptions.drain(..) {
            self.base.space.unsubscribe_value(&node, token);
        }
        debug!("alarm {} disposed", self.base.condition_name());
    }
}

/// An alarm condition instance (limit, deviation or off-normal),
/// instantiated through [`crate::builder::AlarmOptions`].
///
/// Cheaply cloneable handle; all state lives behind one lock. Input-node
/// subscriptions and the shelving timer hold only weak references, so
/// dropping every handle after [`dispose`](Alarm::dispose) releases the
/// alarm.
#[derive(Clone)]
pub struct Alarm {
    pub(crate) inner: Arc<Mutex<AlarmInner>>,
}

impl Alarm {
    /// The alarm's node id
    pub fn node_id(&self) -> NodeId {
        self.inner.lock().base.node_id().clone()
    }

    /// Whether EnabledState is currently true
    pub fn enabled(&self) -> bool {
        self.inner.lock().base.enabled()
    }

    /// Whether ActiveState is currently true
    pub fn active(&self) -> bool {
        self.inner.lock().active()
    }

    /// Current retain flag of branch 0
    pub fn retain(&self) -> bool {
        self.inner.lock().base.current.retain()
    }

    /// Event id of the current branch
    pub fn current_event_id(&self) -> Option<Vec<u8>> {
        self.inner.lock().base.current.event_id()
    }

    /// Number of retained secondary branches
    pub fn branch_count(&self) -> usize {
        self.inner.lock().base.branch_count()
    }

    /// Boolean value of a two-state variable, if the alarm carries it
    pub fn state_id(&self, state: TwoState) -> Option<bool> {
        let inner = self.inner.lock();
        inner
            .base
            .current
            .has_state(state)
            .then(|| inner.base.current.state_id(state))
    }

    /// Enable the alarm: the live input is re-evaluated, the pre-disable
    /// retain flag restored, and retained events resent.
    pub fn enable(&self) -> StatusCode {
        self.enable_by("")
    }

    /// Enable on behalf of a user
    pub fn enable_by(&self, client_user_id: &str) -> StatusCode {
        let mut inner = self.inner.lock();
        let status = inner.base.begin_enable(client_user_id);
        if status.is_good() {
            inner.evaluate_from_space();
            inner.base.finish_enable();
        }
        status
    }

    /// Disable the alarm. Input changes are ignored until re-enabled.
    pub fn disable(&self) -> StatusCode {
        self.inner.lock().base.disable("")
    }

    /// Acknowledge the branch matching `event_id`
    pub fn acknowledge(&self, event_id: &[u8], comment: &str, client_user_id: &str) -> StatusCode {
        let mut inner = self.inner.lock();
        let active = inner.active();
        inner
            .base
            .acknowledge_with(event_id, comment, client_user_id, active)
    }

    /// Confirm the branch matching `event_id`
    pub fn confirm(&self, event_id: &[u8], comment: &str, client_user_id: &str) -> StatusCode {
        let mut inner = self.inner.lock();
        let active = inner.active();
        inner
            .base
            .confirm_with(event_id, comment, client_user_id, active)
    }

    /// Server-side acknowledge-then-confirm without a client round trip
    pub fn acknowledge_and_auto_confirm(
        &self,
        event_id: &[u8],
        comment: &str,
        client_user_id: &str,
    ) -> StatusCode {
        self.inner
            .lock()
            .base
            .acknowledge_and_auto_confirm(event_id, comment, client_user_id)
    }

    /// Attach a comment to the branch matching `event_id`
    pub fn add_comment(&self, event_id: &[u8], comment: &str, client_user_id: &str) -> StatusCode {
        self.inner.lock().base.add_comment(
            event_id,
            LocalizedText::english(comment),
            client_user_id,
        )
    }

    /// Force the alarm active (administrative transition)
    pub fn activate_alarm(&self) {
        self.inner.lock().activate_alarm();
    }

    /// Force the alarm inactive (administrative transition)
    pub fn deactivate_alarm(&self, retain: bool) {
        self.inner.lock().deactivate_alarm(retain);
    }

    /// Set or clear SuppressedState
    pub fn set_suppressed(&self, suppressed: bool) -> StatusCode {
        self.inner.lock().set_suppressed(suppressed)
    }

    /// Read one condition variable the way a client would
    pub fn read_field(&self, field: ConditionField) -> DataValue {
        if field == ConditionField::UnshelveTime {
            return self.unshelve_time();
        }
        self.inner.lock().base.read_field(field)
    }

    /// Subscribe to this alarm's event hub.
    ///
    /// Listeners run synchronously while the alarm's lock is held and must
    /// not call back into the alarm.
    pub fn on_event(&self, listener: impl Fn(&ConditionEvent) + Send + Sync + 'static) {
        self.inner.lock().base.hub.subscribe(listener);
    }

    /// Drop subscriptions and cancel the shelving timer. The alarm stops
    /// reacting to input changes; further method calls are harmless.
    pub fn dispose(&self) {
        self.inner.lock().dispose();
    }

    /// Re-raise the events of every retained branch (used by
    /// ConditionRefresh)
    pub(crate) fn resend_retained(&self) -> usize {
        self.inner.lock().base.resend_retained_events(false)
    }

    pub(crate) fn source_node(&self) -> NodeId {
        self.inner.lock().base.owner_node()
    }
}

impl std::fmt::Debug for Alarm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Alarm({})", self.inner.lock().base.node_id())
    }
}
