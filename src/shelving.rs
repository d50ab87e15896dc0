// src/shelving.rs - ShelvingStateMachine for alarm conditions
//
// Unshelved <-> TimedShelved and Unshelved <-> OneShotShelved, both with
// an automatic return to Unshelved. The auto-unshelve timer is a
// cancellable tokio task holding a weak reference to the alarm; every
// explicit transition cancels a pending timer before doing anything else,
// and a generation counter makes an already-fired stale task a no-op.

use crate::alarm::{Alarm, AlarmInner};
use crate::events::AuditAction;
use crate::fields::ConditionField;
use crate::status::StatusCode;
use crate::variant::{DataValue, LocalizedText, Variant};
use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Smallest accepted shelving duration, milliseconds
pub const MIN_SHELVE_MS: u64 = 10;

/// Largest accepted shelving duration, milliseconds. Requesting exactly
/// this value means "indefinitely"; no timer is started.
pub const MAX_SHELVE_MS: u64 = i32::MAX as u64;

/// Current state of the shelving sub-state-machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShelvingState {
    /// Not shelved
    Unshelved,
    /// Shelved for a client-chosen duration
    TimedShelved,
    /// Shelved until unshelved or MaxTimeShelved elapses
    OneShotShelved,
}

impl ShelvingState {
    /// Display label, also used for `ShelvingState.CurrentState`
    pub fn label(self) -> &'static str {
        match self {
            ShelvingState::Unshelved => "Unshelved",
            ShelvingState::TimedShelved => "TimedShelved",
            ShelvingState::OneShotShelved => "OneShotShelved",
        }
    }
}

/// Per-alarm shelving state. At most one pending timer at any time.
pub(crate) struct Shelving {
    pub(crate) state: ShelvingState,
    shelved_at: Option<Instant>,
    duration_ms: u64,
    timer: Option<JoinHandle<()>>,
    generation: u64,
}

impl Default for Shelving {
    fn default() -> Self {
        Self {
            state: ShelvingState::Unshelved,
            shelved_at: None,
            duration_ms: 0,
            timer: None,
            generation: 0,
        }
    }
}

impl Shelving {
    pub(crate) fn is_shelved(&self) -> bool {
        self.state != ShelvingState::Unshelved
    }

    /// Cancel any pending timer and invalidate a task that may already
    /// have fired and be waiting on the alarm lock.
    pub(crate) fn clear_timer(&mut self) {
        self.generation += 1;
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }

    /// Remaining shelving time in milliseconds, floored at zero. `None`
    /// while shelved indefinitely.
    fn remaining_ms(&self) -> Option<u64> {
        if self.duration_ms == MAX_SHELVE_MS {
            return None;
        }
        let elapsed = self
            .shelved_at
            .map(|at| at.elapsed().as_millis() as u64)
            .unwrap_or(0);
        Some(self.duration_ms.saturating_sub(elapsed))
    }
}

fn validate_duration(duration_ms: f64, max_time_shelved: Option<u64>) -> StatusCode {
    if !duration_ms.is_finite()
        || duration_ms < MIN_SHELVE_MS as f64
        || duration_ms > MAX_SHELVE_MS as f64
    {
        return StatusCode::BadShelvingTimeOutOfRange;
    }
    if let Some(max) = max_time_shelved {
        if duration_ms > max as f64 {
            return StatusCode::BadShelvingTimeOutOfRange;
        }
    }
    StatusCode::Good
}

impl AlarmInner {
    /// Mirror the shelving state onto the condition variables
    fn apply_shelving_fields(&mut self) {
        let label = self.shelving.state.label();
        if self
            .base
            .current
            .has_field(ConditionField::ShelvingStateCurrent)
        {
            self.base.current.set_value(
                ConditionField::ShelvingStateCurrent,
                Variant::LocalizedText(LocalizedText::english(label)),
            );
        }
        if self.base.current.has_field(ConditionField::UnshelveTime) {
            let value = match self.shelving.state {
                ShelvingState::Unshelved => Variant::Null,
                _ => match self.shelving.remaining_ms() {
                    Some(ms) => Variant::Float(ms as f64),
                    None => Variant::Float(MAX_SHELVE_MS as f64),
                },
            };
            self.base
                .current
                .set_value(ConditionField::UnshelveTime, value);
        }
        self.update_suppressed_or_shelved();
    }

    fn enter_shelved(&mut self, state: ShelvingState, duration_ms: u64) {
        self.shelving.clear_timer();
        self.shelving.state = state;
        self.shelving.duration_ms = duration_ms;
        self.shelving.shelved_at = Some(Instant::now());
        self.apply_shelving_fields();
        info!(
            "alarm {} shelved ({}, {} ms)",
            self.base.condition_name(),
            state.label(),
            duration_ms
        );
    }

    /// Return to Unshelved. Shared by the manual method and the timer.
    pub(crate) fn unshelve_internal(&mut self) {
        self.shelving.clear_timer();
        self.shelving.state = ShelvingState::Unshelved;
        self.shelving.shelved_at = None;
        self.shelving.duration_ms = 0;
        self.apply_shelving_fields();
        info!("alarm {} unshelved", self.base.condition_name());
    }
}

/// Spawn the auto-unshelve task. The task holds only a weak reference and
/// re-checks state and generation after waking, so a cancelled or replaced
/// shelve can never be undone by a stale timer.
fn spawn_unshelve_timer(weak: Weak<Mutex<AlarmInner>>, duration_ms: u64, generation: u64) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(duration_ms)).await;
        let Some(inner) = weak.upgrade() else { return };
        let mut inner = inner.lock();
        if inner.shelving.generation != generation || !inner.shelving.is_shelved() {
            return;
        }
        debug!(
            "alarm {} auto-unshelved after {} ms",
            inner.base.condition_name(),
            duration_ms
        );
        inner.unshelve_internal();
        inner.base.audit(AuditAction::Unshelve, None, "");
    })
}

impl Alarm {
    /// Current shelving state
    pub fn shelving_state(&self) -> ShelvingState {
        self.inner.lock().shelving.state
    }

    /// Shelve the alarm for `duration_ms` milliseconds.
    ///
    /// Rejected before any timer manipulation when already shelved; an
    /// existing timer is never disturbed by a failed call. Requesting
    /// exactly [`MAX_SHELVE_MS`] shelves indefinitely.
    pub fn timed_shelve(&self, duration_ms: f64) -> StatusCode {
        self.timed_shelve_by(duration_ms, "")
    }

    /// [`timed_shelve`](Self::timed_shelve) on behalf of a user
    pub fn timed_shelve_by(&self, duration_ms: f64, client_user_id: &str) -> StatusCode {
        let weak = Arc::downgrade(&self.inner);
        let mut inner = self.inner.lock();
        // Duration validation comes first: an out-of-range request is
        // reported as such even while shelved, and neither rejection
        // touches the existing timer.
        let status = validate_duration(duration_ms, inner.max_time_shelved);
        if status.is_bad() {
            return status;
        }
        if inner.shelving.is_shelved() {
            return StatusCode::BadConditionAlreadyShelved;
        }
        let duration_ms = duration_ms as u64;
        inner.enter_shelved(ShelvingState::TimedShelved, duration_ms);
        if duration_ms != MAX_SHELVE_MS {
            let generation = inner.shelving.generation;
            inner.shelving.timer = Some(spawn_unshelve_timer(weak, duration_ms, generation));
        }
        inner
            .base
            .audit(AuditAction::TimedShelve, None, client_user_id);
        StatusCode::Good
    }

    /// Shelve the alarm until manually unshelved or MaxTimeShelved
    /// elapses. Without a configured MaxTimeShelved the shelve is
    /// indefinite.
    pub fn one_shot_shelve(&self) -> StatusCode {
        self.one_shot_shelve_by("")
    }

    /// [`one_shot_shelve`](Self::one_shot_shelve) on behalf of a user
    pub fn one_shot_shelve_by(&self, client_user_id: &str) -> StatusCode {
        let weak = Arc::downgrade(&self.inner);
        let mut inner = self.inner.lock();
        if inner.shelving.is_shelved() {
            return StatusCode::BadConditionAlreadyShelved;
        }
        let duration_ms = inner.max_time_shelved.unwrap_or(MAX_SHELVE_MS);
        inner.enter_shelved(ShelvingState::OneShotShelved, duration_ms);
        if duration_ms != MAX_SHELVE_MS {
            let generation = inner.shelving.generation;
            inner.shelving.timer = Some(spawn_unshelve_timer(weak, duration_ms, generation));
        }
        inner
            .base
            .audit(AuditAction::OneShotShelve, None, client_user_id);
        StatusCode::Good
    }

    /// Cancel shelving and return to Unshelved
    pub fn unshelve(&self) -> StatusCode {
        self.unshelve_by("")
    }

    /// [`unshelve`](Self::unshelve) on behalf of a user
    pub fn unshelve_by(&self, client_user_id: &str) -> StatusCode {
        let mut inner = self.inner.lock();
        if !inner.shelving.is_shelved() {
            return StatusCode::BadConditionNotShelved;
        }
        inner.unshelve_internal();
        inner.base.audit(AuditAction::Unshelve, None, client_user_id);
        StatusCode::Good
    }

    /// Remaining shelving time.
    ///
    /// `BadConditionNotShelved` while unshelved; the [`MAX_SHELVE_MS`]
    /// sentinel while shelved indefinitely; otherwise remaining
    /// milliseconds, floored at zero.
    pub fn unshelve_time(&self) -> DataValue {
        let inner = self.inner.lock();
        if !inner.shelving.is_shelved() {
            return DataValue::with_status(StatusCode::BadConditionNotShelved);
        }
        match inner.shelving.remaining_ms() {
            Some(ms) => DataValue::good(Variant::Float(ms as f64)),
            None => DataValue::good(Variant::Float(MAX_SHELVE_MS as f64)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duration_validation() {
        assert_eq!(validate_duration(5000.0, None), StatusCode::Good);
        assert_eq!(validate_duration(10.0, None), StatusCode::Good);
        assert_eq!(
            validate_duration(9.0, None),
            StatusCode::BadShelvingTimeOutOfRange
        );
        assert_eq!(
            validate_duration(-1.0, None),
            StatusCode::BadShelvingTimeOutOfRange
        );
        assert_eq!(
            validate_duration(f64::NAN, None),
            StatusCode::BadShelvingTimeOutOfRange
        );
        assert_eq!(
            validate_duration(MAX_SHELVE_MS as f64 + 1.0, None),
            StatusCode::BadShelvingTimeOutOfRange
        );
        // The sentinel itself is accepted (indefinite shelve).
        assert_eq!(validate_duration(MAX_SHELVE_MS as f64, None), StatusCode::Good);
    }

    #[test]
    fn test_duration_capped_by_max_time_shelved() {
        assert_eq!(validate_duration(5000.0, Some(10_000)), StatusCode::Good);
        assert_eq!(
            validate_duration(20_000.0, Some(10_000)),
            StatusCode::BadShelvingTimeOutOfRange
        );
    }

    #[test]
    fn test_remaining_ms_floors_at_zero() {
        let shelving = Shelving {
            state: ShelvingState::TimedShelved,
            shelved_at: Some(Instant::now() - Duration::from_millis(500)),
            duration_ms: 100,
            timer: None,
            generation: 0,
        };
        assert_eq!(shelving.remaining_ms(), Some(0));
    }

    #[test]
    fn test_indefinite_has_no_remaining() {
        let shelving = Shelving {
            state: ShelvingState::OneShotShelved,
            shelved_at: Some(Instant::now()),
            duration_ms: MAX_SHELVE_MS,
            timer: None,
            generation: 0,
        };
        assert_eq!(shelving.remaining_ms(), None);
    }
}
