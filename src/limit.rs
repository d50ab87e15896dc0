// src/limit.rs - Numeric threshold evaluation for limit alarms
//
// Pure functions: threshold configuration plus an input value in, a
// resolved limit picture out. The alarm layer turns the picture into
// condition transitions; nothing here touches condition state.

use crate::fields::TwoState;

/// The four optional limit thresholds of a limit alarm. At least one must
/// be configured.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Limits {
    /// HighHigh threshold
    pub high_high: Option<f64>,
    /// High threshold
    pub high: Option<f64>,
    /// Low threshold
    pub low: Option<f64>,
    /// LowLow threshold
    pub low_low: Option<f64>,
}

impl Limits {
    /// True when no threshold is configured
    pub fn is_empty(&self) -> bool {
        self.high_high.is_none()
            && self.high.is_none()
            && self.low.is_none()
            && self.low_low.is_none()
    }
}

/// Which thresholds a value currently violates (non-exclusive picture)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LimitFlags {
    /// Value exceeds HighHighLimit
    pub high_high: bool,
    /// Value exceeds HighLimit
    pub high: bool,
    /// Value is below LowLimit
    pub low: bool,
    /// Value is below LowLowLimit
    pub low_low: bool,
}

impl LimitFlags {
    /// True when any threshold is violated
    pub fn any(&self) -> bool {
        self.high_high || self.high || self.low || self.low_low
    }

    /// The most severe violated threshold, in the order
    /// HighHigh, LowLow, High, Low
    pub fn most_severe(&self) -> Option<TwoState> {
        if self.high_high {
            Some(TwoState::HighHigh)
        } else if self.low_low {
            Some(TwoState::LowLow)
        } else if self.high {
            Some(TwoState::High)
        } else if self.low {
            Some(TwoState::Low)
        } else {
            None
        }
    }
}

/// Evaluate every configured threshold independently. Any subset may be
/// violated at the same time.
pub fn evaluate_non_exclusive(limits: &Limits, value: f64) -> LimitFlags {
    LimitFlags {
        high_high: limits.high_high.is_some_and(|limit| value > limit),
        high: limits.high.is_some_and(|limit| value > limit),
        low: limits.low.is_some_and(|limit| value < limit),
        low_low: limits.low_low.is_some_and(|limit| value < limit),
    }
}

/// Resolve the single exclusive limit state, in strict priority order:
/// HighHigh before High, LowLow before Low. At most one state holds.
pub fn evaluate_exclusive(limits: &Limits, value: f64) -> Option<TwoState> {
    if limits.high_high.is_some_and(|limit| value > limit) {
        Some(TwoState::HighHigh)
    } else if limits.low_low.is_some_and(|limit| value < limit) {
        Some(TwoState::LowLow)
    } else if limits.high.is_some_and(|limit| value > limit) {
        Some(TwoState::High)
    } else if limits.low.is_some_and(|limit| value < limit) {
        Some(TwoState::Low)
    } else {
        None
    }
}
