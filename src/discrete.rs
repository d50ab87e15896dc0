// src/discrete.rs - Off-normal (discrete) alarm evaluation
//
// An off-normal alarm is active while the monitored input differs from the
// value of a designated normal-state variable. Strict equality over the
// variant values; numeric widening is deliberately not applied.

use crate::variant::Variant;

/// Compare the input against the normal-state value.
///
/// Returns `None` when either side is still null (nothing to compare yet,
/// the alarm stays put), otherwise whether the alarm is active.
pub fn evaluate_off_normal(input: &Variant, normal: &Variant) -> Option<bool> {
    if input.is_null() || normal.is_null() {
        return None;
    }
    Some(input != normal)
}
