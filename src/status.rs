// src/status.rs - OPC-UA status codes used by the condition layer
//
// Status codes are the protocol-level error channel: every bound method
// returns one instead of throwing across the method boundary.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Subset of the OPC-UA StatusCode space used by the alarms & conditions
/// model.
///
/// The numeric values are the standard OPC-UA code values (severity in the
/// top two bits, sub-code in bits 16..28).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u32)]
pub enum StatusCode {
    /// Operation succeeded
    Good = 0x0000_0000,

    /// The input value is not yet available (monitored item warming up)
    BadWaitingForInitialData = 0x8032_0000,

    /// The supplied node id is syntactically invalid
    BadNodeIdInvalid = 0x8033_0000,

    /// The supplied node id refers to no known node
    BadNodeIdUnknown = 0x8034_0000,

    /// A numeric argument is outside its permitted range
    BadOutOfRange = 0x803C_0000,

    /// A value was supplied with the wrong data type
    BadTypeMismatch = 0x8074_0000,

    /// The method id does not refer to a method of the specified object
    BadMethodInvalid = 0x8075_0000,

    /// A ConditionRefresh is already in progress for this address space
    BadRefreshInProgress = 0x8097_0000,

    /// Disable was called on an already disabled condition
    BadConditionAlreadyDisabled = 0x8098_0000,

    /// The operation is not permitted while the condition is disabled;
    /// also the masking sentinel returned when reading most fields of a
    /// disabled condition
    BadConditionDisabled = 0x8099_0000,

    /// No retained branch matches the supplied event id
    BadEventIdUnknown = 0x809A_0000,

    /// Enable was called on an already enabled condition
    BadConditionAlreadyEnabled = 0x80CC_0000,

    /// Acknowledge was called on an already acknowledged branch
    BadConditionBranchAlreadyAcked = 0x80CF_0000,

    /// Confirm was called on an already confirmed branch
    BadConditionBranchAlreadyConfirmed = 0x80D0_0000,

    /// A shelving request arrived while the alarm was already shelved
    BadConditionAlreadyShelved = 0x80D1_0000,

    /// Unshelve (or an UnshelveTime read) arrived while unshelved
    BadConditionNotShelved = 0x80D2_0000,

    /// The requested shelving duration is outside `[10, 2^31)` ms or
    /// exceeds the alarm's MaxTimeShelved
    BadShelvingTimeOutOfRange = 0x80D3_0000,
}

impl StatusCode {
    /// Raw OPC-UA numeric value of this code
    pub fn raw(self) -> u32 {
        self as u32
    }

    /// True for the Good severity class
    pub fn is_good(self) -> bool {
        matches!(self, StatusCode::Good)
    }

    /// True for the Bad severity class
    pub fn is_bad(self) -> bool {
        self.raw() & 0x8000_0000 != 0
    }

    /// Symbolic name, as it appears in event payloads and logs
    pub fn name(self) -> &'static str {
        match self {
            StatusCode::Good => "Good",
            StatusCode::BadWaitingForInitialData => "BadWaitingForInitialData",
            StatusCode::BadNodeIdInvalid => "BadNodeIdInvalid",
            StatusCode::BadNodeIdUnknown => "BadNodeIdUnknown",
            StatusCode::BadOutOfRange => "BadOutOfRange",
            StatusCode::BadTypeMismatch => "BadTypeMismatch",
            StatusCode::BadMethodInvalid => "BadMethodInvalid",
            StatusCode::BadRefreshInProgress => "BadRefreshInProgress",
            StatusCode::BadConditionAlreadyDisabled => "BadConditionAlreadyDisabled",
            StatusCode::BadConditionDisabled => "BadConditionDisabled",
            StatusCode::BadEventIdUnknown => "BadEventIdUnknown",
            StatusCode::BadConditionAlreadyEnabled => "BadConditionAlreadyEnabled",
            StatusCode::BadConditionBranchAlreadyAcked => "BadConditionBranchAlreadyAcked",
            StatusCode::BadConditionBranchAlreadyConfirmed => {
                "BadConditionBranchAlreadyConfirmed"
            }
            StatusCode::BadConditionAlreadyShelved => "BadConditionAlreadyShelved",
            StatusCode::BadConditionNotShelved => "BadConditionNotShelved",
            StatusCode::BadShelvingTimeOutOfRange => "BadShelvingTimeOutOfRange",
        }
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (0x{:08X})", self.name(), self.raw())
    }
}

impl Default for StatusCode {
    fn default() -> Self {
        StatusCode::Good
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_class() {
        assert!(StatusCode::Good.is_good());
        assert!(!StatusCode::Good.is_bad());
        assert!(StatusCode::BadConditionDisabled.is_bad());
        assert!(StatusCode::BadShelvingTimeOutOfRange.is_bad());
    }

    #[test]
    fn test_raw_values() {
        assert_eq!(StatusCode::Good.raw(), 0);
        assert_eq!(StatusCode::BadConditionAlreadyDisabled.raw(), 0x8098_0000);
        assert_eq!(StatusCode::BadConditionDisabled.raw(), 0x8099_0000);
        assert_eq!(StatusCode::BadEventIdUnknown.raw(), 0x809A_0000);
        assert_eq!(
            StatusCode::BadConditionBranchAlreadyAcked.raw(),
            0x80CF_0000
        );
    }

    #[test]
    fn test_display() {
        let s = StatusCode::BadRefreshInProgress.to_string();
        assert!(s.contains("BadRefreshInProgress"));
        assert!(s.contains("0x80970000"));
    }
}
