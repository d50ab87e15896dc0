// src/fields.rs - Fixed schema of condition variables
//
// Condition variables are addressed by a closed field enum rather than by
// dotted-string browse paths; the browse path is derived from the enum for
// event payloads and address-space mirroring. Two-state variables (a
// boolean Id plus a localized-text display value) are a separate enum.

use serde::{Deserialize, Serialize};

/// Scalar condition variables.
///
/// Which fields a given condition instance materializes depends on its
/// type and on the optionals requested at instantiation; the enum is the
/// superset across all supported condition types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ConditionField {
    /// Opaque per-event identifier, regenerated whenever an event is raised
    EventId,
    /// NodeId of the condition's event type
    EventType,
    /// NodeId of the branch this snapshot represents (null for branch 0)
    BranchId,
    /// NodeId of the node the condition is about
    SourceNode,
    /// Browse name of the source node
    SourceName,
    /// Condition instance name
    ConditionName,
    /// Condition class id
    ConditionClassId,
    /// Condition class display name
    ConditionClassName,
    /// Event time
    Time,
    /// Receive time
    ReceiveTime,
    /// Local time offset information
    LocalTime,
    /// Event message
    Message,
    /// Event severity (0-1000)
    Severity,
    /// Severity before the most recent severity change
    LastSeverity,
    /// Condition quality
    Quality,
    /// Operator comment
    Comment,
    /// User that performed the last comment/acknowledge/confirm
    ClientUserId,
    /// Whether the condition is interesting enough to keep reporting
    Retain,
    /// Derived visibility hint: suppressed or shelved
    SuppressedOrShelved,
    /// Upper bound for shelving requests, milliseconds
    MaxTimeShelved,
    /// Remaining shelving time, milliseconds (computed)
    UnshelveTime,
    /// Current shelving state display value (`ShelvingState.CurrentState`)
    ShelvingStateCurrent,
    /// Current exclusive limit state display value (`LimitState.CurrentState`)
    LimitStateCurrent,
    /// NodeId of the monitored input variable
    InputNode,
    /// HighHigh threshold
    HighHighLimit,
    /// High threshold
    HighLimit,
    /// Low threshold
    LowLimit,
    /// LowLow threshold
    LowLowLimit,
    /// NodeId of the monitored setpoint variable (deviation alarms)
    SetpointNode,
    /// NodeId of the normal-state reference variable (off-normal alarms)
    NormalState,
}

impl ConditionField {
    /// Browse path of the field relative to the condition node
    pub fn browse_path(self) -> &'static str {
        match self {
            ConditionField::EventId => "EventId",
            ConditionField::EventType => "EventType",
            ConditionField::BranchId => "BranchId",
            ConditionField::SourceNode => "SourceNode",
            ConditionField::SourceName => "SourceName",
            ConditionField::ConditionName => "ConditionName",
            ConditionField::ConditionClassId => "ConditionClassId",
            ConditionField::ConditionClassName => "ConditionClassName",
            ConditionField::Time => "Time",
            ConditionField::ReceiveTime => "ReceiveTime",
            ConditionField::LocalTime => "LocalTime",
            ConditionField::Message => "Message",
            ConditionField::Severity => "Severity",
            ConditionField::LastSeverity => "LastSeverity",
            ConditionField::Quality => "Quality",
            ConditionField::Comment => "Comment",
            ConditionField::ClientUserId => "ClientUserId",
            ConditionField::Retain => "Retain",
            ConditionField::SuppressedOrShelved => "SuppressedOrShelved",
            ConditionField::MaxTimeShelved => "MaxTimeShelved",
            ConditionField::UnshelveTime => "ShelvingState.UnshelveTime",
            ConditionField::ShelvingStateCurrent => "ShelvingState.CurrentState",
            ConditionField::LimitStateCurrent => "LimitState.CurrentState",
            ConditionField::InputNode => "InputNode",
            ConditionField::HighHighLimit => "HighHighLimit",
            ConditionField::HighLimit => "HighLimit",
            ConditionField::LowLimit => "LowLimit",
            ConditionField::LowLowLimit => "LowLowLimit",
            ConditionField::SetpointNode => "SetpointNode",
            ConditionField::NormalState => "NormalState",
        }
    }

    /// Fields that keep returning their real value while the condition is
    /// disabled. Everything else reads as `BadConditionDisabled`.
    pub fn readable_when_disabled(self) -> bool {
        matches!(
            self,
            ConditionField::BranchId
                | ConditionField::EventId
                | ConditionField::EventType
                | ConditionField::SourceNode
                | ConditionField::SourceName
                | ConditionField::Time
                | ConditionField::ConditionClassId
                | ConditionField::ConditionClassName
                | ConditionField::ConditionName
        )
    }
}

/// Two-state condition variables.
///
/// Each one is a boolean `Id` plus a synchronized localized-text display
/// value ("Active"/"Inactive" and so on).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TwoState {
    /// EnabledState (mandatory on every condition)
    Enabled,
    /// AckedState (acknowledgeable conditions)
    Acked,
    /// ConfirmedState (optional)
    Confirmed,
    /// ActiveState (alarms)
    Active,
    /// SuppressedState (optional)
    Suppressed,
    /// LatchedState (optional)
    Latched,
    /// OutOfServiceState (optional)
    OutOfService,
    /// SilentState (optional)
    Silent,
    /// HighHighState (non-exclusive limit alarms)
    HighHigh,
    /// HighState (non-exclusive limit alarms)
    High,
    /// LowState (non-exclusive limit alarms)
    Low,
    /// LowLowState (non-exclusive limit alarms)
    LowLow,
}

impl TwoState {
    /// Browse name of the state variable
    pub fn browse_name(self) -> &'static str {
        match self {
            TwoState::Enabled => "EnabledState",
            TwoState::Acked => "AckedState",
            TwoState::Confirmed => "ConfirmedState",
            TwoState::Active => "ActiveState",
            TwoState::Suppressed => "SuppressedState",
            TwoState::Latched => "LatchedState",
            TwoState::OutOfService => "OutOfServiceState",
            TwoState::Silent => "SilentState",
            TwoState::HighHigh => "HighHighState",
            TwoState::High => "HighState",
            TwoState::Low => "LowState",
            TwoState::LowLow => "LowLowState",
        }
    }

    /// Browse path of the boolean `Id` property
    pub fn id_path(self) -> &'static str {
        match self {
            TwoState::Enabled => "EnabledState.Id",
            TwoState::Acked => "AckedState.Id",
            TwoState::Confirmed => "ConfirmedState.Id",
            TwoState::Active => "ActiveState.Id",
            TwoState::Suppressed => "SuppressedState.Id",
            TwoState::Latched => "LatchedState.Id",
            TwoState::OutOfService => "OutOfServiceState.Id",
            TwoState::Silent => "SilentState.Id",
            TwoState::HighHigh => "HighHighState.Id",
            TwoState::High => "HighState.Id",
            TwoState::Low => "LowState.Id",
            TwoState::LowLow => "LowLowState.Id",
        }
    }

    /// Display text for the true state
    pub fn true_text(self) -> &'static str {
        match self {
            TwoState::Enabled => "Enabled",
            TwoState::Acked => "Acknowledged",
            TwoState::Confirmed => "Confirmed",
            TwoState::Active => "Active",
            TwoState::Suppressed => "Suppressed",
            TwoState::Latched => "Latched",
            TwoState::OutOfService => "Out of Service",
            TwoState::Silent => "Silent",
            TwoState::HighHigh => "HighHigh active",
            TwoState::High => "High active",
            TwoState::Low => "Low active",
            TwoState::LowLow => "LowLow active",
        }
    }

    /// Display text for the false state
    pub fn false_text(self) -> &'static str {
        match self {
            TwoState::Enabled => "Disabled",
            TwoState::Acked => "Unacknowledged",
            TwoState::Confirmed => "Unconfirmed",
            TwoState::Active => "Inactive",
            TwoState::Suppressed => "Unsuppressed",
            TwoState::Latched => "Unlatched",
            TwoState::OutOfService => "In Service",
            TwoState::Silent => "Not Silent",
            TwoState::HighHigh => "HighHigh inactive",
            TwoState::High => "High inactive",
            TwoState::Low => "Low inactive",
            TwoState::LowLow => "LowLow inactive",
        }
    }

    /// Only EnabledState stays readable while the condition is disabled
    pub fn readable_when_disabled(self) -> bool {
        matches!(self, TwoState::Enabled)
    }
}
