//! SENTRA - Stateful Engine for Notifications, Tracking, and Alarms
//!
//! An OPC-UA style alarms & conditions engine built in Rust: condition
//! state machines with branch retention, acknowledge/confirm workflows,
//! timer-driven shelving, and threshold evaluation over live input
//! variables, all mirrored into an in-memory address space.
//!
//! # Examples
//!
//! ```rust,no_run
//! use sentra::{
//!     AddressSpace, AlarmOptions, AlarmVariant, ConditionRegistry, Limits, NodeId, Variant,
//!     VariantKind,
//! };
//!
//! sentra::init()?;
//!
//! let space = AddressSpace::new();
//! let registry = ConditionRegistry::new(space.clone());
//!
//! let tank = NodeId::string(1, "Tank");
//! let level = NodeId::string(1, "Tank.Level");
//! space.add_object(tank.clone(), "Tank")?;
//! space.add_variable(level.clone(), "Level", VariantKind::Float, Variant::Float(50.0))?;
//! space.register_event_source(&space.server_id(), &tank)?;
//!
//! let alarm = AlarmOptions::new(
//!     "TankLevelHigh",
//!     tank,
//!     level.clone(),
//!     AlarmVariant::NonExclusiveLimit(Limits {
//!         high: Some(80.0),
//!         ..Limits::default()
//!     }),
//! )
//! .max_time_shelved(10_000)
//! .instantiate(&registry)?;
//!
//! space.set_value_from_source(&level, Variant::Float(90.0))?;
//! assert!(alarm.active());
//! # Ok::<(), sentra::ConditionError>(())
//! ```

#![warn(missing_docs)]

// ============================================================================
// CORE MODULES
// ============================================================================

/// Structured error types and the crate-wide Result alias
pub mod error;

/// OPC-UA status codes for the protocol error channel
pub mod status;

/// Node identifiers and well-known ids from the standard namespace
pub mod node_id;

/// Typed variant values, localized text, and data values
pub mod variant;

/// Fixed schema of condition variables and two-state variables
pub mod fields;

/// Typed condition events and the synchronous event hub
pub mod events;

/// In-memory address-space collaborator
pub mod address_space;

/// Per-branch condition value snapshots with live branch-0 mirroring
pub mod snapshot;

/// Root condition state machine: enable/disable, branches, comments
pub mod condition;

/// Acknowledge and Confirm capability
pub mod acknowledge;

/// Alarm conditions: ActiveState, input monitoring, branch retention
pub mod alarm;

/// ShelvingStateMachine with cancellable auto-unshelve timers
pub mod shelving;

/// Numeric threshold evaluation for limit and deviation alarms
pub mod limit;

/// Off-normal (discrete) alarm evaluation
pub mod discrete;

/// Instantiation factories for conditions and alarms
pub mod builder;

/// Condition registry and ConditionRefresh
pub mod registry;

/// YAML alarm-set configuration
pub mod config;

// ============================================================================
// PUBLIC RE-EXPORTS
// ============================================================================

pub use address_space::{AddressSpace, ReferenceKind, SubscriptionId};
pub use alarm::Alarm;
pub use builder::{AlarmOptions, AlarmVariant, ConditionOptions, Optionals};
pub use condition::{BranchKey, Condition, ConditionInfo};
pub use config::{AlarmConfig, AlarmKindConfig, ConditionSetConfig};
pub use error::{ConditionError, Result};
pub use events::{AuditAction, AuditConditionEvent, ConditionEvent, EventData, EventHub};
pub use fields::{ConditionField, TwoState};
pub use limit::{LimitFlags, Limits};
pub use node_id::NodeId;
pub use registry::ConditionRegistry;
pub use shelving::{ShelvingState, MAX_SHELVE_MS, MIN_SHELVE_MS};
pub use snapshot::ConditionSnapshot;
pub use status::StatusCode;
pub use variant::{DataValue, LocalizedText, Variant, VariantKind};

// ============================================================================
// VERSION INFORMATION
// ============================================================================

/// SENTRA version string
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// SENTRA authors
pub const AUTHORS: &str = env!("CARGO_PKG_AUTHORS");

// ============================================================================
// INITIALIZATION
// ============================================================================

/// Initialize the SENTRA runtime.
///
/// Sets up the tracing subscriber from `RUST_LOG` (defaulting to
/// `sentra=info`) unless one is already installed. Safe to call more than
/// once.
pub fn init() -> Result<()> {
    #[cfg(not(test))]
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "sentra=info");
    }

    #[cfg(not(test))]
    {
        use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

        let subscriber = tracing_subscriber::registry()
            .with(tracing_subscriber::EnvFilter::from_default_env())
            .with(tracing_subscriber::fmt::layer().with_target(false));

        // Already initialized is fine.
        let _ = subscriber.try_init();
    }

    tracing::info!("SENTRA {} initialized", VERSION);
    Ok(())
}
