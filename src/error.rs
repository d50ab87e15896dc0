use thiserror::Error;

/// Application level error type used throughout the crate.
///
/// Client-recoverable protocol failures (`BadConditionDisabled`,
/// `BadEventIdUnknown`, ...) are *not* errors: they are
/// [`StatusCode`](crate::status::StatusCode) values returned from method
/// calls. `ConditionError` covers configuration and environment failures
/// encountered while building conditions.
#[derive(Error, Debug)]
pub enum ConditionError {
    /// I/O related failure
    #[error("Io error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid or inconsistent configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Error while parsing YAML configuration files
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Requested node was not found in the address space
    #[error("Node not found: {0}")]
    NodeNotFound(String),

    /// Returned value type does not match the expected type
    #[error("Type mismatch: expected {expected}, got {actual}")]
    TypeMismatch {
        expected: &'static str,
        actual: &'static str,
    },
}

/// Convenient alias over [`Result`] using [`ConditionError`]
pub type Result<T> = std::result::Result<T, ConditionError>;
