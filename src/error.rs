//! Error types for the throttling engine.

use thiserror::Error;

use crate::throttle::Category;

/// Main error type for throttling operations.
///
/// Allowed and denied decisions are not errors; these variants only describe
/// misconfiguration and internal faults.
#[derive(Error, Debug)]
pub enum ThrottleError {
    /// Invalid policy or engine configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// A category was referenced that the registry has no policy for
    #[error("Unknown category: {0}")]
    UnknownCategory(Category),

    /// Non-monotonic clock reading or negative duration
    #[error("Clock error: {0}")]
    Clock(String),

    /// Engine started after it was stopped, or without a runtime
    #[error("Lifecycle error: {0}")]
    Lifecycle(String),

    /// Errors raised while layering configuration sources
    #[error("Configuration source error: {0}")]
    ConfigSource(#[from] config::ConfigError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for throttling operations.
pub type Result<T> = std::result::Result<T, ThrottleError>;
