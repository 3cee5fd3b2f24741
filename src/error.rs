//! Crate-level error types.

use thiserror::Error;

use crate::config::ConfigError;

/// Boxed error returned by probes and shutdown hooks.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors raised by registry management actions.
#[derive(Debug, Error)]
pub enum MonitorError {
    /// No breaker is registered under the requested name.
    #[error("circuit breaker '{name}' not found (available: {})", available.join(", "))]
    UnknownBreaker { name: String, available: Vec<String> },

    #[error(transparent)]
    Config(#[from] ConfigError),
}
