//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (thresholds > 0, delays ordered, TTL > 0)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: MonitorConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use thiserror::Error;

use crate::config::schema::MonitorConfig;

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// A single semantic problem found in a configuration.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("circuit breaker '{0}': failure_threshold must be at least 1")]
    ZeroFailureThreshold(String),

    #[error("circuit breaker '{0}': half_open_max_calls must be at least 1")]
    ZeroHalfOpenCalls(String),

    #[error("retry policy '{0}': max_attempts must be at least 1")]
    ZeroAttempts(String),

    #[error("retry policy '{name}': base_delay_ms ({base_ms}) exceeds max_delay_ms ({max_ms})")]
    DelayOrder { name: String, base_ms: u64, max_ms: u64 },

    #[error("retry policy '{name}': exponential_base must be a finite number >= 1.0, got {value}")]
    InvalidExponentialBase { name: String, value: f64 },

    #[error("idempotency.ttl_secs must be greater than zero")]
    ZeroTtl,

    #[error("idempotency.sweep_interval_secs must be greater than zero when set")]
    ZeroSweepInterval,

    #[error("health.probe_timeout_ms must be greater than zero when set")]
    ZeroProbeTimeout,

    #[error("unknown log level '{0}'")]
    UnknownLogLevel(String),
}

/// Check a configuration, collecting every violation.
pub fn validate_config(config: &MonitorConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    for (name, breaker) in &config.circuit_breakers {
        if breaker.failure_threshold == 0 {
            errors.push(ValidationError::ZeroFailureThreshold(name.clone()));
        }
        if breaker.half_open_max_calls == 0 {
            errors.push(ValidationError::ZeroHalfOpenCalls(name.clone()));
        }
    }

    for (name, policy) in &config.retry_policies {
        if policy.max_attempts == 0 {
            errors.push(ValidationError::ZeroAttempts(name.clone()));
        }
        if policy.base_delay_ms > policy.max_delay_ms {
            errors.push(ValidationError::DelayOrder {
                name: name.clone(),
                base_ms: policy.base_delay_ms,
                max_ms: policy.max_delay_ms,
            });
        }
        if !policy.exponential_base.is_finite() || policy.exponential_base < 1.0 {
            errors.push(ValidationError::InvalidExponentialBase {
                name: name.clone(),
                value: policy.exponential_base,
            });
        }
    }

    if config.idempotency.ttl_secs == 0 {
        errors.push(ValidationError::ZeroTtl);
    }
    if config.idempotency.sweep_interval_secs == Some(0) {
        errors.push(ValidationError::ZeroSweepInterval);
    }
    if config.health.probe_timeout_ms == Some(0) {
        errors.push(ValidationError::ZeroProbeTimeout);
    }

    let level = config.observability.log_level.to_ascii_lowercase();
    if !LOG_LEVELS.contains(&level.as_str()) {
        errors.push(ValidationError::UnknownLogLevel(
            config.observability.log_level.clone(),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
