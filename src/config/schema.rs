//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the monitor.
//! All types derive Serde traits for deserialization from config files.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration for the resilience monitor.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Health probe settings.
    pub health: HealthConfig,

    /// Circuit breakers registered at startup, keyed by dependency name.
    pub circuit_breakers: BTreeMap<String, CircuitBreakerConfig>,

    /// Retry policies registered at startup, keyed by policy name.
    pub retry_policies: BTreeMap<String, RetryPolicyConfig>,

    /// Idempotency cache settings.
    pub idempotency: IdempotencyConfig,

    /// Graceful shutdown settings.
    pub shutdown: ShutdownConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        let mut circuit_breakers = BTreeMap::new();
        circuit_breakers.insert(
            "database".to_string(),
            CircuitBreakerConfig {
                failure_threshold: 3,
                recovery_timeout_secs: 30,
                ..Default::default()
            },
        );
        circuit_breakers.insert(
            "storage".to_string(),
            CircuitBreakerConfig {
                failure_threshold: 5,
                recovery_timeout_secs: 60,
                ..Default::default()
            },
        );

        let mut retry_policies = BTreeMap::new();
        retry_policies.insert(
            "database".to_string(),
            RetryPolicyConfig {
                max_attempts: 3,
                base_delay_ms: 100,
                max_delay_ms: 2000,
                ..Default::default()
            },
        );
        retry_policies.insert(
            "storage".to_string(),
            RetryPolicyConfig {
                max_attempts: 5,
                base_delay_ms: 200,
                max_delay_ms: 5000,
                ..Default::default()
            },
        );
        retry_policies.insert(
            "api".to_string(),
            RetryPolicyConfig {
                max_attempts: 2,
                base_delay_ms: 50,
                max_delay_ms: 1000,
                ..Default::default()
            },
        );

        Self {
            health: HealthConfig::default(),
            circuit_breakers,
            retry_policies,
            idempotency: IdempotencyConfig::default(),
            shutdown: ShutdownConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

/// Health probe configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct HealthConfig {
    /// Optional deadline applied to every probe, in milliseconds.
    /// Unset means probes run unbounded and must time out on their own.
    pub probe_timeout_ms: Option<u64>,
}

impl HealthConfig {
    pub fn probe_timeout(&self) -> Option<Duration> {
        self.probe_timeout_ms.map(Duration::from_millis)
    }
}

/// Circuit breaker configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that open the circuit.
    pub failure_threshold: u32,

    /// Seconds the circuit stays open before a trial call is admitted.
    pub recovery_timeout_secs: u64,

    /// Trial calls allowed in flight while half-open.
    pub half_open_max_calls: u32,
}

impl CircuitBreakerConfig {
    pub fn recovery_timeout(&self) -> Duration {
        Duration::from_secs(self.recovery_timeout_secs)
    }
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout_secs: 60,
            half_open_max_calls: 1,
        }
    }
}

/// Retry policy configuration.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryPolicyConfig {
    /// Total attempts, including the first one.
    pub max_attempts: u32,

    /// Base delay for exponential backoff in milliseconds.
    pub base_delay_ms: u64,

    /// Maximum delay for exponential backoff in milliseconds.
    pub max_delay_ms: u64,

    /// Growth factor applied per failed attempt.
    pub exponential_base: f64,

    /// Scale each delay by a random factor in [0.5, 1.0].
    pub jitter: bool,
}

impl Default for RetryPolicyConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 100,
            max_delay_ms: 5000,
            exponential_base: 2.0,
            jitter: true,
        }
    }
}

/// Idempotency cache configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct IdempotencyConfig {
    /// How long a stored result stays valid, in seconds.
    pub ttl_secs: u64,

    /// Interval of the background sweep in seconds. Disabled when unset.
    pub sweep_interval_secs: Option<u64>,
}

impl IdempotencyConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn sweep_interval(&self) -> Option<Duration> {
        self.sweep_interval_secs.map(Duration::from_secs)
    }
}

impl Default for IdempotencyConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 24 * 60 * 60,
            sweep_interval_secs: None,
        }
    }
}

/// Graceful shutdown configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ShutdownConfig {
    /// Deadline for each individual shutdown hook, in seconds.
    pub hook_timeout_secs: u64,
}

impl ShutdownConfig {
    pub fn hook_timeout(&self) -> Duration {
        Duration::from_secs(self.hook_timeout_secs)
    }
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            hook_timeout_secs: 30,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Emit logs as JSON lines instead of human-readable text.
    pub json_logs: bool,

    /// Install the Prometheus metrics recorder.
    pub metrics_enabled: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
            metrics_enabled: true,
        }
    }
}
