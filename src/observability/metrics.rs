//! Metrics collection and exposition.
//!
//! # Metrics
//! - `monitor_probe_duration_seconds` (histogram): probe latency by component
//! - `monitor_probe_results_total` (counter): probe outcomes by component, status
//! - `monitor_circuit_breaker_state` (gauge): 0=closed, 1=half-open, 2=open
//! - `monitor_circuit_breaker_transitions_total` (counter): state changes by breaker
//! - `monitor_circuit_breaker_rejections_total` (counter): fast-failed calls
//! - `monitor_retry_attempts_total` / `monitor_retry_exhausted_total` (counters)
//! - `monitor_idempotency_requests_total` (counter): hit, miss, stored
//! - `monitor_idempotency_cached_operations` (gauge)
//! - `monitor_shutdown_hooks_total` (counter): hook outcomes
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade; without an installed
//!   recorder every call is a no-op
//! - The Prometheus recorder is installed once by the binary, not by the library

use std::time::Duration;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::health::state::HealthStatus;
use crate::resilience::circuit_breaker::CircuitState;

/// Install the Prometheus recorder and return a handle for rendering.
pub fn init_metrics() -> Option<PrometheusHandle> {
    match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => {
            tracing::info!("Prometheus metrics recorder installed");
            Some(handle)
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to install Prometheus recorder");
            None
        }
    }
}

pub fn record_probe(component: &str, status: HealthStatus, duration: Duration) {
    histogram!("monitor_probe_duration_seconds", "component" => component.to_string())
        .record(duration.as_secs_f64());
    counter!(
        "monitor_probe_results_total",
        "component" => component.to_string(),
        "status" => status.as_str()
    )
    .increment(1);
}

pub fn record_breaker_state(name: &str, state: CircuitState) {
    let value = match state {
        CircuitState::Closed => 0.0,
        CircuitState::HalfOpen => 1.0,
        CircuitState::Open => 2.0,
    };
    gauge!("monitor_circuit_breaker_state", "breaker" => name.to_string()).set(value);
}

pub fn record_breaker_transition(name: &str, to: CircuitState) {
    counter!(
        "monitor_circuit_breaker_transitions_total",
        "breaker" => name.to_string(),
        "to" => to.as_str()
    )
    .increment(1);
    record_breaker_state(name, to);
}

pub fn record_breaker_rejection(name: &str) {
    counter!("monitor_circuit_breaker_rejections_total", "breaker" => name.to_string())
        .increment(1);
}

pub fn record_retry_attempt(operation: &str) {
    counter!("monitor_retry_attempts_total", "operation" => operation.to_string()).increment(1);
}

pub fn record_retry_exhausted(operation: &str) {
    counter!("monitor_retry_exhausted_total", "operation" => operation.to_string()).increment(1);
}

pub fn record_idempotency_event(event: &'static str) {
    counter!("monitor_idempotency_requests_total", "event" => event).increment(1);
}

pub fn record_idempotency_size(size: usize) {
    gauge!("monitor_idempotency_cached_operations").set(size as f64);
}

pub fn record_shutdown_hook(outcome: &'static str) {
    counter!("monitor_shutdown_hooks_total", "outcome" => outcome).increment(1);
}
