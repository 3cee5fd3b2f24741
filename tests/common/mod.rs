//! Shared utilities for integration and load testing.

#![allow(dead_code)]

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use resilience_monitor::config::{CircuitBreakerConfig, RetryPolicyConfig};
use resilience_monitor::error::BoxError;
use resilience_monitor::health::{probe_fn, Probe, ProbeReport};
use resilience_monitor::resilience::RetryPolicy;

/// Shared invocation counter for synthetic operations.
#[derive(Clone, Default)]
pub struct CallCounter(Arc<AtomicU32>);

impl CallCounter {
    /// Record one call and return the new total.
    pub fn hit(&self) -> u32 {
        self.0.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn count(&self) -> u32 {
        self.0.load(Ordering::SeqCst)
    }
}

/// Operation that fails its first `failures` calls, then returns the call number.
pub fn flaky(counter: &CallCounter, failures: u32) -> impl FnMut() -> std::future::Ready<Result<u32, String>> {
    let counter = counter.clone();
    move || {
        let n = counter.hit();
        std::future::ready(if n <= failures {
            Err(format!("failure {n}"))
        } else {
            Ok(n)
        })
    }
}

/// Probe that always reports `passed`.
pub fn fixed_probe(passed: bool) -> impl Probe {
    probe_fn(move || async move {
        Ok(if passed {
            ProbeReport::pass()
        } else {
            ProbeReport::fail().with_detail("reason", "injected failure")
        })
    })
}

/// Probe that passes after sleeping for `delay`.
pub fn slow_probe(delay: Duration) -> impl Probe {
    probe_fn(move || async move {
        tokio::time::sleep(delay).await;
        Ok(ProbeReport::pass())
    })
}

/// Probe that errors instead of reporting.
pub fn erroring_probe(message: &'static str) -> impl Probe {
    probe_fn(move || async move { Err::<ProbeReport, BoxError>(message.into()) })
}

pub fn breaker_config(failure_threshold: u32, recovery_timeout_secs: u64) -> CircuitBreakerConfig {
    CircuitBreakerConfig {
        failure_threshold,
        recovery_timeout_secs,
        ..Default::default()
    }
}

/// Deterministic policy for timing assertions.
pub fn fixed_policy(max_attempts: u32, base_delay_ms: u64) -> RetryPolicy {
    RetryPolicyConfig {
        max_attempts,
        base_delay_ms,
        max_delay_ms: 10_000,
        exponential_base: 2.0,
        jitter: false,
    }
    .into()
}
