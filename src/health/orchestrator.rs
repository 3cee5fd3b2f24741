//! Health orchestration.
//!
//! # Responsibilities
//! - Hold the named probe, readiness and liveness registries
//! - Hold the named circuit breaker and retry policy registries
//! - Run probes (one, or all concurrently) and aggregate their results
//!
//! # Design Decisions
//! - Re-registering a name replaces the previous entry
//! - Probes never crash the orchestrator: errors, panics and overruns become Unhealthy
//! - Fan-out is cooperative (`join_all` on the calling task); a slow probe only
//!   delays its own result, and nothing is cancelled when another probe fails
//! - Breakers are never wrapped around probes automatically

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use futures_util::future::join_all;
use serde_json::Map;
use tokio::time::Instant;

use crate::config::schema::CircuitBreakerConfig;
use crate::error::MonitorError;
use crate::health::probe::{run_probe, Probe};
use crate::health::report::{HealthReport, LivenessReport, ReadinessReport};
use crate::health::state::{aggregate_status, HealthCheckResult, HealthStatus};
use crate::observability::metrics;
use crate::resilience::circuit_breaker::{BreakerError, BreakerSnapshot, CircuitBreaker};
use crate::resilience::retries::{RetryExecutor, RetryPolicy};

/// Name-keyed set of probes of one kind.
struct ProbeRegistry {
    kind: &'static str,
    entries: DashMap<String, Arc<dyn Probe>>,
}

impl ProbeRegistry {
    fn new(kind: &'static str) -> Self {
        Self {
            kind,
            entries: DashMap::new(),
        }
    }

    fn register(&self, name: String, probe: Arc<dyn Probe>) {
        let replaced = self.entries.insert(name.clone(), probe).is_some();
        tracing::info!(kind = self.kind, name = %name, replaced, "Registered check");
    }

    fn get(&self, name: &str) -> Option<Arc<dyn Probe>> {
        self.entries.get(name).map(|entry| Arc::clone(entry.value()))
    }

    fn snapshot(&self) -> Vec<(String, Arc<dyn Probe>)> {
        self.entries
            .iter()
            .map(|entry| (entry.key().clone(), Arc::clone(entry.value())))
            .collect()
    }

    fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.entries.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }
}

/// Registries of probes, breakers and retry policies.
pub struct HealthOrchestrator {
    probes: ProbeRegistry,
    readiness: ProbeRegistry,
    liveness: ProbeRegistry,
    breakers: DashMap<String, Arc<CircuitBreaker>>,
    policies: DashMap<String, RetryPolicy>,
    probe_timeout: Option<Duration>,
}

impl HealthOrchestrator {
    /// Create empty registries. `probe_timeout` bounds every probe when set.
    pub fn new(probe_timeout: Option<Duration>) -> Self {
        Self {
            probes: ProbeRegistry::new("health"),
            readiness: ProbeRegistry::new("readiness"),
            liveness: ProbeRegistry::new("liveness"),
            breakers: DashMap::new(),
            policies: DashMap::new(),
            probe_timeout,
        }
    }

    // --- Probes ---

    pub fn register_probe(&self, name: impl Into<String>, probe: impl Probe + 'static) {
        self.probes.register(name.into(), Arc::new(probe));
    }

    pub fn register_readiness_check(&self, name: impl Into<String>, probe: impl Probe + 'static) {
        self.readiness.register(name.into(), Arc::new(probe));
    }

    pub fn register_liveness_check(&self, name: impl Into<String>, probe: impl Probe + 'static) {
        self.liveness.register(name.into(), Arc::new(probe));
    }

    pub fn probe_names(&self) -> Vec<String> {
        self.probes.names()
    }

    /// Run the probe registered under `name`.
    pub async fn check_one(&self, name: &str) -> HealthCheckResult {
        match self.probes.get(name) {
            Some(probe) => self.run_check(name.to_string(), probe).await,
            None => HealthCheckResult::unknown(name),
        }
    }

    /// Run every registered probe concurrently.
    pub async fn check_all(&self) -> BTreeMap<String, HealthCheckResult> {
        self.fan_out(&self.probes).await
    }

    /// Combine results with the fixed aggregation rule.
    pub fn aggregate(results: &BTreeMap<String, HealthCheckResult>) -> HealthStatus {
        aggregate_status(results.values().map(|r| r.status))
    }

    /// Aggregate health plus breaker states.
    pub async fn overall(&self) -> HealthReport {
        let components = self.check_all().await;
        HealthReport {
            status: Self::aggregate(&components),
            timestamp: Utc::now(),
            components,
            circuit_breakers: self
                .breakers()
                .into_iter()
                .map(|snapshot| (snapshot.name.clone(), snapshot))
                .collect(),
        }
    }

    pub async fn readiness(&self) -> ReadinessReport {
        let checks = self.fan_out(&self.readiness).await;
        let status = Self::aggregate(&checks);
        ReadinessReport {
            ready: status == HealthStatus::Healthy,
            status,
            timestamp: Utc::now(),
            checks,
        }
    }

    pub async fn liveness(&self) -> LivenessReport {
        let checks = self.fan_out(&self.liveness).await;
        let status = Self::aggregate(&checks);
        LivenessReport {
            alive: status == HealthStatus::Healthy,
            status,
            timestamp: Utc::now(),
            checks,
        }
    }

    async fn fan_out(&self, registry: &ProbeRegistry) -> BTreeMap<String, HealthCheckResult> {
        let checks = registry
            .snapshot()
            .into_iter()
            .map(|(name, probe)| self.run_check(name, probe));

        join_all(checks)
            .await
            .into_iter()
            .map(|result| (result.component.clone(), result))
            .collect()
    }

    async fn run_check(&self, component: String, probe: Arc<dyn Probe>) -> HealthCheckResult {
        let started = Instant::now();
        let outcome = run_probe(probe, self.probe_timeout).await;
        let duration = started.elapsed();

        let result = match outcome {
            Ok(report) => HealthCheckResult {
                status: if report.passed {
                    HealthStatus::Healthy
                } else {
                    HealthStatus::Unhealthy
                },
                component,
                timestamp: Utc::now(),
                duration,
                details: report.details,
                error: None,
            },
            Err(failure) => {
                tracing::error!(component = %component, error = %failure, "Health check failed");
                HealthCheckResult {
                    component,
                    status: HealthStatus::Unhealthy,
                    timestamp: Utc::now(),
                    duration,
                    details: Map::new(),
                    error: Some(failure.to_string()),
                }
            }
        };

        metrics::record_probe(&result.component, result.status, duration);
        result
    }

    // --- Circuit breakers ---

    /// Register (or replace) a closed breaker under `name`.
    pub fn register_breaker(
        &self,
        name: impl Into<String>,
        config: CircuitBreakerConfig,
    ) -> Arc<CircuitBreaker> {
        let name = name.into();
        let breaker = Arc::new(CircuitBreaker::new(name.clone(), config));
        self.breakers.insert(name.clone(), Arc::clone(&breaker));
        tracing::info!(
            name = %name,
            failure_threshold = config.failure_threshold,
            recovery_timeout_secs = config.recovery_timeout_secs,
            "Registered circuit breaker"
        );
        breaker
    }

    pub fn breaker(&self, name: &str) -> Option<Arc<CircuitBreaker>> {
        self.breakers.get(name).map(|entry| Arc::clone(entry.value()))
    }

    /// Snapshots of every breaker, sorted by name.
    pub fn breakers(&self) -> Vec<BreakerSnapshot> {
        let mut snapshots: Vec<BreakerSnapshot> =
            self.breakers.iter().map(|entry| entry.value().snapshot()).collect();
        snapshots.sort_by(|a, b| a.name.cmp(&b.name));
        snapshots
    }

    /// Force a breaker closed, returning its state before the reset.
    pub fn reset_breaker(&self, name: &str) -> Result<BreakerSnapshot, MonitorError> {
        let breaker = self.breaker(name).ok_or_else(|| {
            let mut available: Vec<String> = self.breakers.iter().map(|e| e.key().clone()).collect();
            available.sort();
            MonitorError::UnknownBreaker {
                name: name.to_string(),
                available,
            }
        })?;

        let previous = breaker.snapshot();
        breaker.reset();
        Ok(previous)
    }

    /// Run `op` under the breaker named `name`, or unguarded if none exists.
    pub async fn guarded<F, Fut, T, E>(&self, name: &str, op: F) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        match self.breaker(name) {
            Some(breaker) => breaker.call(op).await,
            None => op().await.map_err(BreakerError::Inner),
        }
    }

    // --- Retry policies ---

    pub fn register_retry_policy(&self, name: impl Into<String>, policy: RetryPolicy) {
        let name = name.into();
        tracing::info!(
            name = %name,
            max_attempts = policy.max_attempts,
            "Registered retry policy"
        );
        self.policies.insert(name, policy);
    }

    /// Policy registered under `name`, or the default policy.
    pub fn retry_policy(&self, name: &str) -> RetryPolicy {
        self.policies
            .get(name)
            .map(|entry| *entry.value())
            .unwrap_or_default()
    }

    pub fn retry_policies(&self) -> BTreeMap<String, RetryPolicy> {
        self.policies
            .iter()
            .map(|entry| (entry.key().clone(), *entry.value()))
            .collect()
    }

    /// Retry `op` under the policy registered as `policy_name`.
    pub async fn retry_with<F, Fut, T, E>(&self, policy_name: &str, op: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Debug,
    {
        RetryExecutor::new(policy_name, self.retry_policy(policy_name))
            .run(op)
            .await
    }
}

impl Default for HealthOrchestrator {
    fn default() -> Self {
        Self::new(None)
    }
}
