//! The process-wide resilience registry.
//!
//! # Responsibilities
//! - Build the orchestrator, idempotency cache and shutdown coordinator from config
//! - Register the configured breakers and retry policies
//! - Run background maintenance (idempotency sweep) until shutdown
//!
//! # Design Decisions
//! - Built once at startup and passed by reference; there are no globals
//! - Cached idempotent results are stored as JSON values so any handler can share the cache

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};

use crate::config::schema::MonitorConfig;
use crate::health::orchestrator::HealthOrchestrator;
use crate::health::report::HealthSummary;
use crate::lifecycle::shutdown::ShutdownCoordinator;
use crate::resilience::idempotency::IdempotencyCache;
use crate::resilience::retries::RetryPolicy;

pub struct Monitor {
    config: MonitorConfig,
    orchestrator: Arc<HealthOrchestrator>,
    idempotency: Arc<IdempotencyCache<Value>>,
    shutdown: ShutdownCoordinator,
    started_at: Instant,
}

impl Monitor {
    /// Build every registry described by `config`.
    pub fn from_config(config: MonitorConfig) -> Self {
        let orchestrator = Arc::new(HealthOrchestrator::new(config.health.probe_timeout()));

        for (name, breaker) in &config.circuit_breakers {
            orchestrator.register_breaker(name.clone(), *breaker);
        }
        for (name, policy) in &config.retry_policies {
            orchestrator.register_retry_policy(name.clone(), RetryPolicy::from(*policy));
        }

        let idempotency = Arc::new(IdempotencyCache::new(config.idempotency.ttl()));
        let shutdown = ShutdownCoordinator::new(Some(config.shutdown.hook_timeout()));

        tracing::info!(
            circuit_breakers = config.circuit_breakers.len(),
            retry_policies = config.retry_policies.len(),
            idempotency_ttl_secs = config.idempotency.ttl_secs,
            "Monitor initialized"
        );

        Self {
            config,
            orchestrator,
            idempotency,
            shutdown,
            started_at: Instant::now(),
        }
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    pub fn orchestrator(&self) -> &Arc<HealthOrchestrator> {
        &self.orchestrator
    }

    pub fn idempotency(&self) -> &Arc<IdempotencyCache<Value>> {
        &self.idempotency
    }

    pub fn shutdown(&self) -> &ShutdownCoordinator {
        &self.shutdown
    }

    /// When the registries were built; the `process` liveness check reports uptime from it.
    pub fn started_at(&self) -> Instant {
        self.started_at
    }

    /// Run every probe and condense the results.
    pub async fn summary(&self) -> HealthSummary {
        let results = self.orchestrator.check_all().await;
        HealthSummary::new(&results, &self.orchestrator.breakers(), self.idempotency.len())
    }

    /// Start the periodic idempotency sweep if one is configured.
    ///
    /// The task exits when the shutdown signal is broadcast.
    pub fn spawn_maintenance(&self) -> Option<JoinHandle<()>> {
        let interval = self.config.idempotency.sweep_interval()?;
        let cache = Arc::clone(&self.idempotency);
        let mut shutdown = self.shutdown.subscribe();

        Some(tokio::spawn(async move {
            tracing::info!(interval_secs = interval.as_secs(), "Idempotency sweeper starting");
            let mut ticker = time::interval(interval);
            // The first tick completes immediately.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        cache.sweep();
                    }
                    _ = shutdown.recv() => {
                        tracing::info!("Idempotency sweeper received shutdown signal, exiting loop");
                        break;
                    }
                }
            }
        }))
    }
}

impl Default for Monitor {
    fn default() -> Self {
        Self::from_config(MonitorConfig::default())
    }
}
