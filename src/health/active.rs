//! Active health polling.
//!
//! # Responsibilities
//! - Periodically run every registered probe
//! - Log aggregate status changes and unhealthy components

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time;

use crate::health::orchestrator::HealthOrchestrator;
use crate::health::report::HealthReport;
use crate::health::state::HealthStatus;

pub struct HealthWatcher {
    orchestrator: Arc<HealthOrchestrator>,
    interval: Duration,
}

impl HealthWatcher {
    pub fn new(orchestrator: Arc<HealthOrchestrator>, interval: Duration) -> Self {
        Self {
            orchestrator,
            interval,
        }
    }

    /// Poll until the shutdown signal fires. `on_report` sees every round.
    pub async fn run<F>(self, mut shutdown: broadcast::Receiver<()>, mut on_report: F)
    where
        F: FnMut(&HealthReport),
    {
        tracing::info!(interval_ms = self.interval.as_millis() as u64, "Health watcher starting");

        let mut ticker = time::interval(self.interval);
        let mut last_status: Option<HealthStatus> = None;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let report = self.orchestrator.overall().await;
                    if last_status != Some(report.status) {
                        tracing::info!(
                            previous = ?last_status,
                            current = %report.status,
                            "Aggregate health changed"
                        );
                        last_status = Some(report.status);
                    }
                    for result in report.components.values() {
                        if result.status != HealthStatus::Healthy {
                            tracing::warn!(
                                component = %result.component,
                                status = %result.status,
                                error = result.error.as_deref().unwrap_or(""),
                                "Component not healthy"
                            );
                        }
                    }
                    on_report(&report);
                }
                _ = shutdown.recv() => {
                    tracing::info!("Health watcher received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }
}
