//! Serializable health reports.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::health::state::{HealthCheckResult, HealthStatus};
use crate::resilience::circuit_breaker::{BreakerSnapshot, CircuitState};

/// Overall application health.
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub timestamp: DateTime<Utc>,
    pub components: BTreeMap<String, HealthCheckResult>,
    pub circuit_breakers: BTreeMap<String, BreakerSnapshot>,
}

/// Whether the process should receive traffic.
#[derive(Debug, Clone, Serialize)]
pub struct ReadinessReport {
    pub ready: bool,
    pub status: HealthStatus,
    pub timestamp: DateTime<Utc>,
    pub checks: BTreeMap<String, HealthCheckResult>,
}

/// Whether the process should be left running.
#[derive(Debug, Clone, Serialize)]
pub struct LivenessReport {
    pub alive: bool,
    pub status: HealthStatus,
    pub timestamp: DateTime<Utc>,
    pub checks: BTreeMap<String, HealthCheckResult>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ComponentCounts {
    pub total: usize,
    pub healthy: usize,
    pub unhealthy: usize,
    pub health_percentage: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PerformanceSummary {
    pub average_response_time_ms: f64,
    pub slowest_component: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BreakerCounts {
    pub total: usize,
    pub open: usize,
    pub half_open: usize,
    pub closed: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IdempotencyCounts {
    pub cached_operations: usize,
}

/// Condensed monitoring figures.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthSummary {
    pub timestamp: DateTime<Utc>,
    pub components: ComponentCounts,
    pub performance: PerformanceSummary,
    pub circuit_breakers: BreakerCounts,
    pub idempotency: IdempotencyCounts,
}

impl HealthSummary {
    pub fn new(
        results: &BTreeMap<String, HealthCheckResult>,
        breakers: &[BreakerSnapshot],
        cached_operations: usize,
    ) -> Self {
        let total = results.len();
        let count = |status: HealthStatus| results.values().filter(|r| r.status == status).count();
        let healthy = count(HealthStatus::Healthy);
        let unhealthy = count(HealthStatus::Unhealthy);

        let (health_percentage, average_response_time_ms) = if total > 0 {
            let sum: f64 = results.values().map(HealthCheckResult::response_time_ms).sum();
            (healthy as f64 / total as f64 * 100.0, sum / total as f64)
        } else {
            (0.0, 0.0)
        };

        let slowest_component = results
            .values()
            .max_by_key(|r| r.duration)
            .map(|r| r.component.clone());

        let in_state = |state: CircuitState| breakers.iter().filter(|b| b.state == state).count();

        Self {
            timestamp: Utc::now(),
            components: ComponentCounts {
                total,
                healthy,
                unhealthy,
                health_percentage,
            },
            performance: PerformanceSummary {
                average_response_time_ms,
                slowest_component,
            },
            circuit_breakers: BreakerCounts {
                total: breakers.len(),
                open: in_state(CircuitState::Open),
                half_open: in_state(CircuitState::HalfOpen),
                closed: in_state(CircuitState::Closed),
            },
            idempotency: IdempotencyCounts { cached_operations },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Map;
    use std::time::Duration;

    fn result(component: &str, status: HealthStatus, millis: u64) -> HealthCheckResult {
        HealthCheckResult {
            component: component.into(),
            status,
            timestamp: Utc::now(),
            duration: Duration::from_millis(millis),
            details: Map::new(),
            error: None,
        }
    }

    #[test]
    fn test_summary_figures() {
        let mut results = BTreeMap::new();
        results.insert("db".into(), result("db", HealthStatus::Healthy, 10));
        results.insert("cache".into(), result("cache", HealthStatus::Unhealthy, 30));
        results.insert("queue".into(), result("queue", HealthStatus::Healthy, 20));
        results.insert("disk".into(), result("disk", HealthStatus::Healthy, 20));

        let summary = HealthSummary::new(&results, &[], 5);
        assert_eq!(summary.components.total, 4);
        assert_eq!(summary.components.healthy, 3);
        assert_eq!(summary.components.unhealthy, 1);
        assert_eq!(summary.components.health_percentage, 75.0);
        assert_eq!(summary.performance.average_response_time_ms, 20.0);
        assert_eq!(summary.performance.slowest_component.as_deref(), Some("cache"));
        assert_eq!(summary.idempotency.cached_operations, 5);
    }

    #[test]
    fn test_empty_summary() {
        let summary = HealthSummary::new(&BTreeMap::new(), &[], 0);
        assert_eq!(summary.components, ComponentCounts::default());
        assert!(summary.performance.slowest_component.is_none());
    }
}
