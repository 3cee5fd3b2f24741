//! Health status model and aggregation.
//!
//! # Aggregation
//! ```text
//! every result Healthy        → Healthy   (also for an empty set)
//! any result Unhealthy        → Unhealthy
//! otherwise (Unknown present) → Degraded
//! ```
//!
//! # Design Decisions
//! - Fixed, unweighted rule; no component is more important than another
//! - Results are created fresh per check and never stored

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};

/// Health of a component or of the whole process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
    Unknown,
}

impl HealthStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthStatus::Healthy => "healthy",
            HealthStatus::Degraded => "degraded",
            HealthStatus::Unhealthy => "unhealthy",
            HealthStatus::Unknown => "unknown",
        }
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Outcome of one probe execution.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthCheckResult {
    pub component: String,
    pub status: HealthStatus,
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "response_time_ms", serialize_with = "serialize_millis")]
    pub duration: Duration,
    pub details: Map<String, Value>,
    pub error: Option<String>,
}

impl HealthCheckResult {
    /// Result for a component nobody registered a probe for.
    pub fn unknown(component: &str) -> Self {
        Self {
            component: component.to_string(),
            status: HealthStatus::Unknown,
            timestamp: Utc::now(),
            duration: Duration::ZERO,
            details: Map::new(),
            error: Some(format!("No health check registered for component: {component}")),
        }
    }

    pub fn response_time_ms(&self) -> f64 {
        millis(&self.duration)
    }
}

fn millis(duration: &Duration) -> f64 {
    duration.as_nanos() as f64 / 1_000_000.0
}

fn serialize_millis<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(millis(duration))
}

/// Combine individual statuses into one.
pub fn aggregate_status<I>(statuses: I) -> HealthStatus
where
    I: IntoIterator<Item = HealthStatus>,
{
    let mut all_healthy = true;
    for status in statuses {
        match status {
            HealthStatus::Unhealthy => return HealthStatus::Unhealthy,
            HealthStatus::Healthy => {}
            _ => all_healthy = false,
        }
    }

    if all_healthy {
        HealthStatus::Healthy
    } else {
        HealthStatus::Degraded
    }
}
