//! Resilience and health-orchestration core.
//!
//! Circuit breakers, retry with backoff, an idempotency cache, and a
//! health/readiness/liveness orchestrator with graceful shutdown.

pub mod config;
pub mod error;
pub mod health;
pub mod lifecycle;
pub mod monitor;
pub mod observability;
pub mod resilience;

pub use config::schema::MonitorConfig;
pub use error::{BoxError, MonitorError};
pub use health::HealthOrchestrator;
pub use lifecycle::ShutdownCoordinator;
pub use monitor::Monitor;
