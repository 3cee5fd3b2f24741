//! Health checking subsystem.
//!
//! # Data Flow
//! ```text
//! Registration (orchestrator.rs):
//!     name → Probe (probe.rs), for health, readiness and liveness sets
//!
//! check_one / check_all / readiness / liveness:
//!     → run probes (errors, panics, timeouts contained)
//!     → HealthCheckResult per probe (state.rs)
//!     → aggregate rule (state.rs)
//!     → HealthReport / ReadinessReport / LivenessReport (report.rs)
//!
//! Active polling (active.rs):
//!     Periodic timer → orchestrator.overall() → log status changes
//! ```
//!
//! # Design Decisions
//! - Probe bodies live outside this crate; only the contract is defined here
//! - A probe failure is always recovered locally, never propagated
//! - Breakers and retry policies share the orchestrator as a registry but are
//!   consulted by name from call sites elsewhere

pub mod active;
pub mod orchestrator;
pub mod probe;
pub mod report;
pub mod state;

pub use orchestrator::HealthOrchestrator;
pub use probe::{probe_fn, Probe, ProbeReport};
pub use report::{HealthReport, HealthSummary, LivenessReport, ReadinessReport};
pub use state::{HealthCheckResult, HealthStatus};
