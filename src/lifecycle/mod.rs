//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Load config → Validate → Build Monitor → Register built-in checks
//!
//! Shutdown (shutdown.rs):
//!     Broadcast signal → Run hooks in registration order → ShutdownReport
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - Ordered startup: config first, then registries, then background tasks
//! - Ordered shutdown: hooks run sequentially, each at most once
//! - Each hook has a timeout; a failing hook never stops the ones after it

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::{ShutdownCoordinator, ShutdownReport};
