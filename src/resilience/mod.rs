//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Call to an unreliable dependency:
//!     → circuit_breaker.rs (fail fast while the dependency is known bad)
//!     → retries.rs (retry with backoff.rs delays)
//!     → idempotency.rs (replay a stored success instead of repeating a write)
//!     → timeouts.rs (optional deadline around probes and hooks)
//! ```
//!
//! # Design Decisions
//! - Each piece is usable alone; composition order is the caller's choice
//! - Breaker errors are a distinct variant, never mixed with the operation's own error
//! - Retry exhaustion surfaces the last error unchanged
//! - All state is in-memory and per-process

pub mod backoff;
pub mod circuit_breaker;
pub mod idempotency;
pub mod retries;
pub mod timeouts;

pub use circuit_breaker::{BreakerError, BreakerSnapshot, CircuitBreaker, CircuitState};
pub use idempotency::{idempotency_key, IdempotencyCache};
pub use retries::{retry, retry_if, retry_sync, RetryExecutor, RetryPolicy};
