//! Retry logic.
//!
//! # Responsibilities
//! - Execute operations with exponential backoff + jitter
//! - Surface the last error unchanged once attempts are exhausted
//! - Stop early when a caller-supplied predicate rejects an error
//!
//! # Design Decisions
//! - Backoff sleeps are tokio timers; dropping the future cancels them
//! - No delay after the final attempt
//! - Synchronous operations run inline; only the waiting is asynchronous
//! - Independent of the circuit breaker; callers choose how to compose them

use std::fmt::Debug;
use std::future::{self, Future};
use std::time::Duration;

use tokio::time::sleep;

use crate::config::schema::RetryPolicyConfig;
use crate::observability::metrics;
use crate::resilience::backoff::calculate_backoff;

/// Immutable retry policy.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub exponential_base: f64,
    pub jitter: bool,
}

impl RetryPolicy {
    /// Delay after failed attempt `attempt` (0-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        calculate_backoff(
            attempt,
            self.base_delay,
            self.max_delay,
            self.exponential_base,
            self.jitter,
        )
    }

    pub fn to_config(&self) -> RetryPolicyConfig {
        RetryPolicyConfig {
            max_attempts: self.max_attempts,
            base_delay_ms: self.base_delay.as_millis() as u64,
            max_delay_ms: self.max_delay.as_millis() as u64,
            exponential_base: self.exponential_base,
            jitter: self.jitter,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicyConfig::default().into()
    }
}

impl From<RetryPolicyConfig> for RetryPolicy {
    fn from(config: RetryPolicyConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
            exponential_base: config.exponential_base,
            jitter: config.jitter,
        }
    }
}

/// Retry executor bound to an operation name for logs and metrics.
#[derive(Debug, Clone)]
pub struct RetryExecutor {
    operation: String,
    policy: RetryPolicy,
}

impl RetryExecutor {
    pub fn new(operation: impl Into<String>, policy: RetryPolicy) -> Self {
        Self {
            operation: operation.into(),
            policy,
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Retry an async operation on every error.
    pub async fn run<F, Fut, T, E>(&self, op: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Debug,
    {
        self.run_if(op, |_| true).await
    }

    /// Retry a synchronous operation. Attempts run inline; waits are async.
    pub async fn run_sync<F, T, E>(&self, mut op: F) -> Result<T, E>
    where
        F: FnMut() -> Result<T, E>,
        E: Debug,
    {
        self.run_if(|| future::ready(op()), |_| true).await
    }

    /// Retry while `should_retry` accepts the error.
    pub async fn run_if<F, Fut, T, E, P>(&self, mut op: F, mut should_retry: P) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Debug,
        P: FnMut(&E) -> bool,
    {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            metrics::record_retry_attempt(&self.operation);

            let error = match op().await {
                Ok(value) => return Ok(value),
                Err(e) => e,
            };

            if attempt + 1 >= max_attempts {
                tracing::error!(
                    operation = %self.operation,
                    attempts = max_attempts,
                    error = ?error,
                    "All retry attempts failed"
                );
                metrics::record_retry_exhausted(&self.operation);
                return Err(error);
            }

            if !should_retry(&error) {
                tracing::debug!(
                    operation = %self.operation,
                    attempt = attempt + 1,
                    error = ?error,
                    "Error not retryable, giving up"
                );
                return Err(error);
            }

            let delay = self.policy.delay_for(attempt);
            tracing::warn!(
                operation = %self.operation,
                attempt = attempt + 1,
                delay_ms = delay.as_millis() as u64,
                error = ?error,
                "Attempt failed, retrying"
            );
            sleep(delay).await;
            attempt += 1;
        }
    }
}

/// Retry an async operation under `policy`.
pub async fn retry<F, Fut, T, E>(policy: &RetryPolicy, op: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Debug,
{
    RetryExecutor::new("anonymous", *policy).run(op).await
}

/// Retry an async operation while `should_retry` accepts its errors.
pub async fn retry_if<F, Fut, T, E, P>(policy: &RetryPolicy, op: F, should_retry: P) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Debug,
    P: FnMut(&E) -> bool,
{
    RetryExecutor::new("anonymous", *policy)
        .run_if(op, should_retry)
        .await
}

/// Retry a synchronous operation under `policy`.
pub async fn retry_sync<F, T, E>(policy: &RetryPolicy, op: F) -> Result<T, E>
where
    F: FnMut() -> Result<T, E>,
    E: Debug,
{
    RetryExecutor::new("anonymous", *policy).run_sync(op).await
}
