//! Circuit breaker for dependency protection.
//!
//! # States
//! - Closed: normal operation, calls pass through
//! - Open: dependency assumed down, calls fail fast
//! - Half-Open: testing if dependency recovered
//!
//! # State Transitions
//! ```text
//! Closed → Open: failure_count >= threshold
//! Open → Half-Open: recovery timeout elapsed since last failure
//! Half-Open → Closed: trial call succeeds
//! Half-Open → Open: trial call fails
//! ```
//!
//! # Design Decisions
//! - Per-dependency circuit breaker (not global)
//! - Fail fast in Open state (no waiting for timeout)
//! - Limited trials in Half-Open, one by default (prevents hammering a recovering dependency)
//! - State lock is never held across an `.await`

use std::fmt;
use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::time::Instant;

use crate::config::schema::CircuitBreakerConfig;
use crate::observability::metrics;

/// State of a circuit breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        }
    }
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Outcome of a guarded call.
///
/// `Open` is the breaker's own fast-fail signal; `Inner` carries the wrapped
/// operation's error untouched.
#[derive(Debug, Error)]
pub enum BreakerError<E> {
    #[error("circuit breaker '{name}' is open")]
    Open { name: String },

    #[error(transparent)]
    Inner(E),
}

impl<E> BreakerError<E> {
    /// True when the call was rejected without running the operation.
    pub fn is_open(&self) -> bool {
        matches!(self, BreakerError::Open { .. })
    }

    /// The wrapped operation's error, if the operation ran.
    pub fn into_inner(self) -> Option<E> {
        match self {
            BreakerError::Inner(e) => Some(e),
            BreakerError::Open { .. } => None,
        }
    }
}

/// Serializable view of a breaker.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BreakerSnapshot {
    pub name: String,
    pub state: CircuitState,
    pub failure_count: u32,
    pub failure_threshold: u32,
    pub recovery_timeout_secs: u64,
    pub last_failure_time: Option<DateTime<Utc>>,
    pub last_success_time: Option<DateTime<Utc>>,
}

#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    failure_count: u32,
    last_failure_at: Option<Instant>,
    last_failure_time: Option<DateTime<Utc>>,
    last_success_time: Option<DateTime<Utc>>,
    trials_in_flight: u32,
}

/// Circuit breaker for a single named dependency.
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    /// Create a closed breaker.
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        let name = name.into();
        metrics::record_breaker_state(&name, CircuitState::Closed);
        Self {
            name,
            config,
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                failure_count: 0,
                last_failure_at: None,
                last_failure_time: None,
                last_success_time: None,
                trials_in_flight: 0,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Current stored state. Reading never triggers the Open → Half-Open move.
    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    pub fn failure_count(&self) -> u32 {
        self.lock().failure_count
    }

    pub fn snapshot(&self) -> BreakerSnapshot {
        let inner = self.lock();
        BreakerSnapshot {
            name: self.name.clone(),
            state: inner.state,
            failure_count: inner.failure_count,
            failure_threshold: self.config.failure_threshold,
            recovery_timeout_secs: self.config.recovery_timeout_secs,
            last_failure_time: inner.last_failure_time,
            last_success_time: inner.last_success_time,
        }
    }

    /// Run `op` under the breaker.
    ///
    /// The operation is not invoked when the call is rejected. Its error is
    /// returned as [`BreakerError::Inner`] after being counted.
    pub async fn call<F, Fut, T, E>(&self, op: F) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let permit = self.acquire()?;

        match op().await {
            Ok(value) => {
                permit.complete(true);
                Ok(value)
            }
            Err(e) => {
                permit.complete(false);
                Err(BreakerError::Inner(e))
            }
        }
    }

    /// Force the breaker closed with zero failures.
    pub fn reset(&self) {
        let mut inner = self.lock();
        let previous = inner.state;
        inner.state = CircuitState::Closed;
        inner.failure_count = 0;
        inner.last_failure_at = None;
        inner.last_failure_time = None;
        inner.trials_in_flight = 0;
        drop(inner);

        tracing::info!(breaker = %self.name, previous = %previous, "Circuit breaker reset");
        metrics::record_breaker_transition(&self.name, CircuitState::Closed);
    }

    fn acquire<E>(&self) -> Result<Permit<'_>, BreakerError<E>> {
        let mut inner = self.lock();

        let trial = match inner.state {
            CircuitState::Closed => false,
            CircuitState::Open => {
                let recovered = inner
                    .last_failure_at
                    .map_or(true, |at| at.elapsed() > self.config.recovery_timeout());
                if !recovered {
                    drop(inner);
                    return Err(self.reject("recovery timeout not elapsed"));
                }
                inner.state = CircuitState::HalfOpen;
                inner.trials_in_flight = 0;
                tracing::info!(breaker = %self.name, "Circuit breaker moved to HALF_OPEN state");
                metrics::record_breaker_transition(&self.name, CircuitState::HalfOpen);
                true
            }
            CircuitState::HalfOpen => true,
        };

        if trial {
            if inner.trials_in_flight >= self.config.half_open_max_calls {
                drop(inner);
                return Err(self.reject("half-open trial already in flight"));
            }
            inner.trials_in_flight += 1;
        }

        Ok(Permit {
            breaker: self,
            trial,
            settled: false,
        })
    }

    fn reject<E>(&self, reason: &'static str) -> BreakerError<E> {
        tracing::debug!(breaker = %self.name, reason, "Circuit breaker rejected call");
        metrics::record_breaker_rejection(&self.name);
        BreakerError::Open {
            name: self.name.clone(),
        }
    }

    fn record(&self, trial: bool, success: bool) {
        let mut inner = self.lock();
        if trial {
            inner.trials_in_flight = inner.trials_in_flight.saturating_sub(1);
        }

        if success {
            inner.failure_count = 0;
            inner.last_success_time = Some(Utc::now());
            if inner.state == CircuitState::HalfOpen {
                inner.state = CircuitState::Closed;
                inner.trials_in_flight = 0;
                drop(inner);
                tracing::info!(breaker = %self.name, "Circuit breaker moved to CLOSED state");
                metrics::record_breaker_transition(&self.name, CircuitState::Closed);
            }
            return;
        }

        inner.failure_count = inner.failure_count.saturating_add(1);
        inner.last_failure_at = Some(Instant::now());
        inner.last_failure_time = Some(Utc::now());

        let trip = inner.state == CircuitState::HalfOpen
            || (inner.state == CircuitState::Closed
                && inner.failure_count >= self.config.failure_threshold);
        if trip {
            inner.state = CircuitState::Open;
            inner.trials_in_flight = 0;
            let failures = inner.failure_count;
            drop(inner);
            tracing::warn!(
                breaker = %self.name,
                failures,
                "Circuit breaker moved to OPEN state"
            );
            metrics::record_breaker_transition(&self.name, CircuitState::Open);
        }
    }

    fn lock(&self) -> MutexGuard<'_, BreakerInner> {
        // Critical sections never panic mid-update, so a poisoned lock still
        // guards consistent data.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Admission ticket for one guarded call.
struct Permit<'a> {
    breaker: &'a CircuitBreaker,
    trial: bool,
    settled: bool,
}

impl Permit<'_> {
    fn complete(mut self, success: bool) {
        self.settled = true;
        self.breaker.record(self.trial, success);
    }
}

impl Drop for Permit<'_> {
    fn drop(&mut self) {
        // A trial dropped before completion (cancelled caller) frees its slot
        // without recording an outcome.
        if self.trial && !self.settled {
            let mut inner = self.breaker.lock();
            inner.trials_in_flight = inner.trials_in_flight.saturating_sub(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    fn breaker(threshold: u32, recovery_secs: u64) -> CircuitBreaker {
        CircuitBreaker::new(
            "test",
            CircuitBreakerConfig {
                failure_threshold: threshold,
                recovery_timeout_secs: recovery_secs,
                half_open_max_calls: 1,
            },
        )
    }

    async fn fail(cb: &CircuitBreaker, calls: &AtomicU32) -> Result<(), BreakerError<&'static str>> {
        cb.call(|| async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err::<(), _>("boom")
        })
        .await
    }

    #[tokio::test]
    async fn test_opens_at_threshold_and_fails_fast() {
        let cb = breaker(2, 30);
        let calls = AtomicU32::new(0);

        assert!(matches!(fail(&cb, &calls).await, Err(BreakerError::Inner("boom"))));
        assert_eq!(cb.state(), CircuitState::Closed);
        assert!(matches!(fail(&cb, &calls).await, Err(BreakerError::Inner("boom"))));
        assert_eq!(cb.state(), CircuitState::Open);

        let err = fail(&cb, &calls).await.unwrap_err();
        assert!(err.is_open());
        assert_eq!(err.to_string(), "circuit breaker 'test' is open");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_success_resets_failure_count() {
        let cb = breaker(3, 30);
        let calls = AtomicU32::new(0);

        let _ = fail(&cb, &calls).await;
        let _ = fail(&cb, &calls).await;
        assert_eq!(cb.failure_count(), 2);

        let value = cb.call(|| async { Ok::<_, &str>(7) }).await.unwrap();
        assert_eq!(value, 7);
        assert_eq!(cb.failure_count(), 0);
        assert!(cb.snapshot().last_success_time.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovers_after_timeout() {
        let cb = breaker(1, 10);
        let calls = AtomicU32::new(0);
        let _ = fail(&cb, &calls).await;
        assert_eq!(cb.state(), CircuitState::Open);

        tokio::time::advance(Duration::from_secs(10)).await;
        assert!(fail(&cb, &calls).await.unwrap_err().is_open());

        tokio::time::advance(Duration::from_millis(1)).await;
        cb.call(|| async { Ok::<_, &str>(()) }).await.unwrap();
        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.failure_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_trial_reopens() {
        let cb = breaker(1, 5);
        let calls = AtomicU32::new(0);
        let _ = fail(&cb, &calls).await;

        tokio::time::advance(Duration::from_secs(6)).await;
        assert!(matches!(fail(&cb, &calls).await, Err(BreakerError::Inner(_))));
        assert_eq!(cb.state(), CircuitState::Open);
        assert!(fail(&cb, &calls).await.unwrap_err().is_open());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_admits_single_trial() {
        let cb = breaker(1, 5);
        let calls = AtomicU32::new(0);
        let _ = fail(&cb, &calls).await;
        tokio::time::advance(Duration::from_secs(6)).await;

        let (release_tx, release_rx) = tokio::sync::oneshot::channel::<()>();
        let trial = cb.call(|| async move {
            let _ = release_rx.await;
            Ok::<_, &str>("recovered")
        });
        let second = async {
            tokio::task::yield_now().await;
            let rejected = cb.call(|| async { Ok::<_, &str>("second") }).await;
            let _ = release_tx.send(());
            rejected
        };

        let (trial, second) = tokio::join!(trial, second);
        assert_eq!(trial.unwrap(), "recovered");
        assert!(second.unwrap_err().is_open());
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_trial_frees_slot() {
        let cb = breaker(1, 5);
        let calls = AtomicU32::new(0);
        let _ = fail(&cb, &calls).await;
        tokio::time::advance(Duration::from_secs(6)).await;

        let stalled = tokio::time::timeout(
            Duration::from_millis(50),
            cb.call(|| std::future::pending::<Result<(), &str>>()),
        )
        .await;
        assert!(stalled.is_err());
        assert_eq!(cb.state(), CircuitState::HalfOpen);

        cb.call(|| async { Ok::<_, &str>(()) }).await.unwrap();
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_reset_closes_breaker() {
        let cb = breaker(1, 300);
        let calls = AtomicU32::new(0);
        let _ = fail(&cb, &calls).await;
        assert_eq!(cb.state(), CircuitState::Open);

        cb.reset();
        let snapshot = cb.snapshot();
        assert_eq!(snapshot.state, CircuitState::Closed);
        assert_eq!(snapshot.failure_count, 0);
        assert!(snapshot.last_failure_time.is_none());
        assert!(fail(&cb, &calls).await.unwrap_err().into_inner().is_some());
    }
}
