//! Timeout enforcement.
//!
//! # Responsibilities
//! - Wrap probes and shutdown hooks with an optional deadline
//! - Cancel operations cleanly on timeout (the inner future is dropped)
//!
//! # Design Decisions
//! - Uses Tokio's timeout facilities
//! - Timeout errors are distinct from other errors

use std::future::Future;
use std::time::Duration;

use thiserror::Error;

/// The deadline passed before the operation completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("timed out after {}ms", .0.as_millis())]
pub struct DeadlineExceeded(pub Duration);

/// Await `fut`, bounded by `limit` when one is given.
pub async fn with_deadline<F>(limit: Option<Duration>, fut: F) -> Result<F::Output, DeadlineExceeded>
where
    F: Future,
{
    match limit {
        Some(limit) => tokio::time::timeout(limit, fut)
            .await
            .map_err(|_| DeadlineExceeded(limit)),
        None => Ok(fut.await),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_deadline_applies() {
        let err = with_deadline(Some(Duration::from_millis(250)), std::future::pending::<()>())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "timed out after 250ms");
    }

    #[tokio::test]
    async fn test_no_deadline() {
        let value = with_deadline(None, async { 5 }).await.unwrap();
        assert_eq!(value, 5);
    }
}
