//! Probe contract.
//!
//! A probe is a zero-argument async check reporting on one dependency. The
//! same contract serves health (`healthy`), readiness (`ready`) and liveness
//! (`alive`) checks; `passed` carries the flag.
//!
//! Probes should report `ProbeReport::fail()` rather than erroring, but errors,
//! panics and (when configured) timeouts are all caught here and turned into a
//! [`ProbeFailure`].

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::FutureExt;
use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::error::BoxError;
use crate::resilience::timeouts::{with_deadline, DeadlineExceeded};

/// What a probe found.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProbeReport {
    pub passed: bool,
    pub details: Map<String, Value>,
}

impl ProbeReport {
    pub fn pass() -> Self {
        Self {
            passed: true,
            details: Map::new(),
        }
    }

    pub fn fail() -> Self {
        Self::default()
    }

    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }
}

/// A named health, readiness or liveness check.
#[async_trait]
pub trait Probe: Send + Sync {
    async fn check(&self) -> Result<ProbeReport, BoxError>;
}

/// Probe backed by a closure. Build with [`probe_fn`].
pub struct FnProbe<F> {
    f: F,
}

#[async_trait]
impl<F, Fut> Probe for FnProbe<F>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<ProbeReport, BoxError>> + Send + 'static,
{
    async fn check(&self) -> Result<ProbeReport, BoxError> {
        (self.f)().await
    }
}

/// Adapt an async closure into a [`Probe`].
pub fn probe_fn<F, Fut>(f: F) -> FnProbe<F>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<ProbeReport, BoxError>> + Send + 'static,
{
    FnProbe { f }
}

/// Why a probe produced no report.
#[derive(Debug, Error)]
pub enum ProbeFailure {
    #[error("{0}")]
    Error(String),

    #[error("probe panicked: {0}")]
    Panicked(String),

    #[error("probe {0}")]
    TimedOut(#[from] DeadlineExceeded),
}

/// Run a probe, containing its errors, panics and overruns.
pub(crate) async fn run_probe(
    probe: Arc<dyn Probe>,
    limit: Option<Duration>,
) -> Result<ProbeReport, ProbeFailure> {
    let guarded = AssertUnwindSafe(probe.check()).catch_unwind();

    match with_deadline(limit, guarded).await? {
        Ok(Ok(report)) => Ok(report),
        Ok(Err(e)) => Err(ProbeFailure::Error(e.to_string())),
        Err(panic) => Err(ProbeFailure::Panicked(panic_message(panic.as_ref()))),
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
