//! Shutdown coordination.

use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use serde::Serialize;
use tokio::sync::broadcast;

use crate::error::BoxError;
use crate::health::probe::panic_message;
use crate::observability::metrics;
use crate::resilience::timeouts::with_deadline;

type SyncHook = Box<dyn FnOnce() -> Result<(), BoxError> + Send>;
type AsyncHook = Box<dyn FnOnce() -> BoxFuture<'static, Result<(), BoxError>> + Send>;

enum HookKind {
    Sync(SyncHook),
    Async(AsyncHook),
}

struct ShutdownHook {
    name: String,
    kind: HookKind,
}

/// A hook that did not complete cleanly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HookFailure {
    pub hook: String,
    pub error: String,
}

/// Outcome of a shutdown run, in execution order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ShutdownReport {
    pub completed: Vec<String>,
    pub failed: Vec<HookFailure>,
}

impl ShutdownReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Coordinator for graceful shutdown.
///
/// Provides a broadcast channel that all long-running tasks can subscribe to,
/// and an ordered list of teardown hooks.
pub struct ShutdownCoordinator {
    /// Broadcast channel sender.
    tx: broadcast::Sender<()>,
    hooks: Mutex<Vec<ShutdownHook>>,
    /// Set by the first `run`; only read or written with `hooks` locked.
    started: AtomicBool,
    /// Deadline per async hook.
    hook_timeout: Option<Duration>,
}

impl ShutdownCoordinator {
    /// Create a new shutdown coordinator.
    pub fn new(hook_timeout: Option<Duration>) -> Self {
        let (tx, _) = broadcast::channel(1);
        Self {
            tx,
            hooks: Mutex::new(Vec::new()),
            started: AtomicBool::new(false),
            hook_timeout,
        }
    }

    /// Subscribe to the shutdown signal.
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }

    /// Trigger the shutdown signal.
    pub fn trigger(&self) {
        let _ = self.tx.send(());
    }

    /// Get the number of active subscribers (tasks still running).
    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Number of hooks waiting to run.
    pub fn pending_hooks(&self) -> usize {
        self.hooks.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Register a synchronous hook. Runs inline, so it cannot be timed out.
    pub fn on_shutdown<F>(&self, name: impl Into<String>, hook: F)
    where
        F: FnOnce() -> Result<(), BoxError> + Send + 'static,
    {
        self.push(name.into(), HookKind::Sync(Box::new(hook)));
    }

    /// Register an asynchronous hook.
    pub fn on_shutdown_async<F, Fut>(&self, name: impl Into<String>, hook: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
    {
        self.push(
            name.into(),
            HookKind::Async(Box::new(move || hook().boxed())),
        );
    }

    fn push(&self, name: String, kind: HookKind) {
        let mut hooks = self.hooks.lock().unwrap_or_else(PoisonError::into_inner);
        if self.started.load(Ordering::SeqCst) {
            tracing::warn!(hook = %name, "Shutdown already ran, handler will not be executed");
            return;
        }
        tracing::info!(hook = %name, "Registered graceful shutdown handler");
        hooks.push(ShutdownHook { name, kind });
    }

    /// Signal subscribers, then run every hook once, in registration order.
    ///
    /// A failing, panicking or timed-out hook is recorded and the remaining
    /// hooks still run. Only the first call does anything; hooks registered
    /// after it are discarded.
    pub async fn run(&self) -> ShutdownReport {
        let hooks = {
            let mut hooks = self.hooks.lock().unwrap_or_else(PoisonError::into_inner);
            if self.started.swap(true, Ordering::SeqCst) {
                tracing::debug!("Graceful shutdown already ran");
                return ShutdownReport::default();
            }
            std::mem::take(&mut *hooks)
        };

        tracing::info!("Starting graceful shutdown...");
        self.trigger();
        let mut report = ShutdownReport::default();

        for hook in hooks {
            let outcome = match hook.kind {
                HookKind::Sync(f) => match panic::catch_unwind(AssertUnwindSafe(f)) {
                    Ok(result) => result.map_err(|e| e.to_string()),
                    Err(payload) => Err(format!("hook panicked: {}", panic_message(payload.as_ref()))),
                },
                HookKind::Async(f) => {
                    let fut = AssertUnwindSafe(f()).catch_unwind();
                    match with_deadline(self.hook_timeout, fut).await {
                        Ok(Ok(result)) => result.map_err(|e| e.to_string()),
                        Ok(Err(payload)) => {
                            Err(format!("hook panicked: {}", panic_message(payload.as_ref())))
                        }
                        Err(elapsed) => Err(format!("hook {elapsed}")),
                    }
                }
            };

            match outcome {
                Ok(()) => {
                    tracing::info!(hook = %hook.name, "Executed shutdown handler");
                    metrics::record_shutdown_hook("completed");
                    report.completed.push(hook.name);
                }
                Err(error) => {
                    tracing::error!(hook = %hook.name, error = %error, "Error in shutdown handler");
                    metrics::record_shutdown_hook("failed");
                    report.failed.push(HookFailure {
                        hook: hook.name,
                        error,
                    });
                }
            }
        }

        tracing::info!(
            completed = report.completed.len(),
            failed = report.failed.len(),
            "Graceful shutdown completed"
        );
        report
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn recorder() -> Arc<Mutex<Vec<&'static str>>> {
        Arc::new(Mutex::new(Vec::new()))
    }

    #[tokio::test]
    async fn test_hooks_run_in_order_despite_failures() {
        let coordinator = ShutdownCoordinator::default();
        let log = recorder();

        let l = log.clone();
        coordinator.on_shutdown("stop-accepting", move || {
            l.lock().unwrap().push("stop-accepting");
            Ok(())
        });
        let l = log.clone();
        coordinator.on_shutdown_async("drain", move || async move {
            l.lock().unwrap().push("drain");
            Err::<(), BoxError>("drain interrupted".into())
        });
        let l = log.clone();
        coordinator.on_shutdown("close-connections", move || {
            l.lock().unwrap().push("close-connections");
            Ok(())
        });

        let report = coordinator.run().await;
        assert_eq!(*log.lock().unwrap(), vec!["stop-accepting", "drain", "close-connections"]);
        assert_eq!(report.completed, vec!["stop-accepting", "close-connections"]);
        assert_eq!(
            report.failed,
            vec![HookFailure {
                hook: "drain".into(),
                error: "drain interrupted".into()
            }]
        );
    }

    #[tokio::test]
    async fn test_hooks_run_once() {
        let coordinator = ShutdownCoordinator::default();
        let log = recorder();
        let l = log.clone();
        coordinator.on_shutdown("flush", move || {
            l.lock().unwrap().push("flush");
            Ok(())
        });

        coordinator.run().await;

        let l = log.clone();
        coordinator.on_shutdown("late", move || {
            l.lock().unwrap().push("late");
            Ok(())
        });
        assert_eq!(coordinator.pending_hooks(), 0);

        let second = coordinator.run().await;
        assert_eq!(second, ShutdownReport::default());
        assert_eq!(*log.lock().unwrap(), vec!["flush"]);
    }

    #[tokio::test]
    async fn test_panicking_hook_is_recorded() {
        let coordinator = ShutdownCoordinator::default();
        coordinator.on_shutdown("explodes", || panic!("bad hook"));
        coordinator.on_shutdown("after", || Ok(()));

        let report = coordinator.run().await;
        assert_eq!(report.completed, vec!["after"]);
        assert_eq!(report.failed[0].error, "hook panicked: bad hook");
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_hook_times_out() {
        let coordinator = ShutdownCoordinator::new(Some(Duration::from_secs(5)));
        coordinator.on_shutdown_async("stuck", || async {
            std::future::pending::<()>().await;
            Ok::<(), BoxError>(())
        });
        coordinator.on_shutdown("after", || Ok(()));

        let report = coordinator.run().await;
        assert_eq!(report.failed[0].error, "hook timed out after 5000ms");
        assert_eq!(report.completed, vec!["after"]);
    }

    #[tokio::test]
    async fn test_subscribers_are_signalled() {
        let coordinator = ShutdownCoordinator::default();
        let mut rx = coordinator.subscribe();
        assert_eq!(coordinator.receiver_count(), 1);

        coordinator.run().await;
        assert!(rx.recv().await.is_ok());
    }
}
