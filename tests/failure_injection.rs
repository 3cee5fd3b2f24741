//! Failure injection tests for breakers, retries, idempotency, probes and shutdown.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use resilience_monitor::error::BoxError;
use resilience_monitor::health::{probe_fn, HealthOrchestrator, HealthStatus, ProbeReport};
use resilience_monitor::lifecycle::ShutdownCoordinator;
use resilience_monitor::resilience::{
    retry, retry_if, retry_sync, BreakerError, CircuitBreaker, CircuitState, IdempotencyCache,
};
use tokio::time::{self, Instant};

mod common;
use common::{breaker_config, erroring_probe, fixed_policy, fixed_probe, flaky, CallCounter};

#[tokio::test(start_paused = true)]
async fn test_open_breaker_stops_invoking_operation() {
    let breaker = CircuitBreaker::new("database", breaker_config(2, 30));
    let counter = CallCounter::default();

    for _ in 0..2 {
        let c = counter.clone();
        let err = breaker
            .call(|| async move {
                c.hit();
                Err::<(), _>("connection reset")
            })
            .await
            .unwrap_err();
        assert_eq!(err.into_inner(), Some("connection reset"));
    }
    assert_eq!(breaker.state(), CircuitState::Open);

    let c = counter.clone();
    let err = breaker
        .call(|| async move {
            c.hit();
            Ok::<_, &str>(())
        })
        .await
        .unwrap_err();
    assert!(err.is_open());
    assert_eq!(err.to_string(), "circuit breaker 'database' is open");
    assert_eq!(counter.count(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_breaker_recovers_after_timeout() {
    let breaker = CircuitBreaker::new("storage", breaker_config(1, 5));
    let _ = breaker.call(|| async { Err::<(), _>("down") }).await;
    assert_eq!(breaker.state(), CircuitState::Open);

    time::advance(Duration::from_secs(5)).await;
    assert!(breaker.call(|| async { Ok::<_, &str>(()) }).await.unwrap_err().is_open());

    time::advance(Duration::from_millis(1)).await;
    breaker.call(|| async { Ok::<_, &str>(()) }).await.unwrap();
    let snapshot = breaker.snapshot();
    assert_eq!(snapshot.state, CircuitState::Closed);
    assert_eq!(snapshot.failure_count, 0);
    assert!(snapshot.last_success_time.is_some());
}

#[tokio::test(start_paused = true)]
async fn test_retry_schedule_without_jitter() {
    let counter = CallCounter::default();
    let started = Instant::now();

    let result = retry(&fixed_policy(3, 100), flaky(&counter, u32::MAX)).await;

    assert_eq!(result.unwrap_err(), "failure 3");
    assert_eq!(counter.count(), 3);
    // 100ms after the first failure, 200ms after the second, none after the last.
    assert_eq!(started.elapsed(), Duration::from_millis(300));
}

#[tokio::test(start_paused = true)]
async fn test_retry_succeeds_after_transient_failures() {
    let counter = CallCounter::default();
    let value = retry(&fixed_policy(3, 100), flaky(&counter, 2)).await.unwrap();
    assert_eq!(value, 3);

    let sync_counter = CallCounter::default();
    let c = sync_counter.clone();
    let value = retry_sync(&fixed_policy(2, 10), move || {
        if c.hit() == 1 {
            Err("first")
        } else {
            Ok("second")
        }
    })
    .await
    .unwrap();
    assert_eq!(value, "second");
    assert_eq!(sync_counter.count(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_caller_timeout_cancels_backoff() {
    let counter = CallCounter::default();
    let started = Instant::now();

    let outcome = time::timeout(
        Duration::from_millis(50),
        retry(&fixed_policy(5, 10_000), flaky(&counter, u32::MAX)),
    )
    .await;

    assert!(outcome.is_err());
    assert_eq!(started.elapsed(), Duration::from_millis(50));
    assert_eq!(counter.count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_retries_inside_one_guarded_call_count_once() {
    let breaker = CircuitBreaker::new("api", breaker_config(2, 30));
    let counter = CallCounter::default();
    let policy = fixed_policy(3, 10);

    let err = breaker
        .call(|| retry(&policy, flaky(&counter, u32::MAX)))
        .await
        .unwrap_err();

    assert_eq!(err.into_inner().as_deref(), Some("failure 3"));
    assert_eq!(counter.count(), 3);
    assert_eq!(breaker.failure_count(), 1);
    assert_eq!(breaker.state(), CircuitState::Closed);
}

#[tokio::test(start_paused = true)]
async fn test_guarding_each_attempt_fast_fails_once_open() {
    let breaker = CircuitBreaker::new("api", breaker_config(2, 30));
    let counter = CallCounter::default();
    let policy = fixed_policy(5, 10);

    let err = retry_if(
        &policy,
        || {
            let op = flaky(&counter, u32::MAX);
            let breaker = &breaker;
            async move { breaker.call(op).await }
        },
        |e: &BreakerError<String>| !e.is_open(),
    )
    .await
    .unwrap_err();

    assert!(err.is_open());
    assert_eq!(counter.count(), 2);
    assert_eq!(breaker.state(), CircuitState::Open);
}

#[tokio::test]
async fn test_idempotent_failures_are_not_cached() {
    let cache: IdempotencyCache<String> = IdempotencyCache::new(Duration::from_secs(60));
    let counter = CallCounter::default();

    let c = counter.clone();
    let first = cache
        .execute("order-42", "create_order", || async move {
            c.hit();
            Err::<String, _>("payment gateway down")
        })
        .await;
    assert!(first.is_err());
    assert!(cache.is_empty());

    for _ in 0..2 {
        let c = counter.clone();
        let value = cache
            .execute("order-42", "create_order", || async move {
                c.hit();
                Ok::<_, String>("order created".to_string())
            })
            .await
            .unwrap();
        assert_eq!(value, "order created");
    }
    assert_eq!(counter.count(), 2);
}

async fn cached_hit(cache: &IdempotencyCache<u32>, counter: &CallCounter) -> u32 {
    let c = counter.clone();
    cache
        .execute("k", "op", || async move { Ok::<_, String>(c.hit()) })
        .await
        .unwrap()
}

#[tokio::test(start_paused = true)]
async fn test_idempotent_result_expires_after_ttl() {
    let cache: IdempotencyCache<u32> = IdempotencyCache::new(Duration::from_secs(60));
    let counter = CallCounter::default();

    assert_eq!(cached_hit(&cache, &counter).await, 1);
    time::advance(Duration::from_secs(59)).await;
    assert_eq!(cached_hit(&cache, &counter).await, 1);
    time::advance(Duration::from_secs(1)).await;
    assert_eq!(cached_hit(&cache, &counter).await, 2);
}

#[tokio::test]
async fn test_one_bad_component_makes_aggregate_unhealthy() {
    let orchestrator = HealthOrchestrator::default();
    orchestrator.register_probe("db", fixed_probe(true));
    orchestrator.register_probe("cache", fixed_probe(false));

    let results = orchestrator.check_all().await;
    assert_eq!(results["db"].status, HealthStatus::Healthy);
    assert_eq!(results["cache"].status, HealthStatus::Unhealthy);
    assert_eq!(HealthOrchestrator::aggregate(&results), HealthStatus::Unhealthy);
}

#[tokio::test]
async fn test_failing_probes_never_break_the_report() {
    let orchestrator = HealthOrchestrator::default();
    orchestrator.register_probe("storage", erroring_probe("bucket unreachable"));
    orchestrator.register_probe(
        "queue",
        probe_fn(|| async {
            if true {
                panic!("probe bug");
            }
            Ok(ProbeReport::pass())
        }),
    );
    orchestrator.register_probe("db", fixed_probe(true));

    let report = orchestrator.overall().await;
    assert_eq!(report.status, HealthStatus::Unhealthy);
    assert_eq!(report.components.len(), 3);
    assert_eq!(
        report.components["storage"].error.as_deref(),
        Some("bucket unreachable")
    );
    assert_eq!(
        report.components["queue"].error.as_deref(),
        Some("probe panicked: probe bug")
    );
    assert_eq!(report.components["db"].status, HealthStatus::Healthy);
}

#[tokio::test]
async fn test_shutdown_hooks_survive_a_failure() {
    let coordinator = ShutdownCoordinator::default();
    let order = Arc::new(Mutex::new(Vec::new()));

    for (name, fails) in [("A", false), ("B", true), ("C", false)] {
        let order = order.clone();
        coordinator.on_shutdown(name, move || {
            order.lock().unwrap().push(name);
            if fails {
                Err::<(), BoxError>(format!("{name} failed").into())
            } else {
                Ok(())
            }
        });
    }

    let mut signal = coordinator.subscribe();
    let report = coordinator.run().await;

    assert!(signal.recv().await.is_ok());
    assert_eq!(*order.lock().unwrap(), vec!["A", "B", "C"]);
    assert_eq!(report.completed, vec!["A", "C"]);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].hook, "B");
    assert!(!report.is_clean());

    let again = coordinator.run().await;
    assert!(again.completed.is_empty() && again.failed.is_empty());
    assert_eq!(order.lock().unwrap().len(), 3);
}
