//! resilience-monitor
//!
//! Health monitoring and resilience management CLI.
//!
//! # Architecture Overview
//!
//! ```text
//!     --config (TOML)
//!          │
//!          ▼
//!   ┌──────────────┐     ┌──────────────────────────────────────────────┐
//!   │   startup    │────▶│                   Monitor                     │
//!   │ load/validate│     │  ┌─────────────────┐  ┌────────────────────┐ │
//!   └──────────────┘     │  │ HealthOrchestr. │  │  IdempotencyCache  │ │
//!                        │  │ probes/breakers │  │  (TTL, sweep)      │ │
//!                        │  │ retry policies  │  └────────────────────┘ │
//!                        │  └─────────────────┘  ┌────────────────────┐ │
//!                        │                       │ ShutdownCoordinator│ │
//!                        │                       └────────────────────┘ │
//!                        └──────────────────────────────────────────────┘
//!                                         │
//!                                         ▼
//!                            command output (table / json)
//! ```

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Serialize;

use resilience_monitor::config::CircuitBreakerConfig;
use resilience_monitor::error::BoxError;
use resilience_monitor::health::active::HealthWatcher;
use resilience_monitor::health::{HealthCheckResult, HealthReport, HealthStatus};
use resilience_monitor::lifecycle::{signals, startup};
use resilience_monitor::observability::{logging, metrics};
use resilience_monitor::resilience::{BreakerError, CircuitState};
use resilience_monitor::Monitor;

#[derive(Parser)]
#[command(name = "resilience-monitor")]
#[command(about = "Health monitoring and resilience management", long_about = None)]
struct Cli {
    /// TOML configuration file; built-in defaults when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Format {
    Table,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Perform health checks
    Check {
        /// Check a specific component only
        #[arg(short, long)]
        component: Option<String>,
        #[arg(short, long, value_enum, default_value_t = Format::Table)]
        format: Format,
    },
    /// Check application readiness
    Readiness {
        #[arg(short, long, value_enum, default_value_t = Format::Table)]
        format: Format,
    },
    /// Check application liveness
    Liveness {
        #[arg(short, long, value_enum, default_value_t = Format::Table)]
        format: Format,
    },
    /// List all circuit breakers and their status
    CircuitBreakers {
        #[arg(short, long, value_enum, default_value_t = Format::Table)]
        format: Format,
    },
    /// Reset a circuit breaker
    ResetCircuitBreaker { name: String },
    /// List all retry policies
    RetryPolicies {
        #[arg(short, long, value_enum, default_value_t = Format::Table)]
        format: Format,
    },
    /// Show idempotency cache status
    IdempotencyStatus,
    /// Clean up expired idempotency keys
    CleanupIdempotency,
    /// Show a monitoring summary
    Metrics {
        #[arg(short, long, value_enum, default_value_t = Format::Table)]
        format: Format,
        /// Also print the Prometheus exposition
        #[arg(long)]
        prometheus: bool,
    },
    /// Exercise retry and circuit breaker against synthetic operations
    TestResilience,
    /// Run health checks periodically until interrupted
    Watch {
        /// Seconds between rounds
        #[arg(short, long, default_value_t = 30)]
        interval: u64,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match startup::resolve_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("❌ Invalid configuration: {e}");
            return ExitCode::FAILURE;
        }
    };

    logging::init_logging(&config.observability);
    let prometheus = if config.observability.metrics_enabled {
        metrics::init_metrics()
    } else {
        None
    };

    let monitor = startup::start(config);

    match run(cli.command, &monitor, prometheus.as_ref()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("❌ {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(
    command: Commands,
    monitor: &Monitor,
    prometheus: Option<&PrometheusHandle>,
) -> Result<(), BoxError> {
    let orchestrator = monitor.orchestrator();

    match command {
        Commands::Check {
            component: Some(component),
            format,
        } => {
            let result = orchestrator.check_one(&component).await;
            if format == Format::Json {
                return print_json(&result);
            }
            println!("{} {}: {}", status_icon(result.status), result.component, result.status);
            println!("   Response time: {:.1}ms", result.response_time_ms());
            println!("   Timestamp: {}", result.timestamp.to_rfc3339());
            if let Some(error) = &result.error {
                println!("   Error: {error}");
            }
            if !result.details.is_empty() {
                println!("   Details: {}", serde_json::to_string_pretty(&result.details)?);
            }
        }
        Commands::Check {
            component: None,
            format,
        } => {
            let report = orchestrator.overall().await;
            if format == Format::Json {
                return print_json(&report);
            }
            print_health_report(&report);
        }
        Commands::Readiness { format } => {
            let report = orchestrator.readiness().await;
            if format == Format::Json {
                return print_json(&report);
            }
            let label = if report.ready { "READY" } else { "NOT READY" };
            println!("\nReadiness Status: {} {label}", flag_icon(report.ready));
            println!("Timestamp: {}", report.timestamp.to_rfc3339());
            print_checks("Readiness", ("ready", "not ready"), report.checks.values());
        }
        Commands::Liveness { format } => {
            let report = orchestrator.liveness().await;
            if format == Format::Json {
                return print_json(&report);
            }
            let label = if report.alive { "ALIVE" } else { "NOT ALIVE" };
            println!("\nLiveness Status: {} {label}", flag_icon(report.alive));
            println!("Timestamp: {}", report.timestamp.to_rfc3339());
            print_checks("Liveness", ("alive", "not alive"), report.checks.values());
        }
        Commands::CircuitBreakers { format } => {
            let breakers = orchestrator.breakers();
            if format == Format::Json {
                return print_json(&breakers);
            }
            if breakers.is_empty() {
                println!("No circuit breakers configured");
                return Ok(());
            }
            println!(
                "{:<20} {:<13} {:<10} {:<10} {:<20}",
                "Name", "State", "Failures", "Threshold", "Last Failure"
            );
            println!("{}", "-".repeat(80));
            for breaker in breakers {
                let last_failure = breaker
                    .last_failure_time
                    .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
                    .unwrap_or_else(|| "Never".to_string());
                println!(
                    "{:<20} {} {:<10} {:<10} {:<10} {:<20}",
                    breaker.name,
                    state_icon(breaker.state),
                    breaker.state,
                    breaker.failure_count,
                    breaker.failure_threshold,
                    last_failure
                );
            }
        }
        Commands::ResetCircuitBreaker { name } => {
            let previous = orchestrator.reset_breaker(&name)?;
            let current = orchestrator
                .breaker(&name)
                .map(|b| b.snapshot())
                .ok_or("circuit breaker disappeared during reset")?;
            println!("✅ Circuit breaker '{name}' reset successfully");
            println!(
                "   Previous state: {} (failures: {})",
                previous.state, previous.failure_count
            );
            println!(
                "   New state: {} (failures: {})",
                current.state, current.failure_count
            );
        }
        Commands::RetryPolicies { format } => {
            let policies = orchestrator.retry_policies();
            if format == Format::Json {
                let configs: std::collections::BTreeMap<_, _> = policies
                    .iter()
                    .map(|(name, policy)| (name.clone(), policy.to_config()))
                    .collect();
                return print_json(&configs);
            }
            if policies.is_empty() {
                println!("No retry policies configured");
                return Ok(());
            }
            println!(
                "{:<15} {:<12} {:<12} {:<12} {:<8}",
                "Name", "Max Attempts", "Base Delay", "Max Delay", "Jitter"
            );
            println!("{}", "-".repeat(70));
            for (name, policy) in policies {
                println!(
                    "{:<15} {:<12} {:<12} {:<12} {:<8}",
                    name,
                    policy.max_attempts,
                    format!("{}ms", policy.base_delay.as_millis()),
                    format!("{}ms", policy.max_delay.as_millis()),
                    if policy.jitter { "Yes" } else { "No" }
                );
            }
        }
        Commands::IdempotencyStatus => {
            let cache = monitor.idempotency();
            let entries = cache.entries();
            println!("Idempotency Cache Status:");
            println!("  Cached operations: {}", entries.len());
            println!("  Key expiry hours: {}", cache.ttl().as_secs() / 3600);
            if !entries.is_empty() {
                println!("\nCached Operations:");
                for entry in entries.iter().take(10) {
                    let short = entry.key.get(..16).unwrap_or(&entry.key);
                    println!(
                        "  {short}... - {} ({})",
                        entry.operation_name,
                        entry.timestamp.to_rfc3339()
                    );
                }
                if entries.len() > 10 {
                    println!("  ... and {} more operations", entries.len() - 10);
                }
            }
        }
        Commands::CleanupIdempotency => {
            let cache = monitor.idempotency();
            let before = cache.len();
            let removed = cache.sweep();
            println!("✅ Idempotency cleanup completed");
            println!("   Keys before cleanup: {before}");
            println!("   Keys after cleanup: {}", cache.len());
            println!("   Keys cleaned: {removed}");
        }
        Commands::Metrics { format, prometheus: show_prometheus } => {
            let summary = monitor.summary().await;
            if format == Format::Json {
                print_json(&summary)?;
            } else {
                println!("Monitoring Summary ({})", summary.timestamp.to_rfc3339());
                println!(
                    "  Components: {} total, {} healthy, {} unhealthy ({:.1}% healthy)",
                    summary.components.total,
                    summary.components.healthy,
                    summary.components.unhealthy,
                    summary.components.health_percentage
                );
                println!(
                    "  Average response time: {:.1}ms",
                    summary.performance.average_response_time_ms
                );
                if let Some(slowest) = &summary.performance.slowest_component {
                    println!("  Slowest component: {slowest}");
                }
                println!(
                    "  Circuit breakers: {} total, {} open, {} half-open, {} closed",
                    summary.circuit_breakers.total,
                    summary.circuit_breakers.open,
                    summary.circuit_breakers.half_open,
                    summary.circuit_breakers.closed
                );
                println!(
                    "  Cached idempotent operations: {}",
                    summary.idempotency.cached_operations
                );
            }
            if show_prometheus {
                match prometheus {
                    Some(handle) => println!("\n{}", handle.render()),
                    None => eprintln!("Prometheus recorder is not installed"),
                }
            }
        }
        Commands::TestResilience => test_resilience(monitor).await?,
        Commands::Watch { interval } => watch(monitor, Duration::from_secs(interval.max(1))).await?,
    }

    Ok(())
}

async fn test_resilience(monitor: &Monitor) -> Result<(), BoxError> {
    let orchestrator = monitor.orchestrator();
    println!("Testing resilience patterns...");

    println!("\n1. Testing retry mechanism...");
    let calls = AtomicU32::new(0);
    let result = orchestrator
        .retry_with("test", || {
            let attempt = calls.fetch_add(1, Ordering::SeqCst) + 1;
            async move {
                if attempt < 3 {
                    Err(format!("temporary failure {attempt}"))
                } else {
                    Ok("success")
                }
            }
        })
        .await;
    match result {
        Ok(value) => println!(
            "   ✅ Retry test passed: {value} (attempts: {})",
            calls.load(Ordering::SeqCst)
        ),
        Err(e) => println!("   ❌ Retry test failed: {e}"),
    }

    println!("\n2. Testing circuit breaker...");
    let breaker = orchestrator.register_breaker(
        "test",
        CircuitBreakerConfig {
            failure_threshold: 2,
            recovery_timeout_secs: 1,
            ..Default::default()
        },
    );
    for i in 1..=3 {
        let outcome = breaker
            .call(|| async move { Err::<(), _>(format!("test failure {i}")) })
            .await;
        match outcome {
            Err(BreakerError::Open { .. }) => {
                println!("   ✅ Circuit breaker opened after {} failures", i - 1);
                break;
            }
            Err(BreakerError::Inner(e)) => println!("   Call {i} failed: {e}"),
            Ok(()) => {}
        }
    }
    println!("   Circuit breaker state: {}", breaker.state());

    println!("\n3. Testing circuit breaker recovery...");
    tokio::time::sleep(breaker.config().recovery_timeout() + Duration::from_millis(100)).await;
    match breaker.call(|| async { Ok::<_, String>(()) }).await {
        Ok(()) => println!("   ✅ Circuit breaker recovered and allowed operation"),
        Err(e) => println!("   ❌ Circuit breaker recovery failed: {e}"),
    }

    println!("\n✅ Resilience pattern testing completed");
    Ok(())
}

async fn watch(monitor: &Monitor, interval: Duration) -> Result<(), BoxError> {
    let shutdown = monitor.shutdown();

    let maintenance = monitor.spawn_maintenance();
    shutdown.on_shutdown_async("idempotency-sweeper", move || async move {
        if let Some(handle) = maintenance {
            handle.await?;
        }
        Ok::<(), BoxError>(())
    });
    let cache = Arc::clone(monitor.idempotency());
    shutdown.on_shutdown("idempotency-cache", move || {
        let dropped = cache.clear();
        tracing::info!(dropped, "Idempotency cache cleared");
        Ok(())
    });

    let watcher = HealthWatcher::new(Arc::clone(monitor.orchestrator()), interval);
    let signal = shutdown.subscribe();

    let ((), report) = tokio::join!(watcher.run(signal, print_watch_line), async {
        signals::wait_for_shutdown_signal().await;
        shutdown.run().await
    });

    if report.is_clean() {
        println!("✅ Shutdown complete");
        Ok(())
    } else {
        for failure in &report.failed {
            eprintln!("❌ Shutdown hook '{}' failed: {}", failure.hook, failure.error);
        }
        Err(format!("{} shutdown hook(s) failed", report.failed.len()).into())
    }
}

fn print_watch_line(report: &HealthReport) {
    let unhealthy: Vec<&str> = report
        .components
        .values()
        .filter(|r| r.status != HealthStatus::Healthy)
        .map(|r| r.component.as_str())
        .collect();
    println!(
        "[{}] {} {} ({} components{})",
        report.timestamp.format("%H:%M:%S"),
        status_icon(report.status),
        report.status.as_str().to_uppercase(),
        report.components.len(),
        if unhealthy.is_empty() {
            String::new()
        } else {
            format!(", not healthy: {}", unhealthy.join(", "))
        }
    );
}

fn print_health_report(report: &HealthReport) {
    println!(
        "\nOverall Health: {} {}",
        status_icon(report.status),
        report.status.as_str().to_uppercase()
    );
    println!("Timestamp: {}", report.timestamp.to_rfc3339());

    println!("\nComponent Health:");
    for result in report.components.values() {
        println!(
            "  {} {}: {} ({:.1}ms)",
            status_icon(result.status),
            result.component,
            result.status,
            result.response_time_ms()
        );
        if let Some(error) = &result.error {
            println!("    Error: {error}");
        }
    }

    println!("\nCircuit Breakers:");
    for breaker in report.circuit_breakers.values() {
        println!(
            "  {} {}: {} (failures: {})",
            state_icon(breaker.state),
            breaker.name,
            breaker.state,
            breaker.failure_count
        );
    }
}

fn print_checks<'a>(
    title: &str,
    (pass, fail): (&str, &str),
    checks: impl Iterator<Item = &'a HealthCheckResult>,
) {
    println!("\n{title} Checks:");
    for check in checks {
        let ok = check.status == HealthStatus::Healthy;
        println!(
            "  {} {}: {}",
            flag_icon(ok),
            check.component,
            if ok { pass } else { fail }
        );
        if let Some(error) = &check.error {
            println!("    Error: {error}");
        }
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<(), BoxError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn status_icon(status: HealthStatus) -> &'static str {
    match status {
        HealthStatus::Healthy => "✅",
        HealthStatus::Degraded => "⚠️",
        HealthStatus::Unhealthy => "❌",
        HealthStatus::Unknown => "❓",
    }
}

fn state_icon(state: CircuitState) -> &'static str {
    match state {
        CircuitState::Closed => "✅",
        CircuitState::HalfOpen => "⚠️",
        CircuitState::Open => "❌",
    }
}

fn flag_icon(ok: bool) -> &'static str {
    if ok {
        "✅"
    } else {
        "❌"
    }
}
