//! Startup orchestration.
//!
//! # Responsibilities
//! - Load and validate configuration
//! - Build the Monitor and its registries
//! - Register the built-in liveness check
//!
//! # Design Decisions
//! - Fail fast: any configuration error is fatal
//! - A missing config path means defaults, which are validated like a file would be

use std::path::Path;

use crate::config::loader::{load_config, ConfigError};
use crate::config::schema::MonitorConfig;
use crate::config::validation::validate_config;
use crate::health::probe::{probe_fn, ProbeReport};
use crate::monitor::Monitor;

/// Load the configuration at `path`, or the defaults when no path is given.
pub fn resolve_config(path: Option<&Path>) -> Result<MonitorConfig, ConfigError> {
    match path {
        Some(path) => {
            let config = load_config(path)?;
            tracing::info!(path = %path.display(), "Configuration loaded");
            Ok(config)
        }
        None => {
            let config = MonitorConfig::default();
            validate_config(&config).map_err(ConfigError::Validation)?;
            tracing::debug!("No config file given, using defaults");
            Ok(config)
        }
    }
}

/// Build the monitor and register the checks every process carries.
pub fn start(config: MonitorConfig) -> Monitor {
    let monitor = Monitor::from_config(config);
    register_process_check(&monitor);
    monitor
}

/// Liveness check `process`: alive whenever it can run at all.
fn register_process_check(monitor: &Monitor) {
    let started_at = monitor.started_at();
    monitor.orchestrator().register_liveness_check(
        "process",
        probe_fn(move || async move {
            Ok(ProbeReport::pass()
                .with_detail("pid", std::process::id())
                .with_detail("uptime_seconds", started_at.elapsed().as_secs()))
        }),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_defaults_without_path() {
        let config = resolve_config(None).unwrap();
        assert_eq!(config.circuit_breakers.len(), 2);
    }

    #[test]
    fn test_invalid_file_is_rejected() {
        let path = std::env::temp_dir().join("resilience_monitor_startup_invalid.toml");
        fs::write(&path, "[circuit_breakers.database]\nfailure_threshold = 0\n").unwrap();

        let err = resolve_config(Some(&path)).unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
        fs::remove_file(&path).unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_process_liveness_reports_monitor_uptime() {
        let monitor = start(MonitorConfig::default());
        tokio::time::advance(std::time::Duration::from_secs(90)).await;
        let liveness = monitor.orchestrator().liveness().await;

        assert!(liveness.alive);
        let process = &liveness.checks["process"];
        assert_eq!(process.details["pid"], std::process::id());
        assert_eq!(process.details["uptime_seconds"], 90);
        assert_eq!(monitor.started_at().elapsed().as_secs(), 90);
    }
}
