//! Logging initialization: structured `tracing` output to stderr, plus a
//! rotated `<host_dir>/logs/<command>-<timestamp>.json` command log
//! stream when the config enables file logging. A single `EnvFilter`
//! plus a `tracing-appender` non-blocking writer, scoped by command name
//! rather than a long-lived process identity.

use anyhow::Result;
use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::MngConfig;

/// Result of logging initialization. `_guard` must be kept alive for the
/// duration of the program — dropping it flushes any buffered log lines.
pub struct LoggingHandle {
    pub _guard: Option<WorkerGuard>,
    /// Path to the command's JSON-lines log file, if file logging is on.
    pub log_file_path: Option<PathBuf>,
}

/// Maximum number of rotated per-command log files kept under
/// `<host_dir>/logs/` before the oldest are pruned.
const MAX_RETAINED_LOGS: usize = 200;

fn prune_old_logs(logs_dir: &std::path::Path) {
    let Ok(entries) = std::fs::read_dir(logs_dir) else {
        return;
    };
    let mut files: Vec<_> = entries
        .filter_map(|e| e.ok())
        .filter(|e| e.path().extension().is_some_and(|ext| ext == "json"))
        .collect();
    if files.len() <= MAX_RETAINED_LOGS {
        return;
    }
    files.sort_by_key(|e| e.metadata().and_then(|m| m.modified()).ok());
    for stale in &files[..files.len() - MAX_RETAINED_LOGS] {
        let _ = std::fs::remove_file(stale.path());
    }
}

/// Initialize logging for one command invocation. Always logs to
/// stderr; additionally writes a rotated JSON-lines file under
/// `<host_dir>/logs/<command_name>-<timestamp>.json` when
/// `config.logging.to_file` is set.
pub fn init_logging(config: &MngConfig, command_name: &str, debug_override: bool) -> Result<LoggingHandle> {
    let log_level = if debug_override {
        "debug".to_string()
    } else {
        config.logging.level.clone()
    };
    let filter = tracing_subscriber::EnvFilter::new(std::env::var("RUST_LOG").unwrap_or(log_level));

    if config.logging.to_file {
        let logs_dir = config.resolve_host_dir().join("logs");
        std::fs::create_dir_all(&logs_dir)?;
        prune_old_logs(&logs_dir);

        let timestamp = chrono::Utc::now().format("%Y%m%dT%H%M%SZ");
        let log_filename = format!("{command_name}-{timestamp}.json");
        let log_file_path = logs_dir.join(&log_filename);

        let file_appender = tracing_appender::rolling::never(&logs_dir, &log_filename);
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(false)
                    .with_ansi(false)
                    .json()
                    .with_writer(non_blocking),
            )
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(false)
                    .with_writer(std::io::stderr),
            )
            .try_init()
            .ok();

        Ok(LoggingHandle {
            _guard: Some(guard),
            log_file_path: Some(log_file_path),
        })
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(false)
                    .with_writer(std::io::stderr),
            )
            .try_init()
            .ok();

        Ok(LoggingHandle {
            _guard: None,
            log_file_path: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn prune_old_logs_is_a_noop_under_the_limit() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("gc-1.json"), b"{}").unwrap();
        prune_old_logs(dir.path());
        assert!(dir.path().join("gc-1.json").exists());
    }

    #[test]
    fn resolve_host_dir_logs_subpath() {
        let dir = TempDir::new().unwrap();
        let mut config = MngConfig::default();
        config.host_dir = Some(dir.path().to_path_buf());
        assert_eq!(config.resolve_host_dir().join("logs"), dir.path().join("logs"));
    }
}
