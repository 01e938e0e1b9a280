//! Console and rolling file logging

use crate::config::LoggingConfig;
use std::path::Path;
use std::sync::OnceLock;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

const LOG_FILE_PREFIX: &str = "nina.log";

/// Keeps the non-blocking file writer flushing until the process exits
static LOG_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();

pub fn init(config: &LoggingConfig, verbose: bool) {
    let default_level = if verbose { "debug" } else { config.level.as_str() };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let console_layer = fmt::layer().with_target(false);

    let Some(log_dir) = &config.directory else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(console_layer)
            .init();
        return;
    };

    if let Err(e) = std::fs::create_dir_all(log_dir) {
        eprintln!("Failed to create log directory {}: {}", log_dir.display(), e);
        tracing_subscriber::registry()
            .with(env_filter)
            .with(console_layer)
            .init();
        return;
    }

    let file_appender = tracing_appender::rolling::daily(log_dir, LOG_FILE_PREFIX);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    LOG_GUARD.set(guard).ok();

    let file_layer = fmt::layer()
        .with_target(true)
        .with_ansi(false)
        .with_writer(non_blocking);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .init();

    tracing::debug!("Logging to {}", log_dir.display());
    cleanup_old_logs(log_dir, config.keep_days);
}

/// Remove daily log files older than `keep_days`
fn cleanup_old_logs(log_dir: &Path, keep_days: i64) {
    let today = chrono::Local::now().date_naive();
    let cutoff = chrono::Duration::try_days(keep_days).and_then(|d| today.checked_sub_signed(d));
    let Some(cutoff) = cutoff else {
        tracing::debug!("Log retention of {} days is out of range, skipping cleanup", keep_days);
        return;
    };

    let entries = match std::fs::read_dir(log_dir) {
        Ok(entries) => entries,
        Err(e) => {
            tracing::debug!("Cannot read log directory for cleanup: {}", e);
            return;
        }
    };

    for entry in entries.filter_map(|e| e.ok()) {
        let path = entry.path();
        let Some(date) = log_file_date(&path) else {
            continue;
        };
        if date < cutoff {
            match std::fs::remove_file(&path) {
                Ok(()) => tracing::debug!("Removed old log file {}", path.display()),
                Err(e) => tracing::warn!("Failed to remove {}: {}", path.display(), e),
            }
        }
    }
}

/// Date suffix of a rolled file such as `nina.log.2024-01-15`
fn log_file_date(path: &Path) -> Option<chrono::NaiveDate> {
    let name = path.file_name()?.to_str()?;
    let date = name.strip_prefix(LOG_FILE_PREFIX)?.strip_prefix('.')?;
    chrono::NaiveDate::parse_from_str(date, "%Y-%m-%d").ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_file_date() {
        assert_eq!(
            log_file_date(Path::new("/logs/nina.log.2024-01-15")),
            chrono::NaiveDate::from_ymd_opt(2024, 1, 15)
        );
        assert_eq!(log_file_date(Path::new("nina.log")), None);
        assert_eq!(log_file_date(Path::new("other.log.2024-01-15")), None);
        assert_eq!(log_file_date(Path::new("nina.log.yesterday")), None);
    }

    #[test]
    fn test_cleanup_keeps_recent_files() {
        let dir = tempfile::tempdir().unwrap();
        let today = chrono::Local::now().date_naive();
        let old = dir.path().join("nina.log.2000-01-01");
        let recent = dir
            .path()
            .join(format!("nina.log.{}", today.format("%Y-%m-%d")));
        let unrelated = dir.path().join("notes.txt");
        for path in [&old, &recent, &unrelated] {
            std::fs::write(path, "x").unwrap();
        }

        cleanup_old_logs(dir.path(), 7);

        assert!(!old.exists());
        assert!(recent.exists());
        assert!(unrelated.exists());
    }

    #[test]
    fn test_cleanup_with_extreme_retention_keeps_everything() {
        let dir = tempfile::tempdir().unwrap();
        let old = dir.path().join("nina.log.2000-01-01");
        std::fs::write(&old, "x").unwrap();

        cleanup_old_logs(dir.path(), i64::MAX);
        cleanup_old_logs(dir.path(), 1_000_000_000);
        assert!(old.exists());

        // as does a negative retention chrono cannot represent
        cleanup_old_logs(dir.path(), i64::MIN);
        assert!(old.exists());
    }
}
