//! Tracing setup for nurture binaries.
//!
//! Every binary calls [`init`] once at startup. Output always goes to stderr;
//! a daily rolling file is added when a log directory is configured:
//!
//! ```bash
//! # stderr only, default filter
//! nurture replay demos/first-week.ron
//!
//! # also write nurture-cli.log.YYYY-MM-DD under /tmp/nurture
//! NURTURE_LOG_DIR=/tmp/nurture RUST_LOG=nurture_client=debug nurture replay demos/first-week.ron
//! ```
//!
//! `RUST_LOG` always wins over the filter passed in by the caller.

use std::path::PathBuf;

pub use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Environment variable naming the directory for the rolling log file.
pub const LOG_DIR_ENV: &str = "NURTURE_LOG_DIR";

/// Directory for the rolling log file, if [`LOG_DIR_ENV`] is set and non-empty.
pub fn log_dir() -> Option<PathBuf> {
    log_dir_from(std::env::var(LOG_DIR_ENV).ok())
}

fn log_dir_from(value: Option<String>) -> Option<PathBuf> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}

/// Build the filter: `RUST_LOG` if set and valid, else `default_filter`.
pub fn env_filter(default_filter: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter))
}

/// Install the global subscriber.
///
/// Returns the file writer's guard when file logging is on; keep it alive
/// until exit or buffered lines are lost. Calling this twice is harmless:
/// the second call leaves the first subscriber in place.
pub fn init(service: &str, default_filter: &str) -> Option<WorkerGuard> {
    let registry = tracing_subscriber::registry()
        .with(env_filter(default_filter))
        .with(fmt::layer().with_writer(std::io::stderr));

    match log_dir() {
        Some(dir) => {
            let file_appender = tracing_appender::rolling::daily(&dir, format!("{service}.log"));
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
            let installed = registry
                .with(fmt::layer().with_writer(non_blocking).with_ansi(false))
                .try_init()
                .is_ok();
            if installed {
                tracing::info!("{service}: logging to {}", dir.display());
            }
            Some(guard)
        }
        None => {
            let _ = registry.try_init();
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_dir_unset_or_blank() {
        assert_eq!(log_dir_from(None), None);
        assert_eq!(log_dir_from(Some(String::new())), None);
        assert_eq!(log_dir_from(Some("   ".into())), None);
    }

    #[test]
    fn test_log_dir_trims() {
        assert_eq!(
            log_dir_from(Some(" /tmp/nurture ".into())),
            Some(PathBuf::from("/tmp/nurture"))
        );
    }

    #[test]
    fn test_env_filter_falls_back() {
        // Any valid directive works whether or not RUST_LOG is set.
        let filter = env_filter("nurture_client=debug,warn");
        assert!(!filter.to_string().is_empty());
    }

    #[test]
    fn test_init_is_repeatable() {
        let _first = init("nurture-test", "warn");
        let _second = init("nurture-test", "warn");
    }
}
