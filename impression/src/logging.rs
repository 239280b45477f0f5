//! Log subscriber setup for binaries embedding the tracker.
//!
//! The library itself only emits `tracing` events. Hosts that want them on
//! stderr or in a file call [`init_logging`] once at startup. `RUST_LOG`
//! overrides the configured default level.

use std::path::{Path, PathBuf};

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::filter::EnvFilter;

use crate::error::{ImpressionError, Result};

/// Default filter when `RUST_LOG` is unset.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Where and how much to log.
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is unset (e.g. `"impression=debug"`).
    pub default_filter: String,

    /// Log to this file instead of stderr.
    pub log_file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            default_filter: DEFAULT_LOG_FILTER.to_string(),
            log_file: None,
        }
    }
}

impl LoggingConfig {
    /// Set the default filter directive.
    pub fn with_default_filter(mut self, filter: impl Into<String>) -> Self {
        self.default_filter = filter.into();
        self
    }

    /// Log to a file.
    pub fn with_log_file(mut self, path: PathBuf) -> Self {
        self.log_file = Some(path);
        self
    }

    fn env_filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&self.default_filter))
    }
}

/// Install the global log subscriber.
///
/// When logging to a file the returned guard must be kept alive for the life
/// of the program; dropping it flushes and stops the background writer.
pub fn init_logging(config: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    let filter = config.env_filter();

    match &config.log_file {
        Some(path) => {
            let file_name = path.file_name().ok_or_else(|| {
                ImpressionError::Logging(format!("not a file path: {}", path.display()))
            })?;
            let directory = path
                .parent()
                .filter(|dir| !dir.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));

            std::fs::create_dir_all(directory).map_err(|e| {
                ImpressionError::Logging(format!("cannot create {}: {}", directory.display(), e))
            })?;

            let appender = tracing_appender::rolling::never(directory, file_name);
            let (writer, guard) = tracing_appender::non_blocking(appender);

            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_target(true)
                .with_ansi(false)
                .with_writer(writer)
                .try_init()
                .map_err(|e| ImpressionError::Logging(e.to_string()))?;

            Ok(Some(guard))
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_target(true)
                .with_writer(std::io::stderr)
                .try_init()
                .map_err(|e| ImpressionError::Logging(e.to_string()))?;

            Ok(None)
        }
    }
}
