//! Error types for tracker construction and configuration.
//!
//! Tracking itself never fails: degenerate geometry counts as "not visible"
//! and a vanished lifecycle source stops the monitor quietly. Errors only
//! arise while building a tracker or loading its configuration.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while configuring or starting a tracker.
#[derive(Debug, Error)]
pub enum ImpressionError {
    /// A configuration value is out of range or inconsistent.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The tracker was started outside a Tokio runtime.
    #[error("No Tokio runtime available to run the impression monitor")]
    NoRuntime,

    /// A configuration file could not be read or parsed.
    #[error("Config file {}: {message}", .path.display())]
    ConfigFile { path: PathBuf, message: String },

    /// The global log subscriber could not be installed.
    #[error("Failed to initialize logging: {0}")]
    Logging(String),
}

/// Convenience alias for results in this crate.
pub type Result<T> = std::result::Result<T, ImpressionError>;
