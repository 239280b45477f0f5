//! CLI error types.

use std::fmt;

use impression::ImpressionError;

/// Errors that end a CLI command.
#[derive(Debug)]
pub enum CliError {
    /// Invalid command-line options.
    Config(String),

    /// The tracking library rejected the configuration or failed to start.
    Tracker(ImpressionError),

    /// Failed to create the Tokio runtime.
    RuntimeCreation(String),

    /// Failed to install the Ctrl+C handler.
    SignalHandler(String),
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::Config(msg) => write!(f, "Configuration error: {}", msg),
            CliError::Tracker(e) => write!(f, "{}", e),
            CliError::RuntimeCreation(msg) => {
                write!(f, "Failed to create Tokio runtime: {}", msg)
            }
            CliError::SignalHandler(msg) => {
                write!(f, "Failed to install Ctrl+C handler: {}", msg)
            }
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CliError::Tracker(e) => Some(e),
            CliError::Config(_) | CliError::RuntimeCreation(_) | CliError::SignalHandler(_) => None,
        }
    }
}

impl From<ImpressionError> for CliError {
    fn from(e: ImpressionError) -> Self {
        CliError::Tracker(e)
    }
}
