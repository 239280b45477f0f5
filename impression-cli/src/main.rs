//! Impression CLI - Command-line host for the impression tracking library.
//!
//! Runs trackers against a simulated scrolling list so thresholds, dwell
//! times and lifecycle policies can be tried without a real UI.

mod commands;
mod error;

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};
use impression::logging::{init_logging, LoggingConfig};
use tracing::error;

use commands::config::ConfigArgs;
use commands::simulate::SimulateArgs;
use error::CliError;

/// Visibility and dwell tracking for UI elements
#[derive(Debug, Parser)]
#[command(name = "impression", version = impression::VERSION, about)]
struct Cli {
    /// Log filter used when RUST_LOG is unset (e.g. "impression=debug")
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    /// Write logs to this file instead of stderr
    #[arg(long, global = true, value_name = "PATH")]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Scroll a headless virtualized list and print the impressions it earns
    Simulate(SimulateArgs),

    /// Print the effective tracker configuration as INI
    Config(ConfigArgs),
}

fn main() {
    let cli = Cli::parse();

    let mut logging = LoggingConfig::default().with_default_filter(cli.log_level.clone());
    if let Some(path) = cli.log_file.clone() {
        logging = logging.with_log_file(path);
    }

    // Held until exit so file logs are flushed.
    let _log_guard = match init_logging(&logging) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    };

    if let Err(e) = run(cli.command) {
        error!(error = %e, "Command failed");
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn run(command: Commands) -> Result<(), CliError> {
    match command {
        Commands::Simulate(args) => commands::simulate::run(args),
        Commands::Config(args) => commands::config::run(args),
    }
}
