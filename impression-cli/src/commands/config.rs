//! Config command - print the effective tracker configuration.
//!
//! The output is a valid `[impression]` INI section, so it can be saved and
//! passed back with `--config`.

use clap::Args;

use super::common::TrackerOptions;
use crate::error::CliError;

/// Arguments for the config command.
#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(flatten)]
    pub tracker: TrackerOptions,
}

/// Run the config command.
pub fn run(args: ConfigArgs) -> Result<(), CliError> {
    let config = args.tracker.resolve()?;

    if let Some(path) = &args.tracker.config {
        println!("; loaded from {}", path.display());
    }
    print!("{}", config.to_ini_string());

    Ok(())
}
