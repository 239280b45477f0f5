//! Common types and utilities shared across CLI commands.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, ValueEnum};
use impression::{DeliveryMode, DwellPolicy, ImpressionConfig};

use crate::error::CliError;

/// Dwell policy selection for CLI arguments.
#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
pub enum PolicyArg {
    /// Background time counts toward dwell
    WallClock,
    /// Only foreground time counts toward dwell
    ForegroundOnly,
}

impl From<PolicyArg> for DwellPolicy {
    fn from(arg: PolicyArg) -> Self {
        match arg {
            PolicyArg::WallClock => DwellPolicy::WallClock,
            PolicyArg::ForegroundOnly => DwellPolicy::ForegroundOnly,
        }
    }
}

/// Delivery mode selection for CLI arguments.
#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
pub enum DeliveryArg {
    /// Impressions are queued and drained by the host
    Queued,
    /// Impressions are handed to a callback as they fire
    Callback,
}

impl From<DeliveryArg> for DeliveryMode {
    fn from(arg: DeliveryArg) -> Self {
        match arg {
            DeliveryArg::Queued => DeliveryMode::Queued,
            DeliveryArg::Callback => DeliveryMode::Callback,
        }
    }
}

/// Tracker settings shared by every command.
///
/// Values given on the command line override the config file, which
/// overrides the built-in defaults.
#[derive(Debug, Clone, Default, Args)]
pub struct TrackerOptions {
    /// INI file with an [impression] section
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Fraction of a card that must be on screen, in (0, 1]
    #[arg(long, value_name = "FRACTION")]
    pub threshold: Option<f32>,

    /// Continuous visible time before an impression counts
    #[arg(long, value_name = "MS")]
    pub min_dwell_ms: Option<u64>,

    /// Interval between dwell checks
    #[arg(long, value_name = "MS")]
    pub check_interval_ms: Option<u64>,

    /// Whether background time counts toward dwell
    #[arg(long, value_enum)]
    pub dwell_policy: Option<PolicyArg>,

    /// How impressions reach the host
    #[arg(long, value_enum)]
    pub delivery: Option<DeliveryArg>,
}

impl TrackerOptions {
    /// Resolve the effective configuration: CLI > config file > defaults.
    pub fn resolve(&self) -> Result<ImpressionConfig, CliError> {
        let base = match &self.config {
            Some(path) => ImpressionConfig::from_ini_file(path)?,
            None => ImpressionConfig::default(),
        };

        let config = self.apply(base);
        config.validate()?;
        Ok(config)
    }

    fn apply(&self, mut config: ImpressionConfig) -> ImpressionConfig {
        if let Some(threshold) = self.threshold {
            config = config.with_visibility_threshold(threshold);
        }
        if let Some(ms) = self.min_dwell_ms {
            config = config.with_min_dwell(Duration::from_millis(ms));
        }
        if let Some(ms) = self.check_interval_ms {
            config = config.with_check_interval(Duration::from_millis(ms));
        }
        if let Some(policy) = self.dwell_policy {
            config = config.with_dwell_policy(policy.into());
        }
        if let Some(delivery) = self.delivery {
            config = config.with_delivery(delivery.into());
        }
        config
    }
}
