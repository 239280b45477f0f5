//! Configuration for impression tracking.
//!
//! Every tunable of the tracker lives in [`ImpressionConfig`]. Values can be
//! set in code through the `with_*` builders or loaded from the
//! `[impression]` section of an INI file:
//!
//! ```ini
//! [impression]
//! visibility_threshold = 0.5
//! min_dwell_ms = 1000
//! check_interval_ms = 500
//! dwell_policy = wall_clock     # or foreground_only
//! delivery = queued
//! ```

use std::path::Path;
use std::time::Duration;

use ini::Ini;
use tracing::warn;

use crate::error::{ImpressionError, Result};

// ==================== Defaults ====================

/// Default fraction of the element that must be on screen.
pub const DEFAULT_VISIBILITY_THRESHOLD: f32 = 0.5;

/// Default continuous dwell time before an impression counts, in milliseconds.
pub const DEFAULT_MIN_DWELL_MS: u64 = 1000;

/// Default interval between dwell checks, in milliseconds.
///
/// Trades notification latency against wake-ups: an impression fires at most
/// one interval after the dwell time elapses.
pub const DEFAULT_CHECK_INTERVAL_MS: u64 = 500;

/// INI section holding tracker settings.
pub const CONFIG_SECTION: &str = "impression";

/// How dwell time is measured while the host is in the background.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DwellPolicy {
    /// Dwell is wall-clock time since the element last became visible enough.
    ///
    /// Backgrounding the host does not stop the clock; it only prevents the
    /// impression from being delivered. An element left on screen while the
    /// app sits in the background for longer than the dwell time fires as
    /// soon as the host returns to the foreground.
    #[default]
    WallClock,

    /// Dwell only accumulates while the element is visible *and* the host is
    /// in the foreground. Time spent in the background is not credited.
    ForegroundOnly,
}

impl DwellPolicy {
    /// Parse from a config file string.
    pub fn from_config_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "wall_clock" | "wallclock" => Some(DwellPolicy::WallClock),
            "foreground_only" | "foreground" => Some(DwellPolicy::ForegroundOnly),
            _ => None,
        }
    }

    /// Name as written in config files.
    pub fn as_str(&self) -> &'static str {
        match self {
            DwellPolicy::WallClock => "wall_clock",
            DwellPolicy::ForegroundOnly => "foreground_only",
        }
    }
}

/// How impressions reach the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeliveryMode {
    /// Events are pushed onto a channel consumed by a single receiver.
    #[default]
    Queued,

    /// A callback is invoked directly from the dwell check.
    Callback,
}

impl DeliveryMode {
    /// Parse from a config file string.
    pub fn from_config_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "queued" | "queue" | "channel" => Some(DeliveryMode::Queued),
            "callback" | "direct" => Some(DeliveryMode::Callback),
            _ => None,
        }
    }

    /// Name as written in config files.
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryMode::Queued => "queued",
            DeliveryMode::Callback => "callback",
        }
    }
}

/// Configuration for an [`ImpressionTracker`](crate::tracker::ImpressionTracker).
#[derive(Debug, Clone, PartialEq)]
pub struct ImpressionConfig {
    /// Fraction of the element's area that must be visible, in `(0, 1]`.
    ///
    /// Default: 0.5.
    pub visibility_threshold: f32,

    /// Continuous time the threshold must hold before an impression fires.
    ///
    /// Default: 1000ms.
    pub min_dwell: Duration,

    /// Interval between dwell checks while the host is active.
    ///
    /// Default: 500ms.
    pub check_interval: Duration,

    /// Whether background time counts toward dwell.
    pub dwell_policy: DwellPolicy,

    /// Which delivery path the tracker uses.
    pub delivery: DeliveryMode,
}

impl Default for ImpressionConfig {
    fn default() -> Self {
        Self {
            visibility_threshold: DEFAULT_VISIBILITY_THRESHOLD,
            min_dwell: Duration::from_millis(DEFAULT_MIN_DWELL_MS),
            check_interval: Duration::from_millis(DEFAULT_CHECK_INTERVAL_MS),
            dwell_policy: DwellPolicy::default(),
            delivery: DeliveryMode::default(),
        }
    }
}

impl ImpressionConfig {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the visibility threshold.
    pub fn with_visibility_threshold(mut self, threshold: f32) -> Self {
        self.visibility_threshold = threshold;
        self
    }

    /// Set the minimum dwell time.
    pub fn with_min_dwell(mut self, dwell: Duration) -> Self {
        self.min_dwell = dwell;
        self
    }

    /// Set the dwell check interval.
    pub fn with_check_interval(mut self, interval: Duration) -> Self {
        self.check_interval = interval;
        self
    }

    /// Set the dwell policy.
    pub fn with_dwell_policy(mut self, policy: DwellPolicy) -> Self {
        self.dwell_policy = policy;
        self
    }

    /// Set the delivery mode.
    pub fn with_delivery(mut self, delivery: DeliveryMode) -> Self {
        self.delivery = delivery;
        self
    }

    /// Check that all values are usable.
    pub fn validate(&self) -> Result<()> {
        let threshold = self.visibility_threshold;
        if !threshold.is_finite() || threshold <= 0.0 || threshold > 1.0 {
            return Err(ImpressionError::InvalidConfig(format!(
                "visibility_threshold must be in (0, 1], got {}",
                threshold
            )));
        }

        if self.check_interval.is_zero() {
            return Err(ImpressionError::InvalidConfig(
                "check_interval must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }

    /// Load configuration from an INI file, starting from defaults.
    ///
    /// A file without an `[impression]` section yields the defaults.
    pub fn from_ini_file(path: &Path) -> Result<Self> {
        let ini = Ini::load_from_file(path).map_err(|e| ImpressionError::ConfigFile {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

        Self::default()
            .apply_ini(&ini)
            .map_err(|message| ImpressionError::ConfigFile {
                path: path.to_path_buf(),
                message,
            })
    }

    /// Parse configuration from INI text, starting from defaults.
    pub fn from_ini_str(source: &str) -> Result<Self> {
        let ini = Ini::load_from_str(source)
            .map_err(|e| ImpressionError::InvalidConfig(e.to_string()))?;

        Self::default()
            .apply_ini(&ini)
            .map_err(ImpressionError::InvalidConfig)
    }

    /// Render as an `[impression]` INI section that [`from_ini_str`](Self::from_ini_str) accepts.
    pub fn to_ini_string(&self) -> String {
        format!(
            "[{}]\n\
             visibility_threshold = {}\n\
             min_dwell_ms = {}\n\
             check_interval_ms = {}\n\
             dwell_policy = {}\n\
             delivery = {}\n",
            CONFIG_SECTION,
            self.visibility_threshold,
            self.min_dwell.as_millis(),
            self.check_interval.as_millis(),
            self.dwell_policy.as_str(),
            self.delivery.as_str()
        )
    }

    /// Overlay values from the `[impression]` section and validate the result.
    fn apply_ini(mut self, ini: &Ini) -> std::result::Result<Self, String> {
        let Some(section) = ini.section(Some(CONFIG_SECTION)) else {
            return Ok(self);
        };

        for (key, value) in section.iter() {
            let value = strip_inline_comment(value);
            match key {
                "visibility_threshold" => {
                    self.visibility_threshold = value
                        .parse()
                        .map_err(|_| format!("invalid visibility_threshold '{}'", value))?;
                }
                "min_dwell_ms" => {
                    let ms: u64 = value
                        .parse()
                        .map_err(|_| format!("invalid min_dwell_ms '{}'", value))?;
                    self.min_dwell = Duration::from_millis(ms);
                }
                "check_interval_ms" => {
                    let ms: u64 = value
                        .parse()
                        .map_err(|_| format!("invalid check_interval_ms '{}'", value))?;
                    self.check_interval = Duration::from_millis(ms);
                }
                "dwell_policy" => {
                    self.dwell_policy = DwellPolicy::from_config_str(value)
                        .ok_or_else(|| format!("unknown dwell_policy '{}'", value))?;
                }
                "delivery" => {
                    self.delivery = DeliveryMode::from_config_str(value)
                        .ok_or_else(|| format!("unknown delivery '{}'", value))?;
                }
                other => {
                    warn!(key = other, "Ignoring unknown impression config key");
                }
            }
        }

        self.validate().map_err(|e| e.to_string())?;
        Ok(self)
    }
}

/// Drop a trailing `#` or `;` comment from a value.
fn strip_inline_comment(value: &str) -> &str {
    value
        .find(|c: char| c == '#' || c == ';')
        .map_or(value, |end| &value[..end])
        .trim()
}
