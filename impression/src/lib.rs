//! Impression - visibility and dwell tracking for UI elements
//!
//! This library decides when an element of a user interface has been seen:
//! at least a threshold fraction of it on screen, continuously, for a minimum
//! dwell time. Each visible session produces exactly one impression.
//!
//! The host UI stays in charge of rendering. It reports element geometry on
//! every layout pass, tells the tracker when it moves between foreground and
//! background, and consumes the impressions.
//!
//! # Modules
//!
//! - [`geometry`] - rectangles and visible-fraction computation
//! - [`state`] - the pure Idle / Accumulating / Reported state machine
//! - [`tracker`] - the async tracker that owns state, monitor task and delivery
//! - [`lifecycle`] - foreground/background signal from the host
//! - [`delivery`] - callback or queued impression delivery
//! - [`config`] - thresholds, timings and policies
//! - [`telemetry`] - shared counters for observability
//! - [`logging`] - subscriber setup for binaries

pub mod config;
pub mod delivery;
pub mod error;
pub mod geometry;
pub mod lifecycle;
pub mod logging;
pub mod state;
pub mod telemetry;
pub mod tracker;

pub use config::{DeliveryMode, DwellPolicy, ImpressionConfig};
pub use delivery::{Delivery, Impression, ImpressionCallback, ImpressionReceiver};
pub use error::ImpressionError;
pub use geometry::{visibility, Rect, Visibility};
pub use lifecycle::{HostLifecycle, LifecycleClosed, LifecycleSignal, LifecycleState};
pub use state::{GeometryOutcome, ImpressionPhase, ImpressionState};
pub use telemetry::{ImpressionMetrics, MetricsSnapshot};
pub use tracker::{ImpressionTracker, TrackerBuilder};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
