//! Impression telemetry for observability.
//!
//! A single [`ImpressionMetrics`] can be shared by every tracker in a host
//! (one per list, one per screen, or one for the whole app). Counters are
//! lock-free atomics so recording from layout callbacks costs next to nothing.
//!
//! # Architecture
//!
//! ```text
//! Trackers ─────► ImpressionMetrics ─────► MetricsSnapshot ─────► Views
//!                 (atomic counters)        (point-in-time copy)   (CLI, logs)
//! ```

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Shared counters describing tracker activity.
#[derive(Debug, Default)]
pub struct ImpressionMetrics {
    trackers_started: AtomicU64,
    trackers_disposed: AtomicU64,
    geometry_events: AtomicU64,
    sessions_started: AtomicU64,
    sessions_abandoned: AtomicU64,
    impressions_delivered: AtomicU64,
    resets: AtomicU64,
}

impl ImpressionMetrics {
    /// Create a metrics collector with all counters at zero.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tracker_started(&self) {
        self.trackers_started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn tracker_disposed(&self) {
        self.trackers_disposed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn geometry_event(&self) {
        self.geometry_events.fetch_add(1, Ordering::Relaxed);
    }

    /// An element became sufficiently visible.
    pub fn session_started(&self) {
        self.sessions_started.fetch_add(1, Ordering::Relaxed);
    }

    /// An element dropped below the threshold before its dwell elapsed.
    pub fn session_abandoned(&self) {
        self.sessions_abandoned.fetch_add(1, Ordering::Relaxed);
    }

    pub fn impression_delivered(&self) {
        self.impressions_delivered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn reset(&self) {
        self.resets.fetch_add(1, Ordering::Relaxed);
    }

    /// Take a point-in-time copy of all counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            trackers_started: self.trackers_started.load(Ordering::Relaxed),
            trackers_disposed: self.trackers_disposed.load(Ordering::Relaxed),
            geometry_events: self.geometry_events.load(Ordering::Relaxed),
            sessions_started: self.sessions_started.load(Ordering::Relaxed),
            sessions_abandoned: self.sessions_abandoned.load(Ordering::Relaxed),
            impressions_delivered: self.impressions_delivered.load(Ordering::Relaxed),
            resets: self.resets.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`ImpressionMetrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub trackers_started: u64,
    pub trackers_disposed: u64,
    pub geometry_events: u64,
    pub sessions_started: u64,
    pub sessions_abandoned: u64,
    pub impressions_delivered: u64,
    pub resets: u64,
}

impl MetricsSnapshot {
    /// Trackers started but not yet disposed.
    pub fn live_trackers(&self) -> u64 {
        self.trackers_started.saturating_sub(self.trackers_disposed)
    }

    /// Fraction of started sessions that ended in an impression.
    pub fn conversion_rate(&self) -> f64 {
        if self.sessions_started == 0 {
            return 0.0;
        }
        self.impressions_delivered as f64 / self.sessions_started as f64
    }
}

impl fmt::Display for MetricsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} impressions from {} sessions ({} abandoned, {:.0}% converted), \
             {} geometry events, {} resets, {} live trackers",
            self.impressions_delivered,
            self.sessions_started,
            self.sessions_abandoned,
            self.conversion_rate() * 100.0,
            self.geometry_events,
            self.resets,
            self.live_trackers()
        )
    }
}
