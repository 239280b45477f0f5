//! Geometry and timing of the simulated list.
//!
//! All of this is pure arithmetic on the elapsed foreground time so the
//! simulation is reproducible frame by frame.

use std::ops::Range;
use std::time::Duration;

use impression::Rect;

use crate::error::CliError;

/// A vertical list of equally tall cards inside a fixed viewport.
#[derive(Debug, Clone, PartialEq)]
pub struct ListLayout {
    item_count: usize,
    item_height: f32,
    viewport: Rect,
}

impl ListLayout {
    pub fn new(
        item_count: usize,
        item_height: f32,
        viewport_width: f32,
        viewport_height: f32,
    ) -> Result<Self, CliError> {
        if item_count == 0 {
            return Err(CliError::Config("items must be at least 1".to_string()));
        }
        if !item_height.is_finite() || item_height <= 0.0 {
            return Err(CliError::Config(format!(
                "item height must be positive, got {}",
                item_height
            )));
        }
        if !viewport_width.is_finite()
            || !viewport_height.is_finite()
            || viewport_width <= 0.0
            || viewport_height <= 0.0
        {
            return Err(CliError::Config(format!(
                "viewport must be positive, got {}x{}",
                viewport_width, viewport_height
            )));
        }

        Ok(Self {
            item_count,
            item_height,
            viewport: Rect::from_origin_size(0.0, 0.0, viewport_width, viewport_height),
        })
    }

    pub fn item_count(&self) -> usize {
        self.item_count
    }

    /// The viewport, which is also the container's visible rectangle.
    pub fn viewport(&self) -> Rect {
        self.viewport
    }

    pub fn content_height(&self) -> f32 {
        self.item_count as f32 * self.item_height
    }

    /// Largest scroll offset that still fills the viewport.
    pub fn max_offset(&self) -> f32 {
        (self.content_height() - self.viewport.height()).max(0.0)
    }

    /// Bounds of `index` in viewport coordinates at the given scroll offset.
    pub fn item_bounds(&self, index: usize, offset: f32) -> Rect {
        let top = index as f32 * self.item_height - offset;
        Rect::from_origin_size(0.0, top, self.viewport.width(), self.item_height)
    }

    /// Items overlapping the viewport, which a virtualized list keeps attached.
    pub fn attached_range(&self, offset: f32) -> Range<usize> {
        let offset = offset.clamp(0.0, self.max_offset());
        let first = (offset / self.item_height).floor() as usize;
        let end = ((offset + self.viewport.height()) / self.item_height).ceil() as usize;
        first.min(self.item_count)..end.min(self.item_count)
    }
}

/// Scroll for a while, pause, repeat.
#[derive(Debug, Clone, PartialEq)]
pub struct ScrollPlan {
    /// Pixels per second while moving.
    pub speed: f32,
    /// Length of each scroll burst.
    pub scroll_for: Duration,
    /// Pause after each burst; zero scrolls continuously.
    pub pause_for: Duration,
}

impl ScrollPlan {
    /// Scroll offset after `elapsed` foreground time, stopping at `max_offset`.
    pub fn offset_at(&self, elapsed: Duration, max_offset: f32) -> f32 {
        let moving = self.moving_time(elapsed);
        (moving.as_secs_f32() * self.speed).clamp(0.0, max_offset)
    }

    fn moving_time(&self, elapsed: Duration) -> Duration {
        if self.pause_for.is_zero() {
            return elapsed;
        }
        if self.scroll_for.is_zero() {
            return Duration::ZERO;
        }

        let scroll_ms = self.scroll_for.as_millis();
        let cycle_ms = scroll_ms + self.pause_for.as_millis();
        let elapsed_ms = elapsed.as_millis();

        let moving_ms = (elapsed_ms / cycle_ms) * scroll_ms + (elapsed_ms % cycle_ms).min(scroll_ms);
        Duration::from_millis(u64::try_from(moving_ms).unwrap_or(u64::MAX))
    }
}

/// Periodically send the host to the background.
#[derive(Debug, Clone, PartialEq)]
pub struct BackgroundPlan {
    /// Foreground time between background trips; zero disables them.
    pub every: Duration,
    /// How long each background trip lasts.
    pub length: Duration,
}

impl BackgroundPlan {
    /// Never go to the background.
    pub fn never() -> Self {
        Self {
            every: Duration::ZERO,
            length: Duration::ZERO,
        }
    }

    /// Whether the host is in the background `elapsed` wall time after start.
    pub fn is_background(&self, elapsed: Duration) -> bool {
        if self.every.is_zero() || self.length.is_zero() {
            return false;
        }
        let cycle_ms = self.every.as_millis() + self.length.as_millis();
        elapsed.as_millis() % cycle_ms >= self.every.as_millis()
    }
}
