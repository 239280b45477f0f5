//! Integration tests for impression tracking in a scrolling list.
//!
//! These tests drive many trackers the way a list UI would: every frame the
//! host recomputes each row's bounds from the scroll offset and reports them.
//! The Tokio clock is paused so frames and dwell times are deterministic.
//!
//! Run with: `cargo test --test list_scrolling_integration`

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use impression::{
    DwellPolicy, HostLifecycle, ImpressionConfig, ImpressionMetrics, ImpressionReceiver,
    ImpressionTracker, Rect,
};

// =============================================================================
// Test Fixtures
// =============================================================================

const ROW_HEIGHT: f32 = 300.0;
const VIEWPORT_HEIGHT: f32 = 1000.0;
const VIEWPORT_WIDTH: f32 = 1080.0;
const ROW_COUNT: usize = 10;
const FRAME: Duration = Duration::from_millis(16);

fn viewport() -> Rect {
    Rect::new(0.0, 0.0, VIEWPORT_WIDTH, VIEWPORT_HEIGHT)
}

/// Bounds of `row` in viewport coordinates at the given scroll offset.
fn row_bounds(row: usize, scroll_offset: f32) -> Rect {
    let top = row as f32 * ROW_HEIGHT - scroll_offset;
    Rect::new(0.0, top, VIEWPORT_WIDTH, top + ROW_HEIGHT)
}

/// One tracker per row, all feeding one queue.
struct ListHarness {
    trackers: Vec<ImpressionTracker<usize>>,
    receivers: Vec<ImpressionReceiver<usize>>,
    metrics: Arc<ImpressionMetrics>,
    scroll_offset: f32,
}

impl ListHarness {
    fn new(config: ImpressionConfig, lifecycle: &HostLifecycle) -> Self {
        let metrics = Arc::new(ImpressionMetrics::new());
        let mut trackers = Vec::with_capacity(ROW_COUNT);
        let mut receivers = Vec::with_capacity(ROW_COUNT);

        for row in 0..ROW_COUNT {
            let (delivery, receiver) = impression::Delivery::queued();
            let tracker = ImpressionTracker::builder(row)
                .config(config.clone())
                .lifecycle(lifecycle.signal())
                .delivery(delivery)
                .metrics(Arc::clone(&metrics))
                .spawn()
                .expect("tracker should start");
            trackers.push(tracker);
            receivers.push(receiver);
        }

        Self {
            trackers,
            receivers,
            metrics,
            scroll_offset: 0.0,
        }
    }

    /// Report every row's geometry for the current offset.
    fn layout(&self) {
        for (row, tracker) in self.trackers.iter().enumerate() {
            tracker.on_geometry_changed(row_bounds(row, self.scroll_offset), viewport());
        }
    }

    /// Hold the current offset for `duration`, laying out every frame.
    async fn hold(&self, duration: Duration) {
        let frames = (duration.as_millis() / FRAME.as_millis()).max(1);
        for _ in 0..frames {
            self.layout();
            tokio::time::sleep(FRAME).await;
        }
    }

    /// Scroll to `target` moving `step` pixels per frame.
    async fn scroll_to(&mut self, target: f32, step: f32) {
        while (self.scroll_offset - target).abs() > f32::EPSILON {
            let remaining = target - self.scroll_offset;
            self.scroll_offset += remaining.clamp(-step, step);
            self.layout();
            tokio::time::sleep(FRAME).await;
        }
    }

    /// Rows that have delivered an impression so far.
    fn impressed_rows(&mut self) -> HashSet<usize> {
        self.receivers
            .iter_mut()
            .flat_map(|receiver| receiver.drain())
            .map(|impression| impression.key)
            .collect()
    }
}

fn rows(items: &[usize]) -> HashSet<usize> {
    items.iter().copied().collect()
}

// =============================================================================
// Scrolling
// =============================================================================

/// Rows that sit on screen long enough fire; rows flung past do not.
#[tokio::test(start_paused = true)]
async fn test_fling_past_rows_without_impressions() {
    let lifecycle = HostLifecycle::active();
    let mut list = ListHarness::new(ImpressionConfig::default(), &lifecycle);

    // Rows 0-2 are fully visible, row 3 only a third.
    list.hold(Duration::from_millis(1500)).await;
    assert_eq!(list.impressed_rows(), rows(&[0, 1, 2]));

    // 2000px at 100px per frame takes ~320ms; nothing in between dwells.
    list.scroll_to(2000.0, 100.0).await;
    assert!(list.impressed_rows().is_empty());

    // Rows 7-9 settle on screen.
    list.hold(Duration::from_millis(1500)).await;
    assert_eq!(list.impressed_rows(), rows(&[7, 8, 9]));

    let snapshot = list.metrics.snapshot();
    assert_eq!(snapshot.impressions_delivered, 6);
    assert_eq!(snapshot.live_trackers(), ROW_COUNT as u64);
}

/// Scrolling a reported row away and back does not fire it again.
#[tokio::test(start_paused = true)]
async fn test_scroll_back_does_not_refire() {
    let lifecycle = HostLifecycle::active();
    let mut list = ListHarness::new(ImpressionConfig::default(), &lifecycle);

    list.hold(Duration::from_millis(1500)).await;
    assert_eq!(list.impressed_rows(), rows(&[0, 1, 2]));

    list.scroll_to(2000.0, 200.0).await;
    list.hold(Duration::from_millis(1500)).await;
    list.impressed_rows();

    list.scroll_to(0.0, 200.0).await;
    list.hold(Duration::from_millis(3000)).await;
    assert!(
        list.impressed_rows().is_empty(),
        "Already reported rows must stay quiet"
    );
}

/// A slow scroll keeps each row above threshold for well over the dwell.
#[tokio::test(start_paused = true)]
async fn test_slow_scroll_reports_every_row() {
    let lifecycle = HostLifecycle::active();
    let mut list = ListHarness::new(ImpressionConfig::default(), &lifecycle);

    // 2 px per frame: each row stays at least half visible for several seconds.
    list.scroll_to(2000.0, 2.0).await;
    list.hold(Duration::from_millis(1500)).await;

    assert_eq!(list.impressed_rows(), (0..ROW_COUNT).collect());
}

// =============================================================================
// Lifecycle
// =============================================================================

/// Nothing is delivered while the host is in the background.
#[tokio::test(start_paused = true)]
async fn test_background_defers_delivery_until_resume() {
    let lifecycle = HostLifecycle::active();
    let mut list = ListHarness::new(ImpressionConfig::default(), &lifecycle);

    list.hold(Duration::from_millis(200)).await;
    lifecycle.set_active(false);
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert!(list.impressed_rows().is_empty());

    // Wall-clock dwell: the visible rows fire right after resuming.
    lifecycle.set_active(true);
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(list.impressed_rows(), rows(&[0, 1, 2]));
}

/// Foreground-only dwell ignores the time spent in the background.
#[tokio::test(start_paused = true)]
async fn test_foreground_only_banks_dwell() {
    let lifecycle = HostLifecycle::active();
    let config = ImpressionConfig::default().with_dwell_policy(DwellPolicy::ForegroundOnly);
    let mut list = ListHarness::new(config, &lifecycle);

    list.hold(Duration::from_millis(600)).await;
    lifecycle.set_active(false);
    tokio::time::sleep(Duration::from_secs(5)).await;
    lifecycle.set_active(true);

    list.hold(Duration::from_millis(100)).await;
    assert!(list.impressed_rows().is_empty(), "Only ~700ms of foreground dwell");

    list.hold(Duration::from_millis(1000)).await;
    assert_eq!(list.impressed_rows(), rows(&[0, 1, 2]));
}

// =============================================================================
// Recycling
// =============================================================================

/// A recycled tracker reports each item it is bound to once.
#[tokio::test(start_paused = true)]
async fn test_rebound_tracker_reports_each_item() {
    let lifecycle = HostLifecycle::active();
    let (tracker, mut impressions) =
        ImpressionTracker::queued("item-a", ImpressionConfig::default(), lifecycle.signal())
            .unwrap();

    let slot = Rect::new(0.0, 100.0, VIEWPORT_WIDTH, 400.0);
    for _ in 0..100 {
        tracker.on_geometry_changed(slot, viewport());
        tokio::time::sleep(FRAME).await;
    }

    tracker.rebind("item-b");
    for _ in 0..100 {
        tracker.on_geometry_changed(slot, viewport());
        tokio::time::sleep(FRAME).await;
    }

    let delivered = impressions.drain();
    let keys: Vec<_> = delivered.iter().map(|i| (i.key, i.session)).collect();
    assert_eq!(keys, vec![("item-a", 0), ("item-b", 1)]);
}

// =============================================================================
// Teardown
// =============================================================================

/// Dropping every tracker stops every monitor and closes every queue.
#[tokio::test(start_paused = true)]
async fn test_dropping_list_stops_everything() {
    let lifecycle = HostLifecycle::active();
    let mut list = ListHarness::new(ImpressionConfig::default(), &lifecycle);
    list.hold(Duration::from_millis(200)).await;

    let metrics = Arc::clone(&list.metrics);
    let trackers = std::mem::take(&mut list.trackers);
    drop(trackers);
    tokio::time::sleep(Duration::from_millis(10)).await;

    for receiver in list.receivers.iter_mut() {
        assert!(receiver.recv().await.is_none());
    }

    let snapshot = metrics.snapshot();
    assert_eq!(snapshot.live_trackers(), 0);
    assert_eq!(snapshot.impressions_delivered, 0);
    assert_eq!(snapshot.sessions_started, 3);
}
