//! Impression tracker for one on-screen element occurrence.
//!
//! An [`ImpressionTracker`] is created when an element attaches to the
//! visible hierarchy and lives until it detaches. It owns:
//!
//! - the element's [`ImpressionState`] behind a mutex shared with its monitor
//! - exactly one monitor task that runs the dwell check while the host is in
//!   the foreground
//! - the [`Delivery`] that receives the impression
//!
//! # Architecture
//!
//! ```text
//!  host layout pass ──► on_geometry_changed ──┐
//!                                             ▼
//!                                    ┌──────────────────┐
//!  HostLifecycle ──► monitor task ──►│ Mutex<Inner>     │──► Delivery ──► host
//!  (watch)           (tick / wait)   │  ImpressionState │   (callback / queue)
//!                                    └──────────────────┘
//! ```
//!
//! The check re-validates `disposed` and `reported` and delivers while still
//! holding the lock, so once `reset()` or `dispose()` returns no stale
//! impression can be delivered.
//!
//! # Example
//!
//! ```no_run
//! use impression::{HostLifecycle, ImpressionConfig, ImpressionTracker, Rect};
//!
//! # async fn demo() -> Result<(), impression::ImpressionError> {
//! let lifecycle = HostLifecycle::active();
//! let (tracker, mut impressions) =
//!     ImpressionTracker::queued("card-7", ImpressionConfig::default(), lifecycle.signal())?;
//!
//! // On every layout pass:
//! let screen = Rect::new(0.0, 0.0, 1080.0, 1920.0);
//! tracker.on_geometry_changed(Rect::new(0.0, 200.0, 1080.0, 600.0), screen);
//!
//! // Elsewhere, the single listener:
//! if let Some(impression) = impressions.recv().await {
//!     println!("impression for {}", impression.key);
//! }
//! # Ok(())
//! # }
//! ```

use std::cell::Cell;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Mutex, MutexGuard};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::ImpressionConfig;
use crate::delivery::{Delivery, Impression, ImpressionReceiver};
use crate::error::{ImpressionError, Result};
use crate::geometry::Rect;
use crate::lifecycle::LifecycleSignal;
use crate::state::{GeometryOutcome, ImpressionPhase, ImpressionState};
use crate::telemetry::ImpressionMetrics;

/// Current time on the Tokio clock.
///
/// Using Tokio's clock keeps geometry timestamps and monitor ticks on the
/// same timeline, including under a paused test clock.
fn now() -> Instant {
    tokio::time::Instant::now().into_std()
}

/// Milliseconds for log fields, saturating instead of truncating.
fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

thread_local! {
    /// Address of the tracker state whose callback is running on this thread.
    static DELIVERING: Cell<usize> = const { Cell::new(0) };
}

/// Marks a callback delivery in progress on this thread until dropped.
struct DeliveringGuard {
    previous: usize,
}

impl DeliveringGuard {
    fn enter(inner: usize) -> Self {
        Self {
            previous: DELIVERING.with(|d| d.replace(inner)),
        }
    }
}

impl Drop for DeliveringGuard {
    fn drop(&mut self) {
        DELIVERING.with(|d| d.set(self.previous));
    }
}

/// State shared between the tracker handle and its monitor task.
struct TrackerInner<K> {
    key: K,
    session: u64,
    state: ImpressionState,
    delivery: Delivery<K>,
    disposed: bool,
}

impl<K: Clone + fmt::Debug> TrackerInner<K> {
    /// Deliver the impression if the dwell has elapsed. Runs under the lock.
    fn check_and_deliver(&mut self, now: Instant, metrics: Option<&ImpressionMetrics>) -> bool {
        if self.disposed {
            return false;
        }

        let Some(dwell) = self.state.poll(now) else {
            return false;
        };

        let impression = Impression {
            key: self.key.clone(),
            session: self.session,
            visible_since: self.state.visible_since().unwrap_or(now),
            reported_at: now,
            dwell,
        };

        info!(
            key = ?impression.key,
            session = impression.session,
            dwell_ms = millis(dwell),
            "Impression confirmed"
        );

        let _delivering = DeliveringGuard::enter(self as *const Self as usize);
        self.delivery.deliver(impression);
        if let Some(metrics) = metrics {
            metrics.impression_delivered();
        }
        true
    }

    /// Start a new session, optionally for a different key.
    fn restart(&mut self, key: Option<K>) {
        self.state.reset();
        self.session += 1;
        if let Some(key) = key {
            self.key = key;
        }
    }
}

/// Builder for [`ImpressionTracker`].
pub struct TrackerBuilder<K> {
    key: K,
    config: ImpressionConfig,
    lifecycle: Option<LifecycleSignal>,
    delivery: Option<Delivery<K>>,
    metrics: Option<Arc<ImpressionMetrics>>,
}

impl<K> TrackerBuilder<K>
where
    K: Clone + fmt::Debug + Send + 'static,
{
    /// Use the given configuration instead of the defaults.
    pub fn config(mut self, config: ImpressionConfig) -> Self {
        self.config = config;
        self
    }

    /// Gate dwell checks on the given host lifecycle.
    ///
    /// Without one the tracker behaves as if the host were always active.
    pub fn lifecycle(mut self, lifecycle: LifecycleSignal) -> Self {
        self.lifecycle = Some(lifecycle);
        self
    }

    /// Set where impressions go. Must match `config.delivery`.
    pub fn delivery(mut self, delivery: Delivery<K>) -> Self {
        self.delivery = Some(delivery);
        self
    }

    /// Record activity into shared metrics.
    pub fn metrics(mut self, metrics: Arc<ImpressionMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Validate and start the tracker on the current Tokio runtime.
    pub fn spawn(self) -> Result<ImpressionTracker<K>> {
        let runtime = Handle::try_current().map_err(|_| ImpressionError::NoRuntime)?;
        self.start(&runtime)
    }

    /// Validate and start the tracker, spawning its monitor on `runtime`.
    pub fn start(self, runtime: &Handle) -> Result<ImpressionTracker<K>> {
        self.config.validate()?;

        let delivery = self.delivery.ok_or_else(|| {
            ImpressionError::InvalidConfig("no impression delivery configured".to_string())
        })?;
        if delivery.mode() != self.config.delivery {
            return Err(ImpressionError::InvalidConfig(format!(
                "delivery mode '{}' does not match configured '{}'",
                delivery.mode().as_str(),
                self.config.delivery.as_str()
            )));
        }

        let mut lifecycle = self.lifecycle.unwrap_or_else(LifecycleSignal::always_active);

        let mut state = ImpressionState::new(&self.config);
        if !lifecycle.current().is_active() {
            state.suspend(now());
        }

        let inner = Arc::new(Mutex::new(TrackerInner {
            key: self.key,
            session: 0,
            state,
            delivery,
            disposed: false,
        }));

        let cancellation = CancellationToken::new();
        let monitor = runtime.spawn(run_monitor(
            Arc::clone(&inner),
            lifecycle.clone(),
            self.config.check_interval,
            cancellation.clone(),
            self.metrics.clone(),
        ));

        if let Some(metrics) = &self.metrics {
            metrics.tracker_started();
        }

        debug!(
            threshold = self.config.visibility_threshold,
            min_dwell_ms = millis(self.config.min_dwell),
            check_interval_ms = millis(self.config.check_interval),
            policy = self.config.dwell_policy.as_str(),
            "Impression tracker started"
        );

        Ok(ImpressionTracker {
            inner,
            config: self.config,
            lifecycle,
            cancellation,
            monitor,
            metrics: self.metrics,
        })
    }
}

/// Tracks visibility of one element and delivers its impression.
///
/// Dropping the tracker disposes it.
pub struct ImpressionTracker<K>
where
    K: Clone + fmt::Debug + Send + 'static,
{
    inner: Arc<Mutex<TrackerInner<K>>>,
    config: ImpressionConfig,
    lifecycle: LifecycleSignal,
    cancellation: CancellationToken,
    monitor: JoinHandle<()>,
    metrics: Option<Arc<ImpressionMetrics>>,
}

impl<K> fmt::Debug for ImpressionTracker<K>
where
    K: Clone + fmt::Debug + Send + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.lock();
        f.debug_struct("ImpressionTracker")
            .field("key", &inner.key)
            .field("session", &inner.session)
            .field("phase", &inner.state.phase())
            .field("disposed", &inner.disposed)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl<K> ImpressionTracker<K>
where
    K: Clone + fmt::Debug + Send + 'static,
{
    /// Lock the shared state.
    ///
    /// Debug builds panic instead of deadlocking when an impression callback
    /// calls back into the tracker that is delivering to it.
    fn lock(&self) -> MutexGuard<'_, TrackerInner<K>> {
        debug_assert!(
            DELIVERING.with(|d| d.get()) != self.inner.data_ptr() as usize,
            "impression callback called back into its own tracker"
        );
        self.inner.lock()
    }

    /// Start building a tracker for `key`.
    pub fn builder(key: K) -> TrackerBuilder<K> {
        TrackerBuilder {
            key,
            config: ImpressionConfig::default(),
            lifecycle: None,
            delivery: None,
            metrics: None,
        }
    }

    /// Start a tracker with queued delivery on the current runtime.
    ///
    /// `config.delivery` is forced to [`DeliveryMode::Queued`](crate::DeliveryMode::Queued).
    pub fn queued(
        key: K,
        config: ImpressionConfig,
        lifecycle: LifecycleSignal,
    ) -> Result<(Self, ImpressionReceiver<K>)> {
        let (delivery, receiver) = Delivery::queued();
        let tracker = Self::builder(key)
            .config(config.with_delivery(crate::config::DeliveryMode::Queued))
            .lifecycle(lifecycle)
            .delivery(delivery)
            .spawn()?;
        Ok((tracker, receiver))
    }

    /// Report new geometry for the element.
    ///
    /// `element` is the element's bounds and `container_visible` the visible
    /// rectangle of its container, in the same coordinate space. Never
    /// delivers an impression itself.
    pub fn on_geometry_changed(&self, element: Rect, container_visible: Rect) {
        let mut inner = self.lock();
        if inner.disposed {
            return;
        }

        let outcome = inner
            .state
            .on_geometry_changed(&element, &container_visible, now());

        if let Some(metrics) = &self.metrics {
            metrics.geometry_event();
        }

        match outcome {
            GeometryOutcome::SessionStarted => {
                debug!(key = ?inner.key, session = inner.session, "Element became visible");
                if let Some(metrics) = &self.metrics {
                    metrics.session_started();
                }
            }
            GeometryOutcome::SessionAbandoned => {
                debug!(key = ?inner.key, session = inner.session, "Element left view before dwell elapsed");
                if let Some(metrics) = &self.metrics {
                    metrics.session_abandoned();
                }
            }
            GeometryOutcome::Ignored
            | GeometryOutcome::SessionContinued
            | GeometryOutcome::StillIdle => {}
        }
    }

    /// Run the dwell check immediately instead of waiting for the next tick.
    ///
    /// Does nothing while the host is inactive. Returns `true` if this call
    /// delivered the impression.
    pub fn check_now(&self) -> bool {
        if !self.lifecycle.is_active() {
            return false;
        }
        let mut inner = self.lock();
        let now = now();
        // The monitor may not have observed the foreground change yet.
        inner.state.resume(now);
        inner.check_and_deliver(now, self.metrics.as_deref())
    }

    /// Clear the session so the element can earn a fresh impression.
    ///
    /// Call when the element is recycled or re-attached for the same item.
    pub fn reset(&self) {
        let mut inner = self.lock();
        if inner.disposed {
            return;
        }
        inner.restart(None);
        debug!(key = ?inner.key, session = inner.session, "Impression tracker reset");
        drop(inner);

        if let Some(metrics) = &self.metrics {
            metrics.reset();
        }
    }

    /// Recycle the tracker for a different logical item.
    ///
    /// Impressions already queued keep the key they fired with.
    pub fn rebind(&self, key: K) {
        let mut inner = self.lock();
        if inner.disposed {
            return;
        }
        let previous = inner.key.clone();
        inner.restart(Some(key));
        debug!(
            from = ?previous,
            to = ?inner.key,
            session = inner.session,
            "Impression tracker rebound"
        );
        drop(inner);

        if let Some(metrics) = &self.metrics {
            metrics.reset();
        }
    }

    /// Stop tracking permanently and cancel the monitor task.
    ///
    /// Idempotent. No impression is delivered after this returns.
    pub fn dispose(&self) {
        let mut inner = self.lock();
        if inner.disposed {
            return;
        }
        inner.disposed = true;
        inner.state.reset();
        debug!(key = ?inner.key, "Impression tracker disposed");
        drop(inner);

        self.cancellation.cancel();
        if let Some(metrics) = &self.metrics {
            metrics.tracker_disposed();
        }
    }

    /// Key of the item currently bound to this tracker.
    pub fn key(&self) -> K {
        self.lock().key.clone()
    }

    /// Current session number.
    pub fn session(&self) -> u64 {
        self.lock().session
    }

    /// Idle, Accumulating or Reported.
    pub fn phase(&self) -> ImpressionPhase {
        self.lock().state.phase()
    }

    /// True once the current session's impression has been delivered.
    pub fn is_reported(&self) -> bool {
        self.lock().state.is_reported()
    }

    /// When the element most recently became sufficiently visible.
    pub fn visible_since(&self) -> Option<Instant> {
        self.lock().state.visible_since()
    }

    /// Dwell credited so far in the current session.
    pub fn dwell(&self) -> Duration {
        self.lock().state.dwell(now())
    }

    /// True after [`dispose`](Self::dispose) or drop.
    pub fn is_disposed(&self) -> bool {
        self.lock().disposed
    }

    /// True while the monitor task is still alive.
    pub fn is_monitor_running(&self) -> bool {
        !self.monitor.is_finished()
    }

    /// The validated configuration the tracker runs with.
    pub fn config(&self) -> &ImpressionConfig {
        &self.config
    }
}

impl<K> Drop for ImpressionTracker<K>
where
    K: Clone + fmt::Debug + Send + 'static,
{
    fn drop(&mut self) {
        self.dispose();
    }
}

/// Why the active phase of the monitor ended.
enum ActiveExit {
    /// Host moved to the background.
    Inactive,
    /// Tracker disposed or lifecycle source gone.
    Stop,
}

/// Monitor loop: wait while inactive, tick while active.
async fn run_monitor<K>(
    inner: Arc<Mutex<TrackerInner<K>>>,
    mut lifecycle: LifecycleSignal,
    check_interval: Duration,
    cancellation: CancellationToken,
    metrics: Option<Arc<ImpressionMetrics>>,
) where
    K: Clone + fmt::Debug + Send + 'static,
{
    debug!("Impression monitor starting");

    loop {
        if cancellation.is_cancelled() {
            break;
        }

        if lifecycle.current().is_active() {
            inner.lock().state.resume(now());

            match run_active(
                &inner,
                &mut lifecycle,
                check_interval,
                &cancellation,
                metrics.as_deref(),
            )
            .await
            {
                ActiveExit::Inactive => continue,
                ActiveExit::Stop => break,
            }
        }

        inner.lock().state.suspend(now());

        tokio::select! {
            biased;

            _ = cancellation.cancelled() => break,

            changed = lifecycle.changed() => {
                if changed.is_err() {
                    debug!("Lifecycle source closed while inactive");
                    break;
                }
            }
        }
    }

    debug!("Impression monitor stopped");
}

/// Tick until the host goes inactive or the tracker stops.
///
/// The first tick fires immediately, so a dwell that elapsed while the host
/// was in the background is picked up as soon as it returns.
async fn run_active<K>(
    inner: &Mutex<TrackerInner<K>>,
    lifecycle: &mut LifecycleSignal,
    check_interval: Duration,
    cancellation: &CancellationToken,
    metrics: Option<&ImpressionMetrics>,
) -> ActiveExit
where
    K: Clone + fmt::Debug + Send + 'static,
{
    let mut ticker = tokio::time::interval(check_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;

            _ = cancellation.cancelled() => return ActiveExit::Stop,

            changed = lifecycle.changed() => match changed {
                Err(_) => {
                    debug!("Lifecycle source closed");
                    return ActiveExit::Stop;
                }
                Ok(state) if !state.is_active() => return ActiveExit::Inactive,
                Ok(_) => {}
            },

            _ = ticker.tick() => {
                if !tick(inner, metrics) {
                    return ActiveExit::Stop;
                }
            }
        }
    }
}

/// One dwell check. Returns `false` once the tracker has been disposed.
fn tick<K>(inner: &Mutex<TrackerInner<K>>, metrics: Option<&ImpressionMetrics>) -> bool
where
    K: Clone + fmt::Debug,
{
    let mut guard = inner.lock();
    if guard.disposed {
        return false;
    }
    guard.check_and_deliver(now(), metrics);
    true
}
