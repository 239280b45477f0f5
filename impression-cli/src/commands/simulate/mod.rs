//! Simulate command - drive impression trackers over a headless scrolling list.
//!
//! The simulated host behaves like a virtualized list UI: only the cards
//! overlapping the viewport are attached, each attached card is bound to a
//! tracker slot, and slots are recycled (rebound) as cards scroll out. Every
//! frame reports each attached card's bounds, exactly as a layout pass would.
//!
//! ```text
//!  frame ticker ──► ScrollPlan ──► ListLayout ──► RecyclingList ──► trackers
//!       │                                                              │
//!       └──► BackgroundPlan ──► HostLifecycle                 impressions
//!                                                                      ▼
//!                                                                   stdout
//! ```

mod layout;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::Args;
use impression::{
    Delivery, DeliveryMode, HostLifecycle, Impression, ImpressionConfig, ImpressionMetrics,
    ImpressionReceiver, ImpressionTracker, LifecycleSignal, MetricsSnapshot,
};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

pub use layout::{BackgroundPlan, ListLayout, ScrollPlan};

use super::common::TrackerOptions;
use crate::error::CliError;

/// Arguments for the simulate command.
#[derive(Debug, Args)]
pub struct SimulateArgs {
    #[command(flatten)]
    pub tracker: TrackerOptions,

    /// Number of cards in the list
    #[arg(long, default_value_t = 50)]
    pub items: usize,

    /// Height of each card in pixels
    #[arg(long, default_value_t = 400.0)]
    pub item_height: f32,

    /// Viewport width in pixels
    #[arg(long, default_value_t = 1080.0)]
    pub viewport_width: f32,

    /// Viewport height in pixels
    #[arg(long, default_value_t = 1920.0)]
    pub viewport_height: f32,

    /// Scroll speed in pixels per second
    #[arg(long, default_value_t = 800.0)]
    pub scroll_speed: f32,

    /// Length of each scroll burst
    #[arg(long, value_name = "MS", default_value_t = 1500)]
    pub scroll_ms: u64,

    /// Pause between scroll bursts (0 scrolls continuously)
    #[arg(long, value_name = "MS", default_value_t = 2000)]
    pub pause_ms: u64,

    /// Send the host to the background after this much time (0 never does)
    #[arg(long, value_name = "MS", default_value_t = 0)]
    pub background_every_ms: u64,

    /// How long each background trip lasts
    #[arg(long, value_name = "MS", default_value_t = 3000)]
    pub background_for_ms: u64,

    /// Total simulated time in seconds
    #[arg(long, value_name = "SECS", default_value_t = 20)]
    pub duration: u64,

    /// Interval between layout passes
    #[arg(long, value_name = "MS", default_value_t = 16)]
    pub frame_ms: u64,
}

/// Validated simulation parameters.
#[derive(Debug, Clone)]
pub struct SimulationPlan {
    pub layout: ListLayout,
    pub scroll: ScrollPlan,
    pub background: BackgroundPlan,
    pub frame: Duration,
    pub duration: Duration,
}

impl SimulateArgs {
    /// Validate the arguments into a plan.
    pub fn plan(&self) -> Result<SimulationPlan, CliError> {
        let layout = ListLayout::new(
            self.items,
            self.item_height,
            self.viewport_width,
            self.viewport_height,
        )?;

        if !self.scroll_speed.is_finite() || self.scroll_speed < 0.0 {
            return Err(CliError::Config(format!(
                "scroll speed must be zero or positive, got {}",
                self.scroll_speed
            )));
        }
        if self.frame_ms == 0 {
            return Err(CliError::Config("frame interval must be at least 1ms".to_string()));
        }
        if self.duration == 0 {
            return Err(CliError::Config("duration must be at least 1s".to_string()));
        }

        let background = if self.background_every_ms == 0 {
            BackgroundPlan::never()
        } else {
            BackgroundPlan {
                every: Duration::from_millis(self.background_every_ms),
                length: Duration::from_millis(self.background_for_ms),
            }
        };

        Ok(SimulationPlan {
            layout,
            scroll: ScrollPlan {
                speed: self.scroll_speed,
                scroll_for: Duration::from_millis(self.scroll_ms),
                pause_for: Duration::from_millis(self.pause_ms),
            },
            background,
            frame: Duration::from_millis(self.frame_ms),
            duration: Duration::from_secs(self.duration),
        })
    }
}

/// What a finished simulation did.
#[derive(Debug, Clone)]
pub struct SimulationSummary {
    /// Wall time simulated.
    pub elapsed: Duration,
    /// Scroll offset at the end.
    pub final_offset: f32,
    /// Tracker slots created; slots are reused as cards scroll away.
    pub slots: usize,
    /// Impressions the host received.
    pub impressions: u64,
    /// Stopped by Ctrl+C before the duration elapsed.
    pub interrupted: bool,
    pub metrics: MetricsSnapshot,
}

/// Run the simulate command.
pub fn run(args: SimulateArgs) -> Result<(), CliError> {
    let config = args.tracker.resolve()?;
    let plan = args.plan()?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| CliError::RuntimeCreation(e.to_string()))?;

    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    ctrlc::set_handler(move || signal_token.cancel())
        .map_err(|e| CliError::SignalHandler(e.to_string()))?;

    println!(
        "Simulating {} cards of {}px in a {}x{} viewport for {}s",
        plan.layout.item_count(),
        args.item_height,
        args.viewport_width,
        args.viewport_height,
        plan.duration.as_secs()
    );
    println!(
        "Threshold {:.0}%, dwell {}ms, check every {}ms, {} policy, {} delivery",
        config.visibility_threshold * 100.0,
        config.min_dwell.as_millis(),
        config.check_interval.as_millis(),
        config.dwell_policy.as_str(),
        config.delivery.as_str()
    );
    println!("Press Ctrl+C to stop early");
    println!();

    let summary = runtime.block_on(simulate(plan, config, shutdown))?;

    println!();
    if summary.interrupted {
        println!("Interrupted after {:.1}s", summary.elapsed.as_secs_f32());
    }
    println!(
        "Scrolled to {:.0}px using {} tracker slots",
        summary.final_offset, summary.slots
    );
    println!("Received {} impressions", summary.impressions);
    println!("{}", summary.metrics);

    Ok(())
}

/// Run the frame loop until the plan's duration elapses or `shutdown` fires.
pub async fn simulate(
    plan: SimulationPlan,
    config: ImpressionConfig,
    shutdown: CancellationToken,
) -> Result<SimulationSummary, CliError> {
    let lifecycle = HostLifecycle::active();
    let metrics = Arc::new(ImpressionMetrics::new());
    let origin = tokio::time::Instant::now();
    let counted = Arc::new(AtomicU64::new(0));

    let (delivery, mut receiver) = match config.delivery {
        DeliveryMode::Queued => {
            let (delivery, receiver) = Delivery::queued();
            (delivery, Some(receiver))
        }
        DeliveryMode::Callback => {
            let counted = Arc::clone(&counted);
            let origin = origin.into_std();
            let delivery = Delivery::callback(move |impression: &Impression<usize>| {
                println!("{}", format_impression(impression, origin));
                counted.fetch_add(1, Ordering::Relaxed);
            });
            (delivery, None)
        }
    };

    let mut list = RecyclingList::new(
        plan.layout.clone(),
        config,
        &lifecycle,
        delivery,
        Arc::clone(&metrics),
    );

    let mut frames = tokio::time::interval(plan.frame);
    frames.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let mut foreground = Duration::ZERO;
    let mut last_frame = origin;
    let mut offset = 0.0;
    let mut interrupted = false;

    info!(items = plan.layout.item_count(), "Simulation starting");

    loop {
        tokio::select! {
            biased;

            _ = shutdown.cancelled() => {
                interrupted = true;
                break;
            }

            _ = frames.tick() => {}
        }

        let now = tokio::time::Instant::now();
        let elapsed = now.duration_since(origin);
        if elapsed >= plan.duration {
            break;
        }

        let background = plan.background.is_background(elapsed);
        if background == lifecycle.state().is_active() {
            lifecycle.set_active(!background);
            println!(
                "[{:>8.3}s] host moved to the {}",
                elapsed.as_secs_f32(),
                if background { "background" } else { "foreground" }
            );
        }

        if !background {
            foreground += now.duration_since(last_frame);
            offset = plan.scroll.offset_at(foreground, plan.layout.max_offset());
            list.layout_pass(offset)?;
        }
        last_frame = now;

        if let Some(receiver) = receiver.as_mut() {
            print_queued(receiver, origin.into_std(), &counted);
        }
    }

    let slots = list.slot_count();
    drop(list);

    if let Some(receiver) = receiver.as_mut() {
        print_queued(receiver, origin.into_std(), &counted);
    }

    info!(interrupted, "Simulation finished");

    Ok(SimulationSummary {
        elapsed: origin.elapsed(),
        final_offset: offset,
        slots,
        impressions: counted.load(Ordering::Relaxed),
        interrupted,
        metrics: metrics.snapshot(),
    })
}

fn print_queued(receiver: &mut ImpressionReceiver<usize>, origin: Instant, counted: &AtomicU64) {
    for impression in receiver.drain() {
        println!("{}", format_impression(&impression, origin));
        counted.fetch_add(1, Ordering::Relaxed);
    }
}

/// One output line per impression, timestamped from the start of the run.
fn format_impression(impression: &Impression<usize>, origin: Instant) -> String {
    format!(
        "[{:>8.3}s] impression card #{} (slot session {}, dwell {}ms)",
        impression
            .reported_at
            .saturating_duration_since(origin)
            .as_secs_f32(),
        impression.key,
        impression.session,
        impression.dwell.as_millis()
    )
}

/// A tracker slot, bound to at most one card at a time.
struct Slot {
    tracker: ImpressionTracker<usize>,
    card: Option<usize>,
}

/// Virtualized list: trackers exist only for attached cards and are reused.
struct RecyclingList {
    layout: ListLayout,
    config: ImpressionConfig,
    lifecycle: LifecycleSignal,
    delivery: Delivery<usize>,
    metrics: Arc<ImpressionMetrics>,
    slots: Vec<Slot>,
    attached: HashMap<usize, usize>,
}

impl RecyclingList {
    fn new(
        layout: ListLayout,
        config: ImpressionConfig,
        lifecycle: &HostLifecycle,
        delivery: Delivery<usize>,
        metrics: Arc<ImpressionMetrics>,
    ) -> Self {
        Self {
            layout,
            config,
            lifecycle: lifecycle.signal(),
            delivery,
            metrics,
            slots: Vec::new(),
            attached: HashMap::new(),
        }
    }

    fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// Attach and detach cards for `offset`, then report every attached card.
    fn layout_pass(&mut self, offset: f32) -> Result<(), CliError> {
        let range = self.layout.attached_range(offset);
        let viewport = self.layout.viewport();

        let detached: Vec<usize> = self
            .attached
            .keys()
            .copied()
            .filter(|card| !range.contains(card))
            .collect();
        for card in detached {
            if let Some(index) = self.attached.remove(&card) {
                let slot = &mut self.slots[index];
                // Last report before detaching shows the card off screen.
                slot.tracker
                    .on_geometry_changed(self.layout.item_bounds(card, offset), viewport);
                slot.card = None;
            }
        }

        for card in range {
            if !self.attached.contains_key(&card) {
                let index = self.acquire(card)?;
                self.attached.insert(card, index);
            }
        }

        for (&card, &index) in &self.attached {
            self.slots[index]
                .tracker
                .on_geometry_changed(self.layout.item_bounds(card, offset), viewport);
        }

        Ok(())
    }

    /// Bind `card` to a free slot, creating one if none is free.
    fn acquire(&mut self, card: usize) -> Result<usize, CliError> {
        if let Some(index) = self.slots.iter().position(|slot| slot.card.is_none()) {
            let slot = &mut self.slots[index];
            slot.tracker.rebind(card);
            slot.card = Some(card);
            return Ok(index);
        }

        let tracker = ImpressionTracker::builder(card)
            .config(self.config.clone())
            .lifecycle(self.lifecycle.clone())
            .delivery(self.delivery.clone())
            .metrics(Arc::clone(&self.metrics))
            .spawn()?;

        debug!(card, slot = self.slots.len(), "Created tracker slot");
        self.slots.push(Slot {
            tracker,
            card: Some(card),
        });
        Ok(self.slots.len() - 1)
    }
}
