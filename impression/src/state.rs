//! Impression state machine.
//!
//! [`ImpressionState`] holds everything needed to decide whether one element
//! occurrence has earned an impression. It is pure: the caller supplies every
//! timestamp, so the same code runs under the async tracker and in
//! deterministic tests.
//!
//! # State Machine
//!
//! ```text
//! Idle --[visible fraction >= threshold]--> Accumulating
//! Accumulating --[fraction < threshold, or no overlap]--> Idle
//! Accumulating --[poll: dwell >= min_dwell]--> Reported
//! Reported --[reset]--> Idle
//! ```
//!
//! Once Reported, geometry updates are ignored entirely until [`reset`].
//!
//! [`reset`]: ImpressionState::reset

use std::time::{Duration, Instant};

use crate::config::{DwellPolicy, ImpressionConfig};
use crate::geometry::{visibility, Rect, Visibility};

/// Coarse phase of a tracked element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImpressionPhase {
    /// Not sufficiently visible.
    Idle,
    /// Sufficiently visible, dwell timer running.
    Accumulating,
    /// Impression delivered; terminal until reset.
    Reported,
}

/// Effect of a single geometry observation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GeometryOutcome {
    /// Already reported; the observation was not evaluated.
    Ignored,
    /// Element became sufficiently visible; a new dwell timer started.
    SessionStarted,
    /// Element is still sufficiently visible; the timer keeps running.
    SessionContinued,
    /// Element dropped below the threshold; the timer was cleared.
    SessionAbandoned,
    /// Element was not visible enough before and still is not.
    StillIdle,
}

/// Dwell timer for the current qualifying interval.
#[derive(Debug, Clone, Copy)]
struct DwellTimer {
    /// When the element most recently became sufficiently visible.
    visible_since: Instant,
    /// Dwell credited before the current running segment.
    banked: Duration,
    /// Start of the running segment, `None` while paused.
    running_since: Option<Instant>,
}

impl DwellTimer {
    fn start(now: Instant, running: bool) -> Self {
        Self {
            visible_since: now,
            banked: Duration::ZERO,
            running_since: running.then_some(now),
        }
    }

    fn elapsed(&self, now: Instant) -> Duration {
        let running = self
            .running_since
            .map(|since| now.saturating_duration_since(since))
            .unwrap_or_default();
        self.banked + running
    }

    fn pause(&mut self, now: Instant) {
        if let Some(since) = self.running_since.take() {
            self.banked += now.saturating_duration_since(since);
        }
    }

    fn unpause(&mut self, now: Instant) {
        if self.running_since.is_none() {
            self.running_since = Some(now);
        }
    }
}

/// Visibility and dwell state for one tracked element occurrence.
#[derive(Debug, Clone)]
pub struct ImpressionState {
    threshold: f32,
    min_dwell: Duration,
    policy: DwellPolicy,

    /// True once the impression for the current session has fired.
    reported: bool,

    /// Running dwell timer, `None` while not sufficiently visible.
    timer: Option<DwellTimer>,

    /// Host is in the background.
    suspended: bool,
}

impl ImpressionState {
    /// Create an idle state using the thresholds from `config`.
    pub fn new(config: &ImpressionConfig) -> Self {
        Self {
            threshold: config.visibility_threshold,
            min_dwell: config.min_dwell,
            policy: config.dwell_policy,
            reported: false,
            timer: None,
            suspended: false,
        }
    }

    /// Evaluate a geometry observation.
    ///
    /// `element` is the tracked element's bounds and `container_visible` the
    /// visible part of its container, both in the same coordinate space.
    pub fn on_geometry_changed(
        &mut self,
        element: &Rect,
        container_visible: &Rect,
        now: Instant,
    ) -> GeometryOutcome {
        if self.reported {
            return GeometryOutcome::Ignored;
        }

        match visibility(element, container_visible) {
            Visibility::Hidden => self.clear_visibility(),
            vis if vis.meets(self.threshold) => self.mark_visible(now),
            Visibility::Visible(_) => self.clear_visibility(),
        }
    }

    /// Report the impression if the dwell time has elapsed.
    ///
    /// Returns the dwell credited at the moment of reporting, or `None` when
    /// nothing fired. Fires at most once until [`reset`](Self::reset).
    pub fn poll(&mut self, now: Instant) -> Option<Duration> {
        if self.reported {
            return None;
        }

        let elapsed = self.timer?.elapsed(now);
        if elapsed >= self.min_dwell {
            self.reported = true;
            Some(elapsed)
        } else {
            None
        }
    }

    /// Forget the current session entirely.
    pub fn reset(&mut self) {
        self.reported = false;
        self.timer = None;
    }

    /// The host moved to the background.
    ///
    /// Under [`DwellPolicy::ForegroundOnly`] the running dwell is banked and
    /// paused; under [`DwellPolicy::WallClock`] the timer keeps running.
    pub fn suspend(&mut self, now: Instant) {
        if self.suspended {
            return;
        }
        self.suspended = true;

        if self.policy == DwellPolicy::ForegroundOnly {
            if let Some(timer) = self.timer.as_mut() {
                timer.pause(now);
            }
        }
    }

    /// The host returned to the foreground.
    pub fn resume(&mut self, now: Instant) {
        if !self.suspended {
            return;
        }
        self.suspended = false;

        if self.policy == DwellPolicy::ForegroundOnly {
            if let Some(timer) = self.timer.as_mut() {
                timer.unpause(now);
            }
        }
    }

    /// True once the impression for this session has fired.
    pub fn is_reported(&self) -> bool {
        self.reported
    }

    /// When the element most recently became sufficiently visible.
    pub fn visible_since(&self) -> Option<Instant> {
        self.timer.map(|timer| timer.visible_since)
    }

    /// Dwell credited so far in the current session.
    pub fn dwell(&self, now: Instant) -> Duration {
        self.timer
            .map(|timer| timer.elapsed(now))
            .unwrap_or_default()
    }

    /// True when the element has been visible for at least the minimum dwell.
    pub fn elapsed_sufficient(&self, now: Instant) -> bool {
        self.timer
            .is_some_and(|timer| timer.elapsed(now) >= self.min_dwell)
    }

    /// Current phase.
    pub fn phase(&self) -> ImpressionPhase {
        if self.reported {
            ImpressionPhase::Reported
        } else if self.timer.is_some() {
            ImpressionPhase::Accumulating
        } else {
            ImpressionPhase::Idle
        }
    }

    /// True while the host is in the background.
    pub fn is_suspended(&self) -> bool {
        self.suspended
    }

    fn mark_visible(&mut self, now: Instant) -> GeometryOutcome {
        if self.timer.is_some() {
            return GeometryOutcome::SessionContinued;
        }

        let running = !(self.suspended && self.policy == DwellPolicy::ForegroundOnly);
        self.timer = Some(DwellTimer::start(now, running));
        GeometryOutcome::SessionStarted
    }

    fn clear_visibility(&mut self) -> GeometryOutcome {
        match self.timer.take() {
            Some(_) => GeometryOutcome::SessionAbandoned,
            None => GeometryOutcome::StillIdle,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCREEN: Rect = Rect::new(0.0, 0.0, 1000.0, 1000.0);

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    /// Card 1000x400 whose top edge sits at `top`.
    fn card_at(top: f32) -> Rect {
        Rect::from_origin_size(0.0, top, 1000.0, 400.0)
    }

    fn visible_card() -> Rect {
        card_at(100.0)
    }

    /// 25% visible: only the top 100px are on screen.
    fn sliver_card() -> Rect {
        card_at(900.0)
    }

    fn offscreen_card() -> Rect {
        card_at(1500.0)
    }

    fn default_state() -> ImpressionState {
        ImpressionState::new(&ImpressionConfig::default())
    }

    #[test]
    fn test_new_state_is_idle() {
        let state = default_state();
        assert_eq!(state.phase(), ImpressionPhase::Idle);
        assert!(!state.is_reported());
        assert!(state.visible_since().is_none());
    }

    #[test]
    fn test_qualifying_geometry_starts_session() {
        let mut state = default_state();
        let start = Instant::now();

        let outcome = state.on_geometry_changed(&visible_card(), &SCREEN, start);
        assert_eq!(outcome, GeometryOutcome::SessionStarted);
        assert_eq!(state.phase(), ImpressionPhase::Accumulating);
        assert_eq!(state.visible_since(), Some(start));
    }

    #[test]
    fn test_repeated_qualifying_geometry_keeps_timer() {
        let mut state = default_state();
        let start = Instant::now();

        state.on_geometry_changed(&visible_card(), &SCREEN, start);
        let outcome = state.on_geometry_changed(&card_at(150.0), &SCREEN, start + ms(300));

        assert_eq!(outcome, GeometryOutcome::SessionContinued);
        assert_eq!(state.visible_since(), Some(start));
    }

    #[test]
    fn test_below_threshold_clears_timer() {
        let mut state = default_state();
        let start = Instant::now();

        state.on_geometry_changed(&visible_card(), &SCREEN, start);
        let outcome = state.on_geometry_changed(&sliver_card(), &SCREEN, start + ms(100));

        assert_eq!(outcome, GeometryOutcome::SessionAbandoned);
        assert_eq!(state.phase(), ImpressionPhase::Idle);
        assert!(state.visible_since().is_none());
    }

    #[test]
    fn test_offscreen_clears_timer() {
        let mut state = default_state();
        let start = Instant::now();

        state.on_geometry_changed(&visible_card(), &SCREEN, start);
        let outcome = state.on_geometry_changed(&offscreen_card(), &SCREEN, start + ms(100));

        assert_eq!(outcome, GeometryOutcome::SessionAbandoned);
        assert!(state.visible_since().is_none());
    }

    #[test]
    fn test_exact_threshold_qualifies() {
        let mut state = default_state();
        // top 200 of 400px visible = exactly 50%
        let outcome = state.on_geometry_changed(&card_at(800.0), &SCREEN, Instant::now());
        assert_eq!(outcome, GeometryOutcome::SessionStarted);
    }

    #[test]
    fn test_poll_before_dwell_does_not_fire() {
        let mut state = default_state();
        let start = Instant::now();

        state.on_geometry_changed(&visible_card(), &SCREEN, start);
        assert!(state.poll(start + ms(999)).is_none());
        assert!(!state.is_reported());
    }

    #[test]
    fn test_poll_after_dwell_fires_once() {
        let mut state = default_state();
        let start = Instant::now();

        state.on_geometry_changed(&visible_card(), &SCREEN, start);
        assert_eq!(state.poll(start + ms(1000)), Some(ms(1000)));
        assert_eq!(state.phase(), ImpressionPhase::Reported);

        assert!(state.poll(start + ms(1500)).is_none());
        assert!(state.poll(start + ms(5000)).is_none());
    }

    #[test]
    fn test_poll_while_idle_never_fires() {
        let mut state = default_state();
        let start = Instant::now();
        assert!(state.poll(start + ms(10_000)).is_none());
    }

    #[test]
    fn test_reported_ignores_geometry() {
        let mut state = default_state();
        let start = Instant::now();

        state.on_geometry_changed(&visible_card(), &SCREEN, start);
        state.poll(start + ms(1000));

        let outcome = state.on_geometry_changed(&offscreen_card(), &SCREEN, start + ms(1100));
        assert_eq!(outcome, GeometryOutcome::Ignored);
        assert_eq!(state.phase(), ImpressionPhase::Reported);
        assert_eq!(state.visible_since(), Some(start));
    }

    #[test]
    fn test_reset_starts_fresh_session() {
        let mut state = default_state();
        let start = Instant::now();

        state.on_geometry_changed(&visible_card(), &SCREEN, start);
        state.poll(start + ms(1000));
        state.reset();

        assert_eq!(state.phase(), ImpressionPhase::Idle);
        assert!(state.visible_since().is_none());

        let later = start + ms(2000);
        state.on_geometry_changed(&visible_card(), &SCREEN, later);
        assert!(state.poll(later + ms(500)).is_none());
        assert!(state.poll(later + ms(1000)).is_some());
    }

    #[test]
    fn test_flicker_never_fires() {
        let mut state = default_state();
        let start = Instant::now();

        // 900ms visible, 100ms hidden, repeated; no run reaches 1000ms.
        for cycle in 0..10u64 {
            let base = start + ms(cycle * 1000);
            state.on_geometry_changed(&visible_card(), &SCREEN, base);
            for tick in 1..=9u64 {
                assert!(state.poll(base + ms(tick * 100)).is_none());
            }
            state.on_geometry_changed(&sliver_card(), &SCREEN, base + ms(900));
            assert!(state.poll(base + ms(950)).is_none());
        }

        assert!(!state.is_reported());
    }

    #[test]
    fn test_degenerate_geometry_is_not_visible() {
        let mut state = default_state();
        let now = Instant::now();

        let zero_area = Rect::new(10.0, 10.0, 10.0, 500.0);
        assert_eq!(
            state.on_geometry_changed(&zero_area, &SCREEN, now),
            GeometryOutcome::StillIdle
        );

        let inverted = Rect::new(900.0, 900.0, 100.0, 100.0);
        assert_eq!(
            state.on_geometry_changed(&inverted, &SCREEN, now),
            GeometryOutcome::StillIdle
        );

        let inverted_container = Rect::new(0.0, 1000.0, 1000.0, 0.0);
        assert_eq!(
            state.on_geometry_changed(&visible_card(), &inverted_container, now),
            GeometryOutcome::StillIdle
        );

        assert_eq!(state.phase(), ImpressionPhase::Idle);
    }

    #[test]
    fn test_custom_threshold() {
        let config = ImpressionConfig::new().with_visibility_threshold(0.2);
        let mut state = ImpressionState::new(&config);

        let outcome = state.on_geometry_changed(&sliver_card(), &SCREEN, Instant::now());
        assert_eq!(outcome, GeometryOutcome::SessionStarted);
    }

    #[test]
    fn test_zero_dwell_fires_on_first_poll() {
        let config = ImpressionConfig::new().with_min_dwell(Duration::ZERO);
        let mut state = ImpressionState::new(&config);
        let now = Instant::now();

        state.on_geometry_changed(&visible_card(), &SCREEN, now);
        assert_eq!(state.poll(now), Some(Duration::ZERO));
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Dwell policy
    // ─────────────────────────────────────────────────────────────────────────

    #[test]
    fn test_wall_clock_counts_background_time() {
        let mut state = default_state();
        let start = Instant::now();

        state.on_geometry_changed(&visible_card(), &SCREEN, start);
        state.suspend(start + ms(600));
        state.resume(start + ms(5600));

        assert!(state.elapsed_sufficient(start + ms(5600)));
        assert_eq!(state.poll(start + ms(5600)), Some(ms(5600)));
    }

    #[test]
    fn test_foreground_only_banks_dwell() {
        let config = ImpressionConfig::new().with_dwell_policy(DwellPolicy::ForegroundOnly);
        let mut state = ImpressionState::new(&config);
        let start = Instant::now();

        state.on_geometry_changed(&visible_card(), &SCREEN, start);
        state.suspend(start + ms(600));
        assert_eq!(state.dwell(start + ms(3000)), ms(600));

        let resumed = start + ms(5600);
        state.resume(resumed);
        assert!(state.poll(resumed).is_none());
        assert!(state.poll(resumed + ms(399)).is_none());
        assert_eq!(state.poll(resumed + ms(400)), Some(ms(1000)));
        assert_eq!(state.visible_since(), Some(start));
    }

    #[test]
    fn test_foreground_only_session_started_in_background() {
        let config = ImpressionConfig::new().with_dwell_policy(DwellPolicy::ForegroundOnly);
        let mut state = ImpressionState::new(&config);
        let start = Instant::now();

        state.suspend(start);
        state.on_geometry_changed(&visible_card(), &SCREEN, start);
        assert_eq!(state.phase(), ImpressionPhase::Accumulating);
        assert_eq!(state.dwell(start + ms(2000)), Duration::ZERO);

        state.resume(start + ms(2000));
        assert_eq!(state.dwell(start + ms(2500)), ms(500));
    }

    #[test]
    fn test_suspend_and_resume_are_idempotent() {
        let config = ImpressionConfig::new().with_dwell_policy(DwellPolicy::ForegroundOnly);
        let mut state = ImpressionState::new(&config);
        let start = Instant::now();

        state.on_geometry_changed(&visible_card(), &SCREEN, start);
        state.suspend(start + ms(200));
        state.suspend(start + ms(400));
        assert!(state.is_suspended());
        assert_eq!(state.dwell(start + ms(900)), ms(200));

        state.resume(start + ms(1000));
        state.resume(start + ms(1500));
        assert!(!state.is_suspended());
        assert_eq!(state.dwell(start + ms(1500)), ms(700));
    }

    #[test]
    fn test_foreground_only_drop_below_threshold_discards_bank() {
        let config = ImpressionConfig::new().with_dwell_policy(DwellPolicy::ForegroundOnly);
        let mut state = ImpressionState::new(&config);
        let start = Instant::now();

        state.on_geometry_changed(&visible_card(), &SCREEN, start);
        state.suspend(start + ms(800));
        state.resume(start + ms(900));
        state.on_geometry_changed(&offscreen_card(), &SCREEN, start + ms(950));
        state.on_geometry_changed(&visible_card(), &SCREEN, start + ms(1000));

        assert_eq!(state.dwell(start + ms(1500)), ms(500));
        assert!(state.poll(start + ms(1500)).is_none());
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn test_sub_threshold_sequences_never_fire(
                tops in proptest::collection::vec(801.0f32..3000.0, 1..50),
                gaps in proptest::collection::vec(0u64..2000, 1..50),
            ) {
                // A card whose top sits below y=800 shows less than half of
                // its 400px height on the 1000px screen.
                let mut state = default_state();
                let mut now = Instant::now();

                for (top, gap) in tops.iter().zip(gaps.iter().cycle()) {
                    state.on_geometry_changed(&card_at(*top), &SCREEN, now);
                    now += ms(*gap);
                    prop_assert!(state.poll(now).is_none());
                }
                prop_assert_eq!(state.phase(), ImpressionPhase::Idle);
            }

            #[test]
            fn test_at_most_once_per_session(
                events in proptest::collection::vec((any::<bool>(), 0u64..800), 1..100),
            ) {
                let mut state = default_state();
                let mut now = Instant::now();
                let mut fired = 0;

                for (visible, gap) in events {
                    let card = if visible { visible_card() } else { offscreen_card() };
                    state.on_geometry_changed(&card, &SCREEN, now);
                    now += ms(gap);
                    if state.poll(now).is_some() {
                        fired += 1;
                    }
                }
                prop_assert!(fired <= 1);
            }
        }
    }
}
