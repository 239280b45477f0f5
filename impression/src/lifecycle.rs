//! Host lifecycle signal.
//!
//! The host owns a [`HostLifecycle`] and flips it between active
//! (foreground, "started") and inactive (background) as its screen comes and
//! goes. Each tracker holds a [`LifecycleSignal`] subscribed to it.
//!
//! Dropping the `HostLifecycle` is the host's teardown: every subscribed
//! monitor observes [`LifecycleClosed`] and stops.

use std::fmt;

use tokio::sync::watch;

/// Foreground state of the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// Host is in the foreground; dwell checks run.
    Active,
    /// Host is in the background; dwell checks are suspended.
    Inactive,
}

impl LifecycleState {
    /// True for [`LifecycleState::Active`].
    pub fn is_active(&self) -> bool {
        matches!(self, LifecycleState::Active)
    }
}

impl From<bool> for LifecycleState {
    fn from(active: bool) -> Self {
        if active {
            LifecycleState::Active
        } else {
            LifecycleState::Inactive
        }
    }
}

/// The lifecycle source was torn down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LifecycleClosed;

impl fmt::Display for LifecycleClosed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "lifecycle source closed")
    }
}

impl std::error::Error for LifecycleClosed {}

/// Host side of the lifecycle signal.
#[derive(Debug)]
pub struct HostLifecycle {
    tx: watch::Sender<LifecycleState>,
}

impl HostLifecycle {
    /// Create a lifecycle source in the given initial state.
    pub fn new(initial: LifecycleState) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self { tx }
    }

    /// Create a lifecycle source that starts in the foreground.
    pub fn active() -> Self {
        Self::new(LifecycleState::Active)
    }

    /// Move to the given state. Subscribers are only woken on a change.
    pub fn set_state(&self, state: LifecycleState) {
        self.tx.send_if_modified(|current| {
            if *current == state {
                false
            } else {
                *current = state;
                true
            }
        });
    }

    /// Move to the foreground (`true`) or background (`false`).
    pub fn set_active(&self, active: bool) {
        self.set_state(LifecycleState::from(active));
    }

    /// Current state.
    pub fn state(&self) -> LifecycleState {
        *self.tx.borrow()
    }

    /// Subscribe a tracker to this lifecycle.
    pub fn signal(&self) -> LifecycleSignal {
        LifecycleSignal {
            rx: self.tx.subscribe(),
            _keepalive: None,
        }
    }
}

impl Default for HostLifecycle {
    fn default() -> Self {
        Self::active()
    }
}

/// Tracker side of the lifecycle signal.
#[derive(Debug, Clone)]
pub struct LifecycleSignal {
    rx: watch::Receiver<LifecycleState>,
    /// Sender held for signals that have no external host.
    _keepalive: Option<std::sync::Arc<watch::Sender<LifecycleState>>>,
}

impl LifecycleSignal {
    /// A signal that is permanently active, for hosts with no lifecycle.
    pub fn always_active() -> Self {
        let (tx, rx) = watch::channel(LifecycleState::Active);
        Self {
            rx,
            _keepalive: Some(std::sync::Arc::new(tx)),
        }
    }

    /// Current state, marking it as seen.
    pub fn current(&mut self) -> LifecycleState {
        *self.rx.borrow_and_update()
    }

    /// True when the host is currently in the foreground.
    pub fn is_active(&self) -> bool {
        self.rx.borrow().is_active()
    }

    /// Wait for the next state change.
    ///
    /// Returns [`LifecycleClosed`] once the host side has been dropped.
    pub async fn changed(&mut self) -> Result<LifecycleState, LifecycleClosed> {
        self.rx.changed().await.map_err(|_| LifecycleClosed)?;
        Ok(*self.rx.borrow_and_update())
    }

    /// True when the host side has been dropped.
    pub fn is_closed(&self) -> bool {
        self.rx.has_changed().is_err()
    }
}
