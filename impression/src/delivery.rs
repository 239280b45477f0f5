//! Impression delivery.
//!
//! A tracker hands each impression to exactly one [`Delivery`]:
//!
//! - [`Delivery::Callback`] invokes a host closure directly from the dwell
//!   check. The closure runs while the tracker's state lock is held, which is
//!   what guarantees nothing is delivered after `reset()` returns; it must not
//!   call back into the same tracker. Debug builds panic on such a call
//!   instead of deadlocking. Other trackers are fine.
//! - [`Delivery::Queued`] pushes the event onto a channel drained by a single
//!   [`ImpressionReceiver`]. Use this when the listener needs to touch the
//!   tracker or do slow work.
//!
//! Both paths carry the key captured when the impression fired, so rebinding
//! a tracker to a new key never relabels an event that is still queued.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tracing::debug;

use crate::config::DeliveryMode;

/// A confirmed impression for one visible session.
#[derive(Debug, Clone, PartialEq)]
pub struct Impression<K> {
    /// Caller-supplied identifier of the logical item.
    pub key: K,
    /// Session number within the tracker; bumps on every reset or rebind.
    pub session: u64,
    /// When the element became sufficiently visible.
    pub visible_since: Instant,
    /// When the dwell check confirmed the impression.
    pub reported_at: Instant,
    /// Dwell credited at the moment of reporting.
    pub dwell: Duration,
}

/// Host callback for synchronous delivery.
pub type ImpressionCallback<K> = Arc<dyn Fn(&Impression<K>) + Send + Sync>;

/// Where a tracker sends its impressions.
pub enum Delivery<K> {
    /// Invoke the callback directly from the dwell check.
    Callback(ImpressionCallback<K>),
    /// Push onto a single-consumer queue.
    Queued(mpsc::UnboundedSender<Impression<K>>),
}

impl<K> fmt::Debug for Delivery<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Delivery::Callback(_) => f.write_str("Delivery::Callback"),
            Delivery::Queued(tx) => f
                .debug_struct("Delivery::Queued")
                .field("closed", &tx.is_closed())
                .finish(),
        }
    }
}

/// Clones share the same callback or queue, so many trackers can feed one
/// receiver. The queue closes once every clone is gone.
impl<K> Clone for Delivery<K> {
    fn clone(&self) -> Self {
        match self {
            Delivery::Callback(callback) => Delivery::Callback(Arc::clone(callback)),
            Delivery::Queued(tx) => Delivery::Queued(tx.clone()),
        }
    }
}

impl<K> Delivery<K> {
    /// Deliver through a callback.
    pub fn callback<F>(f: F) -> Self
    where
        F: Fn(&Impression<K>) + Send + Sync + 'static,
    {
        Delivery::Callback(Arc::new(f))
    }

    /// Deliver through a queue, returning the consumer side.
    pub fn queued() -> (Self, ImpressionReceiver<K>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Delivery::Queued(tx), ImpressionReceiver { rx })
    }

    /// Which configured mode this delivery implements.
    pub fn mode(&self) -> DeliveryMode {
        match self {
            Delivery::Callback(_) => DeliveryMode::Callback,
            Delivery::Queued(_) => DeliveryMode::Queued,
        }
    }

    /// Hand an impression to the host.
    ///
    /// A queue whose receiver is gone drops the event; the host has stopped
    /// listening and there is nobody left to tell.
    pub(crate) fn deliver(&self, impression: Impression<K>) {
        match self {
            Delivery::Callback(callback) => callback(&impression),
            Delivery::Queued(tx) => {
                if tx.send(impression).is_err() {
                    debug!("Impression receiver dropped; discarding impression");
                }
            }
        }
    }
}

/// Consumer side of queued delivery.
#[derive(Debug)]
pub struct ImpressionReceiver<K> {
    rx: mpsc::UnboundedReceiver<Impression<K>>,
}

impl<K> ImpressionReceiver<K> {
    /// Wait for the next impression.
    ///
    /// Returns `None` once the tracker has been dropped and the queue drained.
    pub async fn recv(&mut self) -> Option<Impression<K>> {
        self.rx.recv().await
    }

    /// Take the next impression if one is already queued.
    pub fn try_recv(&mut self) -> Option<Impression<K>> {
        self.rx.try_recv().ok()
    }

    /// Take every impression currently queued.
    pub fn drain(&mut self) -> Vec<Impression<K>> {
        let mut out = Vec::new();
        while let Ok(impression) = self.rx.try_recv() {
            out.push(impression);
        }
        out
    }
}
