//! Graceful shutdown controller for the porter.
//!
//! Broadcasts a quit signal to every driver and intake task via a
//! `tokio::sync::broadcast` channel. The state machine also polls the
//! triggered flag between state transitions so a shutdown observed late
//! still stops the drive before the next side effect.

use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::broadcast;

/// Coordinates cooperative cancellation across all porter tasks.
///
/// Tasks call [`subscribe`] to get a receiver, then `select!` on it
/// alongside their suspension points. When shutdown is triggered, every
/// receiver is notified; late subscribers observe the triggered flag.
///
/// [`subscribe`]: ShutdownSignal::subscribe
pub struct ShutdownSignal {
    tx: broadcast::Sender<()>,
    triggered: AtomicBool,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1);
        Self {
            tx,
            triggered: AtomicBool::new(false),
        }
    }

    /// Get a receiver that will be notified on shutdown.
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }

    /// Trigger shutdown. Idempotent.
    pub fn trigger(&self) {
        self.triggered.store(true, Ordering::SeqCst);
        let _ = self.tx.send(());
    }

    /// Whether shutdown has been triggered.
    pub fn is_triggered(&self) -> bool {
        self.triggered.load(Ordering::SeqCst)
    }

    /// Completes once shutdown is triggered; usable inside `select!` even
    /// when the trigger happened before the call.
    pub async fn triggered(&self) {
        if self.is_triggered() {
            return;
        }
        let mut rx = self.subscribe();
        // Re-check after subscribing so a trigger racing the subscription
        // is not missed.
        if self.is_triggered() {
            return;
        }
        let _ = rx.recv().await;
    }
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}
