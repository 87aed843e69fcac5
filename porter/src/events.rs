//! State-execution event fan-out.
//!
//! The porter publishes an event before every state it executes. Events
//! are value types carrying only a timestamp and payload; receivers own
//! their inbound queues, so publication never blocks the driver.

use crate::parcel::SendState;
use freight_types::{SerializedKey, Timestamp};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;

/// Monotonic subscription id source, shared by all porters in-process.
static NEXT_SUBSCRIPTION_ID: AtomicU64 = AtomicU64::new(0);

/// Published before the state machine executes a state for a parcel.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExecuteSendStateEvent {
    pub timestamp: Timestamp,
    pub state: SendState,
}

impl ExecuteSendStateEvent {
    pub fn new(state: SendState) -> Self {
        Self {
            timestamp: Timestamp::now(),
            state,
        }
    }
}

/// Published by the proof courier when it has attempted a delivery.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProofDeliveryEvent {
    pub timestamp: Timestamp,
    pub script_key: SerializedKey,
}

impl ProofDeliveryEvent {
    pub fn new(script_key: SerializedKey) -> Self {
        Self {
            timestamp: Timestamp::now(),
            script_key,
        }
    }
}

/// Everything the porter (or its courier) can tell its subscribers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PorterEvent {
    SendState(ExecuteSendStateEvent),
    ProofDelivery(ProofDeliveryEvent),
}

impl PorterEvent {
    pub fn timestamp(&self) -> Timestamp {
        match self {
            PorterEvent::SendState(e) => e.timestamp,
            PorterEvent::ProofDelivery(e) => e.timestamp,
        }
    }
}

/// A subscriber endpoint: the porter keeps the sending half, the
/// subscriber reads events off the receiving half at its own pace.
pub struct EventReceiver {
    id: u64,
    tx: mpsc::UnboundedSender<PorterEvent>,
    rx: mpsc::UnboundedReceiver<PorterEvent>,
}

impl EventReceiver {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            id: NEXT_SUBSCRIPTION_ID.fetch_add(1, Ordering::Relaxed),
            tx,
            rx,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub(crate) fn sender(&self) -> mpsc::UnboundedSender<PorterEvent> {
        self.tx.clone()
    }

    /// Receive the next event; `None` once the porter has been dropped
    /// and the queue is drained.
    pub async fn recv(&mut self) -> Option<PorterEvent> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<PorterEvent> {
        self.rx.try_recv().ok()
    }
}

impl Default for EventReceiver {
    fn default() -> Self {
        Self::new()
    }
}

/// A snapshot of subscriber endpoints handed to the proof courier, so
/// courier-originated events reach the engine's audience without the
/// courier holding a reference to the engine itself.
#[derive(Clone, Default)]
pub struct ObserverSink {
    senders: Vec<mpsc::UnboundedSender<PorterEvent>>,
}

impl ObserverSink {
    pub fn new(senders: Vec<mpsc::UnboundedSender<PorterEvent>>) -> Self {
        Self { senders }
    }

    /// Fan an event out to every subscriber in the snapshot. Closed
    /// receivers are skipped.
    pub fn publish(&self, event: PorterEvent) {
        for sender in &self.senders {
            let _ = sender.send(event.clone());
        }
    }

    pub fn is_empty(&self) -> bool {
        self.senders.is_empty()
    }
}
