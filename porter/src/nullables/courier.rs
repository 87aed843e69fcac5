//! Nullable proof courier.

use crate::courier::{CourierError, ProofCourier, Recipient};
use crate::events::{ObserverSink, PorterEvent, ProofDeliveryEvent};
use async_trait::async_trait;
use freight_proof::AnnotatedProof;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

/// A scriptable [`ProofCourier`].
///
/// Deliveries succeed by default; per-recipient failures (including
/// backoff) can be queued up front and are consumed one per attempt.
/// Successful deliveries publish a [`ProofDeliveryEvent`] through the
/// subscriber sink the engine handed over, mirroring a courier that
/// reports its progress.
pub struct NullCourier {
    deliveries: Mutex<Vec<Recipient>>,
    scripted_failures: Mutex<HashMap<[u8; 33], VecDeque<CourierError>>>,
    sink: Mutex<ObserverSink>,
}

impl NullCourier {
    pub fn new() -> Self {
        Self {
            deliveries: Mutex::new(Vec::new()),
            scripted_failures: Mutex::new(HashMap::new()),
            sink: Mutex::new(ObserverSink::default()),
        }
    }

    /// Queue a failure for the next delivery to this script key.
    pub fn fail_next(&self, script_key: freight_types::PublicKey, err: CourierError) {
        self.scripted_failures
            .lock()
            .expect("failures lock")
            .entry(script_key.0)
            .or_default()
            .push_back(err);
    }

    pub fn deliveries(&self) -> Vec<Recipient> {
        self.deliveries.lock().expect("deliveries lock").clone()
    }

    pub fn delivery_count_for(&self, script_key: freight_types::PublicKey) -> usize {
        self.deliveries
            .lock()
            .expect("deliveries lock")
            .iter()
            .filter(|r| r.script_key == script_key)
            .count()
    }
}

impl Default for NullCourier {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProofCourier for NullCourier {
    async fn deliver_proof(
        &self,
        recipient: Recipient,
        _proof: &AnnotatedProof,
    ) -> Result<(), CourierError> {
        self.deliveries
            .lock()
            .expect("deliveries lock")
            .push(recipient.clone());

        let scripted = self
            .scripted_failures
            .lock()
            .expect("failures lock")
            .get_mut(&recipient.script_key.0)
            .and_then(VecDeque::pop_front);
        if let Some(err) = scripted {
            return Err(err);
        }

        self.sink
            .lock()
            .expect("sink lock")
            .publish(PorterEvent::ProofDelivery(ProofDeliveryEvent::new(
                recipient.script_key.serialized(),
            )));
        Ok(())
    }

    fn set_subscribers(&self, sink: ObserverSink) {
        *self.sink.lock().expect("sink lock") = sink;
    }
}
