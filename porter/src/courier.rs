//! Proof courier collaborator contract.

use crate::events::ObserverSink;
use async_trait::async_trait;
use freight_proof::AnnotatedProof;
use freight_types::{AssetId, PublicKey};
use std::time::Duration;
use thiserror::Error;

/// The receiving party of a proof delivery.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Recipient {
    pub script_key: PublicKey,
    pub asset_id: AssetId,
    pub amount: u64,
}

#[derive(Clone, Debug, Error)]
pub enum CourierError {
    /// The courier cannot deliver right now and asks to be retried later.
    /// This is advisory, not a failure: the parcel stays pending and the
    /// delivery is retried on the next resume. `retry_after` is a
    /// suggested delay the engine is free to ignore.
    #[error("courier requested backoff")]
    Backoff { retry_after: Option<Duration> },

    #[error("proof delivery failed: {0}")]
    Delivery(String),
}

impl CourierError {
    pub fn is_backoff(&self) -> bool {
        matches!(self, CourierError::Backoff { .. })
    }
}

/// Asynchronous transport delivering sealed receiver proofs.
///
/// Implementations must be safe for concurrent deliveries from multiple
/// driver tasks. Delivery idempotency is the courier's own concern; the
/// engine only guarantees at-least-once invocation.
#[async_trait]
pub trait ProofCourier: Send + Sync {
    /// Deliver one sealed proof to its recipient.
    async fn deliver_proof(
        &self,
        recipient: Recipient,
        proof: &AnnotatedProof,
    ) -> Result<(), CourierError>;

    /// Replace the courier's view of the engine's subscribers so
    /// courier-originated events reach the same audience.
    fn set_subscribers(&self, sink: ObserverSink);
}
