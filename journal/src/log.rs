//! Export log contract.

use crate::error::JournalError;
use crate::outbound::{OutboundParcel, ParcelConfirmEvent};
use async_trait::async_trait;

/// Durable log of pending and confirmed parcels.
///
/// Durability contract:
/// - `log_pending_parcel` must not return before the record is recoverable
///   across a crash. The engine will not broadcast until it has.
/// - `confirm_parcel_delivery` must be atomic with respect to the parcel's
///   confirmed state, and is invoked at most once per completed parcel.
#[async_trait]
pub trait ExportLog: Send + Sync {
    /// Durably record a new in-flight parcel.
    async fn log_pending_parcel(&self, parcel: &OutboundParcel) -> Result<(), JournalError>;

    /// All parcels that were logged but not yet confirmed.
    async fn pending_parcels(&self) -> Result<Vec<OutboundParcel>, JournalError>;

    /// Mark a parcel confirmed, persisting block attribution, final
    /// proofs, and passive proof files.
    async fn confirm_parcel_delivery(
        &self,
        event: &ParcelConfirmEvent,
    ) -> Result<(), JournalError>;
}
