use crate::chain::ChainError;
use crate::courier::CourierError;
use freight_journal::JournalError;
use freight_proof::ProofError;
use freight_types::SerializedKey;
use thiserror::Error;

/// Errors surfaced to shipment callers and to the engine's process-wide
/// error channel.
///
/// The enum is `Clone` so a single failure can be fanned out to both the
/// global channel (observability) and the requesting caller's single-shot
/// error channel.
#[derive(Clone, Debug, Error)]
pub enum PorterError {
    #[error("coin selection failed: {0}")]
    CoinSelection(String),

    #[error("signing failed: {0}")]
    Signing(String),

    #[error("chain error: {0}")]
    Chain(#[from] ChainError),

    #[error("journal error: {0}")]
    Journal(#[from] JournalError),

    #[error("wallet error: {0}")]
    Wallet(String),

    #[error("proof error: {0}")]
    Proof(#[from] ProofError),

    #[error("no sealed proof for output script key {0}")]
    MissingProof(SerializedKey),

    #[error("proof courier error: {0}")]
    CourierFatal(String),

    #[error("confirmation wait cancelled before a confirmation was observed")]
    ConfirmationCancelled,

    #[error("invalid parcel: {0}")]
    InvalidParcel(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("porter shutting down")]
    ShuttingDown,
}

impl PorterError {
    /// Map a fatal courier failure. Backoff is handled by the dispatcher
    /// and never reaches this conversion.
    pub(crate) fn from_courier(err: CourierError) -> Self {
        PorterError::CourierFatal(err.to_string())
    }
}
