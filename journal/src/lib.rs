//! Durable journal contract for in-flight asset transfers.
//!
//! The journal is the engine's crash-safety anchor: a parcel is logged
//! here *before* its anchor transaction is broadcast, and marked confirmed
//! only once all proofs are sealed and delivered. Every storage backend
//! implements [`ExportLog`]; the engine depends only on the contract.

pub mod error;
pub mod log;
pub mod outbound;

pub use error::JournalError;
pub use log::ExportLog;
pub use outbound::{
    AnchorInfo, OutboundParcel, ParcelConfirmEvent, PassiveAssetRecord, TransferInput,
    TransferOutput, TransferOutputType,
};
