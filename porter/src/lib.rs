//! The freight porter — the asset transfer engine.
//!
//! The porter moves ownership of off-chain-committed assets between
//! parties by constructing, signing, anchoring, broadcasting, and
//! finalizing an on-chain transaction together with the provenance
//! proofs that follow the assets. Each transfer request (a parcel) is
//! driven through a linear, durable state machine; journaled parcels
//! survive crashes and resume at the broadcast state.

pub mod chain;
pub mod config;
pub mod courier;
mod dispatch;
pub mod error;
pub mod events;
pub mod logging;
pub mod nullables;
pub mod parcel;
pub mod porter;
mod sealer;
pub mod shutdown;
pub mod vpacket;
pub mod wallet;

pub use chain::{ChainBridge, ChainError, ChainHeaderVerifier, ConfirmationSubscription, FeeRate};
pub use config::{PorterConfig, PorterSettings};
pub use courier::{CourierError, ProofCourier, Recipient};
pub use error::PorterError;
pub use events::{EventReceiver, ExecuteSendStateEvent, ObserverSink, PorterEvent};
pub use logging::{init_logging, LogFormat};
pub use parcel::{
    AddressParcel, Parcel, ParcelKit, PendingParcel, PreSignedParcel, SendPackage, SendState,
    TransferAddress,
};
pub use porter::Porter;
pub use shutdown::ShutdownSignal;
pub use vpacket::{AssetCommitment, PassiveAsset, VirtualInput, VirtualOutput, VirtualPacket};
pub use wallet::{
    AnchorTxnsParams, AnchoredTransfer, AssetWallet, CoinSelector, FundedPsbt, FundedSend,
    KeyRing, Signer, TxValidator, WalletAnchor, WalletError,
};
