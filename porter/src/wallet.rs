//! Wallet-side collaborator contracts: coin selection, signing, anchoring.

use crate::chain::FeeRate;
use crate::parcel::TransferAddress;
use crate::vpacket::{AssetCommitment, PassiveAsset, VirtualPacket};
use async_trait::async_trait;
use freight_types::{PublicKey, Transaction};
use thiserror::Error;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum WalletError {
    /// The output being imported is already tracked by the wallet. The
    /// engine treats this as success on resume.
    #[error("output already exists")]
    AlreadyExists,

    #[error("insufficient assets: {0}")]
    InsufficientAssets(String),

    #[error("funding failed: {0}")]
    Funding(String),

    #[error("signing failed: {0}")]
    Signing(String),

    #[error("wallet error: {0}")]
    Other(String),
}

/// Selects asset inputs satisfying a target amount for an asset id set.
#[async_trait]
pub trait CoinSelector: Send + Sync {
    async fn select_coins(
        &self,
        target_amount: u64,
        asset_ids: &[freight_types::AssetId],
    ) -> Result<Vec<AssetCommitment>, WalletError>;
}

/// Signs a virtual packet in place, producing witnesses for every input.
#[async_trait]
pub trait Signer: Send + Sync {
    async fn sign_virtual_packet(&self, packet: &mut VirtualPacket) -> Result<(), WalletError>;
}

/// Validates a virtual transaction against consensus rules.
pub trait TxValidator: Send + Sync {
    fn validate(&self, packet: &VirtualPacket) -> Result<(), WalletError>;
}

/// A funded (but not yet signed) asset-level send.
#[derive(Clone, Debug)]
pub struct FundedSend {
    pub vpacket: VirtualPacket,
    /// The asset commitments consumed as inputs.
    pub input_commitments: Vec<AssetCommitment>,
}

/// Everything the asset wallet needs to anchor a set of virtual packets
/// into one on-chain transaction.
#[derive(Clone, Debug)]
pub struct AnchorTxnsParams {
    pub fee_rate: FeeRate,
    pub vpackets: Vec<VirtualPacket>,
    pub input_commitments: Vec<AssetCommitment>,
    pub passive_assets: Vec<PassiveAsset>,
}

/// The result of anchoring: the signed anchor transaction plus the input
/// packets annotated with anchor positions and proof suffixes.
#[derive(Clone, Debug)]
pub struct AnchoredTransfer {
    pub anchor_tx: Transaction,
    pub vpackets: Vec<VirtualPacket>,
    pub passive_assets: Vec<PassiveAsset>,
}

/// The asset-level wallet used to fund and sign virtual transactions.
#[async_trait]
pub trait AssetWallet: Send + Sync {
    /// Coin-select and build a virtual packet sending to the given
    /// destination addresses.
    async fn fund_address_send(
        &self,
        destinations: &[TransferAddress],
    ) -> Result<FundedSend, WalletError>;

    /// Sign the virtual packet in place.
    async fn sign_virtual_packet(&self, packet: &mut VirtualPacket) -> Result<(), WalletError>;

    /// Build and sign re-anchoring packets for all passive assets
    /// colocated with the consumed commitments.
    async fn sign_passive_assets(
        &self,
        packet: &VirtualPacket,
        input_commitments: &[AssetCommitment],
    ) -> Result<Vec<PassiveAsset>, WalletError>;

    /// Anchor all virtual packets into a single on-chain transaction,
    /// funded and signed via the anchoring wallet.
    async fn anchor_virtual_transactions(
        &self,
        params: AnchorTxnsParams,
    ) -> Result<AnchoredTransfer, WalletError>;
}

/// A funded PSBT-style transaction template.
#[derive(Clone, Debug)]
pub struct FundedPsbt {
    pub tx: Transaction,
    /// Index of the wallet's change output, if one was added.
    pub change_index: Option<u32>,
}

/// The on-chain wallet anchoring the transfer transaction.
#[async_trait]
pub trait WalletAnchor: Send + Sync {
    /// Fund a transaction template at the given fee rate.
    async fn fund_psbt(
        &self,
        template: &Transaction,
        fee_rate: FeeRate,
    ) -> Result<FundedPsbt, WalletError>;

    /// Sign a funded transaction.
    async fn sign_psbt(&self, psbt: FundedPsbt) -> Result<Transaction, WalletError>;

    /// Import a taproot output key so the wallet watches it for spends.
    ///
    /// Duplicate imports fail with [`WalletError::AlreadyExists`], which
    /// callers must treat as success.
    async fn import_taproot_output(&self, pub_key: PublicKey) -> Result<(), WalletError>;
}

/// Key ownership oracle for the anchoring wallet.
#[async_trait]
pub trait KeyRing: Send + Sync {
    /// Whether the wallet can derive the given raw key.
    async fn is_local_key(&self, raw_key: &PublicKey) -> bool;
}
