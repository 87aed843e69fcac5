//! Persisted transfer records.

use freight_proof::{AnnotatedProof, Blob, Locator};
use freight_types::{AssetId, BlockHash, OutPoint, ScriptKey, SerializedKey, Transaction, Txid};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One consumed asset input of a transfer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferInput {
    pub asset_id: AssetId,
    pub script_key: SerializedKey,
    /// The anchor outpoint the input commitment was committed at.
    pub outpoint: OutPoint,
    pub amount: u64,
}

impl TransferInput {
    /// The locator of this input's proof file in the archive.
    pub fn proof_locator(&self) -> Locator {
        Locator::new(self.asset_id, self.script_key)
    }
}

/// How an output participates in the transfer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransferOutputType {
    /// A plain commitment output carrying assets to a recipient.
    Commitment,
    /// The output carrying the change portion of a split transfer.
    SplitRoot,
    /// An output that only re-anchors passive assets; it carries no
    /// transferred assets and gets no explicit output proof.
    PassiveOnly,
}

/// Where an output's commitment landed in the anchor transaction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnchorInfo {
    pub outpoint: OutPoint,
    pub value: u64,
}

/// One output of a transfer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferOutput {
    pub output_type: TransferOutputType,
    pub amount: u64,
    pub script_key: ScriptKey,
    /// Whether the anchoring wallet owns the script key's raw key. Local
    /// outputs skip courier delivery.
    pub script_key_local: bool,
    pub anchor: AnchorInfo,
    /// The encoded transition proof for this output, unstamped until the
    /// anchor transaction confirms.
    pub proof_suffix: Blob,
}

/// A passive asset re-anchored (unchanged) by the transfer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PassiveAssetRecord {
    pub genesis_id: AssetId,
    pub script_key: SerializedKey,
    /// The new encoded transition proof to append to the asset's file.
    pub new_proof: Blob,
}

impl PassiveAssetRecord {
    pub fn proof_locator(&self) -> Locator {
        Locator::new(self.genesis_id, self.script_key)
    }
}

/// The journaled record of one transfer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundParcel {
    /// The fully signed transaction anchoring the new commitments.
    pub anchor_tx: Transaction,
    /// Chain height at signing time, used as the confirmation height hint.
    pub anchor_height_hint: u32,
    pub inputs: Vec<TransferInput>,
    pub outputs: Vec<TransferOutput>,
    pub passive_assets: Vec<PassiveAssetRecord>,
}

impl OutboundParcel {
    pub fn anchor_txid(&self) -> Txid {
        self.anchor_tx.txid()
    }

    /// The output script the confirmation watcher registers on.
    pub fn anchor_output_script(&self) -> Vec<u8> {
        self.anchor_tx
            .outputs
            .first()
            .map(|out| out.script_pubkey.clone())
            .unwrap_or_default()
    }

    /// Whether the transfer moves any active assets. A parcel with no
    /// inputs only re-anchors passive assets.
    pub fn has_active_transfers(&self) -> bool {
        !self.inputs.is_empty()
    }
}

/// The completion record handed to the journal once a transfer is fully
/// confirmed and its proofs are sealed.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ParcelConfirmEvent {
    pub anchor_txid: Txid,
    pub block_hash: BlockHash,
    pub block_height: u32,
    pub tx_index: u32,
    /// Sealed output proofs, keyed by serialized receiver script key.
    pub final_proofs: HashMap<SerializedKey, AnnotatedProof>,
    /// Updated passive proof files, keyed by locator hash.
    pub passive_proof_files: HashMap<[u8; 32], Blob>,
}
