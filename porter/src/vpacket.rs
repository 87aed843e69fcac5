//! The asset-layer virtual transaction model.
//!
//! A virtual packet describes the asset-level side of a transfer: which
//! committed inputs are consumed and which script keys receive which
//! amounts. Anchoring folds one or more virtual packets into a single
//! on-chain transaction and annotates each output with its anchor
//! position and a fresh (unstamped) transition proof.

use freight_journal::{AnchorInfo, TransferOutputType};
use freight_proof::Blob;
use freight_types::{AssetId, OutPoint, ScriptKey};
use serde::{Deserialize, Serialize};

/// The placeholder value carried by a to-be-committed anchor output.
pub const DUMMY_ANCHOR_VALUE: u64 = 1_000;

/// An opaque asset commitment consumed as a transfer input.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetCommitment {
    pub asset_id: AssetId,
    /// The committed tree root; opaque to the engine.
    pub root: [u8; 32],
}

/// One asset-level input of a virtual packet.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VirtualInput {
    pub asset_id: AssetId,
    pub script_key: ScriptKey,
    /// The anchor outpoint the consumed commitment sits at.
    pub outpoint: OutPoint,
    pub amount: u64,
    /// Witness produced by the virtual signer; empty until signed.
    pub witness: Vec<Vec<u8>>,
}

impl VirtualInput {
    pub fn is_signed(&self) -> bool {
        !self.witness.is_empty()
    }
}

/// One asset-level output of a virtual packet.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VirtualOutput {
    pub output_type: TransferOutputType,
    pub amount: u64,
    pub script_key: ScriptKey,
    /// Filled in by anchoring: where this output's commitment landed.
    pub anchor: Option<AnchorInfo>,
    /// Filled in by anchoring: the encoded, unstamped transition proof
    /// for this output.
    pub proof_suffix: Option<Blob>,
}

/// The asset-layer transaction being built for a transfer.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VirtualPacket {
    pub inputs: Vec<VirtualInput>,
    pub outputs: Vec<VirtualOutput>,
}

impl VirtualPacket {
    /// Whether every input carries a witness.
    pub fn is_fully_signed(&self) -> bool {
        self.inputs.iter().all(VirtualInput::is_signed)
    }

    /// The first output that actually transfers assets (skipping the
    /// split-root change output), i.e. the primary recipient.
    pub fn first_recipient(&self) -> Option<&VirtualOutput> {
        self.outputs
            .iter()
            .find(|out| out.output_type == TransferOutputType::Commitment)
    }
}

/// An asset colocated on a spent anchor output whose state does not
/// change, but whose proof file must be re-stamped under the new anchor.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PassiveAsset {
    pub genesis_id: AssetId,
    pub script_key: ScriptKey,
    /// The re-anchoring virtual packet for this asset.
    pub vpacket: VirtualPacket,
    /// Filled in by anchoring: the encoded, unstamped transition proof
    /// re-committing the asset under the new anchor.
    pub new_proof: Option<Blob>,
}
