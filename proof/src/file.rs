//! Transition proofs and append-only proof files.

use crate::error::ProofError;
use crate::locator::Blob;
use freight_types::{AssetId, BlockHash, SerializedKey, Transaction, TxConfirmation};
use serde::{Deserialize, Serialize};

/// One state transition in an asset's provenance history.
///
/// A freshly built proof (a *proof suffix*) carries the anchor transaction
/// but no confirmation data yet; [`TransitionProof::stamp`] fills in the
/// block attribution once the anchor transaction confirms.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionProof {
    pub asset_id: AssetId,
    pub script_key: SerializedKey,
    pub amount: u64,
    /// The on-chain transaction anchoring the new asset state.
    pub anchor_tx: Transaction,
    /// Confirming block hash; zero until stamped.
    pub block_hash: BlockHash,
    /// Confirming block height; zero until stamped.
    pub block_height: u32,
    /// The anchor transaction's index within the confirming block.
    pub tx_index: u32,
    /// For merges: the full proof files of every input beyond the first.
    pub additional_inputs: Vec<ProofFile>,
}

impl TransitionProof {
    /// A new, unstamped transition proof for the given transfer.
    pub fn new(
        asset_id: AssetId,
        script_key: SerializedKey,
        amount: u64,
        anchor_tx: Transaction,
    ) -> Self {
        Self {
            asset_id,
            script_key,
            amount,
            anchor_tx,
            block_hash: BlockHash::ZERO,
            block_height: 0,
            tx_index: 0,
            additional_inputs: Vec::new(),
        }
    }

    /// Whether this proof carries its confirmation stamp.
    pub fn is_stamped(&self) -> bool {
        !self.block_hash.is_zero()
    }

    /// Stamp the proof with the observed confirmation of its anchor
    /// transaction.
    ///
    /// Stamping is idempotent: re-applying the same confirmation is a no-op
    /// (this happens when a resumed parcel re-seals its proofs), while a
    /// conflicting confirmation is an error.
    pub fn stamp(&mut self, conf: &TxConfirmation) -> Result<(), ProofError> {
        if conf.tx.txid() != self.anchor_tx.txid() {
            return Err(ProofError::AnchorMismatch);
        }

        if self.is_stamped() {
            let same = self.block_hash == conf.block_hash
                && self.block_height == conf.block_height
                && self.tx_index == conf.tx_index;
            return if same {
                Ok(())
            } else {
                Err(ProofError::StampConflict)
            };
        }

        self.anchor_tx = conf.tx.clone();
        self.block_hash = conf.block_hash;
        self.block_height = conf.block_height;
        self.tx_index = conf.tx_index;
        Ok(())
    }

    /// Decode a single transition proof from its encoded form.
    pub fn decode(blob: &[u8]) -> Result<Self, ProofError> {
        bincode::deserialize(blob).map_err(|e| ProofError::Decode(e.to_string()))
    }

    /// Encode this transition proof.
    pub fn encode(&self) -> Result<Blob, ProofError> {
        bincode::serialize(self).map_err(|e| ProofError::Encode(e.to_string()))
    }
}

/// The ordered, append-only proof history for one `(asset id, script key)`
/// pair.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofFile {
    proofs: Vec<TransitionProof>,
}

impl ProofFile {
    /// An empty proof file.
    pub fn new() -> Self {
        Self::default()
    }

    /// A proof file seeded with an initial (already stamped) proof.
    pub fn with_proof(proof: TransitionProof) -> Result<Self, ProofError> {
        let mut file = Self::new();
        file.append(proof)?;
        Ok(file)
    }

    /// Append a stamped transition proof to the end of the file.
    pub fn append(&mut self, proof: TransitionProof) -> Result<(), ProofError> {
        if !proof.is_stamped() {
            return Err(ProofError::UnstampedProof);
        }
        self.proofs.push(proof);
        Ok(())
    }

    /// The most recent transition proof.
    pub fn last_proof(&self) -> Option<&TransitionProof> {
        self.proofs.last()
    }

    pub fn num_proofs(&self) -> usize {
        self.proofs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.proofs.is_empty()
    }

    pub fn proofs(&self) -> &[TransitionProof] {
        &self.proofs
    }

    pub fn decode(blob: &[u8]) -> Result<Self, ProofError> {
        bincode::deserialize(blob).map_err(|e| ProofError::Decode(e.to_string()))
    }

    pub fn encode(&self) -> Result<Blob, ProofError> {
        bincode::serialize(self).map_err(|e| ProofError::Encode(e.to_string()))
    }
}
