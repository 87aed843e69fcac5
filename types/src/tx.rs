//! Anchor transaction and confirmation types.
//!
//! The engine only needs an abstract view of the chain: transactions with
//! value-bearing outputs, outpoints referencing them, and confirmation
//! events tying a transaction to a block. Consensus rules live behind the
//! chain bridge collaborator.

use crate::ids::{BlockHash, Txid};
use crate::keys::PublicKey;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// A reference to a specific output of a transaction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OutPoint {
    pub txid: Txid,
    pub vout: u32,
}

impl OutPoint {
    pub fn new(txid: Txid, vout: u32) -> Self {
        Self { txid, vout }
    }
}

impl fmt::Display for OutPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.txid, self.vout)
    }
}

/// A transaction input spending a previous output.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxIn {
    pub prev_out: OutPoint,
    /// Witness stack, filled in by the signing wallet.
    pub witness: Vec<Vec<u8>>,
}

impl TxIn {
    pub fn new(prev_out: OutPoint) -> Self {
        Self {
            prev_out,
            witness: Vec::new(),
        }
    }
}

/// A transaction output carrying value to an output script.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxOut {
    pub value: u64,
    /// The output script. Taproot-style anchor outputs carry the 33-byte
    /// serialized output key directly.
    pub script_pubkey: Vec<u8>,
}

impl TxOut {
    pub fn new(value: u64, script_pubkey: Vec<u8>) -> Self {
        Self {
            value,
            script_pubkey,
        }
    }

    /// The taproot output key of this output, when the script carries one.
    pub fn output_key(&self) -> Option<PublicKey> {
        let bytes: [u8; 33] = self.script_pubkey.as_slice().try_into().ok()?;
        Some(PublicKey::new(bytes))
    }
}

/// An on-chain transaction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub inputs: Vec<TxIn>,
    pub outputs: Vec<TxOut>,
}

impl Transaction {
    pub fn new(inputs: Vec<TxIn>, outputs: Vec<TxOut>) -> Self {
        Self { inputs, outputs }
    }

    /// The transaction identifier: a double SHA-256 over the serialized
    /// transaction.
    pub fn txid(&self) -> Txid {
        let bytes = bincode::serialize(self).expect("transaction is serializable");
        let first = Sha256::digest(&bytes);
        let second = Sha256::digest(first);
        Txid::new(second.into())
    }
}

/// A confirmed block, as seen by confirmation notifications.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub hash: BlockHash,
    pub height: u32,
}

/// A first-confirmation event for a watched transaction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxConfirmation {
    pub block_hash: BlockHash,
    pub block_height: u32,
    /// The confirmed transaction as it appeared in the block.
    pub tx: Transaction,
    /// The transaction's index within the block.
    pub tx_index: u32,
}

impl TxConfirmation {
    pub fn block(&self) -> Block {
        Block {
            hash: self.block_hash,
            height: self.block_height,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_tx() -> Transaction {
        Transaction::new(
            vec![TxIn::new(OutPoint::new(Txid::new([1; 32]), 0))],
            vec![TxOut::new(1_000, vec![2u8; 33])],
        )
    }

    #[test]
    fn txid_is_stable() {
        let tx = sample_tx();
        assert_eq!(tx.txid(), tx.txid());
        assert_eq!(tx.txid(), tx.clone().txid());
    }

    #[test]
    fn txid_changes_with_outputs() {
        let tx = sample_tx();
        let mut other = tx.clone();
        other.outputs[0].value += 1;
        assert_ne!(tx.txid(), other.txid());
    }

    #[test]
    fn output_key_requires_33_bytes() {
        let out = TxOut::new(1, vec![7u8; 33]);
        assert_eq!(out.output_key(), Some(PublicKey::new([7u8; 33])));
        assert_eq!(TxOut::new(1, vec![7u8; 20]).output_key(), None);
    }
}
