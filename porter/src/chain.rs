//! Chain bridge collaborator contract.

use async_trait::async_trait;
use freight_proof::{HeaderVerifier, ProofError};
use freight_types::{Block, BlockHash, Transaction, TxConfirmation, Txid};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;

/// An on-chain fee rate in satoshis per kiloweight.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FeeRate(pub u64);

impl fmt::Display for FeeRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} sat/kw", self.0)
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ChainError {
    #[error("fee estimation failed: {0}")]
    FeeEstimation(String),

    #[error("transaction publish failed: {0}")]
    Publish(String),

    #[error("confirmation registration failed: {0}")]
    Registration(String),

    #[error("block not found: {0}")]
    BlockNotFound(BlockHash),

    #[error("chain rpc timed out")]
    Timeout,

    #[error("chain error: {0}")]
    Other(String),
}

/// The live side of a confirmation registration: one channel delivers the
/// confirmation event, the other delivers registration-time failures.
pub struct ConfirmationSubscription {
    pub confirmed: mpsc::Receiver<TxConfirmation>,
    pub errors: mpsc::Receiver<ChainError>,
}

/// Bridge to the chain backend the engine operates on.
///
/// Implementations must be safe for concurrent calls from multiple driver
/// tasks. `publish_transaction` must treat re-publishing an
/// already-broadcast transaction as a success; the engine relies on this
/// when resuming journaled parcels.
#[async_trait]
pub trait ChainBridge: Send + Sync {
    /// Estimate a fee rate that confirms within `conf_target` blocks.
    async fn estimate_fee(&self, conf_target: u32) -> Result<FeeRate, ChainError>;

    /// The current best block height.
    async fn current_height(&self) -> Result<u32, ChainError>;

    /// Broadcast a transaction to the network.
    async fn publish_transaction(&self, tx: &Transaction) -> Result<(), ChainError>;

    /// Register for a first-confirmation notification on `(txid, script)`
    /// starting from `height_hint`.
    async fn register_confirmations_ntfn(
        &self,
        txid: Txid,
        pk_script: Vec<u8>,
        num_confs: u32,
        height_hint: u32,
        include_mempool: bool,
    ) -> Result<ConfirmationSubscription, ChainError>;

    /// Look up a confirmed block by hash.
    async fn get_block(&self, hash: BlockHash) -> Result<Block, ChainError>;
}

/// A [`HeaderVerifier`] backed by the chain bridge: a proof's confirming
/// header is valid when the bridge knows the block and the heights agree.
pub struct ChainHeaderVerifier {
    bridge: Arc<dyn ChainBridge>,
}

impl ChainHeaderVerifier {
    pub fn new(bridge: Arc<dyn ChainBridge>) -> Self {
        Self { bridge }
    }
}

#[async_trait]
impl HeaderVerifier for ChainHeaderVerifier {
    async fn verify_header(&self, hash: BlockHash, height: u32) -> Result<(), ProofError> {
        let block = self
            .bridge
            .get_block(hash)
            .await
            .map_err(|e| ProofError::HeaderVerification(e.to_string()))?;

        if block.height != height {
            return Err(ProofError::HeaderVerification(format!(
                "block {hash} is at height {}, proof claims {height}",
                block.height,
            )));
        }

        Ok(())
    }
}
