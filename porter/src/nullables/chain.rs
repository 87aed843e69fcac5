//! Nullable chain bridge — deterministic chain interactions.

use crate::chain::{ChainBridge, ChainError, ConfirmationSubscription, FeeRate};
use crate::nullables::sequence::CallSequence;
use async_trait::async_trait;
use freight_types::{Block, BlockHash, Transaction, TxConfirmation, Txid};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Mutex;
use tokio::sync::mpsc;

/// A deterministic [`ChainBridge`] for testing.
///
/// Confirmations are scripted: once a confirmation is scripted for a
/// txid, any registration for that txid receives it immediately.
/// Unscripted registrations stay open until [`confirm_now`] fires them
/// (or the engine shuts down).
///
/// [`confirm_now`]: NullChainBridge::confirm_now
pub struct NullChainBridge {
    fee_rate: FeeRate,
    height: AtomicU32,
    blocks: Mutex<HashMap<BlockHash, Block>>,
    scripted_confs: Mutex<HashMap<Txid, TxConfirmation>>,
    open_registrations: Mutex<HashMap<Txid, mpsc::Sender<TxConfirmation>>>,
    published: Mutex<Vec<Txid>>,
    registrations: AtomicUsize,
    sequence: Option<CallSequence>,
}

impl NullChainBridge {
    pub fn new() -> Self {
        Self {
            fee_rate: FeeRate(1_000),
            height: AtomicU32::new(100),
            blocks: Mutex::new(HashMap::new()),
            scripted_confs: Mutex::new(HashMap::new()),
            open_registrations: Mutex::new(HashMap::new()),
            published: Mutex::new(Vec::new()),
            registrations: AtomicUsize::new(0),
            sequence: None,
        }
    }

    pub fn with_sequence(mut self, sequence: CallSequence) -> Self {
        self.sequence = Some(sequence);
        self
    }

    pub fn set_height(&self, height: u32) {
        self.height.store(height, Ordering::SeqCst);
    }

    /// Script the confirmation for a transaction; its block becomes known
    /// to `get_block` as well. Registrations for this txid (current and
    /// future) resolve with this event.
    pub fn script_confirmation(&self, conf: TxConfirmation) {
        self.blocks
            .lock()
            .expect("blocks lock")
            .insert(conf.block_hash, conf.block());

        let txid = conf.tx.txid();
        if let Some(sender) = self
            .open_registrations
            .lock()
            .expect("registrations lock")
            .remove(&txid)
        {
            let _ = sender.try_send(conf.clone());
        }
        self.scripted_confs
            .lock()
            .expect("confs lock")
            .insert(txid, conf);
    }

    /// Fire an already-scripted confirmation at an open registration.
    pub fn confirm_now(&self, txid: Txid) -> bool {
        let conf = match self.scripted_confs.lock().expect("confs lock").get(&txid) {
            Some(conf) => conf.clone(),
            None => return false,
        };
        match self
            .open_registrations
            .lock()
            .expect("registrations lock")
            .remove(&txid)
        {
            Some(sender) => sender.try_send(conf).is_ok(),
            None => false,
        }
    }

    pub fn publish_count(&self, txid: Txid) -> usize {
        self.published
            .lock()
            .expect("published lock")
            .iter()
            .filter(|p| **p == txid)
            .count()
    }

    pub fn registration_count(&self) -> usize {
        self.registrations.load(Ordering::SeqCst)
    }

    fn record(&self, name: &str) {
        if let Some(sequence) = &self.sequence {
            sequence.record(name);
        }
    }
}

impl Default for NullChainBridge {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChainBridge for NullChainBridge {
    async fn estimate_fee(&self, _conf_target: u32) -> Result<FeeRate, ChainError> {
        self.record("estimate_fee");
        Ok(self.fee_rate)
    }

    async fn current_height(&self) -> Result<u32, ChainError> {
        self.record("current_height");
        Ok(self.height.load(Ordering::SeqCst))
    }

    async fn publish_transaction(&self, tx: &Transaction) -> Result<(), ChainError> {
        self.record("publish_transaction");
        // Re-publishing an already-broadcast transaction is a success.
        self.published.lock().expect("published lock").push(tx.txid());
        Ok(())
    }

    async fn register_confirmations_ntfn(
        &self,
        txid: Txid,
        _pk_script: Vec<u8>,
        _num_confs: u32,
        _height_hint: u32,
        _include_mempool: bool,
    ) -> Result<ConfirmationSubscription, ChainError> {
        self.record("register_confirmations_ntfn");
        self.registrations.fetch_add(1, Ordering::SeqCst);

        let (conf_tx, conf_rx) = mpsc::channel(1);
        // The error channel stays empty; dropping the sender signals
        // "nothing to report".
        let (_err_tx, err_rx) = mpsc::channel(1);

        let scripted = self
            .scripted_confs
            .lock()
            .expect("confs lock")
            .get(&txid)
            .cloned();
        match scripted {
            Some(conf) => {
                let _ = conf_tx.try_send(conf);
            }
            None => {
                self.open_registrations
                    .lock()
                    .expect("registrations lock")
                    .insert(txid, conf_tx);
            }
        }

        Ok(ConfirmationSubscription {
            confirmed: conf_rx,
            errors: err_rx,
        })
    }

    async fn get_block(&self, hash: BlockHash) -> Result<Block, ChainError> {
        self.blocks
            .lock()
            .expect("blocks lock")
            .get(&hash)
            .copied()
            .ok_or(ChainError::BlockNotFound(hash))
    }
}
