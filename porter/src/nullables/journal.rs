//! In-memory export journal.

use crate::nullables::sequence::CallSequence;
use async_trait::async_trait;
use freight_journal::{ExportLog, JournalError, OutboundParcel, ParcelConfirmEvent};
use freight_types::Txid;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// An [`ExportLog`] backed by maps. "Durability" is immediate, which
/// preserves the contract's ordering guarantees for tests.
pub struct MemoryJournal {
    pending: Mutex<HashMap<Txid, OutboundParcel>>,
    confirmed: Mutex<HashMap<Txid, ParcelConfirmEvent>>,
    confirm_calls: AtomicUsize,
    sequence: Option<CallSequence>,
}

impl MemoryJournal {
    pub fn new() -> Self {
        Self {
            pending: Mutex::new(HashMap::new()),
            confirmed: Mutex::new(HashMap::new()),
            confirm_calls: AtomicUsize::new(0),
            sequence: None,
        }
    }

    pub fn with_sequence(mut self, sequence: CallSequence) -> Self {
        self.sequence = Some(sequence);
        self
    }

    /// Seed a pending parcel, as if logged before a crash.
    pub fn seed_pending(&self, parcel: OutboundParcel) {
        self.pending
            .lock()
            .expect("pending lock")
            .insert(parcel.anchor_txid(), parcel);
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().expect("pending lock").len()
    }

    /// Total `confirm_parcel_delivery` invocations, successful or not.
    pub fn confirm_calls(&self) -> usize {
        self.confirm_calls.load(Ordering::SeqCst)
    }

    pub fn confirmed_event(&self, txid: Txid) -> Option<ParcelConfirmEvent> {
        self.confirmed.lock().expect("confirmed lock").get(&txid).cloned()
    }

    fn record(&self, name: &str) {
        if let Some(sequence) = &self.sequence {
            sequence.record(name);
        }
    }
}

impl Default for MemoryJournal {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ExportLog for MemoryJournal {
    async fn log_pending_parcel(&self, parcel: &OutboundParcel) -> Result<(), JournalError> {
        self.record("log_pending_parcel");
        self.pending
            .lock()
            .expect("pending lock")
            .insert(parcel.anchor_txid(), parcel.clone());
        Ok(())
    }

    async fn pending_parcels(&self) -> Result<Vec<OutboundParcel>, JournalError> {
        self.record("pending_parcels");
        Ok(self.pending.lock().expect("pending lock").values().cloned().collect())
    }

    async fn confirm_parcel_delivery(
        &self,
        event: &ParcelConfirmEvent,
    ) -> Result<(), JournalError> {
        self.record("confirm_parcel_delivery");
        self.confirm_calls.fetch_add(1, Ordering::SeqCst);

        let removed = self
            .pending
            .lock()
            .expect("pending lock")
            .remove(&event.anchor_txid);
        if removed.is_none() {
            let already = self
                .confirmed
                .lock()
                .expect("confirmed lock")
                .contains_key(&event.anchor_txid);
            return Err(if already {
                JournalError::AlreadyConfirmed(event.anchor_txid.to_string())
            } else {
                JournalError::NotFound(event.anchor_txid.to_string())
            });
        }

        self.confirmed
            .lock()
            .expect("confirmed lock")
            .insert(event.anchor_txid, event.clone());
        Ok(())
    }
}
