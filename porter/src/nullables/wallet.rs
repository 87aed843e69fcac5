//! Nullable wallet-side collaborators.

use crate::chain::FeeRate;
use crate::nullables::sequence::CallSequence;
use crate::parcel::TransferAddress;
use crate::vpacket::{
    AssetCommitment, PassiveAsset, VirtualInput, VirtualOutput, VirtualPacket, DUMMY_ANCHOR_VALUE,
};
use crate::wallet::{
    AnchorTxnsParams, AnchoredTransfer, AssetWallet, CoinSelector, FundedPsbt, FundedSend,
    KeyRing, Signer, TxValidator, WalletAnchor, WalletError,
};
use async_trait::async_trait;
use freight_journal::{AnchorInfo, TransferOutputType};
use freight_types::{AssetId, OutPoint, PublicKey, ScriptKey, Transaction, TxIn, TxOut, Txid};
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Marker witness the nullable signer attaches to every input.
pub const NULL_WITNESS: u8 = 0xAA;

/// A deterministic [`CoinSelector`] returning a fixed commitment set.
pub struct NullCoinSelector {
    commitments: Vec<AssetCommitment>,
    calls: AtomicUsize,
}

impl NullCoinSelector {
    pub fn new(commitments: Vec<AssetCommitment>) -> Self {
        Self {
            commitments,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CoinSelector for NullCoinSelector {
    async fn select_coins(
        &self,
        _target_amount: u64,
        _asset_ids: &[AssetId],
    ) -> Result<Vec<AssetCommitment>, WalletError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.commitments.clone())
    }
}

/// A [`Signer`] that stamps a marker witness on every input.
pub struct NullSigner {
    sign_calls: AtomicUsize,
}

impl NullSigner {
    pub fn new() -> Self {
        Self {
            sign_calls: AtomicUsize::new(0),
        }
    }

    pub fn sign_count(&self) -> usize {
        self.sign_calls.load(Ordering::SeqCst)
    }
}

impl Default for NullSigner {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Signer for NullSigner {
    async fn sign_virtual_packet(&self, packet: &mut VirtualPacket) -> Result<(), WalletError> {
        self.sign_calls.fetch_add(1, Ordering::SeqCst);
        for input in &mut packet.inputs {
            input.witness = vec![vec![NULL_WITNESS]];
        }
        Ok(())
    }
}

/// A [`TxValidator`] that insists every input carries a witness.
pub struct NullTxValidator {
    validations: AtomicUsize,
}

impl NullTxValidator {
    pub fn new() -> Self {
        Self {
            validations: AtomicUsize::new(0),
        }
    }

    pub fn validation_count(&self) -> usize {
        self.validations.load(Ordering::SeqCst)
    }
}

impl Default for NullTxValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl TxValidator for NullTxValidator {
    fn validate(&self, packet: &VirtualPacket) -> Result<(), WalletError> {
        self.validations.fetch_add(1, Ordering::SeqCst);
        if !packet.is_fully_signed() {
            return Err(WalletError::Signing("packet has unsigned inputs".into()));
        }
        Ok(())
    }
}

/// A [`WalletAnchor`] tracking imported taproot outputs.
pub struct NullWalletAnchor {
    imported: Mutex<HashSet<[u8; 33]>>,
    import_attempts: AtomicUsize,
    sequence: Option<CallSequence>,
}

impl NullWalletAnchor {
    pub fn new() -> Self {
        Self {
            imported: Mutex::new(HashSet::new()),
            import_attempts: AtomicUsize::new(0),
            sequence: None,
        }
    }

    pub fn with_sequence(mut self, sequence: CallSequence) -> Self {
        self.sequence = Some(sequence);
        self
    }

    /// Mark a key as already imported, as a wallet restored from seed
    /// would see it.
    pub fn pre_import(&self, key: PublicKey) {
        self.imported.lock().expect("imported lock").insert(key.0);
    }

    pub fn imported_count(&self) -> usize {
        self.imported.lock().expect("imported lock").len()
    }

    pub fn import_attempts(&self) -> usize {
        self.import_attempts.load(Ordering::SeqCst)
    }
}

impl Default for NullWalletAnchor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WalletAnchor for NullWalletAnchor {
    async fn fund_psbt(
        &self,
        template: &Transaction,
        _fee_rate: FeeRate,
    ) -> Result<FundedPsbt, WalletError> {
        Ok(FundedPsbt {
            tx: template.clone(),
            change_index: None,
        })
    }

    async fn sign_psbt(&self, psbt: FundedPsbt) -> Result<Transaction, WalletError> {
        Ok(psbt.tx)
    }

    async fn import_taproot_output(&self, pub_key: PublicKey) -> Result<(), WalletError> {
        if let Some(sequence) = &self.sequence {
            sequence.record("import_taproot_output");
        }
        self.import_attempts.fetch_add(1, Ordering::SeqCst);

        let inserted = self.imported.lock().expect("imported lock").insert(pub_key.0);
        if !inserted {
            return Err(WalletError::AlreadyExists);
        }
        Ok(())
    }
}

/// A [`KeyRing`] owning a configurable set of raw keys.
pub struct NullKeyRing {
    local: Mutex<HashSet<[u8; 33]>>,
}

impl NullKeyRing {
    pub fn new() -> Self {
        Self {
            local: Mutex::new(HashSet::new()),
        }
    }

    pub fn add_local_key(&self, key: PublicKey) {
        self.local.lock().expect("local lock").insert(key.0);
    }
}

impl Default for NullKeyRing {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KeyRing for NullKeyRing {
    async fn is_local_key(&self, raw_key: &PublicKey) -> bool {
        self.local.lock().expect("local lock").contains(&raw_key.0)
    }
}

/// A passive asset the nullable asset wallet will produce during
/// anchoring.
#[derive(Clone, Debug)]
pub struct PassiveSpec {
    pub genesis_id: AssetId,
    pub script_key: ScriptKey,
    pub amount: u64,
}

/// A deterministic [`AssetWallet`].
///
/// Funding builds a virtual packet from the scripted inputs, appending a
/// split-root change output when the inputs overshoot the destinations.
/// Anchoring fabricates a single anchor transaction whose outputs carry
/// the virtual outputs' script keys, and stamps anchor info plus an
/// unstamped proof suffix onto every output.
pub struct NullAssetWallet {
    coin_selector: Arc<dyn CoinSelector>,
    signer: Arc<dyn Signer>,
    inputs: Mutex<Vec<VirtualInput>>,
    change_key: Mutex<Option<ScriptKey>>,
    passives: Mutex<Vec<PassiveSpec>>,
    funding_outpoint: OutPoint,
}

impl NullAssetWallet {
    pub fn new(coin_selector: Arc<dyn CoinSelector>, signer: Arc<dyn Signer>) -> Self {
        Self {
            coin_selector,
            signer,
            inputs: Mutex::new(Vec::new()),
            change_key: Mutex::new(None),
            passives: Mutex::new(Vec::new()),
            funding_outpoint: OutPoint::new(Txid::new([0xFD; 32]), 0),
        }
    }

    /// Script the asset inputs the next funding round will consume.
    pub fn set_inputs(&self, inputs: Vec<VirtualInput>) {
        *self.inputs.lock().expect("inputs lock") = inputs;
    }

    /// Script the change script key for split transfers.
    pub fn set_change_key(&self, key: ScriptKey) {
        *self.change_key.lock().expect("change lock") = Some(key);
    }

    /// Script the passive assets colocated with the consumed inputs.
    pub fn set_passives(&self, passives: Vec<PassiveSpec>) {
        *self.passives.lock().expect("passives lock") = passives;
    }

    fn passive_amount(&self, genesis_id: AssetId) -> u64 {
        self.passives
            .lock()
            .expect("passives lock")
            .iter()
            .find(|spec| spec.genesis_id == genesis_id)
            .map_or(1, |spec| spec.amount)
    }
}

#[async_trait]
impl AssetWallet for NullAssetWallet {
    async fn fund_address_send(
        &self,
        destinations: &[TransferAddress],
    ) -> Result<FundedSend, WalletError> {
        if destinations.is_empty() {
            return Err(WalletError::Funding("no destinations".into()));
        }

        let total_out: u64 = destinations.iter().map(|d| d.amount).sum();
        let asset_ids: Vec<AssetId> = destinations.iter().map(|d| d.asset_id).collect();
        let input_commitments = self.coin_selector.select_coins(total_out, &asset_ids).await?;

        let inputs = self.inputs.lock().expect("inputs lock").clone();
        let total_in: u64 = inputs.iter().map(|i| i.amount).sum();
        if total_in < total_out {
            return Err(WalletError::InsufficientAssets(format!(
                "have {total_in}, need {total_out}"
            )));
        }

        let mut outputs = Vec::new();
        if total_in > total_out {
            let change_key = self
                .change_key
                .lock()
                .expect("change lock")
                .clone()
                .ok_or_else(|| WalletError::Funding("split requires a change key".into()))?;
            outputs.push(VirtualOutput {
                output_type: TransferOutputType::SplitRoot,
                amount: total_in - total_out,
                script_key: change_key,
                anchor: None,
                proof_suffix: None,
            });
        }
        for dest in destinations {
            outputs.push(VirtualOutput {
                output_type: TransferOutputType::Commitment,
                amount: dest.amount,
                script_key: ScriptKey::bare(dest.script_key),
                anchor: None,
                proof_suffix: None,
            });
        }

        Ok(FundedSend {
            vpacket: VirtualPacket { inputs, outputs },
            input_commitments,
        })
    }

    async fn sign_virtual_packet(&self, packet: &mut VirtualPacket) -> Result<(), WalletError> {
        self.signer.sign_virtual_packet(packet).await
    }

    async fn sign_passive_assets(
        &self,
        _packet: &VirtualPacket,
        _input_commitments: &[AssetCommitment],
    ) -> Result<Vec<PassiveAsset>, WalletError> {
        let passives = self.passives.lock().expect("passives lock").clone();
        Ok(passives
            .into_iter()
            .map(|spec| PassiveAsset {
                genesis_id: spec.genesis_id,
                script_key: spec.script_key,
                vpacket: VirtualPacket::default(),
                new_proof: None,
            })
            .collect())
    }

    async fn anchor_virtual_transactions(
        &self,
        params: AnchorTxnsParams,
    ) -> Result<AnchoredTransfer, WalletError> {
        let mut vpackets = params.vpackets;
        let mut passive_assets = params.passive_assets;

        // A transfer with no active outputs (passive re-anchoring only)
        // still needs an anchor output to commit the passives to.
        let no_outputs = vpackets.iter().all(|vp| vp.outputs.is_empty());
        if no_outputs {
            let carrier = passive_assets.first().ok_or_else(|| {
                WalletError::Funding("nothing to anchor".into())
            })?;
            if let Some(vp) = vpackets.first_mut() {
                vp.outputs.push(VirtualOutput {
                    output_type: TransferOutputType::PassiveOnly,
                    amount: 0,
                    script_key: carrier.script_key.clone(),
                    anchor: None,
                    proof_suffix: None,
                });
            }
        }

        let mut tx_outputs = Vec::new();
        for vp in &vpackets {
            for out in &vp.outputs {
                tx_outputs.push(TxOut::new(
                    DUMMY_ANCHOR_VALUE,
                    out.script_key.pub_key.0.to_vec(),
                ));
            }
        }

        let mut funding_input = TxIn::new(self.funding_outpoint);
        funding_input.witness = vec![vec![0xBB]];
        let anchor_tx = Transaction::new(vec![funding_input], tx_outputs);
        let anchor_txid = anchor_tx.txid();

        let mut vout = 0u32;
        for vp in &mut vpackets {
            let packet_asset = vp
                .inputs
                .first()
                .map_or(AssetId::ZERO, |input| input.asset_id);
            for out in &mut vp.outputs {
                out.anchor = Some(AnchorInfo {
                    outpoint: OutPoint::new(anchor_txid, vout),
                    value: DUMMY_ANCHOR_VALUE,
                });
                if out.output_type != TransferOutputType::PassiveOnly {
                    let suffix = freight_proof::TransitionProof::new(
                        packet_asset,
                        out.script_key.serialized(),
                        out.amount,
                        anchor_tx.clone(),
                    );
                    out.proof_suffix = Some(
                        suffix
                            .encode()
                            .map_err(|e| WalletError::Other(e.to_string()))?,
                    );
                }
                vout += 1;
            }
        }

        for passive in &mut passive_assets {
            let new_proof = freight_proof::TransitionProof::new(
                passive.genesis_id,
                passive.script_key.serialized(),
                self.passive_amount(passive.genesis_id),
                anchor_tx.clone(),
            );
            passive.new_proof = Some(
                new_proof
                    .encode()
                    .map_err(|e| WalletError::Other(e.to_string()))?,
            );
        }

        Ok(AnchoredTransfer {
            anchor_tx,
            vpackets,
            passive_assets,
        })
    }
}
