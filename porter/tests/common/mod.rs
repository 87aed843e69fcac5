//! Shared harness wiring the porter to a full set of nullable
//! collaborators.

use freight_porter::nullables::{
    CallSequence, MemoryJournal, MemoryProofArchive, NullAssetWallet, NullChainBridge,
    NullCoinSelector, NullCourier, NullKeyRing, NullSigner, NullTxValidator, NullWalletAnchor,
};
use freight_porter::{
    AddressParcel, AssetCommitment, Parcel, Porter, PorterConfig, PorterError, PorterSettings,
    TransferAddress, VirtualInput,
};
use freight_proof::{Locator, ProofFile, TransitionProof};
use freight_types::{
    AssetId, BlockHash, OutPoint, PublicKey, ScriptKey, Transaction, TxConfirmation, TxOut, Txid,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

pub struct Harness {
    pub porter: Porter,
    pub chain: Arc<NullChainBridge>,
    pub wallet: Arc<NullWalletAnchor>,
    pub key_ring: Arc<NullKeyRing>,
    pub asset_wallet: Arc<NullAssetWallet>,
    pub archive: Arc<MemoryProofArchive>,
    pub courier: Arc<NullCourier>,
    pub journal: Arc<MemoryJournal>,
    pub signer: Arc<NullSigner>,
    pub validator: Arc<NullTxValidator>,
    pub sequence: CallSequence,
    pub err_rx: mpsc::UnboundedReceiver<PorterError>,
}

pub fn harness() -> Harness {
    let sequence = CallSequence::new();
    let chain = Arc::new(NullChainBridge::new().with_sequence(sequence.clone()));
    let wallet = Arc::new(NullWalletAnchor::new().with_sequence(sequence.clone()));
    let key_ring = Arc::new(NullKeyRing::new());
    let selector = Arc::new(NullCoinSelector::new(vec![AssetCommitment {
        asset_id: asset_a(),
        root: [0xCC; 32],
    }]));
    let signer = Arc::new(NullSigner::new());
    let validator = Arc::new(NullTxValidator::new());
    let asset_wallet = Arc::new(NullAssetWallet::new(selector.clone(), signer.clone()));
    let archive = Arc::new(MemoryProofArchive::new());
    let courier = Arc::new(NullCourier::new());
    let journal = Arc::new(MemoryJournal::new().with_sequence(sequence.clone()));
    let (err_tx, err_rx) = mpsc::unbounded_channel();

    let cfg = PorterConfig {
        coin_selector: selector,
        signer: signer.clone(),
        tx_validator: validator.clone(),
        export_log: journal.clone(),
        chain_bridge: chain.clone(),
        wallet: wallet.clone(),
        key_ring: key_ring.clone(),
        asset_wallet: asset_wallet.clone(),
        proof_archive: archive.clone(),
        proof_courier: Some(courier.clone()),
        err_tx,
        settings: PorterSettings {
            rpc_timeout_secs: 2,
            ..PorterSettings::default()
        },
    };

    Harness {
        porter: Porter::new(cfg),
        chain,
        wallet,
        key_ring,
        asset_wallet,
        archive,
        courier,
        journal,
        signer,
        validator,
        sequence,
        err_rx,
    }
}

/// A second engine instance over the same collaborators, as after a
/// process restart.
pub fn restarted_porter(h: &Harness) -> Porter {
    let (err_tx, _err_rx) = mpsc::unbounded_channel();
    Porter::new(PorterConfig {
        coin_selector: Arc::new(NullCoinSelector::new(Vec::new())),
        signer: h.signer.clone(),
        tx_validator: h.validator.clone(),
        export_log: h.journal.clone(),
        chain_bridge: h.chain.clone(),
        wallet: h.wallet.clone(),
        key_ring: h.key_ring.clone(),
        asset_wallet: h.asset_wallet.clone(),
        proof_archive: h.archive.clone(),
        proof_courier: Some(h.courier.clone()),
        err_tx,
        settings: PorterSettings {
            rpc_timeout_secs: 2,
            ..PorterSettings::default()
        },
    })
}

pub fn asset_a() -> AssetId {
    AssetId::new([0xA1; 32])
}

pub fn key(tag: u8) -> PublicKey {
    PublicKey::new([tag; 33])
}

pub fn vinput(asset_id: AssetId, key_tag: u8, amount: u64) -> VirtualInput {
    VirtualInput {
        asset_id,
        script_key: ScriptKey::bare(key(key_tag)),
        outpoint: OutPoint::new(Txid::new([key_tag; 32]), 0),
        amount,
        witness: Vec::new(),
    }
}

/// Seed the archive with a single-proof history for `(asset, key_tag)`,
/// as a prior transfer would have left it.
pub fn seed_input_proof(archive: &MemoryProofArchive, asset_id: AssetId, key_tag: u8) {
    let genesis_tx = Transaction::new(Vec::new(), vec![TxOut::new(330, vec![key_tag; 33])]);
    let mut genesis =
        TransitionProof::new(asset_id, key(key_tag).serialized(), 100, genesis_tx.clone());
    genesis
        .stamp(&TxConfirmation {
            block_hash: BlockHash::new([key_tag; 32]),
            block_height: 1,
            tx: genesis_tx,
            tx_index: 0,
        })
        .expect("stamp genesis");

    let file = ProofFile::with_proof(genesis).expect("seed file");
    archive
        .insert_file(Locator::new(asset_id, key(key_tag).serialized()), &file)
        .expect("insert seed file");
}

pub fn make_conf(anchor_tx: &Transaction, block_tag: u8) -> TxConfirmation {
    TxConfirmation {
        block_hash: BlockHash::new([block_tag; 32]),
        block_height: 101,
        tx: anchor_tx.clone(),
        tx_index: 2,
    }
}

pub fn address_parcel(dests: Vec<TransferAddress>) -> Parcel {
    Parcel::Address(AddressParcel::new(dests))
}

pub fn dest(key_tag: u8, amount: u64) -> TransferAddress {
    TransferAddress {
        asset_id: asset_a(),
        script_key: key(key_tag),
        amount,
    }
}

pub async fn wait_until(what: &str, condition: impl Fn() -> bool) {
    for _ in 0..300 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for: {what}");
}
