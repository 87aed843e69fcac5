//! Integration tests exercising the full transfer pipeline:
//! request intake → coin selection → signing → anchoring → journaling →
//! broadcast → confirmation → proof sealing → courier delivery.
//!
//! All collaborators are nullables, so every scenario is deterministic
//! and asserts on the exact side effects the engine performed.

mod common;

use common::{
    address_parcel, asset_a, dest, harness, key, make_conf, restarted_porter, seed_input_proof,
    vinput, wait_until,
};
use freight_journal::{
    AnchorInfo, ExportLog, OutboundParcel, TransferInput, TransferOutput, TransferOutputType,
};
use freight_porter::nullables::PassiveSpec;
use freight_porter::{
    CourierError, Parcel, PendingParcel, PorterError, PreSignedParcel, VirtualPacket,
};
use freight_proof::{Locator, TransitionProof};
use freight_types::{AssetId, OutPoint, ScriptKey, Transaction, TxIn, TxOut, Txid};
use std::time::Duration;

// ---------------------------------------------------------------------------
// S1 — single output, external receiver
// ---------------------------------------------------------------------------

#[tokio::test]
async fn s1_single_output_external_receiver() {
    let h = harness();
    h.asset_wallet.set_inputs(vec![vinput(asset_a(), 0x11, 100)]);
    seed_input_proof(&h.archive, asset_a(), 0x11);
    h.porter.start().await.unwrap();

    let outbound = h
        .porter
        .request_shipment(address_parcel(vec![dest(0x22, 100)]))
        .await
        .unwrap();

    assert_eq!(outbound.inputs.len(), 1);
    assert_eq!(outbound.outputs.len(), 1);
    assert_eq!(outbound.outputs[0].amount, 100);

    let txid = outbound.anchor_txid();
    h.chain.script_confirmation(make_conf(&outbound.anchor_tx, 0x77));
    wait_until("parcel confirmed", || h.journal.confirm_calls() == 1).await;

    // One virtual sign, one validation, one publish, one delivery.
    assert_eq!(h.signer.sign_count(), 1);
    assert_eq!(h.validator.validation_count(), 1);
    assert_eq!(h.chain.publish_count(txid), 1);

    let deliveries = h.courier.deliveries();
    assert_eq!(deliveries.len(), 1);
    assert_eq!(deliveries[0].script_key, key(0x22));
    assert_eq!(deliveries[0].amount, 100);

    // The sealed proof lives under (asset, K2): seed proof + new suffix.
    let sealed = h
        .archive
        .file(&Locator::new(asset_a(), key(0x22).serialized()))
        .expect("sealed proof file");
    assert_eq!(sealed.num_proofs(), 2);

    let confirmed = h.journal.confirmed_event(txid).expect("confirm event");
    assert_eq!(confirmed.final_proofs.len(), 1);
    assert!(confirmed.final_proofs.contains_key(&key(0x22).serialized()));
    assert_eq!(h.journal.pending_count(), 0);

    h.porter.stop().await.unwrap();
}

/// Property 2: journaling strictly precedes broadcast.
#[tokio::test]
async fn journal_completes_before_broadcast() {
    let h = harness();
    h.asset_wallet.set_inputs(vec![vinput(asset_a(), 0x11, 100)]);
    seed_input_proof(&h.archive, asset_a(), 0x11);
    h.porter.start().await.unwrap();

    let outbound = h
        .porter
        .request_shipment(address_parcel(vec![dest(0x22, 100)]))
        .await
        .unwrap();
    h.chain.script_confirmation(make_conf(&outbound.anchor_tx, 0x70));
    wait_until("parcel confirmed", || h.journal.confirm_calls() == 1).await;

    let log_idx = h.sequence.index_of("log_pending_parcel").expect("journaled");
    let publish_idx = h
        .sequence
        .index_of("publish_transaction")
        .expect("broadcast");
    assert!(log_idx < publish_idx, "journal must land before broadcast");

    h.porter.stop().await.unwrap();
}

/// Property 8: the sealed proof references the observed confirmation
/// bit-for-bit.
#[tokio::test]
async fn sealed_proof_carries_exact_confirmation() {
    let h = harness();
    h.asset_wallet.set_inputs(vec![vinput(asset_a(), 0x11, 100)]);
    seed_input_proof(&h.archive, asset_a(), 0x11);
    h.porter.start().await.unwrap();

    let outbound = h
        .porter
        .request_shipment(address_parcel(vec![dest(0x22, 100)]))
        .await
        .unwrap();
    let conf = make_conf(&outbound.anchor_tx, 0x5A);
    h.chain.script_confirmation(conf.clone());
    wait_until("parcel confirmed", || h.journal.confirm_calls() == 1).await;

    let sealed = h
        .archive
        .file(&Locator::new(asset_a(), key(0x22).serialized()))
        .expect("sealed proof file");
    let last = sealed.last_proof().expect("sealed transition");
    assert_eq!(last.block_hash, conf.block_hash);
    assert_eq!(last.block_height, conf.block_height);
    assert_eq!(last.tx_index, conf.tx_index);
    assert_eq!(last.anchor_tx, conf.tx);

    h.porter.stop().await.unwrap();
}

// ---------------------------------------------------------------------------
// S2 — split with local change
// ---------------------------------------------------------------------------

#[tokio::test]
async fn s2_split_with_local_change() {
    let h = harness();
    h.asset_wallet.set_inputs(vec![vinput(asset_a(), 0x11, 100)]);
    // K3 is ours: fully described and owned by the keyring.
    h.asset_wallet
        .set_change_key(ScriptKey::declared(key(0x33), key(0x34), vec![1]));
    h.key_ring.add_local_key(key(0x34));
    seed_input_proof(&h.archive, asset_a(), 0x11);
    h.porter.start().await.unwrap();

    let outbound = h
        .porter
        .request_shipment(address_parcel(vec![dest(0x22, 30)]))
        .await
        .unwrap();

    assert_eq!(outbound.outputs.len(), 2);
    let split_root = &outbound.outputs[0];
    assert_eq!(split_root.output_type, TransferOutputType::SplitRoot);
    assert_eq!(split_root.amount, 70);
    assert!(split_root.script_key_local);

    let txid = outbound.anchor_txid();
    h.chain.script_confirmation(make_conf(&outbound.anchor_tx, 0x78));
    wait_until("parcel confirmed", || h.journal.confirm_calls() == 1).await;

    // The local change anchor output was imported into the wallet.
    assert_eq!(h.wallet.import_attempts(), 1);
    assert_eq!(h.wallet.imported_count(), 1);

    // Courier only ran for the remote receiver.
    let deliveries = h.courier.deliveries();
    assert_eq!(deliveries.len(), 1);
    assert_eq!(deliveries[0].script_key, key(0x22));

    // Both final proofs sealed and archived.
    let confirmed = h.journal.confirmed_event(txid).expect("confirm event");
    assert_eq!(confirmed.final_proofs.len(), 2);
    assert!(h
        .archive
        .file(&Locator::new(asset_a(), key(0x22).serialized()))
        .is_some());
    assert!(h
        .archive
        .file(&Locator::new(asset_a(), key(0x33).serialized()))
        .is_some());

    h.porter.stop().await.unwrap();
}

// ---------------------------------------------------------------------------
// S3 — merge
// ---------------------------------------------------------------------------

#[tokio::test]
async fn s3_merge_attaches_additional_input_proofs() {
    let h = harness();
    h.asset_wallet
        .set_inputs(vec![vinput(asset_a(), 0x11, 60), vinput(asset_a(), 0x44, 40)]);
    seed_input_proof(&h.archive, asset_a(), 0x11);
    seed_input_proof(&h.archive, asset_a(), 0x44);
    h.porter.start().await.unwrap();

    let outbound = h
        .porter
        .request_shipment(address_parcel(vec![dest(0x22, 100)]))
        .await
        .unwrap();
    assert_eq!(outbound.inputs.len(), 2);

    h.chain.script_confirmation(make_conf(&outbound.anchor_tx, 0x79));
    wait_until("parcel confirmed", || h.journal.confirm_calls() == 1).await;

    // Property 7: n inputs → n-1 additional input files, matching
    // inputs[1..].
    let sealed = h
        .archive
        .file(&Locator::new(asset_a(), key(0x22).serialized()))
        .expect("sealed proof file");
    let last = sealed.last_proof().expect("sealed transition");
    assert_eq!(last.additional_inputs.len(), 1);
    let extra = last.additional_inputs[0]
        .last_proof()
        .expect("additional input history");
    assert_eq!(extra.script_key, key(0x44).serialized());

    h.porter.stop().await.unwrap();
}

// ---------------------------------------------------------------------------
// S4 — passive assets only
// ---------------------------------------------------------------------------

#[tokio::test]
async fn s4_passive_assets_only() {
    let h = harness();
    h.asset_wallet.set_passives(vec![
        PassiveSpec {
            genesis_id: AssetId::new([0xB1; 32]),
            script_key: ScriptKey::bare(key(0x51)),
            amount: 7,
        },
        PassiveSpec {
            genesis_id: AssetId::new([0xB2; 32]),
            script_key: ScriptKey::bare(key(0x52)),
            amount: 9,
        },
    ]);
    seed_input_proof(&h.archive, AssetId::new([0xB1; 32]), 0x51);
    seed_input_proof(&h.archive, AssetId::new([0xB2; 32]), 0x52);
    h.porter.start().await.unwrap();

    // An externally anchored transfer: no active inputs or outputs, the
    // prepared (empty) packet goes straight to anchoring.
    let parcel = Parcel::PreSigned(PreSignedParcel::new(VirtualPacket::default(), Vec::new()));
    let outbound = h.porter.request_shipment(parcel).await.unwrap();
    assert!(!outbound.has_active_transfers());
    assert_eq!(outbound.passive_assets.len(), 2);

    let txid = outbound.anchor_txid();
    h.chain.script_confirmation(make_conf(&outbound.anchor_tx, 0x7A));
    wait_until("parcel confirmed", || h.journal.confirm_calls() == 1).await;

    // Exactly the two passive proofs were imported; no output proofs, no
    // deliveries.
    let passive_a = Locator::new(AssetId::new([0xB1; 32]), key(0x51).serialized());
    let passive_b = Locator::new(AssetId::new([0xB2; 32]), key(0x52).serialized());
    assert_eq!(h.archive.import_count_for(&passive_a), 1);
    assert_eq!(h.archive.import_count_for(&passive_b), 1);
    assert_eq!(h.archive.total_imports(), 2);
    assert_eq!(h.archive.file(&passive_a).unwrap().num_proofs(), 2);
    assert_eq!(h.archive.file(&passive_b).unwrap().num_proofs(), 2);

    assert!(h.courier.deliveries().is_empty());
    let confirmed = h.journal.confirmed_event(txid).expect("confirm event");
    assert!(confirmed.final_proofs.is_empty());
    assert_eq!(confirmed.passive_proof_files.len(), 2);

    h.porter.stop().await.unwrap();
}

// ---------------------------------------------------------------------------
// S5 — resume from Broadcast
// ---------------------------------------------------------------------------

/// A journaled parcel as a crash between LogCommit and Broadcast leaves
/// it: one remote output (K2) and one local change output (K3).
fn crashed_outbound() -> OutboundParcel {
    let mut funding = TxIn::new(OutPoint::new(Txid::new([0xFD; 32]), 0));
    funding.witness = vec![vec![0xBB]];
    let anchor_tx = Transaction::new(
        vec![funding],
        vec![
            TxOut::new(330, key(0x22).0.to_vec()),
            TxOut::new(330, key(0x33).0.to_vec()),
        ],
    );
    let txid = anchor_tx.txid();

    let remote_suffix =
        TransitionProof::new(asset_a(), key(0x22).serialized(), 100, anchor_tx.clone())
            .encode()
            .unwrap();
    let change_suffix =
        TransitionProof::new(asset_a(), key(0x33).serialized(), 0, anchor_tx.clone())
            .encode()
            .unwrap();

    OutboundParcel {
        anchor_tx,
        anchor_height_hint: 100,
        inputs: vec![TransferInput {
            asset_id: asset_a(),
            script_key: key(0x11).serialized(),
            outpoint: OutPoint::new(Txid::new([0x11; 32]), 0),
            amount: 100,
        }],
        outputs: vec![
            TransferOutput {
                output_type: TransferOutputType::Commitment,
                amount: 100,
                script_key: ScriptKey::bare(key(0x22)),
                script_key_local: false,
                anchor: AnchorInfo {
                    outpoint: OutPoint::new(txid, 0),
                    value: 330,
                },
                proof_suffix: remote_suffix,
            },
            TransferOutput {
                output_type: TransferOutputType::SplitRoot,
                amount: 0,
                script_key: ScriptKey::declared(key(0x33), key(0x34), vec![1]),
                script_key_local: true,
                anchor: AnchorInfo {
                    outpoint: OutPoint::new(txid, 1),
                    value: 330,
                },
                proof_suffix: change_suffix,
            },
        ],
        passive_assets: Vec::new(),
    }
}

#[tokio::test]
async fn s5_resume_from_broadcast() {
    let h = harness();
    let outbound = crashed_outbound();
    let txid = outbound.anchor_txid();

    seed_input_proof(&h.archive, asset_a(), 0x11);
    h.journal.seed_pending(outbound.clone());
    // The wallet already tracks the change anchor output from before the
    // crash; the re-import must be tolerated.
    h.wallet.pre_import(key(0x33));
    h.chain.script_confirmation(make_conf(&outbound.anchor_tx, 0x7B));

    h.porter.start().await.unwrap();
    wait_until("resumed parcel confirmed", || h.journal.confirm_calls() == 1).await;

    // "already exists" on import was treated as success, the tx was
    // re-published, and confirmation proceeded.
    assert_eq!(h.wallet.import_attempts(), 1);
    assert_eq!(h.wallet.imported_count(), 1);
    assert_eq!(h.chain.publish_count(txid), 1);
    assert_eq!(h.chain.registration_count(), 1);
    assert_eq!(h.courier.delivery_count_for(key(0x22)), 1);
    assert_eq!(h.journal.pending_count(), 0);

    h.porter.stop().await.unwrap();

    // Property 3 / 4: a further restart finds nothing pending and adds
    // no imports or confirmations.
    let imports_before = h.archive.total_imports();
    let restarted = restarted_porter(&h);
    restarted.start().await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(h.journal.confirm_calls(), 1);
    assert_eq!(h.archive.total_imports(), imports_before);
    restarted.stop().await.unwrap();
}

// ---------------------------------------------------------------------------
// S6 — courier backoff
// ---------------------------------------------------------------------------

#[tokio::test]
async fn s6_courier_backoff_defers_then_completes() {
    let h = harness();
    h.asset_wallet.set_inputs(vec![vinput(asset_a(), 0x11, 100)]);
    seed_input_proof(&h.archive, asset_a(), 0x11);
    h.courier
        .fail_next(key(0x22), CourierError::Backoff { retry_after: None });
    h.porter.start().await.unwrap();

    let outbound = h
        .porter
        .request_shipment(address_parcel(vec![dest(0x22, 100)]))
        .await
        .unwrap();
    let txid = outbound.anchor_txid();
    h.chain.script_confirmation(make_conf(&outbound.anchor_tx, 0x7C));

    // The backoff leaves the parcel pending: delivery was attempted, but
    // no journal confirmation happened.
    wait_until("first delivery attempt", || {
        h.courier.delivery_count_for(key(0x22)) == 1
    })
    .await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(h.journal.confirm_calls(), 0);
    assert_eq!(h.journal.pending_count(), 1);

    // Re-submitting the pending record retries delivery; the courier now
    // succeeds and the parcel completes.
    let pending = h.journal.pending_parcels().await.unwrap();
    assert_eq!(pending.len(), 1);
    let retry = Parcel::Pending(PendingParcel::new(pending[0].clone()));
    let retried = h.porter.request_shipment(retry).await.unwrap();
    assert_eq!(retried.anchor_txid(), txid);

    wait_until("parcel confirmed after retry", || {
        h.journal.confirm_calls() == 1
    })
    .await;
    assert_eq!(h.courier.delivery_count_for(key(0x22)), 2);
    assert_eq!(h.chain.publish_count(txid), 2);
    assert_eq!(h.journal.pending_count(), 0);

    h.porter.stop().await.unwrap();
}

// ---------------------------------------------------------------------------
// Failure surfacing
// ---------------------------------------------------------------------------

#[tokio::test]
async fn insufficient_assets_fails_before_journaling() {
    let mut h = harness();
    h.asset_wallet.set_inputs(vec![vinput(asset_a(), 0x11, 50)]);
    h.porter.start().await.unwrap();

    let err = h
        .porter
        .request_shipment(address_parcel(vec![dest(0x22, 100)]))
        .await
        .unwrap_err();
    assert!(matches!(err, PorterError::CoinSelection(_)));

    // No journal record, nothing broadcast, and the process-wide error
    // channel observed the same failure.
    assert_eq!(h.journal.pending_count(), 0);
    assert!(h.sequence.index_of("publish_transaction").is_none());
    let global = h.err_rx.recv().await.expect("global error");
    assert!(matches!(global, PorterError::CoinSelection(_)));

    h.porter.stop().await.unwrap();
}

#[tokio::test]
async fn fatal_courier_error_reaches_error_channel() {
    let mut h = harness();
    h.asset_wallet.set_inputs(vec![vinput(asset_a(), 0x11, 100)]);
    seed_input_proof(&h.archive, asset_a(), 0x11);
    h.courier
        .fail_next(key(0x22), CourierError::Delivery("receiver unreachable".into()));
    h.porter.start().await.unwrap();

    let outbound = h
        .porter
        .request_shipment(address_parcel(vec![dest(0x22, 100)]))
        .await
        .unwrap();
    h.chain.script_confirmation(make_conf(&outbound.anchor_tx, 0x7D));

    let global = h.err_rx.recv().await.expect("global error");
    assert!(matches!(global, PorterError::CourierFatal(_)));
    // Fatal delivery: the parcel is not confirmed, but its journal entry
    // survives for a later retry.
    assert_eq!(h.journal.confirm_calls(), 0);
    assert_eq!(h.journal.pending_count(), 1);

    h.porter.stop().await.unwrap();
}
