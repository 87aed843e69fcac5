//! Subscriber event ordering and graceful shutdown behaviour.

mod common;

use common::{
    address_parcel, asset_a, dest, harness, key, make_conf, restarted_porter, seed_input_proof,
    vinput, wait_until,
};
use freight_porter::{EventReceiver, PorterError, PorterEvent, SendState};

/// Properties 1 & 9: subscribers observe the exact monotonic state
/// sequence the parcel executed, and courier-originated events reach the
/// same audience.
#[tokio::test]
async fn subscribers_observe_monotonic_state_sequence() {
    let h = harness();
    h.asset_wallet.set_inputs(vec![vinput(asset_a(), 0x11, 100)]);
    seed_input_proof(&h.archive, asset_a(), 0x11);

    let mut receiver = EventReceiver::new();
    h.porter.register_subscriber(&receiver, false, false).unwrap();
    h.porter.start().await.unwrap();

    let outbound = h
        .porter
        .request_shipment(address_parcel(vec![dest(0x22, 100)]))
        .await
        .unwrap();
    h.chain.script_confirmation(make_conf(&outbound.anchor_tx, 0x60));
    wait_until("parcel confirmed", || h.journal.confirm_calls() == 1).await;

    let mut states = Vec::new();
    let mut deliveries = Vec::new();
    while let Some(event) = receiver.try_recv() {
        match event {
            PorterEvent::SendState(e) => states.push(e.state),
            PorterEvent::ProofDelivery(e) => deliveries.push(e.script_key),
        }
    }

    assert_eq!(
        states,
        vec![
            SendState::VirtualCommitmentSelect,
            SendState::VirtualSign,
            SendState::AnchorSign,
            SendState::LogCommit,
            SendState::Broadcast,
            SendState::WaitTxConf,
            SendState::StoreProofs,
            SendState::ReceiverProofTransfer,
        ]
    );
    for pair in states.windows(2) {
        assert!(pair[0] < pair[1], "state events must be strictly increasing");
    }

    // The nullable courier reports deliveries through the subscriber
    // sink the engine handed it.
    assert_eq!(deliveries, vec![key(0x22).serialized()]);

    h.porter.stop().await.unwrap();
}

#[tokio::test]
async fn removed_subscribers_stop_receiving() {
    let h = harness();
    let mut receiver = EventReceiver::new();
    h.porter.register_subscriber(&receiver, false, false).unwrap();
    h.porter.remove_subscriber(&receiver).unwrap();

    h.asset_wallet.set_inputs(vec![vinput(asset_a(), 0x11, 100)]);
    seed_input_proof(&h.archive, asset_a(), 0x11);
    h.porter.start().await.unwrap();

    let outbound = h
        .porter
        .request_shipment(address_parcel(vec![dest(0x22, 100)]))
        .await
        .unwrap();
    h.chain.script_confirmation(make_conf(&outbound.anchor_tx, 0x61));
    wait_until("parcel confirmed", || h.journal.confirm_calls() == 1).await;

    assert!(receiver.try_recv().is_none());
    // Removing again reports the unknown subscription.
    assert!(h.porter.remove_subscriber(&receiver).is_err());

    h.porter.stop().await.unwrap();
}

#[tokio::test]
async fn request_after_stop_is_rejected() {
    let h = harness();
    h.porter.start().await.unwrap();
    h.porter.stop().await.unwrap();

    let err = h
        .porter
        .request_shipment(address_parcel(vec![dest(0x22, 1)]))
        .await
        .unwrap_err();
    assert!(matches!(err, PorterError::ShuttingDown));
}

#[tokio::test]
async fn start_and_stop_are_idempotent() {
    let h = harness();
    h.porter.start().await.unwrap();
    h.porter.start().await.unwrap();

    // The journal was only scanned once for pending parcels.
    let scans = h
        .sequence
        .calls()
        .iter()
        .filter(|c| *c == "pending_parcels")
        .count();
    assert_eq!(scans, 1);

    h.porter.stop().await.unwrap();
    h.porter.stop().await.unwrap();
}

/// Shutdown mid-confirmation leaves the journaled parcel pending; a
/// restarted engine picks it up and completes it.
#[tokio::test]
async fn shutdown_during_confirmation_wait_preserves_pending_parcel() {
    let h = harness();
    h.asset_wallet.set_inputs(vec![vinput(asset_a(), 0x11, 100)]);
    seed_input_proof(&h.archive, asset_a(), 0x11);
    h.porter.start().await.unwrap();

    // No confirmation is scripted: the driver parks in the wait state.
    let outbound = h
        .porter
        .request_shipment(address_parcel(vec![dest(0x22, 100)]))
        .await
        .unwrap();
    let txid = outbound.anchor_txid();
    wait_until("confirmation registered", || h.chain.registration_count() == 1).await;

    h.porter.stop().await.unwrap();
    assert_eq!(h.journal.pending_count(), 1);
    assert_eq!(h.journal.confirm_calls(), 0);

    // Restart: the pending parcel re-enters at broadcast and completes
    // once the chain confirms.
    let restarted = restarted_porter(&h);
    h.chain.script_confirmation(make_conf(&outbound.anchor_tx, 0x62));
    restarted.start().await.unwrap();
    wait_until("parcel confirmed after restart", || {
        h.journal.confirm_calls() == 1
    })
    .await;

    assert_eq!(h.chain.publish_count(txid), 2);
    assert_eq!(h.journal.pending_count(), 0);
    restarted.stop().await.unwrap();
}

/// A failed parcel does not wedge the intake task: the next request goes
/// through normally.
#[tokio::test]
async fn failed_parcel_does_not_block_later_requests() {
    let h = harness();
    h.porter.start().await.unwrap();

    // No inputs scripted: the first request dies in coin selection.
    let first = h.porter.request_shipment(address_parcel(vec![dest(0x22, 1)])).await;
    assert!(matches!(first, Err(PorterError::CoinSelection(_))));

    h.asset_wallet.set_inputs(vec![vinput(asset_a(), 0x11, 1)]);
    seed_input_proof(&h.archive, asset_a(), 0x11);
    let outbound = h
        .porter
        .request_shipment(address_parcel(vec![dest(0x22, 1)]))
        .await
        .unwrap();
    h.chain.script_confirmation(make_conf(&outbound.anchor_tx, 0x63));
    wait_until("parcel confirmed", || h.journal.confirm_calls() == 1).await;

    h.porter.stop().await.unwrap();
}
