//! Receiver proof delivery: the ReceiverProofTransfer step.
//!
//! Fans deliveries out over the parcel's outputs with bounded
//! concurrency. Local outputs are skipped (their proofs already live in
//! the local archive); a courier backoff leaves the parcel pending for a
//! later resume instead of failing it.

use crate::config::PorterConfig;
use crate::courier::{ProofCourier, Recipient};
use crate::error::PorterError;
use crate::parcel::SendPackage;
use crate::shutdown::ShutdownSignal;
use freight_journal::{ParcelConfirmEvent, TransferOutput, TransferOutputType};
use futures_util::stream::{FuturesUnordered, StreamExt};
use std::collections::HashMap;

/// How a delivery round ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum DeliveryOutcome {
    /// All receiver proofs are delivered and the journal entry is
    /// confirmed.
    Completed,
    /// At least one courier asked for backoff; the parcel stays pending
    /// and the journal entry is untouched.
    Deferred,
}

/// Whether a single delivery succeeded or was deferred by the courier.
enum Attempt {
    Delivered,
    Backoff,
}

pub(crate) async fn transfer_receiver_proofs(
    cfg: &PorterConfig,
    shutdown: &ShutdownSignal,
    pkg: &SendPackage,
) -> Result<DeliveryOutcome, PorterError> {
    let outbound = pkg
        .outbound_pkg
        .as_ref()
        .ok_or_else(|| PorterError::InvalidParcel("no outbound parcel to deliver".into()))?;
    let conf = pkg
        .transfer_conf
        .as_ref()
        .ok_or_else(|| PorterError::InvalidParcel("no confirmation event to record".into()))?;

    let mut deferred = false;
    if let Some(courier) = &cfg.proof_courier {
        let fanout = cfg.settings.courier_fanout.max(1);
        let mut pending = outbound.outputs.iter().filter(|out| needs_delivery(out));

        let mut in_flight = FuturesUnordered::new();
        loop {
            while in_flight.len() < fanout {
                match pending.next() {
                    Some(out) => in_flight.push(deliver_one(courier.as_ref(), pkg, out)?),
                    None => break,
                }
            }
            if in_flight.is_empty() {
                break;
            }

            tokio::select! {
                attempt = in_flight.next() => {
                    match attempt {
                        Some(Ok(Attempt::Delivered)) => {}
                        Some(Ok(Attempt::Backoff)) => deferred = true,
                        Some(Err(e)) => return Err(e),
                        None => break,
                    }
                }
                _ = shutdown.triggered() => return Err(PorterError::ShuttingDown),
            }
        }
    }

    if deferred {
        tracing::info!(
            txid = %outbound.anchor_txid(),
            "courier requested backoff, parcel stays pending"
        );
        return Ok(DeliveryOutcome::Deferred);
    }

    tracing::info!(txid = %outbound.anchor_txid(), "marking parcel as confirmed");

    // Load the updated passive proof files back out of the archive for
    // the confirmation audit trail.
    let mut passive_proof_files = HashMap::with_capacity(outbound.passive_assets.len());
    for passive in &outbound.passive_assets {
        let locator = passive.proof_locator();
        let blob = cfg.proof_archive.fetch_proof(&locator).await?;
        passive_proof_files.insert(locator.hash(), blob);
    }

    // Journal confirmation runs under the blocking flavour: once started
    // it is never raced against shutdown.
    cfg.export_log
        .confirm_parcel_delivery(&ParcelConfirmEvent {
            anchor_txid: outbound.anchor_txid(),
            block_hash: conf.block_hash,
            block_height: conf.block_height,
            tx_index: conf.tx_index,
            final_proofs: pkg.final_proofs.clone(),
            passive_proof_files,
        })
        .await?;

    Ok(DeliveryOutcome::Completed)
}

/// Local outputs already hold their proof in the local archive, and
/// passive-only outputs carry no transferred assets; neither goes
/// through the courier.
fn needs_delivery(out: &TransferOutput) -> bool {
    if out.output_type == TransferOutputType::PassiveOnly {
        return false;
    }
    !(out.script_key.is_fully_described() && out.script_key_local)
}

/// Build the delivery future for one output. Fails fast (before any
/// network traffic) when the sealed proof is missing.
fn deliver_one<'a>(
    courier: &'a dyn ProofCourier,
    pkg: &'a SendPackage,
    out: &'a TransferOutput,
) -> Result<impl std::future::Future<Output = Result<Attempt, PorterError>> + 'a, PorterError> {
    let serialized = out.script_key.serialized();
    let proof = pkg
        .final_proofs
        .get(&serialized)
        .ok_or(PorterError::MissingProof(serialized))?;

    let recipient = Recipient {
        script_key: out.script_key.pub_key,
        asset_id: proof.locator.asset_id,
        amount: out.amount,
    };

    Ok(async move {
        tracing::debug!(script_key = %recipient.script_key, "delivering receiver proof");
        match courier.deliver_proof(recipient, proof).await {
            Ok(()) => Ok(Attempt::Delivered),
            Err(err) if err.is_backoff() => Ok(Attempt::Backoff),
            Err(err) => Err(PorterError::from_courier(err)),
        }
    })
}
