//! Proof sealing: the StoreProofs step.
//!
//! Once the anchor transaction confirms, every proof touched by the
//! transfer is stamped with the confirmation and re-imported into the
//! archive: passive assets first, then the active outputs. Archive
//! imports are idempotent, so a resumed parcel can safely re-run this
//! step over partially imported state.

use crate::chain::ChainHeaderVerifier;
use crate::config::PorterConfig;
use crate::error::PorterError;
use crate::parcel::SendPackage;
use freight_journal::{PassiveAssetRecord, TransferInput, TransferOutputType};
use freight_proof::{AnnotatedProof, Locator, ProofArchive, ProofFile, TransitionProof};
use freight_types::TxConfirmation;

/// Seal and import all proof files for a confirmed transfer. On success
/// the package's `final_proofs` map holds one sealed proof per active
/// output, keyed by serialized receiver script key.
pub(crate) async fn store_proofs(
    cfg: &PorterConfig,
    pkg: &mut SendPackage,
) -> Result<(), PorterError> {
    let outbound = pkg
        .outbound_pkg
        .as_ref()
        .ok_or_else(|| PorterError::InvalidParcel("no outbound parcel to seal".into()))?;
    let conf = pkg
        .transfer_conf
        .as_ref()
        .ok_or_else(|| PorterError::InvalidParcel("no confirmation event to seal with".into()))?;

    let verifier = ChainHeaderVerifier::new(cfg.chain_bridge.clone());

    // Passive assets are sealed before active outputs, in one batch.
    let mut passive_proofs = Vec::with_capacity(outbound.passive_assets.len());
    for passive in &outbound.passive_assets {
        let annotated =
            update_passive_proof_file(cfg.proof_archive.as_ref(), passive, conf).await?;
        passive_proofs.push(annotated);
    }

    tracing::info!(
        count = passive_proofs.len(),
        "importing passive asset proofs into archive"
    );
    cfg.proof_archive
        .import_proofs(&verifier, &passive_proofs)
        .await?;

    // A parcel with no active inputs only re-anchors passive assets; it
    // gets no output proofs.
    if !outbound.has_active_transfers() {
        tracing::debug!("no active transfers, skipping output proofs");
        return Ok(());
    }

    pkg.final_proofs.clear();
    let first_input = &outbound.inputs[0];
    for (idx, out) in outbound.outputs.iter().enumerate() {
        if out.output_type == TransferOutputType::PassiveOnly {
            continue;
        }

        let mut suffix = TransitionProof::decode(&out.proof_suffix)?;
        suffix.stamp(conf)?;

        // The parcel's extra inputs (a merge) ride along on the suffix as
        // full proof files.
        for input in &outbound.inputs[1..] {
            let additional = fetch_input_proof(cfg.proof_archive.as_ref(), input).await?;
            suffix.additional_inputs.push(additional);
        }

        let mut output_file = fetch_input_proof(cfg.proof_archive.as_ref(), first_input).await?;
        output_file.append(suffix)?;

        let locator = Locator::new(first_input.asset_id, out.script_key.serialized());
        let annotated = AnnotatedProof::new(locator, output_file.encode()?);
        pkg.final_proofs
            .insert(out.script_key.serialized(), annotated.clone());

        tracing::info!(output = idx, "importing output proof into archive");
        cfg.proof_archive
            .import_proofs(&verifier, &[annotated])
            .await?;

        tracing::debug!(
            output = idx,
            proofs = output_file.num_proofs(),
            "sealed output proof file"
        );
    }

    Ok(())
}

/// Fetch and decode the current proof file for a transfer input.
async fn fetch_input_proof(
    archive: &dyn ProofArchive,
    input: &TransferInput,
) -> Result<ProofFile, PorterError> {
    let blob = archive.fetch_proof(&input.proof_locator()).await?;
    Ok(ProofFile::decode(&blob)?)
}

/// Fetch a passive asset's proof file, stamp its new transition proof
/// with the confirmation, and append it.
async fn update_passive_proof_file(
    archive: &dyn ProofArchive,
    passive: &PassiveAssetRecord,
    conf: &TxConfirmation,
) -> Result<AnnotatedProof, PorterError> {
    let locator = passive.proof_locator();
    let blob = archive.fetch_proof(&locator).await?;
    let mut file = ProofFile::decode(&blob)?;

    let mut new_proof = TransitionProof::decode(&passive.new_proof)?;
    new_proof.stamp(conf)?;

    // A resumed parcel re-seals after a crash; the file may already carry
    // this transition. The file is updated exactly once per anchor
    // confirmation.
    if file.last_proof() != Some(&new_proof) {
        file.append(new_proof)?;
    }

    Ok(AnnotatedProof::new(locator, file.encode()?))
}
