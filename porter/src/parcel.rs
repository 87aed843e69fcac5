//! Transfer requests and the in-memory working record.

use crate::error::PorterError;
use crate::vpacket::{AssetCommitment, PassiveAsset, VirtualPacket};
use freight_journal::{
    OutboundParcel, PassiveAssetRecord, TransferInput, TransferOutput, TransferOutputType,
};
use freight_proof::AnnotatedProof;
use freight_types::{AssetId, PublicKey, SerializedKey};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use tokio::sync::oneshot;

/// The ordered states a send package moves through. States only ever
/// advance; the driver never regresses a package.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum SendState {
    /// Coin-select asset inputs for the requested destinations.
    VirtualCommitmentSelect,
    /// Sign the asset-layer virtual transaction.
    VirtualSign,
    /// Sign passive assets and anchor everything into one on-chain
    /// transaction.
    AnchorSign,
    /// Journal the outbound parcel; the point of no return.
    LogCommit,
    /// Import own anchor outputs and publish the anchor transaction.
    Broadcast,
    /// Wait for the anchor transaction to confirm.
    WaitTxConf,
    /// Seal and import passive and active proof files.
    StoreProofs,
    /// Deliver receiver proofs and mark the parcel confirmed.
    ReceiverProofTransfer,
    /// Terminal.
    Complete,
}

impl SendState {
    /// Whether a journaled parcel in this state can be resumed after a
    /// restart.
    pub fn is_resumable(&self) -> bool {
        matches!(
            self,
            SendState::Broadcast
                | SendState::WaitTxConf
                | SendState::StoreProofs
                | SendState::ReceiverProofTransfer
        )
    }

    pub fn is_terminal(&self) -> bool {
        *self == SendState::Complete
    }
}

impl fmt::Display for SendState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SendState::VirtualCommitmentSelect => "virtual_commitment_select",
            SendState::VirtualSign => "virtual_sign",
            SendState::AnchorSign => "anchor_sign",
            SendState::LogCommit => "log_commit",
            SendState::Broadcast => "broadcast",
            SendState::WaitTxConf => "wait_tx_conf",
            SendState::StoreProofs => "store_proofs",
            SendState::ReceiverProofTransfer => "receiver_proof_transfer",
            SendState::Complete => "complete",
        };
        f.write_str(name)
    }
}

/// One destination of an address parcel: receiver script key, asset id,
/// and amount.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferAddress {
    pub asset_id: AssetId,
    pub script_key: PublicKey,
    pub amount: u64,
}

/// The caller's single-shot response channels for one shipment request.
///
/// The engine owns the sending ends; [`ParcelKit::take_waiter`] hands the
/// receiving ends to the caller awaiting the shipment. Each channel fires
/// at most once.
pub struct ParcelKit {
    resp_tx: Option<oneshot::Sender<OutboundParcel>>,
    err_tx: Option<oneshot::Sender<PorterError>>,
    resp_rx: Option<oneshot::Receiver<OutboundParcel>>,
    err_rx: Option<oneshot::Receiver<PorterError>>,
}

impl ParcelKit {
    pub fn new() -> Self {
        let (resp_tx, resp_rx) = oneshot::channel();
        let (err_tx, err_rx) = oneshot::channel();
        Self {
            resp_tx: Some(resp_tx),
            err_tx: Some(err_tx),
            resp_rx: Some(resp_rx),
            err_rx: Some(err_rx),
        }
    }

    /// Take the caller side of the kit. Returns `None` if already taken.
    pub(crate) fn take_waiter(&mut self) -> Option<ParcelWaiter> {
        let resp_rx = self.resp_rx.take()?;
        let err_rx = self.err_rx.take()?;
        Some(ParcelWaiter { resp_rx, err_rx })
    }

    /// Deliver the broadcast response. Subsequent calls are no-ops, so a
    /// resumed parcel that re-broadcasts does not fire twice.
    pub(crate) fn deliver_response(&mut self, parcel: OutboundParcel) {
        if let Some(tx) = self.resp_tx.take() {
            let _ = tx.send(parcel);
        }
    }

    /// Deliver a failure to the caller, if one is still waiting.
    pub(crate) fn deliver_error(&mut self, err: PorterError) {
        if let Some(tx) = self.err_tx.take() {
            let _ = tx.send(err);
        }
    }
}

impl Default for ParcelKit {
    fn default() -> Self {
        Self::new()
    }
}

/// The receiving ends awaited by `request_shipment`.
pub(crate) struct ParcelWaiter {
    pub(crate) resp_rx: oneshot::Receiver<OutboundParcel>,
    pub(crate) err_rx: oneshot::Receiver<PorterError>,
}

/// A transfer to one or more destination addresses.
pub struct AddressParcel {
    pub kit: ParcelKit,
    pub destinations: Vec<TransferAddress>,
}

impl AddressParcel {
    pub fn new(destinations: Vec<TransferAddress>) -> Self {
        Self {
            kit: ParcelKit::new(),
            destinations,
        }
    }
}

/// A partially prepared package re-entering the machine (administrative
/// flows): the virtual packet is already funded and signed.
pub struct PreSignedParcel {
    pub kit: ParcelKit,
    pub vpacket: VirtualPacket,
    pub input_commitments: Vec<AssetCommitment>,
}

impl PreSignedParcel {
    pub fn new(vpacket: VirtualPacket, input_commitments: Vec<AssetCommitment>) -> Self {
        Self {
            kit: ParcelKit::new(),
            vpacket,
            input_commitments,
        }
    }
}

/// A journaled parcel loaded at startup (or re-submitted for retry); the
/// anchor transaction may already have been broadcast.
pub struct PendingParcel {
    pub kit: ParcelKit,
    pub outbound: OutboundParcel,
}

impl PendingParcel {
    pub fn new(outbound: OutboundParcel) -> Self {
        Self {
            kit: ParcelKit::new(),
            outbound,
        }
    }
}

/// An abstract transfer intent submitted to the porter.
pub enum Parcel {
    Address(AddressParcel),
    PreSigned(PreSignedParcel),
    Pending(PendingParcel),
}

impl Parcel {
    pub(crate) fn kit_mut(&mut self) -> &mut ParcelKit {
        match self {
            Parcel::Address(p) => &mut p.kit,
            Parcel::PreSigned(p) => &mut p.kit,
            Parcel::Pending(p) => &mut p.kit,
        }
    }

    /// The state this parcel enters the machine at.
    pub fn entry_state(&self) -> SendState {
        match self {
            Parcel::Address(_) => SendState::VirtualCommitmentSelect,
            Parcel::PreSigned(_) => SendState::AnchorSign,
            Parcel::Pending(_) => SendState::Broadcast,
        }
    }
}

/// The in-memory working record carried through the state machine for one
/// transfer. Ownership moves along the pipeline with the package; there is
/// no per-parcel locking.
pub struct SendPackage {
    pub state: SendState,
    /// When this package entered the machine; completion logging reports
    /// the time spent in flight.
    pub created_at: freight_types::Timestamp,
    /// The originating request.
    pub parcel: Parcel,
    /// The asset-layer transaction being built.
    pub virtual_packet: Option<VirtualPacket>,
    /// The asset commitments consumed as inputs.
    pub input_commitments: Vec<AssetCommitment>,
    /// Colocated assets that must be re-anchored unchanged.
    pub passive_assets: Vec<PassiveAsset>,
    /// The fully signed on-chain anchor transaction.
    pub anchor_tx: Option<freight_types::Transaction>,
    /// The persisted representation, once journaled (or loaded).
    pub outbound_pkg: Option<OutboundParcel>,
    /// The confirmation event, once observed.
    pub transfer_conf: Option<freight_types::TxConfirmation>,
    /// Sealed output proofs, keyed by serialized receiver script key.
    pub final_proofs: HashMap<SerializedKey, AnnotatedProof>,
}

impl SendPackage {
    pub fn new(parcel: Parcel) -> Self {
        let state = parcel.entry_state();
        let (virtual_packet, input_commitments, outbound_pkg) = match &parcel {
            Parcel::Address(_) => (None, Vec::new(), None),
            Parcel::PreSigned(p) => (
                Some(p.vpacket.clone()),
                p.input_commitments.clone(),
                None,
            ),
            Parcel::Pending(p) => (None, Vec::new(), Some(p.outbound.clone())),
        };

        Self {
            state,
            created_at: freight_types::Timestamp::now(),
            parcel,
            virtual_packet,
            input_commitments,
            passive_assets: Vec::new(),
            anchor_tx: None,
            outbound_pkg,
            transfer_conf: None,
            final_proofs: HashMap::new(),
        }
    }

    /// Build the journaled record from the anchored virtual packet.
    pub(crate) fn prepare_for_storage(
        &self,
        height_hint: u32,
    ) -> Result<OutboundParcel, PorterError> {
        let vpacket = self
            .virtual_packet
            .as_ref()
            .ok_or_else(|| PorterError::InvalidParcel("no virtual packet to store".into()))?;
        let anchor_tx = self
            .anchor_tx
            .clone()
            .ok_or_else(|| PorterError::InvalidParcel("no anchor transaction to store".into()))?;

        let inputs = vpacket
            .inputs
            .iter()
            .map(|input| TransferInput {
                asset_id: input.asset_id,
                script_key: input.script_key.serialized(),
                outpoint: input.outpoint,
                amount: input.amount,
            })
            .collect();

        let outputs = vpacket
            .outputs
            .iter()
            .map(|out| {
                let anchor = out.anchor.ok_or_else(|| {
                    PorterError::InvalidParcel("virtual output missing anchor info".into())
                })?;
                let proof_suffix = match out.output_type {
                    // Passive-only outputs get no explicit output proof;
                    // their assets are covered by the passive records.
                    TransferOutputType::PassiveOnly => {
                        out.proof_suffix.clone().unwrap_or_default()
                    }
                    _ => out.proof_suffix.clone().ok_or_else(|| {
                        PorterError::InvalidParcel("virtual output missing proof suffix".into())
                    })?,
                };

                Ok(TransferOutput {
                    output_type: out.output_type,
                    amount: out.amount,
                    script_key: out.script_key.clone(),
                    script_key_local: false,
                    anchor,
                    proof_suffix,
                })
            })
            .collect::<Result<Vec<_>, PorterError>>()?;

        let passive_assets = self
            .passive_assets
            .iter()
            .map(|passive| {
                let new_proof = passive.new_proof.clone().ok_or_else(|| {
                    PorterError::InvalidParcel("passive asset missing its new proof".into())
                })?;
                Ok(PassiveAssetRecord {
                    genesis_id: passive.genesis_id,
                    script_key: passive.script_key.serialized(),
                    new_proof,
                })
            })
            .collect::<Result<Vec<_>, PorterError>>()?;

        Ok(OutboundParcel {
            anchor_tx,
            anchor_height_hint: height_hint,
            inputs,
            outputs,
            passive_assets,
        })
    }

    /// Deliver the broadcast acknowledgement to a waiting caller.
    pub(crate) fn deliver_broadcast_response(&mut self) {
        let Some(outbound) = self.outbound_pkg.clone() else {
            return;
        };
        self.parcel.kit_mut().deliver_response(outbound);
    }

    /// Deliver a failure to a waiting caller.
    pub(crate) fn deliver_error(&mut self, err: PorterError) {
        self.parcel.kit_mut().deliver_error(err);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vpacket::{VirtualInput, VirtualOutput};
    use freight_journal::AnchorInfo;
    use freight_types::{OutPoint, ScriptKey, Transaction, TxIn, TxOut, Txid};

    fn key(n: u8) -> PublicKey {
        PublicKey::new([n; 33])
    }

    fn anchored_vpacket() -> (VirtualPacket, Transaction) {
        let anchor_tx = Transaction::new(
            vec![TxIn::new(OutPoint::new(Txid::new([7; 32]), 0))],
            vec![TxOut::new(330, vec![9; 33])],
        );
        let anchor = AnchorInfo {
            outpoint: OutPoint::new(anchor_tx.txid(), 0),
            value: 330,
        };
        let packet = VirtualPacket {
            inputs: vec![VirtualInput {
                asset_id: AssetId::new([1; 32]),
                script_key: ScriptKey::bare(key(1)),
                outpoint: OutPoint::new(Txid::new([2; 32]), 0),
                amount: 100,
                witness: vec![vec![0xAA]],
            }],
            outputs: vec![VirtualOutput {
                output_type: TransferOutputType::Commitment,
                amount: 100,
                script_key: ScriptKey::bare(key(2)),
                anchor: Some(anchor),
                proof_suffix: Some(vec![1, 2, 3]),
            }],
        };
        (packet, anchor_tx)
    }

    #[test]
    fn states_are_strictly_ordered() {
        let states = [
            SendState::VirtualCommitmentSelect,
            SendState::VirtualSign,
            SendState::AnchorSign,
            SendState::LogCommit,
            SendState::Broadcast,
            SendState::WaitTxConf,
            SendState::StoreProofs,
            SendState::ReceiverProofTransfer,
            SendState::Complete,
        ];
        for pair in states.windows(2) {
            assert!(pair[0] < pair[1]);
        }
    }

    #[test]
    fn resumable_states_match_pending_set() {
        assert!(SendState::Broadcast.is_resumable());
        assert!(SendState::ReceiverProofTransfer.is_resumable());
        assert!(!SendState::LogCommit.is_resumable());
        assert!(!SendState::Complete.is_resumable());
    }

    #[test]
    fn entry_state_follows_parcel_variant() {
        let address = Parcel::Address(AddressParcel::new(vec![]));
        assert_eq!(address.entry_state(), SendState::VirtualCommitmentSelect);

        let pre_signed =
            Parcel::PreSigned(PreSignedParcel::new(VirtualPacket::default(), vec![]));
        assert_eq!(pre_signed.entry_state(), SendState::AnchorSign);
    }

    #[test]
    fn kit_channels_fire_once() {
        let (packet, anchor_tx) = anchored_vpacket();
        let mut parcel = Parcel::PreSigned(PreSignedParcel::new(packet, vec![]));
        let waiter = parcel.kit_mut().take_waiter().unwrap();
        assert!(parcel.kit_mut().take_waiter().is_none());

        let mut pkg = SendPackage::new(parcel);
        pkg.anchor_tx = Some(anchor_tx);
        pkg.outbound_pkg = Some(pkg.prepare_for_storage(50).unwrap());

        pkg.deliver_broadcast_response();
        // A second delivery is a no-op rather than a panic or double-send.
        pkg.deliver_broadcast_response();

        let got = waiter.resp_rx.blocking_recv().unwrap();
        assert_eq!(got.anchor_height_hint, 50);
    }

    #[test]
    fn prepare_for_storage_requires_anchor_info() {
        let (mut packet, anchor_tx) = anchored_vpacket();
        packet.outputs[0].anchor = None;

        let mut pkg = SendPackage::new(Parcel::PreSigned(PreSignedParcel::new(packet, vec![])));
        pkg.anchor_tx = Some(anchor_tx);
        assert!(matches!(
            pkg.prepare_for_storage(10),
            Err(PorterError::InvalidParcel(_))
        ));
    }

    #[test]
    fn prepare_for_storage_maps_inputs_and_outputs() {
        let (packet, anchor_tx) = anchored_vpacket();
        let mut pkg = SendPackage::new(Parcel::PreSigned(PreSignedParcel::new(packet, vec![])));
        pkg.anchor_tx = Some(anchor_tx);

        let outbound = pkg.prepare_for_storage(42).unwrap();
        assert_eq!(outbound.anchor_height_hint, 42);
        assert_eq!(outbound.inputs.len(), 1);
        assert_eq!(outbound.outputs.len(), 1);
        assert_eq!(outbound.inputs[0].amount, 100);
        assert!(!outbound.outputs[0].script_key_local);
        assert_eq!(outbound.outputs[0].proof_suffix, vec![1, 2, 3]);
    }
}
