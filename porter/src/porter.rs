//! The porter: orchestrator and state machine driver.
//!
//! The porter accepts transfer requests (parcels) and drives each one
//! through a linear, durable state machine: coin selection, asset-layer
//! signing, wallet anchoring, journaling, broadcast, confirmation wait,
//! proof sealing, and receiver proof delivery. Journaled parcels survive
//! a crash and are resumed at the broadcast state on the next start.

use crate::config::PorterConfig;
use crate::dispatch::{self, DeliveryOutcome};
use crate::error::PorterError;
use crate::events::{EventReceiver, ExecuteSendStateEvent, ObserverSink, PorterEvent};
use crate::parcel::{Parcel, PendingParcel, SendPackage, SendState};
use crate::sealer;
use crate::shutdown::ShutdownSignal;
use crate::wallet::WalletError;
use freight_journal::OutboundParcel;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::timeout;

struct PorterInner {
    cfg: PorterConfig,
    /// Subscriber endpoints keyed by subscription id. Guarded by a plain
    /// mutex: publication only clones senders, it never awaits.
    subscribers: StdMutex<HashMap<u64, mpsc::UnboundedSender<PorterEvent>>>,
    shutdown: ShutdownSignal,
    started: AtomicBool,
    intake_tx: mpsc::Sender<Parcel>,
    intake_rx: StdMutex<Option<mpsc::Receiver<Parcel>>>,
    tasks: StdMutex<Vec<JoinHandle<()>>>,
}

/// The asset transfer engine. Cheap to clone; all clones share one
/// engine instance.
#[derive(Clone)]
pub struct Porter {
    inner: Arc<PorterInner>,
}

impl Porter {
    pub fn new(cfg: PorterConfig) -> Self {
        let (intake_tx, intake_rx) = mpsc::channel(cfg.settings.intake_capacity.max(1));
        Self {
            inner: Arc::new(PorterInner {
                cfg,
                subscribers: StdMutex::new(HashMap::new()),
                shutdown: ShutdownSignal::new(),
                started: AtomicBool::new(false),
                intake_tx,
                intake_rx: StdMutex::new(Some(intake_rx)),
                tasks: StdMutex::new(Vec::new()),
            }),
        }
    }

    /// Start the porter: resume journaled parcels and begin accepting
    /// requests. Idempotent.
    pub async fn start(&self) -> Result<(), PorterError> {
        if self.inner.started.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        tracing::info!("starting porter");

        let pending = self
            .quit_or(self.inner.cfg.export_log.pending_parcels())
            .await??;

        tracing::info!(count = pending.len(), "resuming delivery of pending parcels");

        for outbound in pending {
            let porter = self.clone();
            let handle = tokio::spawn(async move {
                porter.resume_pending_parcel(outbound).await;
            });
            self.track(handle);
        }

        let porter = self.clone();
        let handle = tokio::spawn(async move {
            porter.intake_loop().await;
        });
        self.track(handle);

        Ok(())
    }

    /// Stop the porter: signal quit, wait for all driver tasks, drop all
    /// subscribers. Idempotent.
    pub async fn stop(&self) -> Result<(), PorterError> {
        tracing::info!("stopping porter");
        self.inner.shutdown.trigger();

        let handles: Vec<_> = {
            let mut tasks = self.inner.tasks.lock().expect("tasks lock");
            tasks.drain(..).collect()
        };
        for handle in handles {
            let _ = handle.await;
        }

        {
            let mut subs = self.inner.subscribers.lock().expect("subscribers lock");
            subs.clear();
            self.sync_courier_subscribers(&subs);
        }

        Ok(())
    }

    /// Submit a parcel and wait for either the broadcast acknowledgement
    /// (returning the journaled outbound parcel), the first error, or
    /// engine shutdown.
    pub async fn request_shipment(
        &self,
        mut parcel: Parcel,
    ) -> Result<OutboundParcel, PorterError> {
        let waiter = parcel
            .kit_mut()
            .take_waiter()
            .ok_or_else(|| PorterError::InvalidParcel("parcel kit already consumed".into()))?;

        tokio::select! {
            sent = self.inner.intake_tx.send(parcel) => {
                sent.map_err(|_| PorterError::ShuttingDown)?;
            }
            _ = self.inner.shutdown.triggered() => return Err(PorterError::ShuttingDown),
        }

        enum First {
            Resp(Result<OutboundParcel, oneshot::error::RecvError>),
            Failed(Result<PorterError, oneshot::error::RecvError>),
            Quit,
        }

        let mut resp_rx = waiter.resp_rx;
        let mut err_rx = waiter.err_rx;
        let first = tokio::select! {
            resp = &mut resp_rx => First::Resp(resp),
            err = &mut err_rx => First::Failed(err),
            _ = self.inner.shutdown.triggered() => First::Quit,
        };

        match first {
            First::Resp(Ok(outbound)) => Ok(outbound),
            // The driver dropped the kit without answering; the other
            // channel may still hold the actual outcome.
            First::Resp(Err(_)) => match err_rx.await {
                Ok(err) => Err(err),
                Err(_) => Err(PorterError::ShuttingDown),
            },
            First::Failed(Ok(err)) => Err(err),
            First::Failed(Err(_)) => match resp_rx.await {
                Ok(outbound) => Ok(outbound),
                Err(_) => Err(PorterError::ShuttingDown),
            },
            First::Quit => Err(PorterError::ShuttingDown),
        }
    }

    // ── Subscribers ────────────────────────────────────────────────────

    /// Add a subscriber that will be notified of all future events.
    ///
    /// TODO: support replaying existing events to new subscribers via
    /// `deliver_existing` / `deliver_from`; only live delivery is wired
    /// up today.
    pub fn register_subscriber(
        &self,
        receiver: &EventReceiver,
        _deliver_existing: bool,
        _deliver_from: bool,
    ) -> Result<(), PorterError> {
        let mut subs = self.inner.subscribers.lock().expect("subscribers lock");
        subs.insert(receiver.id(), receiver.sender());
        self.sync_courier_subscribers(&subs);
        Ok(())
    }

    /// Remove a previously registered subscriber.
    pub fn remove_subscriber(&self, receiver: &EventReceiver) -> Result<(), PorterError> {
        let mut subs = self.inner.subscribers.lock().expect("subscribers lock");
        if subs.remove(&receiver.id()).is_none() {
            return Err(PorterError::Config(format!(
                "subscriber with id {} not found",
                receiver.id()
            )));
        }
        self.sync_courier_subscribers(&subs);
        Ok(())
    }

    /// Hand the courier a fresh snapshot of the subscriber set so
    /// courier-originated events reach the same audience.
    fn sync_courier_subscribers(
        &self,
        subs: &HashMap<u64, mpsc::UnboundedSender<PorterEvent>>,
    ) {
        if let Some(courier) = &self.inner.cfg.proof_courier {
            courier.set_subscribers(ObserverSink::new(subs.values().cloned().collect()));
        }
    }

    fn publish_event(&self, event: PorterEvent) {
        let subs = self.inner.subscribers.lock().expect("subscribers lock");
        for sender in subs.values() {
            let _ = sender.send(event.clone());
        }
    }

    // ── Request intake ─────────────────────────────────────────────────

    /// The single cooperative intake task: handles each request up to the
    /// point where the caller has a response, then hands the rest of the
    /// pipeline to a dedicated task.
    async fn intake_loop(&self) {
        let mut rx = {
            let mut slot = self.inner.intake_rx.lock().expect("intake lock");
            match slot.take() {
                Some(rx) => rx,
                None => return,
            }
        };
        let mut quit = self.inner.shutdown.subscribe();

        loop {
            tokio::select! {
                biased;
                _ = quit.recv() => {
                    tracing::info!("request intake shutting down");
                    return;
                }
                parcel = rx.recv() => {
                    let Some(parcel) = parcel else { return };
                    self.drive_parcel(parcel).await;
                }
            }
        }
    }

    /// Drive a fresh parcel inline until the broadcast response is out,
    /// then continue confirmation, sealing, and delivery on its own task.
    async fn drive_parcel(&self, parcel: Parcel) {
        let mut pkg = SendPackage::new(parcel);

        if let Err(err) = self
            .advance_state(&mut pkg, Some(SendState::WaitTxConf))
            .await
        {
            pkg.deliver_error(err);
            return;
        }

        if pkg.state.is_terminal() || self.inner.shutdown.is_triggered() {
            return;
        }

        let porter = self.clone();
        let handle = tokio::spawn(async move {
            let mut pkg = pkg;
            if let Err(err) = porter.advance_state(&mut pkg, None).await {
                pkg.deliver_error(err);
            }
        });
        self.track(handle);
    }

    /// Resume a journaled parcel at the broadcast state.
    async fn resume_pending_parcel(&self, outbound: OutboundParcel) {
        tracing::info!(
            anchor_txid = %outbound.anchor_txid(),
            "attempting to resume delivery"
        );

        let mut pkg = SendPackage::new(Parcel::Pending(PendingParcel::new(outbound)));
        if let Err(err) = self.advance_state(&mut pkg, None).await {
            tracing::warn!(error = %err, "unable to advance resumed parcel");
        }
    }

    // ── State machine driver ───────────────────────────────────────────

    /// Advance the package until `Complete`, an error, shutdown, or a
    /// deferral (a step that could not advance, e.g. courier backoff). A
    /// deferred parcel keeps its journal entry and is retried on resume.
    ///
    /// With `stop_before` set, the drive pauses once that state is
    /// reached without executing it.
    async fn advance_state(
        &self,
        pkg: &mut SendPackage,
        stop_before: Option<SendState>,
    ) -> Result<(), PorterError> {
        while !pkg.state.is_terminal() {
            if let Some(stop) = stop_before {
                if pkg.state >= stop {
                    return Ok(());
                }
            }
            if self.inner.shutdown.is_triggered() {
                return Ok(());
            }

            tracing::info!(state = %pkg.state, "porter executing state");
            let before = pkg.state;

            match self.state_step(pkg).await {
                Ok(()) => {
                    // A step that did not advance has deferred the parcel
                    // (backoff, or quit during a long wait).
                    if pkg.state == before {
                        return Ok(());
                    }
                }
                Err(err) => {
                    let _ = self.inner.cfg.err_tx.send(err.clone());
                    tracing::error!(state = %before, error = %err, "error evaluating state");
                    return Err(err);
                }
            }
        }

        tracing::info!(
            in_flight_secs = pkg.created_at.elapsed().as_secs(),
            "parcel complete"
        );
        Ok(())
    }

    /// Execute one state transition.
    async fn state_step(&self, pkg: &mut SendPackage) -> Result<(), PorterError> {
        self.publish_event(PorterEvent::SendState(ExecuteSendStateEvent::new(
            pkg.state,
        )));

        let cfg = &self.inner.cfg;
        match pkg.state {
            // Coin selection: only address parcels enter here.
            SendState::VirtualCommitmentSelect => {
                let destinations = match &pkg.parcel {
                    Parcel::Address(p) => p.destinations.clone(),
                    _ => {
                        return Err(PorterError::InvalidParcel(
                            "only address parcels enter at coin selection".into(),
                        ))
                    }
                };

                let funded = self
                    .quit_or(cfg.asset_wallet.fund_address_send(&destinations))
                    .await?
                    .map_err(|e| PorterError::CoinSelection(e.to_string()))?;

                pkg.virtual_packet = Some(funded.vpacket);
                pkg.input_commitments = funded.input_commitments;
                pkg.state = SendState::VirtualSign;
            }

            // Sign the asset-layer transaction and validate the result.
            SendState::VirtualSign => {
                let mut vpacket = take_vpacket(pkg)?;
                if let Some(recipient) = vpacket.first_recipient() {
                    tracing::info!(
                        receiver = %recipient.script_key.pub_key,
                        "generating witnesses for send"
                    );
                }

                self.quit_or(cfg.asset_wallet.sign_virtual_packet(&mut vpacket))
                    .await?
                    .map_err(|e| PorterError::Signing(e.to_string()))?;
                cfg.tx_validator
                    .validate(&vpacket)
                    .map_err(|e| PorterError::Signing(e.to_string()))?;

                pkg.virtual_packet = Some(vpacket);
                pkg.state = SendState::AnchorSign;
            }

            // Sign passive assets and anchor everything into one funded,
            // signed on-chain transaction.
            SendState::AnchorSign => {
                let fee_rate = self
                    .rpc(cfg.chain_bridge.estimate_fee(cfg.settings.fee_conf_target))
                    .await??;

                let vpacket = take_vpacket(pkg)?;
                let passive_assets = self
                    .quit_or(
                        cfg.asset_wallet
                            .sign_passive_assets(&vpacket, &pkg.input_commitments),
                    )
                    .await?
                    .map_err(|e| PorterError::Signing(e.to_string()))?;

                let anchored = self
                    .quit_or(cfg.asset_wallet.anchor_virtual_transactions(
                        crate::wallet::AnchorTxnsParams {
                            fee_rate,
                            vpackets: vec![vpacket],
                            input_commitments: pkg.input_commitments.clone(),
                            passive_assets,
                        },
                    ))
                    .await?
                    .map_err(|e| PorterError::Signing(e.to_string()))?;

                pkg.virtual_packet = anchored.vpackets.into_iter().next();
                pkg.passive_assets = anchored.passive_assets;
                pkg.anchor_tx = Some(anchored.anchor_tx);
                pkg.state = SendState::LogCommit;
            }

            // Journal the parcel; the point of no return.
            SendState::LogCommit => {
                let height = self.rpc(cfg.chain_bridge.current_height()).await??;

                let mut outbound = pkg.prepare_for_storage(height)?;
                for out in &mut outbound.outputs {
                    if let Some(declared) = &out.script_key.declared {
                        if self.quit_or(cfg.key_ring.is_local_key(&declared.raw_key)).await? {
                            out.script_key_local = true;
                        }
                    }
                }

                tracing::info!("committing pending parcel to disk");

                // Journal writes run under the blocking flavour: the
                // record must be durable before broadcast, so this await
                // is never raced against shutdown.
                cfg.export_log.log_pending_parcel(&outbound).await?;

                pkg.outbound_pkg = Some(outbound);
                pkg.state = SendState::Broadcast;
            }

            // Import own anchor outputs, publish the transaction, and
            // acknowledge the caller.
            SendState::Broadcast => {
                let outbound = pkg.outbound_pkg.clone().ok_or_else(|| {
                    PorterError::InvalidParcel("no outbound parcel to broadcast".into())
                })?;

                self.import_local_outputs(&outbound).await?;

                tracing::info!(
                    txid = %outbound.anchor_txid(),
                    "broadcasting transfer tx"
                );
                self.quit_or(cfg.chain_bridge.publish_transaction(&outbound.anchor_tx))
                    .await?
                    .map_err(PorterError::Chain)?;

                pkg.deliver_broadcast_response();
                pkg.state = SendState::WaitTxConf;
            }

            SendState::WaitTxConf => {
                self.wait_for_transfer_conf(pkg).await?;
            }

            SendState::StoreProofs => {
                sealer::store_proofs(cfg, pkg).await?;
                pkg.state = SendState::ReceiverProofTransfer;
            }

            SendState::ReceiverProofTransfer => {
                let outcome =
                    dispatch::transfer_receiver_proofs(cfg, &self.inner.shutdown, pkg).await?;
                match outcome {
                    DeliveryOutcome::Completed => pkg.state = SendState::Complete,
                    DeliveryOutcome::Deferred => {}
                }
            }

            SendState::Complete => {}
        }

        Ok(())
    }

    /// Subscribe to the first confirmation of the anchor transaction and
    /// block until it arrives.
    ///
    /// On shutdown this returns without advancing: the journaled parcel
    /// is picked up again on the next start. A notification stream that
    /// ends without a confirmation (and without shutdown) is surfaced as
    /// [`PorterError::ConfirmationCancelled`], never silently dropped.
    async fn wait_for_transfer_conf(&self, pkg: &mut SendPackage) -> Result<(), PorterError> {
        let cfg = &self.inner.cfg;
        let outbound = pkg.outbound_pkg.as_ref().ok_or_else(|| {
            PorterError::InvalidParcel("no outbound parcel to watch".into())
        })?;

        let txid = outbound.anchor_txid();
        tracing::info!(%txid, "waiting for confirmation of transfer tx");

        let subscription = self
            .quit_or(cfg.chain_bridge.register_confirmations_ntfn(
                txid,
                outbound.anchor_output_script(),
                1,
                outbound.anchor_height_hint,
                true,
            ))
            .await?
            .map_err(PorterError::Chain)?;

        let mut confirmed = subscription.confirmed;
        let mut errors = subscription.errors;
        let mut errors_open = true;

        loop {
            tokio::select! {
                conf = confirmed.recv() => {
                    return match conf {
                        Some(conf) => {
                            tracing::debug!(
                                block = %conf.block_hash,
                                height = conf.block_height,
                                "got chain confirmation"
                            );
                            pkg.transfer_conf = Some(conf);
                            pkg.state = SendState::StoreProofs;
                            Ok(())
                        }
                        None => Err(PorterError::ConfirmationCancelled),
                    };
                }
                err = errors.recv(), if errors_open => {
                    match err {
                        Some(err) => return Err(PorterError::Chain(err)),
                        // The error channel closing on its own just means
                        // the notifier has nothing to report.
                        None => errors_open = false,
                    }
                }
                _ = self.inner.shutdown.triggered() => {
                    tracing::debug!("skipping tx confirmation, porter exiting");
                    return Ok(());
                }
            }
        }
    }

    /// Import the anchor output keys of local outputs into the wallet so
    /// it watches them for spends. Re-imports on resume are tolerated.
    async fn import_local_outputs(&self, outbound: &OutboundParcel) -> Result<(), PorterError> {
        let cfg = &self.inner.cfg;
        for out in &outbound.outputs {
            if !out.script_key_local {
                continue;
            }

            let vout = out.anchor.outpoint.vout as usize;
            let anchor_output = outbound.anchor_tx.outputs.get(vout).ok_or_else(|| {
                PorterError::InvalidParcel(format!("anchor output {vout} out of range"))
            })?;
            let anchor_key = anchor_output.output_key().ok_or_else(|| {
                PorterError::InvalidParcel(format!("anchor output {vout} has no taproot key"))
            })?;

            match self.quit_or(cfg.wallet.import_taproot_output(anchor_key)).await? {
                Ok(()) => {}
                // On restart the output is already tracked; move along.
                Err(WalletError::AlreadyExists) => {}
                Err(err) => return Err(PorterError::Wallet(err.to_string())),
            }
        }

        Ok(())
    }

    // ── Context helpers ────────────────────────────────────────────────

    /// Run a cancellable operation: resolves to `ShuttingDown` when quit
    /// fires first. Used for every suspension point except journal
    /// writes.
    async fn quit_or<T>(&self, fut: impl Future<Output = T>) -> Result<T, PorterError> {
        tokio::select! {
            out = fut => Ok(out),
            _ = self.inner.shutdown.triggered() => Err(PorterError::ShuttingDown),
        }
    }

    /// Run a lightweight RPC under the default deadline, still honoring
    /// quit.
    async fn rpc<T>(
        &self,
        fut: impl Future<Output = Result<T, crate::chain::ChainError>>,
    ) -> Result<Result<T, PorterError>, PorterError> {
        let deadline = self.inner.cfg.settings.rpc_timeout();
        let out = self.quit_or(timeout(deadline, fut)).await?;
        Ok(match out {
            Ok(res) => res.map_err(PorterError::Chain),
            Err(_) => Err(PorterError::Chain(crate::chain::ChainError::Timeout)),
        })
    }

    fn track(&self, handle: JoinHandle<()>) {
        self.inner.tasks.lock().expect("tasks lock").push(handle);
    }
}

/// Take the package's virtual packet for in-place mutation.
fn take_vpacket(
    pkg: &mut SendPackage,
) -> Result<crate::vpacket::VirtualPacket, PorterError> {
    pkg.virtual_packet
        .take()
        .ok_or_else(|| PorterError::InvalidParcel("package has no virtual packet".into()))
}
