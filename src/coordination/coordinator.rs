//! Execution coordinator: submission, origin receipt, message tracking
//!
//! Drives one attempt at a time. `execute` submits the origin call and
//! applies the origin-receipt rules of the attempt's transaction type;
//! `run` consumes delivery confirmations from the trackers and applies the
//! destination rules.

use super::tracker::{DeliveryEvent, TrackerSet};
use super::{NotificationLevel, Notifier};
use crate::chain::{reader_for, Readers};
use crate::delivery::{Oracles, TrackedMessage};
use crate::error::{OrchestratorError, OrchestratorResult};
use crate::events::{extract_message_ids, OutboundMessage};
use crate::state::{ProgressStore, StepId, StepStatus, StepUpdate};
use crate::transaction::{RawCall, TransactionType};
use crate::tx::{receipt_succeeded, WalletSession};

use ethers::types::{TransactionReceipt, H256};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::time::interval;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Which tracked leg a message id belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Leg {
    Bridge,
    Swap,
}

struct ActiveAttempt {
    attempt_id: Uuid,
    transaction_type: TransactionType,
    legs: HashMap<H256, Leg>,
    /// BRIDGE_SWAP whose origin receipt carried no separate swap message
    swap_via_bridge: bool,
    /// Origin tx submitted but not confirmed within the receipt wait
    pending_origin: Option<H256>,
    /// Destination delivery tx whose receipt settles the swap leg
    pending_swap_receipt: Option<H256>,
    completed: bool,
}

impl ActiveAttempt {
    fn new(attempt_id: Uuid, transaction_type: TransactionType) -> Self {
        Self {
            attempt_id,
            transaction_type,
            legs: HashMap::new(),
            swap_via_bridge: false,
            pending_origin: None,
            pending_swap_receipt: None,
            completed: false,
        }
    }
}

pub struct ExecutionCoordinator {
    wallet: Arc<dyn WalletSession>,
    store: Arc<ProgressStore>,
    notifier: Arc<Notifier>,
    trackers: TrackerSet,
    readers: Readers,
    poll_interval: Duration,
    active: RwLock<Option<ActiveAttempt>>,
    events: Mutex<Option<mpsc::UnboundedReceiver<DeliveryEvent>>>,
    /// Shutdown flag
    shutdown: RwLock<bool>,
}

impl ExecutionCoordinator {
    pub fn new(
        wallet: Arc<dyn WalletSession>,
        store: Arc<ProgressStore>,
        notifier: Arc<Notifier>,
        oracles: Oracles,
        readers: Readers,
        poll_interval: Duration,
    ) -> Self {
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        Self {
            wallet,
            store,
            notifier,
            trackers: TrackerSet::new(oracles, poll_interval, event_tx),
            readers,
            poll_interval,
            active: RwLock::new(None),
            events: Mutex::new(Some(event_rx)),
            shutdown: RwLock::new(false),
        }
    }

    pub fn wallet(&self) -> &Arc<dyn WalletSession> {
        &self.wallet
    }

    /// Delivery-event loop. Runs until `stop`.
    pub async fn run(&self) -> OrchestratorResult<()> {
        let mut events = self.events.lock().await.take().ok_or_else(|| {
            OrchestratorError::Internal("Coordinator loop already running".to_string())
        })?;

        // Also wakes the loop to observe shutdown
        let mut retry_interval = interval(self.poll_interval);

        info!("Execution coordinator started");

        loop {
            if *self.shutdown.read().await {
                break;
            }

            tokio::select! {
                Some(event) = events.recv() => {
                    self.handle_delivery(event).await;
                }

                _ = retry_interval.tick() => {
                    self.resolve_origin_receipt().await;
                    self.resolve_swap_receipt().await;
                }
            }
        }

        info!("Execution coordinator stopped");
        Ok(())
    }

    pub async fn stop(&self) {
        *self.shutdown.write().await = true;
        self.trackers.cancel_all();
    }

    pub fn active_trackers(&self) -> usize {
        self.trackers.active()
    }

    /// Stop every tracker, e.g. after the selected pair changed
    pub fn cancel_tracking(&self) -> usize {
        self.trackers.cancel_all()
    }

    /// Forget the active attempt and its trackers
    pub async fn reset(&self) {
        self.trackers.cancel_all();
        *self.active.write().await = None;
    }

    /// Make `attempt_id` the active attempt, stopping the trackers of the
    /// previous one. A no-op when it already is active; `false` when the
    /// store has moved on to another attempt.
    pub async fn begin(&self, attempt_id: Uuid, transaction_type: &TransactionType) -> bool {
        let mut active = self.active.write().await;
        if self.store.attempt_id() != Some(attempt_id) {
            return false;
        }
        if active.as_ref().map(|a| a.attempt_id) == Some(attempt_id) {
            return true;
        }

        self.trackers.cancel_all();
        *active = Some(ActiveAttempt::new(attempt_id, transaction_type.clone()));
        true
    }

    /// Submit `call` for the attempt initialized as `attempt_id` and apply
    /// the origin-receipt rules.
    ///
    /// Returns the failure that halted the attempt, after it has been
    /// recorded on the origin step and notified. An attempt that is no
    /// longer the store's is never submitted.
    pub async fn execute(
        &self,
        attempt_id: Uuid,
        transaction_type: TransactionType,
        call: RawCall,
    ) -> OrchestratorResult<()> {
        if !self.begin(attempt_id, &transaction_type).await {
            warn!("Attempt {} was replaced before submission", attempt_id);
            return Err(OrchestratorError::AttemptSuperseded {
                attempt_id: attempt_id.to_string(),
            });
        }

        let origin = transaction_type.origin_step();

        let tx_hash = match self.submit(&call).await {
            Ok(tx_hash) => tx_hash,
            Err(e) => {
                self.fail(attempt_id, origin, "Transaction failed", &e);
                return Err(e);
            }
        };

        self.update(
            attempt_id,
            StepUpdate::new(origin, StepStatus::Processing).with_hash(tx_hash),
        );
        self.notifier.notify(
            NotificationLevel::Info,
            "Transaction submitted",
            format!("{} {:?}", transaction_type.name(), tx_hash),
            Some(attempt_id),
        );

        let receipt = match self.wallet.wait_for_receipt(call.chain_id, tx_hash).await {
            Ok(receipt) => receipt,
            Err(e) if e.is_transient() => {
                // The tx may still land; keep the step processing and keep reading
                warn!("Origin {:?} unconfirmed, watching its receipt: {}", tx_hash, e);
                if let Some(active) = self.active.write().await.as_mut() {
                    if active.attempt_id == attempt_id {
                        active.pending_origin = Some(tx_hash);
                    }
                }
                self.notifier.notify(
                    NotificationLevel::Info,
                    "Transaction pending",
                    format!("{:?} is not confirmed yet; still watching", tx_hash),
                    Some(attempt_id),
                );
                return Ok(());
            }
            Err(e) => {
                self.fail(attempt_id, origin, "Transaction not confirmed", &e);
                return Err(e);
            }
        };

        self.settle_origin(attempt_id, &transaction_type, tx_hash, &receipt)
            .await
    }

    /// Apply the origin receipt: a revert halts, success starts the legs
    async fn settle_origin(
        &self,
        attempt_id: Uuid,
        transaction_type: &TransactionType,
        tx_hash: H256,
        receipt: &TransactionReceipt,
    ) -> OrchestratorResult<()> {
        let chain_id = transaction_type.chain_in();

        if !receipt_succeeded(receipt) {
            crate::metrics::record_tx_reverted(chain_id);
            let e = OrchestratorError::Reverted {
                chain_id,
                tx_hash: format!("{:?}", tx_hash),
            };
            self.fail(
                attempt_id,
                transaction_type.origin_step(),
                "Transaction reverted",
                &e,
            );
            return Err(e);
        }

        info!("{} origin transaction {:?} succeeded", transaction_type.name(), tx_hash);
        self.on_origin_success(attempt_id, transaction_type, receipt)
            .await;
        self.check_complete(attempt_id).await;

        Ok(())
    }

    /// Switch the wallet to the call's chain if needed, then send it once
    pub(crate) async fn submit(&self, call: &RawCall) -> OrchestratorResult<H256> {
        if self.wallet.connected_address().is_none() {
            return Err(OrchestratorError::WalletNotConnected);
        }

        let current = self.wallet.current_chain();
        if current != call.chain_id {
            info!("Switching wallet from chain {} to {}", current, call.chain_id);
            self.wallet.switch_chain(call.chain_id).await?;
        }

        self.wallet.send_transaction(call.clone()).await
    }

    async fn on_origin_success(
        &self,
        attempt_id: Uuid,
        transaction_type: &TransactionType,
        receipt: &TransactionReceipt,
    ) {
        let messages = extract_message_ids(
            receipt,
            transaction_type.chain_in(),
            transaction_type.protocol(),
        );
        if let Some(first) = messages.first() {
            crate::metrics::record_messages_extracted(first.protocol, messages.len());
        }

        match transaction_type {
            TransactionType::Swap { .. } => {
                self.update(attempt_id, StepUpdate::new(StepId::Swap, StepStatus::Success));
            }

            TransactionType::Bridge { .. } => {
                self.update(
                    attempt_id,
                    StepUpdate::new(StepId::SendOrigin, StepStatus::Success),
                );
                self.start_bridge_leg(attempt_id, transaction_type, messages.first())
                    .await;
            }

            TransactionType::BridgeSwap { .. } => {
                self.update(
                    attempt_id,
                    StepUpdate::new(StepId::SendOrigin, StepStatus::Success),
                );

                let mut ids = messages.iter();
                let bridge = ids.next();
                self.start_bridge_leg(attempt_id, transaction_type, bridge)
                    .await;

                match ids.next() {
                    Some(swap) => {
                        self.update(
                            attempt_id,
                            StepUpdate::new(StepId::Swap, StepStatus::Processing)
                                .with_hash(swap.id),
                        );
                        self.register(attempt_id, transaction_type, swap, Leg::Swap)
                            .await;
                    }
                    None if bridge.is_some() => {
                        debug!("No swap message; swap settles with the bridge delivery");
                        if let Some(active) = self.active.write().await.as_mut() {
                            if active.attempt_id == attempt_id {
                                active.swap_via_bridge = true;
                            }
                        }
                    }
                    None => {}
                }
            }

            TransactionType::SwapBridge { .. } => {
                self.update(attempt_id, StepUpdate::new(StepId::Swap, StepStatus::Success));
                self.start_bridge_leg(attempt_id, transaction_type, messages.first())
                    .await;
            }
        }
    }

    /// Bridge goes processing under its message id and gets tracked.
    /// Without an id there is nothing to track; the step stays processing.
    async fn start_bridge_leg(
        &self,
        attempt_id: Uuid,
        transaction_type: &TransactionType,
        message: Option<&OutboundMessage>,
    ) {
        let Some(message) = message else {
            warn!(
                "No cross-chain message id in {} origin receipt",
                transaction_type.name()
            );
            self.update(
                attempt_id,
                StepUpdate::new(StepId::Bridge, StepStatus::Processing),
            );
            self.notifier.notify(
                NotificationLevel::Info,
                "Bridge submitted",
                "Delivery cannot be tracked: no message id found in the receipt",
                Some(attempt_id),
            );
            return;
        };

        self.update(
            attempt_id,
            StepUpdate::new(StepId::Bridge, StepStatus::Processing).with_hash(message.id),
        );
        self.register(attempt_id, transaction_type, message, Leg::Bridge)
            .await;
    }

    async fn register(
        &self,
        attempt_id: Uuid,
        transaction_type: &TransactionType,
        message: &OutboundMessage,
        leg: Leg,
    ) {
        {
            let mut active = self.active.write().await;
            match active.as_mut() {
                Some(active) if active.attempt_id == attempt_id => {
                    active.legs.insert(message.id, leg);
                }
                _ => return,
            }
        }

        let tracked = TrackedMessage {
            protocol: message.protocol,
            message_id: message.id,
            origin_chain: transaction_type.chain_in(),
            destination_chain: transaction_type.chain_out(),
        };
        if !self.trackers.track(attempt_id, tracked) {
            warn!("{:?} message {:?} is not being tracked", leg, message.id);
        }
    }

    async fn handle_delivery(&self, event: DeliveryEvent) {
        let (leg, transaction_type, swap_via_bridge) = {
            let active = self.active.read().await;
            let Some(active) = active.as_ref() else {
                debug!("Delivery with no active attempt");
                return;
            };
            if active.attempt_id != event.attempt_id {
                debug!("Dropping delivery for stale attempt {}", event.attempt_id);
                return;
            }
            let Some(leg) = active.legs.get(&event.message.message_id).copied() else {
                warn!("Delivery for unknown message {:?}", event.message.message_id);
                return;
            };
            (leg, active.transaction_type.clone(), active.swap_via_bridge)
        };

        let attempt_id = event.attempt_id;
        let mut transfer_remote = StepUpdate::new(StepId::TransferRemote, StepStatus::Success);
        transfer_remote.hash = event.destination_tx;

        match (&transaction_type, leg) {
            (TransactionType::Bridge { .. }, Leg::Bridge) => {
                self.update(attempt_id, StepUpdate::new(StepId::Bridge, StepStatus::Success));
                self.update(attempt_id, transfer_remote);
            }

            (TransactionType::SwapBridge { .. }, Leg::Bridge) => {
                self.update(attempt_id, StepUpdate::new(StepId::Bridge, StepStatus::Success));
            }

            (TransactionType::BridgeSwap { .. }, Leg::Bridge) => {
                self.update(attempt_id, StepUpdate::new(StepId::Bridge, StepStatus::Success));

                if swap_via_bridge {
                    match event.destination_tx {
                        Some(destination_tx) => {
                            self.update(
                                attempt_id,
                                StepUpdate::new(StepId::Swap, StepStatus::Processing)
                                    .with_hash(destination_tx),
                            );
                            if let Some(active) = self.active.write().await.as_mut() {
                                if active.attempt_id == attempt_id {
                                    active.pending_swap_receipt = Some(destination_tx);
                                }
                            }
                            self.resolve_swap_receipt().await;
                        }
                        None => warn!("Bridge delivered without a destination tx; swap cannot be confirmed"),
                    }
                }
            }

            (TransactionType::BridgeSwap { .. }, Leg::Swap) => {
                self.update(attempt_id, StepUpdate::new(StepId::Swap, StepStatus::Success));
                self.update(attempt_id, transfer_remote);
            }

            (transaction_type, leg) => {
                error!("{:?} delivery does not apply to {}", leg, transaction_type.name());
            }
        }

        self.check_complete(attempt_id).await;
    }

    /// Settle an origin tx whose receipt wait gave up.
    /// An unreadable receipt is retried on the next tick.
    async fn resolve_origin_receipt(&self) {
        let pending = self.active.read().await.as_ref().and_then(|active| {
            active
                .pending_origin
                .map(|tx_hash| (active.attempt_id, active.transaction_type.clone(), tx_hash))
        });
        let Some((attempt_id, transaction_type, tx_hash)) = pending else {
            return;
        };

        let Some(receipt) = self.read_receipt(transaction_type.chain_in(), tx_hash).await else {
            return;
        };

        {
            let mut active = self.active.write().await;
            match active.as_mut() {
                Some(active)
                    if active.attempt_id == attempt_id && active.pending_origin == Some(tx_hash) =>
                {
                    active.pending_origin = None;
                }
                _ => return,
            }
        }

        if let Err(e) = self
            .settle_origin(attempt_id, &transaction_type, tx_hash, &receipt)
            .await
        {
            warn!("Attempt {} halted: {}", attempt_id, e);
        }
    }

    /// Settle a swap that ran inside the bridge delivery transaction.
    /// An unreadable receipt is retried on the next tick.
    async fn resolve_swap_receipt(&self) {
        let pending = self.active.read().await.as_ref().and_then(|active| {
            active
                .pending_swap_receipt
                .map(|tx_hash| (active.attempt_id, active.transaction_type.chain_out(), tx_hash))
        });
        let Some((attempt_id, chain_id, tx_hash)) = pending else {
            return;
        };

        let Some(receipt) = self.read_receipt(chain_id, tx_hash).await else {
            return;
        };

        if let Some(active) = self.active.write().await.as_mut() {
            if active.attempt_id == attempt_id {
                active.pending_swap_receipt = None;
            }
        }

        if receipt_succeeded(&receipt) {
            self.update(attempt_id, StepUpdate::new(StepId::Swap, StepStatus::Success));
            self.update(
                attempt_id,
                StepUpdate::new(StepId::TransferRemote, StepStatus::Success).with_hash(tx_hash),
            );
        } else {
            crate::metrics::record_tx_reverted(chain_id);
            let e = OrchestratorError::Reverted {
                chain_id,
                tx_hash: format!("{:?}", tx_hash),
            };
            self.fail(attempt_id, StepId::Swap, "Swap failed", &e);
        }

        self.check_complete(attempt_id).await;
    }

    /// Mined receipt of `tx_hash`, or `None` when it cannot be read yet
    async fn read_receipt(&self, chain_id: u64, tx_hash: H256) -> Option<TransactionReceipt> {
        let reader = match reader_for(&self.readers, chain_id) {
            Ok(reader) => reader,
            Err(e) => {
                warn!("Cannot read receipt {:?}: {}", tx_hash, e);
                return None;
            }
        };

        match reader.get_transaction_receipt(tx_hash).await {
            Ok(Some(receipt)) => Some(receipt),
            Ok(None) => {
                debug!("Receipt {:?} on chain {} not available yet", tx_hash, chain_id);
                None
            }
            Err(e) => {
                warn!("Receipt query for {:?} failed: {}", tx_hash, e);
                None
            }
        }
    }

    async fn check_complete(&self, attempt_id: Uuid) {
        let state = self.store.snapshot();
        if state.attempt_id != Some(attempt_id) || !state.is_complete() {
            return;
        }

        let mut active = self.active.write().await;
        let Some(active) = active.as_mut() else {
            return;
        };
        if active.attempt_id != attempt_id || active.completed {
            return;
        }

        active.completed = true;
        info!("Attempt {} complete", attempt_id);
        self.notifier.notify(
            NotificationLevel::Success,
            "Transaction complete",
            format!("{} finished", active.transaction_type.name()),
            Some(attempt_id),
        );
    }

    fn fail(&self, attempt_id: Uuid, step: StepId, title: &str, e: &OrchestratorError) {
        error!("{} at step {}: {}", title, step, e);
        self.update(attempt_id, StepUpdate::new(step, StepStatus::Error));
        if e.should_notify() {
            self.notifier.notify(
                NotificationLevel::Error,
                title,
                e.to_string(),
                Some(attempt_id),
            );
        }
    }

    fn update(&self, attempt_id: Uuid, update: StepUpdate) -> bool {
        match self.store.update_transaction_step(attempt_id, update) {
            Ok(changed) => changed,
            Err(e) => {
                warn!("Step update {:?} rejected: {}", update, e);
                false
            }
        }
    }
}
