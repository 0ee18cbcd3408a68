//! Cross-chain delivery tracking
//!
//! One watcher task per (message id, destination chain, protocol). A watcher
//! polls its oracle until a positive confirmation, reports it once on the
//! event channel and exits. Oracle errors are logged and retried on the next
//! tick; they never end the watch. There is no timeout: a watcher lives
//! until it confirms or is cancelled.

use crate::delivery::{DeliveryOracle, DeliveryStatus, Oracles, TrackedMessage};
use crate::transaction::BridgeProtocol;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use ethers::types::H256;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Positive delivery confirmation for a tracked message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryEvent {
    pub attempt_id: Uuid,
    pub message: TrackedMessage,
    pub destination_tx: Option<H256>,
}

type TrackerKey = (H256, u64, BridgeProtocol);

pub struct TrackerSet {
    oracles: Oracles,
    poll_interval: Duration,
    events: mpsc::UnboundedSender<DeliveryEvent>,
    watchers: DashMap<TrackerKey, JoinHandle<()>>,
}

impl TrackerSet {
    pub fn new(
        oracles: Oracles,
        poll_interval: Duration,
        events: mpsc::UnboundedSender<DeliveryEvent>,
    ) -> Self {
        Self {
            oracles,
            poll_interval,
            events,
            watchers: DashMap::new(),
        }
    }

    /// Start watching `message` for `attempt_id`.
    ///
    /// Returns false when the message is already watched (or was already
    /// confirmed) since the last cancellation, or no oracle serves its protocol.
    pub fn track(&self, attempt_id: Uuid, message: TrackedMessage) -> bool {
        let Some(oracle) = self.oracles.get(&message.protocol).cloned() else {
            warn!("No delivery oracle for {}", message.protocol);
            return false;
        };

        let key = (
            message.message_id,
            message.destination_chain,
            message.protocol,
        );

        match self.watchers.entry(key) {
            Entry::Occupied(_) => {
                debug!("Message {:?} already tracked", message.message_id);
                false
            }
            Entry::Vacant(slot) => {
                info!(
                    "Tracking {} message {:?} to chain {}",
                    message.protocol, message.message_id, message.destination_chain
                );
                let handle = tokio::spawn(watch(
                    oracle,
                    attempt_id,
                    message,
                    self.poll_interval,
                    self.events.clone(),
                ));
                slot.insert(handle);
                true
            }
        }
    }

    /// Stop every watcher and forget what was tracked. Returns how many were still running.
    pub fn cancel_all(&self) -> usize {
        let mut cancelled = 0;
        for entry in self.watchers.iter() {
            if !entry.value().is_finished() {
                entry.value().abort();
                cancelled += 1;
            }
        }
        self.watchers.clear();

        if cancelled > 0 {
            info!("Cancelled {} delivery trackers", cancelled);
        }
        cancelled
    }

    /// Watchers still polling
    pub fn active(&self) -> usize {
        self.watchers
            .iter()
            .filter(|entry| !entry.value().is_finished())
            .count()
    }
}

impl Drop for TrackerSet {
    fn drop(&mut self) {
        for entry in self.watchers.iter() {
            entry.value().abort();
        }
    }
}

async fn watch(
    oracle: Arc<dyn DeliveryOracle>,
    attempt_id: Uuid,
    message: TrackedMessage,
    poll_interval: Duration,
    events: mpsc::UnboundedSender<DeliveryEvent>,
) {
    let started = Instant::now();
    let mut ticker = interval(poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;

        match oracle.check(&message).await {
            Ok(DeliveryStatus::Delivered { destination_tx }) => {
                info!(
                    "{} message {:?} delivered on chain {}",
                    message.protocol, message.message_id, message.destination_chain
                );
                crate::metrics::record_message_delivered(
                    message.protocol,
                    started.elapsed().as_secs_f64(),
                );

                let event = DeliveryEvent {
                    attempt_id,
                    message,
                    destination_tx,
                };
                if events.send(event).is_err() {
                    debug!("Delivery event receiver gone");
                }
                return;
            }
            Ok(DeliveryStatus::Pending) => {
                debug!("{:?} not delivered yet", message.message_id);
            }
            Err(e) => {
                warn!(
                    "{} oracle query for {:?} failed: {}",
                    message.protocol, message.message_id, e
                );
                crate::metrics::record_oracle_error(message.protocol);
            }
        }
    }
}
