//! Delivery oracles - "has this message arrived on the destination chain?"
//!
//! One oracle per bridge protocol. Oracles only answer queries; polling,
//! cancellation and step updates belong to the tracker.

pub mod hyperlane;
pub mod orbiter;
pub mod stargate;
pub mod superchain;

pub use hyperlane::HyperlaneOracle;
pub use orbiter::OrbiterOracle;
pub use stargate::StargateOracle;
pub use superchain::SuperchainOracle;

use crate::chain::{ChainReader, Readers};
use crate::config::{parse_address, Settings};
use crate::error::{OrchestratorError, OrchestratorResult};
use crate::transaction::BridgeProtocol;

use async_trait::async_trait;
use ethers::types::{Filter, H256};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

/// A message being watched on its destination chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackedMessage {
    pub protocol: BridgeProtocol,
    pub message_id: H256,
    pub origin_chain: u64,
    pub destination_chain: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryStatus {
    Pending,
    /// Delivered; the destination transaction when the oracle can name it
    Delivered { destination_tx: Option<H256> },
}

impl DeliveryStatus {
    pub fn is_delivered(&self) -> bool {
        matches!(self, DeliveryStatus::Delivered { .. })
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DeliveryOracle: Send + Sync {
    fn protocol(&self) -> BridgeProtocol;

    async fn check(&self, message: &TrackedMessage) -> OrchestratorResult<DeliveryStatus>;
}

/// Oracles keyed by the protocol they answer for
pub type Oracles = HashMap<BridgeProtocol, Arc<dyn DeliveryOracle>>;

/// Build one oracle per protocol from the configured contracts
pub fn build_oracles(settings: &Settings, readers: &Readers) -> OrchestratorResult<Oracles> {
    let lookback = settings.session.delivery_lookback_blocks;

    let mut mailboxes = HashMap::new();
    let mut pools = HashMap::new();
    for chain in settings.enabled_chains().into_iter().map(|(_, c)| c) {
        if let Some(mailbox) = &chain.contracts.mailbox {
            mailboxes.insert(chain.chain_id, parse_address(mailbox)?);
        }
        let chain_pools = chain
            .contracts
            .stargate_pools
            .iter()
            .map(|p| parse_address(p))
            .collect::<OrchestratorResult<Vec<_>>>()?;
        if !chain_pools.is_empty() {
            pools.insert(chain.chain_id, chain_pools);
        }
    }

    let oracles: Vec<Arc<dyn DeliveryOracle>> = vec![
        Arc::new(SuperchainOracle::new(readers.clone(), lookback)),
        Arc::new(HyperlaneOracle::new(readers.clone(), mailboxes, lookback)),
        Arc::new(StargateOracle::new(readers.clone(), pools, lookback)),
        Arc::new(OrbiterOracle::new(&settings.orbiter.api_url)),
    ];

    Ok(oracles.into_iter().map(|o| (o.protocol(), o)).collect())
}

pub(crate) fn query_error(protocol: BridgeProtocol, e: impl std::fmt::Display) -> OrchestratorError {
    OrchestratorError::DeliveryQuery {
        protocol: protocol.to_string(),
        message: e.to_string(),
    }
}

/// Transaction hash of the newest log matching `filter` within the last
/// `lookback` blocks
pub(crate) async fn find_recent_log(
    reader: &dyn ChainReader,
    filter: Filter,
    lookback: u64,
) -> OrchestratorResult<Option<H256>> {
    let head = reader.block_number().await?;
    let filter = filter.from_block(head.saturating_sub(lookback)).to_block(head);

    let logs = reader.get_logs(&filter).await?;
    Ok(logs.last().and_then(|log| log.transaction_hash))
}
