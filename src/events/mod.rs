//! Cross-chain message extraction from origin receipts
//!
//! Each protocol leaves a different trace in the origin transaction's logs.
//! Extraction tries Superchain first, then Hyperlane, then Stargate; Orbiter
//! has no on-chain message id, so the transaction hash itself is tracked.

pub mod hyperlane;
pub mod stargate;
pub mod superchain;

pub use hyperlane::extract_hyperlane_message_ids;
pub use stargate::extract_stargate_message_id;
pub use superchain::extract_superchain_message_ids;

use crate::transaction::BridgeProtocol;

use ethers::types::{TransactionReceipt, H256};
use serde::Serialize;
use tracing::debug;

/// A message sent by an origin transaction, identified per its protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboundMessage {
    pub protocol: BridgeProtocol,
    pub id: H256,
}

/// Message ids carried by `receipt`, in emission order for the first
/// protocol that yields any.
///
/// `route` is the protocol the transaction was built for; it only decides
/// whether the receipt hash stands in for an Orbiter transfer.
pub fn extract_message_ids(
    receipt: &TransactionReceipt,
    origin_chain_id: u64,
    route: Option<BridgeProtocol>,
) -> Vec<OutboundMessage> {
    let tag = |protocol: BridgeProtocol| move |id: H256| OutboundMessage { protocol, id };

    let superchain = extract_superchain_message_ids(receipt, origin_chain_id);
    if !superchain.is_empty() {
        return superchain
            .into_iter()
            .map(tag(BridgeProtocol::Superchain))
            .collect();
    }

    let hyperlane = extract_hyperlane_message_ids(receipt);
    if !hyperlane.is_empty() {
        return hyperlane
            .into_iter()
            .map(tag(BridgeProtocol::Hyperlane))
            .collect();
    }

    if let Some(guid) = extract_stargate_message_id(receipt) {
        return vec![tag(BridgeProtocol::Stargate)(guid)];
    }

    if route == Some(BridgeProtocol::Orbiter) {
        return vec![tag(BridgeProtocol::Orbiter)(receipt.transaction_hash)];
    }

    debug!(
        "No cross-chain message in receipt {:?}",
        receipt.transaction_hash
    );
    Vec::new()
}
