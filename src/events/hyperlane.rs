use crate::abi::{from_b256, raw_log_parts, IMailbox};
use crate::error::{OrchestratorError, OrchestratorResult};

use alloy_sol_types::SolEvent;
use ethers::types::{Log, TransactionReceipt, H256};
use tracing::warn;

pub fn dispatch_id_topic() -> H256 {
    from_b256(IMailbox::DispatchId::SIGNATURE_HASH)
}

pub fn process_id_topic() -> H256 {
    from_b256(IMailbox::ProcessId::SIGNATURE_HASH)
}

/// Hyperlane message ids dispatched by the transaction, in log order
pub fn extract_hyperlane_message_ids(receipt: &TransactionReceipt) -> Vec<H256> {
    let topic = dispatch_id_topic();

    receipt
        .logs
        .iter()
        .filter(|log| log.topics.first() == Some(&topic))
        .filter_map(|log| match decode_dispatch_id(log) {
            Ok(id) => Some(id),
            Err(e) => {
                warn!("Skipping malformed DispatchId log: {}", e);
                None
            }
        })
        .collect()
}

pub fn decode_dispatch_id(log: &Log) -> OrchestratorResult<H256> {
    let (topics, data) = raw_log_parts(log);
    let event = IMailbox::DispatchId::decode_raw_log(topics, data, true)
        .map_err(|e| OrchestratorError::EventParsing(e.to_string()))?;
    Ok(from_b256(event.messageId))
}
