use crate::abi::{from_b256, predeploys, raw_log_parts, IL2ToL2CrossDomainMessenger};
use crate::error::{OrchestratorError, OrchestratorResult};

use alloy_primitives::{keccak256, U256};
use alloy_sol_types::{SolEvent, SolValue};
use ethers::types::{Log, TransactionReceipt, H256};
use tracing::warn;

pub fn sent_message_topic() -> H256 {
    from_b256(IL2ToL2CrossDomainMessenger::SentMessage::SIGNATURE_HASH)
}

pub fn relayed_message_topic() -> H256 {
    from_b256(IL2ToL2CrossDomainMessenger::RelayedMessage::SIGNATURE_HASH)
}

/// Hashes of the interop messages sent through the L2-to-L2 messenger
pub fn extract_superchain_message_ids(receipt: &TransactionReceipt, origin_chain_id: u64) -> Vec<H256> {
    let topic = sent_message_topic();

    receipt
        .logs
        .iter()
        .filter(|log| log.address == predeploys::L2_TO_L2_CROSS_DOMAIN_MESSENGER)
        .filter(|log| log.topics.first() == Some(&topic))
        .filter_map(|log| match message_hash(log, origin_chain_id) {
            Ok(hash) => Some(hash),
            Err(e) => {
                warn!("Skipping malformed SentMessage log: {}", e);
                None
            }
        })
        .collect()
}

/// Message hash the destination messenger records once relayed:
/// keccak256(abi.encode(destination, source, nonce, sender, target, message))
pub fn message_hash(log: &Log, origin_chain_id: u64) -> OrchestratorResult<H256> {
    let (topics, data) = raw_log_parts(log);
    let sent = IL2ToL2CrossDomainMessenger::SentMessage::decode_raw_log(topics, data, true)
        .map_err(|e| OrchestratorError::EventParsing(e.to_string()))?;

    let encoded = (
        sent.destination,
        U256::from(origin_chain_id),
        sent.messageNonce,
        sent.sender,
        sent.target,
        sent.message,
    )
        .abi_encode_params();

    Ok(from_b256(keccak256(encoded)))
}
