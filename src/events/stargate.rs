use crate::abi::{from_b256, raw_log_parts, IStargateOFT};

use alloy_sol_types::SolEvent;
use ethers::types::{TransactionReceipt, H256};
use tracing::warn;

pub fn oft_sent_topic() -> H256 {
    from_b256(IStargateOFT::OFTSent::SIGNATURE_HASH)
}

pub fn oft_received_topic() -> H256 {
    from_b256(IStargateOFT::OFTReceived::SIGNATURE_HASH)
}

/// LayerZero guid of the first OFT transfer in the transaction
pub fn extract_stargate_message_id(receipt: &TransactionReceipt) -> Option<H256> {
    let topic = oft_sent_topic();

    receipt
        .logs
        .iter()
        .filter(|log| log.topics.first() == Some(&topic))
        .find_map(|log| {
            let (topics, data) = raw_log_parts(log);
            match IStargateOFT::OFTSent::decode_raw_log(topics, data, true) {
                Ok(sent) => Some(from_b256(sent.guid)),
                Err(e) => {
                    warn!("Skipping malformed OFTSent log: {}", e);
                    None
                }
            }
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::test_logs::*;

    #[test]
    fn test_first_guid_wins() {
        let first = H256::repeat_byte(3);
        let receipt = receipt_with(vec![oft_sent_log(first), oft_sent_log(H256::repeat_byte(4))]);

        assert_eq!(extract_stargate_message_id(&receipt), Some(first));
    }

    #[test]
    fn test_no_transfer_yields_none() {
        let receipt = receipt_with(vec![dispatch_id_log(H256::repeat_byte(1))]);
        assert_eq!(extract_stargate_message_id(&receipt), None);
    }
}
