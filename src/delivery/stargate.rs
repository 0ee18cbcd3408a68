use super::{query_error, DeliveryOracle, DeliveryStatus, TrackedMessage};
use crate::chain::{reader_for, Readers};
use crate::error::OrchestratorResult;
use crate::events::stargate::oft_received_topic;
use crate::transaction::BridgeProtocol;

use async_trait::async_trait;
use ethers::types::{Address, Filter};
use std::collections::HashMap;

/// Looks for the `OFTReceived` credit of a guid on the destination pools
pub struct StargateOracle {
    readers: Readers,
    pools: HashMap<u64, Vec<Address>>,
    lookback: u64,
}

impl StargateOracle {
    pub fn new(readers: Readers, pools: HashMap<u64, Vec<Address>>, lookback: u64) -> Self {
        Self {
            readers,
            pools,
            lookback,
        }
    }
}

#[async_trait]
impl DeliveryOracle for StargateOracle {
    fn protocol(&self) -> BridgeProtocol {
        BridgeProtocol::Stargate
    }

    async fn check(&self, message: &TrackedMessage) -> OrchestratorResult<DeliveryStatus> {
        let chain_id = message.destination_chain;
        let pools = self
            .pools
            .get(&chain_id)
            .filter(|p| !p.is_empty())
            .ok_or_else(|| query_error(self.protocol(), format!("No Stargate pools on chain {}", chain_id)))?;
        let reader = reader_for(&self.readers, chain_id)?;

        let head = reader
            .block_number()
            .await
            .map_err(|e| query_error(self.protocol(), e))?;
        let filter = Filter::new()
            .address(pools.clone())
            .topic0(oft_received_topic())
            .topic1(message.message_id)
            .from_block(head.saturating_sub(self.lookback))
            .to_block(head);

        let logs = reader
            .get_logs(&filter)
            .await
            .map_err(|e| query_error(self.protocol(), e))?;

        // No receive log means the guid has not been credited yet
        Ok(match logs.first() {
            Some(log) => DeliveryStatus::Delivered {
                destination_tx: log.transaction_hash,
            },
            None => DeliveryStatus::Pending,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::{ChainReader, MockChainReader};
    use crate::error::OrchestratorError;
    use ethers::types::{Log, H256};
    use std::sync::Arc;

    fn message() -> TrackedMessage {
        TrackedMessage {
            protocol: BridgeProtocol::Stargate,
            message_id: H256::repeat_byte(0x57),
            origin_chain: 1,
            destination_chain: 10,
        }
    }

    fn oracle(reader: MockChainReader) -> StargateOracle {
        let reader: Arc<dyn ChainReader> = Arc::new(reader);
        StargateOracle::new(
            [(10u64, reader)].into_iter().collect(),
            [(10u64, vec![Address::repeat_byte(0x99)])].into_iter().collect(),
            1_000,
        )
    }

    #[tokio::test]
    async fn test_receive_log_marks_delivery() {
        let credit_tx = H256::repeat_byte(0xcc);
        let mut reader = MockChainReader::new();
        reader.expect_block_number().returning(|| Ok(2_000));
        reader.expect_get_logs().returning(move |_| {
            Ok(vec![Log {
                transaction_hash: Some(credit_tx),
                ..Default::default()
            }])
        });

        let status = oracle(reader).check(&message()).await.unwrap();
        assert_eq!(
            status,
            DeliveryStatus::Delivered {
                destination_tx: Some(credit_tx)
            }
        );
    }

    #[tokio::test]
    async fn test_no_receive_log_is_pending() {
        let mut reader = MockChainReader::new();
        reader.expect_block_number().returning(|| Ok(2_000));
        reader.expect_get_logs().returning(|_| Ok(Vec::new()));

        let status = oracle(reader).check(&message()).await.unwrap();
        assert!(!status.is_delivered());
    }

    #[tokio::test]
    async fn test_chain_without_pools_errors() {
        let mut msg = message();
        msg.destination_chain = 8453;

        let err = oracle(MockChainReader::new()).check(&msg).await.unwrap_err();
        assert!(matches!(err, OrchestratorError::DeliveryQuery { .. }));
    }
}
