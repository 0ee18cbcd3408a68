use super::{find_recent_log, query_error, DeliveryOracle, DeliveryStatus, TrackedMessage};
use crate::abi::{to_b256, IMailbox};
use crate::chain::{reader_for, Readers};
use crate::error::{OrchestratorError, OrchestratorResult};
use crate::events::hyperlane::process_id_topic;
use crate::transaction::BridgeProtocol;

use alloy_sol_types::SolCall;
use async_trait::async_trait;
use ethers::types::{Address, Filter};
use std::collections::HashMap;
use tracing::debug;

/// Asks the destination mailbox whether a message was processed
pub struct HyperlaneOracle {
    readers: Readers,
    mailboxes: HashMap<u64, Address>,
    lookback: u64,
}

impl HyperlaneOracle {
    pub fn new(readers: Readers, mailboxes: HashMap<u64, Address>, lookback: u64) -> Self {
        Self {
            readers,
            mailboxes,
            lookback,
        }
    }
}

#[async_trait]
impl DeliveryOracle for HyperlaneOracle {
    fn protocol(&self) -> BridgeProtocol {
        BridgeProtocol::Hyperlane
    }

    async fn check(&self, message: &TrackedMessage) -> OrchestratorResult<DeliveryStatus> {
        let chain_id = message.destination_chain;
        let mailbox = *self
            .mailboxes
            .get(&chain_id)
            .ok_or_else(|| query_error(self.protocol(), format!("No mailbox on chain {}", chain_id)))?;
        let reader = reader_for(&self.readers, chain_id)?;

        let call = IMailbox::deliveredCall {
            messageId: to_b256(message.message_id),
        };
        let output = reader
            .call(mailbox, call.abi_encode().into())
            .await
            .map_err(|e| query_error(self.protocol(), e))?;
        let delivered = IMailbox::deliveredCall::abi_decode_returns(&output, true)
            .map_err(|e| OrchestratorError::EventParsing(e.to_string()))?
            ._0;

        if !delivered {
            return Ok(DeliveryStatus::Pending);
        }

        let filter = Filter::new()
            .address(mailbox)
            .topic0(process_id_topic())
            .topic1(message.message_id);
        let destination_tx = find_recent_log(reader.as_ref(), filter, self.lookback)
            .await
            .map_err(|e| query_error(self.protocol(), e))?;

        debug!(
            "Hyperlane message {:?} processed on chain {} in {:?}",
            message.message_id, chain_id, destination_tx
        );
        Ok(DeliveryStatus::Delivered { destination_tx })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::{ChainReader, MockChainReader};
    use alloy_sol_types::SolValue;
    use ethers::types::{Log, H160, H256};
    use std::sync::Arc;

    const MAILBOX: Address = H160([0x0d; 20]);

    fn message() -> TrackedMessage {
        TrackedMessage {
            protocol: BridgeProtocol::Hyperlane,
            message_id: H256::repeat_byte(0x42),
            origin_chain: 1,
            destination_chain: 10,
        }
    }

    fn oracle(reader: MockChainReader) -> HyperlaneOracle {
        let reader: Arc<dyn ChainReader> = Arc::new(reader);
        HyperlaneOracle::new(
            [(10u64, reader)].into_iter().collect(),
            [(10u64, MAILBOX)].into_iter().collect(),
            1_000,
        )
    }

    #[tokio::test]
    async fn test_undelivered_message_is_pending() {
        let mut reader = MockChainReader::new();
        reader
            .expect_call()
            .withf(|to, _| *to == MAILBOX)
            .returning(|_, _| Ok(false.abi_encode().into()));
        reader.expect_get_logs().never();

        let status = oracle(reader).check(&message()).await.unwrap();
        assert_eq!(status, DeliveryStatus::Pending);
    }

    #[tokio::test]
    async fn test_delivered_message_names_process_tx() {
        let process_tx = H256::repeat_byte(0xdd);
        let mut reader = MockChainReader::new();
        reader
            .expect_call()
            .returning(|_, _| Ok(true.abi_encode().into()));
        reader.expect_block_number().returning(|| Ok(5_000));
        reader.expect_get_logs().returning(move |_| {
            Ok(vec![Log {
                transaction_hash: Some(process_tx),
                ..Default::default()
            }])
        });

        let status = oracle(reader).check(&message()).await.unwrap();
        assert_eq!(
            status,
            DeliveryStatus::Delivered {
                destination_tx: Some(process_tx)
            }
        );
    }

    #[tokio::test]
    async fn test_rpc_failure_is_a_query_error() {
        let mut reader = MockChainReader::new();
        reader.expect_call().returning(|_, _| {
            Err(OrchestratorError::ChainConnection {
                chain_id: 10,
                message: "connection refused".to_string(),
            })
        });

        let err = oracle(reader).check(&message()).await.unwrap_err();
        assert!(matches!(err, OrchestratorError::DeliveryQuery { .. }));
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_missing_mailbox_is_a_query_error() {
        let mut msg = message();
        msg.destination_chain = 8453;

        let err = oracle(MockChainReader::new()).check(&msg).await.unwrap_err();
        assert!(matches!(err, OrchestratorError::DeliveryQuery { .. }));
    }
}
