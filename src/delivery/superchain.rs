use super::{find_recent_log, query_error, DeliveryOracle, DeliveryStatus, TrackedMessage};
use crate::abi::{predeploys, to_b256, IL2ToL2CrossDomainMessenger};
use crate::chain::{reader_for, Readers};
use crate::error::{OrchestratorError, OrchestratorResult};
use crate::events::superchain::relayed_message_topic;
use crate::transaction::BridgeProtocol;

use alloy_sol_types::SolCall;
use async_trait::async_trait;
use ethers::types::Filter;

/// Checks the destination L2-to-L2 messenger for a relayed message hash
pub struct SuperchainOracle {
    readers: Readers,
    lookback: u64,
}

impl SuperchainOracle {
    pub fn new(readers: Readers, lookback: u64) -> Self {
        Self { readers, lookback }
    }
}

#[async_trait]
impl DeliveryOracle for SuperchainOracle {
    fn protocol(&self) -> BridgeProtocol {
        BridgeProtocol::Superchain
    }

    async fn check(&self, message: &TrackedMessage) -> OrchestratorResult<DeliveryStatus> {
        let reader = reader_for(&self.readers, message.destination_chain)?;
        let messenger = predeploys::L2_TO_L2_CROSS_DOMAIN_MESSENGER;

        let call = IL2ToL2CrossDomainMessenger::successfulMessagesCall {
            messageHash: to_b256(message.message_id),
        };
        let output = reader
            .call(messenger, call.abi_encode().into())
            .await
            .map_err(|e| query_error(self.protocol(), e))?;
        let relayed = IL2ToL2CrossDomainMessenger::successfulMessagesCall::abi_decode_returns(&output, true)
            .map_err(|e| OrchestratorError::EventParsing(e.to_string()))?
            ._0;

        if !relayed {
            return Ok(DeliveryStatus::Pending);
        }

        // messageHash is the third indexed field
        let filter = Filter::new()
            .address(messenger)
            .topic0(relayed_message_topic())
            .topic3(message.message_id);
        let destination_tx = find_recent_log(reader.as_ref(), filter, self.lookback)
            .await
            .map_err(|e| query_error(self.protocol(), e))?;

        Ok(DeliveryStatus::Delivered { destination_tx })
    }
}
