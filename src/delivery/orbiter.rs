use super::{query_error, DeliveryOracle, DeliveryStatus, TrackedMessage};
use crate::error::OrchestratorResult;
use crate::transaction::BridgeProtocol;

use async_trait::async_trait;
use ethers::types::H256;
use reqwest::Client;
use serde::Deserialize;
use std::str::FromStr;
use std::time::Duration;

/// Maker-side status reported once the destination transfer has been sent
const STATUS_COMPLETED: u64 = 99;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Orbiter has no on-chain message id: the origin transaction hash is
/// looked up in the Orbiter status API.
pub struct OrbiterOracle {
    client: Client,
    api_url: String,
}

#[derive(Debug, Deserialize)]
struct StatusResponse {
    result: Option<StatusResult>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatusResult {
    op_status: Option<u64>,
    target_id: Option<String>,
}

impl OrbiterOracle {
    pub fn new(api_url: &str) -> Self {
        Self {
            client: Client::new(),
            api_url: api_url.trim_end_matches('/').to_string(),
        }
    }

    fn status_url(&self, origin_tx: H256) -> String {
        format!(
            "{}/transaction/status/0x{}",
            self.api_url,
            hex::encode(origin_tx.as_bytes())
        )
    }
}

fn parse_status(response: StatusResponse) -> DeliveryStatus {
    match response.result {
        Some(StatusResult {
            op_status: Some(STATUS_COMPLETED),
            target_id,
        }) => DeliveryStatus::Delivered {
            destination_tx: target_id.and_then(|id| H256::from_str(&id).ok()),
        },
        _ => DeliveryStatus::Pending,
    }
}

#[async_trait]
impl DeliveryOracle for OrbiterOracle {
    fn protocol(&self) -> BridgeProtocol {
        BridgeProtocol::Orbiter
    }

    async fn check(&self, message: &TrackedMessage) -> OrchestratorResult<DeliveryStatus> {
        let response = self
            .client
            .get(self.status_url(message.message_id))
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| query_error(self.protocol(), e))?;

        let body: StatusResponse = response
            .json()
            .await
            .map_err(|e| query_error(self.protocol(), e))?;

        Ok(parse_status(body))
    }
}
