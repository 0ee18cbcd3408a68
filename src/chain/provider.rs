//! Per-chain RPC access for submission, receipts and delivery lookups

use super::ChainReader;
use crate::config::{ChainConfig, ContractsConfig, GasPriceStrategy};
use crate::error::{OrchestratorError, OrchestratorResult};

use async_trait::async_trait;
use ethers::prelude::*;
use ethers::providers::{Http, Provider};
use ethers::types::transaction::eip2718::TypedTransaction;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::{debug, error, warn};

/// One chain's RPC endpoints, rotated on failure
pub struct ChainProvider {
    /// Chain configuration
    config: ChainConfig,
    /// Configured endpoints, in priority order
    http_providers: Vec<Provider<Http>>,
    /// Index of the endpoint in use
    current_provider: AtomicUsize,
}

impl ChainProvider {
    /// Create a new chain provider. No request is made until first use.
    pub fn new(config: ChainConfig) -> OrchestratorResult<Self> {
        let mut http_providers = Vec::new();

        for url in &config.rpc_urls {
            match Provider::<Http>::try_from(url.as_str()) {
                Ok(provider) => {
                    let provider = provider.interval(Duration::from_millis(100));
                    http_providers.push(provider);
                    debug!("Added HTTP provider for chain {}: {}", config.chain_id, url);
                }
                Err(e) => {
                    warn!("Failed to create provider for {}: {}", url, e);
                }
            }
        }

        if http_providers.is_empty() {
            return Err(OrchestratorError::ChainConnection {
                chain_id: config.chain_id,
                message: "No valid RPC providers".to_string(),
            });
        }

        Ok(Self {
            config,
            http_providers,
            current_provider: AtomicUsize::new(0),
        })
    }

    /// Endpoint currently in use
    pub fn http(&self) -> &Provider<Http> {
        let idx = self.current_provider.load(Ordering::Relaxed);
        &self.http_providers[idx % self.http_providers.len()]
    }

    /// Rotate to the next endpoint
    pub fn failover(&self) {
        let current = self.current_provider.load(Ordering::Relaxed);
        let next = (current + 1) % self.http_providers.len();
        self.current_provider.store(next, Ordering::Relaxed);
        warn!("Chain {} failover to provider {}", self.config.chain_id, next);
    }

    /// Latest block number, trying each endpoint once
    pub async fn get_block_number(&self) -> OrchestratorResult<u64> {
        for _ in 0..self.http_providers.len() {
            match self.http().get_block_number().await {
                Ok(block) => return Ok(block.as_u64()),
                Err(e) => {
                    warn!(
                        "Failed to get block number from chain {}: {}",
                        self.config.chain_id, e
                    );
                    self.failover();
                }
            }
        }

        Err(OrchestratorError::ChainConnection {
            chain_id: self.config.chain_id,
            message: "All providers failed".to_string(),
        })
    }

    /// Get logs for a filter
    pub async fn get_logs(&self, filter: &Filter) -> OrchestratorResult<Vec<Log>> {
        for _ in 0..self.http_providers.len() {
            match self.http().get_logs(filter).await {
                Ok(logs) => return Ok(logs),
                Err(e) => {
                    warn!("Failed to get logs from chain {}: {}", self.config.chain_id, e);
                    self.failover();
                }
            }
        }

        Err(OrchestratorError::ChainConnection {
            chain_id: self.config.chain_id,
            message: "All providers failed to get logs".to_string(),
        })
    }

    /// Receipt by hash; `None` while pending
    pub async fn get_transaction_receipt(
        &self,
        tx_hash: H256,
    ) -> OrchestratorResult<Option<TransactionReceipt>> {
        self.http()
            .get_transaction_receipt(tx_hash)
            .await
            .map_err(|e| self.connection_error(e))
    }

    /// Read-only contract call. Reverts surface as errors.
    pub async fn call(&self, to: Address, data: Bytes) -> OrchestratorResult<Bytes> {
        let tx: TypedTransaction = TransactionRequest::new().to(to).data(data).into();

        self.http()
            .call(&tx, None)
            .await
            .map_err(|e| self.connection_error(e))
    }

    /// Get the on-chain transaction count for `address`
    pub async fn get_transaction_count(&self, address: Address) -> OrchestratorResult<u64> {
        self.http()
            .get_transaction_count(address, None)
            .await
            .map(|n| n.as_u64())
            .map_err(|e| OrchestratorError::Nonce {
                chain_id: self.config.chain_id,
                message: e.to_string(),
            })
    }

    /// Gas estimate for a call
    pub async fn estimate_gas(&self, tx: &TypedTransaction) -> OrchestratorResult<U256> {
        self.http()
            .estimate_gas(tx, None)
            .await
            .map_err(|e| OrchestratorError::GasEstimation(e.to_string()))
    }

    /// Gas price per the chain's configured strategy
    pub async fn get_gas_price(&self) -> OrchestratorResult<GasPrice> {
        match self.config.gas_price_strategy {
            GasPriceStrategy::Legacy | GasPriceStrategy::Arbitrum => {
                let price = self
                    .http()
                    .get_gas_price()
                    .await
                    .map_err(|e| OrchestratorError::GasEstimation(e.to_string()))?;
                Ok(GasPrice::Legacy(std::cmp::min(price, self.max_gas_price())))
            }
            GasPriceStrategy::Eip1559 | GasPriceStrategy::Optimism => {
                let (max_fee, priority_fee) = self.estimate_eip1559_fees().await?;
                Ok(GasPrice::Eip1559 {
                    max_fee_per_gas: max_fee,
                    max_priority_fee_per_gas: priority_fee,
                })
            }
        }
    }

    /// Max fee and priority fee from the latest base fee
    async fn estimate_eip1559_fees(&self) -> OrchestratorResult<(U256, U256)> {
        let block = self
            .http()
            .get_block(BlockNumber::Latest)
            .await
            .map_err(|e| OrchestratorError::GasEstimation(e.to_string()))?
            .ok_or_else(|| OrchestratorError::GasEstimation("No latest block".to_string()))?;

        let base_fee = block
            .base_fee_per_gas
            .ok_or_else(|| OrchestratorError::GasEstimation("No base fee in block".to_string()))?;

        let priority_fee = match self.config.gas_price_strategy {
            // OP Stack sequencers accept a token tip
            GasPriceStrategy::Optimism => U256::from(1_000_000u64),
            _ => U256::from(2_000_000_000u64),
        };

        // max fee covers a doubled base fee
        let max_fee = std::cmp::min(base_fee * 2 + priority_fee, self.max_gas_price());
        let priority_fee = std::cmp::min(priority_fee, max_fee);

        Ok((max_fee, priority_fee))
    }

    fn max_gas_price(&self) -> U256 {
        U256::from(self.config.max_gas_price_gwei) * U256::from(1_000_000_000u64)
    }

    /// Health check
    pub async fn health_check(&self) -> bool {
        match self.get_block_number().await {
            Ok(_) => true,
            Err(e) => {
                error!("Health check failed for chain {}: {}", self.config.chain_id, e);
                false
            }
        }
    }

    /// Get chain ID
    pub fn chain_id(&self) -> u64 {
        self.config.chain_id
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Get configured contract addresses
    pub fn contracts(&self) -> &ContractsConfig {
        &self.config.contracts
    }

    /// Blocks a receipt must be buried under
    pub fn confirmation_blocks(&self) -> u64 {
        self.config.confirmation_blocks
    }

    fn connection_error(&self, e: impl std::fmt::Display) -> OrchestratorError {
        OrchestratorError::ChainConnection {
            chain_id: self.config.chain_id,
            message: e.to_string(),
        }
    }
}

#[async_trait]
impl ChainReader for ChainProvider {
    fn chain_id(&self) -> u64 {
        self.config.chain_id
    }

    async fn block_number(&self) -> OrchestratorResult<u64> {
        self.get_block_number().await
    }

    async fn call(&self, to: Address, data: Bytes) -> OrchestratorResult<Bytes> {
        ChainProvider::call(self, to, data).await
    }

    async fn get_logs(&self, filter: &Filter) -> OrchestratorResult<Vec<Log>> {
        ChainProvider::get_logs(self, filter).await
    }

    async fn get_transaction_receipt(
        &self,
        tx_hash: H256,
    ) -> OrchestratorResult<Option<TransactionReceipt>> {
        ChainProvider::get_transaction_receipt(self, tx_hash).await
    }
}

/// Gas price types
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GasPrice {
    Legacy(U256),
    Eip1559 {
        max_fee_per_gas: U256,
        max_priority_fee_per_gas: U256,
    },
}
