//! Chain module - read and write access to every configured chain
//!
//! This module provides:
//! - Multi-RPC provider management with automatic failover
//! - A `ChainReader` seam used by quoting, allowance checks and delivery oracles
//! - Health monitoring

pub mod provider;

pub use provider::{ChainProvider, GasPrice};

use crate::config::Settings;
use crate::error::{OrchestratorError, OrchestratorResult};

use async_trait::async_trait;
use dashmap::DashMap;
use futures::future::join_all;
use ethers::types::{Address, Bytes, Filter, Log, TransactionReceipt, H256};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

/// Read-only view of one chain
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChainReader: Send + Sync {
    fn chain_id(&self) -> u64;

    async fn block_number(&self) -> OrchestratorResult<u64>;

    /// `eth_call` against the latest block
    async fn call(&self, to: Address, data: Bytes) -> OrchestratorResult<Bytes>;

    async fn get_logs(&self, filter: &Filter) -> OrchestratorResult<Vec<Log>>;

    async fn get_transaction_receipt(
        &self,
        tx_hash: H256,
    ) -> OrchestratorResult<Option<TransactionReceipt>>;
}

/// Readers keyed by chain ID
pub type Readers = HashMap<u64, Arc<dyn ChainReader>>;

/// Look up the reader for `chain_id`
pub fn reader_for(readers: &Readers, chain_id: u64) -> OrchestratorResult<Arc<dyn ChainReader>> {
    readers
        .get(&chain_id)
        .cloned()
        .ok_or(OrchestratorError::ChainNotFound { chain_id })
}

/// Manages connections to all configured chains
pub struct ChainManager {
    /// Chain providers indexed by chain ID
    providers: DashMap<u64, Arc<ChainProvider>>,
}

impl ChainManager {
    /// Create a provider for every enabled chain
    pub fn new(settings: &Settings) -> OrchestratorResult<Self> {
        let providers = DashMap::new();

        for (_, chain_config) in settings.enabled_chains() {
            info!(
                "Initializing chain {} (ID: {})",
                chain_config.name, chain_config.chain_id
            );

            let provider = ChainProvider::new(chain_config.clone())?;
            providers.insert(chain_config.chain_id, Arc::new(provider));
        }

        Ok(Self { providers })
    }

    /// Get provider for a specific chain
    pub fn get_provider(&self, chain_id: u64) -> OrchestratorResult<Arc<ChainProvider>> {
        self.providers
            .get(&chain_id)
            .map(|p| p.clone())
            .ok_or(OrchestratorError::ChainNotFound { chain_id })
    }

    /// Read handles for every connected chain
    pub fn readers(&self) -> Readers {
        self.providers
            .iter()
            .map(|entry| {
                let reader: Arc<dyn ChainReader> = entry.value().clone();
                (*entry.key(), reader)
            })
            .collect()
    }

    /// Health check for all chains
    pub async fn health_check(&self) -> Vec<(u64, bool)> {
        let providers: Vec<_> = self.providers.iter().map(|e| e.value().clone()).collect();

        let checks = providers.iter().map(|provider| async move {
            let healthy = provider.health_check().await;
            crate::metrics::record_chain_health(provider.chain_id(), healthy);
            (provider.chain_id(), healthy)
        });

        let mut results = join_all(checks).await;
        results.sort_unstable_by_key(|(chain_id, _)| *chain_id);
        results
    }

    /// Get all connected chain IDs
    pub fn connected_chains(&self) -> Vec<u64> {
        let mut chains: Vec<u64> = self.providers.iter().map(|e| *e.key()).collect();
        chains.sort_unstable();
        chains
    }
}
