//! Gas estimation with safety buffers

use crate::chain::{ChainProvider, GasPrice};
use crate::error::OrchestratorResult;

use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::U256;
use tracing::debug;

/// Gas estimator for wallet transactions
pub struct GasEstimator {
    /// Buffer percentage for gas limit (e.g., 20 = 20% buffer)
    gas_limit_buffer_percent: u64,
    /// Buffer percentage for gas price
    gas_price_buffer_percent: u64,
}

impl GasEstimator {
    pub fn new() -> Self {
        Self {
            gas_limit_buffer_percent: 20,
            gas_price_buffer_percent: 10,
        }
    }

    /// Estimate the gas limit for `tx` and add the buffer
    pub async fn estimate_gas_limit(
        &self,
        provider: &ChainProvider,
        tx: &TypedTransaction,
    ) -> OrchestratorResult<U256> {
        let estimate = provider.estimate_gas(tx).await?;
        let limit = self.buffer_limit(estimate);

        debug!(
            "Gas limit for chain {}: {} (estimate {})",
            provider.chain_id(),
            limit,
            estimate
        );
        Ok(limit)
    }

    /// Get buffered gas price for a chain
    pub async fn get_gas_price(&self, provider: &ChainProvider) -> OrchestratorResult<GasPrice> {
        let gas_price = provider.get_gas_price().await?;
        let buffered = self.buffer_price(gas_price);

        debug!("Gas price for chain {}: {:?}", provider.chain_id(), buffered);
        Ok(buffered)
    }

    fn buffer_limit(&self, estimate: U256) -> U256 {
        estimate + estimate * self.gas_limit_buffer_percent / 100
    }

    fn buffer_price(&self, gas_price: GasPrice) -> GasPrice {
        let bump = |value: U256| value + value * self.gas_price_buffer_percent / 100;

        match gas_price {
            GasPrice::Legacy(price) => GasPrice::Legacy(bump(price)),
            GasPrice::Eip1559 {
                max_fee_per_gas,
                max_priority_fee_per_gas,
            } => GasPrice::Eip1559 {
                max_fee_per_gas: bump(max_fee_per_gas),
                max_priority_fee_per_gas: bump(max_priority_fee_per_gas),
            },
        }
    }
}

impl Default for GasEstimator {
    fn default() -> Self {
        Self::new()
    }
}
