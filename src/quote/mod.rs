//! Quote oracle - expected output of a same-chain swap

pub mod uniswap;

pub use uniswap::UniswapQuoter;

use crate::error::OrchestratorResult;
use crate::transaction::Currency;

use async_trait::async_trait;
use ethers::types::{Address, U256};
use serde::Serialize;

/// Single-pool route a quote was found on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SwapRoute {
    pub chain_id: u64,
    /// Pool input token; WETH when the input currency is native
    pub token_in: Address,
    pub token_out: Address,
    /// Pool fee in hundredths of a bip
    pub fee: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Quote {
    pub amount_out: U256,
    pub route: SwapRoute,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait QuoteOracle: Send + Sync {
    /// Quote `amount_in` of `currency_in` into `currency_out` on their shared chain
    async fn quote(
        &self,
        currency_in: &Currency,
        currency_out: &Currency,
        amount_in: U256,
    ) -> OrchestratorResult<Quote>;
}
