//! Uniswap V3 QuoterV2 over the configured fee tiers

use super::{Quote, QuoteOracle, SwapRoute};
use crate::abi::{from_alloy_u256, to_alloy_address, to_alloy_u256, IQuoterV2};
use crate::chain::{reader_for, Readers};
use crate::config::{parse_address, Settings};
use crate::error::{OrchestratorError, OrchestratorResult};
use crate::transaction::Currency;

use alloy_sol_types::SolCall;
use async_trait::async_trait;
use ethers::types::{Address, U256};
use std::collections::HashMap;
use tracing::debug;

/// Quoting contracts of one chain
#[derive(Debug, Clone)]
pub struct QuoterDeployment {
    pub quoter: Address,
    pub weth: Address,
    pub fee_tiers: Vec<u32>,
}

pub struct UniswapQuoter {
    readers: Readers,
    deployments: HashMap<u64, QuoterDeployment>,
}

impl UniswapQuoter {
    pub fn new(readers: Readers, deployments: HashMap<u64, QuoterDeployment>) -> Self {
        Self {
            readers,
            deployments,
        }
    }

    /// Chains without both a quoter and WETH configured cannot be quoted on
    pub fn from_settings(settings: &Settings, readers: Readers) -> OrchestratorResult<Self> {
        let mut deployments = HashMap::new();

        for (_, chain) in settings.enabled_chains() {
            let contracts = &chain.contracts;
            if let (Some(quoter), Some(weth)) = (&contracts.quoter, &contracts.weth) {
                deployments.insert(
                    chain.chain_id,
                    QuoterDeployment {
                        quoter: parse_address(quoter)?,
                        weth: parse_address(weth)?,
                        fee_tiers: contracts.fee_tiers.clone(),
                    },
                );
            }
        }

        Ok(Self::new(readers, deployments))
    }

    fn pool_token(currency: &Currency, deployment: &QuoterDeployment) -> Address {
        if currency.is_native() {
            deployment.weth
        } else {
            currency.address
        }
    }
}

#[async_trait]
impl QuoteOracle for UniswapQuoter {
    async fn quote(
        &self,
        currency_in: &Currency,
        currency_out: &Currency,
        amount_in: U256,
    ) -> OrchestratorResult<Quote> {
        let chain_id = currency_in.chain_id;
        if currency_out.chain_id != chain_id {
            return Err(OrchestratorError::Quote(format!(
                "{} and {} are on different chains",
                currency_in, currency_out
            )));
        }

        let deployment = self
            .deployments
            .get(&chain_id)
            .ok_or_else(|| OrchestratorError::NoRoute(format!("No quoter on chain {}", chain_id)))?;
        let reader = reader_for(&self.readers, chain_id)?;

        let token_in = Self::pool_token(currency_in, deployment);
        let token_out = Self::pool_token(currency_out, deployment);
        if token_in == token_out {
            return Err(OrchestratorError::Quote(format!(
                "{} and {} trade through the same pool token",
                currency_in, currency_out
            )));
        }

        let mut best: Option<Quote> = None;

        for &fee in &deployment.fee_tiers {
            let call = IQuoterV2::quoteExactInputSingleCall {
                params: IQuoterV2::QuoteExactInputSingleParams {
                    tokenIn: to_alloy_address(token_in),
                    tokenOut: to_alloy_address(token_out),
                    amountIn: to_alloy_u256(amount_in),
                    fee,
                    sqrtPriceLimitX96: alloy_primitives::U256::ZERO,
                },
            };

            // Tiers without a pool revert; skip them
            let output = match reader.call(deployment.quoter, call.abi_encode().into()).await {
                Ok(output) => output,
                Err(e) => {
                    debug!("No quote for {} -> {} at fee {}: {}", currency_in, currency_out, fee, e);
                    continue;
                }
            };

            let amount_out = IQuoterV2::quoteExactInputSingleCall::abi_decode_returns(&output, true)
                .map(|r| from_alloy_u256(r.amountOut))
                .map_err(|e| OrchestratorError::Quote(e.to_string()))?;

            if amount_out.is_zero() || best.map_or(false, |b| b.amount_out >= amount_out) {
                continue;
            }

            best = Some(Quote {
                amount_out,
                route: SwapRoute {
                    chain_id,
                    token_in,
                    token_out,
                    fee,
                },
            });
        }

        best.ok_or_else(|| {
            OrchestratorError::NoRoute(format!("No pool for {} -> {}", currency_in, currency_out))
        })
    }
}
