//! Call encoding for the origin transaction of each transaction type
//!
//! The encoder only turns an already-classified, already-quoted transaction
//! into calldata. `Ok(None)` means the type cannot be built with the
//! configured contracts.

pub mod approval;
pub mod bridge;
pub mod swap;

use crate::chain::Readers;
use crate::config::{parse_address, Settings};
use crate::error::OrchestratorResult;
use crate::quote::SwapRoute;
use crate::transaction::{BridgeProtocol, BridgeRegistry, RawCall, TransactionType};

use async_trait::async_trait;
use ethers::types::{Address, U256};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Everything the encoder needs beyond the transaction type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildParams {
    pub sender: Address,
    pub recipient: Address,
    pub amount_in: U256,
    /// Slippage-adjusted minimum output of the swap leg
    pub min_amount_out: U256,
    /// Pool route of the swap leg, when the type has one
    pub route: Option<SwapRoute>,
    /// Unix timestamp after which the swap must not execute
    pub deadline: u64,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CallEncoder: Send + Sync {
    async fn build_transaction(
        &self,
        transaction_type: &TransactionType,
        params: &BuildParams,
    ) -> OrchestratorResult<Option<RawCall>>;
}

/// Swap and approval contracts of one chain
#[derive(Debug, Clone)]
pub struct ChainContracts {
    pub universal_router: Option<Address>,
    pub permit2: Address,
}

/// Per-chain contracts of every enabled chain
pub fn load_contracts(settings: &Settings) -> OrchestratorResult<HashMap<u64, ChainContracts>> {
    let mut contracts = HashMap::new();
    for (_, chain) in settings.enabled_chains() {
        let universal_router = chain
            .contracts
            .universal_router
            .as_deref()
            .map(parse_address)
            .transpose()?;
        contracts.insert(
            chain.chain_id,
            ChainContracts {
                universal_router,
                permit2: parse_address(&chain.contracts.permit2)?,
            },
        );
    }
    Ok(contracts)
}

/// Encodes against the Universal Router, Hyperlane warp routes and the
/// Superchain token bridge
pub struct EvmCallEncoder {
    contracts: HashMap<u64, ChainContracts>,
    registry: Arc<BridgeRegistry>,
    readers: Readers,
}

impl EvmCallEncoder {
    pub fn new(
        contracts: HashMap<u64, ChainContracts>,
        registry: Arc<BridgeRegistry>,
        readers: Readers,
    ) -> Self {
        Self {
            contracts,
            registry,
            readers,
        }
    }

    pub fn contracts_on(&self, chain_id: u64) -> Option<&ChainContracts> {
        self.contracts.get(&chain_id)
    }
}

#[async_trait]
impl CallEncoder for EvmCallEncoder {
    async fn build_transaction(
        &self,
        transaction_type: &TransactionType,
        params: &BuildParams,
    ) -> OrchestratorResult<Option<RawCall>> {
        match transaction_type {
            TransactionType::Swap {
                currency_in,
                currency_out,
                chain_id,
                ..
            } => {
                let router = self
                    .contracts
                    .get(chain_id)
                    .and_then(|c| c.universal_router);
                let (Some(router), Some(route)) = (router, params.route) else {
                    debug!("No router or route for swap on chain {}", chain_id);
                    return Ok(None);
                };

                Ok(Some(swap::encode_exact_input(
                    router,
                    &route,
                    swap::SwapAmounts {
                        amount_in: params.amount_in,
                        min_amount_out: params.min_amount_out,
                        deadline: params.deadline,
                    },
                    currency_in.is_native(),
                    currency_out.is_native(),
                )))
            }

            TransactionType::Bridge {
                currency_in,
                chain_out,
                protocol,
                ..
            } => {
                let Some(route) = self.registry.route_for(*protocol, currency_in) else {
                    return Ok(None);
                };

                match protocol {
                    BridgeProtocol::Superchain => Ok(Some(bridge::encode_superchain_send(
                        currency_in,
                        *chain_out,
                        params.recipient,
                        params.amount_in,
                    ))),
                    BridgeProtocol::Hyperlane => {
                        bridge::encode_hyperlane_transfer(
                            &self.readers,
                            route,
                            currency_in,
                            *chain_out,
                            params.recipient,
                            params.amount_in,
                        )
                        .await
                    }
                    BridgeProtocol::Stargate | BridgeProtocol::Orbiter => {
                        debug!("No {} encoder", protocol);
                        Ok(None)
                    }
                }
            }

            // Composite routes need a destination-side executor
            TransactionType::BridgeSwap { .. } | TransactionType::SwapBridge { .. } => {
                debug!("Cannot build {} on-chain call", transaction_type.name());
                Ok(None)
            }
        }
    }
}
