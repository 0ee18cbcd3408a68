//! Bridge-leg encoding: Hyperlane warp routes and the Superchain token bridge

use crate::abi::{
    address_to_bytes32, from_alloy_u256, predeploys, to_alloy_address, to_alloy_u256,
    IHyperlaneTokenRouter, ISuperchainTokenBridge,
};
use crate::chain::{reader_for, Readers};
use crate::error::{OrchestratorError, OrchestratorResult};
use crate::transaction::{BridgeRoute, Currency, RawCall};

use alloy_sol_types::SolCall;
use ethers::types::{Address, U256};
use tracing::debug;

/// `SuperchainTokenBridge.sendERC20` on the origin chain. The bridge burns
/// from the caller, so no allowance is involved.
pub fn encode_superchain_send(
    currency_in: &Currency,
    chain_out: u64,
    recipient: Address,
    amount: U256,
) -> RawCall {
    let call = ISuperchainTokenBridge::sendERC20Call {
        token: to_alloy_address(currency_in.address),
        to: to_alloy_address(recipient),
        amount: to_alloy_u256(amount),
        chainId: alloy_primitives::U256::from(chain_out),
    };

    RawCall {
        chain_id: currency_in.chain_id,
        to: predeploys::SUPERCHAIN_TOKEN_BRIDGE,
        data: call.abi_encode().into(),
        value: U256::zero(),
    }
}

/// `transferRemote` on the origin warp route, paying the quoted interchain gas.
///
/// Hyperlane domains of the supported EVM chains equal their chain IDs.
pub async fn encode_hyperlane_transfer(
    readers: &Readers,
    route: &BridgeRoute,
    currency_in: &Currency,
    chain_out: u64,
    recipient: Address,
    amount: U256,
) -> OrchestratorResult<Option<RawCall>> {
    let chain_in = currency_in.chain_id;
    let Some(router) = route.router_on(chain_in) else {
        debug!("No {} warp route on chain {}", route.asset, chain_in);
        return Ok(None);
    };
    let domain = u32::try_from(chain_out).map_err(|_| {
        OrchestratorError::NoRoute(format!("Chain {} has no Hyperlane domain", chain_out))
    })?;

    let reader = reader_for(readers, chain_in)?;
    let quote = IHyperlaneTokenRouter::quoteGasPaymentCall {
        destination: domain,
    };
    let output = reader.call(router, quote.abi_encode().into()).await?;
    let gas_payment = IHyperlaneTokenRouter::quoteGasPaymentCall::abi_decode_returns(&output, true)
        .map(|r| from_alloy_u256(r._0))
        .map_err(|e| OrchestratorError::Quote(format!("Interchain gas quote: {}", e)))?;

    let call = IHyperlaneTokenRouter::transferRemoteCall {
        destination: domain,
        recipient: address_to_bytes32(recipient),
        amount: to_alloy_u256(amount),
    };

    // Native warp routes take the bridged amount as value too
    let value = if currency_in.is_native() {
        gas_payment + amount
    } else {
        gas_payment
    };

    Ok(Some(RawCall {
        chain_id: chain_in,
        to: router,
        data: call.abi_encode().into(),
        value,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::{ChainReader, MockChainReader};
    use crate::transaction::fixtures::token;
    use crate::transaction::BridgeProtocol;
    use alloy_sol_types::SolValue;
    use ethers::types::H160;
    use std::sync::Arc;

    const ROUTER: Address = H160([0x11; 20]);

    fn usdc_route() -> BridgeRoute {
        BridgeRoute {
            asset: "USDC".to_string(),
            protocol: BridgeProtocol::Hyperlane,
            decimals: 6,
            tokens: [(1u64, H160([0xa1; 20])), (10u64, H160([0xa2; 20]))]
                .into_iter()
                .collect(),
            routers: [(1u64, ROUTER)].into_iter().collect(),
        }
    }

    #[tokio::test]
    async fn test_hyperlane_transfer_pays_quoted_gas() {
        let mut reader = MockChainReader::new();
        reader.expect_call().returning(|to, data| {
            assert_eq!(to, ROUTER);
            let quote = IHyperlaneTokenRouter::quoteGasPaymentCall::abi_decode(&data, true).unwrap();
            assert_eq!(quote.destination, 10);
            Ok(alloy_primitives::U256::from(42u64).abi_encode().into())
        });
        let reader: Arc<dyn ChainReader> = Arc::new(reader);
        let readers: Readers = [(1u64, reader)].into_iter().collect();

        let call = encode_hyperlane_transfer(
            &readers,
            &usdc_route(),
            &token(1, 0xa1, "USDC"),
            10,
            Address::repeat_byte(0x05),
            U256::from(1_000_000u64),
        )
        .await
        .unwrap()
        .unwrap();

        assert_eq!(call.to, ROUTER);
        assert_eq!(call.value, U256::from(42u64));

        let transfer = IHyperlaneTokenRouter::transferRemoteCall::abi_decode(&call.data, true).unwrap();
        assert_eq!(transfer.recipient, address_to_bytes32(Address::repeat_byte(0x05)));
        assert_eq!(transfer.amount, alloy_primitives::U256::from(1_000_000u64));
    }

    #[tokio::test]
    async fn test_hyperlane_without_origin_deployment_cannot_build() {
        let built = encode_hyperlane_transfer(
            &Readers::new(),
            &usdc_route(),
            &token(8453, 0xa1, "USDC"),
            10,
            Address::repeat_byte(0x05),
            U256::one(),
        )
        .await
        .unwrap();
        assert!(built.is_none());
    }

    #[test]
    fn test_superchain_send_targets_bridge_predeploy() {
        let call = encode_superchain_send(
            &token(10, 0x33, "SUPR"),
            8453,
            Address::repeat_byte(0x05),
            U256::from(7u64),
        );

        assert_eq!(call.chain_id, 10);
        assert_eq!(call.to, predeploys::SUPERCHAIN_TOKEN_BRIDGE);
        let send = ISuperchainTokenBridge::sendERC20Call::abi_decode(&call.data, true).unwrap();
        assert_eq!(send.chainId, alloy_primitives::U256::from(8453u64));
    }
}
