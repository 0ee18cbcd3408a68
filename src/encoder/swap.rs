//! Universal Router encoding for single-pool exact-input swaps

use crate::abi::{to_alloy_address, to_alloy_u256, IUniversalRouter};
use crate::quote::SwapRoute;
use crate::transaction::RawCall;

use alloy_primitives::Bytes as AlloyBytes;
use alloy_sol_types::{SolCall, SolValue};
use ethers::types::{Address, U256};

/// Universal Router command bytes
pub mod commands {
    pub const V3_SWAP_EXACT_IN: u8 = 0x00;
    pub const WRAP_ETH: u8 = 0x0b;
    pub const UNWRAP_WETH: u8 = 0x0c;
}

/// Recipient placeholders resolved by the router at execution time
pub mod recipients {
    use ethers::types::Address;

    pub fn msg_sender() -> Address {
        Address::from_low_u64_be(1)
    }

    pub fn address_this() -> Address {
        Address::from_low_u64_be(2)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SwapAmounts {
    pub amount_in: U256,
    pub min_amount_out: U256,
    pub deadline: u64,
}

/// V3 path: tokenIn ++ fee (uint24) ++ tokenOut
pub fn encode_path(route: &SwapRoute) -> Vec<u8> {
    let mut path = Vec::with_capacity(43);
    path.extend_from_slice(route.token_in.as_bytes());
    path.extend_from_slice(&route.fee.to_be_bytes()[1..]);
    path.extend_from_slice(route.token_out.as_bytes());
    path
}

/// Build `execute(commands, inputs, deadline)` for one exact-input swap.
///
/// Native input is wrapped by the router from `msg.value`, so the pool leg is
/// paid by the router rather than pulled through Permit2. Native output is
/// swapped into the router and unwrapped to the caller.
pub fn encode_exact_input(
    router: Address,
    route: &SwapRoute,
    amounts: SwapAmounts,
    native_in: bool,
    native_out: bool,
) -> RawCall {
    let mut command_bytes = Vec::with_capacity(3);
    let mut inputs: Vec<AlloyBytes> = Vec::with_capacity(3);

    if native_in {
        command_bytes.push(commands::WRAP_ETH);
        inputs.push(
            (
                to_alloy_address(recipients::address_this()),
                to_alloy_u256(amounts.amount_in),
            )
                .abi_encode_params()
                .into(),
        );
    }

    let swap_recipient = if native_out {
        recipients::address_this()
    } else {
        recipients::msg_sender()
    };
    command_bytes.push(commands::V3_SWAP_EXACT_IN);
    inputs.push(
        (
            to_alloy_address(swap_recipient),
            to_alloy_u256(amounts.amount_in),
            to_alloy_u256(amounts.min_amount_out),
            AlloyBytes::from(encode_path(route)),
            !native_in,
        )
            .abi_encode_params()
            .into(),
    );

    if native_out {
        command_bytes.push(commands::UNWRAP_WETH);
        inputs.push(
            (
                to_alloy_address(recipients::msg_sender()),
                to_alloy_u256(amounts.min_amount_out),
            )
                .abi_encode_params()
                .into(),
        );
    }

    let call = IUniversalRouter::executeCall {
        commands: command_bytes.into(),
        inputs,
        deadline: alloy_primitives::U256::from(amounts.deadline),
    };

    RawCall {
        chain_id: route.chain_id,
        to: router,
        data: call.abi_encode().into(),
        value: if native_in { amounts.amount_in } else { U256::zero() },
    }
}
