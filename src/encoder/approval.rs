//! Allowance reads and approval calls
//!
//! Swaps pull the input token through Permit2: the token approves Permit2,
//! and Permit2 approves the Universal Router. Hyperlane collateral routes
//! pull the token straight into the warp route.

use crate::abi::{from_alloy_u256, to_alloy_address, to_alloy_u256, uint160_max, IPermit2, IERC20};
use crate::chain::ChainReader;
use crate::error::{OrchestratorError, OrchestratorResult};
use crate::transaction::RawCall;

use alloy_sol_types::SolCall;
use ethers::types::{Address, U256};

/// How long a Permit2 sub-allowance stays valid
pub const PERMIT2_EXPIRATION_SECS: u64 = 30 * 24 * 60 * 60;

pub async fn erc20_allowance(
    reader: &dyn ChainReader,
    token: Address,
    owner: Address,
    spender: Address,
) -> OrchestratorResult<U256> {
    let call = IERC20::allowanceCall {
        owner: to_alloy_address(owner),
        spender: to_alloy_address(spender),
    };
    let output = reader.call(token, call.abi_encode().into()).await?;

    IERC20::allowanceCall::abi_decode_returns(&output, true)
        .map(|r| from_alloy_u256(r._0))
        .map_err(|e| OrchestratorError::Internal(format!("allowance decode: {}", e)))
}

/// Permit2 allowance of `owner` toward `spender`; zero once expired
pub async fn permit2_allowance(
    reader: &dyn ChainReader,
    permit2: Address,
    owner: Address,
    token: Address,
    spender: Address,
    now: u64,
) -> OrchestratorResult<U256> {
    let call = IPermit2::allowanceCall {
        user: to_alloy_address(owner),
        token: to_alloy_address(token),
        spender: to_alloy_address(spender),
    };
    let output = reader.call(permit2, call.abi_encode().into()).await?;
    let allowance = IPermit2::allowanceCall::abi_decode_returns(&output, true)
        .map_err(|e| OrchestratorError::Internal(format!("permit2 allowance decode: {}", e)))?;

    if allowance.expiration <= now {
        return Ok(U256::zero());
    }

    Ok(from_alloy_u256(allowance.amount))
}

pub fn erc20_approve(chain_id: u64, token: Address, spender: Address) -> RawCall {
    let call = IERC20::approveCall {
        spender: to_alloy_address(spender),
        amount: to_alloy_u256(U256::MAX),
    };

    RawCall {
        chain_id,
        to: token,
        data: call.abi_encode().into(),
        value: U256::zero(),
    }
}

/// Permit2 sub-allowance for `spender`, maxed and expiring `PERMIT2_EXPIRATION_SECS` from `now`
pub fn permit2_approve(
    chain_id: u64,
    permit2: Address,
    token: Address,
    spender: Address,
    now: u64,
) -> RawCall {
    let call = IPermit2::approveCall {
        token: to_alloy_address(token),
        spender: to_alloy_address(spender),
        amount: uint160_max(),
        expiration: now + PERMIT2_EXPIRATION_SECS,
    };

    RawCall {
        chain_id,
        to: permit2,
        data: call.abi_encode().into(),
        value: U256::zero(),
    }
}
