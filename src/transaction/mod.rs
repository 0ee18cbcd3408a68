//! Transaction types and the decisions made before anything is submitted
//!
//! - Currency and bridge-protocol vocabulary
//! - Classification of a currency pair into SWAP / BRIDGE / BRIDGE_SWAP / SWAP_BRIDGE
//! - Planning of the next user action and of the progress step sequence

pub mod classifier;
pub mod planner;

pub use classifier::{BridgeRegistry, BridgeRoute};
pub use planner::{initialize_transaction_steps, next_step, requires_allowance, step_sequence};

use crate::state::StepId;

use ethers::types::{Address, Bytes, U256};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A token or native asset on a specific chain. Native assets use the zero address.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Currency {
    pub chain_id: u64,
    pub address: Address,
    pub symbol: String,
    pub decimals: u8,
}

impl Currency {
    pub fn is_native(&self) -> bool {
        self.address.is_zero()
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.symbol, self.chain_id)
    }
}

/// Cross-chain messaging protocol carrying a bridge leg
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BridgeProtocol {
    Superchain,
    Hyperlane,
    Stargate,
    Orbiter,
}

impl BridgeProtocol {
    pub fn name(&self) -> &'static str {
        match self {
            BridgeProtocol::Superchain => "superchain",
            BridgeProtocol::Hyperlane => "hyperlane",
            BridgeProtocol::Stargate => "stargate",
            BridgeProtocol::Orbiter => "orbiter",
        }
    }
}

impl fmt::Display for BridgeProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// What a currency pair requires to move value from input to output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionType {
    /// Same-chain swap
    #[serde(rename_all = "camelCase")]
    Swap {
        currency_in: Currency,
        currency_out: Currency,
        chain_id: u64,
        with_superchain: bool,
    },

    /// Move the same logical asset to another chain
    #[serde(rename_all = "camelCase")]
    Bridge {
        currency_in: Currency,
        currency_out: Currency,
        chain_in: u64,
        chain_out: u64,
        protocol: BridgeProtocol,
        with_superchain: bool,
    },

    /// Bridge `currency_in`, then swap the bridged token into `currency_out` on arrival
    #[serde(rename_all = "camelCase")]
    BridgeSwap {
        currency_in: Currency,
        currency_out: Currency,
        chain_in: u64,
        chain_out: u64,
        bridged: Currency,
        protocol: BridgeProtocol,
        with_superchain: bool,
    },

    /// Swap `currency_in` into the bridgeable token on origin, then bridge it
    #[serde(rename_all = "camelCase")]
    SwapBridge {
        currency_in: Currency,
        currency_out: Currency,
        chain_in: u64,
        chain_out: u64,
        bridged: Currency,
        protocol: BridgeProtocol,
        with_superchain: bool,
    },
}

impl TransactionType {
    pub fn currency_in(&self) -> &Currency {
        match self {
            TransactionType::Swap { currency_in, .. }
            | TransactionType::Bridge { currency_in, .. }
            | TransactionType::BridgeSwap { currency_in, .. }
            | TransactionType::SwapBridge { currency_in, .. } => currency_in,
        }
    }

    pub fn currency_out(&self) -> &Currency {
        match self {
            TransactionType::Swap { currency_out, .. }
            | TransactionType::Bridge { currency_out, .. }
            | TransactionType::BridgeSwap { currency_out, .. }
            | TransactionType::SwapBridge { currency_out, .. } => currency_out,
        }
    }

    /// Chain the user signs on
    pub fn chain_in(&self) -> u64 {
        match self {
            TransactionType::Swap { chain_id, .. } => *chain_id,
            TransactionType::Bridge { chain_in, .. }
            | TransactionType::BridgeSwap { chain_in, .. }
            | TransactionType::SwapBridge { chain_in, .. } => *chain_in,
        }
    }

    /// Chain the output currency lives on
    pub fn chain_out(&self) -> u64 {
        match self {
            TransactionType::Swap { chain_id, .. } => *chain_id,
            TransactionType::Bridge { chain_out, .. }
            | TransactionType::BridgeSwap { chain_out, .. }
            | TransactionType::SwapBridge { chain_out, .. } => *chain_out,
        }
    }

    pub fn with_superchain(&self) -> bool {
        match self {
            TransactionType::Swap {
                with_superchain, ..
            }
            | TransactionType::Bridge {
                with_superchain, ..
            }
            | TransactionType::BridgeSwap {
                with_superchain, ..
            }
            | TransactionType::SwapBridge {
                with_superchain, ..
            } => *with_superchain,
        }
    }

    /// Bridge protocol of the cross-chain leg, if any
    pub fn protocol(&self) -> Option<BridgeProtocol> {
        match self {
            TransactionType::Swap { .. } => None,
            TransactionType::Bridge { protocol, .. }
            | TransactionType::BridgeSwap { protocol, .. }
            | TransactionType::SwapBridge { protocol, .. } => Some(*protocol),
        }
    }

    /// The intermediate bridgeable token of a composite transaction
    pub fn bridged(&self) -> Option<&Currency> {
        match self {
            TransactionType::BridgeSwap { bridged, .. }
            | TransactionType::SwapBridge { bridged, .. } => Some(bridged),
            _ => None,
        }
    }

    /// Step that the origin-chain transaction hash is recorded under
    pub fn origin_step(&self) -> StepId {
        match self {
            TransactionType::Swap { .. } | TransactionType::SwapBridge { .. } => StepId::Swap,
            TransactionType::Bridge { .. } | TransactionType::BridgeSwap { .. } => {
                StepId::SendOrigin
            }
        }
    }

    /// Get type name for logs and metrics
    pub fn name(&self) -> &'static str {
        match self {
            TransactionType::Swap { .. } => "SWAP",
            TransactionType::Bridge { .. } => "BRIDGE",
            TransactionType::BridgeSwap { .. } => "BRIDGE_SWAP",
            TransactionType::SwapBridge { .. } => "SWAP_BRIDGE",
        }
    }
}

/// Next action the user can trigger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SwapStep {
    ApprovePermit2,
    ExecuteSwap,
}

/// An encoded on-chain call, ready for the wallet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawCall {
    pub chain_id: u64,
    pub to: Address,
    pub data: Bytes,
    pub value: U256,
}


#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;

    #[test]
    fn test_origin_step_per_type() {
        assert_eq!(swap(1).origin_step(), StepId::Swap);
        assert_eq!(bridge(BridgeProtocol::Hyperlane).origin_step(), StepId::SendOrigin);
        assert_eq!(bridge_swap(BridgeProtocol::Hyperlane).origin_step(), StepId::SendOrigin);
        assert_eq!(swap_bridge(BridgeProtocol::Hyperlane).origin_step(), StepId::Swap);
    }

    #[test]
    fn test_transaction_type_serializes_with_discriminant() {
        let json = serde_json::to_value(bridge(BridgeProtocol::Stargate)).unwrap();
        assert_eq!(json["type"], "BRIDGE");
        assert_eq!(json["chainIn"], 1);
        assert_eq!(json["protocol"], "stargate");
        assert_eq!(json["withSuperchain"], false);

        let back: TransactionType = serde_json::from_value(json).unwrap();
        assert_eq!(back, bridge(BridgeProtocol::Stargate));
    }

    #[test]
    fn test_native_currency() {
        assert!(native(1).is_native());
        assert!(!token(1, 0xa1, "USDC").is_native());
    }
}
