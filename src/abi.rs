//! Contract interfaces used for quoting, encoding and log decoding, plus
//! conversions between the ethers transport types and alloy ABI types.

use alloy_sol_types::sol;
use ethers::types::{Address, H256, U256};

sol! {
    interface IERC20 {
        function allowance(address owner, address spender) external view returns (uint256);
        function approve(address spender, uint256 amount) external returns (bool);
    }
}

sol! {
    interface IPermit2 {
        function allowance(address user, address token, address spender)
            external
            view
            returns (uint160 amount, uint48 expiration, uint48 nonce);
        function approve(address token, address spender, uint160 amount, uint48 expiration) external;
    }
}

sol! {
    interface IQuoterV2 {
        struct QuoteExactInputSingleParams {
            address tokenIn;
            address tokenOut;
            uint256 amountIn;
            uint24 fee;
            uint160 sqrtPriceLimitX96;
        }

        function quoteExactInputSingle(QuoteExactInputSingleParams memory params)
            external
            returns (
                uint256 amountOut,
                uint160 sqrtPriceX96After,
                uint32 initializedTicksCrossed,
                uint256 gasEstimate
            );
    }
}

sol! {
    interface IUniversalRouter {
        function execute(bytes calldata commands, bytes[] calldata inputs, uint256 deadline) external payable;
    }
}

sol! {
    interface IHyperlaneTokenRouter {
        function transferRemote(uint32 destination, bytes32 recipient, uint256 amount)
            external
            payable
            returns (bytes32 messageId);
        function quoteGasPayment(uint32 destination) external view returns (uint256);
    }
}

sol! {
    interface IMailbox {
        event DispatchId(bytes32 indexed messageId);
        event ProcessId(bytes32 indexed messageId);
        function delivered(bytes32 messageId) external view returns (bool);
    }
}

sol! {
    interface ISuperchainTokenBridge {
        function sendERC20(address token, address to, uint256 amount, uint256 chainId)
            external
            returns (bytes32 msgHash);
    }
}

sol! {
    interface IL2ToL2CrossDomainMessenger {
        event SentMessage(
            uint256 indexed destination,
            address indexed target,
            uint256 indexed messageNonce,
            address sender,
            bytes message
        );
        event RelayedMessage(uint256 indexed source, uint256 indexed messageNonce, bytes32 indexed messageHash);
        function successfulMessages(bytes32 messageHash) external view returns (bool);
    }
}

sol! {
    interface IStargateOFT {
        event OFTSent(
            bytes32 indexed guid,
            uint32 dstEid,
            address indexed fromAddress,
            uint256 amountSentLD,
            uint256 amountReceivedLD
        );
        event OFTReceived(bytes32 indexed guid, uint32 srcEid, address indexed toAddress, uint256 amountReceivedLD);
    }
}

/// OP Stack interop predeploys
pub mod predeploys {
    use ethers::types::H160;

    /// 0x4200000000000000000000000000000000000023
    pub const L2_TO_L2_CROSS_DOMAIN_MESSENGER: H160 = H160([
        0x42, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0x23,
    ]);

    /// 0x4200000000000000000000000000000000000028
    pub const SUPERCHAIN_TOKEN_BRIDGE: H160 = H160([
        0x42, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0x28,
    ]);
}

/// Largest `uint160`, the cap Permit2 stores allowances in
pub fn uint160_max() -> alloy_primitives::U256 {
    alloy_primitives::U256::MAX >> 96
}

pub fn to_alloy_address(address: Address) -> alloy_primitives::Address {
    alloy_primitives::Address::from(address.0)
}

pub fn to_b256(hash: H256) -> alloy_primitives::B256 {
    alloy_primitives::B256::from(hash.0)
}

pub fn from_b256(hash: alloy_primitives::B256) -> H256 {
    H256::from(hash.0)
}

pub fn to_alloy_u256(value: U256) -> alloy_primitives::U256 {
    let mut bytes = [0u8; 32];
    value.to_big_endian(&mut bytes);
    alloy_primitives::U256::from_be_bytes(bytes)
}

pub fn from_alloy_u256(value: alloy_primitives::U256) -> U256 {
    U256::from_big_endian(&value.to_be_bytes::<32>())
}

/// Left-pad an address into the bytes32 form Hyperlane uses for recipients
pub fn address_to_bytes32(address: Address) -> alloy_primitives::B256 {
    let mut word = [0u8; 32];
    word[12..].copy_from_slice(address.as_bytes());
    alloy_primitives::B256::from(word)
}

/// Topics and data of an ethers log, in the shape alloy's decoders take
pub fn raw_log_parts(log: &ethers::types::Log) -> (Vec<alloy_primitives::B256>, &[u8]) {
    let topics = log.topics.iter().map(|t| to_b256(*t)).collect();
    (topics, log.data.as_ref())
}
