//! Wallet session: signing, submission, nonce management and receipt waiting

mod gas;
mod nonce;
mod sender;

pub use gas::GasEstimator;
pub use nonce::NonceManager;
pub use sender::LocalWalletSession;

use crate::error::OrchestratorResult;
use crate::transaction::RawCall;

use async_trait::async_trait;
use ethers::types::{Address, TransactionReceipt, H256};

/// The connected wallet as the orchestrator sees it
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait WalletSession: Send + Sync {
    /// Connected account, if any
    fn connected_address(&self) -> Option<Address>;

    /// Chain the wallet is currently pointed at
    fn current_chain(&self) -> u64;

    /// Point the wallet at `chain_id`; resolves once the switch is complete
    async fn switch_chain(&self, chain_id: u64) -> OrchestratorResult<()>;

    /// Sign and send `call` on the current chain. Never retried.
    async fn send_transaction(&self, call: RawCall) -> OrchestratorResult<H256>;

    /// Wait until the transaction is mined with enough confirmations
    async fn wait_for_receipt(
        &self,
        chain_id: u64,
        tx_hash: H256,
    ) -> OrchestratorResult<TransactionReceipt>;
}

/// Receipt status check: EIP-658 status 1 is success
pub fn receipt_succeeded(receipt: &TransactionReceipt) -> bool {
    receipt.status.map(|s| s.as_u64() == 1).unwrap_or(false)
}
