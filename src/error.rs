//! Error types for the swap orchestrator

use thiserror::Error;

/// Main error type for the orchestrator
#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Chain connection error for chain {chain_id}: {message}")]
    ChainConnection { chain_id: u64, message: String },

    #[error("Chain {chain_id} not found")]
    ChainNotFound { chain_id: u64 },

    #[error("Failed to switch wallet to chain {chain_id}: {message}")]
    ChainSwitch { chain_id: u64, message: String },

    #[error("Wallet not connected")]
    WalletNotConnected,

    #[error("Wallet error: {0}")]
    Wallet(String),

    #[error("Transaction error: {0}")]
    Transaction(String),

    #[error("Transaction {tx_hash} reverted on chain {chain_id}")]
    Reverted { chain_id: u64, tx_hash: String },

    #[error("Nonce error for chain {chain_id}: {message}")]
    Nonce { chain_id: u64, message: String },

    #[error("Gas estimation error: {0}")]
    GasEstimation(String),

    #[error("Quote error: {0}")]
    Quote(String),

    #[error("No route: {0}")]
    NoRoute(String),

    #[error("Stale quote: expected at least {expected}, current minimum is {current}")]
    StaleQuote { expected: String, current: String },

    #[error("Event parsing error: {0}")]
    EventParsing(String),

    #[error("Delivery query failed for {protocol}: {message}")]
    DeliveryQuery { protocol: String, message: String },

    #[error("Invalid transition for step {step} from {from} to {to}")]
    InvalidStateTransition {
        step: String,
        from: String,
        to: String,
    },

    #[error("Transaction halted at step {step}")]
    Halted { step: String },

    #[error("Attempt {attempt_id} is still in progress; reset before starting another")]
    AttemptInProgress { attempt_id: String },

    #[error("Attempt {attempt_id} was replaced before submission")]
    AttemptSuperseded { attempt_id: String },

    #[error("Timeout waiting for {operation}")]
    Timeout { operation: String },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl OrchestratorError {
    /// Failures of infrastructure rather than of the transaction itself.
    ///
    /// A transient error never moves a step to `error`.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            OrchestratorError::ChainConnection { .. }
                | OrchestratorError::DeliveryQuery { .. }
                | OrchestratorError::Timeout { .. }
        )
    }

    /// Check if error should be surfaced to the user
    pub fn should_notify(&self) -> bool {
        !matches!(
            self,
            OrchestratorError::DeliveryQuery { .. }
                | OrchestratorError::InvalidStateTransition { .. }
                | OrchestratorError::AttemptSuperseded { .. }
                | OrchestratorError::Internal(_)
        )
    }
}

/// Result type for orchestrator operations
pub type OrchestratorResult<T> = Result<T, OrchestratorError>;
