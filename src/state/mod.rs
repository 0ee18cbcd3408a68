//! In-memory progress state for the active transaction
//!
//! Handles:
//! - Ordered step sequence and per-step status
//! - Hash / message-id bindings per step
//! - Attempt identity, so late updates from an old attempt are dropped
//! - Change notification through a watch channel

mod store;

pub use store::{ProgressStore, StepUpdate};

use ethers::types::H256;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

/// One logical leg of a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StepId {
    SendOrigin,
    Bridge,
    Swap,
    TransferRemote,
}

impl StepId {
    pub fn name(&self) -> &'static str {
        match self {
            StepId::SendOrigin => "sendOrigin",
            StepId::Bridge => "bridge",
            StepId::Swap => "swap",
            StepId::TransferRemote => "transferRemote",
        }
    }
}

impl fmt::Display for StepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Step status. Moves forward only: idle -> processing -> success | error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    #[default]
    Idle,
    Processing,
    Success,
    Error,
}

impl StepStatus {
    pub fn name(&self) -> &'static str {
        match self {
            StepStatus::Idle => "idle",
            StepStatus::Processing => "processing",
            StepStatus::Success => "success",
            StepStatus::Error => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, StepStatus::Success | StepStatus::Error)
    }

    /// Whether `next` is a forward move from `self`
    pub fn can_advance_to(&self, next: StepStatus) -> bool {
        match self {
            StepStatus::Idle => next != StepStatus::Idle,
            StepStatus::Processing => next.is_terminal(),
            StepStatus::Success | StepStatus::Error => false,
        }
    }
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionStep {
    pub id: StepId,
    pub status: StepStatus,
}

/// Snapshot of the session's transaction progress
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressState {
    pub attempt_id: Option<Uuid>,
    pub steps: Vec<TransactionStep>,
    pub current_step_id: Option<StepId>,
    /// step -> chain transaction hash or cross-chain message id
    pub hashes: BTreeMap<StepId, H256>,
    pub modal_open: bool,
}

impl ProgressState {
    pub fn step(&self, id: StepId) -> Option<&TransactionStep> {
        self.steps.iter().find(|s| s.id == id)
    }

    pub fn status_of(&self, id: StepId) -> Option<StepStatus> {
        self.step(id).map(|s| s.status)
    }

    pub fn hash_of(&self, id: StepId) -> Option<H256> {
        self.hashes.get(&id).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Every step succeeded
    pub fn is_complete(&self) -> bool {
        !self.steps.is_empty() && self.steps.iter().all(|s| s.status == StepStatus::Success)
    }

    /// Some step failed; nothing else may move
    pub fn is_halted(&self) -> bool {
        self.steps.iter().any(|s| s.status == StepStatus::Error)
    }

    /// First failed step, else first step not yet successful
    fn derive_current_step(&self) -> Option<StepId> {
        self.steps
            .iter()
            .find(|s| s.status == StepStatus::Error)
            .or_else(|| self.steps.iter().find(|s| s.status != StepStatus::Success))
            .map(|s| s.id)
    }
}
