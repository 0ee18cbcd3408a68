//! Session-scoped progress store backed by a watch channel

use super::{ProgressState, StepId, StepStatus, TransactionStep};
use crate::error::{OrchestratorError, OrchestratorResult};

use ethers::types::H256;
use tokio::sync::watch;
use tracing::{debug, info};
use uuid::Uuid;

/// A single step mutation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepUpdate {
    pub step: StepId,
    pub status: StepStatus,
    pub hash: Option<H256>,
}

impl StepUpdate {
    pub fn new(step: StepId, status: StepStatus) -> Self {
        Self {
            step,
            status,
            hash: None,
        }
    }

    pub fn with_hash(mut self, hash: H256) -> Self {
        self.hash = Some(hash);
        self
    }
}

/// Owner of the session's `ProgressState`.
///
/// The coordinator and the delivery trackers write through
/// `update_transaction_step`; readers take snapshots or subscribe.
pub struct ProgressStore {
    state: watch::Sender<ProgressState>,
}

impl ProgressStore {
    pub fn new() -> Self {
        let (state, _) = watch::channel(ProgressState::default());
        Self { state }
    }

    /// Current state, cloned
    pub fn snapshot(&self) -> ProgressState {
        self.state.borrow().clone()
    }

    /// Receive every published snapshot
    pub fn subscribe(&self) -> watch::Receiver<ProgressState> {
        self.state.subscribe()
    }

    pub fn attempt_id(&self) -> Option<Uuid> {
        self.state.borrow().attempt_id
    }

    /// Start a new attempt with all `steps` idle. Returns the attempt id.
    pub fn initialize(&self, steps: &[StepId]) -> Uuid {
        let attempt_id = Uuid::new_v4();

        self.state.send_modify(|state| {
            *state = ProgressState {
                attempt_id: Some(attempt_id),
                steps: steps
                    .iter()
                    .map(|id| TransactionStep {
                        id: *id,
                        status: StepStatus::Idle,
                    })
                    .collect(),
                current_step_id: steps.first().copied(),
                hashes: Default::default(),
                modal_open: true,
            };
        });

        info!("Initialized attempt {} with steps {:?}", attempt_id, steps);
        attempt_id
    }

    /// Apply a step update for `attempt`.
    ///
    /// Returns `Ok(false)` when nothing changed: the attempt is no longer
    /// current, or the step already has this status and hash. Hashes are
    /// bound once per step and never overwritten.
    pub fn update_transaction_step(
        &self,
        attempt: Uuid,
        update: StepUpdate,
    ) -> OrchestratorResult<bool> {
        let mut outcome = Ok(false);

        self.state.send_if_modified(|state| {
            if state.attempt_id != Some(attempt) {
                debug!(
                    "Dropping update {:?} for stale attempt {}",
                    update, attempt
                );
                return false;
            }

            let Some(index) = state.steps.iter().position(|s| s.id == update.step) else {
                outcome = Err(OrchestratorError::Internal(format!(
                    "Step {} is not part of attempt {}",
                    update.step, attempt
                )));
                return false;
            };

            let current = state.steps[index].status;
            if current == update.status {
                return bind_hash(state, &update);
            }

            if state.is_halted() {
                outcome = Err(OrchestratorError::Halted {
                    step: update.step.to_string(),
                });
                return false;
            }

            if !current.can_advance_to(update.status) {
                outcome = Err(OrchestratorError::InvalidStateTransition {
                    step: update.step.to_string(),
                    from: current.to_string(),
                    to: update.status.to_string(),
                });
                return false;
            }

            state.steps[index].status = update.status;
            bind_hash(state, &update);
            state.current_step_id = state.derive_current_step();

            debug!("Step {} {} -> {}", update.step, current, update.status);
            crate::metrics::record_step_transition(update.step, update.status);

            outcome = Ok(true);
            true
        });

        outcome
    }

    pub fn set_modal_open(&self, open: bool) -> bool {
        self.state.send_if_modified(|state| {
            let changed = state.modal_open != open;
            state.modal_open = open;
            changed
        })
    }

    /// Clear all progress. Calling it on an empty store changes nothing.
    pub fn reset_transaction_state(&self) {
        let cleared = self.state.send_if_modified(|state| {
            if *state == ProgressState::default() {
                return false;
            }
            *state = ProgressState::default();
            true
        });

        if cleared {
            info!("Transaction state reset");
        }
    }
}

impl Default for ProgressStore {
    fn default() -> Self {
        Self::new()
    }
}

fn bind_hash(state: &mut ProgressState, update: &StepUpdate) -> bool {
    match update.hash {
        Some(hash) if !state.hashes.contains_key(&update.step) => {
            state.hashes.insert(update.step, hash);
            true
        }
        _ => false,
    }
}
