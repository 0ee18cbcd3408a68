//! Nonce management for the session wallet
//!
//! Handles:
//! - Local nonce tracking, initialized lazily from the chain
//! - Release of nonces whose send failed
//! - Resync after "nonce too low"

use crate::chain::ChainProvider;
use crate::error::{OrchestratorError, OrchestratorResult};

use dashmap::DashMap;
use ethers::types::{Address, H256};
use std::collections::BTreeMap;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Per-chain nonce state
#[derive(Debug, Default)]
struct ChainNonceState {
    /// Next nonce to hand out
    current: u64,
    /// Sent but not yet mined: nonce -> tx hash
    pending: BTreeMap<u64, H256>,
}

/// Manages nonces across multiple chains
pub struct NonceManager {
    wallet_address: Address,
    chain_state: DashMap<u64, Mutex<ChainNonceState>>,
}

impl NonceManager {
    pub fn new(wallet_address: Address) -> Self {
        Self {
            wallet_address,
            chain_state: DashMap::new(),
        }
    }

    /// Allocate the next nonce, reading the chain on first use
    pub async fn allocate(&self, provider: &ChainProvider) -> OrchestratorResult<u64> {
        let chain_id = provider.chain_id();

        if !self.chain_state.contains_key(&chain_id) {
            let on_chain = provider.get_transaction_count(self.wallet_address).await?;
            self.chain_state
                .entry(chain_id)
                .or_insert_with(|| Mutex::new(ChainNonceState {
                    current: on_chain,
                    pending: BTreeMap::new(),
                }));
            debug!("Initialized nonce for chain {}: {}", chain_id, on_chain);
        }

        let state = self.state(chain_id)?;
        let mut state = state.lock().await;
        let nonce = state.current;
        state.current += 1;

        debug!("Allocated nonce {} for chain {}", nonce, chain_id);
        Ok(nonce)
    }

    /// Record the hash sent under `nonce`
    pub async fn mark_pending(&self, chain_id: u64, nonce: u64, tx_hash: H256) -> OrchestratorResult<()> {
        let state = self.state(chain_id)?;
        state.lock().await.pending.insert(nonce, tx_hash);
        Ok(())
    }

    /// Forget the pending entry for a mined transaction
    pub async fn confirm(&self, chain_id: u64, tx_hash: H256) -> OrchestratorResult<()> {
        let state = self.state(chain_id)?;
        state.lock().await.pending.retain(|_, hash| *hash != tx_hash);
        Ok(())
    }

    /// Give back a nonce whose send failed
    pub async fn release(&self, chain_id: u64, nonce: u64) -> OrchestratorResult<()> {
        let state = self.state(chain_id)?;
        let mut state = state.lock().await;
        state.pending.remove(&nonce);

        // Only the most recent allocation can be reused
        if nonce + 1 == state.current {
            state.current = nonce;
        }
        Ok(())
    }

    /// Reset local state to the on-chain count
    pub async fn sync(&self, provider: &ChainProvider) -> OrchestratorResult<()> {
        let chain_id = provider.chain_id();
        let on_chain = provider.get_transaction_count(self.wallet_address).await?;

        let state = self.state(chain_id)?;
        let mut state = state.lock().await;

        if on_chain > state.current {
            warn!(
                "Nonce behind chain on {}: local {}, chain {}",
                chain_id, state.current, on_chain
            );
        }

        state.pending.retain(|nonce, _| *nonce >= on_chain);
        state.current = state.current.max(on_chain);
        Ok(())
    }

    /// Number of sent transactions not yet confirmed
    pub async fn pending_count(&self, chain_id: u64) -> usize {
        match self.chain_state.get(&chain_id) {
            Some(state) => state.lock().await.pending.len(),
            None => 0,
        }
    }

    fn state(
        &self,
        chain_id: u64,
    ) -> OrchestratorResult<dashmap::mapref::one::Ref<'_, u64, Mutex<ChainNonceState>>> {
        self.chain_state.get(&chain_id).ok_or(OrchestratorError::Nonce {
            chain_id,
            message: "Chain not initialized".to_string(),
        })
    }

    #[cfg(test)]
    fn seed(&self, chain_id: u64, current: u64) {
        self.chain_state.insert(
            chain_id,
            Mutex::new(ChainNonceState {
                current,
                pending: BTreeMap::new(),
            }),
        );
    }
}
