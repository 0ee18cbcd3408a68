//! Local-key wallet session

use super::gas::GasEstimator;
use super::nonce::NonceManager;
use super::WalletSession;
use crate::chain::{ChainManager, ChainProvider, GasPrice};
use crate::config::{SessionConfig, Settings};
use crate::error::{OrchestratorError, OrchestratorResult};
use crate::transaction::RawCall;

use async_trait::async_trait;
use ethers::prelude::*;
use ethers::signers::{LocalWallet, Signer};
use ethers::types::transaction::eip2718::TypedTransaction;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, timeout};
use tracing::{debug, info, warn};

const SEND_TIMEOUT: Duration = Duration::from_secs(30);

/// Wallet session signing with a local private key
pub struct LocalWalletSession {
    chain_manager: Arc<ChainManager>,
    nonce_manager: NonceManager,
    gas_estimator: GasEstimator,
    wallet: LocalWallet,
    current_chain: AtomicU64,
    receipt_poll_interval: Duration,
    receipt_timeout: Duration,
}

impl LocalWalletSession {
    /// Load the key named in the wallet config and start on the lowest connected chain
    pub fn new(chain_manager: Arc<ChainManager>, settings: &Settings) -> OrchestratorResult<Self> {
        let wallet = Self::load_wallet(&settings.wallet.private_key_env)?;
        Self::with_wallet(chain_manager, wallet, &settings.session)
    }

    pub fn with_wallet(
        chain_manager: Arc<ChainManager>,
        wallet: LocalWallet,
        session: &SessionConfig,
    ) -> OrchestratorResult<Self> {
        let initial_chain = chain_manager
            .connected_chains()
            .first()
            .copied()
            .ok_or_else(|| OrchestratorError::Config("No chains connected".to_string()))?;

        info!(
            "Wallet session for {:?} starting on chain {}",
            wallet.address(),
            initial_chain
        );

        Ok(Self {
            chain_manager,
            nonce_manager: NonceManager::new(wallet.address()),
            gas_estimator: GasEstimator::new(),
            wallet,
            current_chain: AtomicU64::new(initial_chain),
            receipt_poll_interval: Duration::from_millis(session.receipt_poll_interval_ms),
            receipt_timeout: Duration::from_secs(session.receipt_timeout_secs),
        })
    }

    /// Load wallet from the named environment variable
    fn load_wallet(env_name: &str) -> OrchestratorResult<LocalWallet> {
        let key = std::env::var(env_name).map_err(|_| {
            OrchestratorError::Wallet(format!("No wallet configured. Set {}", env_name))
        })?;

        key.trim()
            .parse::<LocalWallet>()
            .map_err(|e| OrchestratorError::Wallet(format!("Invalid private key: {}", e)))
    }

    fn build_tx(
        &self,
        chain_id: u64,
        call: &RawCall,
        nonce: u64,
        gas_limit: U256,
        gas_price: &GasPrice,
    ) -> TypedTransaction {
        let mut tx: TypedTransaction = match gas_price {
            GasPrice::Legacy(price) => TransactionRequest::new()
                .from(self.wallet.address())
                .to(call.to)
                .data(call.data.clone())
                .value(call.value)
                .nonce(nonce)
                .gas(gas_limit)
                .gas_price(*price)
                .into(),
            GasPrice::Eip1559 {
                max_fee_per_gas,
                max_priority_fee_per_gas,
            } => Eip1559TransactionRequest::new()
                .from(self.wallet.address())
                .to(call.to)
                .data(call.data.clone())
                .value(call.value)
                .nonce(nonce)
                .gas(gas_limit)
                .max_fee_per_gas(*max_fee_per_gas)
                .max_priority_fee_per_gas(*max_priority_fee_per_gas)
                .into(),
        };

        tx.set_chain_id(chain_id);
        tx
    }

    /// Sign and send once
    async fn send_signed(
        &self,
        provider: &ChainProvider,
        tx: TypedTransaction,
    ) -> OrchestratorResult<H256> {
        let chain_id = provider.chain_id();
        let wallet = self.wallet.clone().with_chain_id(chain_id);

        let signature = wallet
            .sign_transaction(&tx)
            .await
            .map_err(|e| OrchestratorError::Wallet(e.to_string()))?;
        let signed_tx = tx.rlp_signed(&signature);

        match timeout(SEND_TIMEOUT, provider.http().send_raw_transaction(signed_tx)).await {
            Ok(Ok(pending_tx)) => Ok(pending_tx.tx_hash()),
            Ok(Err(e)) => {
                let error_msg = e.to_string();

                if error_msg.contains("nonce too low") {
                    warn!("Nonce too low on chain {}, resyncing", chain_id);
                    self.nonce_manager.sync(provider).await?;
                    return Err(OrchestratorError::Nonce {
                        chain_id,
                        message: "Nonce too low".to_string(),
                    });
                }

                Err(OrchestratorError::Transaction(error_msg))
            }
            Err(_) => Err(OrchestratorError::Timeout {
                operation: "send transaction".to_string(),
            }),
        }
    }
}

#[async_trait]
impl WalletSession for LocalWalletSession {
    fn connected_address(&self) -> Option<Address> {
        Some(self.wallet.address())
    }

    fn current_chain(&self) -> u64 {
        self.current_chain.load(Ordering::SeqCst)
    }

    async fn switch_chain(&self, chain_id: u64) -> OrchestratorResult<()> {
        // Only chains we hold a provider for are reachable
        self.chain_manager
            .get_provider(chain_id)
            .map_err(|e| OrchestratorError::ChainSwitch {
                chain_id,
                message: e.to_string(),
            })?;

        let previous = self.current_chain.swap(chain_id, Ordering::SeqCst);
        if previous != chain_id {
            info!("Wallet switched from chain {} to {}", previous, chain_id);
        }
        Ok(())
    }

    async fn send_transaction(&self, call: RawCall) -> OrchestratorResult<H256> {
        let chain_id = self.current_chain();
        if call.chain_id != chain_id {
            return Err(OrchestratorError::ChainSwitch {
                chain_id: call.chain_id,
                message: format!("Wallet is on chain {}", chain_id),
            });
        }

        let provider = self.chain_manager.get_provider(chain_id)?;

        let estimate_tx: TypedTransaction = TransactionRequest::new()
            .from(self.wallet.address())
            .to(call.to)
            .data(call.data.clone())
            .value(call.value)
            .into();
        let gas_limit = self
            .gas_estimator
            .estimate_gas_limit(&provider, &estimate_tx)
            .await?;
        let gas_price = self.gas_estimator.get_gas_price(&provider).await?;

        let nonce = self.nonce_manager.allocate(&provider).await?;
        let tx = self.build_tx(chain_id, &call, nonce, gas_limit, &gas_price);

        match self.send_signed(&provider, tx).await {
            Ok(tx_hash) => {
                self.nonce_manager.mark_pending(chain_id, nonce, tx_hash).await?;
                info!("Transaction sent on chain {}: {:?}", chain_id, tx_hash);
                crate::metrics::record_tx_submitted(chain_id);
                Ok(tx_hash)
            }
            Err(e) => {
                self.nonce_manager.release(chain_id, nonce).await?;
                Err(e)
            }
        }
    }

    async fn wait_for_receipt(
        &self,
        chain_id: u64,
        tx_hash: H256,
    ) -> OrchestratorResult<TransactionReceipt> {
        let provider = self.chain_manager.get_provider(chain_id)?;
        let confirmations = provider.confirmation_blocks().max(1);

        let poll = async {
            let mut ticker = interval(self.receipt_poll_interval);
            loop {
                ticker.tick().await;

                let receipt = match provider.get_transaction_receipt(tx_hash).await {
                    Ok(Some(receipt)) => receipt,
                    Ok(None) => continue,
                    Err(e) => {
                        warn!("Receipt query for {:?} failed: {}", tx_hash, e);
                        continue;
                    }
                };

                let Some(mined_at) = receipt.block_number else {
                    continue;
                };

                match provider.get_block_number().await {
                    Ok(head) if head.saturating_sub(mined_at.as_u64()) + 1 >= confirmations => {
                        return receipt;
                    }
                    Ok(head) => {
                        debug!(
                            "{:?} mined at {}, head {}, waiting for {} confirmations",
                            tx_hash, mined_at, head, confirmations
                        );
                    }
                    Err(e) => warn!("Block number query failed: {}", e),
                }
            }
        };

        let receipt = timeout(self.receipt_timeout, poll)
            .await
            .map_err(|_| OrchestratorError::Timeout {
                operation: format!("receipt of {:?}", tx_hash),
            })?;

        self.nonce_manager.confirm(chain_id, tx_hash).await.ok();
        Ok(receipt)
    }
}
