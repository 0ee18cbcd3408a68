//! The UI session: selection, planning, approval, execution and reset

use super::builder::{BuildRequest, CallBuilder};
use super::coordinator::ExecutionCoordinator;
use super::{Notification, NotificationLevel, Notifier};
use crate::chain::{reader_for, Readers};
use crate::encoder::approval::{
    erc20_allowance, erc20_approve, permit2_allowance, permit2_approve,
};
use crate::encoder::ChainContracts;
use crate::error::{OrchestratorError, OrchestratorResult};
use crate::state::{ProgressState, ProgressStore};
use crate::transaction::{
    initialize_transaction_steps, next_step, requires_allowance, BridgeRegistry, Currency, RawCall,
    SwapStep, TransactionType,
};
use crate::tx::receipt_succeeded;

use chrono::Utc;
use ethers::types::{Address, U256};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{watch, Mutex, RwLock};
use tracing::{error, info, warn};
use uuid::Uuid;

/// Who pulls the input token out of the wallet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Spender {
    /// Token approves Permit2, Permit2 approves the router
    Permit2 { permit2: Address, router: Address },
    Direct(Address),
    Nobody,
}

pub struct Session {
    registry: Arc<BridgeRegistry>,
    builder: CallBuilder,
    coordinator: Arc<ExecutionCoordinator>,
    store: Arc<ProgressStore>,
    notifier: Arc<Notifier>,
    readers: Readers,
    contracts: HashMap<u64, ChainContracts>,
    selection: RwLock<Option<(Currency, Currency)>>,
    /// Serializes `execute` so at most one attempt starts at a time
    starting: Mutex<()>,
}

impl Session {
    pub fn new(
        registry: Arc<BridgeRegistry>,
        builder: CallBuilder,
        coordinator: Arc<ExecutionCoordinator>,
        store: Arc<ProgressStore>,
        notifier: Arc<Notifier>,
        readers: Readers,
        contracts: HashMap<u64, ChainContracts>,
    ) -> Self {
        Self {
            registry,
            builder,
            coordinator,
            store,
            notifier,
            readers,
            contracts,
            selection: RwLock::new(None),
            starting: Mutex::new(()),
        }
    }

    pub fn connected_address(&self) -> Option<Address> {
        self.coordinator.wallet().connected_address()
    }

    pub fn progress(&self) -> ProgressState {
        self.store.snapshot()
    }

    pub fn subscribe_progress(&self) -> watch::Receiver<ProgressState> {
        self.store.subscribe()
    }

    pub fn notifications(&self) -> Vec<Notification> {
        self.notifier.recent()
    }

    pub fn set_modal_open(&self, open: bool) -> bool {
        self.store.set_modal_open(open)
    }

    /// Classify the selected pair. A different pair than last time stops
    /// any delivery tracking left from the previous selection.
    pub async fn classify(
        &self,
        currency_in: Option<&Currency>,
        currency_out: Option<&Currency>,
    ) -> Option<TransactionType> {
        let selection = currency_in.cloned().zip(currency_out.cloned());
        {
            let mut current = self.selection.write().await;
            if *current != selection {
                let cancelled = self.coordinator.cancel_tracking();
                if cancelled > 0 {
                    info!("Selection changed, stopped {} trackers", cancelled);
                }
                *current = selection;
            }
        }

        self.registry.classify(currency_in, currency_out)
    }

    /// Next action for `transaction_type` and `amount`; `None` disables it
    pub async fn plan(
        &self,
        transaction_type: Option<&TransactionType>,
        amount: U256,
    ) -> OrchestratorResult<Option<SwapStep>> {
        let owner = self.connected_address();

        let allowance = match (transaction_type, owner) {
            (Some(tx), Some(owner)) if requires_allowance(tx) && !amount.is_zero() => {
                self.allowance(tx, owner).await?
            }
            _ => U256::MAX,
        };

        Ok(next_step(
            transaction_type,
            owner.is_some(),
            allowance,
            amount,
        ))
    }

    /// Submit the approvals `transaction_type` needs for `amount`.
    ///
    /// Approvals are outside the progress steps: they never touch progress
    /// state, only notifications.
    pub async fn approve(
        &self,
        transaction_type: &TransactionType,
        amount: U256,
    ) -> OrchestratorResult<usize> {
        let owner = self
            .connected_address()
            .ok_or(OrchestratorError::WalletNotConnected)?;

        let calls = self.approval_calls(transaction_type, owner, amount).await?;
        for call in &calls {
            if let Err(e) = self.submit_and_confirm(call).await {
                error!("Approval on chain {} failed: {}", call.chain_id, e);
                if e.should_notify() {
                    self.notifier.notify(
                        NotificationLevel::Error,
                        "Approval failed",
                        e.to_string(),
                        None,
                    );
                }
                return Err(e);
            }
        }

        if !calls.is_empty() {
            self.notifier.notify(
                NotificationLevel::Success,
                "Approval confirmed",
                format!("{} can now be spent", transaction_type.currency_in()),
                None,
            );
        }
        Ok(calls.len())
    }

    /// Classify, plan, build, then submit in the background.
    ///
    /// Returns the new attempt id once the call is built and the steps are
    /// initialized; nothing is initialized when building fails. Refused
    /// while the previous attempt is neither finished, failed nor reset.
    pub async fn execute(
        &self,
        currency_in: &Currency,
        currency_out: &Currency,
        request: BuildRequest,
    ) -> OrchestratorResult<Uuid> {
        let _starting = self.starting.lock().await;

        let state = self.store.snapshot();
        if let Some(attempt_id) = state.attempt_id {
            if !state.is_complete() && !state.is_halted() {
                return Err(OrchestratorError::AttemptInProgress {
                    attempt_id: attempt_id.to_string(),
                });
            }
        }

        let transaction_type = self
            .classify(Some(currency_in), Some(currency_out))
            .await
            .ok_or_else(|| {
                OrchestratorError::NoRoute(format!("{} -> {}", currency_in, currency_out))
            })?;

        match self.plan(Some(&transaction_type), request.amount_in).await? {
            Some(SwapStep::ExecuteSwap) => {}
            Some(SwapStep::ApprovePermit2) => {
                return Err(OrchestratorError::Transaction(
                    "Approval required before execution".to_string(),
                ));
            }
            None => {
                return Err(match self.connected_address() {
                    None => OrchestratorError::WalletNotConnected,
                    Some(_) => OrchestratorError::Quote("Amount must be positive".to_string()),
                });
            }
        }

        let sender = self
            .connected_address()
            .ok_or(OrchestratorError::WalletNotConnected)?;

        let call = match self.builder.build(&transaction_type, sender, &request).await {
            Ok(call) => call,
            Err(e) => {
                warn!("Build of {} failed: {}", transaction_type.name(), e);
                crate::metrics::record_build_failure(transaction_type.name());
                if e.should_notify() {
                    self.notifier.notify(
                        NotificationLevel::Error,
                        "Cannot build transaction",
                        e.to_string(),
                        None,
                    );
                }
                return Err(e);
            }
        };

        let attempt_id = initialize_transaction_steps(&self.store, &transaction_type);
        self.coordinator.begin(attempt_id, &transaction_type).await;
        info!("Starting {} attempt {}", transaction_type.name(), attempt_id);

        let coordinator = self.coordinator.clone();
        tokio::spawn(async move {
            if let Err(e) = coordinator
                .execute(attempt_id, transaction_type, call)
                .await
            {
                warn!("Attempt {} halted: {}", attempt_id, e);
            }
        });

        Ok(attempt_id)
    }

    /// Clear progress and stop tracking. Does not touch anything already on chain.
    pub async fn reset(&self) {
        self.coordinator.reset().await;
        self.store.reset_transaction_state();
    }

    fn spender(&self, transaction_type: &TransactionType) -> OrchestratorResult<Spender> {
        if !requires_allowance(transaction_type) {
            return Ok(Spender::Nobody);
        }

        let chain_id = transaction_type.chain_in();
        match transaction_type {
            TransactionType::Swap { .. } | TransactionType::SwapBridge { .. } => {
                let contracts = self
                    .contracts
                    .get(&chain_id)
                    .ok_or(OrchestratorError::ChainNotFound { chain_id })?;
                let router = contracts.universal_router.ok_or_else(|| {
                    OrchestratorError::NoRoute(format!("No swap router on chain {}", chain_id))
                })?;
                Ok(Spender::Permit2 {
                    permit2: contracts.permit2,
                    router,
                })
            }
            TransactionType::Bridge { protocol, .. } | TransactionType::BridgeSwap { protocol, .. } => {
                let currency_in = transaction_type.currency_in();
                let router = self
                    .registry
                    .route_for(*protocol, currency_in)
                    .and_then(|route| route.router_on(chain_id));

                // A route that burns the token itself needs no allowance
                match router {
                    Some(router) if router != currency_in.address => Ok(Spender::Direct(router)),
                    _ => Ok(Spender::Nobody),
                }
            }
        }
    }

    /// Effective allowance of `owner` for the origin call
    async fn allowance(
        &self,
        transaction_type: &TransactionType,
        owner: Address,
    ) -> OrchestratorResult<U256> {
        let token = transaction_type.currency_in().address;

        match self.spender(transaction_type)? {
            Spender::Nobody => Ok(U256::MAX),
            Spender::Direct(spender) => {
                let reader = reader_for(&self.readers, transaction_type.chain_in())?;
                erc20_allowance(reader.as_ref(), token, owner, spender).await
            }
            Spender::Permit2 { permit2, router } => {
                let reader = reader_for(&self.readers, transaction_type.chain_in())?;
                let to_permit2 = erc20_allowance(reader.as_ref(), token, owner, permit2).await?;
                let to_router =
                    permit2_allowance(reader.as_ref(), permit2, owner, token, router, now()).await?;
                Ok(to_permit2.min(to_router))
            }
        }
    }

    async fn approval_calls(
        &self,
        transaction_type: &TransactionType,
        owner: Address,
        amount: U256,
    ) -> OrchestratorResult<Vec<RawCall>> {
        let chain_id = transaction_type.chain_in();
        let token = transaction_type.currency_in().address;

        match self.spender(transaction_type)? {
            Spender::Nobody => Ok(Vec::new()),
            Spender::Direct(spender) => {
                let reader = reader_for(&self.readers, chain_id)?;
                if erc20_allowance(reader.as_ref(), token, owner, spender).await? >= amount {
                    return Ok(Vec::new());
                }
                Ok(vec![erc20_approve(chain_id, token, spender)])
            }
            Spender::Permit2 { permit2, router } => {
                let reader = reader_for(&self.readers, chain_id)?;
                let now = now();
                let mut calls = Vec::with_capacity(2);

                if erc20_allowance(reader.as_ref(), token, owner, permit2).await? < amount {
                    calls.push(erc20_approve(chain_id, token, permit2));
                }
                if permit2_allowance(reader.as_ref(), permit2, owner, token, router, now).await?
                    < amount
                {
                    calls.push(permit2_approve(chain_id, permit2, token, router, now));
                }
                Ok(calls)
            }
        }
    }

    async fn submit_and_confirm(&self, call: &RawCall) -> OrchestratorResult<()> {
        let tx_hash = self.coordinator.submit(call).await?;
        let receipt = self
            .coordinator
            .wallet()
            .wait_for_receipt(call.chain_id, tx_hash)
            .await?;

        if !receipt_succeeded(&receipt) {
            crate::metrics::record_tx_reverted(call.chain_id);
            return Err(OrchestratorError::Reverted {
                chain_id: call.chain_id,
                tx_hash: format!("{:?}", tx_hash),
            });
        }

        info!("Approval {:?} confirmed on chain {}", tx_hash, call.chain_id);
        Ok(())
    }
}

fn now() -> u64 {
    Utc::now().timestamp().max(0) as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::{ChainReader, MockChainReader};
    use crate::delivery::{DeliveryOracle, DeliveryStatus, MockDeliveryOracle, Oracles};
    use crate::encoder::MockCallEncoder;
    use crate::events::test_logs::{dispatch_id_log, receipt_with};
    use crate::quote::{MockQuoteOracle, Quote, SwapRoute};
    use crate::state::{StepId, StepStatus};
    use crate::transaction::fixtures::*;
    use crate::transaction::{BridgeProtocol, BridgeRoute};
    use crate::tx::MockWalletSession;
    use alloy_sol_types::SolValue;
    use ethers::types::{Bytes, TransactionReceipt, H160, H256, U64};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    const TOKEN: Address = H160([0xa1; 20]);
    const PERMIT2: Address = H160([0x22; 20]);
    const ROUTER: Address = H160([0x66; 20]);
    const WARP_ROUTER: Address = H160([0x11; 20]);

    fn registry() -> BridgeRegistry {
        let route = BridgeRoute {
            asset: "USDC".to_string(),
            protocol: BridgeProtocol::Hyperlane,
            decimals: 18,
            tokens: [(1, address(0xa1)), (10, address(0xa2))].into_iter().collect(),
            routers: [(1, WARP_ROUTER)].into_iter().collect(),
        };
        BridgeRegistry::new(vec![route], Default::default())
    }

    fn contracts() -> HashMap<u64, ChainContracts> {
        [(
            1,
            ChainContracts {
                universal_router: Some(ROUTER),
                permit2: PERMIT2,
            },
        )]
        .into_iter()
        .collect()
    }

    /// Reader answering ERC-20 allowance reads on TOKEN and Permit2 reads on PERMIT2
    fn allowance_reader(erc20: u64, permit2: u64) -> Readers {
        let mut reader = MockChainReader::new();
        reader.expect_call().returning(move |to, _| {
            if to == PERMIT2 {
                let expiration = now() + 3_600;
                Ok((alloy_primitives::U256::from(permit2), expiration, 0u64)
                    .abi_encode_params()
                    .into())
            } else {
                Ok(alloy_primitives::U256::from(erc20).abi_encode().into())
            }
        });
        let reader: Arc<dyn ChainReader> = Arc::new(reader);
        [(1u64, reader)].into_iter().collect()
    }

    fn success_receipt(ids: &[H256]) -> TransactionReceipt {
        let mut receipt = receipt_with(ids.iter().map(|id| dispatch_id_log(*id)).collect());
        receipt.status = Some(U64::from(1));
        receipt
    }

    fn wallet(receipt: TransactionReceipt) -> MockWalletSession {
        let mut wallet = MockWalletSession::new();
        wallet
            .expect_connected_address()
            .return_const(Some(address(0x05)));
        wallet.expect_current_chain().return_const(1u64);
        wallet.expect_switch_chain().returning(|_| Ok(()));
        wallet
            .expect_send_transaction()
            .returning(|_| Ok(H256::repeat_byte(0xee)));
        wallet
            .expect_wait_for_receipt()
            .returning(move |_, _| Ok(receipt.clone()));
        wallet
    }

    fn quoter() -> MockQuoteOracle {
        let mut quoter = MockQuoteOracle::new();
        quoter.expect_quote().returning(|currency_in, currency_out, _| {
            Ok(Quote {
                amount_out: U256::from(900u64),
                route: SwapRoute {
                    chain_id: currency_in.chain_id,
                    token_in: currency_in.address,
                    token_out: currency_out.address,
                    fee: 500,
                },
            })
        });
        quoter
    }

    fn encoder_returning(call: Option<RawCall>) -> MockCallEncoder {
        let mut encoder = MockCallEncoder::new();
        encoder
            .expect_build_transaction()
            .returning(move |_, _| Ok(call.clone()));
        encoder
    }

    fn pending_oracles() -> Oracles {
        let mut oracle = MockDeliveryOracle::new();
        oracle
            .expect_check()
            .returning(|_| Ok(DeliveryStatus::Pending));
        let oracle: Arc<dyn DeliveryOracle> = Arc::new(oracle);
        [(BridgeProtocol::Hyperlane, oracle)].into_iter().collect()
    }

    fn session(
        wallet: MockWalletSession,
        encoder: MockCallEncoder,
        readers: Readers,
        oracles: Oracles,
    ) -> Session {
        let store = Arc::new(ProgressStore::new());
        let notifier = Arc::new(Notifier::new(16));
        let coordinator = Arc::new(ExecutionCoordinator::new(
            Arc::new(wallet),
            store.clone(),
            notifier.clone(),
            oracles,
            readers.clone(),
            Duration::from_millis(5),
        ));
        let builder = CallBuilder::new(Arc::new(quoter()), Arc::new(encoder), 50, 1_200);

        Session::new(
            Arc::new(registry()),
            builder,
            coordinator,
            store,
            notifier,
            readers,
            contracts(),
        )
    }

    fn call_on(chain_id: u64) -> RawCall {
        RawCall {
            chain_id,
            to: ROUTER,
            data: Bytes::default(),
            value: U256::zero(),
        }
    }

    fn request(amount: u64) -> BuildRequest {
        BuildRequest {
            amount_in: U256::from(amount),
            expected_amount_out: None,
            recipient: None,
        }
    }

    #[tokio::test]
    async fn test_plan_uses_the_smaller_allowance() {
        let session = session(
            wallet(success_receipt(&[])),
            MockCallEncoder::new(),
            allowance_reader(u64::MAX, 10),
            Oracles::new(),
        );
        let tx = swap(1);

        assert_eq!(
            session.plan(Some(&tx), U256::from(100u64)).await.unwrap(),
            Some(SwapStep::ApprovePermit2)
        );
        assert_eq!(
            session.plan(Some(&tx), U256::from(10u64)).await.unwrap(),
            Some(SwapStep::ExecuteSwap)
        );
    }

    #[tokio::test]
    async fn test_plan_without_wallet_is_disabled() {
        let mut wallet = MockWalletSession::new();
        wallet
            .expect_connected_address()
            .return_const(None::<Address>);
        let session = session(wallet, MockCallEncoder::new(), Readers::new(), Oracles::new());

        assert_eq!(
            session.plan(Some(&swap(1)), U256::from(1u64)).await.unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn test_approve_submits_missing_approvals_only() {
        let sent = Arc::new(AtomicUsize::new(0));
        let counter = sent.clone();

        let mut wallet = MockWalletSession::new();
        wallet
            .expect_connected_address()
            .return_const(Some(address(0x05)));
        wallet.expect_current_chain().return_const(1u64);
        wallet.expect_send_transaction().returning(move |call| {
            assert_eq!(call.to, PERMIT2);
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(H256::repeat_byte(0xaa))
        });
        wallet
            .expect_wait_for_receipt()
            .returning(|_, _| Ok(success_receipt(&[])));

        // Token already approves Permit2; only the router sub-allowance is missing
        let session = session(
            wallet,
            MockCallEncoder::new(),
            allowance_reader(u64::MAX, 0),
            Oracles::new(),
        );

        let submitted = session.approve(&swap(1), U256::from(100u64)).await.unwrap();
        assert_eq!(submitted, 1);
        assert_eq!(sent.load(Ordering::SeqCst), 1);
        assert!(session.progress().is_empty());
        assert_eq!(
            session.notifications().last().map(|n| n.level),
            Some(NotificationLevel::Success)
        );
    }

    #[tokio::test]
    async fn test_bridge_approval_targets_the_warp_router() {
        let mut reader = MockChainReader::new();
        reader
            .expect_call()
            .withf(|to, _| *to == TOKEN)
            .returning(|_, _| Ok(alloy_primitives::U256::ZERO.abi_encode().into()));
        let reader: Arc<dyn ChainReader> = Arc::new(reader);
        let readers: Readers = [(1u64, reader)].into_iter().collect();

        let session = session(
            wallet(success_receipt(&[])),
            MockCallEncoder::new(),
            readers,
            Oracles::new(),
        );
        let calls = session
            .approval_calls(&bridge(BridgeProtocol::Hyperlane), address(0x05), U256::one())
            .await
            .unwrap();

        assert_eq!(calls, vec![erc20_approve(1, TOKEN, WARP_ROUTER)]);
    }

    #[tokio::test]
    async fn test_build_failure_notifies_and_initializes_nothing() {
        let session = session(
            wallet(success_receipt(&[])),
            encoder_returning(None),
            allowance_reader(u64::MAX, u64::MAX),
            Oracles::new(),
        );

        let err = session
            .execute(&token(1, 0xa1, "USDC"), &token(1, 0xb1, "WBTC"), request(1_000))
            .await
            .unwrap_err();

        assert!(matches!(err, OrchestratorError::NoRoute(_)));
        assert!(session.progress().is_empty());
        let notification = session.notifications().pop().unwrap();
        assert_eq!(notification.level, NotificationLevel::Error);
        assert_eq!(notification.title, "Cannot build transaction");
    }

    #[tokio::test]
    async fn test_execute_requires_approval_first() {
        let session = session(
            wallet(success_receipt(&[])),
            encoder_returning(Some(call_on(1))),
            allowance_reader(0, 0),
            Oracles::new(),
        );

        let result = session
            .execute(&token(1, 0xa1, "USDC"), &token(1, 0xb1, "WBTC"), request(1_000))
            .await;
        assert!(result.is_err());
        assert!(session.progress().is_empty());
    }

    #[tokio::test]
    async fn test_execute_swap_runs_to_completion() {
        let session = session(
            wallet(success_receipt(&[])),
            encoder_returning(Some(call_on(1))),
            allowance_reader(u64::MAX, u64::MAX),
            Oracles::new(),
        );
        let mut progress = session.subscribe_progress();

        let attempt = session
            .execute(&token(1, 0xa1, "USDC"), &token(1, 0xb1, "WBTC"), request(1_000))
            .await
            .unwrap();

        let state = tokio::time::timeout(
            Duration::from_secs(5),
            progress.wait_for(|s| s.is_complete()),
        )
        .await
        .unwrap()
        .unwrap()
        .clone();
        assert_eq!(state.attempt_id, Some(attempt));
        assert_eq!(state.status_of(StepId::Swap), Some(StepStatus::Success));
    }

    #[tokio::test]
    async fn test_selection_change_stops_tracking() {
        let message_id = H256::repeat_byte(0x01);
        let session = session(
            wallet(success_receipt(&[message_id])),
            encoder_returning(Some(call_on(1))),
            allowance_reader(u64::MAX, u64::MAX),
            pending_oracles(),
        );
        let usdc_in = token(1, 0xa1, "USDC");
        let usdc_out = token(10, 0xa2, "USDC");
        let mut progress = session.subscribe_progress();

        session
            .execute(&usdc_in, &usdc_out, request(1_000))
            .await
            .unwrap();
        tokio::time::timeout(
            Duration::from_secs(5),
            progress.wait_for(|s| s.status_of(StepId::Bridge) == Some(StepStatus::Processing)),
        )
        .await
        .unwrap()
        .unwrap();
        for _ in 0..100 {
            if session.coordinator.active_trackers() == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(session.coordinator.active_trackers(), 1);

        // Same pair keeps tracking
        session.classify(Some(&usdc_in), Some(&usdc_out)).await;
        assert_eq!(session.coordinator.active_trackers(), 1);

        session
            .classify(Some(&usdc_in), Some(&token(10, 0xb2, "OP")))
            .await;
        assert_eq!(session.coordinator.active_trackers(), 0);
    }

    #[tokio::test]
    async fn test_reset_clears_progress() {
        let session = session(
            wallet(success_receipt(&[])),
            encoder_returning(Some(call_on(1))),
            allowance_reader(u64::MAX, u64::MAX),
            Oracles::new(),
        );
        let mut progress = session.subscribe_progress();
        session
            .execute(&token(1, 0xa1, "USDC"), &token(1, 0xb1, "WBTC"), request(1_000))
            .await
            .unwrap();
        tokio::time::timeout(Duration::from_secs(5), progress.wait_for(|s| s.is_complete()))
            .await
            .unwrap()
            .unwrap();

        session.reset().await;
        session.reset().await;
        assert_eq!(session.progress(), ProgressState::default());
    }

    #[tokio::test]
    async fn test_second_execute_waits_for_reset() {
        let message_id = H256::repeat_byte(0x01);
        let sent = Arc::new(AtomicUsize::new(0));
        let counter = sent.clone();

        let mut wallet = MockWalletSession::new();
        wallet
            .expect_connected_address()
            .return_const(Some(address(0x05)));
        wallet.expect_current_chain().return_const(1u64);
        wallet.expect_send_transaction().returning(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(H256::repeat_byte(0xee))
        });
        let receipt = success_receipt(&[message_id]);
        wallet
            .expect_wait_for_receipt()
            .returning(move |_, _| Ok(receipt.clone()));

        let session = session(
            wallet,
            encoder_returning(Some(call_on(1))),
            allowance_reader(u64::MAX, u64::MAX),
            pending_oracles(),
        );
        let usdc_in = token(1, 0xa1, "USDC");
        let usdc_out = token(10, 0xa2, "USDC");
        let mut progress = session.subscribe_progress();

        let first = session
            .execute(&usdc_in, &usdc_out, request(1_000))
            .await
            .unwrap();
        tokio::time::timeout(
            Duration::from_secs(5),
            progress.wait_for(|s| s.status_of(StepId::Bridge) == Some(StepStatus::Processing)),
        )
        .await
        .unwrap()
        .unwrap();

        let err = session
            .execute(&usdc_in, &usdc_out, request(1_000))
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::AttemptInProgress { .. }));
        assert_eq!(session.progress().attempt_id, Some(first));
        assert_eq!(sent.load(Ordering::SeqCst), 1);

        session.reset().await;
        let second = session
            .execute(&usdc_in, &usdc_out, request(1_000))
            .await
            .unwrap();
        assert_ne!(first, second);
        tokio::time::timeout(
            Duration::from_secs(5),
            progress.wait_for(|s| {
                s.attempt_id == Some(second)
                    && s.status_of(StepId::Bridge) == Some(StepStatus::Processing)
            }),
        )
        .await
        .unwrap()
        .unwrap();
        assert_eq!(sent.load(Ordering::SeqCst), 2);
    }
}
