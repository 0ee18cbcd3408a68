//! Step planning: which user action comes next, and which progress steps a
//! transaction type expands into.

use super::{BridgeProtocol, SwapStep, TransactionType};
use crate::state::{ProgressStore, StepId};

use ethers::types::U256;
use uuid::Uuid;

const SWAP_STEPS: &[StepId] = &[StepId::Swap];
const BRIDGE_STEPS: &[StepId] = &[StepId::SendOrigin, StepId::Bridge, StepId::TransferRemote];
const BRIDGE_SWAP_STEPS: &[StepId] = &[
    StepId::SendOrigin,
    StepId::Bridge,
    StepId::Swap,
    StepId::TransferRemote,
];
const SWAP_BRIDGE_STEPS: &[StepId] = &[StepId::Swap, StepId::Bridge];

/// Ordered progress steps for a transaction type
pub fn step_sequence(transaction_type: &TransactionType) -> &'static [StepId] {
    match transaction_type {
        TransactionType::Swap { .. } => SWAP_STEPS,
        TransactionType::Bridge { .. } => BRIDGE_STEPS,
        TransactionType::BridgeSwap { .. } => BRIDGE_SWAP_STEPS,
        TransactionType::SwapBridge { .. } => SWAP_BRIDGE_STEPS,
    }
}

/// Whether the origin call pulls the input token through an allowance.
///
/// Native input is sent as value. A Superchain bridge burns the token
/// directly from the sender, so nothing has to be approved.
pub fn requires_allowance(transaction_type: &TransactionType) -> bool {
    if transaction_type.currency_in().is_native() {
        return false;
    }

    !matches!(
        transaction_type,
        TransactionType::Bridge {
            protocol: BridgeProtocol::Superchain,
            ..
        }
    )
}

/// Next action the user can take, or `None` when the action must be disabled
pub fn next_step(
    transaction_type: Option<&TransactionType>,
    wallet_connected: bool,
    current_allowance: U256,
    required_amount: U256,
) -> Option<SwapStep> {
    let transaction_type = transaction_type?;

    if !wallet_connected || required_amount.is_zero() {
        return None;
    }

    if requires_allowance(transaction_type) && current_allowance < required_amount {
        return Some(SwapStep::ApprovePermit2);
    }

    Some(SwapStep::ExecuteSwap)
}

/// Expand `transaction_type` into idle steps in `store`. Returns the new attempt id.
pub fn initialize_transaction_steps(store: &ProgressStore, transaction_type: &TransactionType) -> Uuid {
    store.initialize(step_sequence(transaction_type))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::StepStatus;
    use crate::transaction::fixtures::*;

    #[test]
    fn test_step_sequences() {
        let ids = |t: TransactionType| step_sequence(&t).to_vec();

        assert_eq!(ids(swap(1)), vec![StepId::Swap]);
        assert_eq!(
            ids(bridge(BridgeProtocol::Hyperlane)),
            vec![StepId::SendOrigin, StepId::Bridge, StepId::TransferRemote]
        );
        assert_eq!(
            ids(swap_bridge(BridgeProtocol::Hyperlane)),
            vec![StepId::Swap, StepId::Bridge]
        );
    }

    #[test]
    fn test_bridge_swap_initializes_four_idle_steps() {
        let store = ProgressStore::new();
        initialize_transaction_steps(&store, &bridge_swap(BridgeProtocol::Hyperlane));

        let state = store.snapshot();
        let ids: Vec<_> = state.steps.iter().map(|s| s.id).collect();
        assert_eq!(
            ids,
            vec![
                StepId::SendOrigin,
                StepId::Bridge,
                StepId::Swap,
                StepId::TransferRemote
            ]
        );
        assert!(state.steps.iter().all(|s| s.status == StepStatus::Idle));
        assert_eq!(state.current_step_id, Some(StepId::SendOrigin));
    }

    #[test]
    fn test_missing_preconditions_disable_action() {
        let tx_type = swap(1);
        let amount = U256::from(1_000u64);

        assert_eq!(next_step(None, true, U256::MAX, amount), None);
        assert_eq!(next_step(Some(&tx_type), false, U256::MAX, amount), None);
        assert_eq!(next_step(Some(&tx_type), true, U256::MAX, U256::zero()), None);
    }

    #[test]
    fn test_insufficient_allowance_needs_approval() {
        let tx_type = swap(1);
        let step = next_step(Some(&tx_type), true, U256::from(999u64), U256::from(1_000u64));
        assert_eq!(step, Some(SwapStep::ApprovePermit2));
    }

    #[test]
    fn test_approval_never_returns_once_satisfied() {
        let tx_type = swap_bridge(BridgeProtocol::Hyperlane);
        let required = U256::from(1_000u64);

        for allowance in [required, required + 1, U256::MAX] {
            for _ in 0..3 {
                assert_eq!(
                    next_step(Some(&tx_type), true, allowance, required),
                    Some(SwapStep::ExecuteSwap)
                );
            }
        }
    }

    #[test]
    fn test_native_input_skips_approval() {
        let tx_type = TransactionType::Swap {
            currency_in: native(1),
            currency_out: token(1, 0xa1, "USDC"),
            chain_id: 1,
            with_superchain: false,
        };
        assert_eq!(
            next_step(Some(&tx_type), true, U256::zero(), U256::from(1u64)),
            Some(SwapStep::ExecuteSwap)
        );
    }

    #[test]
    fn test_superchain_bridge_skips_approval() {
        let tx_type = bridge(BridgeProtocol::Superchain);
        assert!(!requires_allowance(&tx_type));
        assert_eq!(
            next_step(Some(&tx_type), true, U256::zero(), U256::from(1u64)),
            Some(SwapStep::ExecuteSwap)
        );
        assert!(requires_allowance(&bridge(BridgeProtocol::Hyperlane)));
    }
}
