//! Call building: fresh quote, slippage bound, stale-quote guard, encoding

use crate::encoder::{BuildParams, CallEncoder};
use crate::error::{OrchestratorError, OrchestratorResult};
use crate::quote::{Quote, QuoteOracle};
use crate::transaction::{Currency, RawCall, TransactionType};

use chrono::Utc;
use ethers::types::{Address, U256};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, info};

const BPS: u64 = 10_000;

/// What the user asked for
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildRequest {
    pub amount_in: U256,
    /// Output the client displayed; a fresh quote must still honour it
    #[serde(default)]
    pub expected_amount_out: Option<U256>,
    /// Defaults to the sender
    #[serde(default)]
    pub recipient: Option<Address>,
}

pub struct CallBuilder {
    quoter: Arc<dyn QuoteOracle>,
    encoder: Arc<dyn CallEncoder>,
    slippage_bps: u32,
    deadline_secs: u64,
}

impl CallBuilder {
    pub fn new(
        quoter: Arc<dyn QuoteOracle>,
        encoder: Arc<dyn CallEncoder>,
        slippage_bps: u32,
        deadline_secs: u64,
    ) -> Self {
        Self {
            quoter,
            encoder,
            slippage_bps,
            deadline_secs,
        }
    }

    /// Lower `amount` by the configured slippage. Never overflows: amounts
    /// too large to scale are divided first.
    pub fn apply_slippage(&self, amount: U256) -> U256 {
        let keep = U256::from(BPS.saturating_sub(u64::from(self.slippage_bps)));
        match amount.checked_mul(keep) {
            Some(scaled) => scaled / U256::from(BPS),
            None => amount / U256::from(BPS) * keep,
        }
    }

    /// Encode the origin call of `transaction_type` for `sender`.
    ///
    /// Any failure here happens before submission, so it never touches
    /// progress state.
    pub async fn build(
        &self,
        transaction_type: &TransactionType,
        sender: Address,
        request: &BuildRequest,
    ) -> OrchestratorResult<RawCall> {
        if request.amount_in.is_zero() {
            return Err(OrchestratorError::Quote("Amount must be positive".to_string()));
        }

        let quote = match swap_leg(transaction_type) {
            Some((currency_in, currency_out)) => Some(
                self.quoter
                    .quote(currency_in, currency_out, request.amount_in)
                    .await?,
            ),
            None => None,
        };

        if let (Some(quote), Some(expected)) = (&quote, request.expected_amount_out) {
            self.check_fresh(quote, expected)?;
        }

        let min_amount_out = match &quote {
            Some(quote) => self.apply_slippage(quote.amount_out),
            None => request.amount_in,
        };

        let params = BuildParams {
            sender,
            recipient: request.recipient.unwrap_or(sender),
            amount_in: request.amount_in,
            min_amount_out,
            route: quote.map(|q| q.route),
            deadline: Utc::now().timestamp().max(0) as u64 + self.deadline_secs,
        };
        debug!("Building {} with {:?}", transaction_type.name(), params);

        let call = self
            .encoder
            .build_transaction(transaction_type, &params)
            .await?
            .ok_or_else(|| {
                OrchestratorError::NoRoute(format!(
                    "Cannot build {} for {} -> {}",
                    transaction_type.name(),
                    transaction_type.currency_in(),
                    transaction_type.currency_out()
                ))
            })?;

        if call.chain_id != transaction_type.chain_in() {
            return Err(OrchestratorError::Internal(format!(
                "Encoder targeted chain {} for a call signed on chain {}",
                call.chain_id,
                transaction_type.chain_in()
            )));
        }

        info!(
            "Built {} call to {:?} on chain {}",
            transaction_type.name(),
            call.to,
            call.chain_id
        );
        Ok(call)
    }

    /// The fresh quote must not fall below what the client promised, less slippage
    fn check_fresh(&self, quote: &Quote, expected: U256) -> OrchestratorResult<()> {
        let floor = self.apply_slippage(expected);
        if quote.amount_out < floor {
            return Err(OrchestratorError::StaleQuote {
                expected: floor.to_string(),
                current: quote.amount_out.to_string(),
            });
        }
        Ok(())
    }
}

/// Pair quoted for the swap leg, if the type has one
fn swap_leg(transaction_type: &TransactionType) -> Option<(&Currency, &Currency)> {
    match transaction_type {
        TransactionType::Swap {
            currency_in,
            currency_out,
            ..
        } => Some((currency_in, currency_out)),
        TransactionType::SwapBridge {
            currency_in,
            bridged,
            ..
        } => Some((currency_in, bridged)),
        TransactionType::BridgeSwap {
            bridged,
            currency_out,
            ..
        } => Some((bridged, currency_out)),
        TransactionType::Bridge { .. } => None,
    }
}
