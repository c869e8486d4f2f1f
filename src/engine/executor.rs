//! Order executor.
//!
//! Builds buy/sell calls against the shares contract, takes a nonce for
//! each, sends them, and waits for the receipt. Transaction failures are
//! logged and resolved here; nothing is resubmitted with the same nonce.

use alloy::primitives::{Bytes, TxHash, U256};
use alloy::sol_types::SolCall;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::reconciler::Reconciler;
use super::session::WalletSession;
use crate::platforms::base::SharesV1;
use crate::platforms::TxOrder;
use crate::types::Subject;

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TxError {
    #[error("submission failed: {0}")]
    Submit(String),
    #[error("receipt wait failed for {hash}: {reason}")]
    Receipt { hash: TxHash, reason: String },
    #[error("transaction {0} reverted")]
    Reverted(TxHash),
}

/// Result of a buy submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuyOutcome {
    Filled(TxHash),
    /// Another buy already holds the in-flight slot; nothing was sent.
    InFlight,
    Failed(TxError),
}

impl BuyOutcome {
    pub fn is_filled(&self) -> bool {
        matches!(self, BuyOutcome::Filled(_))
    }
}

// ---------------------------------------------------------------------------
// Executor
// ---------------------------------------------------------------------------

pub struct Executor;

impl Executor {
    /// Buy `amount` shares of `subject`, paying `value` wei.
    ///
    /// Holds the wallet's buy guard for the whole send/confirm sequence and
    /// rebuilds holdings after a successful fill.
    pub async fn submit_buy(
        session: &WalletSession,
        subject: Subject,
        value: U256,
        amount: u64,
    ) -> BuyOutcome {
        let Some(permit) = session.buy_guard.try_acquire() else {
            debug!(%subject, "Buy already in flight, skipping");
            return BuyOutcome::InFlight;
        };

        let calldata = SharesV1::buySharesCall {
            sharesSubject: subject,
            amount: U256::from(amount),
        }
        .abi_encode();
        let order = Self::order(session, calldata, value);
        let nonce = order.nonce;

        let result = Self::send_and_confirm(session, order, session.settings.buy_confirmations).await;
        drop(permit);

        match result {
            Ok(hash) => {
                info!(%subject, amount, %hash, nonce, "Buy filled");
                Reconciler::reconcile(session).await;
                BuyOutcome::Filled(hash)
            }
            Err(e) => {
                warn!(%subject, amount, nonce, error = %e, "Buy failed");
                BuyOutcome::Failed(e)
            }
        }
    }

    /// Sell `amount` shares of `subject`. Returns whether the sale landed.
    pub async fn submit_sell(session: &WalletSession, subject: Subject, amount: U256) -> bool {
        let calldata = SharesV1::sellSharesCall {
            sharesSubject: subject,
            amount,
        }
        .abi_encode();
        let order = Self::order(session, calldata, U256::ZERO);
        let nonce = order.nonce;

        match Self::send_and_confirm(session, order, session.settings.sell_confirmations).await {
            Ok(hash) => {
                info!(%subject, %amount, %hash, nonce, "Sell filled");
                true
            }
            Err(e) => {
                warn!(%subject, %amount, nonce, error = %e, "Sell failed");
                false
            }
        }
    }

    /// Takes the next nonce: the slot is spent even if sending fails.
    fn order(session: &WalletSession, calldata: Vec<u8>, value: U256) -> TxOrder {
        TxOrder {
            calldata: Bytes::from(calldata),
            value,
            nonce: session.nonce.next(),
            gas_price: session.settings.gas_price,
            gas_limit: session.settings.gas_limit,
        }
    }

    async fn send_and_confirm(
        session: &WalletSession,
        order: TxOrder,
        confirmations: u64,
    ) -> Result<TxHash, TxError> {
        let market = &session.platforms.market;
        let nonce = order.nonce;
        let hash = market
            .send_transaction(order)
            .await
            .map_err(|e| TxError::Submit(format!("{e:#}")))?;
        info!(%hash, nonce, confirmations, "Sent tx");

        match market.wait_for_receipt(hash, confirmations).await {
            Ok(true) => Ok(hash),
            Ok(false) => Err(TxError::Reverted(hash)),
            Err(e) => Err(TxError::Receipt {
                hash,
                reason: format!("{e:#}"),
            }),
        }
    }
}
