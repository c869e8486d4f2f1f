//! Position reconciler.
//!
//! Rebuilds the wallet's holdings from the portfolio snapshot plus its
//! buy history on the ledger. Every pass replaces the whole set.
//!
//! Cost attribution replays buy fills newest first and folds at most
//! `balance` of them into a holding's cost. It does not track which fills
//! were later sold, so after partial sells the basis is an approximation.

use alloy::primitives::{Address, U256};
use alloy::sol_types::SolCall;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tracing::{debug, info};

use super::session::WalletSession;
use crate::platforms::base::SharesV1;
use crate::retry;
use crate::types::{Holding, PortfolioEntry, Subject, TransactionRecord};

/// A buy fill recovered from ledger history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Purchase {
    pub subject: Subject,
    pub cost: U256,
    pub timestamp: i64,
}

pub struct Reconciler;

impl Reconciler {
    /// Rebuild the session's holdings. Returns the number kept.
    ///
    /// Refreshes the nonce first. Portfolio and history reads retry until
    /// they succeed.
    pub async fn reconcile(session: &WalletSession) -> usize {
        session.refresh_nonce().await;

        let wallet = session.address;
        let policy = session.settings.retry;
        let api = &session.platforms.api;
        let snapshot =
            retry::until_ok("portfolio", policy.read_delay, || api.portfolio(wallet)).await;

        if snapshot.is_empty() {
            session.replace_holdings(Vec::new()).await;
            info!("Portfolio empty, holdings cleared");
            return 0;
        }

        let ledger = &session.platforms.ledger;
        let history =
            retry::until_ok("txlist", policy.history_delay, || ledger.transactions(wallet)).await;
        let purchases = extract_purchases(&history, session.settings.contract);
        let listed = snapshot.len();
        let holdings = merge_costs(snapshot, &purchases, Utc::now());
        let kept = holdings.len();

        session.replace_holdings(holdings).await;
        info!(
            listed,
            kept,
            untracked = listed - kept,
            buys = purchases.len(),
            "Holdings reconciled"
        );
        kept
    }
}

/// Successful `buyShares` calls to `contract`, in ledger order.
pub fn extract_purchases(history: &[TransactionRecord], contract: Address) -> Vec<Purchase> {
    history
        .iter()
        .filter(|tx| {
            tx.success
                && tx.to == Some(contract)
                && tx.input.starts_with(&SharesV1::buySharesCall::SELECTOR)
        })
        .filter_map(|tx| match SharesV1::buySharesCall::abi_decode(&tx.input) {
            Ok(call) => Some(Purchase {
                subject: call.sharesSubject,
                cost: tx.cost(),
                timestamp: tx.timestamp,
            }),
            Err(e) => {
                debug!(error = %e, "Undecodable buyShares input");
                None
            }
        })
        .collect()
}

/// Fold purchases into the snapshot.
///
/// The first matching purchase opens the basis; later ones add to it while
/// fewer than `balance` fills have been counted. Holding age comes from the
/// oldest matching buy, counted or not. Entries with no matching purchase
/// are dropped.
pub fn merge_costs(
    snapshot: Vec<PortfolioEntry>,
    purchases: &[Purchase],
    now: DateTime<Utc>,
) -> Vec<Holding> {
    let mut holdings: Vec<Holding> = snapshot
        .into_iter()
        .map(|entry| Holding {
            subject: entry.subject,
            name: entry.name,
            balance: entry.balance,
            cost: U256::ZERO,
            purchases: 0,
            holding_hours: 0,
        })
        .collect();
    let index: HashMap<Subject, usize> = holdings
        .iter()
        .enumerate()
        .map(|(i, h)| (h.subject, i))
        .collect();
    let mut first_bought: HashMap<Subject, i64> = HashMap::new();

    for purchase in purchases {
        let Some(&i) = index.get(&purchase.subject) else {
            continue;
        };
        let holding = &mut holdings[i];
        // History is newest first, so the last match replayed is the oldest.
        first_bought.insert(purchase.subject, purchase.timestamp);
        if holding.purchases == 0 || holding.purchases < holding.balance {
            holding.purchases += 1;
            holding.cost += purchase.cost;
        }
    }

    holdings.retain(|h| h.purchases > 0);
    for holding in &mut holdings {
        if let Some(&ts) = first_bought.get(&holding.subject) {
            holding.holding_hours = (now.timestamp() - ts).div_euclid(3600);
        }
    }
    holdings
}
