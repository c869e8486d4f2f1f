//! Buy pipeline.
//!
//! Consumes trade batches from the watcher and runs each candidate through
//! the buy stages, fetching profile, social, and price data only when the
//! previous stage says it is worth it.

use alloy::primitives::U256;
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::{debug, info};

use super::executor::Executor;
use super::session::WalletSession;
use crate::retry;
use crate::strategy::buy::{AccountInfo, KeyInfo};
use crate::types::{wei_to_eth, Subject, TradeEvent};

/// Drain batches until the watcher side of the channel is gone.
pub async fn run(session: Arc<WalletSession>, mut batches: mpsc::Receiver<Vec<TradeEvent>>) {
    while let Some(batch) = batches.recv().await {
        if handle_batch(&session, batch).await {
            // Anything queued while the buy was in flight is stale.
            let mut dropped = 0usize;
            while batches.try_recv().is_ok() {
                dropped += 1;
            }
            if dropped > 0 {
                debug!(dropped, "Discarded batches queued during buy");
            }
        }
    }
    debug!("Buy pipeline stopped");
}

/// Evaluate one batch. Returns whether a buy filled.
pub async fn handle_batch(session: &WalletSession, batch: Vec<TradeEvent>) -> bool {
    if session.buy_guard.is_held() || session.is_selling() {
        debug!(events = batch.len(), "Busy, batch skipped");
        return false;
    }

    for event in batch.iter().filter(|e| e.is_first_trade()) {
        info!(subject = %event.subject, "New user");
    }

    let max_price = session.buy_eval.max_price();
    let holdings = session.holdings().await;
    let candidates: Vec<&TradeEvent> = batch
        .iter()
        .filter(|e| e.eth_price() < max_price && session.buy_eval.could_be_bought(e, &holdings))
        .collect();
    if candidates.is_empty() {
        return false;
    }
    debug!(events = batch.len(), candidates = candidates.len(), "Evaluating batch");

    let mut bought = false;
    for event in candidates {
        if session.is_selling() {
            debug!("Sell cycle started, abandoning batch");
            break;
        }
        // A buy earlier in this batch may have changed holdings.
        if bought && !session.buy_eval.could_be_bought(event, &session.holdings().await) {
            continue;
        }
        bought |= evaluate(session, event).await;
    }
    bought
}

/// Run one candidate through the buy stages. Returns whether a buy filled.
async fn evaluate(session: &WalletSession, event: &TradeEvent) -> bool {
    let started = Instant::now();
    let eval = &session.buy_eval;

    let Some(profile) = session.profiles.resolve(event.subject).await else {
        return false;
    };
    let mut key = KeyInfo {
        subject: event.subject,
        handle: profile.handle.clone(),
        price: event.eth_price(),
        whitelist: eval.is_whitelisted(&profile.handle).cloned(),
    };
    let mut account = AccountInfo::from_event(event);
    let mut social = None;

    if key.whitelist.is_none() {
        if eval.needs_bridged_amount() {
            account.bridged_eth = bridged_amount(session, event.subject).await;
        }
        if !eval.should_fetch_social(&account, &key) {
            debug!(handle = %key.handle, bridged = ?account.bridged_eth, "Account gate failed, skipping");
            return false;
        }
        let metrics = session.profiles.metrics(&profile).await;
        if !eval.passes_verification(metrics.as_ref()) {
            debug!(handle = %key.handle, "Not verified, skipping");
            return false;
        }
        if let Some(metrics) = metrics {
            info!(
                subject = %key.subject,
                handle = %key.handle,
                supply = account.supply,
                followers = metrics.followers,
                posts = metrics.posts,
                view_avg = metrics.view_avg,
                favorite_avg = metrics.favorite_avg,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Social info"
            );
            social = Some(metrics);
        }
    }

    if !eval.should_fetch_price(&account, social.as_ref(), &key) {
        return false;
    }
    let amount = eval.buy_amount(&key);
    let quote = buy_price(session, key.subject, amount).await;
    key.price = wei_to_eth(quote);

    if !eval.should_buy(&account, social.as_ref(), &key) || session.is_selling() {
        return false;
    }
    info!(
        target: "work",
        wallet = %session.address,
        action = "buy",
        subject = %key.subject,
        handle = %key.handle,
        price = %key.price,
        amount,
        "Trade decision"
    );
    Executor::submit_buy(session, key.subject, quote, amount)
        .await
        .is_filled()
}

/// Live quote. A zero quote counts as a failed read.
async fn buy_price(session: &WalletSession, subject: Subject, amount: u64) -> U256 {
    let market = &session.platforms.market;
    retry::until_ok("buy_price", session.settings.retry.read_delay, || async move {
        match market.buy_price(subject, amount).await {
            Ok(price) if price.is_zero() => Err(anyhow::anyhow!("zero buy quote for {subject}")),
            other => other,
        }
    })
    .await
}

async fn bridged_amount(session: &WalletSession, subject: Subject) -> Option<Decimal> {
    let ledger = &session.platforms.ledger;
    let policy = session.settings.retry;
    let result = retry::bounded(
        "bridged_amount",
        policy.enrichment_retries,
        policy.enrichment_delay,
        || ledger.bridged_amount(subject),
    )
    .await;
    match result {
        Ok(amount) => Some(amount),
        Err(e) => {
            debug!(%subject, error = %e, "Bridged amount unavailable");
            None
        }
    }
}
