//! Activity poller and sell cycle.
//!
//! Every poll interval the wallet's holdings-activity feed is checked
//! against a cursor (the newest event seen last time). New third-party
//! buys, or a cursor that has rotated out of the feed, trigger a
//! reconcile followed by a sell cycle. The poller also re-subscribes the
//! trade watcher after each poll.

use alloy::primitives::Address;
use anyhow::Result;
use rust_decimal::Decimal;
use std::sync::Arc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use super::executor::Executor;
use super::reconciler::Reconciler;
use super::session::WalletSession;
use super::watcher::EventWatcher;
use crate::retry;
use crate::strategy::sell::{profit_usd, SellTally};
use crate::types::{wei_to_eth, ActivityEvent, Holding};

// ---------------------------------------------------------------------------
// Feed change detection
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedChange {
    /// The feed had no events.
    Empty,
    /// First poll: cursor established, nothing else.
    Seeded,
    /// Cursor found; no new third-party buys above it.
    Unchanged,
    /// Cursor found with this many new third-party buys above it.
    NewBuys(usize),
    /// Cursor no longer in the feed.
    CursorLost,
}

impl FeedChange {
    pub fn triggers_sell(&self) -> bool {
        matches!(self, FeedChange::NewBuys(_) | FeedChange::CursorLost)
    }
}

/// Compare a newest-first feed against the previous cursor.
pub fn detect_change(
    cursor: Option<&ActivityEvent>,
    feed: &[ActivityEvent],
    wallet: Address,
) -> FeedChange {
    if feed.is_empty() {
        return FeedChange::Empty;
    }
    let Some(cursor) = cursor else {
        return FeedChange::Seeded;
    };
    match feed.iter().position(|e| e.same_event(cursor)) {
        Some(index) => {
            let buys = feed[..index]
                .iter()
                .filter(|e| e.is_third_party_buy(wallet))
                .count();
            if buys > 0 {
                FeedChange::NewBuys(buys)
            } else {
                FeedChange::Unchanged
            }
        }
        None => FeedChange::CursorLost,
    }
}

// ---------------------------------------------------------------------------
// Poller
// ---------------------------------------------------------------------------

pub struct ActivityPoller {
    session: Arc<WalletSession>,
    watcher: Arc<EventWatcher>,
    cursor: Option<ActivityEvent>,
}

impl ActivityPoller {
    pub fn new(session: Arc<WalletSession>, watcher: Arc<EventWatcher>) -> Self {
        Self {
            session,
            watcher,
            cursor: None,
        }
    }

    pub fn cursor(&self) -> Option<&ActivityEvent> {
        self.cursor.as_ref()
    }

    /// Fetch the feed once and act on it.
    pub async fn poll_once(&mut self) -> Result<FeedChange> {
        let wallet = self.session.address;
        let feed = self.session.platforms.api.activity(wallet).await?;
        let change = detect_change(self.cursor.as_ref(), &feed, wallet);
        if let Some(newest) = feed.first() {
            self.cursor = Some(newest.clone());
        }

        if change.triggers_sell() {
            info!(?change, "Holdings activity changed, running sell cycle");
            Reconciler::reconcile(&self.session).await;
            sell_cycle(&self.session, &self.watcher).await;
        } else {
            debug!(?change, "Holdings activity checked");
        }
        Ok(change)
    }

    /// One timer tick: poll unless a sell cycle is running, then
    /// re-subscribe the watcher.
    pub async fn tick(&mut self) {
        if self.session.is_selling() {
            debug!("Sell cycle running, poll skipped");
            return;
        }
        if let Err(e) = self.poll_once().await {
            warn!(error = %e, "Holdings activity poll failed");
        }
        if let Err(e) = self.watcher.start().await {
            warn!(error = %e, "Trade watcher restart failed");
        }
    }

    pub async fn run(mut self) {
        let mut interval = tokio::time::interval(self.session.settings.poll_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately; polling starts one period in.
        interval.tick().await;
        loop {
            interval.tick().await;
            self.tick().await;
        }
    }
}

// ---------------------------------------------------------------------------
// Sell cycle
// ---------------------------------------------------------------------------

/// Evaluate every holding once and sell those that qualify.
///
/// Pauses the watcher for the duration and waits for any in-flight buy to
/// land before touching holdings. A sold holding is removed and the same
/// index is examined again, since the next holding has shifted into it.
pub async fn sell_cycle(session: &WalletSession, watcher: &EventWatcher) -> SellTally {
    session.refresh_nonce().await;
    let paused = watcher.stop().await;
    session.buy_guard.wait_clear().await;

    let mut tally = SellTally::default();
    {
        let _selling = session.begin_selling();
        let mut index = 0;
        while let Some(holding) = session.holding_at(index).await {
            if try_sell(session, &holding, &mut tally).await {
                session.remove_holding(holding.subject).await;
            } else {
                index += 1;
            }
        }
    }
    info!(
        sum = %tally.sum,
        positive = %tally.positive,
        negative = %tally.negative,
        total = %tally.total,
        "Sell cycle complete"
    );

    if paused {
        if let Err(e) = watcher.start().await {
            error!(error = %e, "Trade watcher failed to restart after sell cycle");
        }
    }
    tally
}

/// Quote, score, and possibly sell one holding. Returns whether it sold.
async fn try_sell(session: &WalletSession, holding: &Holding, tally: &mut SellTally) -> bool {
    let market = &session.platforms.market;
    let settings = &session.settings;
    let subject = holding.subject;

    let quote = match market.sell_price(subject, holding.balance).await {
        Ok(price) if !price.is_zero() => price,
        Ok(_) => {
            debug!(%subject, "Zero sell quote, skipping");
            return false;
        }
        Err(e) => {
            warn!(%subject, error = %e, "Sell quote failed, skipping");
            return false;
        }
    };
    let sell_eth = wei_to_eth(quote) * settings.sell_price_factor;
    let profit = profit_usd(sell_eth, holding.cost_eth(), settings.eth_usd_rate);
    info!(
        %subject,
        name = holding.name.as_deref().unwrap_or("?"),
        balance = holding.balance,
        %profit,
        holding_hours = holding.holding_hours,
        "Holding evaluated"
    );

    let owned = retry::until_ok("shares_balance", settings.retry.read_delay, || {
        market.shares_balance(subject, session.address)
    })
    .await;
    tally.record(profit, sell_eth);
    if owned.is_zero() {
        debug!(%subject, "No longer held on-chain");
        return false;
    }

    let eval = &session.sell_eval;
    if sell_eth <= Decimal::ZERO || !eval.could_be_sold(subject) {
        return false;
    }
    let Some(reason) = eval.should_sell(subject, profit, holding.holding_hours) else {
        return false;
    };
    info!(
        target: "work",
        wallet = %session.address,
        action = "sell",
        %subject,
        handle = holding.name.as_deref().unwrap_or("?"),
        price = %sell_eth,
        %reason,
        "Trade decision"
    );
    Executor::submit_sell(session, subject, owned).await
}
