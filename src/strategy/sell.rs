//! Sell-side decision surface.
//!
//! [`SellEvaluator::could_be_sold`] is the cheap eligibility check;
//! [`SellEvaluator::should_sell`] decides on profit and holding time.

use alloy::primitives::Address;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

use crate::types::Subject;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SellStrategy {
    /// Sell once profit (USD) reaches this.
    pub take_profit_usd: Decimal,
    /// Sell once the loss (USD) reaches this.
    #[serde(default)]
    pub stop_loss_usd: Option<Decimal>,
    /// Sell anything held at least this long, whatever the profit.
    #[serde(default)]
    pub max_holding_hours: Option<i64>,
    #[serde(default)]
    pub never_sell: Vec<Address>,
}

impl Default for SellStrategy {
    fn default() -> Self {
        Self {
            take_profit_usd: Decimal::from(10),
            stop_loss_usd: None,
            max_holding_hours: None,
            never_sell: Vec::new(),
        }
    }
}

/// Why a holding is being sold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SellReason {
    TakeProfit,
    StopLoss,
    MaxHolding,
}

impl fmt::Display for SellReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SellReason::TakeProfit => write!(f, "take-profit"),
            SellReason::StopLoss => write!(f, "stop-loss"),
            SellReason::MaxHolding => write!(f, "max-holding"),
        }
    }
}

// ---------------------------------------------------------------------------
// Evaluator
// ---------------------------------------------------------------------------

pub struct SellEvaluator {
    strategy: SellStrategy,
    wallet: Address,
}

impl SellEvaluator {
    pub fn new(strategy: SellStrategy, wallet: Address) -> Self {
        Self { strategy, wallet }
    }

    /// Our own shares and pinned subjects are never sold.
    pub fn could_be_sold(&self, subject: Subject) -> bool {
        subject != self.wallet && !self.strategy.never_sell.contains(&subject)
    }

    pub fn should_sell(
        &self,
        subject: Subject,
        profit_usd: Decimal,
        holding_hours: i64,
    ) -> Option<SellReason> {
        let reason = if profit_usd >= self.strategy.take_profit_usd {
            Some(SellReason::TakeProfit)
        } else if self
            .strategy
            .stop_loss_usd
            .is_some_and(|limit| profit_usd <= -limit)
        {
            Some(SellReason::StopLoss)
        } else if self
            .strategy
            .max_holding_hours
            .is_some_and(|max| holding_hours >= max)
        {
            Some(SellReason::MaxHolding)
        } else {
            None
        };
        debug!(%subject, %profit_usd, holding_hours, ?reason, "Sell decision");
        reason
    }
}

/// Profit in USD of selling at `sell_eth` against a cost basis of `cost_eth`.
pub fn profit_usd(sell_eth: Decimal, cost_eth: Decimal, eth_usd_rate: Decimal) -> Decimal {
    ((sell_eth - cost_eth) * eth_usd_rate).round_dp(2)
}

// ---------------------------------------------------------------------------
// Cycle tally
// ---------------------------------------------------------------------------

/// Running profit summary over one sell cycle.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SellTally {
    pub sum: Decimal,
    pub positive: Decimal,
    pub negative: Decimal,
    /// Total haircut sell value (ETH) across evaluated holdings.
    pub total: Decimal,
}

impl SellTally {
    pub fn record(&mut self, profit_usd: Decimal, sell_eth: Decimal) {
        self.sum += profit_usd;
        self.total += sell_eth;
        if profit_usd > Decimal::ZERO {
            self.positive += profit_usd;
        } else {
            self.negative += profit_usd;
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
