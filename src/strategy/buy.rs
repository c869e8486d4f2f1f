//! Buy-side decision surface.
//!
//! Stages run in a fixed order for every candidate subject and any
//! negative answer ends evaluation for that subject:
//!
//! 1. [`BuyEvaluator::could_be_bought`]: cheap, no I/O.
//! 2. [`BuyEvaluator::is_whitelisted`]: whitelist lookup by handle.
//! 3. [`BuyEvaluator::should_fetch_social`]: gates the social lookup
//!    (skipped for whitelisted subjects).
//! 4. [`BuyEvaluator::should_fetch_price`]: gates a fresh on-chain quote.
//! 5. [`BuyEvaluator::should_buy`]: final call on the live price.

use alloy::primitives::Address;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::HashSet;
use tracing::debug;

use crate::types::{Holding, SocialMetrics, Subject, TradeEvent};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// A subject exempt from standard filtering.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct WhitelistEntry {
    pub handle: String,
    /// Shares to buy per order.
    #[serde(default = "default_buy_amount")]
    pub buy_amount: u64,
    /// Price ceiling (ETH) for this subject.
    pub max_price: Decimal,
}

fn default_buy_amount() -> u64 {
    1
}

/// Minimum social reach for non-whitelisted subjects.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct SocialThresholds {
    #[serde(default)]
    pub min_followers: u64,
    #[serde(default)]
    pub min_posts: u64,
    #[serde(default)]
    pub min_view_avg: f64,
    #[serde(default)]
    pub min_favorite_avg: f64,
}

/// Buy thresholds, read-only once loaded.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BuyStrategy {
    /// Price ceiling (ETH) for non-whitelisted subjects.
    pub max_price: Decimal,
    /// Skip subjects whose supply is already above this.
    #[serde(default)]
    pub max_supply: Option<u64>,
    #[serde(default)]
    pub only_buy_blue_verified: bool,
    /// Reject subjects when no social metrics are available.
    #[serde(default)]
    pub require_social: bool,
    #[serde(default)]
    pub social: SocialThresholds,
    /// Minimum ETH bridged into the subject's wallet.
    #[serde(default)]
    pub min_bridged_eth: Option<Decimal>,
    #[serde(default)]
    pub whitelist: Vec<WhitelistEntry>,
}

impl Default for BuyStrategy {
    fn default() -> Self {
        Self {
            max_price: Decimal::new(1, 2),
            max_supply: None,
            only_buy_blue_verified: false,
            require_social: false,
            social: SocialThresholds::default(),
            min_bridged_eth: None,
            whitelist: Vec::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Candidate facts
// ---------------------------------------------------------------------------

/// On-chain facts about the subject's account.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AccountInfo {
    pub supply: u64,
    pub bridged_eth: Option<Decimal>,
}

impl AccountInfo {
    pub fn from_event(event: &TradeEvent) -> Self {
        Self {
            supply: u64::try_from(event.supply).unwrap_or(u64::MAX),
            bridged_eth: None,
        }
    }
}

/// The candidate being evaluated.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyInfo {
    pub subject: Subject,
    pub handle: String,
    /// Last known share price in ETH: the triggering trade's price until a
    /// live quote replaces it.
    pub price: Decimal,
    pub whitelist: Option<WhitelistEntry>,
}

// ---------------------------------------------------------------------------
// Evaluator
// ---------------------------------------------------------------------------

pub struct BuyEvaluator {
    strategy: BuyStrategy,
    bots: HashSet<Address>,
    wallet: Address,
}

impl BuyEvaluator {
    pub fn new(strategy: BuyStrategy, bots: HashSet<Address>, wallet: Address) -> Self {
        Self {
            strategy,
            bots,
            wallet,
        }
    }

    pub fn strategy(&self) -> &BuyStrategy {
        &self.strategy
    }

    /// Price ceiling applied to trade events before any evaluation.
    pub fn max_price(&self) -> Decimal {
        self.strategy.max_price
    }

    /// Stage 1: bots, our own wallet, and subjects we already hold are out.
    pub fn could_be_bought(&self, event: &TradeEvent, holdings: &[Holding]) -> bool {
        if self.bots.contains(&event.subject) || self.bots.contains(&event.trader) {
            return false;
        }
        if event.subject == self.wallet || event.trader == self.wallet {
            return false;
        }
        !holdings.iter().any(|h| h.subject == event.subject)
    }

    /// Stage 2: whitelist lookup (case-insensitive handle match).
    pub fn is_whitelisted(&self, handle: &str) -> Option<&WhitelistEntry> {
        self.strategy
            .whitelist
            .iter()
            .find(|w| w.handle.eq_ignore_ascii_case(handle))
    }

    /// Whether the bridged-amount lookup is worth making at all.
    pub fn needs_bridged_amount(&self) -> bool {
        self.strategy.min_bridged_eth.is_some()
    }

    /// Stage 3: is the subject worth a social lookup?
    pub fn should_fetch_social(&self, account: &AccountInfo, key: &KeyInfo) -> bool {
        if key.whitelist.is_some() {
            return false;
        }
        if key.price > self.strategy.max_price || !self.supply_ok(account) {
            return false;
        }
        match self.strategy.min_bridged_eth {
            Some(min) => account.bridged_eth.is_some_and(|b| b >= min),
            None => true,
        }
    }

    /// Verification gate applied right after the social lookup. Missing
    /// metrics cannot prove verification.
    pub fn passes_verification(&self, social: Option<&SocialMetrics>) -> bool {
        !self.strategy.only_buy_blue_verified || social.is_some_and(|m| m.is_blue_verified)
    }

    /// Stage 4: is the subject worth a fresh price quote?
    pub fn should_fetch_price(
        &self,
        account: &AccountInfo,
        social: Option<&SocialMetrics>,
        key: &KeyInfo,
    ) -> bool {
        key.price <= self.price_ceiling(key) && self.qualifies(account, social, key)
    }

    /// Stage 5: buy at the live price carried in `key`?
    pub fn should_buy(
        &self,
        account: &AccountInfo,
        social: Option<&SocialMetrics>,
        key: &KeyInfo,
    ) -> bool {
        let ok = key.price > Decimal::ZERO
            && key.price <= self.price_ceiling(key)
            && self.qualifies(account, social, key);
        debug!(
            subject = %key.subject,
            handle = %key.handle,
            price = %key.price,
            ceiling = %self.price_ceiling(key),
            ok,
            "Buy decision"
        );
        ok
    }

    /// Highest acceptable price for this candidate.
    pub fn price_ceiling(&self, key: &KeyInfo) -> Decimal {
        key.whitelist
            .as_ref()
            .map(|w| w.max_price)
            .unwrap_or(self.strategy.max_price)
    }

    /// Shares to buy in one order.
    pub fn buy_amount(&self, key: &KeyInfo) -> u64 {
        key.whitelist.as_ref().map(|w| w.buy_amount).unwrap_or(1)
    }

    fn qualifies(
        &self,
        account: &AccountInfo,
        social: Option<&SocialMetrics>,
        key: &KeyInfo,
    ) -> bool {
        key.whitelist.is_some() || (self.supply_ok(account) && self.social_ok(social))
    }

    fn supply_ok(&self, account: &AccountInfo) -> bool {
        self.strategy
            .max_supply
            .map_or(true, |max| account.supply <= max)
    }

    fn social_ok(&self, social: Option<&SocialMetrics>) -> bool {
        let t = &self.strategy.social;
        match social {
            None => !self.strategy.require_social,
            Some(m) => {
                m.followers >= t.min_followers
                    && m.posts >= t.min_posts
                    && m.view_avg >= t.min_view_avg
                    && m.favorite_avg >= t.min_favorite_avg
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
