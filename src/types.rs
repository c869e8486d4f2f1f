//! Shared types for the shares agent.
//!
//! These types form the data model used across all modules. Platform
//! clients decode their wire formats into these; the strategy and engine
//! modules only ever see these shapes.

use alloy::primitives::{Address, Bytes, U256};
use chrono::{DateTime, Utc};
use rust_decimal::prelude::*;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// A subject is identified by its address.
pub type Subject = Address;

const WEI_DECIMALS: u32 = 18;

// ---------------------------------------------------------------------------
// Units
// ---------------------------------------------------------------------------

/// Convert a wei amount into ETH.
///
/// Amounts too large for `Decimal` saturate to `Decimal::MAX`, which every
/// price ceiling rejects.
pub fn wei_to_eth(wei: U256) -> Decimal {
    u128::try_from(wei)
        .ok()
        .and_then(|raw| i128::try_from(raw).ok())
        .and_then(|raw| Decimal::try_from_i128_with_scale(raw, WEI_DECIMALS).ok())
        .map(|eth| eth.normalize())
        .unwrap_or(Decimal::MAX)
}

/// Convert a gwei amount (as configured) into wei.
pub fn gwei_to_wei(gwei: Decimal) -> u128 {
    (gwei * Decimal::from(1_000_000_000u64))
        .trunc()
        .to_u128()
        .unwrap_or_default()
}

// ---------------------------------------------------------------------------
// Chain events
// ---------------------------------------------------------------------------

/// A decoded `Trade` log from the shares contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TradeEvent {
    pub subject: Subject,
    pub trader: Address,
    /// ETH paid or received for the trade, in wei.
    pub eth_amount: U256,
    pub is_buy: bool,
    /// Share supply of the subject after the trade.
    pub supply: U256,
    pub block_number: Option<u64>,
    pub log_index: Option<u64>,
}

impl TradeEvent {
    /// A zero-value trade is the subject buying its own first share.
    pub fn is_first_trade(&self) -> bool {
        self.eth_amount.is_zero()
    }

    pub fn eth_price(&self) -> Decimal {
        wei_to_eth(self.eth_amount)
    }
}

// ---------------------------------------------------------------------------
// Holdings
// ---------------------------------------------------------------------------

/// A wallet's reconciled position in one subject.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Holding {
    pub subject: Subject,
    pub name: Option<String>,
    /// Share count as reported by the portfolio snapshot.
    pub balance: u64,
    /// Cumulative cost basis in wei.
    pub cost: U256,
    /// Number of buy fills folded into `cost`.
    pub purchases: u64,
    /// Whole hours since the most recent attributed purchase.
    pub holding_hours: i64,
}

impl Holding {
    pub fn cost_eth(&self) -> Decimal {
        wei_to_eth(self.cost)
    }
}

impl fmt::Display for Holding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}) balance={} cost={} ETH held={}h",
            self.subject,
            self.name.as_deref().unwrap_or("?"),
            self.balance,
            self.cost_eth(),
            self.holding_hours,
        )
    }
}

/// One row of the portfolio snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PortfolioEntry {
    pub subject: Subject,
    #[serde(deserialize_with = "u64_from_str_or_num")]
    pub balance: u64,
    #[serde(default)]
    pub name: Option<String>,
}

// ---------------------------------------------------------------------------
// Activity feed
// ---------------------------------------------------------------------------

/// A party (subject or trader) on an activity event.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Party {
    pub address: Address,
    #[serde(default)]
    pub username: Option<String>,
}

/// One entry of a wallet's holdings-activity feed, newest first.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityEvent {
    pub subject: Party,
    pub trader: Party,
    pub is_buy: bool,
    /// Creation time in milliseconds since epoch.
    pub create_at: i64,
}

impl ActivityEvent {
    /// Identity used to relocate a cursor inside a newer feed.
    pub fn same_event(&self, other: &ActivityEvent) -> bool {
        self.subject.address == other.subject.address
            && self.create_at == other.create_at
            && self.trader.address == other.trader.address
    }

    /// A buy by anyone other than `wallet`.
    pub fn is_third_party_buy(&self, wallet: Address) -> bool {
        self.is_buy && self.trader.address != wallet
    }
}

// ---------------------------------------------------------------------------
// Ledger history
// ---------------------------------------------------------------------------

/// A historical on-chain call from the ledger-history provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionRecord {
    pub from: Address,
    pub to: Option<Address>,
    pub input: Bytes,
    pub gas_used: U256,
    pub gas_price: U256,
    pub value: U256,
    pub success: bool,
    /// Block timestamp in seconds since epoch.
    pub timestamp: i64,
}

impl TransactionRecord {
    /// Cost attributed to this call: doubled gas spend plus value sent.
    pub fn cost(&self) -> U256 {
        self.gas_used * self.gas_price * U256::from(2u8) + self.value
    }

    pub fn timestamp_utc(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.timestamp, 0)
    }
}

// ---------------------------------------------------------------------------
// Profiles
// ---------------------------------------------------------------------------

/// Social metrics for a handle.
#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
pub struct SocialMetrics {
    #[serde(default, rename = "isBlueVerified")]
    pub is_blue_verified: bool,
    #[serde(default, rename = "viewAvg")]
    pub view_avg: f64,
    #[serde(default, rename = "favoriteAvg")]
    pub favorite_avg: f64,
    #[serde(default, rename = "followers_count")]
    pub followers: u64,
    #[serde(default, rename = "statuses_count")]
    pub posts: u64,
}

/// Cached subject metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct ProfileInfo {
    pub subject: Subject,
    pub handle: String,
    pub metrics: Option<SocialMetrics>,
}

// ---------------------------------------------------------------------------
// Serde helpers
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
#[serde(untagged)]
enum NumOrStr {
    Num(u64),
    Str(String),
}

/// Accept either a JSON number or a decimal string.
pub(crate) fn u64_from_str_or_num<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    match NumOrStr::deserialize(deserializer)? {
        NumOrStr::Num(n) => Ok(n),
        NumOrStr::Str(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
