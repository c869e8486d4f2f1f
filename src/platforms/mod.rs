//! External collaborators.
//!
//! Defines the traits the engine talks to and provides implementations for:
//! - Base chain (alloy): share quotes, balances, transaction submission,
//!   receipts, and the live `Trade` event feed
//! - Kosetto API: portfolio snapshot, holdings activity, subject profiles
//! - Basescan: ledger history used for cost-basis replay

pub mod base;
pub mod basescan;
pub mod kosetto;

use alloy::primitives::{Address, Bytes, TxHash, U256};
use anyhow::Result;
use async_trait::async_trait;
use futures::stream::BoxStream;
use rust_decimal::Decimal;

use crate::types::{ActivityEvent, PortfolioEntry, Subject, TradeEvent, TransactionRecord};

// ---------------------------------------------------------------------------
// Chain
// ---------------------------------------------------------------------------

/// A fully specified contract call ready to be signed and sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxOrder {
    pub calldata: Bytes,
    pub value: U256,
    pub nonce: u64,
    pub gas_price: u128,
    pub gas_limit: u64,
}

/// The shares contract plus the signing wallet that trades on it.
#[async_trait]
pub trait SharesMarket: Send + Sync {
    /// `getBuyPriceAfterFee(subject, amount)` in wei.
    async fn buy_price(&self, subject: Subject, amount: u64) -> Result<U256>;

    /// `getSellPriceAfterFee(subject, amount)` in wei.
    async fn sell_price(&self, subject: Subject, amount: u64) -> Result<U256>;

    /// `sharesBalance(subject, owner)`.
    async fn shares_balance(&self, subject: Subject, owner: Address) -> Result<U256>;

    /// Number of transactions sent from `owner` (the next nonce).
    async fn transaction_count(&self, owner: Address) -> Result<u64>;

    /// Sign and broadcast an order to the shares contract.
    async fn send_transaction(&self, order: TxOrder) -> Result<TxHash>;

    /// Wait for `confirmations` blocks on top of the transaction's block.
    /// Returns the receipt status (`true` = success).
    async fn wait_for_receipt(&self, hash: TxHash, confirmations: u64) -> Result<bool>;
}

/// Live feed of `Trade` events from the shares contract.
#[async_trait]
pub trait TradeFeed: Send + Sync {
    /// Open a new subscription. Dropping the stream ends it.
    async fn subscribe(&self) -> Result<BoxStream<'static, Vec<TradeEvent>>>;
}

// ---------------------------------------------------------------------------
// Off-chain APIs
// ---------------------------------------------------------------------------

/// Result of a subject profile lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProfileLookup {
    Found { handle: String },
    /// Known account without a linked handle.
    Ghost,
    /// No record yet (404 or empty body); may appear shortly.
    Missing,
}

/// Per-wallet portfolio, activity, and profile API.
#[async_trait]
pub trait KeyApi: Send + Sync {
    async fn portfolio(&self, wallet: Address) -> Result<Vec<PortfolioEntry>>;

    /// Recent activity on the wallet's holdings, newest first.
    async fn activity(&self, wallet: Address) -> Result<Vec<ActivityEvent>>;

    async fn profile(&self, subject: Subject) -> Result<ProfileLookup>;
}

/// Historical transactions for an address.
#[async_trait]
pub trait LedgerHistory: Send + Sync {
    /// All normal transactions sent or received by `address`, newest first.
    async fn transactions(&self, address: Address) -> Result<Vec<TransactionRecord>>;

    /// Total ETH ever transferred into `address`.
    async fn bridged_amount(&self, address: Address) -> Result<Decimal>;
}
