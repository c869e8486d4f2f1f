//! Mock platforms for integration testing.
//!
//! Deterministic in-memory implementations of every platform trait. Chain
//! state, API responses, and failure modes are fully controllable from
//! test code, and every call is recorded for assertions.

use alloy::primitives::{Address, Bytes, TxHash, B256, U256};
use alloy::sol_types::SolCall;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use futures::stream::{BoxStream, Stream, StreamExt};
use rust_decimal::Decimal;
use std::collections::{HashMap, HashSet, VecDeque};
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::mpsc;

use shares_agent::engine::session::{Platforms, WalletSession};
use shares_agent::engine::watcher::ThrottleMode;
use shares_agent::engine::EngineSettings;
use shares_agent::platforms::base::SharesV1;
use shares_agent::platforms::{
    KeyApi, LedgerHistory, ProfileLookup, SharesMarket, TradeFeed, TxOrder,
};
use shares_agent::retry::RetryPolicy;
use shares_agent::strategy::buy::{BuyEvaluator, BuyStrategy};
use shares_agent::strategy::sell::{SellEvaluator, SellStrategy};
use shares_agent::types::*;

pub const WALLET: Address = Address::new([0xaa; 20]);
pub const CONTRACT: Address = Address::new([0xcf; 20]);

pub fn addr(byte: u8) -> Address {
    Address::new([byte; 20])
}

pub fn eth(milli: u64) -> U256 {
    U256::from(milli) * U256::from(1_000_000_000_000_000u64)
}

// ---------------------------------------------------------------------------
// Chain
// ---------------------------------------------------------------------------

/// Which contract call an order carried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SentCall {
    Buy { subject: Subject, amount: U256 },
    Sell { subject: Subject, amount: U256 },
}

#[derive(Debug, Clone)]
pub struct SentOrder {
    pub nonce: u64,
    pub value: U256,
    pub call: SentCall,
}

#[derive(Default)]
struct ChainState {
    tx_count: u64,
    buy_quotes: HashMap<Subject, VecDeque<U256>>,
    sell_quotes: HashMap<Subject, U256>,
    balances: HashMap<Subject, U256>,
    sent: Vec<SentOrder>,
    attempted_nonces: Vec<u64>,
    pending: HashMap<TxHash, Subject>,
    reverting: HashSet<Subject>,
    fail_next_send: bool,
    sell_quote_calls: HashMap<Subject, usize>,
}

/// In-memory shares contract.
pub struct MockMarket {
    state: Mutex<ChainState>,
    receipt_delay: Duration,
}

impl MockMarket {
    pub fn new(tx_count: u64) -> Self {
        Self {
            state: Mutex::new(ChainState {
                tx_count,
                ..ChainState::default()
            }),
            receipt_delay: Duration::from_millis(1),
        }
    }

    pub fn with_receipt_delay(mut self, delay: Duration) -> Self {
        self.receipt_delay = delay;
        self
    }

    /// Queue buy quotes for a subject; the last one repeats.
    pub fn set_buy_quotes(&self, subject: Subject, quotes: Vec<U256>) {
        self.state
            .lock()
            .unwrap()
            .buy_quotes
            .insert(subject, quotes.into());
    }

    pub fn set_sell_quote(&self, subject: Subject, quote: U256) {
        self.state.lock().unwrap().sell_quotes.insert(subject, quote);
    }

    pub fn set_balance(&self, subject: Subject, balance: u64) {
        self.state
            .lock()
            .unwrap()
            .balances
            .insert(subject, U256::from(balance));
    }

    /// Receipts for orders on this subject report failure.
    pub fn revert_for(&self, subject: Subject) {
        self.state.lock().unwrap().reverting.insert(subject);
    }

    pub fn fail_next_send(&self) {
        self.state.lock().unwrap().fail_next_send = true;
    }

    pub fn sent(&self) -> Vec<SentOrder> {
        self.state.lock().unwrap().sent.clone()
    }

    pub fn attempted_nonces(&self) -> Vec<u64> {
        self.state.lock().unwrap().attempted_nonces.clone()
    }

    pub fn sell_quote_calls(&self, subject: Subject) -> usize {
        self.state
            .lock()
            .unwrap()
            .sell_quote_calls
            .get(&subject)
            .copied()
            .unwrap_or(0)
    }
}

fn decode_call(calldata: &Bytes) -> Result<SentCall> {
    if let Ok(call) = SharesV1::buySharesCall::abi_decode(calldata) {
        return Ok(SentCall::Buy {
            subject: call.sharesSubject,
            amount: call.amount,
        });
    }
    let call = SharesV1::sellSharesCall::abi_decode(calldata)?;
    Ok(SentCall::Sell {
        subject: call.sharesSubject,
        amount: call.amount,
    })
}

#[async_trait]
impl SharesMarket for MockMarket {
    async fn buy_price(&self, subject: Subject, _amount: u64) -> Result<U256> {
        let mut state = self.state.lock().unwrap();
        let quotes = state
            .buy_quotes
            .get_mut(&subject)
            .ok_or_else(|| anyhow!("execution reverted"))?;
        let quote = if quotes.len() > 1 {
            quotes.pop_front()
        } else {
            quotes.front().copied()
        };
        quote.ok_or_else(|| anyhow!("execution reverted"))
    }

    async fn sell_price(&self, subject: Subject, _amount: u64) -> Result<U256> {
        let mut state = self.state.lock().unwrap();
        *state.sell_quote_calls.entry(subject).or_default() += 1;
        state
            .sell_quotes
            .get(&subject)
            .copied()
            .ok_or_else(|| anyhow!("execution reverted"))
    }

    async fn shares_balance(&self, subject: Subject, _owner: Address) -> Result<U256> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .balances
            .get(&subject)
            .copied()
            .unwrap_or_default())
    }

    async fn transaction_count(&self, _owner: Address) -> Result<u64> {
        Ok(self.state.lock().unwrap().tx_count)
    }

    async fn send_transaction(&self, order: TxOrder) -> Result<TxHash> {
        let mut state = self.state.lock().unwrap();
        state.attempted_nonces.push(order.nonce);
        if std::mem::take(&mut state.fail_next_send) {
            return Err(anyhow!("insufficient funds for gas"));
        }
        let call = decode_call(&order.calldata)?;
        let subject = match &call {
            SentCall::Buy { subject, .. } | SentCall::Sell { subject, .. } => *subject,
        };
        let hash = B256::left_padding_from(&order.nonce.to_be_bytes());
        state.tx_count = state.tx_count.max(order.nonce + 1);
        state.pending.insert(hash, subject);
        state.sent.push(SentOrder {
            nonce: order.nonce,
            value: order.value,
            call,
        });
        Ok(hash)
    }

    async fn wait_for_receipt(&self, hash: TxHash, _confirmations: u64) -> Result<bool> {
        tokio::time::sleep(self.receipt_delay).await;
        let state = self.state.lock().unwrap();
        let subject = state
            .pending
            .get(&hash)
            .ok_or_else(|| anyhow!("unknown transaction {hash}"))?;
        Ok(!state.reverting.contains(subject))
    }
}

// ---------------------------------------------------------------------------
// Trade feed
// ---------------------------------------------------------------------------

/// Feed that tracks how many subscriptions are alive.
#[derive(Default)]
pub struct MockFeed {
    senders: Mutex<Vec<mpsc::UnboundedSender<Vec<TradeEvent>>>>,
    active: Arc<AtomicUsize>,
    subscribes: AtomicUsize,
}

impl MockFeed {
    pub fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    pub fn subscribes(&self) -> usize {
        self.subscribes.load(Ordering::SeqCst)
    }

    /// Deliver a batch to every live subscription.
    pub fn emit(&self, batch: Vec<TradeEvent>) {
        self.senders
            .lock()
            .unwrap()
            .retain(|tx| tx.send(batch.clone()).is_ok());
    }
}

struct TrackedStream {
    rx: mpsc::UnboundedReceiver<Vec<TradeEvent>>,
    active: Arc<AtomicUsize>,
}

impl Stream for TrackedStream {
    type Item = Vec<TradeEvent>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

impl Drop for TrackedStream {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl TradeFeed for MockFeed {
    async fn subscribe(&self) -> Result<BoxStream<'static, Vec<TradeEvent>>> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.senders.lock().unwrap().push(tx);
        self.subscribes.fetch_add(1, Ordering::SeqCst);
        self.active.fetch_add(1, Ordering::SeqCst);
        Ok(TrackedStream {
            rx,
            active: self.active.clone(),
        }
        .boxed())
    }
}

// ---------------------------------------------------------------------------
// Portfolio / activity / profile API
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MockKeyApi {
    portfolio: Mutex<Vec<PortfolioEntry>>,
    portfolio_failures: AtomicUsize,
    portfolio_calls: AtomicUsize,
    activity: Mutex<Vec<ActivityEvent>>,
    profiles: Mutex<HashMap<Subject, ProfileLookup>>,
    profile_calls: AtomicUsize,
}

impl MockKeyApi {
    pub fn set_portfolio(&self, entries: Vec<PortfolioEntry>) {
        *self.portfolio.lock().unwrap() = entries;
    }

    /// Fail the next `n` portfolio requests.
    pub fn fail_portfolio(&self, n: usize) {
        self.portfolio_failures.store(n, Ordering::SeqCst);
    }

    pub fn portfolio_calls(&self) -> usize {
        self.portfolio_calls.load(Ordering::SeqCst)
    }

    pub fn set_activity(&self, events: Vec<ActivityEvent>) {
        *self.activity.lock().unwrap() = events;
    }

    pub fn set_handle(&self, subject: Subject, handle: &str) {
        self.profiles.lock().unwrap().insert(
            subject,
            ProfileLookup::Found {
                handle: handle.to_string(),
            },
        );
    }

    pub fn profile_calls(&self) -> usize {
        self.profile_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl KeyApi for MockKeyApi {
    async fn portfolio(&self, _wallet: Address) -> Result<Vec<PortfolioEntry>> {
        self.portfolio_calls.fetch_add(1, Ordering::SeqCst);
        let failures = self.portfolio_failures.load(Ordering::SeqCst);
        if failures > 0 {
            self.portfolio_failures.store(failures - 1, Ordering::SeqCst);
            return Err(anyhow!("503 Service Unavailable"));
        }
        Ok(self.portfolio.lock().unwrap().clone())
    }

    async fn activity(&self, _wallet: Address) -> Result<Vec<ActivityEvent>> {
        Ok(self.activity.lock().unwrap().clone())
    }

    async fn profile(&self, subject: Subject) -> Result<ProfileLookup> {
        self.profile_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .profiles
            .lock()
            .unwrap()
            .get(&subject)
            .cloned()
            .unwrap_or(ProfileLookup::Ghost))
    }
}

// ---------------------------------------------------------------------------
// Ledger history
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MockLedger {
    transactions: Mutex<Vec<TransactionRecord>>,
    bridged: Mutex<Decimal>,
    bridged_calls: AtomicUsize,
}

impl MockLedger {
    pub fn set_bridged(&self, amount: Decimal) {
        *self.bridged.lock().unwrap() = amount;
    }

    pub fn bridged_calls(&self) -> usize {
        self.bridged_calls.load(Ordering::SeqCst)
    }

    pub fn set_transactions(&self, txs: Vec<TransactionRecord>) {
        *self.transactions.lock().unwrap() = txs;
    }
}

#[async_trait]
impl LedgerHistory for MockLedger {
    async fn transactions(&self, _address: Address) -> Result<Vec<TransactionRecord>> {
        Ok(self.transactions.lock().unwrap().clone())
    }

    async fn bridged_amount(&self, _address: Address) -> Result<Decimal> {
        self.bridged_calls.fetch_add(1, Ordering::SeqCst);
        Ok(*self.bridged.lock().unwrap())
    }
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

/// Every mock, kept alongside the session that uses them.
pub struct Harness {
    pub market: Arc<MockMarket>,
    pub feed: Arc<MockFeed>,
    pub api: Arc<MockKeyApi>,
    pub ledger: Arc<MockLedger>,
}

impl Harness {
    pub fn new(market: MockMarket) -> Self {
        Self {
            market: Arc::new(market),
            feed: Arc::new(MockFeed::default()),
            api: Arc::new(MockKeyApi::default()),
            ledger: Arc::new(MockLedger::default()),
        }
    }

    pub fn session(&self, buy: BuyStrategy, sell: SellStrategy, bots: &[Address]) -> WalletSession {
        let platforms = Platforms {
            market: self.market.clone(),
            feed: self.feed.clone(),
            api: self.api.clone(),
            ledger: self.ledger.clone(),
            social: None,
        };
        WalletSession::new(
            WALLET,
            fast_settings(),
            platforms,
            BuyEvaluator::new(buy, bots.iter().copied().collect(), WALLET),
            SellEvaluator::new(sell, WALLET),
        )
    }

    pub fn default_session(&self) -> WalletSession {
        self.session(BuyStrategy::default(), SellStrategy::default(), &[])
    }
}

pub fn fast_settings() -> EngineSettings {
    let ms = Duration::from_millis(1);
    EngineSettings {
        contract: CONTRACT,
        poll_interval: Duration::from_millis(20),
        throttle: ThrottleMode::Immediate,
        eth_usd_rate: Decimal::from(1600),
        sell_price_factor: Decimal::new(9, 1),
        gas_price: 300_000_000,
        gas_limit: 100_000,
        buy_confirmations: 2,
        sell_confirmations: 1,
        retry: RetryPolicy {
            nonce_delay: ms,
            read_delay: ms,
            history_delay: ms,
            enrichment_retries: 1,
            enrichment_delay: ms,
        },
    }
}

pub fn trade(subject: Address, trader: Address, eth_amount: U256) -> TradeEvent {
    TradeEvent {
        subject,
        trader,
        eth_amount,
        is_buy: true,
        supply: U256::from(3u64),
        block_number: Some(1),
        log_index: Some(0),
    }
}

pub fn holding(subject: Address, balance: u64, cost: U256) -> Holding {
    Holding {
        subject,
        name: None,
        balance,
        cost,
        purchases: balance,
        holding_hours: 1,
    }
}

pub fn portfolio_entry(subject: Address, balance: u64) -> PortfolioEntry {
    PortfolioEntry {
        subject,
        balance,
        name: None,
    }
}

pub fn buy_record(subject: Address, timestamp: i64) -> TransactionRecord {
    TransactionRecord {
        from: WALLET,
        to: Some(CONTRACT),
        input: Bytes::from(
            SharesV1::buySharesCall {
                sharesSubject: subject,
                amount: U256::from(1u64),
            }
            .abi_encode(),
        ),
        gas_used: U256::from(100_000u64),
        gas_price: U256::from(1u64),
        value: U256::from(1_000u64),
        success: true,
        timestamp,
    }
}

pub fn activity(subject: Address, trader: Address, is_buy: bool, create_at: i64) -> ActivityEvent {
    ActivityEvent {
        subject: Party {
            address: subject,
            username: None,
        },
        trader: Party {
            address: trader,
            username: None,
        },
        is_buy,
        create_at,
    }
}
