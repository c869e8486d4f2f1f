//! Per-wallet trading engine.
//!
//! One `WalletEngine` drives one wallet: it reconciles holdings, runs an
//! initial sell cycle, opens the trade watcher, then runs the buy pipeline
//! and the activity poller side by side until the process stops.

pub mod executor;
pub mod guard;
pub mod nonce;
pub mod pipeline;
pub mod poller;
pub mod profiles;
pub mod reconciler;
pub mod session;
pub mod watcher;

use alloy::primitives::Address;
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{error, info};

use crate::retry::RetryPolicy;
use crate::types::TradeEvent;
use poller::ActivityPoller;
use reconciler::Reconciler;
use session::WalletSession;
use watcher::{EventWatcher, ThrottleMode};

/// Batches the watcher may queue ahead of the pipeline before dropping.
const BATCH_QUEUE: usize = 16;

/// Timing, chain, and pricing parameters for one engine.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub contract: Address,
    pub poll_interval: Duration,
    pub throttle: ThrottleMode,
    pub eth_usd_rate: Decimal,
    /// Multiplier applied to sell quotes before scoring.
    pub sell_price_factor: Decimal,
    /// Gas price in wei.
    pub gas_price: u128,
    pub gas_limit: u64,
    pub buy_confirmations: u64,
    pub sell_confirmations: u64,
    pub retry: RetryPolicy,
}

pub struct WalletEngine {
    session: Arc<WalletSession>,
    watcher: Arc<EventWatcher>,
    batches: mpsc::Receiver<Vec<TradeEvent>>,
}

impl WalletEngine {
    pub fn new(session: WalletSession) -> Self {
        let session = Arc::new(session);
        let (tx, batches) = mpsc::channel(BATCH_QUEUE);
        let watcher = Arc::new(EventWatcher::new(session.clone(), tx));
        Self {
            session,
            watcher,
            batches,
        }
    }

    pub fn session(&self) -> &Arc<WalletSession> {
        &self.session
    }

    pub fn watcher(&self) -> &Arc<EventWatcher> {
        &self.watcher
    }

    /// Run until the task is dropped.
    pub async fn run(self) {
        let Self {
            session,
            watcher,
            batches,
        } = self;
        info!(wallet = %session.address, "Wallet engine starting");

        Reconciler::reconcile(&session).await;
        poller::sell_cycle(&session, &watcher).await;
        if let Err(e) = watcher.start().await {
            error!(error = %e, "Trade watcher failed to start; retrying on next poll");
        }

        let poller = ActivityPoller::new(session.clone(), watcher.clone());
        tokio::join!(pipeline::run(session, batches), poller.run());
    }
}
