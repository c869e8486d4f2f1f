//! Per-wallet session state.
//!
//! One `WalletSession` is owned by one wallet engine and shared (via
//! `Arc`) between that engine's watcher, pipeline, and poller. Nothing in
//! here is ever shared across wallets.

use alloy::primitives::Address;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

use super::guard::BuyGuard;
use super::nonce::NonceSequencer;
use super::profiles::ProfileCache;
use super::EngineSettings;
use crate::data::SocialProvider;
use crate::platforms::{KeyApi, LedgerHistory, SharesMarket, TradeFeed};
use crate::strategy::buy::BuyEvaluator;
use crate::strategy::sell::SellEvaluator;
use crate::types::{Holding, Subject};

/// External collaborators for one wallet.
#[derive(Clone)]
pub struct Platforms {
    pub market: Arc<dyn SharesMarket>,
    pub feed: Arc<dyn TradeFeed>,
    pub api: Arc<dyn KeyApi>,
    pub ledger: Arc<dyn LedgerHistory>,
    /// Present only when the wallet has social enrichment enabled.
    pub social: Option<Arc<dyn SocialProvider>>,
}

pub struct WalletSession {
    pub address: Address,
    pub settings: EngineSettings,
    pub platforms: Platforms,
    pub buy_eval: BuyEvaluator,
    pub sell_eval: SellEvaluator,
    pub nonce: NonceSequencer,
    pub buy_guard: BuyGuard,
    pub profiles: ProfileCache,
    holdings: RwLock<Vec<Holding>>,
    selling: AtomicBool,
}

impl WalletSession {
    pub fn new(
        address: Address,
        settings: EngineSettings,
        platforms: Platforms,
        buy_eval: BuyEvaluator,
        sell_eval: SellEvaluator,
    ) -> Self {
        let profiles = ProfileCache::new(
            platforms.api.clone(),
            platforms.social.clone(),
            settings.retry,
        );
        Self {
            address,
            settings,
            platforms,
            buy_eval,
            sell_eval,
            nonce: NonceSequencer::new(),
            buy_guard: BuyGuard::new(),
            profiles,
            holdings: RwLock::new(Vec::new()),
            selling: AtomicBool::new(false),
        }
    }

    /// Reset the nonce from the chain and drop cached profiles.
    pub async fn refresh_nonce(&self) -> u64 {
        self.profiles.clear().await;
        self.nonce
            .refresh(
                self.platforms.market.as_ref(),
                self.address,
                self.settings.retry.nonce_delay,
            )
            .await
    }

    // -- Holdings ---------------------------------------------------------

    pub async fn holdings(&self) -> Vec<Holding> {
        self.holdings.read().await.clone()
    }

    pub async fn holding_at(&self, index: usize) -> Option<Holding> {
        self.holdings.read().await.get(index).cloned()
    }

    pub async fn replace_holdings(&self, holdings: Vec<Holding>) {
        *self.holdings.write().await = holdings;
    }

    pub async fn remove_holding(&self, subject: Subject) {
        self.holdings.write().await.retain(|h| h.subject != subject);
        debug!(%subject, "Holding removed");
    }

    // -- Sell flag ---------------------------------------------------------

    pub fn is_selling(&self) -> bool {
        self.selling.load(Ordering::SeqCst)
    }

    /// Mark a sell cycle as running until the returned guard drops.
    pub fn begin_selling(&self) -> SellingGuard<'_> {
        self.selling.store(true, Ordering::SeqCst);
        SellingGuard { session: self }
    }
}

pub struct SellingGuard<'a> {
    session: &'a WalletSession,
}

impl Drop for SellingGuard<'_> {
    fn drop(&mut self) {
        self.session.selling.store(false, Ordering::SeqCst);
    }
}
