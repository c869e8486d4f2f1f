//! Nonce sequencer.
//!
//! Tracks the next nonce for one wallet. [`NonceSequencer::refresh`]
//! resets the counter to the on-chain transaction count and never gives
//! up; [`NonceSequencer::next`] hands out a slot and advances the counter
//! whether or not the transaction using it later succeeds.

use alloy::primitives::Address;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::debug;

use crate::platforms::SharesMarket;
use crate::retry;

#[derive(Debug, Default)]
pub struct NonceSequencer {
    next: AtomicU64,
}

impl NonceSequencer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset the counter from the chain, retrying every `delay` until the
    /// transaction count is read.
    pub async fn refresh(&self, market: &dyn SharesMarket, owner: Address, delay: Duration) -> u64 {
        let count = retry::until_ok("transaction_count", delay, || {
            market.transaction_count(owner)
        })
        .await;
        self.next.store(count, Ordering::SeqCst);
        debug!(wallet = %owner, nonce = count, "Nonce refreshed");
        count
    }

    /// Consume the next nonce.
    pub fn next(&self) -> u64 {
        self.next.fetch_add(1, Ordering::SeqCst)
    }

    pub fn peek(&self) -> u64 {
        self.next.load(Ordering::SeqCst)
    }
}
