//! In-flight buy guard.
//!
//! At most one buy may be in flight per wallet. The guard is a watch
//! channel holding the flag: [`BuyGuard::try_acquire`] checks and sets it
//! in one step and hands back a permit that clears it on drop, so every
//! exit path (including errors and cancellation) releases the guard.
//! [`BuyGuard::wait_clear`] parks until the flag drops instead of
//! polling it.

use tokio::sync::watch;

#[derive(Debug)]
pub struct BuyGuard {
    tx: watch::Sender<bool>,
}

impl Default for BuyGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl BuyGuard {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx }
    }

    /// Take the guard, or `None` if a buy is already in flight.
    pub fn try_acquire(&self) -> Option<BuyPermit<'_>> {
        let acquired = self.tx.send_if_modified(|held| {
            if *held {
                false
            } else {
                *held = true;
                true
            }
        });
        acquired.then_some(BuyPermit { guard: self })
    }

    pub fn is_held(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolve once no buy is in flight.
    pub async fn wait_clear(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives in `self`, so the channel cannot close here.
        let _ = rx.wait_for(|held| !*held).await;
    }
}

/// Proof that the holder owns the in-flight slot.
#[derive(Debug)]
pub struct BuyPermit<'a> {
    guard: &'a BuyGuard,
}

impl Drop for BuyPermit<'_> {
    fn drop(&mut self) {
        self.guard.tx.send_replace(false);
    }
}
