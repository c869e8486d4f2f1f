//! Retry policies for external calls.
//!
//! Load-bearing reads (nonce, prices, holdings, history) go through
//! [`until_ok`], which never gives up. Optional enrichment goes through
//! [`bounded`], which gives up after a fixed number of retries so the
//! pipeline is never blocked on it.

use anyhow::Result;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Fixed delays and attempt counts for each call class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Between nonce refresh attempts.
    pub nonce_delay: Duration,
    /// Between price, balance, and portfolio read attempts.
    pub read_delay: Duration,
    /// Between ledger-history fetch attempts.
    pub history_delay: Duration,
    /// Extra attempts allowed for enrichment lookups (profiles, social).
    pub enrichment_retries: u32,
    pub enrichment_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            nonce_delay: Duration::from_secs(2),
            read_delay: Duration::from_secs(3),
            history_delay: Duration::from_secs(5),
            enrichment_retries: 2,
            enrichment_delay: Duration::from_secs(1),
        }
    }
}

/// Run `op` until it succeeds, sleeping `delay` between attempts.
pub async fn until_ok<T, F, Fut>(label: &str, delay: Duration, mut op: F) -> T
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt: u64 = 0;
    loop {
        match op().await {
            Ok(value) => return value,
            Err(e) => {
                attempt += 1;
                warn!(
                    op = label,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Call failed, retrying"
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}

/// Run `op` at most `retries + 1` times, sleeping `delay` between attempts.
///
/// Returns the last error once the attempts are exhausted.
pub async fn bounded<T, F, Fut>(label: &str, retries: u32, delay: Duration, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt < retries => {
                attempt += 1;
                debug!(op = label, attempt, error = %e, "Retrying");
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}
