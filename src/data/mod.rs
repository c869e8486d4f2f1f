//! Social-metrics enrichment.
//!
//! Defines the `SocialProvider` trait and an HTTP implementation for
//! fetching reputation metrics of a subject's linked handle.

pub mod social;

use anyhow::Result;
use async_trait::async_trait;

use crate::types::SocialMetrics;

/// Abstraction over the external social-metrics source.
///
/// A lookup is optional enrichment: callers bound their retries and treat
/// a failure as "no metrics" rather than blocking on it.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SocialProvider: Send + Sync {
    /// Fetch metrics for a handle (without the leading `@`).
    async fn lookup(&self, handle: &str) -> Result<SocialMetrics>;
}
