//! Profile cache.
//!
//! Memoises subject → handle lookups and the social metrics of each
//! handle for the lifetime of one nonce epoch. The engine clears it on
//! every nonce refresh.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::data::SocialProvider;
use crate::platforms::{KeyApi, ProfileLookup};
use crate::retry::{self, RetryPolicy};
use crate::types::{ProfileInfo, SocialMetrics, Subject};

pub struct ProfileCache {
    api: Arc<dyn KeyApi>,
    social: Option<Arc<dyn SocialProvider>>,
    policy: RetryPolicy,
    profiles: Mutex<HashMap<Subject, ProfileInfo>>,
}

impl ProfileCache {
    pub fn new(
        api: Arc<dyn KeyApi>,
        social: Option<Arc<dyn SocialProvider>>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            api,
            social,
            policy,
            profiles: Mutex::new(HashMap::new()),
        }
    }

    /// Resolve the subject's handle.
    ///
    /// Ghost accounts resolve to `None` at once. Missing records are
    /// retried a bounded number of times; transport errors give up
    /// immediately. Only resolved profiles are cached.
    pub async fn resolve(&self, subject: Subject) -> Option<ProfileInfo> {
        if let Some(hit) = self.profiles.lock().await.get(&subject) {
            return Some(hit.clone());
        }

        let mut attempt = 0;
        loop {
            match self.api.profile(subject).await {
                Ok(ProfileLookup::Found { handle }) => {
                    let profile = ProfileInfo {
                        subject,
                        handle,
                        metrics: None,
                    };
                    self.profiles.lock().await.insert(subject, profile.clone());
                    return Some(profile);
                }
                Ok(ProfileLookup::Ghost) => {
                    debug!(%subject, "Ghost account, skipping");
                    return None;
                }
                Ok(ProfileLookup::Missing) if attempt < self.policy.enrichment_retries => {
                    attempt += 1;
                    tokio::time::sleep(self.policy.enrichment_delay).await;
                }
                Ok(ProfileLookup::Missing) => {
                    debug!(%subject, attempts = attempt + 1, "No profile found, skipping");
                    return None;
                }
                Err(e) => {
                    debug!(%subject, error = %e, "Profile lookup failed");
                    return None;
                }
            }
        }
    }

    /// Social metrics for a resolved profile, if enrichment is enabled and
    /// the provider answers within its retry budget.
    pub async fn metrics(&self, profile: &ProfileInfo) -> Option<SocialMetrics> {
        if let Some(cached) = self
            .profiles
            .lock()
            .await
            .get(&profile.subject)
            .and_then(|p| p.metrics.clone())
        {
            return Some(cached);
        }

        let provider = self.social.as_ref()?;
        let handle = profile.handle.as_str();
        match retry::bounded(
            "social_lookup",
            self.policy.enrichment_retries,
            self.policy.enrichment_delay,
            || provider.lookup(handle),
        )
        .await
        {
            Ok(metrics) => {
                self.profiles
                    .lock()
                    .await
                    .entry(profile.subject)
                    .or_insert_with(|| profile.clone())
                    .metrics = Some(metrics.clone());
                Some(metrics)
            }
            Err(e) => {
                warn!(handle, error = %e, "Social lookup failed");
                None
            }
        }
    }

    pub fn social_enabled(&self) -> bool {
        self.social.is_some()
    }

    pub async fn clear(&self) {
        self.profiles.lock().await.clear();
    }

    pub async fn len(&self) -> usize {
        self.profiles.lock().await.len()
    }
}
