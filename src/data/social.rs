//! HTTP social-metrics provider.
//!
//! API: `GET {base_url}/users/{handle}` returning verification status,
//! average views/favorites, follower and post counts.
//! Auth: optional bearer token.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use std::time::Duration;
use tracing::debug;

use super::SocialProvider;
use crate::types::SocialMetrics;

pub struct HttpSocialProvider {
    http: Client,
    base_url: String,
    api_key: Option<SecretString>,
}

impl HttpSocialProvider {
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<SecretString>,
        timeout: Duration,
    ) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client for social provider")?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
        })
    }

    fn url_for(&self, handle: &str) -> String {
        format!(
            "{}/users/{}",
            self.base_url,
            urlencoding::encode(handle.trim_start_matches('@'))
        )
    }
}

#[async_trait]
impl SocialProvider for HttpSocialProvider {
    async fn lookup(&self, handle: &str) -> Result<SocialMetrics> {
        let url = self.url_for(handle);
        debug!(url = %url, "Fetching social metrics");

        let mut request = self.http.get(&url);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key.expose_secret());
        }
        let resp = request.send().await.context("Social API request failed")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("Social API error {status} for @{handle}: {body}");
        }

        resp.json()
            .await
            .with_context(|| format!("Failed to parse social metrics for @{handle}"))
    }
}
