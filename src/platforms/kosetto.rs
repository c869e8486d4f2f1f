//! Kosetto API integration (portfolio, holdings activity, profiles).
//!
//! Portfolio and activity endpoints are per wallet and need that wallet's
//! authorization token plus an `If-None-Match` validator. Profile lookups
//! are public.
//!
//! Base URL: https://prod-api.kosetto.com

use alloy::primitives::Address;
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use super::{KeyApi, ProfileLookup};
use crate::types::{ActivityEvent, PortfolioEntry, Subject};

// ---------------------------------------------------------------------------
// API response types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct PortfolioResponse {
    #[serde(default)]
    holdings: Vec<PortfolioEntry>,
}

#[derive(Debug, Deserialize)]
struct ActivityResponse {
    #[serde(default)]
    events: Vec<ActivityEvent>,
}

/// `/users/{address}`. Unknown subjects come back as `{}` or 404.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UserResponse {
    #[serde(default)]
    id: Option<serde_json::Value>,
    #[serde(default)]
    twitter_username: Option<String>,
}

impl From<UserResponse> for ProfileLookup {
    fn from(user: UserResponse) -> Self {
        match (user.id, user.twitter_username) {
            (None, _) => ProfileLookup::Missing,
            (Some(_), Some(handle)) if !handle.is_empty() => ProfileLookup::Found { handle },
            (Some(_), _) => ProfileLookup::Ghost,
        }
    }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Kosetto client bound to one wallet's credentials.
pub struct KosettoClient {
    http: Client,
    base_url: String,
    authorization: SecretString,
    if_none_match: Option<String>,
}

impl KosettoClient {
    pub fn new(
        base_url: impl Into<String>,
        authorization: SecretString,
        if_none_match: Option<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .user_agent("shares-agent/0.1.0")
            .build()
            .context("Failed to build HTTP client for Kosetto")?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            authorization,
            if_none_match,
        })
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        let request = request.header("authorization", self.authorization.expose_secret().as_str());
        match &self.if_none_match {
            Some(tag) => request.header("if-none-match", tag),
            None => request,
        }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        authorized: bool,
    ) -> Result<T> {
        let url = format!("{}{path}", self.base_url);
        debug!(url = %url, "Kosetto request");

        let mut request = self.http.get(&url).header("accept", "application/json");
        if authorized {
            request = self.authorized(request);
        }
        let resp = request.send().await.context("Kosetto API request failed")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("Kosetto API error {status} for {path}: {body}");
        }

        resp.json()
            .await
            .with_context(|| format!("Failed to parse Kosetto response for {path}"))
    }
}

#[async_trait]
impl KeyApi for KosettoClient {
    async fn portfolio(&self, wallet: Address) -> Result<Vec<PortfolioEntry>> {
        let resp: PortfolioResponse = self
            .get_json(&format!("/portfolio/{wallet:#x}"), true)
            .await?;
        Ok(resp.holdings)
    }

    async fn activity(&self, wallet: Address) -> Result<Vec<ActivityEvent>> {
        let resp: ActivityResponse = self
            .get_json(&format!("/holdings-activity/{wallet:#x}"), true)
            .await?;
        Ok(resp.events)
    }

    async fn profile(&self, subject: Subject) -> Result<ProfileLookup> {
        let url = format!("{}/users/{subject:#x}", self.base_url);
        let resp = self
            .http
            .get(&url)
            .header("accept", "application/json")
            .send()
            .await
            .context("Kosetto profile request failed")?;

        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(ProfileLookup::Missing);
        }
        if !resp.status().is_success() {
            anyhow::bail!("Kosetto profile error {} for {subject}", resp.status());
        }

        let body = resp.text().await.context("Failed to read profile body")?;
        if body.trim().is_empty() {
            return Ok(ProfileLookup::Missing);
        }
        let user: UserResponse =
            serde_json::from_str(&body).context("Failed to parse Kosetto user response")?;
        Ok(user.into())
    }
}
