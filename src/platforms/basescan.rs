//! Basescan ledger history.
//!
//! Normal transaction lists used to replay cost basis, plus the inbound
//! transfer total used as the bridged-amount signal.
//!
//! API: `https://api.basescan.org/api?module=account&action=txlist`
//! Auth: API key via `apikey` query param.

use alloy::primitives::{Address, Bytes, U256};
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use super::LedgerHistory;
use crate::types::{wei_to_eth, TransactionRecord};

// ---------------------------------------------------------------------------
// API response types
// ---------------------------------------------------------------------------

/// Envelope shared by every Basescan endpoint. On error `result` is a
/// message string instead of a list.
#[derive(Debug, Deserialize)]
struct TxListResponse {
    #[serde(default)]
    message: String,
    result: serde_json::Value,
}

/// A txlist row. Basescan encodes every number as a decimal string.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawTransaction {
    time_stamp: String,
    from: String,
    #[serde(default)]
    to: String,
    value: String,
    gas_price: String,
    gas_used: String,
    #[serde(default)]
    is_error: String,
    #[serde(default)]
    input: String,
}

impl TryFrom<RawTransaction> for TransactionRecord {
    type Error = anyhow::Error;

    fn try_from(raw: RawTransaction) -> Result<Self> {
        let to = if raw.to.is_empty() {
            None
        } else {
            Some(raw.to.parse::<Address>().context("Bad `to` address")?)
        };
        let input = if raw.input.is_empty() || raw.input == "0x" {
            Bytes::new()
        } else {
            raw.input.parse::<Bytes>().context("Bad input data")?
        };

        Ok(Self {
            from: raw.from.parse().context("Bad `from` address")?,
            to,
            input,
            gas_used: parse_uint(&raw.gas_used, "gasUsed")?,
            gas_price: parse_uint(&raw.gas_price, "gasPrice")?,
            value: parse_uint(&raw.value, "value")?,
            success: raw.is_error != "1",
            timestamp: raw.time_stamp.parse().context("Bad timeStamp")?,
        })
    }
}

fn parse_uint(s: &str, field: &str) -> Result<U256> {
    s.parse::<U256>()
        .with_context(|| format!("Bad {field}: {s}"))
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

pub struct BasescanClient {
    http: Client,
    base_url: String,
    api_key: SecretString,
}

impl BasescanClient {
    pub fn new(base_url: impl Into<String>, api_key: SecretString, timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client for Basescan")?;

        Ok(Self {
            http,
            base_url: base_url.into(),
            api_key,
        })
    }

    async fn txlist(&self, address: Address, sort: &str) -> Result<Vec<TransactionRecord>> {
        debug!(%address, sort, "Fetching Basescan txlist");
        let address = format!("{address:#x}");
        let resp = self
            .http
            .get(&self.base_url)
            .query(&[
                ("module", "account"),
                ("action", "txlist"),
                ("address", address.as_str()),
                ("startblock", "0"),
                ("endblock", "99999999"),
                ("sort", sort),
                ("apikey", self.api_key.expose_secret().as_str()),
            ])
            .send()
            .await
            .context("Basescan request failed")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("Basescan API error {status}: {body}");
        }

        let body: TxListResponse = resp
            .json()
            .await
            .context("Failed to parse Basescan response")?;
        parse_txlist(body)
    }
}

fn parse_txlist(body: TxListResponse) -> Result<Vec<TransactionRecord>> {
    match body.result {
        serde_json::Value::Array(rows) => rows
            .into_iter()
            .map(|row| {
                let raw: RawTransaction =
                    serde_json::from_value(row).context("Malformed txlist row")?;
                TransactionRecord::try_from(raw)
            })
            .collect(),
        _ if body.message.starts_with("No transactions found") => Ok(Vec::new()),
        other => anyhow::bail!("Basescan error: {} ({other})", body.message),
    }
}

#[async_trait]
impl LedgerHistory for BasescanClient {
    async fn transactions(&self, address: Address) -> Result<Vec<TransactionRecord>> {
        self.txlist(address, "desc").await
    }

    async fn bridged_amount(&self, address: Address) -> Result<Decimal> {
        let inbound = self
            .txlist(address, "asc")
            .await?
            .into_iter()
            .filter(|tx| tx.to == Some(address))
            .fold(U256::ZERO, |sum, tx| sum.saturating_add(tx.value));
        Ok(wei_to_eth(inbound))
    }
}
