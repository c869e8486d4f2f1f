//! Configuration loading from TOML with environment variable resolution.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs.
//! Secrets (private keys, API tokens) are referenced by env-var name in the
//! config and resolved at runtime into `SecretString`s.

use alloy::primitives::Address;
use anyhow::{Context, Result};
use rust_decimal::Decimal;
use secrecy::SecretString;
use serde::Deserialize;
use std::collections::HashSet;
use std::fs;
use std::time::Duration;

use crate::engine::watcher::ThrottleMode;
use crate::engine::EngineSettings;
use crate::retry::RetryPolicy;
use crate::strategy::StrategyConfig;
use crate::types::gwei_to_wei;

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub agent: AgentConfig,
    pub chain: ChainConfig,
    pub api: ApiConfig,
    pub ledger: LedgerConfig,
    #[serde(default)]
    pub social: Option<SocialConfig>,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub strategy: StrategyConfig,
    /// JSON array of addresses never bought.
    #[serde(default)]
    pub bots_file: Option<String>,
    #[serde(default)]
    pub wallets: Vec<WalletConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AgentConfig {
    pub name: String,
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    pub eth_usd_rate: Decimal,
    #[serde(default = "default_sell_price_factor")]
    pub sell_price_factor: Decimal,
    #[serde(default = "default_throttle_window_ms")]
    pub throttle_window_ms: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChainConfig {
    pub rpc_url: String,
    pub ws_url: String,
    pub contract_address: Address,
    pub gas_price_gwei: Decimal,
    #[serde(default = "default_gas_limit")]
    pub gas_limit: u64,
    #[serde(default = "default_buy_confirmations")]
    pub buy_confirmations: u64,
    #[serde(default = "default_sell_confirmations")]
    pub sell_confirmations: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ApiConfig {
    pub base_url: String,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LedgerConfig {
    pub base_url: String,
    pub api_key_env: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SocialConfig {
    pub base_url: String,
    #[serde(default)]
    pub api_key_env: Option<String>,
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct RetryConfig {
    pub nonce_delay_ms: u64,
    pub read_delay_ms: u64,
    pub history_delay_ms: u64,
    pub profile_retries: u32,
    pub profile_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        let policy = RetryPolicy::default();
        Self {
            nonce_delay_ms: policy.nonce_delay.as_millis() as u64,
            read_delay_ms: policy.read_delay.as_millis() as u64,
            history_delay_ms: policy.history_delay.as_millis() as u64,
            profile_retries: policy.enrichment_retries,
            profile_delay_ms: policy.enrichment_delay.as_millis() as u64,
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            nonce_delay: Duration::from_millis(self.nonce_delay_ms),
            read_delay: Duration::from_millis(self.read_delay_ms),
            history_delay: Duration::from_millis(self.history_delay_ms),
            enrichment_retries: self.profile_retries,
            enrichment_delay: Duration::from_millis(self.profile_delay_ms),
        }
    }
}

/// One wallet to trade with. Secrets are named by env var.
#[derive(Debug, Deserialize, Clone)]
pub struct WalletConfig {
    pub address: Address,
    pub private_key_env: String,
    pub authorization_env: String,
    #[serde(default)]
    pub if_none_match: Option<String>,
    /// Immediate trade delivery plus social enrichment when set; windowed
    /// delivery without enrichment otherwise.
    #[serde(default)]
    pub use_social_api: bool,
}

/// A wallet's resolved secrets.
pub struct WalletSecrets {
    pub private_key: SecretString,
    pub authorization: SecretString,
}

fn default_poll_interval_secs() -> u64 {
    60
}

fn default_sell_price_factor() -> Decimal {
    Decimal::new(9, 1)
}

fn default_throttle_window_ms() -> u64 {
    5_000
}

fn default_gas_limit() -> u64 {
    100_000
}

fn default_buy_confirmations() -> u64 {
    2
}

fn default_sell_confirmations() -> u64 {
    1
}

fn default_request_timeout_ms() -> u64 {
    5_000
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        Self::parse(&contents).with_context(|| format!("Failed to parse config file: {path}"))
    }

    pub fn parse(contents: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(contents)?;
        Ok(config)
    }

    /// Resolve an environment variable name to its value.
    /// Useful for loading secrets referenced in the config.
    pub fn resolve_env(env_name: &str) -> Result<String> {
        std::env::var(env_name)
            .with_context(|| format!("Environment variable not set: {env_name}"))
    }

    pub fn resolve_secret(env_name: &str) -> Result<SecretString> {
        Self::resolve_env(env_name).map(SecretString::new)
    }

    pub fn wallet_secrets(wallet: &WalletConfig) -> Result<WalletSecrets> {
        Ok(WalletSecrets {
            private_key: Self::resolve_secret(&wallet.private_key_env)?,
            authorization: Self::resolve_secret(&wallet.authorization_env)?,
        })
    }

    /// Load the bot blacklist, or an empty set when none is configured.
    pub fn load_bots(&self) -> Result<HashSet<Address>> {
        let Some(path) = &self.bots_file else {
            return Ok(HashSet::new());
        };
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read bots file: {path}"))?;
        parse_bots(&contents).with_context(|| format!("Failed to parse bots file: {path}"))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.api.request_timeout_ms)
    }

    /// Engine parameters for one wallet.
    pub fn engine_settings(&self, wallet: &WalletConfig) -> EngineSettings {
        let throttle = if wallet.use_social_api {
            ThrottleMode::Immediate
        } else {
            ThrottleMode::Windowed(Duration::from_millis(self.agent.throttle_window_ms))
        };
        EngineSettings {
            contract: self.chain.contract_address,
            poll_interval: Duration::from_secs(self.agent.poll_interval_secs),
            throttle,
            eth_usd_rate: self.agent.eth_usd_rate,
            sell_price_factor: self.agent.sell_price_factor,
            gas_price: gwei_to_wei(self.chain.gas_price_gwei),
            gas_limit: self.chain.gas_limit,
            buy_confirmations: self.chain.buy_confirmations,
            sell_confirmations: self.chain.sell_confirmations,
            retry: self.retry.policy(),
        }
    }
}

/// Bot list entries are addresses in any case.
pub fn parse_bots(contents: &str) -> Result<HashSet<Address>> {
    let raw: Vec<String> = serde_json::from_str(contents)?;
    raw.iter()
        .map(|s| {
            s.trim()
                .parse::<Address>()
                .with_context(|| format!("Invalid bot address: {s}"))
        })
        .collect()
}
