//! Shares agent entry point.
//!
//! Loads configuration, initialises structured logging, builds one engine
//! per configured wallet, and runs them concurrently until Ctrl+C.

use anyhow::{Context, Result};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{error, info, info_span, warn, Instrument};

use alloy::primitives::Address;
use shares_agent::config::{AppConfig, WalletConfig};
use shares_agent::data::social::HttpSocialProvider;
use shares_agent::data::SocialProvider;
use shares_agent::engine::session::{Platforms, WalletSession};
use shares_agent::engine::WalletEngine;
use shares_agent::platforms::base::{signer_from_secret, BaseClient, BaseTradeFeed};
use shares_agent::platforms::basescan::BasescanClient;
use shares_agent::platforms::kosetto::KosettoClient;
use shares_agent::strategy::buy::BuyEvaluator;
use shares_agent::strategy::sell::SellEvaluator;

const BANNER: &str = r#"
  ____  _                              _                    _
 / ___|| |__   __ _ _ __ ___  ___     / \   __ _  ___ _ __ | |_
 \___ \| '_ \ / _` | '__/ _ \/ __|   / _ \ / _` |/ _ \ '_ \| __|
  ___) | | | | (_| | | |  __/\__ \  / ___ \ (_| |  __/ | | | |_
 |____/|_| |_|\__,_|_|  \___||___/ /_/   \_\__, |\___|_| |_|\__|
                                           |___/
"#;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.toml".to_string());
    let cfg = AppConfig::load(&config_path)?;

    init_logging();

    println!("{BANNER}");
    info!(
        agent_name = %cfg.agent.name,
        wallets = cfg.wallets.len(),
        poll_interval_secs = cfg.agent.poll_interval_secs,
        "Shares agent starting up"
    );

    if cfg.wallets.is_empty() {
        anyhow::bail!("No wallets configured in {config_path}");
    }
    let bots = cfg.load_bots()?;
    info!(bots = bots.len(), "Bot blacklist loaded");

    let mut engines = JoinSet::new();
    for wallet in &cfg.wallets {
        let engine = build_engine(&cfg, wallet, &bots)
            .with_context(|| format!("Failed to set up wallet {}", wallet.address))?;
        let span = info_span!("wallet", address = %wallet.address);
        engines.spawn(engine.run().instrument(span));
    }

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received");
        }
        Some(result) = engines.join_next() => {
            if let Err(e) = result {
                error!(error = %e, "Wallet engine task failed");
            }
        }
    }

    engines.shutdown().await;
    info!("Shares agent stopped");
    Ok(())
}

/// Wire one wallet's clients, evaluators, and session into an engine.
fn build_engine(
    cfg: &AppConfig,
    wallet: &WalletConfig,
    bots: &HashSet<Address>,
) -> Result<WalletEngine> {
    let secrets = AppConfig::wallet_secrets(wallet)?;
    let signer = signer_from_secret(&secrets.private_key)?;
    if signer.address() != wallet.address {
        anyhow::bail!(
            "Private key in {} belongs to {}, not {}",
            wallet.private_key_env,
            signer.address(),
            wallet.address
        );
    }

    let timeout = cfg.request_timeout();
    let contract = cfg.chain.contract_address;

    let social: Option<Arc<dyn SocialProvider>> = match (&cfg.social, wallet.use_social_api) {
        (Some(social), true) => {
            let key = match &social.api_key_env {
                Some(env) => Some(AppConfig::resolve_secret(env)?),
                None => None,
            };
            let provider: Arc<dyn SocialProvider> =
                Arc::new(HttpSocialProvider::new(&social.base_url, key, timeout)?);
            Some(provider)
        }
        (None, true) => {
            warn!(wallet = %wallet.address, "use_social_api set but no [social] section; enrichment disabled");
            None
        }
        (_, false) => None,
    };

    let platforms = Platforms {
        market: Arc::new(BaseClient::new(&cfg.chain.rpc_url, contract, signer)?),
        feed: Arc::new(BaseTradeFeed::new(cfg.chain.ws_url.clone(), contract)),
        api: Arc::new(KosettoClient::new(
            &cfg.api.base_url,
            secrets.authorization,
            wallet.if_none_match.clone(),
            timeout,
        )?),
        ledger: Arc::new(BasescanClient::new(
            &cfg.ledger.base_url,
            AppConfig::resolve_secret(&cfg.ledger.api_key_env)?,
            timeout,
        )?),
        social,
    };

    let session = WalletSession::new(
        wallet.address,
        cfg.engine_settings(wallet),
        platforms,
        BuyEvaluator::new(cfg.strategy.buy.clone(), bots.clone(), wallet.address),
        SellEvaluator::new(cfg.strategy.sell.clone(), wallet.address),
    );
    Ok(WalletEngine::new(session))
}

/// Initialise the `tracing` subscriber.
///
/// Uses `RUST_LOG` env var for filtering, defaulting to `shares_agent=info`
/// plus the `work` trade-decision target. JSON output when
/// `SHARES_LOG_JSON` is set.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("shares_agent=info,work=info"));

    let json_logging = std::env::var("SHARES_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt().with_env_filter(env_filter).with_target(true).init();
    }
}
