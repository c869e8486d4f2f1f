//! Base chain integration via alloy.
//!
//! Reads quotes and balances from the shares contract, signs and submits
//! buy/sell transactions with the wallet's local key, waits for receipts,
//! and streams decoded `Trade` events over a WebSocket subscription.
//!
//! Contract: `SharesV1` (friend.tech-style bonding curve)
//! Auth: local private key (`PrivateKeySigner`), never leaves the process.

use alloy::network::{EthereumWallet, ReceiptResponse, TransactionBuilder};
use alloy::primitives::{Address, TxHash, U256};
use alloy::providers::{
    DynProvider, PendingTransactionBuilder, Provider, ProviderBuilder, WsConnect,
};
use alloy::rpc::types::{Filter, Log, TransactionRequest};
use alloy::signers::local::PrivateKeySigner;
use alloy::sol;
use alloy::sol_types::SolEvent;
use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};
use secrecy::{ExposeSecret, SecretString};
use tokio::sync::OnceCell;
use tracing::{debug, info};

use super::{SharesMarket, TradeFeed, TxOrder};
use crate::types::{Subject, TradeEvent};

// ---------------------------------------------------------------------------
// Contract binding
// ---------------------------------------------------------------------------

sol! {
    #[sol(rpc)]
    interface SharesV1 {
        event Trade(
            address trader,
            address subject,
            bool isBuy,
            uint256 shareAmount,
            uint256 ethAmount,
            uint256 protocolEthAmount,
            uint256 subjectEthAmount,
            uint256 supply
        );

        function buyShares(address sharesSubject, uint256 amount) external payable;
        function sellShares(address sharesSubject, uint256 amount) external payable;
        function getBuyPriceAfterFee(address sharesSubject, uint256 amount) external view returns (uint256);
        function getSellPriceAfterFee(address sharesSubject, uint256 amount) external view returns (uint256);
        function sharesBalance(address sharesSubject, address holder) external view returns (uint256);
    }
}

/// Maximum `Trade` events handed downstream in one batch.
const TRADE_BATCH: usize = 64;

/// Parse a hex private key held as a secret.
pub fn signer_from_secret(key: &SecretString) -> Result<PrivateKeySigner> {
    key.expose_secret()
        .trim()
        .parse::<PrivateKeySigner>()
        .context("Invalid wallet private key")
}

// ---------------------------------------------------------------------------
// HTTP client (quotes + transactions)
// ---------------------------------------------------------------------------

/// Signing HTTP client bound to one wallet and the shares contract.
pub struct BaseClient {
    provider: DynProvider,
    contract: SharesV1::SharesV1Instance<DynProvider>,
}

impl BaseClient {
    pub fn new(rpc_url: &str, contract: Address, signer: PrivateKeySigner) -> Result<Self> {
        let url: reqwest::Url = rpc_url
            .parse()
            .with_context(|| format!("Invalid RPC URL: {rpc_url}"))?;
        let wallet_address = signer.address();
        let provider = ProviderBuilder::new()
            .wallet(EthereumWallet::from(signer))
            .connect_http(url)
            .erased();
        info!(wallet = %wallet_address, %contract, "Base client ready");
        Ok(Self {
            contract: SharesV1::new(contract, provider.clone()),
            provider,
        })
    }

    pub fn contract_address(&self) -> Address {
        *self.contract.address()
    }
}

#[async_trait]
impl SharesMarket for BaseClient {
    async fn buy_price(&self, subject: Subject, amount: u64) -> Result<U256> {
        self.contract
            .getBuyPriceAfterFee(subject, U256::from(amount))
            .call()
            .await
            .with_context(|| format!("getBuyPriceAfterFee failed for {subject}"))
    }

    async fn sell_price(&self, subject: Subject, amount: u64) -> Result<U256> {
        self.contract
            .getSellPriceAfterFee(subject, U256::from(amount))
            .call()
            .await
            .with_context(|| format!("getSellPriceAfterFee failed for {subject}"))
    }

    async fn shares_balance(&self, subject: Subject, owner: Address) -> Result<U256> {
        self.contract
            .sharesBalance(subject, owner)
            .call()
            .await
            .with_context(|| format!("sharesBalance failed for {subject}"))
    }

    async fn transaction_count(&self, owner: Address) -> Result<u64> {
        self.provider
            .get_transaction_count(owner)
            .await
            .with_context(|| format!("Failed to fetch transaction count for {owner}"))
    }

    async fn send_transaction(&self, order: TxOrder) -> Result<TxHash> {
        let nonce = order.nonce;
        let tx = TransactionRequest::default()
            .with_to(self.contract_address())
            .with_input(order.calldata)
            .with_value(order.value)
            .with_nonce(order.nonce)
            .with_gas_price(order.gas_price)
            .with_gas_limit(order.gas_limit);

        let pending = self
            .provider
            .send_transaction(tx)
            .await
            .with_context(|| format!("Failed to send transaction with nonce {nonce}"))?;
        let hash = *pending.tx_hash();
        debug!(%hash, nonce, "Transaction sent");
        Ok(hash)
    }

    async fn wait_for_receipt(&self, hash: TxHash, confirmations: u64) -> Result<bool> {
        let receipt = PendingTransactionBuilder::new(self.provider.root().clone(), hash)
            .with_required_confirmations(confirmations)
            .get_receipt()
            .await
            .with_context(|| format!("Failed waiting for receipt of {hash}"))?;
        Ok(receipt.status())
    }
}

// ---------------------------------------------------------------------------
// WebSocket trade feed
// ---------------------------------------------------------------------------

/// `Trade` event feed over a shared WebSocket connection.
///
/// The connection is opened lazily on the first subscription and reused by
/// every later one; each subscription is its own server-side filter.
pub struct BaseTradeFeed {
    ws_url: String,
    contract: Address,
    provider: OnceCell<DynProvider>,
}

impl BaseTradeFeed {
    pub fn new(ws_url: impl Into<String>, contract: Address) -> Self {
        Self {
            ws_url: ws_url.into(),
            contract,
            provider: OnceCell::new(),
        }
    }

    async fn provider(&self) -> Result<&DynProvider> {
        self.provider
            .get_or_try_init(|| async {
                let provider = ProviderBuilder::new()
                    .connect_ws(WsConnect::new(self.ws_url.clone()))
                    .await
                    .with_context(|| format!("WebSocket connect failed: {}", self.ws_url))?;
                info!(url = %self.ws_url, "WebSocket connected");
                Ok::<_, anyhow::Error>(provider.erased())
            })
            .await
    }
}

#[async_trait]
impl TradeFeed for BaseTradeFeed {
    async fn subscribe(&self) -> Result<BoxStream<'static, Vec<TradeEvent>>> {
        let provider = self.provider().await?;
        let filter = Filter::new()
            .address(self.contract)
            .event_signature(SharesV1::Trade::SIGNATURE_HASH);
        let subscription = provider
            .subscribe_logs(&filter)
            .await
            .context("Trade log subscription failed")?;

        Ok(subscription
            .into_stream()
            .filter_map(|log| futures::future::ready(decode_trade(&log)))
            .ready_chunks(TRADE_BATCH)
            .boxed())
    }
}

fn decode_trade(log: &Log) -> Option<TradeEvent> {
    match log.log_decode::<SharesV1::Trade>() {
        Ok(decoded) => {
            let trade = decoded.inner.data;
            Some(TradeEvent {
                subject: trade.subject,
                trader: trade.trader,
                eth_amount: trade.ethAmount,
                is_buy: trade.isBuy,
                supply: trade.supply,
                block_number: log.block_number,
                log_index: log.log_index,
            })
        }
        Err(e) => {
            debug!(error = %e, "Skipping undecodable Trade log");
            None
        }
    }
}
