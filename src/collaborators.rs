//! Narrow async interfaces to everything this crate treats as an
//! external collaborator (§1 "out of scope", §6 "External interfaces",
//! §D of the expanded spec): the wallet/keychain service, the block
//! explorer, and the KRS market-price feed. The verification, signing,
//! and recovery entry points take these by trait object/generic rather
//! than owning a transport, so the core never has to know about HTTP.

use async_trait::async_trait;
use miniscript::bitcoin::Txid;

use crate::address::AddressRecord;
use crate::keys::Keychain;

/// Correlation token threaded through every outbound call (§5 "Cancellation",
/// §9 "Global mutable `_reqId`"). Replaces the source's global mutable
/// request-id with an explicit per-call value every collaborator receives.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    pub req_id: String,
}

impl RequestContext {
    pub fn new(req_id: impl Into<String>) -> Self {
        Self {
            req_id: req_id.into(),
        }
    }
}

#[async_trait]
pub trait KeychainService: Send + Sync {
    async fn get_keychain(&self, id: &str, ctx: &RequestContext) -> crate::Result<Keychain>;
}

/// 404 from the wallet-address lookup is its own variant rather than a
/// string the caller must `.includes("wallet address not found")` on
/// (§9 "String-based error discrimination").
#[derive(Debug, thiserror::Error)]
pub enum WalletAddressError {
    #[error("wallet address not found: {0}")]
    NotFound(String),
    #[error(transparent)]
    Other(#[from] crate::WalletError),
}

#[async_trait]
pub trait WalletAddressService: Send + Sync {
    async fn get_address(
        &self,
        address: &str,
        ctx: &RequestContext,
    ) -> Result<AddressRecord, WalletAddressError>;
}

#[derive(Debug, Clone)]
pub struct TxOutput {
    pub address: Option<String>,
    pub value: u64,
}

#[derive(Debug, Clone)]
pub struct AddressInfo {
    pub tx_count: u64,
    pub total_balance: u64,
}

#[derive(Debug, Clone)]
pub struct Unspent {
    pub txid: Txid,
    pub output_index: u32,
    pub value: u64,
    pub address: String,
}

#[async_trait]
pub trait Explorer: Send + Sync {
    async fn latest_block_height(&self, ctx: &RequestContext) -> crate::Result<u64>;
    async fn get_tx(&self, txid: Txid, ctx: &RequestContext) -> crate::Result<Vec<TxOutput>>;
    async fn get_address_info(
        &self,
        address: &str,
        ctx: &RequestContext,
    ) -> crate::Result<AddressInfo>;
    async fn get_address_unspents(
        &self,
        address: &str,
        ctx: &RequestContext,
    ) -> crate::Result<Vec<Unspent>>;
}

#[async_trait]
pub trait PriceFeed: Send + Sync {
    async fn get_market_price_usd(&self, coin: &str, ctx: &RequestContext) -> crate::Result<f64>;
}

/// Wraps any `PriceFeed` with the two-retry policy §4.9 requires, so each
/// implementation doesn't have to reimplement retrying.
pub struct RetryingPriceFeed<F> {
    inner: F,
    retries: u32,
}

impl<F: PriceFeed> RetryingPriceFeed<F> {
    pub fn new(inner: F) -> Self {
        Self { inner, retries: 2 }
    }
}

#[async_trait]
impl<F: PriceFeed> PriceFeed for RetryingPriceFeed<F> {
    async fn get_market_price_usd(&self, coin: &str, ctx: &RequestContext) -> crate::Result<f64> {
        let mut last_err = None;
        for attempt in 0..=self.retries {
            match self.inner.get_market_price_usd(coin, ctx).await {
                Ok(price) => return Ok(price),
                Err(e) => {
                    tracing::warn!(attempt, coin, error = %e, "market price fetch failed");
                    last_err = Some(e);
                }
            }
        }
        Err(last_err.expect("loop runs at least once"))
    }
}
