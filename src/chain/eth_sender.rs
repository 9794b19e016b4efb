use std::str::FromStr;
use std::time::Duration;

use alloy::{
    network::TransactionResponse,
    primitives::B256,
    providers::{DynProvider, Provider, ProviderBuilder},
};
use anyhow::{Context, Result};
use async_trait::async_trait;
use log::{debug, warn};
use url::Url;

use crate::utils::hex_encode;

/// Recovers the external-chain sender of an incoming bridge transfer.
#[async_trait]
pub trait SenderResolver: Send + Sync {
    /// Returns `None` when the transaction is unknown or the lookup fails.
    async fn resolve_sender_by_tx_hash(&self, tx_hash: &str) -> Option<String>;
}

/// Ethereum JSON-RPC sender lookup via `eth_getTransactionByHash`.
pub struct EthSenderResolver {
    provider: DynProvider,
    timeout: Duration,
}

impl EthSenderResolver {
    pub fn new(rpc_url: &str, timeout: Duration) -> Result<Self> {
        let url = Url::parse(rpc_url).with_context(|| format!("Invalid Ethereum RPC URL: {}", rpc_url))?;
        let provider = DynProvider::new(ProviderBuilder::new().connect_http(url));

        Ok(Self { provider, timeout })
    }
}

#[async_trait]
impl SenderResolver for EthSenderResolver {
    async fn resolve_sender_by_tx_hash(&self, tx_hash: &str) -> Option<String> {
        let hash = match B256::from_str(tx_hash.trim()) {
            Ok(h) => h,
            Err(_) => {
                debug!("Not an Ethereum tx hash: {}", tx_hash);
                return None;
            },
        };

        match tokio::time::timeout(self.timeout, self.provider.get_transaction_by_hash(hash)).await {
            Ok(Ok(Some(tx))) => Some(hex_encode(tx.from().as_slice())),
            Ok(Ok(None)) => None,
            Ok(Err(e)) => {
                warn!("Ethereum sender lookup failed for {}: {}", tx_hash, e);
                None
            },
            Err(_) => {
                warn!("Ethereum sender lookup timed out for {}", tx_hash);
                None
            },
        }
    }
}

/// Used when no Ethereum RPC is configured.
pub struct NoopSenderResolver;

#[async_trait]
impl SenderResolver for NoopSenderResolver {
    async fn resolve_sender_by_tx_hash(&self, _tx_hash: &str) -> Option<String> {
        None
    }
}
