//! Job to keep the live price cache warm for the assets every block touches.
//!
//! Prices the key assets at the current head through the shared cache, so
//! the first events of the next block skip the reserve reads, and purges
//! expired quotes.

use std::sync::Arc;

use anyhow::Result;
use futures::future::join_all;
use log::info;

use crate::chain::ChainClient;
use crate::db::models::AssetMetadata;
use crate::oracle::{PriceCache, PriceOracle};
use crate::worker::AssetRegistry;

/// Symbols refreshed besides the oracle's routing assets
const KEY_SYMBOLS: [&str; 2] = ["TBCD", "KUSD"];

pub struct KeyPrices {
    chain: Arc<dyn ChainClient>,
    oracle: Arc<PriceOracle>,
    cache: Arc<PriceCache>,
    assets: Vec<AssetMetadata>,
}

impl KeyPrices {
    pub fn new(
        chain: Arc<dyn ChainClient>,
        oracle: Arc<PriceOracle>,
        cache: Arc<PriceCache>,
        registry: &AssetRegistry,
    ) -> Self {
        let routing = oracle.assets();
        let mut assets: Vec<AssetMetadata> = [&routing.bridge, &routing.xstusd, &routing.xst]
            .into_iter()
            .map(|id| registry.resolve(id))
            .collect();
        assets.extend(KEY_SYMBOLS.iter().filter_map(|s| registry.by_symbol(s)).cloned());

        Self {
            chain,
            oracle,
            cache,
            assets,
        }
    }
}

pub async fn run(prices: &KeyPrices) -> Result<usize> {
    let start = std::time::Instant::now();
    let purged = prices.cache.purge_expired();
    let head = prices.chain.get_header().await?;

    let quotes = join_all(
        prices
            .assets
            .iter()
            .map(|asset| prices.oracle.price_usd(&asset.asset_id, asset.decimals, &head.hash)),
    )
    .await;

    let priced = quotes.iter().filter(|usd| **usd > 0.0).count();
    let native_usd = prices
        .assets
        .iter()
        .zip(&quotes)
        .find(|(asset, _)| asset.asset_id == prices.oracle.assets().bridge)
        .map(|(_, usd)| *usd)
        .unwrap_or_default();

    info!(
        "Completed refresh_key_prices job in {:?} at #{} ({}/{} priced, {} expired, native ${:.6})",
        start.elapsed(),
        head.number,
        priced,
        prices.assets.len(),
        purged,
        native_usd
    );
    Ok(priced)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{test_registry, MockChain, BRIDGE};
    use std::time::Duration;

    #[tokio::test]
    async fn test_warms_shared_cache() {
        let chain = Arc::new(MockChain::with_priced_token());
        chain.set_head(77);
        let cache = Arc::new(PriceCache::with_system_clock(Duration::from_secs(60)));
        let oracle = Arc::new(PriceOracle::live(
            chain.clone(),
            MockChain::oracle_assets(),
            cache.clone(),
            Duration::from_secs(1),
        ));

        let prices = KeyPrices::new(chain.clone(), oracle, cache.clone(), &test_registry());
        assert_eq!(run(&prices).await.unwrap(), 1);
        assert!(cache.get(BRIDGE, 18).is_some());
    }
}
