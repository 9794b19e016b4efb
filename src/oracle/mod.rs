//! Historical USD pricing from AMM reserves.
//!
//! Prices are derived at a given block hash by reserve triangulation:
//!
//! 1. Anchor stablecoin → 1.0
//! 2. Bridge asset → stable reserve / bridge reserve of the (bridge, anchor) pool
//! 3. Any other asset → (bridge reserve / asset reserve) × bridge price
//! 4. XST → (XSTUSD reserve / XST reserve) × XSTUSD price, since its direct
//!    pool against the bridge asset is too thin to trust
//!
//! Every leg is normalized by its decimals with arbitrary-precision
//! division. A price of zero means "unknown": missing pools, empty
//! reserves, failed or timed out storage reads all resolve to zero and
//! never to an error.

use std::sync::Arc;
use std::time::Duration;

use bigdecimal::{BigDecimal, One, Zero};
use log::{debug, warn};
use num_bigint::BigInt;

use crate::chain::ChainClient;
use crate::config::AssetSettings;
use crate::decoder::value;
use crate::utils::{decimal_to_f64, normalize_amount, safe_div};

mod cache;

pub use cache::{Clock, PriceCache, SystemClock};

/// Decimals of the bridge asset, the anchor stablecoin and XSTUSD
const HUB_DECIMALS: u8 = 18;

/// Storage location of XYK pool reserves
const RESERVES_PALLET: &str = "poolXYK";
const RESERVES_ITEM: &str = "reserves";

/// Asset ids the oracle routes through.
#[derive(Debug, Clone)]
pub struct OracleAssets {
    pub bridge: String,
    pub anchor: String,
    pub xst: String,
    pub xstusd: String,
}

impl From<&AssetSettings> for OracleAssets {
    fn from(settings: &AssetSettings) -> Self {
        Self {
            bridge: settings.bridge_asset.to_lowercase(),
            anchor: settings.anchor_asset.to_lowercase(),
            xst: settings.xst_asset.to_lowercase(),
            xstusd: settings.xstusd_asset.to_lowercase(),
        }
    }
}

pub struct PriceOracle {
    chain: Arc<dyn ChainClient>,
    assets: OracleAssets,
    /// Present on the live path only; a backward crawl must not reuse
    /// prices across blocks
    cache: Option<Arc<PriceCache>>,
    rpc_timeout: Duration,
}

impl PriceOracle {
    /// Oracle for the backfill crawl: every block is priced from scratch.
    pub fn historical(
        chain: Arc<dyn ChainClient>,
        assets: OracleAssets,
        rpc_timeout: Duration,
    ) -> Self {
        Self {
            chain,
            assets,
            cache: None,
            rpc_timeout,
        }
    }

    /// Oracle for the live pipeline, backed by the shared TTL cache.
    pub fn live(
        chain: Arc<dyn ChainClient>,
        assets: OracleAssets,
        cache: Arc<PriceCache>,
        rpc_timeout: Duration,
    ) -> Self {
        Self {
            chain,
            assets,
            cache: Some(cache),
            rpc_timeout,
        }
    }

    pub fn assets(&self) -> &OracleAssets {
        &self.assets
    }

    /// USD price of one whole unit of `asset_id` at block `at`, or zero if unknown.
    pub async fn price_in_anchor(&self, asset_id: &str, decimals: u8, at: &str) -> BigDecimal {
        let asset_id = asset_id.to_lowercase();

        if asset_id == self.assets.anchor {
            return BigDecimal::one();
        }

        if let Some(price) = self.cached(&asset_id, decimals) {
            return price;
        }

        let bridge_price = self.bridge_price(at).await;
        let price = if asset_id == self.assets.bridge {
            bridge_price
        } else if bridge_price.is_zero() {
            BigDecimal::zero()
        } else if asset_id == self.assets.xst {
            match self.xst_price(decimals, at, &bridge_price).await {
                Some(price) => price,
                None => self.price_via_bridge(&asset_id, decimals, at, &bridge_price).await,
            }
        } else {
            self.price_via_bridge(&asset_id, decimals, at, &bridge_price).await
        };

        self.remember(&asset_id, decimals, &price);
        price
    }

    /// Same as [`price_in_anchor`](Self::price_in_anchor), as a display value.
    pub async fn price_usd(&self, asset_id: &str, decimals: u8, at: &str) -> f64 {
        decimal_to_f64(&self.price_in_anchor(asset_id, decimals, at).await)
    }

    fn cached(&self, asset_id: &str, decimals: u8) -> Option<BigDecimal> {
        self.cache.as_ref()?.get(asset_id, decimals)
    }

    /// Only known prices are cached, so a transient failure is retried on the next lookup.
    fn remember(&self, asset_id: &str, decimals: u8, price: &BigDecimal) {
        if let Some(cache) = &self.cache {
            if !price.is_zero() {
                cache.insert(asset_id, decimals, price.clone());
            }
        }
    }

    /// Price of the bridge asset: stable reserve / bridge reserve.
    async fn bridge_price(&self, at: &str) -> BigDecimal {
        if let Some(price) = self.cached(&self.assets.bridge, HUB_DECIMALS) {
            return price;
        }

        let price = match self.reserves(&self.assets.bridge, &self.assets.anchor, at).await {
            Some((bridge_reserve, stable_reserve)) if !bridge_reserve.is_zero() => safe_div(
                &normalize_amount(&stable_reserve, HUB_DECIMALS),
                &normalize_amount(&bridge_reserve, HUB_DECIMALS),
            ),
            _ => BigDecimal::zero(),
        };

        let bridge = self.assets.bridge.clone();
        self.remember(&bridge, HUB_DECIMALS, &price);
        price
    }

    async fn price_via_bridge(
        &self,
        asset_id: &str,
        decimals: u8,
        at: &str,
        bridge_price: &BigDecimal,
    ) -> BigDecimal {
        let Some((bridge_reserve, asset_reserve)) = self.reserves(&self.assets.bridge, asset_id, at).await
        else {
            return BigDecimal::zero();
        };

        let in_bridge = safe_div(
            &normalize_amount(&bridge_reserve, HUB_DECIMALS),
            &normalize_amount(&asset_reserve, decimals),
        );
        in_bridge * bridge_price
    }

    /// Two-hop XST price through XSTUSD.
    ///
    /// `Some(0)` when XSTUSD itself has no price; `None` when the
    /// (XSTUSD, XST) pool is empty, so the caller falls back to the
    /// direct bridge route.
    async fn xst_price(
        &self,
        decimals: u8,
        at: &str,
        bridge_price: &BigDecimal,
    ) -> Option<BigDecimal> {
        let xstusd = self.assets.xstusd.clone();
        let xstusd_price = match self.cached(&xstusd, HUB_DECIMALS) {
            Some(price) => price,
            None => {
                let price = self.price_via_bridge(&xstusd, HUB_DECIMALS, at, bridge_price).await;
                self.remember(&xstusd, HUB_DECIMALS, &price);
                price
            },
        };

        if xstusd_price.is_zero() {
            return Some(BigDecimal::zero());
        }

        let (xstusd_reserve, xst_reserve) = self.reserves(&xstusd, &self.assets.xst, at).await?;
        if xstusd_reserve.is_zero() || xst_reserve.is_zero() {
            debug!("XSTUSD/XST pool empty at {}, using bridge route", at);
            return None;
        }

        let in_xstusd = safe_div(
            &normalize_amount(&xstusd_reserve, HUB_DECIMALS),
            &normalize_amount(&xst_reserve, decimals),
        );
        Some(in_xstusd * xstusd_price)
    }

    /// Reserves of the pool between `a` and `b`, returned as `(reserve_a, reserve_b)`.
    ///
    /// The pool is keyed by the two ids in ascending order and the stored
    /// pair follows that order, so the slots are swapped back when `b < a`.
    async fn reserves(&self, a: &str, b: &str, at: &str) -> Option<(BigInt, BigInt)> {
        let swapped = b < a;
        let keys = if swapped {
            [b.to_string(), a.to_string()]
        } else {
            [a.to_string(), b.to_string()]
        };

        let read = self.chain.get_storage_at(at, RESERVES_PALLET, RESERVES_ITEM, &keys);
        let raw = match tokio::time::timeout(self.rpc_timeout, read).await {
            Ok(Ok(Some(raw))) => raw,
            Ok(Ok(None)) => return None,
            Ok(Err(e)) => {
                debug!("Reserve read failed for ({}, {}) at {}: {:#}", keys[0], keys[1], at, e);
                return None;
            },
            Err(_) => {
                warn!("Reserve read timed out for ({}, {}) at {}", keys[0], keys[1], at);
                return None;
            },
        };

        let (first, second) = value::reserve_pair(&raw)?;
        Some(if swapped { (second, first) } else { (first, second) })
    }
}
