use std::time::Duration;

use anyhow::{Context, Result};
use log::{info, warn};
use rustc_hash::FxHashMap;

use crate::config::AssetSettings;
use crate::db::models::AssetMetadata;

/// Timeout for the whitelist download
const WHITELIST_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Assets the pipeline cannot price or label without, appended when the
/// whitelist omits them: (symbol, name, asset id)
const ESSENTIAL_ASSETS: [(&str, &str, &str); 3] = [
    (
        "TBCD",
        "SORA TBC Dollar",
        "0x02000a0000000000000000000000000000000000000000000000000000000000",
    ),
    (
        "XSTUSD",
        "SORA Synthetic USD",
        "0x0200080000000000000000000000000000000000000000000000000000000000",
    ),
    (
        "KUSD",
        "Kensetsu Stable Dollar",
        "0x0081a26ba6cc31c4664c1f964a25b3af61f4c78496464522409f53e601556272",
    ),
];

/// Whitelisted asset metadata, loaded once per process.
///
/// Lookups are case-insensitive by asset id and by symbol.
#[derive(Debug, Clone, Default)]
pub struct AssetRegistry {
    by_id: FxHashMap<String, AssetMetadata>,
    by_symbol: FxHashMap<String, String>,
}

impl AssetRegistry {
    /// Download the whitelist, degrading to the native asset and the
    /// anchor stablecoin when the source is unreachable or empty.
    pub async fn load(settings: &AssetSettings) -> Self {
        let assets = match fetch_whitelist(&settings.whitelist_url).await {
            Ok(assets) if !assets.is_empty() => {
                info!("Loaded {} whitelisted assets", assets.len());
                assets
            },
            Ok(_) => {
                warn!("Asset whitelist is empty, using fallback assets");
                fallback_assets(settings)
            },
            Err(e) => {
                warn!("Failed to load asset whitelist, using fallback assets: {:#}", e);
                fallback_assets(settings)
            },
        };

        Self::from_assets(assets)
    }

    /// Build from an explicit list; essential assets are appended when missing.
    pub fn from_assets(assets: Vec<AssetMetadata>) -> Self {
        let mut registry = Self::default();
        for asset in assets {
            registry.insert(asset);
        }

        for (symbol, name, id) in ESSENTIAL_ASSETS {
            if !registry.by_symbol.contains_key(&symbol.to_uppercase()) {
                registry.insert(AssetMetadata::new(symbol, name, 18, id));
            }
        }

        registry
    }

    fn insert(&mut self, mut asset: AssetMetadata) {
        asset.asset_id = asset.asset_id.to_lowercase();
        self.by_symbol
            .insert(asset.symbol.to_uppercase(), asset.asset_id.clone());
        self.by_id.insert(asset.asset_id.clone(), asset);
    }

    pub fn get(&self, asset_id: &str) -> Option<&AssetMetadata> {
        self.by_id.get(&asset_id.to_lowercase())
    }

    /// Metadata for `asset_id`, or the 18-decimals `UNK` placeholder.
    pub fn resolve(&self, asset_id: &str) -> AssetMetadata {
        self.get(asset_id)
            .cloned()
            .unwrap_or_else(|| AssetMetadata::unknown(asset_id))
    }

    pub fn by_symbol(&self, symbol: &str) -> Option<&AssetMetadata> {
        let id = self.by_symbol.get(&symbol.to_uppercase())?;
        self.by_id.get(id)
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}

async fn fetch_whitelist(url: &str) -> Result<Vec<AssetMetadata>> {
    let client = reqwest::Client::builder()
        .timeout(WHITELIST_FETCH_TIMEOUT)
        .build()
        .context("Failed to build HTTP client")?;

    let assets = client
        .get(url)
        .send()
        .await
        .with_context(|| format!("Failed to fetch {}", url))?
        .error_for_status()?
        .json::<Vec<AssetMetadata>>()
        .await
        .context("Whitelist is not a list of assets")?;

    Ok(assets)
}

fn fallback_assets(settings: &AssetSettings) -> Vec<AssetMetadata> {
    vec![
        AssetMetadata::new("XOR", "SORA", 18, &settings.bridge_asset),
        AssetMetadata::new("DAI", "Dai Stablecoin", 18, &settings.anchor_asset),
    ]
}
