use serde::{Deserialize, Serialize};

/// Whitelisted asset metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetMetadata {
    pub symbol: String,
    pub name: String,
    pub decimals: u8,
    /// Canonical asset id, lowercase hex
    #[serde(rename = "address")]
    pub asset_id: String,
    #[serde(default, rename = "icon")]
    pub logo: String,
}

impl AssetMetadata {
    pub fn new(symbol: &str, name: &str, decimals: u8, asset_id: &str) -> Self {
        Self {
            symbol: symbol.to_string(),
            name: name.to_string(),
            decimals,
            asset_id: asset_id.to_lowercase(),
            logo: String::new(),
        }
    }

    /// Stand-in for ids missing from the whitelist.
    pub fn unknown(asset_id: &str) -> Self {
        Self::new("UNK", "Unknown", 18, asset_id)
    }

    pub fn is_unknown(&self) -> bool {
        self.symbol == "UNK"
    }
}
