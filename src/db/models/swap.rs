use serde::{Deserialize, Serialize};

use crate::utils::strip_separators;

/// A priced DEX swap (`liquidityProxy.Exchange`).
///
/// Only ever built when both legs carry a non-zero USD price.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwapEvent {
    pub timestamp: i64,
    pub block: i64,
    pub wallet: String,

    // Input leg
    pub in_asset_id: String,
    pub in_symbol: String,
    pub in_amount: String,
    pub in_logo: String,
    pub in_usd: f64,

    // Output leg
    pub out_asset_id: String,
    pub out_symbol: String,
    pub out_amount: String,
    pub out_logo: String,
    pub out_usd: f64,

    pub hash: String,
    pub extrinsic_id: String,
}

impl SwapEvent {
    /// Natural key shared by the live and history stores.
    pub fn dedup_key(&self) -> String {
        format!(
            "{}_{}_{}_{}_{}_{}",
            self.block,
            self.wallet,
            self.in_symbol,
            strip_separators(&self.in_amount),
            self.out_symbol,
            strip_separators(&self.out_amount)
        )
    }
}
