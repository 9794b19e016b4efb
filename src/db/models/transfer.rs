use serde::{Deserialize, Serialize};

use crate::utils::strip_separators;

/// Native (`balances.Transfer`) or multi-asset (`tokens.Transfer`) transfer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferEvent {
    pub timestamp: i64,
    pub block: i64,
    pub from: String,
    pub to: String,
    pub amount: String,
    pub asset_id: String,
    pub symbol: String,
    pub logo: String,
    pub usd_value: f64,
    pub hash: String,
    pub extrinsic_id: String,
}

impl TransferEvent {
    pub fn dedup_key(&self) -> String {
        format!(
            "{}_{}_{}_{}_{}",
            self.block,
            self.from,
            self.to,
            strip_separators(&self.amount),
            self.asset_id
        )
    }
}
