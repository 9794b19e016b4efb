use serde::{Deserialize, Serialize};

use crate::utils::strip_separators;

/// Pool deposit or withdrawal. The event path reports these as
/// add/remove; both paths are stored as deposit/withdraw.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LiquidityKind {
    Deposit,
    Withdraw,
}

impl LiquidityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Deposit => "deposit",
            Self::Withdraw => "withdraw",
        }
    }

    pub fn from_db(value: &str) -> Self {
        match value {
            "withdraw" | "remove" => Self::Withdraw,
            _ => Self::Deposit,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiquidityEvent {
    pub timestamp: i64,
    pub block: i64,
    pub wallet: String,
    /// Pool legs are stored by symbol
    pub pool_base: String,
    pub pool_target: String,
    pub base_amount: String,
    pub target_amount: String,
    pub usd_value: f64,
    pub kind: LiquidityKind,
    pub hash: String,
    pub extrinsic_id: String,
}

impl LiquidityEvent {
    pub fn dedup_key(&self) -> String {
        format!(
            "{}_{}_{}_{}_{}_{}",
            self.block,
            self.wallet,
            self.pool_base,
            self.pool_target,
            strip_separators(&self.base_amount),
            strip_separators(&self.target_amount)
        )
    }
}
