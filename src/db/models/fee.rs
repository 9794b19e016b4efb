use serde::{Deserialize, Serialize};

/// What the fee-paying extrinsic did, by co-occurring events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FeeKind {
    Swap,
    Transfer,
    Bridge,
    Other,
}

impl FeeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Swap => "Swap",
            Self::Transfer => "Transfer",
            Self::Bridge => "Bridge",
            Self::Other => "Other",
        }
    }

    pub fn from_db(value: &str) -> Self {
        match value {
            "Swap" => Self::Swap,
            "Transfer" => Self::Transfer,
            "Bridge" => Self::Bridge,
            _ => Self::Other,
        }
    }
}

/// Network fee charged for one extrinsic, in the native asset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeeEvent {
    pub timestamp: i64,
    pub block: i64,
    pub kind: FeeKind,
    pub amount: String,
    pub usd_value: f64,
}

/// Fee totals for one kind over a time window.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeeSummary {
    pub kind: FeeKind,
    pub count: i64,
    pub total_amount: f64,
    pub total_usd: f64,
}
