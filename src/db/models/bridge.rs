use serde::{Deserialize, Serialize};

use crate::utils::strip_separators;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BridgeDirection {
    Incoming,
    Outgoing,
}

impl BridgeDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Incoming => "Incoming",
            Self::Outgoing => "Outgoing",
        }
    }

    pub fn from_db(value: &str) -> Self {
        if value.eq_ignore_ascii_case("incoming") {
            Self::Incoming
        } else {
            Self::Outgoing
        }
    }
}

/// A cross-chain bridge movement in either direction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BridgeEvent {
    pub timestamp: i64,
    pub block: i64,
    pub network: String,
    pub direction: BridgeDirection,
    pub sender: String,
    pub recipient: String,
    pub asset_id: String,
    pub symbol: String,
    pub logo: String,
    pub amount: String,
    pub usd_value: f64,
    /// Extrinsic hash, or the bridge request hash for incoming legs
    pub hash: String,
    /// `{block}-{index}`, or the external sentinel for incoming legs
    pub extrinsic_id: String,
}

impl BridgeEvent {
    pub fn dedup_key(&self) -> String {
        format!(
            "{}_{}_{}_{}",
            self.block,
            self.sender,
            self.recipient,
            strip_separators(&self.amount)
        )
    }
}
