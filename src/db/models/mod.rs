mod asset;
mod bridge;
mod checkpoint;
mod fee;
mod liquidity;
mod swap;
mod transfer;

pub use asset::AssetMetadata;
pub use bridge::{BridgeDirection, BridgeEvent};
pub use checkpoint::Checkpoint;
pub use fee::{FeeEvent, FeeKind, FeeSummary};
pub use liquidity::{LiquidityEvent, LiquidityKind};
pub use swap::SwapEvent;
pub use transfer::TransferEvent;

/// Everything decoded from one block.
#[derive(Debug, Clone, Default)]
pub struct BlockRecords {
    pub swaps: Vec<SwapEvent>,
    pub transfers: Vec<TransferEvent>,
    pub bridges: Vec<BridgeEvent>,
    pub liquidity: Vec<LiquidityEvent>,
    pub fees: Vec<FeeEvent>,
}

impl BlockRecords {
    pub fn len(&self) -> usize {
        self.swaps.len()
            + self.transfers.len()
            + self.bridges.len()
            + self.liquidity.len()
            + self.fees.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
