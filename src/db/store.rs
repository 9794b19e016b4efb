use anyhow::Result;
use async_trait::async_trait;
use log::error;

use crate::db::models::{
    BlockRecords, BridgeEvent, FeeEvent, FeeSummary, LiquidityEvent, SwapEvent, TransferEvent,
};

/// Optional filters for swap reads.
#[derive(Debug, Clone, Default)]
pub struct SwapQuery {
    pub wallet: Option<String>,
    /// Matches either leg
    pub symbol: Option<String>,
    pub since: Option<i64>,
}

/// Optional filters for transfer reads.
#[derive(Debug, Clone, Default)]
pub struct TransferQuery {
    /// Matches either side
    pub address: Option<String>,
    pub symbol: Option<String>,
    pub since: Option<i64>,
}

/// Optional filters for bridge reads.
#[derive(Debug, Clone, Default)]
pub struct BridgeQuery {
    /// Matches sender or recipient
    pub address: Option<String>,
    pub network: Option<String>,
    pub since: Option<i64>,
}

/// One physical datastore. Reads return newest rows first.
#[async_trait]
pub trait EventStore: Send + Sync {
    async fn insert_swap(&self, swap: &SwapEvent) -> Result<()>;
    async fn insert_transfer(&self, transfer: &TransferEvent) -> Result<()>;
    async fn insert_bridge(&self, bridge: &BridgeEvent) -> Result<()>;
    async fn insert_liquidity(&self, event: &LiquidityEvent) -> Result<()>;
    async fn insert_fee(&self, fee: &FeeEvent) -> Result<()>;

    /// Whether any record of any kind references `block`. The backfill
    /// skips such blocks.
    async fn block_is_indexed(&self, block: i64) -> Result<bool>;

    async fn swaps(&self, query: &SwapQuery, limit: i64) -> Result<Vec<SwapEvent>>;
    async fn count_swaps(&self, query: &SwapQuery) -> Result<i64>;

    async fn transfers(&self, query: &TransferQuery, limit: i64) -> Result<Vec<TransferEvent>>;
    async fn count_transfers(&self, query: &TransferQuery) -> Result<i64>;

    async fn bridges(&self, query: &BridgeQuery, limit: i64) -> Result<Vec<BridgeEvent>>;
    async fn count_bridges(&self, query: &BridgeQuery) -> Result<i64>;

    async fn pool_activity(
        &self,
        base: &str,
        target: &str,
        limit: i64,
    ) -> Result<Vec<LiquidityEvent>>;

    async fn fee_summary(&self, since: i64) -> Result<Vec<FeeSummary>>;

    /// Delete every row older than `timestamp`. Returns the number of rows removed.
    async fn prune_before(&self, timestamp: i64) -> Result<u64>;
}

/// Insert every record of a block, one independent write per record.
///
/// A failed insert is logged and does not stop the rest. Returns the
/// number of records written.
pub async fn persist_records(store: &dyn EventStore, records: &BlockRecords) -> usize {
    let mut written = 0;

    for swap in &records.swaps {
        match store.insert_swap(swap).await {
            Ok(()) => written += 1,
            Err(e) => error!("Failed to insert swap at #{}: {:#}", swap.block, e),
        }
    }
    for transfer in &records.transfers {
        match store.insert_transfer(transfer).await {
            Ok(()) => written += 1,
            Err(e) => error!("Failed to insert transfer at #{}: {:#}", transfer.block, e),
        }
    }
    for bridge in &records.bridges {
        match store.insert_bridge(bridge).await {
            Ok(()) => written += 1,
            Err(e) => error!("Failed to insert bridge at #{}: {:#}", bridge.block, e),
        }
    }
    for event in &records.liquidity {
        match store.insert_liquidity(event).await {
            Ok(()) => written += 1,
            Err(e) => error!("Failed to insert liquidity event at #{}: {:#}", event.block, e),
        }
    }
    for fee in &records.fees {
        match store.insert_fee(fee).await {
            Ok(()) => written += 1,
            Err(e) => error!("Failed to insert fee at #{}: {:#}", fee.block, e),
        }
    }

    written
}
