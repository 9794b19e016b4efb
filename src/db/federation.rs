//! Federated reads across the live and history stores.
//!
//! Every query runs against both stores, unions the rows, orders them by
//! timestamp and drops duplicates by natural key: backfill and live
//! ingestion overlap at the boundary, so the same on-chain occurrence can
//! sit in both stores. A missing or failing history store degrades the
//! query to live-only.

use std::future::Future;
use std::sync::Arc;

use anyhow::Result;
use log::warn;
use rustc_hash::{FxHashMap, FxHashSet};
use serde::Serialize;

use crate::db::models::{BridgeEvent, FeeSummary, LiquidityEvent, SwapEvent, TransferEvent};
use crate::db::store::{BridgeQuery, EventStore, SwapQuery, TransferQuery};

/// One page of a federated read.
#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub data: Vec<T>,
    /// Approximate: the sum of both stores' counts before deduplication
    pub total: i64,
    pub total_pages: i64,
    pub page: i64,
}

/// Row counts across both stores.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ActivityCounts {
    pub swaps: i64,
    pub transfers: i64,
    pub bridges: i64,
}

/// Single read interface over both datastores.
pub struct FederatedRepository {
    live: Arc<dyn EventStore>,
    history: Option<Arc<dyn EventStore>>,
}

/// Union, newest first, deduplicated, then sliced to the requested page.
fn merge_page<T>(
    live: Vec<T>,
    history: Vec<T>,
    offset: usize,
    limit: usize,
    key: impl Fn(&T) -> String,
    timestamp: impl Fn(&T) -> i64,
) -> Vec<T> {
    let mut rows: Vec<T> = live.into_iter().chain(history).collect();
    rows.sort_by_key(|row| std::cmp::Reverse(timestamp(row)));

    let mut seen = FxHashSet::default();
    rows.into_iter()
        .filter(|row| seen.insert(key(row)))
        .skip(offset)
        .take(limit)
        .collect()
}

fn page_bounds(page: i64, limit: i64) -> (i64, i64, i64) {
    let page = page.max(1);
    let limit = limit.max(1);
    (page, limit, (page - 1) * limit)
}

fn total_pages(total: i64, limit: i64) -> i64 {
    (total + limit - 1) / limit
}

impl FederatedRepository {
    pub fn new(live: Arc<dyn EventStore>, history: Option<Arc<dyn EventStore>>) -> Self {
        Self { live, history }
    }

    pub fn has_history(&self) -> bool {
        self.history.is_some()
    }

    /// Run `read` against both stores. The history result is `None` when
    /// the store is absent or the read failed.
    async fn read_both<T, F, Fut>(&self, what: &str, read: F) -> Result<(T, Option<T>)>
    where
        F: Fn(Arc<dyn EventStore>) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let history_read = async {
            match &self.history {
                Some(history) => match read(history.clone()).await {
                    Ok(value) => Some(value),
                    Err(e) => {
                        warn!("History store unavailable for {}, serving live data only: {:#}", what, e);
                        None
                    },
                },
                None => None,
            }
        };

        let (live, history) = tokio::join!(read(self.live.clone()), history_read);
        Ok((live?, history))
    }

    // ==================== SWAPS ====================

    pub async fn latest_swaps(
        &self,
        page: i64,
        limit: i64,
        symbol: Option<&str>,
    ) -> Result<Page<SwapEvent>> {
        let query = SwapQuery {
            symbol: symbol.map(str::to_string),
            ..Default::default()
        };
        self.swap_page(query, page, limit).await
    }

    pub async fn wallet_swaps(&self, wallet: &str, page: i64, limit: i64) -> Result<Page<SwapEvent>> {
        let query = SwapQuery {
            wallet: Some(wallet.to_string()),
            ..Default::default()
        };
        self.swap_page(query, page, limit).await
    }

    async fn swap_page(&self, query: SwapQuery, page: i64, limit: i64) -> Result<Page<SwapEvent>> {
        let (page, limit, offset) = page_bounds(page, limit);
        let window = offset + limit;

        let (live, history) = self
            .read_both("swaps", |store| {
                let query = query.clone();
                async move { store.swaps(&query, window).await }
            })
            .await?;
        let (live_total, history_total) = self
            .read_both("swap count", |store| {
                let query = query.clone();
                async move { store.count_swaps(&query).await }
            })
            .await?;

        // Raw counts, rows present in both stores are counted twice
        let total = live_total + history_total.unwrap_or(0);
        Ok(Page {
            data: merge_page(
                live,
                history.unwrap_or_default(),
                offset as usize,
                limit as usize,
                SwapEvent::dedup_key,
                |s| s.timestamp,
            ),
            total,
            total_pages: total_pages(total, limit),
            page,
        })
    }

    // ==================== TRANSFERS ====================

    pub async fn latest_transfers(
        &self,
        page: i64,
        limit: i64,
        symbol: Option<&str>,
    ) -> Result<Page<TransferEvent>> {
        let query = TransferQuery {
            symbol: symbol.map(str::to_string),
            ..Default::default()
        };
        self.transfer_page(query, page, limit).await
    }

    pub async fn address_transfers(
        &self,
        address: &str,
        page: i64,
        limit: i64,
    ) -> Result<Page<TransferEvent>> {
        let query = TransferQuery {
            address: Some(address.to_string()),
            ..Default::default()
        };
        self.transfer_page(query, page, limit).await
    }

    async fn transfer_page(
        &self,
        query: TransferQuery,
        page: i64,
        limit: i64,
    ) -> Result<Page<TransferEvent>> {
        let (page, limit, offset) = page_bounds(page, limit);
        let window = offset + limit;

        let (live, history) = self
            .read_both("transfers", |store| {
                let query = query.clone();
                async move { store.transfers(&query, window).await }
            })
            .await?;
        let (live_total, history_total) = self
            .read_both("transfer count", |store| {
                let query = query.clone();
                async move { store.count_transfers(&query).await }
            })
            .await?;

        // Raw counts, rows present in both stores are counted twice
        let total = live_total + history_total.unwrap_or(0);
        Ok(Page {
            data: merge_page(
                live,
                history.unwrap_or_default(),
                offset as usize,
                limit as usize,
                TransferEvent::dedup_key,
                |t| t.timestamp,
            ),
            total,
            total_pages: total_pages(total, limit),
            page,
        })
    }

    // ==================== BRIDGES ====================

    pub async fn latest_bridges(
        &self,
        page: i64,
        limit: i64,
        network: Option<&str>,
    ) -> Result<Page<BridgeEvent>> {
        let query = BridgeQuery {
            network: network.map(str::to_string),
            ..Default::default()
        };
        self.bridge_page(query, page, limit).await
    }

    pub async fn wallet_bridges(
        &self,
        address: &str,
        page: i64,
        limit: i64,
    ) -> Result<Page<BridgeEvent>> {
        let query = BridgeQuery {
            address: Some(address.to_string()),
            ..Default::default()
        };
        self.bridge_page(query, page, limit).await
    }

    async fn bridge_page(
        &self,
        query: BridgeQuery,
        page: i64,
        limit: i64,
    ) -> Result<Page<BridgeEvent>> {
        let (page, limit, offset) = page_bounds(page, limit);
        let window = offset + limit;

        let (live, history) = self
            .read_both("bridges", |store| {
                let query = query.clone();
                async move { store.bridges(&query, window).await }
            })
            .await?;
        let (live_total, history_total) = self
            .read_both("bridge count", |store| {
                let query = query.clone();
                async move { store.count_bridges(&query).await }
            })
            .await?;

        // Raw counts, rows present in both stores are counted twice
        let total = live_total + history_total.unwrap_or(0);
        Ok(Page {
            data: merge_page(
                live,
                history.unwrap_or_default(),
                offset as usize,
                limit as usize,
                BridgeEvent::dedup_key,
                |b| b.timestamp,
            ),
            total,
            total_pages: total_pages(total, limit),
            page,
        })
    }

    // ==================== LIQUIDITY ====================

    pub async fn pool_activity(
        &self,
        base: &str,
        target: &str,
        limit: i64,
    ) -> Result<Vec<LiquidityEvent>> {
        let limit = limit.max(1);
        let (live, history) = self
            .read_both("pool activity", |store| {
                let (base, target) = (base.to_string(), target.to_string());
                async move { store.pool_activity(&base, &target, limit).await }
            })
            .await?;

        Ok(merge_page(
            live,
            history.unwrap_or_default(),
            0,
            limit as usize,
            LiquidityEvent::dedup_key,
            |l| l.timestamp,
        ))
    }

    // ==================== AGGREGATES ====================

    /// Fee totals per kind since `since` (unix ms), summed over both stores.
    pub async fn fee_summary(&self, since: i64) -> Result<Vec<FeeSummary>> {
        let (live, history) = self
            .read_both("fee summary", |store| async move { store.fee_summary(since).await })
            .await?;

        let mut totals: FxHashMap<_, FeeSummary> = FxHashMap::default();
        for summary in live.into_iter().chain(history.unwrap_or_default()) {
            totals
                .entry(summary.kind)
                .and_modify(|t| {
                    t.count += summary.count;
                    t.total_amount += summary.total_amount;
                    t.total_usd += summary.total_usd;
                })
                .or_insert(summary);
        }

        let mut result: Vec<FeeSummary> = totals.into_values().collect();
        result.sort_by_key(|s| s.kind.as_str());
        Ok(result)
    }

    pub async fn activity_counts(&self, since: Option<i64>) -> Result<ActivityCounts> {
        let swaps = SwapQuery { since, ..Default::default() };
        let transfers = TransferQuery { since, ..Default::default() };
        let bridges = BridgeQuery { since, ..Default::default() };

        let (live, history) = self
            .read_both("activity counts", |store| {
                let (swaps, transfers, bridges) = (swaps.clone(), transfers.clone(), bridges.clone());
                async move {
                    Ok(ActivityCounts {
                        swaps: store.count_swaps(&swaps).await?,
                        transfers: store.count_transfers(&transfers).await?,
                        bridges: store.count_bridges(&bridges).await?,
                    })
                }
            })
            .await?;

        let history = history.unwrap_or_default();
        Ok(ActivityCounts {
            swaps: live.swaps + history.swaps,
            transfers: live.transfers + history.transfers,
            bridges: live.bridges + history.bridges,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::{FeeEvent, FeeKind};
    use crate::testing::{sample_swap, sample_transfer, MemoryStore};

    fn repository(live: &Arc<MemoryStore>, history: Option<&Arc<MemoryStore>>) -> FederatedRepository {
        FederatedRepository::new(
            live.clone() as Arc<dyn EventStore>,
            history.map(|h| h.clone() as Arc<dyn EventStore>),
        )
    }

    #[tokio::test]
    async fn test_identical_record_in_both_stores_appears_once() {
        let live = Arc::new(MemoryStore::default());
        let history = Arc::new(MemoryStore::default());

        let swap = sample_swap(100, 1_000);
        live.insert_swap(&swap).await.unwrap();
        // Same occurrence, ingested by backfill with a different timestamp and separators
        let mut backfilled = swap.clone();
        backfilled.timestamp = 900;
        backfilled.in_amount = "1,000.0000".to_string();
        history.insert_swap(&backfilled).await.unwrap();

        let page = repository(&live, Some(&history)).latest_swaps(1, 20, None).await.unwrap();
        assert_eq!(page.data.len(), 1);
        assert_eq!(page.data[0].timestamp, 1_000);
        // The total is not deduplicated
        assert_eq!(page.total, 2);
    }

    #[tokio::test]
    async fn test_union_orders_newest_first_and_paginates() {
        let live = Arc::new(MemoryStore::default());
        let history = Arc::new(MemoryStore::default());

        for block in 0..5 {
            live.insert_transfer(&sample_transfer(100 + block, 10_000 + block)).await.unwrap();
            history.insert_transfer(&sample_transfer(block, block)).await.unwrap();
        }

        let repo = repository(&live, Some(&history));
        let first = repo.latest_transfers(1, 4, None).await.unwrap();
        let blocks: Vec<i64> = first.data.iter().map(|t| t.block).collect();
        assert_eq!(blocks, vec![104, 103, 102, 101]);
        assert_eq!(first.total, 10);
        assert_eq!(first.total_pages, 3);

        let second = repo.latest_transfers(2, 4, None).await.unwrap();
        let blocks: Vec<i64> = second.data.iter().map(|t| t.block).collect();
        assert_eq!(blocks, vec![100, 4, 3, 2]);
    }

    #[tokio::test]
    async fn test_missing_history_store_serves_live_only() {
        let live = Arc::new(MemoryStore::default());
        live.insert_swap(&sample_swap(7, 7)).await.unwrap();

        let page = repository(&live, None).latest_swaps(1, 10, None).await.unwrap();
        assert_eq!(page.data.len(), 1);
        assert_eq!(page.total, 1);
    }

    #[tokio::test]
    async fn test_failing_history_store_degrades_to_live() {
        let live = Arc::new(MemoryStore::default());
        let history = Arc::new(MemoryStore::failing());
        live.insert_transfer(&sample_transfer(1, 1)).await.unwrap();

        let repo = repository(&live, Some(&history));
        let page = repo.address_transfers("cnAlice", 1, 10).await.unwrap();
        assert_eq!(page.data.len(), 1);

        let counts = repo.activity_counts(None).await.unwrap();
        assert_eq!(counts.transfers, 1);
    }

    #[tokio::test]
    async fn test_fee_summary_sums_both_stores() {
        let live = Arc::new(MemoryStore::default());
        let history = Arc::new(MemoryStore::default());
        let fee = |block, usd| FeeEvent {
            timestamp: 50,
            block,
            kind: FeeKind::Swap,
            amount: "0.0070".to_string(),
            usd_value: usd,
        };
        live.insert_fee(&fee(1, 1.5)).await.unwrap();
        history.insert_fee(&fee(2, 0.5)).await.unwrap();

        let summary = repository(&live, Some(&history)).fee_summary(0).await.unwrap();
        assert_eq!(summary.len(), 1);
        assert_eq!(summary[0].count, 2);
        assert!((summary[0].total_usd - 2.0).abs() < 1e-9);
    }
}
