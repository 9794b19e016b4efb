//! In-memory fakes shared by the unit tests.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use num_bigint::BigInt;
use rustc_hash::{FxHashMap, FxHashSet};
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::chain::{
    BlockHeader, ChainClient, NoopSenderResolver, Phase, RawBlock, RawEvent, RawExtrinsic,
    SenderResolver,
};
use crate::db::models::{
    AssetMetadata, BlockRecords, BridgeEvent, FeeEvent, FeeSummary, LiquidityEvent, SwapEvent,
    TransferEvent,
};
use crate::db::store::{BridgeQuery, EventStore, SwapQuery, TransferQuery};
use crate::decoder::Classifier;
use crate::oracle::{Clock, OracleAssets, PriceOracle};
use crate::pubsub::BatchSink;
use crate::worker::AssetRegistry;

pub const BRIDGE: &str = "0x0200000000000000000000000000000000000000000000000000000000000000";
pub const ANCHOR: &str = "0x0200060000000000000000000000000000000000000000000000000000000000";
pub const XSTUSD: &str = "0x0200080000000000000000000000000000000000000000000000000000000000";
pub const XST: &str = "0x0200090000000000000000000000000000000000000000000000000000000000";
/// A 6-decimals asset priced through the bridge asset
pub const TOKEN: &str = "0x0200050000000000000000000000000000000000000000000000000000000000";

/// `n` whole units as a raw fixed-point integer.
pub fn units(n: u64, decimals: u32) -> BigInt {
    BigInt::from(n) * BigInt::from(10u32).pow(decimals)
}

pub fn hash_for(height: u64) -> String {
    format!("0x{:064x}", height)
}

fn height_of(hash: &str) -> Result<u64> {
    u64::from_str_radix(hash.trim_start_matches("0x"), 16).map_err(|_| anyhow!("unknown hash {}", hash))
}

// ==================== CHAIN ====================

pub fn block_with(number: u64, extrinsics: Vec<RawExtrinsic>) -> RawBlock {
    RawBlock {
        number,
        hash: hash_for(number),
        timestamp_ms: Some(1_700_000_000_000 + number as i64 * 6_000),
        extrinsics,
    }
}

pub fn extrinsic(index: u32, pallet: &str, method: &str, signer: Option<&str>, args: Value) -> RawExtrinsic {
    RawExtrinsic {
        index,
        hash: format!("0x{:064x}", 0xe000_0000u64 + index as u64),
        pallet: pallet.to_string(),
        method: method.to_string(),
        signer: signer.map(str::to_string),
        args,
    }
}

pub fn event(index: u32, pallet: &str, method: &str, data: Value) -> RawEvent {
    RawEvent {
        pallet: pallet.to_string(),
        method: method.to_string(),
        phase: Phase::ApplyExtrinsic(index),
        data,
    }
}

/// A block holding one successful swap of 1000 bridge units for 2000 TOKEN.
pub fn swap_block(number: u64) -> (RawBlock, Vec<RawEvent>) {
    let block = block_with(
        number,
        vec![extrinsic(0, "liquidityProxy", "swap", Some("cnAlice"), json!([]))],
    );
    let events = vec![
        event(
            0,
            "liquidityProxy",
            "Exchange",
            json!(["cnAlice", 0, BRIDGE, TOKEN, units(1_000, 18).to_string(), units(2_000, 6).to_string()]),
        ),
        event(0, "system", "ExtrinsicSuccess", json!([])),
    ];
    (block, events)
}

/// Scripted chain. Storage ignores the block hash; blocks without a
/// script are empty.
#[derive(Default)]
pub struct MockChain {
    storage: Mutex<FxHashMap<String, Value>>,
    storage_reads: Mutex<FxHashSet<String>>,
    hung_storage: Mutex<FxHashSet<String>>,
    blocks: Mutex<FxHashMap<u64, (RawBlock, Vec<RawEvent>)>>,
    failing: Mutex<FxHashSet<u64>>,
    fetched: Mutex<Vec<u64>>,
    head: Mutex<u64>,
    new_heads: Mutex<Vec<u64>>,
}

impl MockChain {
    /// Bridge asset at 0.2 and TOKEN at 0.1.
    pub fn with_priced_token() -> Self {
        let chain = Self::default();
        chain.set_reserves(BRIDGE, ANCHOR, units(1_000, 18), units(200, 18));
        chain.set_reserves(BRIDGE, TOKEN, units(500, 18), units(1_000, 6));
        chain
    }

    pub fn oracle_assets() -> OracleAssets {
        OracleAssets {
            bridge: BRIDGE.to_string(),
            anchor: ANCHOR.to_string(),
            xst: XST.to_string(),
            xstusd: XSTUSD.to_string(),
        }
    }

    fn storage_key(pallet: &str, item: &str, keys: &[String]) -> String {
        format!("{}.{}({})", pallet, item, keys.join(","))
    }

    pub fn reserves_key(a: &str, b: &str) -> String {
        let mut keys = [a.to_string(), b.to_string()];
        keys.sort();
        Self::storage_key("poolXYK", "reserves", &keys)
    }

    /// Reserves of the (a, b) pool, stored in ascending id order.
    pub fn set_reserves(&self, a: &str, b: &str, reserve_a: BigInt, reserve_b: BigInt) {
        let pair = if a <= b {
            json!([reserve_a.to_string(), reserve_b.to_string()])
        } else {
            json!([reserve_b.to_string(), reserve_a.to_string()])
        };
        self.storage.lock().unwrap().insert(Self::reserves_key(a, b), pair);
    }

    pub fn set_storage(&self, pallet: &str, item: &str, keys: &[&str], value: Value) {
        let keys: Vec<String> = keys.iter().map(|k| k.to_string()).collect();
        self.storage
            .lock()
            .unwrap()
            .insert(Self::storage_key(pallet, item, &keys), value);
    }

    /// Reads of this item never answer.
    pub fn hang_storage(&self, pallet: &str, item: &str, keys: &[&str]) {
        let keys: Vec<String> = keys.iter().map(|k| k.to_string()).collect();
        self.hung_storage
            .lock()
            .unwrap()
            .insert(Self::storage_key(pallet, item, &keys));
    }

    pub fn hang_reserves(&self, a: &str, b: &str) {
        self.hung_storage.lock().unwrap().insert(Self::reserves_key(a, b));
    }

    pub fn storage_was_read(&self, key: &str) -> bool {
        self.storage_reads.lock().unwrap().contains(key)
    }

    pub fn set_block(&self, block: RawBlock, events: Vec<RawEvent>) {
        self.blocks.lock().unwrap().insert(block.number, (block, events));
    }

    pub fn fail_block(&self, height: u64) {
        self.failing.lock().unwrap().insert(height);
    }

    pub fn set_head(&self, height: u64) {
        *self.head.lock().unwrap() = height;
    }

    /// Headers delivered, in order, by the next subscription.
    pub fn push_heads(&self, heights: &[u64]) {
        self.new_heads.lock().unwrap().extend_from_slice(heights);
    }

    /// Heights whose bodies were fetched, in fetch order.
    pub fn fetched(&self) -> Vec<u64> {
        self.fetched.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChainClient for MockChain {
    async fn get_block_hash(&self, height: u64) -> Result<String> {
        Ok(hash_for(height))
    }

    async fn get_block(&self, hash: &str) -> Result<RawBlock> {
        let height = height_of(hash)?;
        self.fetched.lock().unwrap().push(height);
        if self.failing.lock().unwrap().contains(&height) {
            bail!("archive node refused block {}", height);
        }
        Ok(self
            .blocks
            .lock()
            .unwrap()
            .get(&height)
            .map(|(block, _)| block.clone())
            .unwrap_or_else(|| block_with(height, vec![])))
    }

    async fn get_events_at(&self, hash: &str) -> Result<Vec<RawEvent>> {
        let height = height_of(hash)?;
        Ok(self
            .blocks
            .lock()
            .unwrap()
            .get(&height)
            .map(|(_, events)| events.clone())
            .unwrap_or_default())
    }

    async fn get_storage_at(
        &self,
        _hash: &str,
        pallet: &str,
        item: &str,
        keys: &[String],
    ) -> Result<Option<Value>> {
        let key = Self::storage_key(pallet, item, keys);
        self.storage_reads.lock().unwrap().insert(key.clone());
        if self.hung_storage.lock().unwrap().contains(&key) {
            std::future::pending::<()>().await;
        }
        Ok(self.storage.lock().unwrap().get(&key).cloned())
    }

    async fn get_header(&self) -> Result<BlockHeader> {
        let number = *self.head.lock().unwrap();
        Ok(BlockHeader {
            number,
            hash: hash_for(number),
        })
    }

    async fn subscribe_new_heads(
        &self,
        _cancellation_token: CancellationToken,
    ) -> Result<mpsc::Receiver<BlockHeader>> {
        let heights: Vec<u64> = self.new_heads.lock().unwrap().drain(..).collect();
        let (tx, rx) = mpsc::channel(heights.len().max(1));
        for number in heights {
            tx.send(BlockHeader {
                number,
                hash: hash_for(number),
            })
            .await?;
        }
        Ok(rx)
    }
}

/// Resolver answering from a fixed table, or never answering at all.
pub struct StaticResolver {
    senders: FxHashMap<String, String>,
    hang: bool,
}

impl StaticResolver {
    pub fn new(entries: &[(&str, &str)]) -> Self {
        Self {
            senders: entries
                .iter()
                .map(|(hash, sender)| (hash.to_string(), sender.to_string()))
                .collect(),
            hang: false,
        }
    }

    /// Same table, but every lookup stalls forever.
    pub fn hanging(entries: &[(&str, &str)]) -> Self {
        Self {
            hang: true,
            ..Self::new(entries)
        }
    }
}

#[async_trait]
impl SenderResolver for StaticResolver {
    async fn resolve_sender_by_tx_hash(&self, tx_hash: &str) -> Option<String> {
        if self.hang {
            std::future::pending::<()>().await;
        }
        self.senders.get(tx_hash).cloned()
    }
}

// ==================== DECODER ====================

pub fn test_registry() -> AssetRegistry {
    AssetRegistry::from_assets(vec![
        AssetMetadata::new("XOR", "SORA", 18, BRIDGE),
        AssetMetadata::new("DAI", "Dai Stablecoin", 18, ANCHOR),
        AssetMetadata::new("TOK", "Test Token", 6, TOKEN),
        AssetMetadata::new("XST", "SORA Synthetics", 18, XST),
    ])
}

pub fn classifier(chain: Arc<MockChain>) -> Classifier {
    classifier_with_resolver(chain, Arc::new(NoopSenderResolver))
}

pub fn classifier_with_resolver(chain: Arc<MockChain>, senders: Arc<dyn SenderResolver>) -> Classifier {
    classifier_with_timeout(chain, senders, Duration::from_secs(1))
}

pub fn classifier_with_timeout(
    chain: Arc<MockChain>,
    senders: Arc<dyn SenderResolver>,
    timeout: Duration,
) -> Classifier {
    let oracle = PriceOracle::historical(chain.clone(), MockChain::oracle_assets(), timeout);
    Classifier::new(
        Arc::new(test_registry()),
        Arc::new(oracle),
        chain,
        senders,
        "cnTQ".to_string(),
        timeout,
    )
}

// ==================== CLOCK ====================

/// Clock that only moves when told to.
pub struct ManualClock {
    base: Instant,
    offset: Mutex<Duration>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            base: Instant::now(),
            offset: Mutex::new(Duration::ZERO),
        }
    }

    pub fn advance(&self, by: Duration) {
        *self.offset.lock().unwrap() += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.base + *self.offset.lock().unwrap()
    }
}

// ==================== STORES ====================

pub fn sample_swap(block: i64, timestamp: i64) -> SwapEvent {
    SwapEvent {
        timestamp,
        block,
        wallet: "cnAlice".to_string(),
        in_asset_id: BRIDGE.to_string(),
        in_symbol: "XOR".to_string(),
        in_amount: "1000.0000".to_string(),
        in_logo: String::new(),
        in_usd: 200.0,
        out_asset_id: TOKEN.to_string(),
        out_symbol: "TOK".to_string(),
        out_amount: "2000.0000".to_string(),
        out_logo: String::new(),
        out_usd: 200.0,
        hash: format!("0xswap{}", block),
        extrinsic_id: format!("{}-1", block),
    }
}

pub fn sample_transfer(block: i64, timestamp: i64) -> TransferEvent {
    TransferEvent {
        timestamp,
        block,
        from: "cnAlice".to_string(),
        to: "cnBob".to_string(),
        amount: "5.0000".to_string(),
        asset_id: BRIDGE.to_string(),
        symbol: "XOR".to_string(),
        logo: String::new(),
        usd_value: 1.0,
        hash: format!("0xtransfer{}", block),
        extrinsic_id: format!("{}-2", block),
    }
}

/// `EventStore` over plain vectors. A failing store errors on every call,
/// like a history database without the tables.
#[derive(Default)]
pub struct MemoryStore {
    failing: bool,
    records: Mutex<BlockRecords>,
}

impl MemoryStore {
    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Default::default()
        }
    }

    pub fn snapshot(&self) -> BlockRecords {
        self.records.lock().unwrap().clone()
    }

    fn check(&self) -> Result<()> {
        if self.failing {
            bail!("relation does not exist");
        }
        Ok(())
    }
}

fn newest_first<T: Clone>(rows: impl Iterator<Item = T>, timestamp: impl Fn(&T) -> i64, limit: i64) -> Vec<T> {
    let mut rows: Vec<T> = rows.collect();
    rows.sort_by_key(|row| std::cmp::Reverse(timestamp(row)));
    rows.truncate(limit.max(0) as usize);
    rows
}

fn swap_matches(swap: &SwapEvent, query: &SwapQuery) -> bool {
    query.wallet.as_ref().map_or(true, |w| &swap.wallet == w)
        && query
            .symbol
            .as_ref()
            .map_or(true, |s| &swap.in_symbol == s || &swap.out_symbol == s)
        && query.since.map_or(true, |since| swap.timestamp >= since)
}

fn transfer_matches(transfer: &TransferEvent, query: &TransferQuery) -> bool {
    query
        .address
        .as_ref()
        .map_or(true, |a| &transfer.from == a || &transfer.to == a)
        && query.symbol.as_ref().map_or(true, |s| &transfer.symbol == s)
        && query.since.map_or(true, |since| transfer.timestamp >= since)
}

fn bridge_matches(bridge: &BridgeEvent, query: &BridgeQuery) -> bool {
    query
        .address
        .as_ref()
        .map_or(true, |a| &bridge.sender == a || &bridge.recipient == a)
        && query.network.as_ref().map_or(true, |n| &bridge.network == n)
        && query.since.map_or(true, |since| bridge.timestamp >= since)
}

#[async_trait]
impl EventStore for MemoryStore {
    async fn insert_swap(&self, swap: &SwapEvent) -> Result<()> {
        self.check()?;
        self.records.lock().unwrap().swaps.push(swap.clone());
        Ok(())
    }

    async fn insert_transfer(&self, transfer: &TransferEvent) -> Result<()> {
        self.check()?;
        self.records.lock().unwrap().transfers.push(transfer.clone());
        Ok(())
    }

    async fn insert_bridge(&self, bridge: &BridgeEvent) -> Result<()> {
        self.check()?;
        self.records.lock().unwrap().bridges.push(bridge.clone());
        Ok(())
    }

    async fn insert_liquidity(&self, event: &LiquidityEvent) -> Result<()> {
        self.check()?;
        self.records.lock().unwrap().liquidity.push(event.clone());
        Ok(())
    }

    async fn insert_fee(&self, fee: &FeeEvent) -> Result<()> {
        self.check()?;
        self.records.lock().unwrap().fees.push(fee.clone());
        Ok(())
    }

    async fn block_is_indexed(&self, block: i64) -> Result<bool> {
        self.check()?;
        let records = self.records.lock().unwrap();
        Ok(records.swaps.iter().any(|r| r.block == block)
            || records.transfers.iter().any(|r| r.block == block)
            || records.bridges.iter().any(|r| r.block == block)
            || records.liquidity.iter().any(|r| r.block == block)
            || records.fees.iter().any(|r| r.block == block))
    }

    async fn swaps(&self, query: &SwapQuery, limit: i64) -> Result<Vec<SwapEvent>> {
        self.check()?;
        let records = self.records.lock().unwrap();
        let rows = records.swaps.iter().filter(|s| swap_matches(s, query)).cloned();
        Ok(newest_first(rows, |s| s.timestamp, limit))
    }

    async fn count_swaps(&self, query: &SwapQuery) -> Result<i64> {
        self.check()?;
        let records = self.records.lock().unwrap();
        Ok(records.swaps.iter().filter(|s| swap_matches(s, query)).count() as i64)
    }

    async fn transfers(&self, query: &TransferQuery, limit: i64) -> Result<Vec<TransferEvent>> {
        self.check()?;
        let records = self.records.lock().unwrap();
        let rows = records.transfers.iter().filter(|t| transfer_matches(t, query)).cloned();
        Ok(newest_first(rows, |t| t.timestamp, limit))
    }

    async fn count_transfers(&self, query: &TransferQuery) -> Result<i64> {
        self.check()?;
        let records = self.records.lock().unwrap();
        Ok(records.transfers.iter().filter(|t| transfer_matches(t, query)).count() as i64)
    }

    async fn bridges(&self, query: &BridgeQuery, limit: i64) -> Result<Vec<BridgeEvent>> {
        self.check()?;
        let records = self.records.lock().unwrap();
        let rows = records.bridges.iter().filter(|b| bridge_matches(b, query)).cloned();
        Ok(newest_first(rows, |b| b.timestamp, limit))
    }

    async fn count_bridges(&self, query: &BridgeQuery) -> Result<i64> {
        self.check()?;
        let records = self.records.lock().unwrap();
        Ok(records.bridges.iter().filter(|b| bridge_matches(b, query)).count() as i64)
    }

    async fn pool_activity(&self, base: &str, target: &str, limit: i64) -> Result<Vec<LiquidityEvent>> {
        self.check()?;
        let records = self.records.lock().unwrap();
        let rows = records
            .liquidity
            .iter()
            .filter(|l| l.pool_base == base && l.pool_target == target)
            .cloned();
        Ok(newest_first(rows, |l| l.timestamp, limit))
    }

    async fn fee_summary(&self, since: i64) -> Result<Vec<FeeSummary>> {
        self.check()?;
        let records = self.records.lock().unwrap();
        let mut totals: FxHashMap<_, FeeSummary> = FxHashMap::default();
        for fee in records.fees.iter().filter(|f| f.timestamp >= since) {
            let amount: f64 = fee.amount.parse().unwrap_or_default();
            let total = totals.entry(fee.kind).or_insert(FeeSummary {
                kind: fee.kind,
                count: 0,
                total_amount: 0.0,
                total_usd: 0.0,
            });
            total.count += 1;
            total.total_amount += amount;
            total.total_usd += fee.usd_value;
        }
        Ok(totals.into_values().collect())
    }

    async fn prune_before(&self, timestamp: i64) -> Result<u64> {
        self.check()?;
        let mut records = self.records.lock().unwrap();
        let before = records.len();
        records.swaps.retain(|r| r.timestamp >= timestamp);
        records.transfers.retain(|r| r.timestamp >= timestamp);
        records.bridges.retain(|r| r.timestamp >= timestamp);
        records.liquidity.retain(|r| r.timestamp >= timestamp);
        records.fees.retain(|r| r.timestamp >= timestamp);
        Ok((before - records.len()) as u64)
    }
}

// ==================== SINKS ====================

/// Batch sink that keeps every emitted batch.
#[derive(Default)]
pub struct RecordingSink {
    pub transfer_batches: Mutex<Vec<Vec<TransferEvent>>>,
    pub swap_batches: Mutex<Vec<Vec<SwapEvent>>>,
}

#[async_trait]
impl BatchSink for RecordingSink {
    async fn emit_transfers(&self, batch: &[TransferEvent]) -> Result<()> {
        self.transfer_batches.lock().unwrap().push(batch.to_vec());
        Ok(())
    }

    async fn emit_swaps(&self, batch: &[SwapEvent]) -> Result<()> {
        self.swap_batches.lock().unwrap().push(batch.to_vec());
        Ok(())
    }
}
