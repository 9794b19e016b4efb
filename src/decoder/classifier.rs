use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use bigdecimal::{BigDecimal, Zero};
use chrono::Utc;
use log::{debug, warn};
use num_bigint::BigInt;

use crate::chain::{ChainClient, RawBlock, RawEvent, SenderResolver};
use crate::db::models::{
    AssetMetadata, BlockRecords, FeeEvent, FeeKind, SwapEvent, TransferEvent,
};
use crate::decoder::block_index::BlockIndex;
use crate::decoder::value;
use crate::oracle::PriceOracle;
use crate::utils::{decimal_to_f64, format_amount, normalize_amount};
use crate::worker::AssetRegistry;

/// Decimals of the native gas asset
pub(super) const NATIVE_DECIMALS: u8 = 18;

/// Per-block decoding state shared by the extraction rules.
pub(super) struct BlockContext<'a> {
    pub index: BlockIndex<'a>,
    pub timestamp: i64,
}

impl BlockContext<'_> {
    pub fn block(&self) -> i64 {
        self.index.number() as i64
    }
}

/// Turns a block's extrinsics and events into priced domain records.
///
/// Decoding is total: a record that cannot be decoded is logged and
/// skipped, it never fails the block. Records of different kinds are
/// extracted concurrently since they only share the price cache.
pub struct Classifier {
    pub(super) assets: Arc<AssetRegistry>,
    pub(super) oracle: Arc<PriceOracle>,
    pub(super) chain: Arc<dyn ChainClient>,
    pub(super) senders: Arc<dyn SenderResolver>,
    pub(super) technical_prefix: String,
    pub(super) native_asset: String,
    pub(super) rpc_timeout: Duration,
}

impl Classifier {
    pub fn new(
        assets: Arc<AssetRegistry>,
        oracle: Arc<PriceOracle>,
        chain: Arc<dyn ChainClient>,
        senders: Arc<dyn SenderResolver>,
        technical_prefix: String,
        rpc_timeout: Duration,
    ) -> Self {
        let native_asset = oracle.assets().bridge.clone();
        Self {
            assets,
            oracle,
            chain,
            senders,
            technical_prefix,
            native_asset,
            rpc_timeout,
        }
    }

    pub async fn classify(&self, block: &RawBlock, events: &[RawEvent]) -> BlockRecords {
        let ctx = BlockContext {
            index: BlockIndex::new(block, events),
            timestamp: block
                .timestamp_ms
                .unwrap_or_else(|| Utc::now().timestamp_millis()),
        };

        let (swaps, transfers, bridges, liquidity, fees) = tokio::join!(
            self.swaps(&ctx),
            self.transfers(&ctx),
            self.bridges(&ctx),
            self.liquidity(&ctx),
            self.fees(&ctx),
        );

        BlockRecords {
            swaps,
            transfers,
            bridges,
            liquidity,
            fees,
        }
    }

    /// Collect decoded records, logging the ones that failed to decode.
    pub(super) fn keep<T>(
        &self,
        ctx: &BlockContext<'_>,
        kind: &str,
        decoded: Result<Option<T>>,
        out: &mut Vec<T>,
    ) {
        match decoded {
            Ok(Some(record)) => out.push(record),
            Ok(None) => {},
            Err(e) => warn!("Skipping undecodable {} in #{}: {:#}", kind, ctx.block(), e),
        }
    }

    /// USD price at this block, zero when unknown.
    pub(super) async fn price(&self, ctx: &BlockContext<'_>, asset: &AssetMetadata) -> BigDecimal {
        self.oracle
            .price_in_anchor(&asset.asset_id, asset.decimals, ctx.index.hash())
            .await
    }

    pub(super) fn is_technical(&self, address: &str) -> bool {
        !self.technical_prefix.is_empty() && address.starts_with(&self.technical_prefix)
    }

    pub(super) fn is_native(&self, asset_id: &str) -> bool {
        asset_id == self.native_asset
    }

    /// Symbol for display columns; unknown assets keep their id.
    pub(super) fn label(asset: &AssetMetadata) -> String {
        if asset.is_unknown() {
            asset.asset_id.clone()
        } else {
            asset.symbol.clone()
        }
    }

    // ==================== SWAPS ====================

    async fn swaps(&self, ctx: &BlockContext<'_>) -> Vec<SwapEvent> {
        let mut swaps = Vec::new();
        for event in ctx.index.events_matching("liquidityProxy", "Exchange") {
            let decoded = self.decode_swap(ctx, event).await;
            self.keep(ctx, "swap", decoded, &mut swaps);
        }
        swaps
    }

    async fn decode_swap(&self, ctx: &BlockContext<'_>, event: &RawEvent) -> Result<Option<SwapEvent>> {
        let data = &event.data;
        let wallet = value::field(data, 0, &["who", "account_id"])
            .and_then(value::account)
            .context("missing wallet")?;
        let in_id = value::field(data, 2, &["input_asset_id", "inputAssetId"])
            .and_then(value::asset_id)
            .context("missing input asset")?;
        let out_id = value::field(data, 3, &["output_asset_id", "outputAssetId"])
            .and_then(value::asset_id)
            .context("missing output asset")?;
        let in_raw = value::field(data, 4, &["input_amount", "inputAmount"])
            .and_then(value::balance)
            .context("missing input amount")?;
        let out_raw = value::field(data, 5, &["output_amount", "outputAmount"])
            .and_then(value::balance)
            .context("missing output amount")?;

        let (Some(in_asset), Some(out_asset)) = (self.assets.get(&in_id), self.assets.get(&out_id)) else {
            debug!("Swap in #{} involves a non-whitelisted asset", ctx.block());
            return Ok(None);
        };

        let (in_price, out_price) =
            tokio::join!(self.price(ctx, in_asset), self.price(ctx, out_asset));

        // A half-priced swap would corrupt volume totals
        if in_price.is_zero() || out_price.is_zero() {
            debug!(
                "Swap {} -> {} in #{} has no price, dropped",
                in_asset.symbol, out_asset.symbol, ctx.block()
            );
            return Ok(None);
        }

        let in_amount = normalize_amount(&in_raw, in_asset.decimals);
        let out_amount = normalize_amount(&out_raw, out_asset.decimals);
        let index = event.extrinsic_index();

        Ok(Some(SwapEvent {
            timestamp: ctx.timestamp,
            block: ctx.block(),
            wallet,
            in_asset_id: in_asset.asset_id.clone(),
            in_symbol: in_asset.symbol.clone(),
            in_amount: format_amount(&in_amount),
            in_logo: in_asset.logo.clone(),
            in_usd: decimal_to_f64(&(&in_amount * &in_price)),
            out_asset_id: out_asset.asset_id.clone(),
            out_symbol: out_asset.symbol.clone(),
            out_amount: format_amount(&out_amount),
            out_logo: out_asset.logo.clone(),
            out_usd: decimal_to_f64(&(&out_amount * &out_price)),
            hash: ctx.index.extrinsic_hash(index),
            extrinsic_id: ctx.index.extrinsic_id(index),
        }))
    }

    // ==================== TRANSFERS ====================

    async fn transfers(&self, ctx: &BlockContext<'_>) -> Vec<TransferEvent> {
        let mut transfers = Vec::new();
        for event in ctx.index.events() {
            let decoded = if event.is("balances", "Transfer") {
                self.decode_native_transfer(ctx, event).await
            } else if event.is("tokens", "Transfer") {
                self.decode_asset_transfer(ctx, event).await
            } else {
                continue;
            };
            self.keep(ctx, "transfer", decoded, &mut transfers);
        }
        transfers
    }

    /// `balances.Transfer`: [from, to, amount], implicitly the native asset.
    async fn decode_native_transfer(
        &self,
        ctx: &BlockContext<'_>,
        event: &RawEvent,
    ) -> Result<Option<TransferEvent>> {
        let data = &event.data;
        let from = value::field(data, 0, &["from"]).and_then(value::account).context("missing sender")?;
        let to = value::field(data, 1, &["to"]).and_then(value::account).context("missing recipient")?;
        let amount = value::field(data, 2, &["amount", "value"])
            .and_then(value::balance)
            .context("missing amount")?;

        let asset = self.assets.resolve(&self.native_asset);
        self.build_transfer(ctx, event, from, to, &amount, asset).await
    }

    /// `tokens.Transfer`: [currency_id, from, to, amount].
    async fn decode_asset_transfer(
        &self,
        ctx: &BlockContext<'_>,
        event: &RawEvent,
    ) -> Result<Option<TransferEvent>> {
        let data = &event.data;
        let asset_id = value::field(data, 0, &["currency_id", "currencyId"])
            .and_then(value::asset_id)
            .context("missing currency id")?;
        let from = value::field(data, 1, &["from"]).and_then(value::account).context("missing sender")?;
        let to = value::field(data, 2, &["to"]).and_then(value::account).context("missing recipient")?;
        let amount = value::field(data, 3, &["amount"])
            .and_then(value::balance)
            .context("missing amount")?;

        let asset = self.assets.resolve(&asset_id);
        self.build_transfer(ctx, event, from, to, &amount, asset).await
    }

    async fn build_transfer(
        &self,
        ctx: &BlockContext<'_>,
        event: &RawEvent,
        from: String,
        to: String,
        raw_amount: &BigInt,
        asset: AssetMetadata,
    ) -> Result<Option<TransferEvent>> {
        if self.is_technical(&from) || self.is_technical(&to) {
            return Ok(None);
        }
        if raw_amount.is_zero() {
            return Ok(None);
        }

        let amount = normalize_amount(raw_amount, asset.decimals);
        let price = self.price(ctx, &asset).await;
        let index = event.extrinsic_index();

        Ok(Some(TransferEvent {
            timestamp: ctx.timestamp,
            block: ctx.block(),
            from,
            to,
            amount: format_amount(&amount),
            asset_id: asset.asset_id.clone(),
            symbol: asset.symbol.clone(),
            logo: asset.logo.clone(),
            usd_value: decimal_to_f64(&(&amount * &price)),
            hash: ctx.index.extrinsic_hash(index),
            extrinsic_id: ctx.index.extrinsic_id(index),
        }))
    }

    // ==================== FEES ====================

    async fn fees(&self, ctx: &BlockContext<'_>) -> Vec<FeeEvent> {
        let fee_events: Vec<&RawEvent> = ctx
            .index
            .events_matching("transactionPayment", "TransactionFeePaid")
            .collect();
        if fee_events.is_empty() {
            return Vec::new();
        }

        let native = self.assets.resolve(&self.native_asset);
        let native_price = self.price(ctx, &native).await;

        let mut fees = Vec::with_capacity(fee_events.len());
        for event in fee_events {
            let decoded = self.decode_fee(ctx, event, &native_price);
            self.keep(ctx, "fee", decoded, &mut fees);
        }
        fees
    }

    /// `transactionPayment.TransactionFeePaid`: [who, actual_fee, tip].
    fn decode_fee(
        &self,
        ctx: &BlockContext<'_>,
        event: &RawEvent,
        native_price: &BigDecimal,
    ) -> Result<Option<FeeEvent>> {
        let raw = value::field(&event.data, 1, &["actual_fee", "actualFee"])
            .and_then(value::balance)
            .context("missing fee amount")?;

        let amount = normalize_amount(&raw, NATIVE_DECIMALS);
        let kind = match event.extrinsic_index() {
            Some(index) => fee_kind(ctx.index.events_in(index)),
            None => FeeKind::Other,
        };

        Ok(Some(FeeEvent {
            timestamp: ctx.timestamp,
            block: ctx.block(),
            kind,
            amount: format_amount(&amount),
            usd_value: decimal_to_f64(&(&amount * native_price)),
        }))
    }
}

/// Classify a fee by what else its extrinsic emitted: Swap, then
/// Transfer, then Bridge, otherwise Other.
pub(super) fn fee_kind(events: &[&RawEvent]) -> FeeKind {
    if events.iter().any(|e| e.is("liquidityProxy", "Exchange")) {
        return FeeKind::Swap;
    }

    if events.iter().any(|e| is_transfer(e)) {
        return FeeKind::Transfer;
    }

    if events.iter().any(|e| e.pallet.to_lowercase().contains("bridge")) {
        return FeeKind::Bridge;
    }

    FeeKind::Other
}

fn is_transfer(event: &RawEvent) -> bool {
    matches!(event.pallet.to_lowercase().as_str(), "balances" | "tokens" | "assets")
        && event.method.contains("Transfer")
}
