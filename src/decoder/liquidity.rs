use anyhow::{Context, Result};
use bigdecimal::Zero;
use num_bigint::BigInt;
use rustc_hash::FxHashSet;

use crate::chain::{RawEvent, RawExtrinsic};
use crate::db::models::{LiquidityEvent, LiquidityKind};
use crate::decoder::classifier::{BlockContext, Classifier};
use crate::decoder::value;
use crate::utils::{decimal_to_f64, format_amount, normalize_amount};

const POOL_PALLET: &str = "poolXYK";

/// A pool operation before pricing.
struct PoolLeg {
    wallet: String,
    base_id: String,
    target_id: String,
    base_amount: BigInt,
    target_amount: BigInt,
    kind: LiquidityKind,
    index: Option<u32>,
}

impl Classifier {
    // ==================== LIQUIDITY ====================

    pub(super) async fn liquidity(&self, ctx: &BlockContext<'_>) -> Vec<LiquidityEvent> {
        let mut records = Vec::new();
        let mut claimed = FxHashSet::default();

        for ext in ctx.index.extrinsics() {
            let kind = if ext.is(POOL_PALLET, "depositLiquidity") {
                LiquidityKind::Deposit
            } else if ext.is(POOL_PALLET, "withdrawLiquidity") {
                LiquidityKind::Withdraw
            } else {
                continue;
            };
            if !ctx.index.succeeded(ext.index) {
                continue;
            }

            let decoded = match self.decode_pool_call(ctx, ext, kind) {
                Ok(Some(leg)) => {
                    claimed.insert(ext.index);
                    Ok(Some(self.priced_pool_leg(ctx, leg).await))
                },
                other => other.map(|_| None),
            };
            self.keep(ctx, "liquidity call", decoded, &mut records);
        }

        for event in ctx.index.events() {
            let kind = if event.is(POOL_PALLET, "LiquidityDeposited") {
                LiquidityKind::Deposit
            } else if event.is(POOL_PALLET, "LiquidityWithdrawn") {
                LiquidityKind::Withdraw
            } else {
                continue;
            };
            if event.extrinsic_index().is_some_and(|i| claimed.contains(&i)) {
                continue;
            }

            let decoded = match decode_pool_event(event, kind) {
                Ok(Some(leg)) => Ok(Some(self.priced_pool_leg(ctx, leg).await)),
                other => other.map(|_| None),
            };
            self.keep(ctx, "liquidity event", decoded, &mut records);
        }

        records
    }

    /// `depositLiquidity(dex, asset_a, asset_b, ...)` / `withdrawLiquidity(dex, asset_a, asset_b, ...)`.
    ///
    /// The call only declares bounds; the amounts actually moved are read
    /// back from the transfers the extrinsic emitted.
    fn decode_pool_call(
        &self,
        ctx: &BlockContext<'_>,
        ext: &RawExtrinsic,
        kind: LiquidityKind,
    ) -> Result<Option<PoolLeg>> {
        let args = &ext.args;
        let base_id = value::field(args, 1, &["input_asset_a", "output_asset_a", "inputAssetA", "outputAssetA"])
            .and_then(value::asset_id)
            .context("missing base asset")?;
        let target_id = value::field(args, 2, &["input_asset_b", "output_asset_b", "inputAssetB", "outputAssetB"])
            .and_then(value::asset_id)
            .context("missing target asset")?;
        let wallet = ext.signer.clone().context("unsigned liquidity call")?;

        let mut base_amount = BigInt::zero();
        let mut target_amount = BigInt::zero();
        let mut native_amount = None;

        for event in ctx.index.events_in(ext.index) {
            if event.is("tokens", "Transfer") {
                let currency = value::field(&event.data, 0, &["currency_id", "currencyId"]).and_then(value::asset_id);
                let amount = value::field(&event.data, 3, &["amount"]).and_then(value::balance);
                if let (Some(currency), Some(amount)) = (currency, amount) {
                    if currency == base_id {
                        base_amount = amount.clone();
                    }
                    if currency == target_id {
                        target_amount = amount;
                    }
                }
            } else if event.is("balances", "Transfer") && native_amount.is_none() {
                native_amount = value::field(&event.data, 2, &["amount", "value"]).and_then(value::balance);
            }
        }

        // The native leg moves through `balances`, not `tokens`
        if let Some(native) = native_amount {
            if self.is_native(&base_id) {
                base_amount = native;
            } else if self.is_native(&target_id) {
                target_amount = native;
            }
        }

        if base_amount.is_zero() && target_amount.is_zero() {
            return Ok(None);
        }

        Ok(Some(PoolLeg {
            wallet,
            base_id,
            target_id,
            base_amount,
            target_amount,
            kind,
            index: Some(ext.index),
        }))
    }

    async fn priced_pool_leg(&self, ctx: &BlockContext<'_>, leg: PoolLeg) -> LiquidityEvent {
        let base = self.assets.resolve(&leg.base_id);
        let target = self.assets.resolve(&leg.target_id);
        let base_amount = normalize_amount(&leg.base_amount, base.decimals);
        let target_amount = normalize_amount(&leg.target_amount, target.decimals);

        let (base_price, target_price) = tokio::join!(self.price(ctx, &base), self.price(ctx, &target));
        let usd = &base_amount * &base_price + &target_amount * &target_price;

        LiquidityEvent {
            timestamp: ctx.timestamp,
            block: ctx.block(),
            wallet: leg.wallet,
            pool_base: Self::label(&base),
            pool_target: Self::label(&target),
            base_amount: format_amount(&base_amount),
            target_amount: format_amount(&target_amount),
            usd_value: decimal_to_f64(&usd),
            kind: leg.kind,
            hash: ctx.index.extrinsic_hash(leg.index),
            extrinsic_id: ctx.index.extrinsic_id(leg.index),
        }
    }
}

/// `LiquidityDeposited` / `LiquidityWithdrawn`: [wallet, dex, base, target, base_amount, target_amount].
fn decode_pool_event(event: &RawEvent, kind: LiquidityKind) -> Result<Option<PoolLeg>> {
    let data = &event.data;
    let wallet = value::field(data, 0, &["who", "account_id"])
        .and_then(value::account)
        .context("missing wallet")?;
    let base_id = value::field(data, 2, &["base_asset_id", "baseAssetId"])
        .and_then(value::asset_id)
        .context("missing base asset")?;
    let target_id = value::field(data, 3, &["target_asset_id", "targetAssetId"])
        .and_then(value::asset_id)
        .context("missing target asset")?;
    let base_amount = value::field(data, 4, &["base_amount", "baseAmount"])
        .and_then(value::balance)
        .context("missing base amount")?;
    let target_amount = value::field(data, 5, &["target_amount", "targetAmount"])
        .and_then(value::balance)
        .context("missing target amount")?;

    Ok(Some(PoolLeg {
        wallet,
        base_id,
        target_id,
        base_amount,
        target_amount,
        kind,
        index: event.extrinsic_index(),
    }))
}
