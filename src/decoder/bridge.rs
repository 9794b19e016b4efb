use anyhow::{anyhow, Context, Result};
use bigdecimal::Zero;
use log::debug;
use num_bigint::BigInt;
use rustc_hash::FxHashSet;
use serde_json::Value;

use crate::chain::{RawEvent, RawExtrinsic};
use crate::db::models::{BridgeDirection, BridgeEvent};
use crate::decoder::classifier::{BlockContext, Classifier};
use crate::decoder::value;
use crate::utils::{decimal_to_f64, format_amount, normalize_amount, EXTERNAL_EXTRINSIC_ID};

/// Pallet holding the Ethereum bridge calls and request storage
const ETH_BRIDGE_PALLET: &str = "ethBridge";
const OUTGOING_CALL: &str = "transferToSidechain";
const REQUESTS_ITEM: &str = "requests";
/// Network id of Ethereum in the bridge request storage key
const ETH_NETWORK_ID: &str = "0";
const EXTERNAL_SENDER: &str = "Ethereum";
const UNKNOWN_PARTY: &str = "Unknown";

/// Display name of the bridged network, inferred from the pallet name.
pub fn network_for(pallet: &str) -> &'static str {
    let pallet = pallet.to_lowercase();
    if pallet.contains("eth") {
        "Ethereum"
    } else if pallet.contains("sub") || pallet.contains("parachain") {
        "Polkadot/Kusama"
    } else if pallet.contains("ton") {
        "TON"
    } else if pallet.contains("proxy") {
        "Multi-Network"
    } else {
        "Unknown"
    }
}

fn is_bridge_pallet(pallet: &str) -> bool {
    pallet.to_lowercase().contains("bridge")
}

/// A decoded bridge leg before pricing.
struct BridgeLeg {
    network: String,
    direction: BridgeDirection,
    sender: String,
    recipient: String,
    asset_id: String,
    amount: BigInt,
    hash: String,
    extrinsic_id: String,
}

impl Classifier {
    // ==================== BRIDGES ====================

    pub(super) async fn bridges(&self, ctx: &BlockContext<'_>) -> Vec<BridgeEvent> {
        let mut bridges = Vec::new();

        // Extrinsic indices already recorded from the outgoing call. The
        // event scan below skips them on every bridge network.
        let mut claimed = FxHashSet::default();

        for ext in ctx.index.extrinsics() {
            if !ext.is(ETH_BRIDGE_PALLET, OUTGOING_CALL) || !ctx.index.succeeded(ext.index) {
                continue;
            }
            let decoded = match self.decode_outgoing_call(ctx, ext) {
                Ok(Some(leg)) => {
                    claimed.insert(ext.index);
                    Ok(Some(self.priced(ctx, leg).await))
                },
                other => other.map(|_| None),
            };
            self.keep(ctx, "outgoing bridge call", decoded, &mut bridges);
        }

        for event in ctx.index.events() {
            if !is_bridge_pallet(&event.pallet) {
                continue;
            }
            if event.extrinsic_index().is_some_and(|i| claimed.contains(&i)) {
                continue;
            }

            let leg = match event.method.as_str() {
                "TransferToSidechain" => self.decode_outgoing_event(ctx, event),
                "IncomingRequestFinalized" => self.decode_incoming_request(ctx, event).await,
                "CurrencyDepositedFromSidechain" | "SidechainCurrencyWithdrawn" => {
                    self.decode_legacy_event(ctx, event)
                },
                _ => continue,
            };
            let decoded = match leg {
                Ok(Some(leg)) => Ok(Some(self.priced(ctx, leg).await)),
                other => other.map(|_| None),
            };
            self.keep(ctx, "bridge event", decoded, &mut bridges);
        }

        bridges
    }

    async fn priced(&self, ctx: &BlockContext<'_>, leg: BridgeLeg) -> BridgeEvent {
        let asset = self.assets.resolve(&leg.asset_id);
        let amount = normalize_amount(&leg.amount, asset.decimals);
        let price = self.price(ctx, &asset).await;

        BridgeEvent {
            timestamp: ctx.timestamp,
            block: ctx.block(),
            network: leg.network,
            direction: leg.direction,
            sender: leg.sender,
            recipient: leg.recipient,
            asset_id: asset.asset_id.clone(),
            symbol: asset.symbol.clone(),
            logo: asset.logo.clone(),
            amount: format_amount(&amount),
            usd_value: decimal_to_f64(&(&amount * &price)),
            hash: leg.hash,
            extrinsic_id: leg.extrinsic_id,
        }
    }

    /// `ethBridge.transferToSidechain(asset_id, to, amount, network_id)`, with
    /// named or positional arguments.
    fn decode_outgoing_call(&self, ctx: &BlockContext<'_>, ext: &RawExtrinsic) -> Result<Option<BridgeLeg>> {
        let args = &ext.args;
        let asset_id = value::field(args, 0, &["asset_id", "assetId"])
            .and_then(value::asset_id)
            .context("missing asset id")?;
        let recipient = value::field(args, 1, &["to"])
            .and_then(value::account)
            .context("missing recipient")?;
        let amount = value::field(args, 2, &["amount"])
            .and_then(value::balance)
            .context("missing amount")?;

        if amount.is_zero() {
            return Ok(None);
        }

        Ok(Some(BridgeLeg {
            network: network_for(&ext.pallet).to_string(),
            direction: BridgeDirection::Outgoing,
            sender: ext.signer.clone().unwrap_or_else(|| UNKNOWN_PARTY.to_string()),
            recipient,
            asset_id,
            amount,
            hash: ext.hash.clone(),
            extrinsic_id: ctx.index.extrinsic_id(Some(ext.index)),
        }))
    }

    /// `TransferToSidechain`: [sender, recipient, amount, asset].
    fn decode_outgoing_event(&self, ctx: &BlockContext<'_>, event: &RawEvent) -> Result<Option<BridgeLeg>> {
        let data = &event.data;
        let index = event.extrinsic_index();
        let sender = value::field(data, 0, &["sender", "from"])
            .and_then(value::account)
            .or_else(|| ctx.index.signer(index))
            .unwrap_or_else(|| UNKNOWN_PARTY.to_string());
        let recipient = value::field(data, 1, &["recipient", "to"])
            .and_then(value::account)
            .context("missing recipient")?;
        let amount = value::field(data, 2, &["amount"])
            .and_then(value::balance)
            .context("missing amount")?;
        let asset_id = value::field(data, 3, &["asset_id", "assetId"])
            .and_then(value::asset_id)
            .context("missing asset id")?;

        if amount.is_zero() {
            return Ok(None);
        }

        Ok(Some(BridgeLeg {
            network: network_for(&event.pallet).to_string(),
            direction: BridgeDirection::Outgoing,
            sender,
            recipient,
            asset_id,
            amount,
            hash: ctx.index.extrinsic_hash(index),
            extrinsic_id: ctx.index.extrinsic_id(index),
        }))
    }

    /// Legacy `CurrencyDepositedFromSidechain` / `SidechainCurrencyWithdrawn`:
    /// [asset, recipient, amount].
    fn decode_legacy_event(&self, ctx: &BlockContext<'_>, event: &RawEvent) -> Result<Option<BridgeLeg>> {
        let data = &event.data;
        let index = event.extrinsic_index();
        let asset_id = value::field(data, 0, &["asset_id", "assetId"])
            .and_then(value::asset_id)
            .context("missing asset id")?;
        let recipient = value::field(data, 1, &["recipient", "to", "account_id"])
            .and_then(value::account)
            .context("missing recipient")?;
        let amount = value::field(data, 2, &["amount"])
            .and_then(value::balance)
            .context("missing amount")?;

        if amount.is_zero() {
            return Ok(None);
        }

        let network = network_for(&event.pallet);
        let (direction, sender) = if event.method == "CurrencyDepositedFromSidechain" {
            (BridgeDirection::Incoming, network.to_string())
        } else {
            (
                BridgeDirection::Outgoing,
                ctx.index.signer(index).unwrap_or_else(|| UNKNOWN_PARTY.to_string()),
            )
        };

        Ok(Some(BridgeLeg {
            network: network.to_string(),
            direction,
            sender,
            recipient,
            asset_id,
            amount,
            hash: ctx.index.extrinsic_hash(index),
            extrinsic_id: ctx.index.extrinsic_id(index),
        }))
    }

    /// `IncomingRequestFinalized(request_hash)`: the transfer itself lives in
    /// bridge request storage, the external sender behind the
    /// `RequestRegistered` event of the same extrinsic.
    async fn decode_incoming_request(
        &self,
        ctx: &BlockContext<'_>,
        event: &RawEvent,
    ) -> Result<Option<BridgeLeg>> {
        let request_hash = value::field(&event.data, 0, &["hash", "request_hash"])
            .and_then(value::h256)
            .context("missing request hash")?;

        let keys = [ETH_NETWORK_ID.to_string(), request_hash.clone()];
        let read = self
            .chain
            .get_storage_at(ctx.index.hash(), ETH_BRIDGE_PALLET, REQUESTS_ITEM, &keys);
        let request = tokio::time::timeout(self.rpc_timeout, read)
            .await
            .map_err(|_| anyhow!("request {} lookup timed out", request_hash))??
            .with_context(|| format!("request {} not in storage", request_hash))?;

        let transfer = incoming_transfer(&request)
            .with_context(|| format!("request {} carries no transfer", request_hash))?;

        let recipient = transfer
            .get("to")
            .and_then(value::account)
            .context("missing recipient")?;
        let asset_id = ["asset_id", "assetId"]
            .iter()
            .find_map(|key| transfer.get(*key))
            .and_then(value::asset_id)
            .context("missing asset id")?;
        let amount = transfer
            .get("amount")
            .and_then(value::balance)
            .context("missing amount")?;

        if amount.is_zero() {
            return Ok(None);
        }

        let resolved = match self.external_tx_hash(ctx, event, transfer) {
            Some(tx_hash) => self.resolve_sender(&tx_hash).await,
            None => None,
        };
        let sender = resolved
            .or_else(|| transfer.get("from").and_then(value::account))
            .unwrap_or_else(|| EXTERNAL_SENDER.to_string());

        Ok(Some(BridgeLeg {
            network: network_for(&event.pallet).to_string(),
            direction: BridgeDirection::Incoming,
            sender,
            recipient,
            asset_id,
            amount,
            hash: request_hash,
            extrinsic_id: EXTERNAL_EXTRINSIC_ID.to_string(),
        }))
    }

    /// External transaction hash from the sibling `RequestRegistered`
    /// event, falling back to the one recorded in the request.
    fn external_tx_hash(&self, ctx: &BlockContext<'_>, event: &RawEvent, transfer: &Value) -> Option<String> {
        event
            .extrinsic_index()
            .and_then(|index| {
                ctx.index
                    .events_in(index)
                    .iter()
                    .find(|e| is_bridge_pallet(&e.pallet) && e.method == "RequestRegistered")
            })
            .and_then(|registered| value::field(&registered.data, 0, &["hash"]))
            .and_then(value::h256)
            .or_else(|| {
                ["tx_hash", "txHash"]
                    .iter()
                    .find_map(|key| transfer.get(*key))
                    .and_then(value::h256)
            })
    }

    async fn resolve_sender(&self, tx_hash: &str) -> Option<String> {
        let lookup = self.senders.resolve_sender_by_tx_hash(tx_hash);
        match tokio::time::timeout(self.rpc_timeout, lookup).await {
            Ok(sender) => sender,
            Err(_) => {
                debug!("Sender lookup for {} timed out", tx_hash);
                None
            },
        }
    }
}

/// The transfer payload of a bridge request, in any of the shapes the
/// node returns: `[{transfer}]`, `{transfer}`, `{incoming: [{transfer}]}`
/// or a bare transfer object.
fn incoming_transfer(request: &Value) -> Option<&Value> {
    match request {
        Value::Array(items) => items.first().and_then(|first| first.get("transfer")),
        Value::Object(map) => {
            if let Some(transfer) = map.get("transfer") {
                Some(transfer)
            } else if let Some(incoming) = map.get("incoming") {
                incoming.get(0).and_then(|first| first.get("transfer"))
            } else if map.contains_key("to") && map.contains_key("amount") {
                Some(request)
            } else {
                None
            }
        },
        _ => None,
    }
}
