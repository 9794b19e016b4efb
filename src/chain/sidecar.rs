use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use log::{info, warn};
use moka::future::Cache;
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use url::Url;

use super::{BlockHeader, ChainClient, Phase, RawBlock, RawEvent, RawExtrinsic};
use crate::config::ChainSettings;

/// Number of recently fetched block bodies kept in memory
const BLOCK_CACHE_CAPACITY: u64 = 256;

/// Block bodies are immutable, the TTL only bounds memory
const BLOCK_CACHE_TTL: Duration = Duration::from_secs(120);

/// Buffered headers between the poller and the live pipeline
const HEAD_CHANNEL_CAPACITY: usize = 64;

/// Chain client backed by Substrate API Sidecar.
///
/// A single `/blocks/{id}` response carries the hash, the extrinsics and
/// every event, so bodies are cached by hash: resolving a height, reading
/// the block and reading its events cost one request.
#[derive(Clone)]
pub struct SidecarClient {
    http: reqwest::Client,
    base_url: Url,
    blocks: Cache<String, Arc<SidecarBlock>>,
    head_poll_interval: Duration,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SidecarBlock {
    number: String,
    hash: String,
    #[serde(default)]
    on_initialize: EventList,
    #[serde(default)]
    extrinsics: Vec<SidecarExtrinsic>,
    #[serde(default)]
    on_finalize: EventList,
}

#[derive(Debug, Default, Deserialize)]
struct EventList {
    #[serde(default)]
    events: Vec<SidecarEvent>,
}

#[derive(Debug, Deserialize)]
struct MethodRef {
    pallet: String,
    method: String,
}

#[derive(Debug, Deserialize)]
struct SidecarEvent {
    method: MethodRef,
    #[serde(default)]
    data: Value,
}

#[derive(Debug, Deserialize)]
struct SidecarExtrinsic {
    method: MethodRef,
    #[serde(default)]
    signature: Option<SidecarSignature>,
    #[serde(default)]
    args: Value,
    #[serde(default)]
    hash: String,
    #[serde(default)]
    events: Vec<SidecarEvent>,
}

#[derive(Debug, Deserialize)]
struct SidecarSignature {
    signer: Value,
}

#[derive(Debug, Deserialize)]
struct StorageResponse {
    #[serde(default)]
    value: Value,
}

impl SidecarClient {
    pub fn new(settings: &ChainSettings) -> Result<Self> {
        let base_url = Url::parse(&settings.sidecar_url)
            .with_context(|| format!("Invalid sidecar URL: {}", settings.sidecar_url))?;

        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(settings.rpc_timeout_ms))
            .build()
            .context("Failed to build HTTP client")?;

        let blocks = Cache::builder()
            .max_capacity(BLOCK_CACHE_CAPACITY)
            .time_to_live(BLOCK_CACHE_TTL)
            .build();

        Ok(Self {
            http,
            base_url,
            blocks,
            head_poll_interval: Duration::from_millis(settings.head_poll_interval_ms),
        })
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(&self, url: Url) -> Result<T> {
        let response = self
            .http
            .get(url.clone())
            .send()
            .await
            .with_context(|| format!("Request to {} failed", url))?
            .error_for_status()
            .with_context(|| format!("Sidecar returned an error for {}", url))?;

        response
            .json::<T>()
            .await
            .with_context(|| format!("Failed to decode response from {}", url))
    }

    /// Fetch `/blocks/{id}` and cache the body under its hash.
    async fn fetch_block(&self, id: &str) -> Result<Arc<SidecarBlock>> {
        if let Some(block) = self.blocks.get(id).await {
            return Ok(block);
        }

        let mut url = self.base_url.join(&format!("blocks/{}", id))?;
        url.query_pairs_mut()
            .append_pair("eventDocs", "false")
            .append_pair("extrinsicDocs", "false");

        let block: Arc<SidecarBlock> = Arc::new(self.get_json(url).await?);
        self.blocks.insert(block.hash.clone(), block.clone()).await;
        Ok(block)
    }
}

#[async_trait]
impl ChainClient for SidecarClient {
    async fn get_block_hash(&self, height: u64) -> Result<String> {
        let block = self.fetch_block(&height.to_string()).await?;
        Ok(block.hash.clone())
    }

    async fn get_block(&self, hash: &str) -> Result<RawBlock> {
        let block = self.fetch_block(hash).await?;
        to_raw_block(&block)
    }

    async fn get_events_at(&self, hash: &str) -> Result<Vec<RawEvent>> {
        let block = self.fetch_block(hash).await?;
        Ok(flatten_events(&block))
    }

    async fn get_storage_at(
        &self,
        hash: &str,
        pallet: &str,
        item: &str,
        keys: &[String],
    ) -> Result<Option<Value>> {
        let mut url = self
            .base_url
            .join(&format!("pallets/{}/storage/{}", pallet, item))?;
        {
            let mut query = url.query_pairs_mut();
            for key in keys {
                query.append_pair("keys[]", key);
            }
            query.append_pair("at", hash);
        }

        let response: StorageResponse = self.get_json(url).await?;
        Ok(match response.value {
            Value::Null => None,
            value => Some(value),
        })
    }

    async fn get_header(&self) -> Result<BlockHeader> {
        let block = self.fetch_block("head").await?;
        Ok(BlockHeader {
            number: parse_number(&block.number)?,
            hash: block.hash.clone(),
        })
    }

    async fn subscribe_new_heads(
        &self,
        cancellation_token: CancellationToken,
    ) -> Result<mpsc::Receiver<BlockHeader>> {
        let start = self.get_header().await?;
        let (tx, rx) = mpsc::channel(HEAD_CHANNEL_CAPACITY);
        let client = self.clone();

        info!("Subscribed to finalized heads from #{}", start.number);

        tokio::spawn(async move {
            let mut last_seen = start.number.saturating_sub(1);
            loop {
                match client.get_header().await {
                    Ok(head) => {
                        // Fill gaps so consumers see every height once, in order
                        for number in (last_seen + 1)..=head.number {
                            let header = if number == head.number {
                                head.clone()
                            } else {
                                match client.get_block_hash(number).await {
                                    Ok(hash) => BlockHeader { number, hash },
                                    Err(e) => {
                                        warn!("Failed to resolve hash for #{}: {:#}", number, e);
                                        break;
                                    },
                                }
                            };
                            if tx.send(header).await.is_err() {
                                return;
                            }
                            last_seen = number;
                        }
                    },
                    Err(e) => warn!("Head poll failed: {:#}", e),
                }

                tokio::select! {
                    _ = cancellation_token.cancelled() => {
                        info!("Head subscription stopped");
                        return;
                    }
                    _ = tokio::time::sleep(client.head_poll_interval) => {}
                }
            }
        });

        Ok(rx)
    }
}

fn parse_number(raw: &str) -> Result<u64> {
    raw.parse::<u64>()
        .with_context(|| format!("Invalid block number: {}", raw))
}

fn signer_address(signature: &Option<SidecarSignature>) -> Option<String> {
    let signer = &signature.as_ref()?.signer;
    match signer {
        Value::String(s) => Some(s.clone()),
        Value::Object(map) => map.get("id").and_then(Value::as_str).map(str::to_string),
        _ => None,
    }
}

fn timestamp_arg(extrinsic: &SidecarExtrinsic) -> Option<i64> {
    if extrinsic.method.pallet != "timestamp" || extrinsic.method.method != "set" {
        return None;
    }
    match extrinsic.args.get("now")? {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.replace(',', "").parse().ok(),
        _ => None,
    }
}

fn to_raw_block(block: &SidecarBlock) -> Result<RawBlock> {
    let extrinsics = block
        .extrinsics
        .iter()
        .enumerate()
        .map(|(i, ext)| RawExtrinsic {
            index: i as u32,
            hash: ext.hash.clone(),
            pallet: ext.method.pallet.clone(),
            method: ext.method.method.clone(),
            signer: signer_address(&ext.signature),
            args: ext.args.clone(),
        })
        .collect();

    Ok(RawBlock {
        number: parse_number(&block.number)?,
        hash: block.hash.clone(),
        timestamp_ms: block.extrinsics.iter().find_map(timestamp_arg),
        extrinsics,
    })
}

fn flatten_events(block: &SidecarBlock) -> Vec<RawEvent> {
    let convert = |event: &SidecarEvent, phase: Phase| RawEvent {
        pallet: event.method.pallet.clone(),
        method: event.method.method.clone(),
        phase,
        data: event.data.clone(),
    };

    let mut events: Vec<RawEvent> = block
        .on_initialize
        .events
        .iter()
        .map(|e| convert(e, Phase::Initialization))
        .collect();

    for (i, ext) in block.extrinsics.iter().enumerate() {
        events.extend(
            ext.events
                .iter()
                .map(|e| convert(e, Phase::ApplyExtrinsic(i as u32))),
        );
    }

    events.extend(
        block
            .on_finalize
            .events
            .iter()
            .map(|e| convert(e, Phase::Finalization)),
    );

    events
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_block() -> SidecarBlock {
        serde_json::from_value(json!({
            "number": "4100",
            "hash": "0xabc",
            "onInitialize": { "events": [] },
            "extrinsics": [
                {
                    "method": { "pallet": "timestamp", "method": "set" },
                    "signature": null,
                    "args": { "now": "1,700,000,000,000" },
                    "hash": "0x01",
                    "events": [
                        { "method": { "pallet": "system", "method": "ExtrinsicSuccess" }, "data": [] }
                    ]
                },
                {
                    "method": { "pallet": "balances", "method": "transfer" },
                    "signature": { "signature": "0xsig", "signer": { "id": "cnAlice" } },
                    "args": { "dest": "cnBob", "value": "100" },
                    "hash": "0x02",
                    "events": [
                        { "method": { "pallet": "balances", "method": "Transfer" }, "data": ["cnAlice", "cnBob", "100"] },
                        { "method": { "pallet": "system", "method": "ExtrinsicSuccess" }, "data": [] }
                    ]
                }
            ],
            "onFinalize": { "events": [ { "method": { "pallet": "rewards", "method": "Tick" }, "data": [] } ] }
        }))
        .unwrap()
    }

    #[test]
    fn test_block_conversion() {
        let block = to_raw_block(&sample_block()).unwrap();
        assert_eq!(block.number, 4100);
        assert_eq!(block.timestamp_ms, Some(1_700_000_000_000));
        assert_eq!(block.extrinsics.len(), 2);
        assert_eq!(block.extrinsics[1].signer.as_deref(), Some("cnAlice"));
        assert!(block.extrinsics[0].signer.is_none());
    }

    #[test]
    fn test_events_carry_extrinsic_phase() {
        let events = flatten_events(&sample_block());
        assert_eq!(events.len(), 4);
        assert_eq!(events[0].phase, Phase::ApplyExtrinsic(0));
        assert!(events[1].is("balances", "Transfer"));
        assert_eq!(events[1].extrinsic_index(), Some(1));
        assert_eq!(events[3].phase, Phase::Finalization);
    }
}
