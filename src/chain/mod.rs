//! Chain access layer.
//!
//! The decoder and the price oracle only ever talk to [`ChainClient`]; the
//! Sidecar REST client is one implementation, test fakes are another.

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

pub mod eth_sender;
pub mod sidecar;

pub use eth_sender::{EthSenderResolver, NoopSenderResolver, SenderResolver};
pub use sidecar::SidecarClient;

/// A block height together with its hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockHeader {
    pub number: u64,
    pub hash: String,
}

/// Where in the block an event was emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    ApplyExtrinsic(u32),
    Initialization,
    Finalization,
}

/// A decoded runtime event. `data` keeps whatever shape the node returned
/// (positional array or named object); the decoder normalizes it.
#[derive(Debug, Clone)]
pub struct RawEvent {
    pub pallet: String,
    pub method: String,
    pub phase: Phase,
    pub data: Value,
}

impl RawEvent {
    pub fn is(&self, pallet: &str, method: &str) -> bool {
        self.pallet.eq_ignore_ascii_case(pallet) && self.method == method
    }

    pub fn extrinsic_index(&self) -> Option<u32> {
        match self.phase {
            Phase::ApplyExtrinsic(index) => Some(index),
            _ => None,
        }
    }
}

/// A decoded extrinsic with its position in the block.
#[derive(Debug, Clone)]
pub struct RawExtrinsic {
    pub index: u32,
    pub hash: String,
    pub pallet: String,
    pub method: String,
    pub signer: Option<String>,
    pub args: Value,
}

impl RawExtrinsic {
    pub fn is(&self, pallet: &str, method: &str) -> bool {
        self.pallet.eq_ignore_ascii_case(pallet) && self.method == method
    }
}

#[derive(Debug, Clone)]
pub struct RawBlock {
    pub number: u64,
    pub hash: String,
    /// Taken from the `timestamp.set` inherent when present
    pub timestamp_ms: Option<i64>,
    pub extrinsics: Vec<RawExtrinsic>,
}

/// Point-in-time access to a Substrate chain.
#[async_trait]
pub trait ChainClient: Send + Sync {
    async fn get_block_hash(&self, height: u64) -> Result<String>;

    async fn get_block(&self, hash: &str) -> Result<RawBlock>;

    async fn get_events_at(&self, hash: &str) -> Result<Vec<RawEvent>>;

    /// Read a storage item at `hash`. `Ok(None)` means the entry is empty.
    async fn get_storage_at(
        &self,
        hash: &str,
        pallet: &str,
        item: &str,
        keys: &[String],
    ) -> Result<Option<Value>>;

    /// Latest finalized header.
    async fn get_header(&self) -> Result<BlockHeader>;

    /// Stream of new finalized headers in increasing height order.
    /// The stream ends when `cancellation_token` fires.
    async fn subscribe_new_heads(
        &self,
        cancellation_token: CancellationToken,
    ) -> Result<mpsc::Receiver<BlockHeader>>;
}
