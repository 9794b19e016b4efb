//! Outbound batch channels for downstream consumers.
//!
//! The live pipeline hands capped batches of transfers and swaps to a
//! [`BatchSink`]: Redpanda when configured, the log otherwise.

use anyhow::Result;
use async_trait::async_trait;
use log::info;

use crate::db::models::{SwapEvent, TransferEvent};

mod redpanda;

pub use redpanda::RedpandaPublisher;

#[async_trait]
pub trait BatchSink: Send + Sync {
    async fn emit_transfers(&self, batch: &[TransferEvent]) -> Result<()>;
    async fn emit_swaps(&self, batch: &[SwapEvent]) -> Result<()>;
}

/// Sink used when no broker is configured.
pub struct LogSink;

#[async_trait]
impl BatchSink for LogSink {
    async fn emit_transfers(&self, batch: &[TransferEvent]) -> Result<()> {
        info!("transfers-batch: {} transfers", batch.len());
        Ok(())
    }

    async fn emit_swaps(&self, batch: &[SwapEvent]) -> Result<()> {
        let volume: f64 = batch.iter().map(|s| s.in_usd).sum();
        info!("swaps-batch: {} swaps, ${:.2} volume", batch.len(), volume);
        Ok(())
    }
}
