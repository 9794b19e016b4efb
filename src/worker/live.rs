use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use log::{debug, error, info, warn};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::chain::{BlockHeader, ChainClient};
use crate::db::store::{persist_records, EventStore};
use crate::decoder::Classifier;
use crate::pubsub::BatchSink;
use crate::worker::outbox::Outbox;

/// Decodes every new finalized block as soon as its header arrives.
///
/// Records are written to the live store immediately; transfers and swaps
/// are also queued for the batch emitter, which runs on its own timer.
pub struct LivePipeline {
    chain: Arc<dyn ChainClient>,
    classifier: Arc<Classifier>,
    store: Arc<dyn EventStore>,
    outbox: Arc<Outbox>,
}

impl LivePipeline {
    pub fn new(
        chain: Arc<dyn ChainClient>,
        classifier: Arc<Classifier>,
        store: Arc<dyn EventStore>,
        outbox: Arc<Outbox>,
    ) -> Self {
        Self {
            chain,
            classifier,
            store,
            outbox,
        }
    }

    pub async fn run(&self, cancellation_token: CancellationToken) -> Result<()> {
        let mut heads = self
            .chain
            .subscribe_new_heads(cancellation_token.child_token())
            .await?;
        info!("Live pipeline subscribed to new heads");

        loop {
            let header = tokio::select! {
                _ = cancellation_token.cancelled() => {
                    info!("Live pipeline received cancellation signal");
                    break;
                }
                header = heads.recv() => match header {
                    Some(header) => header,
                    None => {
                        warn!("Head subscription closed");
                        break;
                    }
                },
            };

            if let Err(e) = self.process_head(&header).await {
                error!("Failed to process live block #{}: {:#}", header.number, e);
            }
        }

        Ok(())
    }

    /// Decode, persist and queue one block. Returns the number of records written.
    pub async fn process_head(&self, header: &BlockHeader) -> Result<usize> {
        let (block, events) = tokio::try_join!(
            self.chain.get_block(&header.hash),
            self.chain.get_events_at(&header.hash)
        )?;

        let records = self.classifier.classify(&block, &events).await;
        let written = persist_records(self.store.as_ref(), &records).await;

        if !records.is_empty() {
            debug!(
                "Block #{}: {} swaps, {} transfers, {} bridges, {} liquidity, {} fees",
                header.number,
                records.swaps.len(),
                records.transfers.len(),
                records.bridges.len(),
                records.liquidity.len(),
                records.fees.len()
            );
        }

        self.outbox.transfers.extend(records.transfers);
        self.outbox.swaps.extend(records.swaps);

        Ok(written)
    }
}

/// Drain both queues every `interval`, at most `max_batch` items each.
pub async fn run_emitter(
    outbox: Arc<Outbox>,
    sink: Arc<dyn BatchSink>,
    interval: Duration,
    max_batch: usize,
    cancellation_token: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately
    ticker.tick().await;

    info!("Batch emitter started (every {:?}, max {} per batch)", interval, max_batch);

    loop {
        tokio::select! {
            _ = cancellation_token.cancelled() => {
                info!("Batch emitter shutting down");
                break;
            }
            _ = ticker.tick() => {}
        }

        emit_once(&outbox, sink.as_ref(), max_batch).await;
    }
}

/// One emitter tick. A failed emit drops that batch, delivery is best effort.
pub async fn emit_once(outbox: &Outbox, sink: &dyn BatchSink, max_batch: usize) -> (usize, usize) {
    let transfers = outbox.transfers.drain(max_batch);
    if !transfers.is_empty() {
        if let Err(e) = sink.emit_transfers(&transfers).await {
            error!("Failed to emit {} transfers: {:#}", transfers.len(), e);
        }
    }

    let swaps = outbox.swaps.drain(max_batch);
    if !swaps.is_empty() {
        if let Err(e) = sink.emit_swaps(&swaps).await {
            error!("Failed to emit {} swaps: {:#}", swaps.len(), e);
        }
    }

    (transfers.len(), swaps.len())
}
