use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use log::{error, info};
use tokio_util::sync::CancellationToken;

use crate::chain::ChainClient;
use crate::config::BackfillSettings;
use crate::db::models::Checkpoint;
use crate::db::store::{persist_records, EventStore};
use crate::decoder::Classifier;
use crate::worker::checkpoint::CheckpointFile;

/// Counters for one backfill session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BackfillStats {
    /// Blocks the crawl moved past, including skipped and failed ones
    pub processed: u64,
    /// Blocks that were already indexed
    pub skipped: u64,
    /// Blocks that failed and were left behind
    pub errors: u64,
    /// Records written
    pub records: u64,
}

enum BlockOutcome {
    AlreadyIndexed,
    Indexed(usize),
}

/// Walks the chain backwards from just below the head to block 1.
///
/// Strictly one block at a time, with a pause between batches to spare
/// the archive node. Blocks that already have any record in the store are
/// not decoded again, so restarting from an older checkpoint is harmless.
pub struct BackfillCoordinator {
    chain: Arc<dyn ChainClient>,
    classifier: Arc<Classifier>,
    store: Arc<dyn EventStore>,
    checkpoint_file: CheckpointFile,
    settings: BackfillSettings,
}

impl BackfillCoordinator {
    pub fn new(
        chain: Arc<dyn ChainClient>,
        classifier: Arc<Classifier>,
        store: Arc<dyn EventStore>,
        settings: BackfillSettings,
    ) -> Self {
        Self {
            chain,
            classifier,
            store,
            checkpoint_file: CheckpointFile::new(&settings.checkpoint_path),
            settings,
        }
    }

    /// First block to process, or `None` when the crawl already reached block 1.
    pub async fn start_block(&self, checkpoint: &Checkpoint) -> Result<Option<u64>> {
        let head = self.chain.get_header().await?.number;
        let safe_head = head.saturating_sub(self.settings.safety_offset);

        let start = match checkpoint.last_processed_block {
            Some(last) => last.saturating_sub(1).min(safe_head),
            None => safe_head,
        };

        Ok((start >= 1).then_some(start))
    }

    pub async fn run(&self, cancellation_token: CancellationToken) -> Result<BackfillStats> {
        let mut checkpoint = self.checkpoint_file.load();
        let mut stats = BackfillStats::default();

        let Some(start) = self.start_block(&checkpoint).await? else {
            info!("Backfill already reached block 1, nothing to do");
            return Ok(stats);
        };

        info!(
            "Starting backfill at block {} (batch size {}, delay {}ms)",
            start, self.settings.batch_size, self.settings.batch_delay_ms
        );

        let batch_size = self.settings.batch_size.max(1);
        let batch_delay = Duration::from_millis(self.settings.batch_delay_ms);
        let started = Instant::now();
        let mut since_save = 0u64;
        let mut batch_top = start;

        'crawl: loop {
            let batch_bottom = batch_top.saturating_sub(batch_size - 1).max(1);

            for height in (batch_bottom..=batch_top).rev() {
                if cancellation_token.is_cancelled() {
                    info!("Backfill cancelled before block {}", height);
                    break 'crawl;
                }

                match self.process_block(height).await {
                    Ok(BlockOutcome::AlreadyIndexed) => stats.skipped += 1,
                    Ok(BlockOutcome::Indexed(written)) => stats.records += written as u64,
                    Err(e) => {
                        error!("Failed to process block {}: {:#}", height, e);
                        stats.errors += 1;
                    },
                }

                // Failed blocks still count, the crawl must keep moving
                stats.processed += 1;
                checkpoint.advance(height);
                since_save += 1;

                if since_save >= self.settings.checkpoint_interval {
                    if let Err(e) = self.checkpoint_file.save(&checkpoint) {
                        error!("Failed to save checkpoint at block {}: {:#}", height, e);
                    }
                    since_save = 0;
                }

                if self.settings.progress_log_interval > 0
                    && stats.processed % self.settings.progress_log_interval == 0
                {
                    let rate = stats.processed as f64 / started.elapsed().as_secs_f64().max(0.001);
                    info!(
                        "Backfill at block {}: {} processed, {} skipped, {} errors ({:.1} blocks/s)",
                        height, stats.processed, stats.skipped, stats.errors, rate
                    );
                }
            }

            if batch_bottom == 1 {
                break;
            }
            batch_top = batch_bottom - 1;

            tokio::select! {
                _ = cancellation_token.cancelled() => {
                    info!("Backfill cancelled between batches");
                    break;
                }
                _ = tokio::time::sleep(batch_delay) => {}
            }
        }

        self.checkpoint_file.save(&checkpoint)?;
        info!(
            "Backfill stopped at block {:?}: {} processed, {} skipped, {} errors, {} records",
            checkpoint.last_processed_block,
            stats.processed,
            stats.skipped,
            stats.errors,
            stats.records
        );

        Ok(stats)
    }

    async fn process_block(&self, height: u64) -> Result<BlockOutcome> {
        if self.store.block_is_indexed(height as i64).await? {
            return Ok(BlockOutcome::AlreadyIndexed);
        }

        let hash = self.chain.get_block_hash(height).await?;
        let (block, events) =
            tokio::try_join!(self.chain.get_block(&hash), self.chain.get_events_at(&hash))?;

        let records = self.classifier.classify(&block, &events).await;
        Ok(BlockOutcome::Indexed(persist_records(self.store.as_ref(), &records).await))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{block_with, classifier, event, extrinsic, swap_block, MemoryStore, MockChain};
    use serde_json::json;

    fn settings(dir: &tempfile::TempDir) -> BackfillSettings {
        BackfillSettings {
            batch_size: 100,
            batch_delay_ms: 0,
            checkpoint_interval: 500,
            safety_offset: 10,
            progress_log_interval: 100,
            checkpoint_path: dir.path().join("checkpoint.json").display().to_string(),
        }
    }

    fn coordinator(chain: &Arc<MockChain>, store: &Arc<MemoryStore>, settings: BackfillSettings) -> BackfillCoordinator {
        BackfillCoordinator::new(
            chain.clone(),
            Arc::new(classifier(chain.clone())),
            store.clone(),
            settings,
        )
    }

    #[tokio::test]
    async fn test_fresh_crawl_starts_below_safety_offset() {
        let dir = tempfile::tempdir().unwrap();
        let chain = Arc::new(MockChain::with_priced_token());
        chain.set_head(1_000);
        let store = Arc::new(MemoryStore::default());
        let backfill = coordinator(&chain, &store, settings(&dir));

        assert_eq!(backfill.start_block(&Checkpoint::new()).await.unwrap(), Some(990));

        let stats = backfill.run(CancellationToken::new()).await.unwrap();
        let fetched = chain.fetched();
        assert_eq!(fetched.first(), Some(&990));
        assert_eq!(fetched.last(), Some(&1));
        assert!(fetched.windows(2).all(|w| w[0] > w[1]));
        assert_eq!(stats.processed, 990);

        let checkpoint = CheckpointFile::new(dir.path().join("checkpoint.json")).load();
        assert_eq!(checkpoint.last_processed_block, Some(1));
        assert_eq!(checkpoint.total_blocks_processed, 990);
    }

    #[tokio::test]
    async fn test_resume_takes_lower_of_checkpoint_and_head() {
        let dir = tempfile::tempdir().unwrap();
        let chain = Arc::new(MockChain::default());
        chain.set_head(1_000);
        let store = Arc::new(MemoryStore::default());
        let backfill = coordinator(&chain, &store, settings(&dir));

        let mut checkpoint = Checkpoint::new();
        checkpoint.advance(500);
        assert_eq!(backfill.start_block(&checkpoint).await.unwrap(), Some(499));

        // Head moved backwards (fresh node), the safety bound wins
        chain.set_head(300);
        assert_eq!(backfill.start_block(&checkpoint).await.unwrap(), Some(290));

        checkpoint.advance(1);
        assert_eq!(backfill.start_block(&checkpoint).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_reprocessing_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let chain = Arc::new(MockChain::with_priced_token());
        chain.set_head(30);
        let (block, events) = swap_block(12);
        chain.set_block(block, events);
        let store = Arc::new(MemoryStore::default());

        let first = coordinator(&chain, &store, settings(&dir)).run(CancellationToken::new()).await.unwrap();
        assert_eq!(first.skipped, 0);
        let rows_after_first = store.snapshot().len();
        assert_eq!(store.snapshot().swaps.len(), 1);

        // Lose the checkpoint and crawl the same range again
        std::fs::remove_file(dir.path().join("checkpoint.json")).unwrap();
        let second = coordinator(&chain, &store, settings(&dir)).run(CancellationToken::new()).await.unwrap();
        assert_eq!(second.skipped, 1);
        assert_eq!(store.snapshot().len(), rows_after_first);
    }

    #[tokio::test]
    async fn test_block_without_swaps_is_not_indexed_twice() {
        let dir = tempfile::tempdir().unwrap();
        let chain = Arc::new(MockChain::with_priced_token());
        chain.set_head(30);
        let block = block_with(12, vec![extrinsic(0, "balances", "transfer", Some("cnAlice"), json!([]))]);
        let events = vec![
            event(0, "balances", "Transfer", json!(["cnAlice", "cnBob", "5000000000000000000"])),
            event(0, "transactionPayment", "TransactionFeePaid", json!(["cnAlice", "700000000000000000", "0"])),
            event(0, "system", "ExtrinsicSuccess", json!([])),
        ];
        chain.set_block(block, events);
        let store = Arc::new(MemoryStore::default());

        coordinator(&chain, &store, settings(&dir)).run(CancellationToken::new()).await.unwrap();
        let rows = store.snapshot();
        assert!(rows.swaps.is_empty());
        assert_eq!((rows.transfers.len(), rows.fees.len()), (1, 1));

        std::fs::remove_file(dir.path().join("checkpoint.json")).unwrap();
        let second = coordinator(&chain, &store, settings(&dir)).run(CancellationToken::new()).await.unwrap();
        assert_eq!(second.skipped, 1);
        assert_eq!(second.records, 0);
        let rows = store.snapshot();
        assert_eq!((rows.transfers.len(), rows.fees.len()), (1, 1));
    }

    #[tokio::test]
    async fn test_failed_block_counts_as_processed() {
        let dir = tempfile::tempdir().unwrap();
        let chain = Arc::new(MockChain::with_priced_token());
        chain.set_head(20);
        chain.fail_block(7);
        let store = Arc::new(MemoryStore::default());

        let stats = coordinator(&chain, &store, settings(&dir)).run(CancellationToken::new()).await.unwrap();
        assert_eq!(stats.processed, 10);
        assert_eq!(stats.errors, 1);
        assert!(chain.fetched().contains(&6));
    }

    #[tokio::test]
    async fn test_checkpoint_never_moves_up_across_sessions() {
        let dir = tempfile::tempdir().unwrap();
        let chain = Arc::new(MockChain::default());
        chain.set_head(60);
        let store = Arc::new(MemoryStore::default());
        let mut small_batches = settings(&dir);
        small_batches.batch_size = 7;
        small_batches.checkpoint_interval = 3;

        let file = CheckpointFile::new(dir.path().join("checkpoint.json"));
        let mut saved = Checkpoint::new();
        saved.advance(25);
        file.save(&saved).unwrap();

        coordinator(&chain, &store, small_batches).run(CancellationToken::new()).await.unwrap();

        let fetched = chain.fetched();
        assert_eq!(fetched.first(), Some(&24));
        assert_eq!(fetched.len(), 24);
        assert_eq!(file.load().last_processed_block, Some(1));
        assert_eq!(file.load().total_blocks_processed, 25);
    }

    #[tokio::test]
    async fn test_cancellation_flushes_checkpoint() {
        let dir = tempfile::tempdir().unwrap();
        let chain = Arc::new(MockChain::default());
        chain.set_head(100);
        let store = Arc::new(MemoryStore::default());
        let token = CancellationToken::new();
        token.cancel();

        let stats = coordinator(&chain, &store, settings(&dir)).run(token).await.unwrap();
        assert_eq!(stats.processed, 0);
        assert!(chain.fetched().is_empty());
        assert!(dir.path().join("checkpoint.json").exists());
    }
}
