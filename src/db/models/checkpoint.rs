use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Backfill progress, persisted as a small JSON document.
///
/// `last_processed_block` only ever moves down: the crawl walks from the
/// head towards genesis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Checkpoint {
    pub last_processed_block: Option<u64>,
    pub total_blocks_processed: u64,
    pub started_at: DateTime<Utc>,
}

impl Checkpoint {
    pub fn new() -> Self {
        Self {
            last_processed_block: None,
            total_blocks_processed: 0,
            started_at: Utc::now(),
        }
    }

    /// Record `block` as processed. Never moves the checkpoint upwards.
    pub fn advance(&mut self, block: u64) {
        self.last_processed_block = Some(match self.last_processed_block {
            Some(current) => current.min(block),
            None => block,
        });
        self.total_blocks_processed += 1;
    }
}

impl Default for Checkpoint {
    fn default() -> Self {
        Self::new()
    }
}
