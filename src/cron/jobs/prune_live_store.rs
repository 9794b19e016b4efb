//! Job to drop live-store rows older than the retention window.
//!
//! The history store keeps everything; the live store only serves recent
//! activity.

use anyhow::Result;
use chrono::{Duration, Utc};
use log::info;

use crate::db::store::EventStore;

pub async fn run(store: &dyn EventStore, retention_days: i64) -> Result<u64> {
    let start = std::time::Instant::now();
    let cutoff = (Utc::now() - Duration::days(retention_days)).timestamp_millis();

    let removed = store.prune_before(cutoff).await?;

    info!(
        "Completed prune_live_store job in {:?} ({} rows older than {} days)",
        start.elapsed(),
        removed,
        retention_days
    );
    Ok(removed)
}
