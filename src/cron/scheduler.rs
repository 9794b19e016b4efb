//! Cron scheduler for periodic background tasks.
//!
//! Runs jobs like:
//! - Warming the live price cache for the key assets
//! - Pruning live-store rows past the retention window

use std::sync::Arc;

use anyhow::Result;
use log::{error, info};
use tokio_cron_scheduler::{Job, JobScheduler};
use tokio_util::sync::CancellationToken;

use crate::config::CronSettings;
use crate::db::store::EventStore;

use super::jobs;
use super::jobs::refresh_key_prices::KeyPrices;

/// Cron scheduler that manages periodic background jobs.
pub struct CronScheduler {
    prices: Arc<KeyPrices>,
    live_store: Arc<dyn EventStore>,
    retention_days: i64,
    settings: CronSettings,
}

impl CronScheduler {
    pub fn new(
        prices: KeyPrices,
        live_store: Arc<dyn EventStore>,
        retention_days: i64,
        settings: CronSettings,
    ) -> Self {
        Self {
            prices: Arc::new(prices),
            live_store,
            retention_days,
            settings,
        }
    }

    /// Starts the cron scheduler and runs until cancellation.
    pub async fn run(&self, cancellation_token: CancellationToken) -> Result<()> {
        let mut scheduler = JobScheduler::new().await?;

        self.register_refresh_key_prices_job(&scheduler).await?;
        self.register_prune_live_store_job(&scheduler).await?;

        scheduler.start().await?;
        info!("Cron scheduler started with {} jobs", 2);

        cancellation_token.cancelled().await;
        info!("Cron scheduler shutting down...");

        scheduler.shutdown().await?;
        Ok(())
    }

    async fn register_refresh_key_prices_job(&self, scheduler: &JobScheduler) -> Result<()> {
        let prices = self.prices.clone();
        let interval = self.settings.key_prices_interval_secs;

        let job = Job::new_repeated_async(
            std::time::Duration::from_secs(interval),
            move |_uuid, _lock| {
                let prices = prices.clone();
                Box::pin(async move {
                    if let Err(e) = jobs::refresh_key_prices::run(&prices).await {
                        error!("Failed to refresh key prices: {:#}", e);
                    }
                })
            },
        )?;

        scheduler.add(job).await?;
        info!("Registered refresh_key_prices job (every {}s)", interval);
        Ok(())
    }

    async fn register_prune_live_store_job(&self, scheduler: &JobScheduler) -> Result<()> {
        let store = self.live_store.clone();
        let retention_days = self.retention_days;
        let interval = self.settings.prune_interval_secs;

        let job = Job::new_repeated_async(
            std::time::Duration::from_secs(interval),
            move |_uuid, _lock| {
                let store = store.clone();
                Box::pin(async move {
                    if let Err(e) = jobs::prune_live_store::run(store.as_ref(), retention_days).await {
                        error!("Failed to prune live store: {:#}", e);
                    }
                })
            },
        )?;

        scheduler.add(job).await?;
        info!("Registered prune_live_store job (every {}s)", interval);
        Ok(())
    }
}
