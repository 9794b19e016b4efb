use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use jemallocator::Jemalloc;
use log::{error, info, warn, LevelFilter};
use simple_logger::SimpleLogger;
use tokio_util::sync::CancellationToken;

#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

use sorametrics::{
    chain::{ChainClient, EthSenderResolver, NoopSenderResolver, SenderResolver, SidecarClient},
    cron::KeyPrices,
    db::EventStore,
    decoder::Classifier,
    oracle::{OracleAssets, PriceCache, PriceOracle},
    worker::{run_emitter, AssetRegistry, Outbox},
    BatchSink, CronScheduler, Database, LivePipeline, LogSink, RedpandaPublisher, Settings,
};

#[tokio::main()]
async fn main() -> anyhow::Result<()> {
    SimpleLogger::new()
        .with_level(LevelFilter::Info)
        .init()
        .context("Failed to initialise logger")?;

    // Load configuration
    let settings = Arc::new(
        Settings::new()
            .context("Failed to load config.yaml. Please ensure it exists and is valid")?,
    );

    let db = Database::connect(&settings)
        .await
        .context("Failed to initialize database connection")?;

    let chain: Arc<dyn ChainClient> =
        Arc::new(SidecarClient::new(&settings.chain).context("Failed to create chain client")?);
    let head = chain
        .get_header()
        .await
        .context("Chain is unreachable, cannot start live ingestion")?;
    info!("Chain head at #{}", head.number);

    let cancellation_token = CancellationToken::new();
    run_live(settings, db, chain, cancellation_token).await
}

async fn run_live(
    settings: Arc<Settings>,
    db: Database,
    chain: Arc<dyn ChainClient>,
    cancellation_token: CancellationToken,
) -> anyhow::Result<()> {
    let rpc_timeout = Duration::from_millis(settings.chain.rpc_timeout_ms);
    let registry = Arc::new(AssetRegistry::load(&settings.assets).await);

    // One cache for the whole process, shared by the pipeline and the cron job
    let cache = Arc::new(PriceCache::with_system_clock(Duration::from_secs(
        settings.live.price_cache_ttl_secs,
    )));
    let oracle = Arc::new(PriceOracle::live(
        chain.clone(),
        OracleAssets::from(&settings.assets),
        cache.clone(),
        rpc_timeout,
    ));

    let senders: Arc<dyn SenderResolver> = match &settings.ethereum {
        Some(eth) => Arc::new(EthSenderResolver::new(&eth.rpc_url, rpc_timeout)?),
        None => {
            warn!("No Ethereum RPC configured, incoming bridge senders will not be resolved");
            Arc::new(NoopSenderResolver)
        },
    };

    let classifier = Arc::new(Classifier::new(
        registry.clone(),
        oracle.clone(),
        chain.clone(),
        senders,
        settings.assets.technical_account_prefix.clone(),
        rpc_timeout,
    ));

    let live_store: Arc<dyn EventStore> = db.live.clone();
    let outbox = Arc::new(Outbox::default());

    // Federated reads: log what both stores hold before ingestion starts
    let repository = db.repository();
    match repository.activity_counts(None).await {
        Ok(counts) => info!(
            "Indexed so far: {} swaps, {} transfers, {} bridges (history store attached: {})",
            counts.swaps,
            counts.transfers,
            counts.bridges,
            repository.has_history()
        ),
        Err(e) => warn!("Failed to read activity counts: {:#}", e),
    }

    let pipeline = LivePipeline::new(chain.clone(), classifier, live_store.clone(), outbox.clone());
    let pipeline_token = cancellation_token.child_token();
    let pipeline_handle = tokio::spawn(async move {
        if let Err(e) = pipeline.run(pipeline_token).await {
            error!("Live pipeline failed: {:#}", e);
        }
    });

    let sink: Arc<dyn BatchSink> = match settings.redpanda.as_ref().and_then(RedpandaPublisher::new) {
        Some(publisher) => Arc::new(publisher),
        None => Arc::new(LogSink),
    };
    let emitter_handle = tokio::spawn(run_emitter(
        outbox,
        sink,
        Duration::from_millis(settings.live.batch_interval_ms),
        settings.live.max_batch_size,
        cancellation_token.child_token(),
    ));

    let cron_scheduler = CronScheduler::new(
        KeyPrices::new(chain.clone(), oracle, cache, &registry),
        live_store,
        settings.live.retention_days,
        settings.cron.clone(),
    );
    let cron_token = cancellation_token.child_token();
    let cron_handle = tokio::spawn(async move {
        if let Err(e) = cron_scheduler.run(cron_token).await {
            error!("Cron scheduler failed: {:#}", e);
        }
    });

    #[cfg(unix)]
    let mut sigterm_stream = {
        use tokio::signal::unix::{signal, SignalKind};
        signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?
    };

    info!("Live indexer running. Press Ctrl+C to stop.");

    #[cfg(unix)]
    {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Received shutdown signal (Ctrl+C), exiting gracefully...");
            },
            _ = sigterm_stream.recv() => {
                info!("Received SIGTERM, exiting gracefully...");
            },
        };
    }

    #[cfg(not(unix))]
    {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Received shutdown signal (Ctrl+C), exiting gracefully...");
            },
        };
    }

    info!("Finishing all tasks...");
    cancellation_token.cancel();

    let _ = pipeline_handle.await;
    let _ = emitter_handle.await;
    let _ = cron_handle.await;

    info!("Live indexer stopped");
    Ok(())
}
