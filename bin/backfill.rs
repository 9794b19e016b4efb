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
    db::PostgresClient,
    decoder::Classifier,
    oracle::{OracleAssets, PriceOracle},
    worker::AssetRegistry,
    BackfillCoordinator, Settings,
};

#[tokio::main()]
async fn main() -> anyhow::Result<()> {
    SimpleLogger::new()
        .with_level(LevelFilter::Info)
        .init()
        .context("Failed to initialise logger")?;

    let settings = Settings::new()
        .context("Failed to load config.yaml. Please ensure it exists and is valid")?;

    let history_settings = settings
        .history
        .as_ref()
        .context("Backfill writes to the history store, configure `history` in config.yaml")?;
    let history = PostgresClient::new(history_settings, "history")
        .await
        .context("Failed to connect to the history store")?;
    history.migrate().await?;

    let chain: Arc<dyn ChainClient> =
        Arc::new(SidecarClient::new(&settings.chain).context("Failed to create chain client")?);
    let rpc_timeout = Duration::from_millis(settings.chain.rpc_timeout_ms);

    let registry = Arc::new(AssetRegistry::load(&settings.assets).await);
    // No cross-block cache: prices depend on the block being crawled
    let oracle = Arc::new(PriceOracle::historical(
        chain.clone(),
        OracleAssets::from(&settings.assets),
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
        registry,
        oracle,
        chain.clone(),
        senders,
        settings.assets.technical_account_prefix.clone(),
        rpc_timeout,
    ));

    let coordinator =
        BackfillCoordinator::new(chain, classifier, Arc::new(history), settings.backfill.clone());

    let cancellation_token = CancellationToken::new();
    let crawl_token = cancellation_token.child_token();
    let mut crawl_handle = tokio::spawn(async move { coordinator.run(crawl_token).await });

    #[cfg(unix)]
    let mut sigterm_stream = {
        use tokio::signal::unix::{signal, SignalKind};
        signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?
    };

    info!("Backfill running. Press Ctrl+C to stop.");

    #[cfg(unix)]
    let finished = tokio::select! {
        result = &mut crawl_handle => Some(result),
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal (Ctrl+C), flushing checkpoint...");
            None
        },
        _ = sigterm_stream.recv() => {
            info!("Received SIGTERM, flushing checkpoint...");
            None
        },
    };

    #[cfg(not(unix))]
    let finished = tokio::select! {
        result = &mut crawl_handle => Some(result),
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal (Ctrl+C), flushing checkpoint...");
            None
        },
    };

    let result = match finished {
        Some(result) => result,
        None => {
            cancellation_token.cancel();
            crawl_handle.await
        },
    };

    match result.context("Backfill task panicked")? {
        Ok(stats) => {
            info!(
                "Backfill finished: {} blocks, {} already indexed, {} failed, {} records",
                stats.processed, stats.skipped, stats.errors, stats.records
            );
            Ok(())
        },
        Err(e) => {
            error!("Backfill failed: {:#}", e);
            Err(e)
        },
    }
}
