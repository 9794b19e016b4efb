use config::{Config, ConfigError, File};
use serde::Deserialize;

/// Substrate API Sidecar connection settings.
///
/// The sidecar exposes decoded blocks, events and storage over REST,
/// which is everything the decoder and the price oracle need.
#[derive(Debug, Deserialize, Clone)]
pub struct ChainSettings {
    pub sidecar_url: String,
    /// Timeout applied to every storage read and block fetch
    #[serde(default = "default_rpc_timeout_ms")]
    pub rpc_timeout_ms: u64,
    /// How often the finalized head is polled for the live subscription
    #[serde(default = "default_head_poll_interval_ms")]
    pub head_poll_interval_ms: u64,
}

fn default_rpc_timeout_ms() -> u64 {
    5_000
}

fn default_head_poll_interval_ms() -> u64 {
    2_000
}

/// PostgreSQL database connection configuration.
///
/// Used for both stores:
/// - `postgres`: the live store (recent activity, read-write)
/// - `history`: the backfilled store (written by the backfill binary)
#[derive(Debug, Deserialize, Clone)]
pub struct PostgresSettings {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,
}

fn default_pool_size() -> usize {
    16
}

/// Asset identifiers and whitelist source.
#[derive(Debug, Deserialize, Clone)]
pub struct AssetSettings {
    #[serde(default = "default_whitelist_url")]
    pub whitelist_url: String,
    /// Native gas asset and AMM routing hub (XOR)
    #[serde(default = "default_bridge_asset")]
    pub bridge_asset: String,
    /// USD-pegged anchor stablecoin (DAI)
    #[serde(default = "default_anchor_asset")]
    pub anchor_asset: String,
    #[serde(default = "default_xst_asset")]
    pub xst_asset: String,
    #[serde(default = "default_xstusd_asset")]
    pub xstusd_asset: String,
    /// Addresses starting with this prefix are technical accounts and never count as transfers
    #[serde(default = "default_technical_prefix")]
    pub technical_account_prefix: String,
}

impl Default for AssetSettings {
    fn default() -> Self {
        Self {
            whitelist_url: default_whitelist_url(),
            bridge_asset: default_bridge_asset(),
            anchor_asset: default_anchor_asset(),
            xst_asset: default_xst_asset(),
            xstusd_asset: default_xstusd_asset(),
            technical_account_prefix: default_technical_prefix(),
        }
    }
}

fn default_whitelist_url() -> String {
    "https://raw.githubusercontent.com/sora-xor/polkaswap-token-whitelist-config/master/whitelist.json"
        .to_string()
}

fn default_bridge_asset() -> String {
    "0x0200000000000000000000000000000000000000000000000000000000000000".to_string()
}

fn default_anchor_asset() -> String {
    "0x0200060000000000000000000000000000000000000000000000000000000000".to_string()
}

fn default_xst_asset() -> String {
    "0x0200090000000000000000000000000000000000000000000000000000000000".to_string()
}

fn default_xstusd_asset() -> String {
    "0x0200080000000000000000000000000000000000000000000000000000000000".to_string()
}

fn default_technical_prefix() -> String {
    "cnTQ".to_string()
}

/// Historical crawl tuning.
///
/// The batch delay is a rate limit protecting the archive node.
#[derive(Debug, Deserialize, Clone)]
pub struct BackfillSettings {
    #[serde(default = "default_backfill_batch_size")]
    pub batch_size: u64,
    #[serde(default = "default_backfill_batch_delay_ms")]
    pub batch_delay_ms: u64,
    /// Checkpoint is flushed every N blocks processed in this session
    #[serde(default = "default_checkpoint_interval")]
    pub checkpoint_interval: u64,
    /// Blocks below the head that are never crawled (reorg guard)
    #[serde(default = "default_safety_offset")]
    pub safety_offset: u64,
    #[serde(default = "default_progress_log_interval")]
    pub progress_log_interval: u64,
    #[serde(default = "default_checkpoint_path")]
    pub checkpoint_path: String,
}

impl Default for BackfillSettings {
    fn default() -> Self {
        Self {
            batch_size: default_backfill_batch_size(),
            batch_delay_ms: default_backfill_batch_delay_ms(),
            checkpoint_interval: default_checkpoint_interval(),
            safety_offset: default_safety_offset(),
            progress_log_interval: default_progress_log_interval(),
            checkpoint_path: default_checkpoint_path(),
        }
    }
}

fn default_backfill_batch_size() -> u64 {
    100
}

fn default_backfill_batch_delay_ms() -> u64 {
    500
}

fn default_checkpoint_interval() -> u64 {
    500
}

fn default_safety_offset() -> u64 {
    10
}

fn default_progress_log_interval() -> u64 {
    100
}

fn default_checkpoint_path() -> String {
    "backfill_checkpoint.json".to_string()
}

/// Live ingestion and batch emission settings.
#[derive(Debug, Deserialize, Clone)]
pub struct LiveSettings {
    /// Wall-clock interval of the batch emitter, independent of block arrival
    #[serde(default = "default_batch_interval_ms")]
    pub batch_interval_ms: u64,
    /// Maximum items per emitted batch, per channel
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,
    #[serde(default = "default_price_cache_ttl_secs")]
    pub price_cache_ttl_secs: u64,
    /// Rows older than this are pruned from the live store
    #[serde(default = "default_retention_days")]
    pub retention_days: i64,
}

impl Default for LiveSettings {
    fn default() -> Self {
        Self {
            batch_interval_ms: default_batch_interval_ms(),
            max_batch_size: default_max_batch_size(),
            price_cache_ttl_secs: default_price_cache_ttl_secs(),
            retention_days: default_retention_days(),
        }
    }
}

fn default_batch_interval_ms() -> u64 {
    5_000
}

fn default_max_batch_size() -> usize {
    300
}

fn default_price_cache_ttl_secs() -> u64 {
    60
}

fn default_retention_days() -> i64 {
    30
}

/// Ethereum JSON-RPC used to recover the sender of incoming bridge transfers.
#[derive(Debug, Deserialize, Clone)]
pub struct EthereumSettings {
    pub rpc_url: String,
}

/// Redpanda (Kafka-compatible) pub/sub configuration.
///
/// When enabled, the live pipeline's transfer and swap batches are
/// published to `{prefix}.transfers-batch` and `{prefix}.swaps-batch`.
#[derive(Debug, Deserialize, Clone)]
pub struct RedpandaSettings {
    /// Enable/disable Redpanda publishing
    #[serde(default)]
    pub enabled: bool,
    /// Comma-separated list of broker addresses (e.g., "localhost:9092")
    #[serde(default = "default_redpanda_brokers")]
    pub brokers: String,
    #[serde(default = "default_redpanda_topic_prefix")]
    pub topic_prefix: String,
}

fn default_redpanda_brokers() -> String {
    "localhost:9092".to_string()
}

fn default_redpanda_topic_prefix() -> String {
    "sorametrics".to_string()
}

/// Configuration for cron job intervals
#[derive(Debug, Deserialize, Clone)]
pub struct CronSettings {
    /// Interval for re-pricing key assets into the shared cache - default 1 minute
    #[serde(default = "default_key_prices_interval_secs")]
    pub key_prices_interval_secs: u64,
    /// Interval for pruning expired live-store rows - default 1 hour
    #[serde(default = "default_prune_interval_secs")]
    pub prune_interval_secs: u64,
}

impl Default for CronSettings {
    fn default() -> Self {
        Self {
            key_prices_interval_secs: default_key_prices_interval_secs(),
            prune_interval_secs: default_prune_interval_secs(),
        }
    }
}

fn default_key_prices_interval_secs() -> u64 {
    60
}

fn default_prune_interval_secs() -> u64 {
    3_600
}

/// Root application configuration.
///
/// Loaded from `config.yaml` at startup and shared by both binaries.
#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub chain: ChainSettings,
    pub postgres: PostgresSettings,
    #[serde(default)]
    pub history: Option<PostgresSettings>,
    #[serde(default)]
    pub assets: AssetSettings,
    #[serde(default)]
    pub backfill: BackfillSettings,
    #[serde(default)]
    pub live: LiveSettings,
    #[serde(default)]
    pub ethereum: Option<EthereumSettings>,
    #[serde(default)]
    pub redpanda: Option<RedpandaSettings>,
    #[serde(default)]
    pub cron: CronSettings,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        let s = Config::builder()
            .add_source(File::with_name("config"))
            .build()?;

        let settings: Settings = s.try_deserialize()?;

        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::FileFormat;

    #[test]
    fn test_minimal_yaml_fills_defaults() {
        let yaml = r#"
chain:
  sidecar_url: http://localhost:8080
postgres:
  host: localhost
  port: 5432
  user: sora
  password: sora
  database: live
"#;
        let settings: Settings = Config::builder()
            .add_source(File::from_str(yaml, FileFormat::Yaml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(settings.chain.rpc_timeout_ms, 5_000);
        assert_eq!(settings.backfill.batch_size, 100);
        assert_eq!(settings.backfill.safety_offset, 10);
        assert_eq!(settings.backfill.checkpoint_interval, 500);
        assert_eq!(settings.live.max_batch_size, 300);
        assert_eq!(settings.live.batch_interval_ms, 5_000);
        assert_eq!(settings.assets.technical_account_prefix, "cnTQ");
        assert!(settings.history.is_none());
        assert!(settings.redpanda.is_none());
    }
}
