#[allow(clippy::module_inception)]
mod config;

pub use config::{
    AssetSettings, BackfillSettings, ChainSettings, CronSettings, EthereumSettings, LiveSettings,
    PostgresSettings, RedpandaSettings, Settings,
};
