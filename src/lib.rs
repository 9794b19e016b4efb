pub mod chain;
pub mod config;
pub mod cron;
pub mod db;
pub mod decoder;
pub mod oracle;
pub mod pubsub;
pub mod utils;
pub mod worker;

#[cfg(test)]
pub(crate) mod testing;

pub use config::Settings;
pub use cron::CronScheduler;
pub use db::Database;
pub use pubsub::{BatchSink, LogSink, RedpandaPublisher};
pub use worker::{BackfillCoordinator, LivePipeline};
