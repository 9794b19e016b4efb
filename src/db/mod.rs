use std::sync::Arc;

use log::{info, warn};

use crate::config::Settings;

pub mod federation;
pub mod models;
pub mod postgres;
pub mod store;

pub use federation::{ActivityCounts, FederatedRepository, Page};
pub use postgres::PostgresClient;
pub use store::{persist_records, BridgeQuery, EventStore, SwapQuery, TransferQuery};

/// The live store and, when reachable, the history store.
///
/// Both are PostgreSQL databases with the same schema: the live process
/// writes to `live`, the backfill binary writes to `history`.
#[derive(Clone)]
pub struct Database {
    pub live: Arc<PostgresClient>,
    pub history: Option<Arc<PostgresClient>>,
}

impl Database {
    /// Connect the live store, migrating it, and attach the history store
    /// if configured. A history store that cannot be reached degrades to
    /// live-only reads.
    pub async fn connect(settings: &Settings) -> anyhow::Result<Self> {
        let live = PostgresClient::new(&settings.postgres, "live").await?;
        live.migrate().await?;

        let history = match &settings.history {
            Some(history_settings) => match PostgresClient::new(history_settings, "history").await {
                Ok(client) => Some(Arc::new(client)),
                Err(e) => {
                    warn!("History store unavailable, serving live data only: {:#}", e);
                    None
                },
            },
            None => {
                info!("No history store configured, serving live data only");
                None
            },
        };

        Ok(Self {
            live: Arc::new(live),
            history,
        })
    }

    pub fn repository(&self) -> FederatedRepository {
        FederatedRepository::new(
            self.live.clone() as Arc<dyn EventStore>,
            self.history.clone().map(|h| h as Arc<dyn EventStore>),
        )
    }
}
