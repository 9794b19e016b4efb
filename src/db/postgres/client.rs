use anyhow::Context;
use deadpool_postgres::{Manager, ManagerConfig, Pool, RecyclingMethod};
use log::{info, warn};
use tokio_postgres::NoTls;

use crate::config::PostgresSettings;

const MAX_CONNECT_RETRIES: u32 = 3;

/// Split a schema file into statements, ignoring `--` line comments.
fn split_sql_statements(sql: &str) -> Vec<String> {
    let without_comments: String = sql
        .lines()
        .map(|line| match line.find("--") {
            Some(pos) => &line[..pos],
            None => line,
        })
        .collect::<Vec<_>>()
        .join("\n");

    without_comments
        .split(';')
        .map(str::trim)
        .filter(|stmt| !stmt.is_empty())
        .map(str::to_string)
        .collect()
}

/// One PostgreSQL event store behind a `deadpool-postgres` pool.
///
/// The live and history stores are two instances of this client pointed at
/// different databases; `label` only shows up in logs.
#[derive(Clone)]
pub struct PostgresClient {
    pub pool: Pool,
    pub label: &'static str,
}

impl PostgresClient {
    pub async fn new(settings: &PostgresSettings, label: &'static str) -> anyhow::Result<Self> {
        info!("Connecting to {} store at {}:{}/{}", label, settings.host, settings.port, settings.database);

        let mut retries = 0;
        loop {
            let mut pg_config = tokio_postgres::Config::new();
            pg_config
                .host(&settings.host)
                .port(settings.port)
                .user(&settings.user)
                .password(&settings.password)
                .dbname(&settings.database);

            let mgr = Manager::from_config(
                pg_config,
                NoTls,
                ManagerConfig {
                    recycling_method: RecyclingMethod::Fast,
                },
            );
            let pool = Pool::builder(mgr)
                .max_size(settings.pool_size)
                .build()
                .context("Failed to create PostgreSQL connection pool")?;

            match pool.get().await {
                Ok(_conn) => {
                    info!("Connected to {} store", label);
                    return Ok(Self { pool, label });
                },
                Err(e) => {
                    retries += 1;
                    if retries >= MAX_CONNECT_RETRIES {
                        return Err(anyhow::anyhow!(
                            "Failed to connect to {} store after {} attempts: {}",
                            label,
                            retries,
                            e
                        ));
                    }

                    let delay = std::time::Duration::from_millis(100 * 2_u64.pow(retries));
                    warn!(
                        "Failed to connect to {} store (attempt {}/{}), retrying in {:?}...",
                        label, retries, MAX_CONNECT_RETRIES, delay
                    );
                    tokio::time::sleep(delay).await;
                },
            }
        }
    }

    /// Apply `schema/postgres.sql`. Every statement is idempotent.
    pub async fn migrate(&self) -> anyhow::Result<()> {
        let client = self.pool.get().await?;

        let schema = tokio::fs::read_to_string("schema/postgres.sql")
            .await
            .context("Failed to read schema/postgres.sql")?;

        for stmt in split_sql_statements(&schema) {
            client
                .execute(stmt.as_str(), &[])
                .await
                .with_context(|| format!("Failed to execute migration statement: {}", stmt))?;
        }

        info!("Schema applied to {} store", self.label);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_ignores_semicolons_in_comments() {
        let sql = "-- first; second\nCREATE TABLE a (id INT);\n\nCREATE INDEX i ON a (id); -- trailing;\n";
        let statements = split_sql_statements(sql);
        assert_eq!(statements, vec!["CREATE TABLE a (id INT)", "CREATE INDEX i ON a (id)"]);
    }
}
