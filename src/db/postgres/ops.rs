use async_trait::async_trait;
use log::error;
use postgres_types::ToSql;
use tokio_postgres::Row;

use crate::db::models::{
    BridgeDirection, BridgeEvent, FeeEvent, FeeKind, FeeSummary, LiquidityEvent, LiquidityKind,
    SwapEvent, TransferEvent,
};
use crate::db::postgres::PostgresClient;
use crate::db::store::{BridgeQuery, EventStore, SwapQuery, TransferQuery};

/// Sanitize a string for PostgreSQL by removing null bytes (0x00)
/// which are invalid in UTF-8 text columns
fn sanitize_string(s: &str) -> String {
    s.replace('\0', "")
}

/// Incrementally built `WHERE` clause with positional parameters.
///
/// Each `{}` in a clause is replaced by the placeholder of the value
/// pushed with it, so one value can appear several times.
#[derive(Default)]
struct Filter {
    clauses: Vec<String>,
    params: Vec<Box<dyn ToSql + Sync + Send>>,
}

impl Filter {
    fn push<T: ToSql + Sync + Send + 'static>(&mut self, clause: &str, value: T) {
        self.params.push(Box::new(value));
        let placeholder = format!("${}", self.params.len());
        self.clauses.push(clause.replace("{}", &placeholder));
    }

    fn where_sql(&self) -> String {
        if self.clauses.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", self.clauses.join(" AND "))
        }
    }

    /// Placeholder for one more trailing parameter (e.g. LIMIT).
    fn next_placeholder(&self) -> String {
        format!("${}", self.params.len() + 1)
    }

    fn params(&self) -> Vec<&(dyn ToSql + Sync)> {
        self.params
            .iter()
            .map(|p| p.as_ref() as &(dyn ToSql + Sync))
            .collect()
    }
}

fn swap_filter(query: &SwapQuery) -> Filter {
    let mut filter = Filter::default();
    if let Some(wallet) = &query.wallet {
        filter.push("wallet = {}", wallet.clone());
    }
    if let Some(symbol) = &query.symbol {
        filter.push("(in_symbol = {} OR out_symbol = {})", symbol.clone());
    }
    if let Some(since) = query.since {
        filter.push("timestamp >= {}", since);
    }
    filter
}

fn transfer_filter(query: &TransferQuery) -> Filter {
    let mut filter = Filter::default();
    if let Some(address) = &query.address {
        filter.push("(from_addr = {} OR to_addr = {})", address.clone());
    }
    if let Some(symbol) = &query.symbol {
        filter.push("symbol = {}", symbol.clone());
    }
    if let Some(since) = query.since {
        filter.push("timestamp >= {}", since);
    }
    filter
}

fn bridge_filter(query: &BridgeQuery) -> Filter {
    let mut filter = Filter::default();
    if let Some(address) = &query.address {
        filter.push("(sender = {} OR recipient = {})", address.clone());
    }
    if let Some(network) = &query.network {
        filter.push("network = {}", network.clone());
    }
    if let Some(since) = query.since {
        filter.push("timestamp >= {}", since);
    }
    filter
}

// ==================== ROW MAPPING ====================

fn swap_from_row(row: &Row) -> SwapEvent {
    SwapEvent {
        timestamp: row.get("timestamp"),
        block: row.get("block"),
        wallet: row.get("wallet"),
        in_asset_id: row.get("in_asset_id"),
        in_symbol: row.get("in_symbol"),
        in_amount: row.get("in_amount"),
        in_logo: row.get("in_logo"),
        in_usd: row.get("in_usd"),
        out_asset_id: row.get("out_asset_id"),
        out_symbol: row.get("out_symbol"),
        out_amount: row.get("out_amount"),
        out_logo: row.get("out_logo"),
        out_usd: row.get("out_usd"),
        hash: row.get("hash"),
        extrinsic_id: row.get("extrinsic_id"),
    }
}

fn transfer_from_row(row: &Row) -> TransferEvent {
    TransferEvent {
        timestamp: row.get("timestamp"),
        block: row.get("block"),
        from: row.get("from_addr"),
        to: row.get("to_addr"),
        amount: row.get("amount"),
        asset_id: row.get("asset_id"),
        symbol: row.get("symbol"),
        logo: row.get("logo"),
        usd_value: row.get("usd_value"),
        hash: row.get("hash"),
        extrinsic_id: row.get("extrinsic_id"),
    }
}

fn bridge_from_row(row: &Row) -> BridgeEvent {
    let direction: String = row.get("direction");
    BridgeEvent {
        timestamp: row.get("timestamp"),
        block: row.get("block"),
        network: row.get("network"),
        direction: BridgeDirection::from_db(&direction),
        sender: row.get("sender"),
        recipient: row.get("recipient"),
        asset_id: row.get("asset_id"),
        symbol: row.get("symbol"),
        logo: row.get("logo"),
        amount: row.get("amount"),
        usd_value: row.get("usd_value"),
        hash: row.get("hash"),
        extrinsic_id: row.get("extrinsic_id"),
    }
}

fn liquidity_from_row(row: &Row) -> LiquidityEvent {
    let kind: String = row.get("type");
    LiquidityEvent {
        timestamp: row.get("timestamp"),
        block: row.get("block"),
        wallet: row.get("wallet"),
        pool_base: row.get("pool_base"),
        pool_target: row.get("pool_target"),
        base_amount: row.get("base_amount"),
        target_amount: row.get("target_amount"),
        usd_value: row.get("usd_value"),
        kind: LiquidityKind::from_db(&kind),
        hash: row.get("hash"),
        extrinsic_id: row.get("extrinsic_id"),
    }
}

#[async_trait]
impl EventStore for PostgresClient {
    // ==================== INSERTS ====================

    async fn insert_swap(&self, swap: &SwapEvent) -> anyhow::Result<()> {
        let client = self.pool.get().await?;
        let query = r#"
            INSERT INTO swaps (
                timestamp, block, wallet,
                in_asset_id, in_symbol, in_amount, in_logo, in_usd,
                out_asset_id, out_symbol, out_amount, out_logo, out_usd,
                hash, extrinsic_id
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
        "#;

        client
            .execute(
                query,
                &[
                    &swap.timestamp,
                    &swap.block,
                    &sanitize_string(&swap.wallet),
                    &swap.in_asset_id,
                    &sanitize_string(&swap.in_symbol),
                    &swap.in_amount,
                    &swap.in_logo,
                    &swap.in_usd,
                    &swap.out_asset_id,
                    &sanitize_string(&swap.out_symbol),
                    &swap.out_amount,
                    &swap.out_logo,
                    &swap.out_usd,
                    &swap.hash,
                    &swap.extrinsic_id,
                ],
            )
            .await
            .map_err(|e| {
                error!("[{}] Failed to insert swap {}: {:?}", self.label, swap.extrinsic_id, e);
                e
            })?;

        Ok(())
    }

    async fn insert_transfer(&self, transfer: &TransferEvent) -> anyhow::Result<()> {
        let client = self.pool.get().await?;
        let query = r#"
            INSERT INTO transfers (
                timestamp, block, from_addr, to_addr, amount,
                asset_id, symbol, logo, usd_value, hash, extrinsic_id
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
        "#;

        client
            .execute(
                query,
                &[
                    &transfer.timestamp,
                    &transfer.block,
                    &sanitize_string(&transfer.from),
                    &sanitize_string(&transfer.to),
                    &transfer.amount,
                    &transfer.asset_id,
                    &sanitize_string(&transfer.symbol),
                    &transfer.logo,
                    &transfer.usd_value,
                    &transfer.hash,
                    &transfer.extrinsic_id,
                ],
            )
            .await
            .map_err(|e| {
                error!("[{}] Failed to insert transfer {}: {:?}", self.label, transfer.extrinsic_id, e);
                e
            })?;

        Ok(())
    }

    async fn insert_bridge(&self, bridge: &BridgeEvent) -> anyhow::Result<()> {
        let client = self.pool.get().await?;
        let query = r#"
            INSERT INTO bridges (
                timestamp, block, network, direction, sender, recipient,
                asset_id, symbol, logo, amount, usd_value, hash, extrinsic_id
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
        "#;

        client
            .execute(
                query,
                &[
                    &bridge.timestamp,
                    &bridge.block,
                    &bridge.network,
                    &bridge.direction.as_str(),
                    &sanitize_string(&bridge.sender),
                    &sanitize_string(&bridge.recipient),
                    &bridge.asset_id,
                    &sanitize_string(&bridge.symbol),
                    &bridge.logo,
                    &bridge.amount,
                    &bridge.usd_value,
                    &bridge.hash,
                    &bridge.extrinsic_id,
                ],
            )
            .await
            .map_err(|e| {
                error!("[{}] Failed to insert bridge {}: {:?}", self.label, bridge.hash, e);
                e
            })?;

        Ok(())
    }

    async fn insert_liquidity(&self, event: &LiquidityEvent) -> anyhow::Result<()> {
        let client = self.pool.get().await?;
        let query = r#"
            INSERT INTO liquidity_events (
                timestamp, block, wallet, pool_base, pool_target,
                base_amount, target_amount, usd_value, type, hash, extrinsic_id
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
        "#;

        client
            .execute(
                query,
                &[
                    &event.timestamp,
                    &event.block,
                    &sanitize_string(&event.wallet),
                    &sanitize_string(&event.pool_base),
                    &sanitize_string(&event.pool_target),
                    &event.base_amount,
                    &event.target_amount,
                    &event.usd_value,
                    &event.kind.as_str(),
                    &event.hash,
                    &event.extrinsic_id,
                ],
            )
            .await
            .map_err(|e| {
                error!("[{}] Failed to insert liquidity event {}: {:?}", self.label, event.extrinsic_id, e);
                e
            })?;

        Ok(())
    }

    async fn insert_fee(&self, fee: &FeeEvent) -> anyhow::Result<()> {
        let client = self.pool.get().await?;
        client
            .execute(
                "INSERT INTO fees (timestamp, block, type, amount, usd_value) VALUES ($1, $2, $3, $4, $5)",
                &[&fee.timestamp, &fee.block, &fee.kind.as_str(), &fee.amount, &fee.usd_value],
            )
            .await
            .map_err(|e| {
                error!("[{}] Failed to insert fee at #{}: {:?}", self.label, fee.block, e);
                e
            })?;

        Ok(())
    }

    // ==================== PROBES ====================

    async fn block_is_indexed(&self, block: i64) -> anyhow::Result<bool> {
        let client = self.pool.get().await?;
        let row = client
            .query_one(
                "SELECT EXISTS (SELECT 1 FROM swaps WHERE block = $1)
                     OR EXISTS (SELECT 1 FROM transfers WHERE block = $1)
                     OR EXISTS (SELECT 1 FROM bridges WHERE block = $1)
                     OR EXISTS (SELECT 1 FROM liquidity_events WHERE block = $1)
                     OR EXISTS (SELECT 1 FROM fees WHERE block = $1)",
                &[&block],
            )
            .await?;
        Ok(row.get(0))
    }

    // ==================== READS ====================

    async fn swaps(&self, query: &SwapQuery, limit: i64) -> anyhow::Result<Vec<SwapEvent>> {
        let client = self.pool.get().await?;
        let filter = swap_filter(query);
        let sql = format!(
            "SELECT * FROM swaps {} ORDER BY timestamp DESC LIMIT {}",
            filter.where_sql(),
            filter.next_placeholder()
        );

        let mut params = filter.params();
        params.push(&limit);

        let rows = client.query(sql.as_str(), &params).await?;
        Ok(rows.iter().map(swap_from_row).collect())
    }

    async fn count_swaps(&self, query: &SwapQuery) -> anyhow::Result<i64> {
        let client = self.pool.get().await?;
        let filter = swap_filter(query);
        let sql = format!("SELECT COUNT(*) AS count FROM swaps {}", filter.where_sql());
        let row = client.query_one(sql.as_str(), &filter.params()).await?;
        Ok(row.get("count"))
    }

    async fn transfers(
        &self,
        query: &TransferQuery,
        limit: i64,
    ) -> anyhow::Result<Vec<TransferEvent>> {
        let client = self.pool.get().await?;
        let filter = transfer_filter(query);
        let sql = format!(
            "SELECT * FROM transfers {} ORDER BY timestamp DESC LIMIT {}",
            filter.where_sql(),
            filter.next_placeholder()
        );

        let mut params = filter.params();
        params.push(&limit);

        let rows = client.query(sql.as_str(), &params).await?;
        Ok(rows.iter().map(transfer_from_row).collect())
    }

    async fn count_transfers(&self, query: &TransferQuery) -> anyhow::Result<i64> {
        let client = self.pool.get().await?;
        let filter = transfer_filter(query);
        let sql = format!("SELECT COUNT(*) AS count FROM transfers {}", filter.where_sql());
        let row = client.query_one(sql.as_str(), &filter.params()).await?;
        Ok(row.get("count"))
    }

    async fn bridges(&self, query: &BridgeQuery, limit: i64) -> anyhow::Result<Vec<BridgeEvent>> {
        let client = self.pool.get().await?;
        let filter = bridge_filter(query);
        let sql = format!(
            "SELECT * FROM bridges {} ORDER BY timestamp DESC LIMIT {}",
            filter.where_sql(),
            filter.next_placeholder()
        );

        let mut params = filter.params();
        params.push(&limit);

        let rows = client.query(sql.as_str(), &params).await?;
        Ok(rows.iter().map(bridge_from_row).collect())
    }

    async fn count_bridges(&self, query: &BridgeQuery) -> anyhow::Result<i64> {
        let client = self.pool.get().await?;
        let filter = bridge_filter(query);
        let sql = format!("SELECT COUNT(*) AS count FROM bridges {}", filter.where_sql());
        let row = client.query_one(sql.as_str(), &filter.params()).await?;
        Ok(row.get("count"))
    }

    async fn pool_activity(
        &self,
        base: &str,
        target: &str,
        limit: i64,
    ) -> anyhow::Result<Vec<LiquidityEvent>> {
        let client = self.pool.get().await?;
        let rows = client
            .query(
                r#"
                SELECT * FROM liquidity_events
                WHERE pool_base = $1 AND pool_target = $2
                ORDER BY timestamp DESC
                LIMIT $3
                "#,
                &[&base, &target, &limit],
            )
            .await?;
        Ok(rows.iter().map(liquidity_from_row).collect())
    }

    async fn fee_summary(&self, since: i64) -> anyhow::Result<Vec<FeeSummary>> {
        let client = self.pool.get().await?;
        let rows = client
            .query(
                r#"
                SELECT
                    type,
                    COUNT(*) AS count,
                    COALESCE(SUM(amount::DOUBLE PRECISION), 0) AS total_amount,
                    COALESCE(SUM(usd_value), 0) AS total_usd
                FROM fees
                WHERE timestamp >= $1
                GROUP BY type
                "#,
                &[&since],
            )
            .await?;

        Ok(rows
            .iter()
            .map(|row| {
                let kind: String = row.get("type");
                FeeSummary {
                    kind: FeeKind::from_db(&kind),
                    count: row.get("count"),
                    total_amount: row.get("total_amount"),
                    total_usd: row.get("total_usd"),
                }
            })
            .collect())
    }

    // ==================== RETENTION ====================

    async fn prune_before(&self, timestamp: i64) -> anyhow::Result<u64> {
        let client = self.pool.get().await?;
        let mut removed = 0;
        for table in ["swaps", "transfers", "bridges", "liquidity_events", "fees"] {
            let sql = format!("DELETE FROM {} WHERE timestamp < $1", table);
            removed += client.execute(sql.as_str(), &[&timestamp]).await?;
        }
        Ok(removed)
    }
}
