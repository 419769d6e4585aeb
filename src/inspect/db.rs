//! Database capability abstraction for the collector.
//!
//! [`InspectDb`] is the narrow seam the collector runs over: production
//! code passes [`PgDb`] (a thin adapter over `tokio_postgres::Client`),
//! tests pass an in-memory fake. Queries are issued strictly one at a time
//! on the single underlying connection.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{PgdbaError, Result};

/// A row from `pg_settings`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PgSetting {
    pub name: String,
    pub setting: String,
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub unit: String,
    pub context: String,
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub vartype: String,
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub source: String,
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub min_val: String,
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub max_val: String,
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub boot_val: String,
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub reset_val: String,
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub source_file: String,
    #[serde(default)]
    pub source_line: i32,
}

/// A row from `pg_stat_statements`, ordered by total execution time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatStatementsRow {
    pub queryid: i64,
    pub query: String,
    pub calls: i64,
    pub total_time_ms: f64,
    pub mean_time_ms: f64,
    pub rows: i64,
    pub min_time_ms: f64,
    pub max_time_ms: f64,
}

/// A row from `pg_stat_activity` (excluding the collector's own backend).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityRow {
    pub pid: i32,
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub state: String,
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub query: String,
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub wait_event_type: String,
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub wait_event: String,
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub backend_type: String,
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub datname: String,
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub usename: String,
}

/// Checkpointer and background-writer counters from `pg_stat_bgwriter`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BgWriterStats {
    pub checkpoints_timed: i64,
    pub checkpoints_req: i64,
    pub buffers_checkpoint: i64,
    pub buffers_clean: i64,
    pub buffers_backend: i64,
}

/// WAL generation counters from `pg_stat_wal` (PG 14+).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WalStats {
    pub wal_records: i64,
    pub wal_bytes: i64,
    pub wal_fpi: i64,
    pub wal_buffers_full: i64,
    pub wal_write: i64,
    pub wal_sync: i64,
}

/// The PostgreSQL queries the collector needs.
#[async_trait]
pub trait InspectDb: Send + Sync {
    async fn server_version_num(&self) -> Result<i32>;
    async fn pg_settings(&self) -> Result<Vec<PgSetting>>;
    async fn system_identifier(&self) -> Result<String>;
    /// Resolved bound address and port; both empty/zero when the connection
    /// is local (Unix socket).
    async fn resolved_addr(&self) -> Result<(String, i32)>;
    async fn current_datid(&self) -> Result<u32>;
    async fn extension_loaded(&self, name: &str) -> Result<bool>;
    async fn stat_statements(&self, limit: i64) -> Result<Vec<StatStatementsRow>>;
    async fn stat_activity(&self) -> Result<Vec<ActivityRow>>;
    async fn stat_bgwriter(&self) -> Result<BgWriterStats>;
    async fn stat_wal(&self) -> Result<WalStats>;
}

/// [`InspectDb`] implementation over a live `tokio_postgres` connection.
#[derive(Debug)]
pub struct PgDb {
    client: tokio_postgres::Client,
}

impl PgDb {
    pub fn new(client: tokio_postgres::Client) -> Self {
        Self { client }
    }

    /// Access to the underlying client for one-off queries outside the
    /// collector's surface (EXPLAIN, catalog lookups).
    pub fn client(&self) -> &tokio_postgres::Client {
        &self.client
    }
}

#[async_trait]
impl InspectDb for PgDb {
    async fn server_version_num(&self) -> Result<i32> {
        let row = self.client.query_one("SHOW server_version_num", &[]).await?;
        let raw: String = row.get(0);
        raw.parse::<i32>()
            .map_err(|e| PgdbaError::Protocol(format!("server_version_num {raw:?}: {e}")))
    }

    async fn pg_settings(&self) -> Result<Vec<PgSetting>> {
        let rows = self
            .client
            .query(
                "SELECT name, setting, COALESCE(unit,''), context, COALESCE(vartype,''), \
                        COALESCE(source,''), COALESCE(min_val,''), COALESCE(max_val,''), \
                        COALESCE(boot_val,''), COALESCE(reset_val,''), \
                        COALESCE(sourcefile,''), COALESCE(sourceline,0) \
                 FROM pg_settings ORDER BY name",
                &[],
            )
            .await?;
        Ok(rows
            .into_iter()
            .map(|r| PgSetting {
                name: r.get(0),
                setting: r.get(1),
                unit: r.get(2),
                context: r.get(3),
                vartype: r.get(4),
                source: r.get(5),
                min_val: r.get(6),
                max_val: r.get(7),
                boot_val: r.get(8),
                reset_val: r.get(9),
                source_file: r.get(10),
                source_line: r.get(11),
            })
            .collect())
    }

    async fn system_identifier(&self) -> Result<String> {
        let row = self
            .client
            .query_one(
                "SELECT system_identifier::text FROM pg_control_system()",
                &[],
            )
            .await?;
        Ok(row.get(0))
    }

    async fn resolved_addr(&self) -> Result<(String, i32)> {
        let row = self
            .client
            .query_one(
                "SELECT COALESCE(inet_server_addr()::text,''), COALESCE(inet_server_port(),0)",
                &[],
            )
            .await?;
        Ok((row.get(0), row.get(1)))
    }

    async fn current_datid(&self) -> Result<u32> {
        let row = self
            .client
            .query_one(
                "SELECT d.oid FROM pg_stat_activity a \
                 JOIN pg_database d ON d.datname = a.datname \
                 WHERE a.pid = pg_backend_pid()",
                &[],
            )
            .await?;
        Ok(row.get(0))
    }

    async fn extension_loaded(&self, name: &str) -> Result<bool> {
        let row = self
            .client
            .query_one("SELECT count(*) FROM pg_extension WHERE extname = $1", &[&name])
            .await?;
        let count: i64 = row.get(0);
        Ok(count > 0)
    }

    async fn stat_statements(&self, limit: i64) -> Result<Vec<StatStatementsRow>> {
        let rows = self
            .client
            .query(
                "SELECT queryid, query, calls, total_exec_time, mean_exec_time, rows, \
                        min_exec_time, max_exec_time \
                 FROM pg_stat_statements \
                 ORDER BY total_exec_time DESC \
                 LIMIT $1",
                &[&limit],
            )
            .await?;
        Ok(rows
            .into_iter()
            .map(|r| StatStatementsRow {
                queryid: r.get(0),
                query: r.get(1),
                calls: r.get(2),
                total_time_ms: r.get(3),
                mean_time_ms: r.get(4),
                rows: r.get(5),
                min_time_ms: r.get(6),
                max_time_ms: r.get(7),
            })
            .collect())
    }

    async fn stat_activity(&self) -> Result<Vec<ActivityRow>> {
        let rows = self
            .client
            .query(
                "SELECT pid, COALESCE(state,''), COALESCE(query,''), \
                        COALESCE(wait_event_type,''), COALESCE(wait_event,''), \
                        COALESCE(backend_type,''), COALESCE(datname,''), COALESCE(usename,'') \
                 FROM pg_stat_activity \
                 WHERE pid <> pg_backend_pid() \
                 ORDER BY state, pid",
                &[],
            )
            .await?;
        Ok(rows
            .into_iter()
            .map(|r| ActivityRow {
                pid: r.get(0),
                state: r.get(1),
                query: r.get(2),
                wait_event_type: r.get(3),
                wait_event: r.get(4),
                backend_type: r.get(5),
                datname: r.get(6),
                usename: r.get(7),
            })
            .collect())
    }

    async fn stat_bgwriter(&self) -> Result<BgWriterStats> {
        let row = self
            .client
            .query_one(
                "SELECT checkpoints_timed, checkpoints_req, \
                        buffers_checkpoint, buffers_clean, buffers_backend \
                 FROM pg_stat_bgwriter",
                &[],
            )
            .await?;
        Ok(BgWriterStats {
            checkpoints_timed: row.get(0),
            checkpoints_req: row.get(1),
            buffers_checkpoint: row.get(2),
            buffers_clean: row.get(3),
            buffers_backend: row.get(4),
        })
    }

    async fn stat_wal(&self) -> Result<WalStats> {
        let row = self
            .client
            .query_one(
                "SELECT wal_records, wal_bytes::bigint, wal_fpi, wal_buffers_full, wal_write, wal_sync \
                 FROM pg_stat_wal",
                &[],
            )
            .await?;
        Ok(WalStats {
            wal_records: row.get(0),
            wal_bytes: row.get(1),
            wal_fpi: row.get(2),
            wal_buffers_full: row.get(3),
            wal_write: row.get(4),
            wal_sync: row.get(5),
        })
    }
}
