//! Instance health check.
//!
//! A quick aggregate over version, uptime, connection pressure, and
//! replication fan-out. The standby count intentionally degrades to zero
//! when the role lacks replication privileges; everything else is fatal.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::Result;
use crate::inspect::PgDb;

/// Aggregated health information for a PostgreSQL instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheckResult {
    pub pg_version: String,
    pub uptime_seconds: f64,
    pub connections: ConnectionStats,
    pub replication: ReplicationStats,
    pub healthy: bool,
}

/// Current and maximum connection counts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionStats {
    pub current: i32,
    pub max: i32,
}

/// High-availability replication metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplicationStats {
    pub standby_count: i32,
}

/// The queries the health check needs.
#[async_trait]
pub trait HealthDb: Send + Sync {
    async fn version(&self) -> Result<String>;
    async fn uptime_seconds(&self) -> Result<f64>;
    /// `(current, max)` connection counts.
    async fn connection_counts(&self) -> Result<(i32, i32)>;
    async fn standby_count(&self) -> Result<i32>;
}

/// Run the health check. Only the standby-count query may fail without
/// failing the check; it reports zero standbys instead.
pub async fn run_health_check(db: &dyn HealthDb) -> Result<HealthCheckResult> {
    let pg_version = db.version().await?;
    let uptime_seconds = db.uptime_seconds().await?;
    let (current, max) = db.connection_counts().await?;

    let standby_count = match db.standby_count().await {
        Ok(n) => n,
        Err(e) => {
            debug!(error = %e, "pg_stat_replication unavailable, reporting zero standbys");
            0
        }
    };

    Ok(HealthCheckResult {
        pg_version,
        uptime_seconds,
        connections: ConnectionStats { current, max },
        replication: ReplicationStats { standby_count },
        healthy: true,
    })
}

#[async_trait]
impl HealthDb for PgDb {
    async fn version(&self) -> Result<String> {
        let row = self.client().query_one("SELECT version()", &[]).await?;
        Ok(row.get(0))
    }

    async fn uptime_seconds(&self) -> Result<f64> {
        let row = self
            .client()
            .query_one(
                "SELECT EXTRACT(EPOCH FROM (now() - pg_postmaster_start_time()))::float8",
                &[],
            )
            .await?;
        Ok(row.get(0))
    }

    async fn connection_counts(&self) -> Result<(i32, i32)> {
        let row = self
            .client()
            .query_one(
                "SELECT count(*)::int, \
                        (SELECT setting::int FROM pg_settings WHERE name='max_connections') \
                 FROM pg_stat_activity",
                &[],
            )
            .await?;
        Ok((row.get(0), row.get(1)))
    }

    async fn standby_count(&self) -> Result<i32> {
        let row = self
            .client()
            .query_one("SELECT count(*)::int FROM pg_stat_replication", &[])
            .await?;
        Ok(row.get(0))
    }
}
