//! Query-level analysis: top statements, lock chains, bloat, vacuum health,
//! and missing-index suggestions.
//!
//! The SQL lives on [`PgDb`]; the analysis functions are pure so they can
//! be tested against synthetic catalog stats.

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::inspect::PgDb;

/// A lock with wait-chain information from `pg_locks`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockInfo {
    pub pid: i32,
    pub mode: String,
    pub granted: bool,
    pub relation: String,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub waiting_pids: Vec<i32>,
}

/// A lock dependency chain rooted at a blocking PID.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockChain {
    pub root_pid: i32,
    pub mode: String,
    pub relation: String,
    pub waiting_pids: Vec<i32>,
}

/// Bloat estimation for a single table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableBloat {
    pub schema: String,
    pub table: String,
    pub table_bytes: i64,
    pub bloat_bytes: i64,
    pub bloat_ratio: f64,
}

/// Vacuum status for a table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VacuumHealth {
    pub schema: String,
    pub table: String,
    pub dead_tuples: i64,
    pub live_tuples: i64,
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub last_vacuum: String,
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub last_autovacuum: String,
    pub autovacuum_count: i64,
}

impl VacuumHealth {
    /// Ratio of dead tuples to all tuples; 0 for an empty table.
    pub fn dead_tuple_ratio(&self) -> f64 {
        let total = self.live_tuples + self.dead_tuples;
        if total == 0 {
            return 0.0;
        }
        self.dead_tuples as f64 / total as f64
    }
}

/// `pg_stat_user_tables` data relevant to index suggestions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableStat {
    pub schema: String,
    pub table: String,
    pub seq_scan: i64,
    pub seq_tup_read: i64,
    pub idx_scan: i64,
    pub n_live_tup: i64,
}

/// A missing-index recommendation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexSuggestion {
    pub schema: String,
    pub table: String,
    pub reason: String,
    pub seq_scan: i64,
    pub n_live_tup: i64,
}

/// Analyze table statistics and return index suggestions. Tables with fewer
/// than `min_rows` live tuples are skipped: indexing a tiny table buys
/// nothing and costs write amplification.
pub fn suggest_indexes(stats: &[TableStat], min_rows: i64) -> Vec<IndexSuggestion> {
    let mut suggestions = Vec::new();

    for s in stats {
        if s.n_live_tup < min_rows {
            continue;
        }
        // Sequential scans dominating index scans suggest a missing index.
        if s.seq_scan > 100 && (s.idx_scan == 0 || s.seq_scan > s.idx_scan * 10) {
            suggestions.push(IndexSuggestion {
                schema: s.schema.clone(),
                table: s.table.clone(),
                seq_scan: s.seq_scan,
                n_live_tup: s.n_live_tup,
                reason: format!(
                    "High sequential scan count ({}) with {} live tuples. \
                     Consider adding indexes on frequently queried columns.",
                    s.seq_scan, s.n_live_tup
                ),
            });
        }
    }

    suggestions
}

/// Group locks into dependency chains rooted at blocking PIDs.
pub fn build_lock_chains(locks: &[LockInfo]) -> Vec<LockChain> {
    locks
        .iter()
        .filter(|l| l.granted && !l.waiting_pids.is_empty())
        .map(|l| LockChain {
            root_pid: l.pid,
            mode: l.mode.clone(),
            relation: l.relation.clone(),
            waiting_pids: l.waiting_pids.clone(),
        })
        .collect()
}

impl PgDb {
    /// Table statistics for index suggestions, optionally narrowed to one
    /// table, ordered by sequential scan count.
    pub async fn table_stats(&self, table: Option<&str>) -> Result<Vec<TableStat>> {
        const BASE: &str = "SELECT schemaname, relname, \
                            COALESCE(seq_scan,0), COALESCE(seq_tup_read,0), \
                            COALESCE(idx_scan,0), COALESCE(n_live_tup,0) \
                            FROM pg_stat_user_tables";
        let rows = match table {
            Some(t) => {
                let sql = format!("{BASE} WHERE relname = $1 ORDER BY seq_scan DESC");
                self.client().query(sql.as_str(), &[&t]).await?
            }
            None => {
                let sql = format!("{BASE} ORDER BY seq_scan DESC");
                self.client().query(sql.as_str(), &[]).await?
            }
        };
        Ok(rows
            .into_iter()
            .map(|r| TableStat {
                schema: r.get(0),
                table: r.get(1),
                seq_scan: r.get(2),
                seq_tup_read: r.get(3),
                idx_scan: r.get(4),
                n_live_tup: r.get(5),
            })
            .collect())
    }

    /// Active locks with the set of PIDs waiting behind each granted lock.
    pub async fn active_locks(&self) -> Result<Vec<LockInfo>> {
        let rows = self
            .client()
            .query(
                "SELECT l.pid, l.mode, l.granted, \
                        COALESCE(c.relname,'') AS relation, \
                        COALESCE(array_agg(bl.pid) FILTER (WHERE bl.pid IS NOT NULL), '{}') AS waiting_pids \
                 FROM pg_locks l \
                 LEFT JOIN pg_class c ON l.relation = c.oid \
                 LEFT JOIN pg_locks bl ON bl.locktype = l.locktype \
                     AND bl.database IS NOT DISTINCT FROM l.database \
                     AND bl.relation IS NOT DISTINCT FROM l.relation \
                     AND bl.page IS NOT DISTINCT FROM l.page \
                     AND bl.tuple IS NOT DISTINCT FROM l.tuple \
                     AND bl.granted = false AND l.granted = true AND bl.pid != l.pid \
                 WHERE l.pid != pg_backend_pid() \
                 GROUP BY l.pid, l.mode, l.granted, c.relname \
                 ORDER BY l.granted DESC, l.pid",
                &[],
            )
            .await?;
        Ok(rows
            .into_iter()
            .map(|r| LockInfo {
                pid: r.get(0),
                mode: r.get(1),
                granted: r.get(2),
                relation: r.get(3),
                waiting_pids: r.get(4),
            })
            .collect())
    }

    /// Coarse bloat estimation from the catalog alone; no extension needed.
    pub async fn table_bloat(&self) -> Result<Vec<TableBloat>> {
        let rows = self
            .client()
            .query(
                "SELECT schemaname, tablename, \
                        pg_total_relation_size(schemaname || '.' || tablename) AS table_bytes, \
                        GREATEST( \
                            pg_total_relation_size(schemaname || '.' || tablename) \
                            - pg_relation_size(schemaname || '.' || tablename), 0 \
                        ) AS bloat_bytes, \
                        CASE WHEN pg_total_relation_size(schemaname || '.' || tablename) > 0 \
                            THEN ROUND( \
                                (pg_total_relation_size(schemaname || '.' || tablename) \
                                 - pg_relation_size(schemaname || '.' || tablename))::numeric \
                                / pg_total_relation_size(schemaname || '.' || tablename), 4)::float8 \
                            ELSE 0 END AS bloat_ratio \
                 FROM pg_tables \
                 WHERE schemaname NOT IN ('pg_catalog', 'information_schema') \
                 ORDER BY bloat_bytes DESC \
                 LIMIT 50",
                &[],
            )
            .await?;
        Ok(rows
            .into_iter()
            .map(|r| TableBloat {
                schema: r.get(0),
                table: r.get(1),
                table_bytes: r.get(2),
                bloat_bytes: r.get(3),
                bloat_ratio: r.get(4),
            })
            .collect())
    }

    /// Vacuum status ordered by dead-tuple count.
    pub async fn vacuum_health(&self) -> Result<Vec<VacuumHealth>> {
        let rows = self
            .client()
            .query(
                "SELECT schemaname, relname, \
                        COALESCE(n_dead_tup, 0), COALESCE(n_live_tup, 0), \
                        COALESCE(last_vacuum::text, ''), COALESCE(last_autovacuum::text, ''), \
                        COALESCE(autovacuum_count, 0) \
                 FROM pg_stat_user_tables \
                 ORDER BY n_dead_tup DESC \
                 LIMIT 50",
                &[],
            )
            .await?;
        Ok(rows
            .into_iter()
            .map(|r| VacuumHealth {
                schema: r.get(0),
                table: r.get(1),
                dead_tuples: r.get(2),
                live_tuples: r.get(3),
                last_vacuum: r.get(4),
                last_autovacuum: r.get(5),
                autovacuum_count: r.get(6),
            })
            .collect())
    }

    /// `EXPLAIN (ANALYZE, BUFFERS, FORMAT JSON)` for a query, returning the
    /// plan as a JSON string.
    pub async fn explain_analyze(&self, sql: &str) -> Result<String> {
        let explain = format!("EXPLAIN (ANALYZE, BUFFERS, FORMAT JSON) {sql}");
        let row = self.client().query_one(explain.as_str(), &[]).await?;
        let plan: serde_json::Value = row.get(0);
        Ok(plan.to_string())
    }
}
