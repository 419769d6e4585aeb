//! Query analysis commands.

use clap::{Args, Subcommand};

use pgdba::error::PgdbaError;
use pgdba::inspect::{InspectDb, PgDb};
use pgdba::output::Response;
use pgdba::postgres;
use pgdba::query::{build_lock_chains, suggest_indexes};

use super::{resolve_pg_config, Ctx};

#[derive(Args)]
pub struct QueryArgs {
    #[command(subcommand)]
    command: QueryCommands,
}

#[derive(Subcommand)]
enum QueryCommands {
    /// Show top queries by resource consumption (pg_stat_statements)
    Top {
        /// Cluster name (resolves connection settings from the registry)
        #[arg(long, default_value = "")]
        name: String,

        /// Number of queries to show
        #[arg(long, default_value_t = 20)]
        limit: i64,
    },

    /// Run EXPLAIN ANALYZE on a SQL query
    Analyze {
        /// Cluster name (resolves connection settings from the registry)
        #[arg(long, default_value = "")]
        name: String,

        /// SQL query to analyze
        #[arg(long, default_value = "")]
        sql: String,
    },

    /// Suggest missing indexes based on table statistics
    IndexSuggest {
        /// Cluster name (resolves connection settings from the registry)
        #[arg(long, default_value = "")]
        name: String,

        /// Restrict the analysis to one table
        #[arg(long, default_value = "")]
        table: String,

        /// Minimum live tuples for a table to be considered
        #[arg(long, default_value_t = 10_000)]
        min_rows: i64,
    },

    /// Show active locks and wait chains
    Locks {
        /// Cluster name (resolves connection settings from the registry)
        #[arg(long, default_value = "")]
        name: String,
    },

    /// Estimate table bloat from catalog stats
    Bloat {
        /// Cluster name (resolves connection settings from the registry)
        #[arg(long, default_value = "")]
        name: String,
    },

    /// Show vacuum status, dead tuples, and autovacuum activity
    VacuumHealth {
        /// Cluster name (resolves connection settings from the registry)
        #[arg(long, default_value = "")]
        name: String,
    },
}

pub async fn execute(args: QueryArgs, ctx: &Ctx) -> Response {
    match args.command {
        QueryCommands::Top { name, limit } => top(ctx, &name, limit).await,
        QueryCommands::Analyze { name, sql } => analyze(ctx, &name, &sql).await,
        QueryCommands::IndexSuggest {
            name,
            table,
            min_rows,
        } => index_suggest(ctx, &name, &table, min_rows).await,
        QueryCommands::Locks { name } => locks(ctx, &name).await,
        QueryCommands::Bloat { name } => bloat(ctx, &name).await,
        QueryCommands::VacuumHealth { name } => vacuum_health(ctx, &name).await,
    }
}

async fn connect(ctx: &Ctx, name: &str) -> pgdba::Result<PgDb> {
    let pg = resolve_pg_config(ctx, name)?;
    postgres::connect(&pg).await
}

async fn top(ctx: &Ctx, name: &str, limit: i64) -> Response {
    const CMD: &str = "query top";

    let db = match connect(ctx, name).await {
        Ok(db) => db,
        Err(e) => return Response::failure(CMD, e),
    };

    match db.extension_loaded("pg_stat_statements").await {
        Ok(true) => {}
        Ok(false) => {
            return Response::failure(
                CMD,
                PgdbaError::Validation(
                    "pg_stat_statements extension not loaded; run: CREATE EXTENSION pg_stat_statements"
                        .into(),
                ),
            )
        }
        Err(e) => return Response::failure(CMD, e),
    }

    match db.stat_statements(limit).await {
        Ok(rows) => Response::success(
            CMD,
            serde_json::json!({
                "count": rows.len(),
                "sort_by": "total_time",
                "queries": rows,
            }),
        ),
        Err(e) => Response::failure(CMD, e),
    }
}

async fn analyze(ctx: &Ctx, name: &str, sql: &str) -> Response {
    const CMD: &str = "query analyze";

    if sql.is_empty() {
        return Response::failure(CMD, PgdbaError::Validation("--sql flag is required".into()));
    }
    let db = match connect(ctx, name).await {
        Ok(db) => db,
        Err(e) => return Response::failure(CMD, e),
    };
    match db.explain_analyze(sql).await {
        Ok(plan) => Response::success(
            CMD,
            serde_json::json!({
                "sql": sql,
                "plan": plan,
            }),
        ),
        Err(e) => Response::failure(CMD, format!("EXPLAIN failed: {e}")),
    }
}

async fn index_suggest(ctx: &Ctx, name: &str, table: &str, min_rows: i64) -> Response {
    const CMD: &str = "query index-suggest";

    let db = match connect(ctx, name).await {
        Ok(db) => db,
        Err(e) => return Response::failure(CMD, e),
    };
    let table_filter = if table.is_empty() { None } else { Some(table) };
    let stats = match db.table_stats(table_filter).await {
        Ok(s) => s,
        Err(e) => return Response::failure(CMD, e),
    };

    let suggestions = suggest_indexes(&stats, min_rows);
    Response::success(
        CMD,
        serde_json::json!({
            "tables_analyzed": stats.len(),
            "count": suggestions.len(),
            "min_rows": min_rows,
            "suggestions": suggestions,
        }),
    )
}

async fn locks(ctx: &Ctx, name: &str) -> Response {
    const CMD: &str = "query locks";

    let db = match connect(ctx, name).await {
        Ok(db) => db,
        Err(e) => return Response::failure(CMD, e),
    };
    let locks = match db.active_locks().await {
        Ok(l) => l,
        Err(e) => return Response::failure(CMD, e),
    };

    let chains = build_lock_chains(&locks);
    Response::success(
        CMD,
        serde_json::json!({
            "total_locks": locks.len(),
            "chain_count": chains.len(),
            "lock_chains": chains,
        }),
    )
}

async fn bloat(ctx: &Ctx, name: &str) -> Response {
    const CMD: &str = "query bloat";

    let db = match connect(ctx, name).await {
        Ok(db) => db,
        Err(e) => return Response::failure(CMD, e),
    };
    match db.table_bloat().await {
        Ok(tables) => Response::success(
            CMD,
            serde_json::json!({
                "count": tables.len(),
                "tables": tables,
            }),
        ),
        Err(e) => Response::failure(CMD, e),
    }
}

async fn vacuum_health(ctx: &Ctx, name: &str) -> Response {
    const CMD: &str = "query vacuum-health";

    let db = match connect(ctx, name).await {
        Ok(db) => db,
        Err(e) => return Response::failure(CMD, e),
    };
    match db.vacuum_health().await {
        Ok(tables) => Response::success(
            CMD,
            serde_json::json!({
                "count": tables.len(),
                "tables": tables,
            }),
        ),
        Err(e) => Response::failure(CMD, e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::testutil::*;

    #[tokio::test]
    async fn test_analyze_requires_sql_before_connecting() {
        let (ctx, _dir) = ctx_with_registry(vec![]);
        let resp = analyze(&ctx, "", "").await;
        assert!(!resp.success);
        assert!(resp.error.unwrap().contains("--sql"));
    }
}
