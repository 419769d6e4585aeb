//! Health check command.

use clap::{Args, Subcommand};

use pgdba::health::run_health_check;
use pgdba::output::Response;
use pgdba::postgres;

use super::{resolve_pg_config, Ctx};

#[derive(Args)]
pub struct HealthArgs {
    #[command(subcommand)]
    command: HealthCommands,
}

#[derive(Subcommand)]
enum HealthCommands {
    /// Run a comprehensive health check against the configured instance
    Check {
        /// Cluster name (resolves connection settings from the registry)
        #[arg(long, default_value = "")]
        name: String,
    },
}

pub async fn execute(args: HealthArgs, ctx: &Ctx) -> Response {
    match args.command {
        HealthCommands::Check { name } => check(ctx, &name).await,
    }
}

async fn check(ctx: &Ctx, name: &str) -> Response {
    const CMD: &str = "health check";

    let pg = match resolve_pg_config(ctx, name) {
        Ok(pg) => pg,
        Err(e) => return Response::failure(CMD, e),
    };
    let db = match postgres::connect(&pg).await {
        Ok(db) => db,
        Err(e) => return Response::failure(CMD, e),
    };
    match run_health_check(&db).await {
        Ok(result) => Response::success(CMD, result),
        Err(e) => Response::failure(CMD, e),
    }
}
