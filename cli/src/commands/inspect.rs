//! Diagnostic snapshot command.

use clap::Args;

use pgdba::inspect::{collect, SamplingConfig, SamplingMode};
use pgdba::output::Response;
use pgdba::postgres;

use super::{resolve_pg_config, Ctx};

#[derive(Args)]
pub struct InspectArgs {
    /// Cluster name (resolves connection settings from the registry)
    #[arg(long, default_value = "")]
    name: String,

    /// Enable delta sampling mode
    #[arg(long)]
    delta: bool,

    /// Sampling interval in seconds for delta mode
    #[arg(long, default_value_t = 30)]
    interval: u64,
}

pub async fn execute(args: InspectArgs, ctx: &Ctx) -> Response {
    const CMD: &str = "inspect";

    let pg = match resolve_pg_config(ctx, &args.name) {
        Ok(pg) => pg,
        Err(e) => return Response::failure(CMD, e),
    };
    let db = match postgres::connect(&pg).await {
        Ok(db) => db,
        Err(e) => return Response::failure(CMD, e),
    };

    let sampling = SamplingConfig {
        mode: if args.delta {
            SamplingMode::Delta
        } else {
            SamplingMode::Instant
        },
        interval: std::time::Duration::from_secs(args.interval),
    };

    match collect(&db, sampling, &pg.host, pg.port as i32).await {
        Ok(snap) => Response::success(CMD, snap),
        Err(e) => Response::failure(CMD, format!("collect snapshot: {e}")),
    }
}
