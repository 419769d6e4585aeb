//! pgdba CLI - virtual DBA for Patroni-managed PostgreSQL clusters.
//!
//! Every command writes exactly one response envelope: stdout and exit 0 on
//! success, stderr and exit 1 on failure. Nothing else reaches those
//! streams, so any invocation is machine-parseable.

use clap::{Parser, Subcommand};

use pgdba::config::Config;
use pgdba::output::{self, Format, Response};

mod commands;

use commands::{baseline, cluster, config as config_cmd, failover, health, inspect, query, replica, Ctx};

/// pgdba - PostgreSQL virtual DBA expert system
#[derive(Parser)]
#[command(name = "pgdba")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Configuration file path
    #[arg(long, env = "PGDBA_CONFIG", global = true)]
    config: Option<String>,

    /// Output format (json, table, yaml)
    #[arg(long, default_value = "json", global = true)]
    format: String,

    /// Enable verbose logging to stderr
    #[arg(long, global = true)]
    verbose: bool,

    /// Infrastructure provider (docker, baremetal, kubernetes)
    #[arg(long, default_value = "docker", global = true)]
    provider: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Cluster lifecycle management (status, connect, init, destroy)
    Cluster(cluster::ClusterArgs),

    /// Trigger or inspect a cluster failover / switchover
    Failover(failover::FailoverArgs),

    /// Manage cluster replicas (list, promote)
    Replica(replica::ReplicaArgs),

    /// Health-check the configured PostgreSQL instance
    Health(health::HealthArgs),

    /// Collect a diagnostic snapshot of the PostgreSQL instance
    Inspect(inspect::InspectArgs),

    /// Generate a baseline report or compare two snapshots
    Baseline(baseline::BaselineArgs),

    /// Manage PostgreSQL configuration (show, diff, tune)
    Config(config_cmd::ConfigArgs),

    /// Query analysis (top, analyze, index-suggest, locks, bloat, vacuum-health)
    Query(query::QueryArgs),

    /// Generate shell completions
    Completion {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

impl Commands {
    /// The command label carried in the envelope, also used for failures
    /// that occur before the subcommand runs.
    fn label(&self) -> &'static str {
        match self {
            Commands::Cluster(_) => "cluster",
            Commands::Failover(_) => "failover",
            Commands::Replica(_) => "replica",
            Commands::Health(_) => "health",
            Commands::Inspect(_) => "inspect",
            Commands::Baseline(_) => "baseline",
            Commands::Config(_) => "config",
            Commands::Query(_) => "query",
            Commands::Completion { .. } => "completion",
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if cli.verbose {
        use tracing_subscriber::EnvFilter;
        tracing_subscriber::fmt()
            .with_writer(std::io::stderr)
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("pgdba=debug")),
            )
            .init();
    }

    // An unknown format cannot be rendered in itself; report it as JSON.
    let format = match cli.format.parse::<Format>() {
        Ok(f) => f,
        Err(e) => emit(Response::failure(cli.command.label(), e), Format::Json),
    };

    if let Commands::Completion { shell } = &cli.command {
        let mut cmd = <Cli as clap::CommandFactory>::command();
        clap_complete::generate(*shell, &mut cmd, "pgdba", &mut std::io::stdout());
        std::process::exit(0);
    }

    let label = cli.command.label();
    let ctx = match build_context(&cli) {
        Ok(ctx) => ctx,
        Err(e) => emit(Response::failure(label, e), format),
    };

    let resp = match cli.command {
        Commands::Cluster(args) => cluster::execute(args, &ctx).await,
        Commands::Failover(args) => failover::execute(args, &ctx).await,
        Commands::Replica(args) => replica::execute(args, &ctx).await,
        Commands::Health(args) => health::execute(args, &ctx).await,
        Commands::Inspect(args) => inspect::execute(args, &ctx).await,
        Commands::Baseline(args) => baseline::execute(args, &ctx).await,
        Commands::Config(args) => config_cmd::execute(args, &ctx).await,
        Commands::Query(args) => query::execute(args, &ctx).await,
        Commands::Completion { .. } => unreachable!("handled above"),
    };

    emit(resp, format)
}

fn build_context(cli: &Cli) -> anyhow::Result<Ctx> {
    let cfg = Config::load(cli.config.as_deref())?;
    let registry = pgdba::cluster::Registry::default_location()?;
    Ok(Ctx {
        cfg,
        registry,
        provider: cli.provider.clone(),
    })
}

/// Print the envelope to the stream its outcome dictates and exit.
fn emit(resp: Response, format: Format) -> ! {
    let success = resp.success;
    let rendered = output::render(&resp, format)
        .unwrap_or_else(|e| format!("{{\"success\":false,\"error\":\"render: {e}\"}}"));
    if success {
        println!("{rendered}");
        std::process::exit(0);
    }
    eprintln!("{rendered}");
    std::process::exit(1);
}
