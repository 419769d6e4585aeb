//! Cluster lifecycle commands.

use clap::{Args, Subcommand};
use serde::{Deserialize, Serialize};

use pgdba::cluster::{Entry, Source};
use pgdba::error::PgdbaError;
use pgdba::output::Response;
use pgdba::patroni::{Client, ClusterStatus};
use pgdba::provider::{new_provider, NodeConfig, NodeRole};

use super::{resolve_patroni_url, Ctx};

#[derive(Args)]
pub struct ClusterArgs {
    #[command(subcommand)]
    command: ClusterCommands,
}

#[derive(Subcommand)]
enum ClusterCommands {
    /// Show cluster topology from the Patroni API
    Status {
        /// Cluster name (looks up the Patroni URL from the registry)
        #[arg(long, default_value = "")]
        name: String,

        /// Patroni API URL (e.g. http://10.0.0.1:8008)
        #[arg(long, default_value = "")]
        patroni_url: String,
    },

    /// Import an existing Patroni cluster into the registry
    Connect {
        /// Cluster name to register
        #[arg(long, default_value = "")]
        name: String,

        /// Patroni REST API URL
        #[arg(long, default_value = "")]
        patroni_url: String,

        /// PostgreSQL host
        #[arg(long, default_value = "")]
        pg_host: String,

        /// PostgreSQL port
        #[arg(long, default_value_t = 5432)]
        pg_port: u16,
    },

    /// Bootstrap a new managed Patroni/PostgreSQL cluster
    Init {
        /// Cluster name
        #[arg(long, default_value = "")]
        name: String,

        /// Host for the primary node
        #[arg(long, default_value = "")]
        primary_host: String,
    },

    /// Destroy a managed cluster (refused for externally-connected clusters)
    Destroy {
        /// Cluster name
        #[arg(long, default_value = "")]
        name: String,

        /// Confirm destruction
        #[arg(long)]
        confirm: bool,
    },
}

/// Topology response data for `cluster status`.
#[derive(Debug, Serialize, Deserialize)]
pub struct ClusterStatusResult {
    pub cluster_name: String,
    pub members: Vec<MemberSummary>,
    pub primary: String,
    pub replica_count: usize,
    pub healthy: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MemberSummary {
    pub name: String,
    pub role: String,
    pub state: String,
    pub host: String,
    pub port: u16,
    pub lag: i64,
}

pub async fn execute(args: ClusterArgs, ctx: &Ctx) -> Response {
    match args.command {
        ClusterCommands::Status { name, patroni_url } => status(ctx, &name, &patroni_url).await,
        ClusterCommands::Connect {
            name,
            patroni_url,
            pg_host,
            pg_port,
        } => connect(ctx, name, patroni_url, pg_host, pg_port).await,
        ClusterCommands::Init { name, primary_host } => init(ctx, &name, &primary_host).await,
        ClusterCommands::Destroy { name, confirm } => destroy(ctx, &name, confirm),
    }
}

async fn status(ctx: &Ctx, name: &str, patroni_url: &str) -> Response {
    const CMD: &str = "cluster status";

    let url = match resolve_patroni_url(ctx, name, patroni_url) {
        Ok(url) => url,
        Err(e) => return Response::failure(CMD, e),
    };
    let client = match Client::new(url) {
        Ok(c) => c,
        Err(e) => return Response::failure(CMD, e),
    };
    match client.get_cluster_status().await {
        Ok(cs) => Response::success(CMD, build_status_result(name, &cs)),
        Err(e) => Response::failure(CMD, e),
    }
}

/// Summarize a Patroni topology: primary name, replica count, and overall
/// health (every member running).
pub fn build_status_result(name: &str, cs: &ClusterStatus) -> ClusterStatusResult {
    let mut result = ClusterStatusResult {
        cluster_name: name.to_string(),
        members: Vec::with_capacity(cs.members.len()),
        primary: String::new(),
        replica_count: 0,
        healthy: true,
    };

    for m in &cs.members {
        result.members.push(MemberSummary {
            name: m.name.clone(),
            role: m.role.clone(),
            state: m.state.clone(),
            host: m.host.clone(),
            port: m.port,
            lag: m.lag,
        });
        if m.is_primary() {
            result.primary = m.name.clone();
        } else {
            result.replica_count += 1;
        }
        if !m.is_running() {
            result.healthy = false;
        }
    }

    result
}

async fn connect(
    ctx: &Ctx,
    name: String,
    patroni_url: String,
    pg_host: String,
    pg_port: u16,
) -> Response {
    const CMD: &str = "cluster connect";

    if name.is_empty() {
        return Response::failure(CMD, PgdbaError::Validation("--name is required".into()));
    }
    if patroni_url.is_empty() {
        return Response::failure(CMD, PgdbaError::Validation("--patroni-url is required".into()));
    }
    if pg_host.is_empty() {
        return Response::failure(CMD, PgdbaError::Validation("--pg-host is required".into()));
    }

    // Pre-flight: verify Patroni is reachable before recording anything.
    let client = match Client::new(patroni_url.clone()) {
        Ok(c) => c,
        Err(e) => return Response::failure(CMD, e),
    };
    if let Err(e) = client.get_cluster_status().await {
        return Response::failure(CMD, format!("Patroni unreachable at {patroni_url}: {e}"));
    }

    let entry = Entry {
        name: name.clone(),
        patroni_url,
        pg_host,
        pg_port,
        provider: ctx.provider.clone(),
        source: Source::External,
        created_at: chrono::Utc::now(),
        labels: None,
    };
    if let Err(e) = ctx.registry.add(entry) {
        return Response::failure(CMD, format!("write registry: {e}"));
    }

    Response::success(
        CMD,
        serde_json::json!({
            "cluster": name,
            "status": "registered",
            "source": "external",
        }),
    )
}

async fn init(ctx: &Ctx, name: &str, primary_host: &str) -> Response {
    const CMD: &str = "cluster init";

    if name.is_empty() {
        return Response::failure(CMD, PgdbaError::Validation("--name is required".into()));
    }
    if primary_host.is_empty() {
        return Response::failure(
            CMD,
            PgdbaError::Validation("--primary-host is required".into()),
        );
    }

    let provider = match new_provider(&ctx.provider) {
        Ok(p) => p,
        Err(e) => return Response::failure(CMD, e),
    };
    let node = NodeConfig {
        name: format!("{name}-primary"),
        role: NodeRole::Primary,
        host: primary_host.to_string(),
        data_dir: format!("/var/lib/postgresql/{name}"),
        port: 5432,
        labels: None,
    };
    // Provisioning is declared but not implemented on any backend yet.
    match provider.create_node(node).await {
        Ok(status) => Response::success(CMD, status),
        Err(e) => Response::failure(CMD, e),
    }
}

/// Destroy a managed cluster. Clusters imported with `cluster connect` are
/// never destroyed; that refusal is a safety check, not a hint.
pub fn destroy(ctx: &Ctx, name: &str, confirm: bool) -> Response {
    const CMD: &str = "cluster destroy";

    if !confirm {
        return Response::failure(
            CMD,
            PgdbaError::Validation("--confirm flag is required to destroy a cluster".into()),
        );
    }

    let entry = match ctx.registry.get(name) {
        Ok(e) => e,
        Err(e) => return Response::failure(CMD, e),
    };

    if entry.source == Source::External {
        return Response::failure(
            CMD,
            format!(
                "cluster {name:?} was registered with 'cluster connect' and is not managed by pgdba; refusing to destroy"
            ),
        );
    }

    if let Err(e) = ctx.registry.remove(name) {
        return Response::failure(CMD, format!("remove from registry: {e}"));
    }

    Response::success(
        CMD,
        serde_json::json!({
            "cluster": name,
            "status": "destroyed",
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::testutil::*;

    fn members_fixture() -> ClusterStatus {
        serde_json::from_str(
            r#"{
                "members": [
                    {"name":"pg-primary","role":"leader","state":"running","host":"10.0.0.1","port":5432},
                    {"name":"pg-replica-1","role":"replica","state":"running","host":"10.0.0.2","port":5432,"lag":512},
                    {"name":"pg-replica-2","role":"replica","state":"running","host":"10.0.0.3","port":5432,"lag":1024}
                ],
                "pause": false
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn test_status_result_round_trip() {
        let result = build_status_result("prod", &members_fixture());

        assert_eq!(result.primary, "pg-primary");
        assert_eq!(result.replica_count, 2);
        assert!(result.healthy);
        let lags: Vec<i64> = result.members.iter().map(|m| m.lag).collect();
        assert_eq!(lags, vec![0, 512, 1024]);
    }

    #[test]
    fn test_status_result_unhealthy_when_member_stopped() {
        let mut cs = members_fixture();
        cs.members[2].state = "stopped".into();
        let result = build_status_result("prod", &cs);
        assert!(!result.healthy);
        assert_eq!(result.replica_count, 2);
    }

    #[test]
    fn test_status_result_legacy_master_role() {
        let mut cs = members_fixture();
        cs.members[0].role = "master".into();
        let result = build_status_result("prod", &cs);
        assert_eq!(result.primary, "pg-primary");
    }

    #[test]
    fn test_destroy_refuses_external_cluster() {
        let (ctx, _dir) = ctx_with_registry(vec![external_entry("ext", "http://10.0.0.1:8008")]);

        let resp = destroy(&ctx, "ext", true);
        assert!(!resp.success);
        let msg = resp.error.unwrap();
        assert!(msg.contains("connect"), "got: {msg}");
        assert!(msg.contains("ext"));

        // Registry unchanged.
        assert!(ctx.registry.get("ext").is_ok());
    }

    #[test]
    fn test_destroy_requires_confirm() {
        let (ctx, _dir) = ctx_with_registry(vec![managed_entry("m", "http://10.0.0.1:8008")]);
        let resp = destroy(&ctx, "m", false);
        assert!(!resp.success);
        assert!(resp.error.unwrap().contains("--confirm"));
        assert!(ctx.registry.get("m").is_ok());
    }

    #[test]
    fn test_destroy_removes_managed_cluster() {
        let (ctx, _dir) = ctx_with_registry(vec![managed_entry("m", "http://10.0.0.1:8008")]);
        let resp = destroy(&ctx, "m", true);
        assert!(resp.success);
        assert!(ctx.registry.get("m").is_err());
    }

    #[tokio::test]
    async fn test_init_reports_unimplemented_provisioning() {
        let (ctx, _dir) = ctx_with_registry(vec![]);
        let resp = init(&ctx, "prod", "10.0.0.1").await;
        assert!(!resp.success);
        assert!(resp.error.unwrap().contains("not implemented"));
    }

    #[tokio::test]
    async fn test_init_validates_flags_first() {
        let (ctx, _dir) = ctx_with_registry(vec![]);
        let resp = init(&ctx, "", "10.0.0.1").await;
        assert!(!resp.success);
        assert!(resp.error.unwrap().contains("--name"));
    }

    #[test]
    fn test_destroy_unknown_cluster() {
        let (ctx, _dir) = ctx_with_registry(vec![]);
        let resp = destroy(&ctx, "ghost", true);
        assert!(!resp.success);
        assert!(resp.error.unwrap().contains("ghost"));
    }
}
