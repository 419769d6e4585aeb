//! Replica management commands.

use clap::{Args, Subcommand};
use serde::{Deserialize, Serialize};

use pgdba::error::PgdbaError;
use pgdba::failover::{check_switchover, find_primary, list_replicas, DEFAULT_MAX_LAG_BYTES};
use pgdba::output::Response;
use pgdba::patroni::Client;

use super::{resolve_patroni_url, Ctx};

#[derive(Args)]
pub struct ReplicaArgs {
    #[command(subcommand)]
    command: ReplicaCommands,
}

#[derive(Subcommand)]
enum ReplicaCommands {
    /// List all replica nodes and their replication lag
    List {
        /// Cluster name (looks up the Patroni URL from the registry)
        #[arg(long, default_value = "")]
        name: String,

        /// Patroni API URL
        #[arg(long, default_value = "")]
        patroni_url: String,
    },

    /// Promote a replica to primary via controlled switchover
    Promote {
        /// Cluster name (looks up the Patroni URL from the registry)
        #[arg(long, default_value = "")]
        name: String,

        /// Patroni API URL
        #[arg(long, default_value = "")]
        patroni_url: String,

        /// Replica node name to promote
        #[arg(long, default_value = "")]
        candidate: String,
    },
}

#[derive(Debug, Serialize, Deserialize)]
struct ReplicaRow {
    name: String,
    state: String,
    lag_bytes: i64,
    host: String,
    port: u16,
}

pub async fn execute(args: ReplicaArgs, ctx: &Ctx) -> Response {
    match args.command {
        ReplicaCommands::List { name, patroni_url } => list(ctx, &name, &patroni_url).await,
        ReplicaCommands::Promote {
            name,
            patroni_url,
            candidate,
        } => promote(ctx, &name, &patroni_url, &candidate).await,
    }
}

async fn list(ctx: &Ctx, name: &str, patroni_url: &str) -> Response {
    const CMD: &str = "replica list";

    let url = match resolve_patroni_url(ctx, name, patroni_url) {
        Ok(url) => url,
        Err(e) => return Response::failure(CMD, e),
    };
    let client = match Client::new(url) {
        Ok(c) => c,
        Err(e) => return Response::failure(CMD, e),
    };
    let cs = match client.get_cluster_status().await {
        Ok(cs) => cs,
        Err(e) => return Response::failure(CMD, e),
    };

    let rows: Vec<ReplicaRow> = list_replicas(&cs)
        .into_iter()
        .map(|m| ReplicaRow {
            name: m.name.clone(),
            state: m.state.clone(),
            lag_bytes: m.lag,
            host: m.host.clone(),
            port: m.port,
        })
        .collect();

    Response::success(
        CMD,
        serde_json::json!({
            "count": rows.len(),
            "replicas": rows,
        }),
    )
}

async fn promote(ctx: &Ctx, name: &str, patroni_url: &str, candidate: &str) -> Response {
    const CMD: &str = "replica promote";

    if candidate.is_empty() {
        return Response::failure(CMD, PgdbaError::Validation("--candidate is required".into()));
    }

    let url = match resolve_patroni_url(ctx, name, patroni_url) {
        Ok(url) => url,
        Err(e) => return Response::failure(CMD, e),
    };
    let client = match Client::new(url) {
        Ok(c) => c,
        Err(e) => return Response::failure(CMD, e),
    };
    let cs = match client.get_cluster_status().await {
        Ok(cs) => cs,
        Err(e) => return Response::failure(CMD, e),
    };

    // Validate the candidate before asking Patroni to move anything.
    if let Err(e) = check_switchover(&cs, candidate, DEFAULT_MAX_LAG_BYTES) {
        return Response::failure(CMD, e);
    }
    let primary = match find_primary(&cs) {
        Ok(p) => p.to_string(),
        Err(e) => return Response::failure(CMD, e),
    };

    if let Err(e) = client.switchover(&primary, candidate).await {
        return Response::failure(CMD, format!("switchover failed: {e}"));
    }

    Response::success(
        CMD,
        serde_json::json!({
            "candidate": candidate,
            "from": primary,
            "status": "promoted",
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::testutil::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_list_includes_stopped_replicas() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/cluster"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(
                r#"{"members":[
                    {"name":"p","role":"leader","state":"running","host":"h","port":5432},
                    {"name":"r1","role":"replica","state":"running","host":"h","port":5432,"lag":64},
                    {"name":"r2","role":"replica","state":"stopped","host":"h","port":5432,"lag":0}
                ]}"#,
                "application/json",
            ))
            .mount(&server)
            .await;
        let (ctx, _dir) = ctx_with_registry(vec![]);

        let resp = list(&ctx, "", &server.uri()).await;
        assert!(resp.success);
        let data = resp.data.unwrap();
        assert_eq!(data["count"], 2);
        assert_eq!(data["replicas"][0]["name"], "r1");
        assert_eq!(data["replicas"][1]["state"], "stopped");
    }

    #[tokio::test]
    async fn test_promote_requires_candidate() {
        let (ctx, _dir) = ctx_with_registry(vec![]);
        let resp = promote(&ctx, "", "http://192.0.2.1:8008", "").await;
        assert!(!resp.success);
        assert!(resp.error.unwrap().contains("--candidate"));
    }
}
