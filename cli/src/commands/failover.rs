//! Switchover and failover commands.
//!
//! The default path is a controlled switchover with full pre-checks. The
//! `--force` path skips pre-checks for an unreachable primary, which is why
//! it demands an explicit candidate before any HTTP call is made.

use clap::{Args, Subcommand};
use serde::{Deserialize, Serialize};

use pgdba::error::{PgdbaError, Result};
use pgdba::failover::{
    check_switchover, find_best_candidate, find_primary, list_replicas, DEFAULT_MAX_LAG_BYTES,
};
use pgdba::output::Response;
use pgdba::patroni::Client;

use super::{resolve_patroni_url, Ctx};

#[derive(Args)]
pub struct FailoverArgs {
    #[command(subcommand)]
    command: FailoverCommands,
}

#[derive(Subcommand)]
enum FailoverCommands {
    /// Trigger a switchover (controlled) or forced failover
    Trigger {
        /// Cluster name (looks up the Patroni URL from the registry)
        #[arg(long, default_value = "")]
        name: String,

        /// Patroni API URL
        #[arg(long, default_value = "")]
        patroni_url: String,

        /// Target replica to promote (empty lets pgdba pick the best)
        #[arg(long, default_value = "")]
        candidate: String,

        /// Force failover even if the primary is unreachable (skips pre-checks)
        #[arg(long)]
        force: bool,
    },

    /// Show current cluster failover / switchover state
    Status {
        /// Cluster name (looks up the Patroni URL from the registry)
        #[arg(long, default_value = "")]
        name: String,

        /// Patroni API URL
        #[arg(long, default_value = "")]
        patroni_url: String,
    },
}

/// Outcome data for `failover trigger`.
#[derive(Debug, Serialize, Deserialize)]
pub struct TriggerResult {
    /// `"switchover"` or `"failover"`.
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub from: String,
    pub to: String,
    pub status: String,
}

pub async fn execute(args: FailoverArgs, ctx: &Ctx) -> Response {
    match args.command {
        FailoverCommands::Trigger {
            name,
            patroni_url,
            candidate,
            force,
        } => trigger(ctx, &name, &patroni_url, &candidate, force).await,
        FailoverCommands::Status { name, patroni_url } => status(ctx, &name, &patroni_url).await,
    }
}

async fn trigger(
    ctx: &Ctx,
    name: &str,
    patroni_url: &str,
    candidate: &str,
    force: bool,
) -> Response {
    const CMD: &str = "failover trigger";

    // Validate before touching the network: a forced failover has no
    // pre-checks, so the candidate is the only guard rail left.
    if force && candidate.is_empty() {
        return Response::failure(
            CMD,
            PgdbaError::Validation("--candidate is required when using --force".into()),
        );
    }

    let url = match resolve_patroni_url(ctx, name, patroni_url) {
        Ok(url) => url,
        Err(e) => return Response::failure(CMD, e),
    };
    let client = match Client::new(url) {
        Ok(c) => c,
        Err(e) => return Response::failure(CMD, e),
    };

    let outcome = if force {
        run_forced_failover(&client, candidate).await
    } else {
        run_switchover(&client, candidate).await
    };
    match outcome {
        Ok(result) => Response::success(CMD, result),
        Err(e) => Response::failure(CMD, e),
    }
}

/// Controlled switchover: pre-check, pick the target, call Patroni.
pub async fn run_switchover(client: &Client, candidate: &str) -> Result<TriggerResult> {
    let cs = client.get_cluster_status().await?;

    check_switchover(&cs, candidate, DEFAULT_MAX_LAG_BYTES)?;
    let primary = find_primary(&cs)?.to_string();

    let target = if candidate.is_empty() {
        find_best_candidate(&cs)?.to_string()
    } else {
        candidate.to_string()
    };

    client.switchover(&primary, &target).await?;

    Ok(TriggerResult {
        kind: "switchover".into(),
        from: primary,
        to: target,
        status: "completed".into(),
    })
}

/// Forced failover: no pre-checks, the caller has already named a candidate.
pub async fn run_forced_failover(client: &Client, candidate: &str) -> Result<TriggerResult> {
    client.failover(candidate).await?;
    Ok(TriggerResult {
        kind: "failover".into(),
        from: String::new(),
        to: candidate.to_string(),
        status: "completed".into(),
    })
}

async fn status(ctx: &Ctx, name: &str, patroni_url: &str) -> Response {
    const CMD: &str = "failover status";

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

    let primary = find_primary(&cs).map(str::to_string).unwrap_or_default();
    let replicas: Vec<String> = list_replicas(&cs)
        .into_iter()
        .map(|m| m.name.clone())
        .collect();

    Response::success(
        CMD,
        serde_json::json!({
            "primary": primary,
            "replicas": replicas,
            "failover_in_progress": cs.failover_in_progress(),
            "paused": cs.pause,
            "member_count": cs.members.len(),
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::testutil::*;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const CLUSTER_BODY: &str = r#"{
        "members": [
            {"name":"pg-primary","role":"leader","state":"running","host":"10.0.0.1","port":5432},
            {"name":"pg-replica-1","role":"replica","state":"running","host":"10.0.0.2","port":5432,"lag":512},
            {"name":"pg-replica-2","role":"replica","state":"running","host":"10.0.0.3","port":5432,"lag":1024}
        ],
        "pause": false
    }"#;

    async fn mock_cluster(server: &MockServer) {
        Mock::given(method("GET"))
            .and(path("/cluster"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(CLUSTER_BODY, "application/json"))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_switchover_auto_selects_lowest_lag_candidate() {
        let server = MockServer::start().await;
        mock_cluster(&server).await;
        Mock::given(method("POST"))
            .and(path("/switchover"))
            .and(body_json(serde_json::json!({
                "leader": "pg-primary",
                "candidate": "pg-replica-1"
            })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let client = Client::new(server.uri()).unwrap();
        let result = run_switchover(&client, "").await.unwrap();

        assert_eq!(result.kind, "switchover");
        assert_eq!(result.from, "pg-primary");
        assert_eq!(result.to, "pg-replica-1");
    }

    #[tokio::test]
    async fn test_switchover_precheck_blocks_lagging_candidate() {
        let server = MockServer::start().await;
        let body = CLUSTER_BODY.replace("1024", &(DEFAULT_MAX_LAG_BYTES + 1).to_string());
        Mock::given(method("GET"))
            .and(path("/cluster"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(body, "application/json"))
            .mount(&server)
            .await;
        // No /switchover mock: a POST would fail the test.

        let client = Client::new(server.uri()).unwrap();
        let err = run_switchover(&client, "pg-replica-2").await.unwrap_err();
        assert!(matches!(err, PgdbaError::LagExceeded { .. }));
    }

    #[tokio::test]
    async fn test_forced_failover_without_candidate_fails_before_http() {
        // An unroutable URL: any HTTP attempt would error differently.
        let (ctx, _dir) = ctx_with_registry(vec![]);
        let resp = trigger(&ctx, "", "http://192.0.2.1:8008", "", true).await;

        assert!(!resp.success);
        let msg = resp.error.unwrap();
        assert!(msg.contains("candidate"), "got: {msg}");
    }

    #[tokio::test]
    async fn test_forced_failover_posts_candidate() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/failover"))
            .and(body_json(serde_json::json!({"candidate": "pg-replica-2"})))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let client = Client::new(server.uri()).unwrap();
        let result = run_forced_failover(&client, "pg-replica-2").await.unwrap();
        assert_eq!(result.kind, "failover");
        assert_eq!(result.to, "pg-replica-2");
    }

    #[tokio::test]
    async fn test_status_reports_topology() {
        let server = MockServer::start().await;
        mock_cluster(&server).await;
        let (ctx, _dir) = ctx_with_registry(vec![]);

        let resp = status(&ctx, "", &server.uri()).await;
        assert!(resp.success);
        let data = resp.data.unwrap();
        assert_eq!(data["primary"], "pg-primary");
        assert_eq!(data["member_count"], 3);
        assert_eq!(data["failover_in_progress"], false);
    }
}
