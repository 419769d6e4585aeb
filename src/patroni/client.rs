//! HTTP client for the Patroni REST API.

use std::time::Duration;

use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{PgdbaError, Result};
use crate::patroni::types::{ClusterStatus, NodeInfo};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Patroni REST API client.
///
/// Bound to a single node's base URL, e.g. `http://10.0.0.1:8008`. All
/// requests share one HTTP client with a 10-second timeout.
pub struct Client {
    base_url: String,
    http: reqwest::Client,
}

impl Client {
    /// Create a client for the given base URL. A single trailing slash is
    /// stripped so `http://h:8008/` and `http://h:8008` behave identically.
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let base_url: String = base_url.into();
        let base_url = match base_url.strip_suffix('/') {
            Some(trimmed) => trimmed.to_string(),
            None => base_url,
        };
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!("pgdba/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { base_url, http })
    }

    /// Query the cluster topology (`GET /cluster`).
    pub async fn get_cluster_status(&self) -> Result<ClusterStatus> {
        self.get_json("/cluster").await
    }

    /// Query this node's details (`GET /patroni`).
    pub async fn get_node_info(&self) -> Result<NodeInfo> {
        self.get_json("/patroni").await
    }

    /// Check whether this node is the primary (`GET /primary`).
    ///
    /// 200 means primary; 404 and 503 are the "not primary" variants Patroni
    /// emits and map to `Ok(false)`. Anything else is an error.
    pub async fn is_primary(&self) -> Result<bool> {
        let resp = self
            .http
            .get(format!("{}/primary", self.base_url))
            .send()
            .await?;
        match resp.status() {
            StatusCode::OK => Ok(true),
            StatusCode::NOT_FOUND | StatusCode::SERVICE_UNAVAILABLE => Ok(false),
            status => Err(PgdbaError::PatroniStatus {
                path: "/primary".into(),
                status: status.as_u16(),
            }),
        }
    }

    /// Trigger a controlled switchover (`POST /switchover`). `leader` names
    /// the current primary; an empty `candidate` lets Patroni choose.
    pub async fn switchover(&self, leader: &str, candidate: &str) -> Result<()> {
        self.post_json(
            "/switchover",
            &serde_json::json!({ "leader": leader, "candidate": candidate }),
        )
        .await
    }

    /// Trigger a forced failover (`POST /failover`), for use when the
    /// primary is unreachable.
    pub async fn failover(&self, candidate: &str) -> Result<()> {
        self.post_json("/failover", &serde_json::json!({ "candidate": candidate }))
            .await
    }

    /// Re-initialize this node from the primary (`POST /reinitialize`).
    pub async fn reinitialize(&self) -> Result<()> {
        self.post_json("/reinitialize", &serde_json::json!({})).await
    }

    /// Restart the Patroni-managed PostgreSQL (`POST /restart`).
    pub async fn restart(&self) -> Result<()> {
        self.post_json("/restart", &serde_json::json!({})).await
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let resp = self
            .http
            .get(format!("{}{}", self.base_url, path))
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(PgdbaError::PatroniStatus {
                path: path.into(),
                status: status.as_u16(),
            });
        }
        Ok(resp.json().await?)
    }

    async fn post_json<B: Serialize>(&self, path: &str, body: &B) -> Result<()> {
        let resp = self
            .http
            .post(format!("{}{}", self.base_url, path))
            .json(body)
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(PgdbaError::PatroniStatus {
                path: path.into(),
                status: status.as_u16(),
            });
        }
        Ok(())
    }
}
