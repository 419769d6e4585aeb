//! Infrastructure provider abstraction.
//!
//! Node provisioning is declared but not implemented: the trait pins down
//! the contract the CLI validates against, and the docker backend reports
//! itself unimplemented rather than pretending. Baremetal and Kubernetes
//! backends do not construct at all.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{PgdbaError, Result};

/// Role of a node within a cluster deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeRole {
    Primary,
    Standby,
    Etcd,
}

/// Runtime state of a single node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeStatus {
    pub id: String,
    pub host: String,
    pub role: NodeRole,
    pub running: bool,
    pub healthy: bool,
}

/// Description of a node to be provisioned.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    pub name: String,
    pub role: NodeRole,
    pub host: String,
    pub data_dir: String,
    pub port: u16,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub labels: Option<BTreeMap<String, String>>,
}

/// Abstraction over infrastructure backends.
#[async_trait]
pub trait Provider: Send + Sync {
    async fn create_node(&self, cfg: NodeConfig) -> Result<NodeStatus>;
    async fn destroy_node(&self, id: &str) -> Result<()>;
    async fn exec_on_node(&self, id: &str, cmd: &[String]) -> Result<String>;
    async fn node_status(&self, id: &str) -> Result<NodeStatus>;
    async fn list_nodes(&self) -> Result<Vec<NodeStatus>>;
    /// Isolate a node from the network (or undo the isolation).
    async fn partition_node(&self, id: &str, isolate: bool) -> Result<()>;
    fn kind(&self) -> &'static str;
}

/// Construct a provider for the given type string.
pub fn new_provider(kind: &str) -> Result<Box<dyn Provider>> {
    match kind {
        "docker" => Ok(Box::new(DockerProvider)),
        "baremetal" => Err(PgdbaError::ProviderUnimplemented("baremetal".into())),
        "kubernetes" => Err(PgdbaError::ProviderUnimplemented("kubernetes".into())),
        other => Err(PgdbaError::Validation(format!(
            "unknown provider type {other:?}: must be docker, baremetal, or kubernetes"
        ))),
    }
}

/// Docker backend. Declared for the Compose-based development harness; all
/// operations currently report unimplemented.
pub struct DockerProvider;

#[async_trait]
impl Provider for DockerProvider {
    async fn create_node(&self, _cfg: NodeConfig) -> Result<NodeStatus> {
        Err(PgdbaError::ProviderUnimplemented("docker create_node".into()))
    }

    async fn destroy_node(&self, _id: &str) -> Result<()> {
        Err(PgdbaError::ProviderUnimplemented("docker destroy_node".into()))
    }

    async fn exec_on_node(&self, _id: &str, _cmd: &[String]) -> Result<String> {
        Err(PgdbaError::ProviderUnimplemented("docker exec_on_node".into()))
    }

    async fn node_status(&self, _id: &str) -> Result<NodeStatus> {
        Err(PgdbaError::ProviderUnimplemented("docker node_status".into()))
    }

    async fn list_nodes(&self) -> Result<Vec<NodeStatus>> {
        Err(PgdbaError::ProviderUnimplemented("docker list_nodes".into()))
    }

    async fn partition_node(&self, _id: &str, _isolate: bool) -> Result<()> {
        Err(PgdbaError::ProviderUnimplemented("docker partition_node".into()))
    }

    fn kind(&self) -> &'static str {
        "docker"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_factory_accepts_docker_only() {
        assert_eq!(new_provider("docker").unwrap().kind(), "docker");
        assert!(matches!(
            new_provider("baremetal"),
            Err(PgdbaError::ProviderUnimplemented(_))
        ));
        assert!(matches!(
            new_provider("openstack"),
            Err(PgdbaError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_docker_operations_report_unimplemented() {
        let provider = new_provider("docker").unwrap();
        let err = provider.list_nodes().await.unwrap_err();
        assert!(err.to_string().contains("not implemented"));
    }
}
