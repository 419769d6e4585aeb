//! Cluster identity fingerprinting.
//!
//! A cluster is identified by the best fact available, in three tiers:
//! the server's control-file `system_identifier` (PG 13+), the resolved
//! network identity (`inet_server_addr`/`inet_server_port` plus the current
//! database OID), or, as a last resort, the caller-supplied host and port.
//! The tier prefix is hashed along with the components, so identities from
//! different tiers never collide even when their components overlap.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Which class of fact identifies the cluster. Lower tiers are more stable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentityTier {
    /// `system_identifier` from `pg_control_system()`; PG 13+, survives
    /// address changes.
    SystemIdentifier,
    /// `inet_server_addr():inet_server_port():datid`.
    ResolvedAddr,
    /// Caller-supplied `config_host:config_port` (fallback).
    ConfigAddr,
}

/// Everything needed to uniquely identify a PostgreSQL cluster.
///
/// The fingerprint is computed from the highest available tier; the
/// config host and port are always carried for display and audit, but they
/// only participate in the hash at tier 2.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterIdentity {
    pub tier: IdentityTier,
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub system_identifier: String,
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub resolved_addr: String,
    /// `inet_server_port()`, kept as a separate numeric component, never
    /// merged into the address string.
    #[serde(default)]
    pub resolved_port: i32,
    pub config_host: String,
    pub config_port: i32,
    #[serde(default)]
    pub datid: u32,
    pub server_version_num: i32,
    pub fingerprint: String,
}

impl ClusterIdentity {
    /// Produce the deterministic SHA-256 hex fingerprint for this identity:
    ///
    /// - tier 0: `SHA256("t0:" + system_identifier)`
    /// - tier 1: `SHA256("t1:" + resolved_addr + ":" + resolved_port + ":" + datid)`
    /// - tier 2: `SHA256("t2:" + config_host + ":" + config_port)`
    pub fn compute_fingerprint(&self) -> String {
        let input = match self.tier {
            IdentityTier::SystemIdentifier => format!("t0:{}", self.system_identifier),
            IdentityTier::ResolvedAddr => format!(
                "t1:{}:{}:{}",
                self.resolved_addr, self.resolved_port, self.datid
            ),
            IdentityTier::ConfigAddr => format!("t2:{}:{}", self.config_host, self.config_port),
        };
        hex::encode(Sha256::digest(input.as_bytes()))
    }
}
