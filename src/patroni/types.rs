//! Wire types for the Patroni REST API.

use serde::{Deserialize, Deserializer, Serialize};

/// Lifecycle state Patroni reports for a healthy member.
pub const STATE_RUNNING: &str = "running";

/// A single cluster member as reported by `GET /cluster`.
///
/// Roles and states are kept as strings: Patroni has grown new values over
/// time (`leader` replacing `master`, `standby_leader`, `sync_standby`) and
/// the client must not reject ones it has never seen.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Member {
    pub name: String,
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub port: u16,
    pub role: String,
    #[serde(default)]
    pub state: String,
    /// Replication lag in bytes. Patroni emits this as an integer, as the
    /// string `"unknown"` right after a switchover, or not at all on the
    /// leader; the latter two decode to 0.
    #[serde(default, deserialize_with = "lag_or_zero")]
    pub lag: i64,
    #[serde(default)]
    pub timeline: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,
}

impl Member {
    /// Whether this member's role marks it as the primary. Accepts both the
    /// modern `leader` and the legacy `master` role string.
    pub fn is_primary(&self) -> bool {
        self.role == "leader" || self.role == "master"
    }

    /// Whether Patroni reports the member as running.
    pub fn is_running(&self) -> bool {
        self.state == STATE_RUNNING
    }
}

fn lag_or_zero<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum LagField {
        Bytes(i64),
        Text(String),
    }

    match Option::<LagField>::deserialize(deserializer)? {
        Some(LagField::Bytes(n)) => Ok(n),
        Some(LagField::Text(_)) | None => Ok(0),
    }
}

/// Cluster topology from `GET /cluster`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterStatus {
    #[serde(default)]
    pub members: Vec<Member>,
    /// In-progress failover descriptor, if any. The shape varies across
    /// Patroni releases, so it is carried opaquely.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failover: Option<serde_json::Value>,
    #[serde(default)]
    pub pause: bool,
}

impl ClusterStatus {
    /// Whether a failover or switchover is currently in progress.
    pub fn failover_in_progress(&self) -> bool {
        self.failover.is_some()
    }
}

/// Node details from `GET /patroni`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeInfo {
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub server_version: i64,
    #[serde(default)]
    pub timeline: i64,
    #[serde(default)]
    pub xlog: XlogInfo,
}

/// WAL position block inside the `/patroni` payload.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct XlogInfo {
    #[serde(default)]
    pub location: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lag_decodes_integer() {
        let m: Member =
            serde_json::from_str(r#"{"name":"pg-1","role":"replica","lag":512}"#).unwrap();
        assert_eq!(m.lag, 512);
    }

    #[test]
    fn test_lag_unknown_string_decodes_to_zero() {
        let m: Member =
            serde_json::from_str(r#"{"name":"pg-1","role":"replica","lag":"unknown"}"#).unwrap();
        assert_eq!(m.lag, 0);
    }

    #[test]
    fn test_lag_missing_decodes_to_zero() {
        let m: Member =
            serde_json::from_str(r#"{"name":"pg-1","role":"leader","state":"running"}"#).unwrap();
        assert_eq!(m.lag, 0);
    }

    #[test]
    fn test_primary_role_accepts_leader_and_master() {
        for role in ["leader", "master"] {
            let m: Member =
                serde_json::from_str(&format!(r#"{{"name":"a","role":"{role}"}}"#)).unwrap();
            assert!(m.is_primary(), "role {role} should be primary");
        }
        let m: Member =
            serde_json::from_str(r#"{"name":"a","role":"standby_leader"}"#).unwrap();
        assert!(!m.is_primary());
    }

    #[test]
    fn test_unknown_fields_ignored() {
        let cs: ClusterStatus = serde_json::from_str(
            r#"{"members":[],"pause":false,"scheduled_switchover":{"at":"soon"}}"#,
        )
        .unwrap();
        assert!(cs.members.is_empty());
        assert!(!cs.failover_in_progress());
    }
}
