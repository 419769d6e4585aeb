//! Error types for pgdba.
//!
//! This module provides the unified error type [`PgdbaError`] for all core
//! operations, along with a convenient [`Result`] type alias.
//!
//! Errors fall into the categories the tool surfaces to operators:
//!
//! - **Validation**: malformed or missing input, unknown output formats
//! - **Not-found**: registry or cluster-member lookups that miss
//! - **Transport / Protocol**: HTTP and SQL failures, non-2xx Patroni replies
//! - **Precondition**: switchover pre-checks that refuse to proceed
//! - **Contention**: the per-fingerprint apply lock is already held
//!
//! Every error carries a single-line human-readable message; the CLI embeds
//! that message verbatim in the failure envelope.

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Main error type for pgdba operations.
#[derive(Error, Debug)]
pub enum PgdbaError {
    // Input validation
    #[error("{0}")]
    Validation(String),

    #[error("unsupported format {0:?}: must be json, table, or yaml")]
    UnknownFormat(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    // Lookups
    #[error("cluster {0:?} not found in registry")]
    ClusterNotFound(String),

    #[error("not found: {0}")]
    NotFound(String),

    // Patroni transport and protocol
    #[error("patroni request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("patroni {path} returned HTTP {status}")]
    PatroniStatus { path: String, status: u16 },

    // PostgreSQL
    #[error("postgres: {0}")]
    Sql(#[from] tokio_postgres::Error),

    #[error("connect to postgres {host}:{port}: {source}")]
    Connect {
        host: String,
        port: u16,
        #[source]
        source: tokio_postgres::Error,
    },

    #[error("unexpected value from server: {0}")]
    Protocol(String),

    // Switchover pre-checks
    #[error("no primary found in cluster (members: {members})")]
    NoPrimary { members: usize },

    #[error("no running replica found for promotion")]
    NoRunningReplica,

    #[error("candidate {0:?} is already the primary")]
    CandidateIsPrimary(String),

    #[error("candidate {0:?} not found in cluster")]
    CandidateNotFound(String),

    #[error("candidate {name:?} is not running (state: {state})")]
    CandidateNotRunning { name: String, state: String },

    #[error("candidate {name:?} replication lag {lag} bytes exceeds threshold {max} bytes")]
    LagExceeded { name: String, lag: i64, max: i64 },

    // Apply lock
    #[error(
        "lock contention: {operation} operation (changeset {changeset_id}, pid {pid}) started at {}",
        .started_at.to_rfc3339()
    )]
    LockContention {
        changeset_id: String,
        pid: u32,
        operation: String,
        started_at: DateTime<Utc>,
    },

    // Change-set pipeline
    #[error("ALTER SYSTEM SET {name} = '{value}': {message}")]
    AlterSystem {
        name: String,
        value: String,
        message: String,
    },

    #[error("pg_reload_conf(): {0}")]
    ReloadConf(String),

    // Infrastructure providers
    #[error("provider {0}: not implemented")]
    ProviderUnimplemented(String),

    // Ambient
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("yaml: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Result type alias for pgdba operations.
pub type Result<T> = std::result::Result<T, PgdbaError>;

impl PgdbaError {
    /// Whether this error was raised by a switchover pre-check, before any
    /// write was issued.
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            PgdbaError::NoPrimary { .. }
                | PgdbaError::NoRunningReplica
                | PgdbaError::CandidateIsPrimary(_)
                | PgdbaError::CandidateNotFound(_)
                | PgdbaError::CandidateNotRunning { .. }
                | PgdbaError::LagExceeded { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_precondition_classification() {
        assert!(PgdbaError::NoPrimary { members: 0 }.is_precondition());
        assert!(PgdbaError::CandidateIsPrimary("pg-1".into()).is_precondition());
        assert!(!PgdbaError::Validation("bad flag".into()).is_precondition());
    }

    #[test]
    fn test_messages_are_single_line() {
        let err = PgdbaError::LagExceeded {
            name: "pg-replica-1".into(),
            lag: 20 * 1024 * 1024,
            max: 10 * 1024 * 1024,
        };
        let msg = err.to_string();
        assert!(!msg.contains('\n'));
        assert!(msg.contains("20971520"));
    }

    #[test]
    fn test_contention_message_names_holder() {
        let err = PgdbaError::LockContention {
            changeset_id: "cs-1".into(),
            pid: 4242,
            operation: "apply".into(),
            started_at: Utc::now(),
        };
        let msg = err.to_string();
        assert!(msg.contains("cs-1"));
        assert!(msg.contains("4242"));
        assert!(msg.contains("apply"));
    }
}
