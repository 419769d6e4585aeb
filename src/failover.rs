//! Pre-flight decision logic for switchover and failover.
//!
//! Everything here is a pure function over a [`ClusterStatus`] value: no
//! I/O, no mutation. The CLI runs these checks before any `POST` reaches
//! Patroni so that a refused promotion never leaves the cluster touched.

use crate::error::{PgdbaError, Result};
use crate::patroni::{ClusterStatus, Member};

/// Maximum acceptable replication lag (in bytes) for a switchover candidate.
///
/// 10 MiB gives a short catch-up window while still preventing divergent
/// timelines. This constant is part of the public contract.
pub const DEFAULT_MAX_LAG_BYTES: i64 = 10 * 1024 * 1024;

/// Returns the name of the current primary (`leader` or legacy `master`).
pub fn find_primary(status: &ClusterStatus) -> Result<&str> {
    status
        .members
        .iter()
        .find(|m| m.is_primary())
        .map(|m| m.name.as_str())
        .ok_or(PgdbaError::NoPrimary {
            members: status.members.len(),
        })
}

/// Returns the running replica with the lowest replication lag. Ties go to
/// the member seen first in the input order.
pub fn find_best_candidate(status: &ClusterStatus) -> Result<&str> {
    let mut best: Option<&Member> = None;
    for m in &status.members {
        if m.is_primary() || !m.is_running() {
            continue;
        }
        if best.map_or(true, |b| m.lag < b.lag) {
            best = Some(m);
        }
    }
    best.map(|m| m.name.as_str())
        .ok_or(PgdbaError::NoRunningReplica)
}

/// Returns all non-primary members in input order, regardless of state.
/// Callers filter by state when they care.
pub fn list_replicas(status: &ClusterStatus) -> Vec<&Member> {
    status.members.iter().filter(|m| !m.is_primary()).collect()
}

/// Validates that a controlled switchover is safe to perform.
///
/// 1. The cluster must have a primary.
/// 2. A named candidate must exist, be a running replica, and lag no more
///    than `max_lag_bytes`. A candidate matching the primary is reported as
///    "already the primary", distinct from "not found".
/// 3. Without a candidate, at least one running replica must exist.
pub fn check_switchover(
    status: &ClusterStatus,
    candidate: &str,
    max_lag_bytes: i64,
) -> Result<()> {
    find_primary(status)?;

    if !candidate.is_empty() {
        return validate_candidate(status, candidate, max_lag_bytes);
    }

    if status
        .members
        .iter()
        .any(|m| !m.is_primary() && m.is_running())
    {
        Ok(())
    } else {
        Err(PgdbaError::NoRunningReplica)
    }
}

fn validate_candidate(status: &ClusterStatus, candidate: &str, max_lag_bytes: i64) -> Result<()> {
    for m in &status.members {
        if m.name != candidate {
            continue;
        }
        if m.is_primary() {
            return Err(PgdbaError::CandidateIsPrimary(candidate.to_string()));
        }
        if !m.is_running() {
            return Err(PgdbaError::CandidateNotRunning {
                name: candidate.to_string(),
                state: m.state.clone(),
            });
        }
        if m.lag > max_lag_bytes {
            return Err(PgdbaError::LagExceeded {
                name: candidate.to_string(),
                lag: m.lag,
                max: max_lag_bytes,
            });
        }
        return Ok(());
    }
    Err(PgdbaError::CandidateNotFound(candidate.to_string()))
}
