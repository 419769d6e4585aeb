//! Snapshot collection with per-section degradation.
//!
//! The pass is: one required version read, identity with graceful tier
//! fallback, prerequisite probes, then each data section independently.
//! Any single section failure becomes a warning inside the snapshot.

use chrono::Utc;
use std::collections::BTreeMap;
use tracing::{debug, warn};

use crate::error::Result;
use crate::inspect::db::InspectDb;
use crate::inspect::identity::{ClusterIdentity, IdentityTier};
use crate::inspect::types::{DiagSnapshot, PrereqResult, SamplingConfig, SectionResult};

const STAT_STATEMENTS_LIMIT: i64 = 100;

const SECTION_PREREQS: &str = "prereqs";
const SECTION_SETTINGS: &str = "pg_settings";
const SECTION_ACTIVITY: &str = "pg_stat_activity";
const SECTION_STATEMENTS: &str = "pg_stat_statements";
const SECTION_BGWRITER: &str = "pg_stat_bgwriter";
const SECTION_WAL: &str = "pg_stat_wal";

/// Gather a [`DiagSnapshot`] from the given database.
///
/// Only the `server_version_num` read is fatal; everything downstream
/// degrades section by section. `config_host` and `config_port` are the
/// caller's connection settings, used as the tier-2 identity fallback.
pub async fn collect(
    db: &dyn InspectDb,
    sampling: SamplingConfig,
    config_host: &str,
    config_port: i32,
) -> Result<DiagSnapshot> {
    let version = db.server_version_num().await?;

    let mut identity = build_identity(db, version, config_host, config_port).await;
    identity.fingerprint = identity.compute_fingerprint();

    let mut sections = BTreeMap::new();

    let prereqs = collect_prereqs(db, version).await;
    sections.insert(
        SECTION_PREREQS.to_string(),
        SectionResult::available(&prereqs),
    );

    sections.insert(
        SECTION_SETTINGS.to_string(),
        section_from(db.pg_settings().await),
    );
    sections.insert(
        SECTION_ACTIVITY.to_string(),
        section_from(db.stat_activity().await),
    );
    sections.insert(
        SECTION_STATEMENTS.to_string(),
        collect_stat_statements(db, &prereqs).await,
    );
    sections.insert(
        SECTION_BGWRITER.to_string(),
        section_from(db.stat_bgwriter().await),
    );
    sections.insert(SECTION_WAL.to_string(), collect_stat_wal(db, version).await);

    Ok(DiagSnapshot {
        identity,
        collected_at: Utc::now(),
        sampling_mode: sampling.mode,
        sections,
    })
}

/// Determine the best identity tier available, falling through gracefully.
async fn build_identity(
    db: &dyn InspectDb,
    version: i32,
    config_host: &str,
    config_port: i32,
) -> ClusterIdentity {
    let mut id = ClusterIdentity {
        tier: IdentityTier::ConfigAddr,
        system_identifier: String::new(),
        resolved_addr: String::new(),
        resolved_port: 0,
        config_host: config_host.to_string(),
        config_port,
        datid: 0,
        server_version_num: version,
        fingerprint: String::new(),
    };

    match db.resolved_addr().await {
        Ok((addr, port)) if !addr.is_empty() => {
            id.resolved_addr = addr;
            id.resolved_port = port;
        }
        Ok(_) => debug!("inet_server_addr() is empty, likely a local socket connection"),
        Err(e) => warn!(error = %e, "could not read resolved server address"),
    }

    if let Ok(datid) = db.current_datid().await {
        id.datid = datid;
    }

    if version >= 130000 {
        match db.system_identifier().await {
            Ok(sysid) if !sysid.is_empty() => {
                id.system_identifier = sysid;
                id.tier = IdentityTier::SystemIdentifier;
                return id;
            }
            Ok(_) => {}
            Err(e) => {
                warn!(error = %e, "pg_control_system() unavailable, falling back a tier");
            }
        }
    }

    if !id.resolved_addr.is_empty() {
        id.tier = IdentityTier::ResolvedAddr;
    }
    id
}

/// Probe every well-known prerequisite. The probes themselves never fail
/// the collection; their outcomes are the data of the `prereqs` section.
async fn collect_prereqs(db: &dyn InspectDb, version: i32) -> Vec<PrereqResult> {
    let mut results = Vec::with_capacity(3);

    let (available, error) = match db.extension_loaded("pg_stat_statements").await {
        Ok(loaded) => (loaded, None),
        Err(e) => (false, Some(e.to_string())),
    };
    results.push(PrereqResult {
        name: "pg_stat_statements".into(),
        available,
        version,
        error,
    });

    let control = if version >= 130000 {
        match db.system_identifier().await {
            Ok(_) => PrereqResult {
                name: "pg_control_system".into(),
                available: true,
                version,
                error: None,
            },
            Err(e) => PrereqResult {
                name: "pg_control_system".into(),
                available: false,
                version,
                error: Some(e.to_string()),
            },
        }
    } else {
        PrereqResult {
            name: "pg_control_system".into(),
            available: false,
            version,
            error: Some("requires PostgreSQL 13+".into()),
        }
    };
    results.push(control);

    results.push(if version >= 140000 {
        PrereqResult {
            name: "pg_stat_wal".into(),
            available: true,
            version,
            error: None,
        }
    } else {
        PrereqResult {
            name: "pg_stat_wal".into(),
            available: false,
            version,
            error: Some("requires PostgreSQL 14+".into()),
        }
    });

    results
}

async fn collect_stat_statements(db: &dyn InspectDb, prereqs: &[PrereqResult]) -> SectionResult {
    let loaded = prereqs
        .iter()
        .find(|p| p.name == "pg_stat_statements")
        .map(|p| p.available)
        .unwrap_or(false);
    if !loaded {
        return SectionResult::unavailable("pg_stat_statements extension not loaded");
    }
    section_from(db.stat_statements(STAT_STATEMENTS_LIMIT).await)
}

async fn collect_stat_wal(db: &dyn InspectDb, version: i32) -> SectionResult {
    if version < 140000 {
        return SectionResult::unavailable("requires PostgreSQL 14+");
    }
    section_from(db.stat_wal().await)
}

fn section_from<T: serde::Serialize>(result: Result<T>) -> SectionResult {
    match result {
        Ok(data) => SectionResult::available(data),
        Err(e) => SectionResult::unavailable(e.to_string()),
    }
}
