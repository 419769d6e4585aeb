//! Workload- and resource-aware tuning recommendations.
//!
//! The heuristics are the PGTune family plus a few workload-sensitive
//! adjustments. Every recommendation is emitted even when the current value
//! already matches; consumers compute the diff.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::inspect::PgSetting;

/// Expected database usage pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Workload {
    Oltp,
    Olap,
    Mixed,
}

impl std::fmt::Display for Workload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Workload::Oltp => write!(f, "oltp"),
            Workload::Olap => write!(f, "olap"),
            Workload::Mixed => write!(f, "mixed"),
        }
    }
}

impl std::str::FromStr for Workload {
    type Err = crate::error::PgdbaError;

    fn from_str(s: &str) -> crate::error::Result<Self> {
        match s {
            "oltp" => Ok(Workload::Oltp),
            "olap" => Ok(Workload::Olap),
            "mixed" => Ok(Workload::Mixed),
            other => Err(crate::error::PgdbaError::Validation(format!(
                "invalid workload {other:?}: must be oltp, olap, or mixed"
            ))),
        }
    }
}

/// Recommendation aggressiveness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Profile {
    Default,
    Conservative,
}

/// Underlying storage medium.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageType {
    Ssd,
    Hdd,
}

impl std::fmt::Display for StorageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageType::Ssd => write!(f, "ssd"),
            StorageType::Hdd => write!(f, "hdd"),
        }
    }
}

impl std::str::FromStr for StorageType {
    type Err = crate::error::PgdbaError;

    fn from_str(s: &str) -> crate::error::Result<Self> {
        match s {
            "ssd" => Ok(StorageType::Ssd),
            "hdd" => Ok(StorageType::Hdd),
            other => Err(crate::error::PgdbaError::Validation(format!(
                "invalid storage type {other:?}: must be ssd or hdd"
            ))),
        }
    }
}

/// Detected or operator-provided system resources.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SystemInfo {
    pub total_ram_bytes: i64,
    pub cpu_cores: i32,
    pub storage: StorageType,
}

/// How safe a recommendation is to apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfidenceLevel {
    High,
    Medium,
    Low,
}

/// A tuning suggestion for a single parameter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recommendation {
    pub parameter: String,
    pub current: String,
    pub recommended: String,
    pub confidence: ConfidenceLevel,
    pub rationale: String,
    pub source: String,
}

const SOURCE_PGTUNE: &str = "pgtune";
const SOURCE_HEURISTIC: &str = "pgdba-heuristic";

const GIB: f64 = 1024.0 * 1024.0 * 1024.0;

/// Produce tuning recommendations from current settings, system resources,
/// workload, and profile. The order of recommendations is stable.
pub fn generate_recommendations(
    settings: &[PgSetting],
    sys: SystemInfo,
    workload: Workload,
    profile: Profile,
) -> Vec<Recommendation> {
    let current: HashMap<&str, &str> = settings
        .iter()
        .map(|s| (s.name.as_str(), s.setting.as_str()))
        .collect();
    let current_of = |name: &str| current.get(name).copied().unwrap_or("").to_string();

    let ram_gb = sys.total_ram_bytes as f64 / GIB;
    let mut recs = Vec::new();

    // shared_buffers: 25% of RAM, the standard PGTune starting point.
    let sb_gb = ((ram_gb / 4.0) as i64).max(1);
    recs.push(Recommendation {
        parameter: "shared_buffers".into(),
        current: current_of("shared_buffers"),
        recommended: format!("{sb_gb}GB"),
        confidence: demote_if_conservative(ConfidenceLevel::High, profile),
        rationale: format!(
            "25% of total RAM ({ram_gb:.0} GB). Standard PGTune heuristic for all workloads."
        ),
        source: SOURCE_PGTUNE.into(),
    });

    // effective_cache_size: 75% of RAM.
    let ec_gb = ((ram_gb * 3.0 / 4.0) as i64).max(1);
    recs.push(Recommendation {
        parameter: "effective_cache_size".into(),
        current: current_of("effective_cache_size"),
        recommended: format!("{ec_gb}GB"),
        confidence: ConfidenceLevel::High,
        rationale: format!(
            "75% of total RAM ({ram_gb:.0} GB). Informs the query planner about the OS cache."
        ),
        source: SOURCE_PGTUNE.into(),
    });

    // work_mem: workload-sensitive.
    let work_mem_mb = compute_work_mem(ram_gb, workload);
    recs.push(Recommendation {
        parameter: "work_mem".into(),
        current: current_of("work_mem"),
        recommended: format!("{work_mem_mb}MB"),
        confidence: demote_if_conservative(ConfidenceLevel::High, profile),
        rationale: format!(
            "Based on {ram_gb:.0} GB RAM for a {workload} workload. Each sort or hash node can use this amount."
        ),
        source: SOURCE_HEURISTIC.into(),
    });

    // maintenance_work_mem: 5% of RAM, clamped to [64 MB, 2 GB].
    let maint_mb = ((ram_gb * 1024.0 * 0.05) as i64).clamp(64, 2048);
    recs.push(Recommendation {
        parameter: "maintenance_work_mem".into(),
        current: current_of("maintenance_work_mem"),
        recommended: format!("{maint_mb}MB"),
        confidence: ConfidenceLevel::High,
        rationale: "5% of RAM (capped at 2GB). Used for VACUUM, CREATE INDEX, ALTER TABLE.".into(),
        source: SOURCE_PGTUNE.into(),
    });

    // random_page_cost: SSD vs HDD.
    let rpc = match sys.storage {
        StorageType::Ssd => "1.1",
        StorageType::Hdd => "4.0",
    };
    recs.push(Recommendation {
        parameter: "random_page_cost".into(),
        current: current_of("random_page_cost"),
        recommended: rpc.into(),
        confidence: ConfidenceLevel::High,
        rationale: format!(
            "Storage type: {}. SSD=1.1 (random reads are cheap), HDD=4.0.",
            sys.storage
        ),
        source: SOURCE_PGTUNE.into(),
    });

    // checkpoint_completion_target: always 0.9, but only for servers that
    // report the parameter.
    if current.contains_key("checkpoint_completion_target") {
        recs.push(Recommendation {
            parameter: "checkpoint_completion_target".into(),
            current: current_of("checkpoint_completion_target"),
            recommended: "0.9".into(),
            confidence: ConfidenceLevel::High,
            rationale: "Spread checkpoint writes over more time to reduce I/O spikes.".into(),
            source: SOURCE_PGTUNE.into(),
        });
    }

    // max_connections: workload-dependent; pooling is the real answer.
    if current.contains_key("max_connections") {
        let max_conn = compute_max_connections(workload, sys.cpu_cores);
        recs.push(Recommendation {
            parameter: "max_connections".into(),
            current: current_of("max_connections"),
            recommended: max_conn.to_string(),
            confidence: ConfidenceLevel::Medium,
            rationale: format!(
                "Based on a {workload} workload with {} CPU cores. Use connection pooling for higher concurrency.",
                sys.cpu_cores
            ),
            source: SOURCE_HEURISTIC.into(),
        });
    }

    recs
}

fn demote_if_conservative(confidence: ConfidenceLevel, profile: Profile) -> ConfidenceLevel {
    match profile {
        Profile::Conservative => ConfidenceLevel::Medium,
        Profile::Default => confidence,
    }
}

/// work_mem in MB: RAM / (assumed 100 connections * 4), floored at 4 MB.
/// OLAP gets 4x, mixed 2x, capped at 2 GB.
fn compute_work_mem(ram_gb: f64, workload: Workload) -> i64 {
    let mut base_mb = ((ram_gb * 1024.0 / 400.0) as i64).max(4);
    match workload {
        Workload::Olap => base_mb *= 4,
        Workload::Mixed => base_mb *= 2,
        Workload::Oltp => {}
    }
    base_mb.min(2048)
}

fn compute_max_connections(workload: Workload, cpu_cores: i32) -> i32 {
    match workload {
        Workload::Olap => cpu_cores * 4 + 4,
        Workload::Mixed => cpu_cores * 8 + 20,
        Workload::Oltp => cpu_cores * 10 + 20,
    }
}
