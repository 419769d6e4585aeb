//! Snapshot and sampling types.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::inspect::identity::ClusterIdentity;

/// How baseline data is collected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SamplingMode {
    /// Single-point snapshot.
    Instant,
    /// Two snapshots separated by an interval, for per-second rates over
    /// cumulative counters.
    Delta,
}

/// Baseline collection strategy.
#[derive(Debug, Clone, Copy)]
pub struct SamplingConfig {
    pub mode: SamplingMode,
    /// Only meaningful for [`SamplingMode::Delta`].
    pub interval: Duration,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            mode: SamplingMode::Instant,
            interval: Duration::from_secs(30),
        }
    }
}

/// Outcome of collecting a single diagnostic section. Unavailable sections
/// carry a warning message but do not block the snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SectionResult {
    pub available: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl SectionResult {
    pub fn available(data: impl Serialize) -> Self {
        Self {
            available: true,
            error: None,
            data: serde_json::to_value(data).ok(),
        }
    }

    pub fn unavailable(error: impl Into<String>) -> Self {
        Self {
            available: false,
            error: Some(error.into()),
            data: None,
        }
    }
}

/// A read-only, degradable collection of diagnostic data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagSnapshot {
    pub identity: ClusterIdentity,
    pub collected_at: DateTime<Utc>,
    pub sampling_mode: SamplingMode,
    pub sections: BTreeMap<String, SectionResult>,
}

impl DiagSnapshot {
    /// Convenience accessor for a named section.
    pub fn section(&self, name: &str) -> Option<&SectionResult> {
        self.sections.get(name)
    }
}

/// Whether a prerequisite (extension, function, view) is usable on the
/// connected server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrereqResult {
    pub name: String,
    pub available: bool,
    pub version: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
