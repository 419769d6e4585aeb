//! Diagnostic snapshot collection.
//!
//! The collector takes one degradation-tolerant pass over a running
//! PostgreSQL instance: a required version read, a three-tier identity
//! fingerprint, prerequisite probes, and a set of independently fallible
//! data sections. A missing section is a warning inside the snapshot, never
//! a failure of the whole collection.

mod collector;
mod db;
mod identity;
mod lock;
mod types;

pub use collector::collect;
pub use db::{
    ActivityRow, BgWriterStats, InspectDb, PgDb, PgSetting, StatStatementsRow, WalStats,
};
pub use identity::{ClusterIdentity, IdentityTier};
pub use lock::{acquire_lock, check_lock, release_lock, ApplyLock};
pub use types::{DiagSnapshot, PrereqResult, SamplingConfig, SamplingMode, SectionResult};
