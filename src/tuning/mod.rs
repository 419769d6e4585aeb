//! Parameter tuning: recommendation engine and the change-set pipeline.

mod apply;
mod engine;

pub use apply::{
    apply, dry_run, rollback, ApplyDb, ChangeSet, DryRunResult, ParamChange, ParamPermission,
    PatroniOverrideLevel,
};
pub use engine::{
    generate_recommendations, ConfidenceLevel, Profile, Recommendation, StorageType, SystemInfo,
    Workload,
};
