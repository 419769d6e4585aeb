//! PostgreSQL configuration commands: show, diff, tune.

use clap::{Args, Subcommand};

use pgdba::cluster::snapshots_dir;
use pgdba::inspect::{
    acquire_lock, collect, release_lock, ApplyLock, InspectDb, PgDb, PgSetting, SamplingConfig,
};
use pgdba::output::Response;
use pgdba::postgres;
use pgdba::tuning::{
    self, generate_recommendations, ChangeSet, ParamChange, ParamPermission, PatroniOverrideLevel,
    Profile, Recommendation, StorageType, SystemInfo, Workload,
};

use super::{resolve_pg_config, Ctx};

#[derive(Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    command: ConfigCommands,
}

#[derive(Args, Clone)]
struct TuningFlags {
    /// Workload type (oltp, olap, mixed)
    #[arg(long, default_value = "oltp")]
    workload: String,

    /// Storage type (ssd, hdd)
    #[arg(long, default_value = "ssd")]
    storage: String,

    /// Total RAM in GB
    #[arg(long, default_value_t = 8)]
    ram_gb: i64,

    /// CPU cores
    #[arg(long, default_value_t = 4)]
    cpu_cores: i32,

    /// Tuning profile (default, conservative)
    #[arg(long, default_value = "default")]
    profile: String,
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Show the current PostgreSQL configuration
    Show {
        /// Cluster name (resolves connection settings from the registry)
        #[arg(long, default_value = "")]
        name: String,
    },

    /// Compare current configuration against recommended values
    Diff {
        /// Cluster name (resolves connection settings from the registry)
        #[arg(long, default_value = "")]
        name: String,

        #[command(flatten)]
        tuning: TuningFlags,
    },

    /// Generate recommendations and optionally apply them as a change-set
    Tune {
        /// Cluster name (resolves connection settings from the registry)
        #[arg(long, default_value = "")]
        name: String,

        #[command(flatten)]
        tuning: TuningFlags,

        /// Apply the generated change-set under the cluster's apply lock
        #[arg(long)]
        apply: bool,

        /// Validate the change-set without applying it
        #[arg(long)]
        dry_run: bool,
    },
}

pub async fn execute(args: ConfigArgs, ctx: &Ctx) -> Response {
    match args.command {
        ConfigCommands::Show { name } => show(ctx, &name).await,
        ConfigCommands::Diff { name, tuning } => diff(ctx, &name, &tuning).await,
        ConfigCommands::Tune {
            name,
            tuning,
            apply,
            dry_run,
        } => tune(ctx, &name, &tuning, apply, dry_run).await,
    }
}

async fn show(ctx: &Ctx, name: &str) -> Response {
    const CMD: &str = "config show";

    let db = match connect(ctx, name).await {
        Ok(db) => db,
        Err(e) => return Response::failure(CMD, e),
    };
    match db.pg_settings().await {
        Ok(settings) => Response::success(
            CMD,
            serde_json::json!({
                "count": settings.len(),
                "settings": settings,
            }),
        ),
        Err(e) => Response::failure(CMD, e),
    }
}

async fn diff(ctx: &Ctx, name: &str, flags: &TuningFlags) -> Response {
    const CMD: &str = "config diff";

    let inputs = match TuningInputs::parse(flags) {
        Ok(i) => i,
        Err(e) => return Response::failure(CMD, e),
    };
    let db = match connect(ctx, name).await {
        Ok(db) => db,
        Err(e) => return Response::failure(CMD, e),
    };
    let settings = match db.pg_settings().await {
        Ok(s) => s,
        Err(e) => return Response::failure(CMD, e),
    };

    let recs = generate_recommendations(&settings, inputs.sys, inputs.workload, inputs.profile);
    let changed: Vec<&Recommendation> =
        recs.iter().filter(|r| r.current != r.recommended).collect();

    Response::success(
        CMD,
        serde_json::json!({
            "total_recommendations": recs.len(),
            "changes_needed": changed.len(),
            "recommendations": changed,
        }),
    )
}

async fn tune(ctx: &Ctx, name: &str, flags: &TuningFlags, apply: bool, dry_run: bool) -> Response {
    const CMD: &str = "config tune";

    let inputs = match TuningInputs::parse(flags) {
        Ok(i) => i,
        Err(e) => return Response::failure(CMD, e),
    };
    let pg = match resolve_pg_config(ctx, name) {
        Ok(pg) => pg,
        Err(e) => return Response::failure(CMD, e),
    };
    let db = match postgres::connect(&pg).await {
        Ok(db) => db,
        Err(e) => return Response::failure(CMD, e),
    };

    // The snapshot doubles as the change-set pre-image and carries the
    // fingerprint the apply lock is keyed on.
    let snap = match collect(&db, SamplingConfig::default(), &pg.host, pg.port as i32).await {
        Ok(snap) => snap,
        Err(e) => return Response::failure(CMD, format!("collect snapshot: {e}")),
    };
    let settings = match db.pg_settings().await {
        Ok(s) => s,
        Err(e) => return Response::failure(CMD, e),
    };

    let recs = generate_recommendations(&settings, inputs.sys, inputs.workload, inputs.profile);
    let patroni_managed = !name.is_empty()
        && ctx
            .registry
            .get(name)
            .map(|e| !e.patroni_url.is_empty())
            .unwrap_or(false);
    let params = build_param_changes(&recs, &settings, patroni_managed);

    let mut result = serde_json::json!({
        "recommendations": recs,
        "changes_needed": params.len(),
    });

    if params.is_empty() || (!apply && !dry_run) {
        if dry_run && params.is_empty() {
            result["dry_run"] = serde_json::json!({
                "ok": true,
                "warnings": ["no changes needed: current config matches recommendations"],
                "errors": [],
            });
        }
        return Response::success(CMD, result);
    }

    let mut cs = ChangeSet::new(snap.identity.fingerprint.clone(), params);
    cs.pre_snapshot = Some(snap);

    let dry = match tuning::dry_run(&db, &cs).await {
        Ok(d) => d,
        Err(e) => return Response::failure(CMD, e),
    };
    result["changeset_id"] = serde_json::Value::String(cs.id.clone());
    result["dry_run"] = serde_json::to_value(&dry).unwrap_or_default();
    cs.dry_run_result = Some(dry.clone());

    if dry_run || !apply {
        return Response::success(CMD, result);
    }
    if !dry.ok {
        return Response::failure(
            CMD,
            format!("dry-run failed with {} error(s); not applying", dry.errors.len()),
        );
    }

    let base_dir = match snapshots_dir() {
        Ok(dir) => dir,
        Err(e) => return Response::failure(CMD, e),
    };
    let lock = ApplyLock::new(cs.id.clone(), "apply");
    if let Err(e) = acquire_lock(&base_dir, &cs.fingerprint, &lock) {
        return Response::failure(CMD, e);
    }

    let applied = tuning::apply(&db, &mut cs).await;
    let released = release_lock(&base_dir, &cs.fingerprint);

    match (applied, released) {
        (Err(e), _) => Response::failure(CMD, e),
        (Ok(()), Err(e)) => Response::failure(CMD, format!("applied, but lock release failed: {e}")),
        (Ok(()), Ok(())) => {
            result["applied_at"] = serde_json::to_value(cs.applied_at).unwrap_or_default();
            Response::success(CMD, result)
        }
    }
}

#[derive(Debug)]
struct TuningInputs {
    workload: Workload,
    profile: Profile,
    sys: SystemInfo,
}

impl TuningInputs {
    fn parse(flags: &TuningFlags) -> pgdba::Result<Self> {
        let workload: Workload = flags.workload.parse()?;
        let storage: StorageType = flags.storage.parse()?;
        let profile = match flags.profile.as_str() {
            "default" => Profile::Default,
            "conservative" => Profile::Conservative,
            other => {
                return Err(pgdba::PgdbaError::Validation(format!(
                    "invalid profile {other:?}: must be default or conservative"
                )))
            }
        };
        Ok(Self {
            workload,
            profile,
            sys: SystemInfo {
                total_ram_bytes: flags.ram_gb * 1024 * 1024 * 1024,
                cpu_cores: flags.cpu_cores,
                storage,
            },
        })
    }
}

/// Turn changed recommendations into a change-set, carrying each
/// parameter's context and restart semantics from `pg_settings`.
fn build_param_changes(
    recs: &[Recommendation],
    settings: &[PgSetting],
    patroni_managed: bool,
) -> Vec<ParamChange> {
    let context_of = |name: &str| {
        settings
            .iter()
            .find(|s| s.name == name)
            .map(|s| s.context.clone())
            .unwrap_or_default()
    };

    recs.iter()
        .filter(|r| r.current != r.recommended)
        .map(|r| {
            let context = context_of(&r.parameter);
            ParamChange {
                name: r.parameter.clone(),
                old_value: r.current.clone(),
                new_value: r.recommended.clone(),
                needs_restart: context == "postmaster",
                context,
                permission: ParamPermission::allowed(),
                patroni_override: if patroni_managed {
                    PatroniOverrideLevel::Unknown
                } else {
                    PatroniOverrideLevel::NotManaged
                },
            }
        })
        .collect()
}

async fn connect(ctx: &Ctx, name: &str) -> pgdba::Result<PgDb> {
    let pg = resolve_pg_config(ctx, name)?;
    postgres::connect(&pg).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use pgdba::tuning::ConfidenceLevel;

    fn setting(name: &str, value: &str, context: &str) -> PgSetting {
        PgSetting {
            name: name.into(),
            setting: value.into(),
            context: context.into(),
            ..Default::default()
        }
    }

    fn rec(parameter: &str, current: &str, recommended: &str) -> Recommendation {
        Recommendation {
            parameter: parameter.into(),
            current: current.into(),
            recommended: recommended.into(),
            confidence: ConfidenceLevel::High,
            rationale: "test".into(),
            source: "pgtune".into(),
        }
    }

    #[test]
    fn test_build_param_changes_skips_matching_values() {
        let settings = vec![
            setting("shared_buffers", "4GB", "postmaster"),
            setting("work_mem", "4MB", "user"),
        ];
        let recs = vec![
            rec("shared_buffers", "4GB", "4GB"),
            rec("work_mem", "4MB", "40MB"),
        ];

        let params = build_param_changes(&recs, &settings, false);
        assert_eq!(params.len(), 1);
        assert_eq!(params[0].name, "work_mem");
        assert_eq!(params[0].context, "user");
        assert!(!params[0].needs_restart);
        assert_eq!(params[0].patroni_override, PatroniOverrideLevel::NotManaged);
    }

    #[test]
    fn test_build_param_changes_marks_postmaster_restart() {
        let settings = vec![setting("shared_buffers", "1GB", "postmaster")];
        let recs = vec![rec("shared_buffers", "1GB", "4GB")];

        let params = build_param_changes(&recs, &settings, true);
        assert!(params[0].needs_restart);
        assert_eq!(params[0].patroni_override, PatroniOverrideLevel::Unknown);
    }

    #[test]
    fn test_tuning_inputs_validate_flags() {
        let bad_workload = TuningFlags {
            workload: "webscale".into(),
            storage: "ssd".into(),
            ram_gb: 8,
            cpu_cores: 4,
            profile: "default".into(),
        };
        assert!(TuningInputs::parse(&bad_workload).is_err());

        let bad_profile = TuningFlags {
            workload: "oltp".into(),
            storage: "ssd".into(),
            ram_gb: 8,
            cpu_cores: 4,
            profile: "yolo".into(),
        };
        let err = TuningInputs::parse(&bad_profile).unwrap_err();
        assert!(err.to_string().contains("yolo"));
    }
}
