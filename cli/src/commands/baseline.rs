//! Baseline collection and comparison commands.

use clap::{Args, Subcommand};

use pgdba::error::PgdbaError;
use pgdba::inspect::{collect, PgSetting, SamplingConfig, SamplingMode};
use pgdba::output::Response;
use pgdba::postgres;
use pgdba::tuning::{
    generate_recommendations, Profile, Recommendation, StorageType, SystemInfo, Workload,
};

use super::{resolve_pg_config, Ctx};

#[derive(Args)]
pub struct BaselineArgs {
    #[command(subcommand)]
    command: BaselineCommands,
}

#[derive(Subcommand)]
enum BaselineCommands {
    /// Collect a baseline snapshot with tuning recommendations
    Collect {
        /// Cluster name (resolves connection settings from the registry)
        #[arg(long, default_value = "")]
        name: String,

        /// Enable delta sampling
        #[arg(long)]
        delta: bool,

        /// Delta sampling interval in seconds
        #[arg(long, default_value_t = 30)]
        interval: u64,

        /// Save the baseline to a file path
        #[arg(long, default_value = "")]
        save: String,

        /// Workload type for recommendations (oltp, olap, mixed)
        #[arg(long, default_value = "oltp")]
        workload: String,

        /// Total RAM in GB
        #[arg(long, default_value_t = 8)]
        ram_gb: i64,

        /// CPU cores
        #[arg(long, default_value_t = 4)]
        cpu_cores: i32,

        /// Storage type (ssd, hdd)
        #[arg(long, default_value = "ssd")]
        storage: String,
    },

    /// Compare two saved baseline snapshots
    Diff {
        /// Path to the "before" baseline JSON
        #[arg(long, default_value = "")]
        before: String,

        /// Path to the "after" baseline JSON
        #[arg(long, default_value = "")]
        after: String,
    },
}

pub async fn execute(args: BaselineArgs, ctx: &Ctx) -> Response {
    match args.command {
        BaselineCommands::Collect {
            name,
            delta,
            interval,
            save,
            workload,
            ram_gb,
            cpu_cores,
            storage,
        } => {
            collect_baseline(
                ctx, &name, delta, interval, &save, &workload, ram_gb, cpu_cores, &storage,
            )
            .await
        }
        BaselineCommands::Diff { before, after } => diff(&before, &after),
    }
}

#[allow(clippy::too_many_arguments)]
async fn collect_baseline(
    ctx: &Ctx,
    name: &str,
    delta: bool,
    interval: u64,
    save: &str,
    workload: &str,
    ram_gb: i64,
    cpu_cores: i32,
    storage: &str,
) -> Response {
    const CMD: &str = "baseline collect";

    let workload: Workload = match workload.parse() {
        Ok(w) => w,
        Err(e) => return Response::failure(CMD, e),
    };
    let storage: StorageType = match storage.parse() {
        Ok(s) => s,
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

    let sampling = SamplingConfig {
        mode: if delta {
            SamplingMode::Delta
        } else {
            SamplingMode::Instant
        },
        interval: std::time::Duration::from_secs(interval),
    };

    let snap = match collect(&db, sampling, &pg.host, pg.port as i32).await {
        Ok(snap) => snap,
        Err(e) => return Response::failure(CMD, format!("collect snapshot: {e}")),
    };

    // Recommendations ride along when settings were collectable.
    let mut recommendations: Vec<Recommendation> = Vec::new();
    if let Some(section) = snap.section("pg_settings") {
        if section.available {
            if let Some(data) = &section.data {
                if let Ok(settings) = serde_json::from_value::<Vec<PgSetting>>(data.clone()) {
                    let sys = SystemInfo {
                        total_ram_bytes: ram_gb * 1024 * 1024 * 1024,
                        cpu_cores,
                        storage,
                    };
                    recommendations =
                        generate_recommendations(&settings, sys, workload, Profile::Default);
                }
            }
        }
    }

    let mut report = serde_json::json!({
        "identity": snap.identity,
        "collected_at": snap.collected_at,
        "sampling_mode": snap.sampling_mode,
        "sections": snap.sections,
        "recommendations": recommendations,
    });

    if !save.is_empty() {
        if let Err(e) = save_report(save, &report) {
            return Response::failure(CMD, format!("save baseline: {e}"));
        }
        report["saved_to"] = serde_json::Value::String(save.to_string());
    }

    Response::success(CMD, report)
}

fn save_report(path: &str, report: &serde_json::Value) -> pgdba::Result<()> {
    let data = serde_json::to_vec_pretty(report)?;
    std::fs::write(path, data)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    }
    Ok(())
}

fn diff(before: &str, after: &str) -> Response {
    const CMD: &str = "baseline diff";

    if before.is_empty() || after.is_empty() {
        return Response::failure(
            CMD,
            PgdbaError::Validation("both --before and --after flags are required".into()),
        );
    }

    let before_data = match read_baseline(before) {
        Ok(v) => v,
        Err(e) => return Response::failure(CMD, format!("read before file: {e}")),
    };
    let after_data = match read_baseline(after) {
        Ok(v) => v,
        Err(e) => return Response::failure(CMD, format!("read after file: {e}")),
    };

    Response::success(
        CMD,
        serde_json::json!({
            "before_file": before,
            "after_file": after,
            "before": before_data,
            "after": after_data,
        }),
    )
}

fn read_baseline(path: &str) -> pgdba::Result<serde_json::Value> {
    let data = std::fs::read(path)?;
    Ok(serde_json::from_slice(&data)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_diff_requires_both_paths() {
        let resp = diff("", "after.json");
        assert!(!resp.success);
        assert!(resp.error.unwrap().contains("--before and --after"));
    }

    #[test]
    fn test_diff_loads_both_files() {
        let dir = TempDir::new().unwrap();
        let before = dir.path().join("before.json");
        let after = dir.path().join("after.json");
        std::fs::write(&before, r#"{"collected_at":"t0"}"#).unwrap();
        std::fs::write(&after, r#"{"collected_at":"t1"}"#).unwrap();

        let resp = diff(before.to_str().unwrap(), after.to_str().unwrap());
        assert!(resp.success);
        let data = resp.data.unwrap();
        assert_eq!(data["before"]["collected_at"], "t0");
        assert_eq!(data["after"]["collected_at"], "t1");
    }

    #[test]
    fn test_diff_reports_unreadable_file() {
        let resp = diff("/nonexistent/before.json", "/nonexistent/after.json");
        assert!(!resp.success);
        assert!(resp.error.unwrap().contains("read before file"));
    }

    #[cfg(unix)]
    #[test]
    fn test_saved_report_is_private() {
        use std::os::unix::fs::PermissionsExt;
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("baseline.json");
        save_report(path.to_str().unwrap(), &serde_json::json!({"ok": true})).unwrap();

        let meta = std::fs::metadata(&path).unwrap();
        assert_eq!(meta.permissions().mode() & 0o777, 0o600);
    }
}
