//! The change-set pipeline: dry-run, apply, rollback.
//!
//! A change-set is a recorded, rollback-capable batch of parameter
//! mutations. Apply issues `ALTER SYSTEM SET` sequentially with no
//! cross-parameter atomicity; the first failure aborts and the operator
//! decides between retry and an explicit rollback. The on-disk apply lock
//! (see `inspect::lock`) must be held around apply and rollback.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::error::{PgdbaError, Result};
use crate::inspect::{DiagSnapshot, PgDb, PgSetting};

/// How Patroni's DCS interacts with a parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatroniOverrideLevel {
    /// The parameter exists in DCS `postgresql.parameters`; a local ALTER
    /// SYSTEM change may be reverted when Patroni restarts.
    Overridden,
    /// Patroni manages the instance but the parameter is not in DCS.
    NotSetButEphemeral,
    /// Patroni `/config` is unreachable or not configured.
    Unknown,
    /// Standalone PostgreSQL without Patroni.
    NotManaged,
}

/// Whether a parameter can be modified with the current privileges.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParamPermission {
    pub allowed: bool,
    pub reason: String,
    pub min_role: String,
}

impl ParamPermission {
    pub fn allowed() -> Self {
        Self {
            allowed: true,
            reason: String::new(),
            min_role: "superuser".into(),
        }
    }

    pub fn denied(reason: impl Into<String>, min_role: impl Into<String>) -> Self {
        Self {
            allowed: false,
            reason: reason.into(),
            min_role: min_role.into(),
        }
    }
}

/// A single parameter mutation within a change-set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParamChange {
    pub name: String,
    pub old_value: String,
    pub new_value: String,
    /// `pg_settings.context`: `sighup`, `postmaster`, `user`, `backend`.
    pub context: String,
    pub needs_restart: bool,
    pub permission: ParamPermission,
    pub patroni_override: PatroniOverrideLevel,
}

impl ParamChange {
    fn restart_gated(&self) -> bool {
        self.needs_restart || self.context == "postmaster"
    }
}

/// Outcome of a dry-run. Warnings never flip `ok`; errors always do.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DryRunResult {
    pub ok: bool,
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
}

/// A recorded, rollback-capable batch of parameter changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeSet {
    pub id: String,
    pub fingerprint: String,
    pub parameters: Vec<ParamChange>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub applied_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rolled_back_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pre_snapshot: Option<DiagSnapshot>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dry_run_result: Option<DryRunResult>,
}

impl ChangeSet {
    /// Create a fresh change-set for the given cluster fingerprint.
    pub fn new(fingerprint: impl Into<String>, parameters: Vec<ParamChange>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            fingerprint: fingerprint.into(),
            parameters,
            created_at: Utc::now(),
            applied_at: None,
            rolled_back_at: None,
            pre_snapshot: None,
            dry_run_result: None,
        }
    }
}

/// The database operations the pipeline needs.
#[async_trait]
pub trait ApplyDb: Send + Sync {
    async fn get_setting(&self, name: &str) -> Result<PgSetting>;
    async fn alter_system(&self, name: &str, value: &str) -> Result<()>;
    async fn alter_system_reset(&self, name: &str) -> Result<()>;
    async fn reload_conf(&self) -> Result<()>;
}

/// Validate a change-set without mutating anything.
pub async fn dry_run(db: &dyn ApplyDb, cs: &ChangeSet) -> Result<DryRunResult> {
    let mut result = DryRunResult {
        ok: true,
        ..Default::default()
    };

    for p in &cs.parameters {
        if !p.permission.allowed {
            result.ok = false;
            result.errors.push(format!(
                "{}: permission denied ({})",
                p.name, p.permission.reason
            ));
            continue;
        }

        if p.patroni_override == PatroniOverrideLevel::Overridden {
            result.warnings.push(format!(
                "{}: overridden by Patroni DCS; an ALTER SYSTEM change may be reverted on the next Patroni restart",
                p.name
            ));
        }

        if p.restart_gated() {
            result.warnings.push(format!(
                "{}: requires PostgreSQL restart to take effect (context={})",
                p.name, p.context
            ));
        }

        if let Err(e) = db.get_setting(&p.name).await {
            result.ok = false;
            result.errors.push(format!("{}: setting not found ({e})", p.name));
        }
    }

    Ok(result)
}

/// Execute the change-set: `ALTER SYSTEM SET` per parameter, then a single
/// `pg_reload_conf()` if any parameter takes effect without a restart.
/// The first failure aborts with no automatic rollback.
pub async fn apply(db: &dyn ApplyDb, cs: &mut ChangeSet) -> Result<()> {
    let mut needs_reload = false;

    for p in &cs.parameters {
        db.alter_system(&p.name, &p.new_value).await?;
        if !p.restart_gated() {
            needs_reload = true;
        }
    }

    if needs_reload {
        db.reload_conf().await?;
    }

    cs.applied_at = Some(Utc::now());
    info!(changeset = %cs.id, parameters = cs.parameters.len(), "change-set applied");
    Ok(())
}

/// Revert a change-set: parameters with a recorded old value are set back,
/// the rest are `ALTER SYSTEM RESET` to their defaults.
pub async fn rollback(db: &dyn ApplyDb, cs: &mut ChangeSet) -> Result<()> {
    let mut needs_reload = false;

    for p in &cs.parameters {
        let old = p.old_value.trim();
        if old.is_empty() {
            db.alter_system_reset(&p.name).await?;
        } else {
            db.alter_system(&p.name, old).await?;
        }
        if !p.restart_gated() {
            needs_reload = true;
        }
    }

    if needs_reload {
        db.reload_conf().await?;
    }

    cs.rolled_back_at = Some(Utc::now());
    info!(changeset = %cs.id, "change-set rolled back");
    Ok(())
}

#[async_trait]
impl ApplyDb for PgDb {
    async fn get_setting(&self, name: &str) -> Result<PgSetting> {
        let row = self
            .client()
            .query_opt(
                "SELECT name, setting, COALESCE(unit,''), context, COALESCE(vartype,''), \
                        COALESCE(source,''), COALESCE(min_val,''), COALESCE(max_val,''), \
                        COALESCE(boot_val,''), COALESCE(reset_val,''), \
                        COALESCE(sourcefile,''), COALESCE(sourceline,0) \
                 FROM pg_settings WHERE name = $1",
                &[&name],
            )
            .await?
            .ok_or_else(|| PgdbaError::NotFound(format!("pg_settings has no row for {name:?}")))?;
        Ok(PgSetting {
            name: row.get(0),
            setting: row.get(1),
            unit: row.get(2),
            context: row.get(3),
            vartype: row.get(4),
            source: row.get(5),
            min_val: row.get(6),
            max_val: row.get(7),
            boot_val: row.get(8),
            reset_val: row.get(9),
            source_file: row.get(10),
            source_line: row.get(11),
        })
    }

    async fn alter_system(&self, name: &str, value: &str) -> Result<()> {
        // ALTER SYSTEM does not take bind parameters; the value is quoted
        // with embedded single quotes doubled.
        let sql = format!("ALTER SYSTEM SET {} = '{}'", name, value.replace('\'', "''"));
        self.client()
            .batch_execute(&sql)
            .await
            .map_err(|e| PgdbaError::AlterSystem {
                name: name.to_string(),
                value: value.to_string(),
                message: e.to_string(),
            })
    }

    async fn alter_system_reset(&self, name: &str) -> Result<()> {
        let sql = format!("ALTER SYSTEM RESET {name}");
        self.client()
            .batch_execute(&sql)
            .await
            .map_err(|e| PgdbaError::AlterSystem {
                name: name.to_string(),
                value: String::new(),
                message: e.to_string(),
            })
    }

    async fn reload_conf(&self) -> Result<()> {
        self.client()
            .batch_execute("SELECT pg_reload_conf()")
            .await
            .map_err(|e| PgdbaError::ReloadConf(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Records every statement the pipeline issues; individual parameters
    /// can be made to fail.
    #[derive(Default)]
    struct FakeApplyDb {
        calls: Mutex<Vec<String>>,
        missing: Vec<String>,
        fail_on: Option<String>,
    }

    impl FakeApplyDb {
        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn record(&self, call: String) {
            self.calls.lock().unwrap().push(call);
        }
    }

    #[async_trait]
    impl ApplyDb for FakeApplyDb {
        async fn get_setting(&self, name: &str) -> Result<PgSetting> {
            if self.missing.iter().any(|m| m == name) {
                return Err(PgdbaError::NotFound(format!(
                    "pg_settings has no row for {name:?}"
                )));
            }
            Ok(PgSetting {
                name: name.into(),
                setting: "current".into(),
                context: "sighup".into(),
                ..Default::default()
            })
        }

        async fn alter_system(&self, name: &str, value: &str) -> Result<()> {
            if self.fail_on.as_deref() == Some(name) {
                return Err(PgdbaError::AlterSystem {
                    name: name.into(),
                    value: value.into(),
                    message: "permission denied".into(),
                });
            }
            self.record(format!("SET {name}={value}"));
            Ok(())
        }

        async fn alter_system_reset(&self, name: &str) -> Result<()> {
            self.record(format!("RESET {name}"));
            Ok(())
        }

        async fn reload_conf(&self) -> Result<()> {
            self.record("RELOAD".into());
            Ok(())
        }
    }

    fn change(name: &str, context: &str) -> ParamChange {
        ParamChange {
            name: name.into(),
            old_value: "old".into(),
            new_value: "new".into(),
            context: context.into(),
            needs_restart: context == "postmaster",
            permission: ParamPermission::allowed(),
            patroni_override: PatroniOverrideLevel::NotManaged,
        }
    }

    #[tokio::test]
    async fn test_dry_run_permission_denied_is_error() {
        let db = FakeApplyDb::default();
        let mut p = change("work_mem", "user");
        p.permission = ParamPermission::denied("requires superuser", "superuser");
        let cs = ChangeSet::new("fp", vec![p]);

        let result = dry_run(&db, &cs).await.unwrap();
        assert!(!result.ok);
        assert_eq!(result.errors.len(), 1);
        assert!(result.errors[0].contains("permission denied (requires superuser)"));
        assert!(result.warnings.is_empty());
    }

    #[tokio::test]
    async fn test_dry_run_patroni_override_is_warning_only() {
        let db = FakeApplyDb::default();
        let mut p = change("work_mem", "user");
        p.patroni_override = PatroniOverrideLevel::Overridden;
        let cs = ChangeSet::new("fp", vec![p]);

        let result = dry_run(&db, &cs).await.unwrap();
        assert!(result.ok);
        assert_eq!(result.warnings.len(), 1);
        assert!(result.warnings[0].contains("Patroni"));
        assert!(result.errors.is_empty());
    }

    #[tokio::test]
    async fn test_dry_run_restart_warning_cites_context() {
        let db = FakeApplyDb::default();
        let cs = ChangeSet::new("fp", vec![change("shared_buffers", "postmaster")]);

        let result = dry_run(&db, &cs).await.unwrap();
        assert!(result.ok);
        assert!(result.warnings[0].contains("context=postmaster"));
    }

    #[tokio::test]
    async fn test_dry_run_unknown_setting_is_error() {
        let db = FakeApplyDb {
            missing: vec!["shard_buffers".into()],
            ..Default::default()
        };
        let cs = ChangeSet::new("fp", vec![change("shard_buffers", "sighup")]);

        let result = dry_run(&db, &cs).await.unwrap();
        assert!(!result.ok);
        assert!(result.errors[0].contains("setting not found"));
    }

    #[tokio::test]
    async fn test_dry_run_never_mutates() {
        let db = FakeApplyDb::default();
        let cs = ChangeSet::new("fp", vec![change("work_mem", "user")]);
        dry_run(&db, &cs).await.unwrap();
        assert!(db.calls().is_empty());
    }

    #[tokio::test]
    async fn test_apply_user_context_reloads_once() {
        let db = FakeApplyDb::default();
        let mut cs = ChangeSet::new(
            "fp",
            vec![change("work_mem", "user"), change("random_page_cost", "user")],
        );

        apply(&db, &mut cs).await.unwrap();

        assert!(cs.applied_at.is_some());
        let calls = db.calls();
        assert_eq!(
            calls,
            vec!["SET work_mem=new", "SET random_page_cost=new", "RELOAD"]
        );
    }

    #[tokio::test]
    async fn test_apply_postmaster_context_skips_reload() {
        let db = FakeApplyDb::default();
        let mut cs = ChangeSet::new("fp", vec![change("shared_buffers", "postmaster")]);

        apply(&db, &mut cs).await.unwrap();

        assert!(cs.applied_at.is_some());
        assert_eq!(db.calls(), vec!["SET shared_buffers=new"]);
    }

    #[tokio::test]
    async fn test_apply_aborts_on_first_failure() {
        let db = FakeApplyDb {
            fail_on: Some("bad_param".into()),
            ..Default::default()
        };
        let mut cs = ChangeSet::new(
            "fp",
            vec![
                change("work_mem", "user"),
                change("bad_param", "user"),
                change("random_page_cost", "user"),
            ],
        );

        let err = apply(&db, &mut cs).await.unwrap_err();
        assert!(err.to_string().contains("bad_param"));
        assert!(cs.applied_at.is_none());
        // The first parameter landed, the third was never attempted, no
        // reload was issued: partial state, by contract.
        assert_eq!(db.calls(), vec!["SET work_mem=new"]);
    }

    #[tokio::test]
    async fn test_rollback_resets_when_no_old_value() {
        let db = FakeApplyDb::default();
        let mut with_old = change("work_mem", "user");
        with_old.old_value = "4MB".into();
        let mut without_old = change("random_page_cost", "user");
        without_old.old_value = "  ".into();

        let mut cs = ChangeSet::new("fp", vec![with_old, without_old]);
        rollback(&db, &mut cs).await.unwrap();

        assert!(cs.rolled_back_at.is_some());
        assert_eq!(
            db.calls(),
            vec!["SET work_mem=4MB", "RESET random_page_cost", "RELOAD"]
        );
    }

    #[tokio::test]
    async fn test_changeset_ids_are_unique() {
        let a = ChangeSet::new("fp", vec![]);
        let b = ChangeSet::new("fp", vec![]);
        assert_ne!(a.id, b.id);
    }
}
