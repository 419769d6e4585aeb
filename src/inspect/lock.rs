//! On-disk apply lock, one per cluster fingerprint.
//!
//! At most one apply or rollback may run against a cluster system-wide. The
//! lock is a JSON record at `<base>/<fingerprint>/.lock`; acquisition fails
//! with a contention error naming the current holder. There is no lease or
//! stale-lock detection: a crashed apply strands the lock until an operator
//! removes it (the record carries pid and start time to make that call).

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{PgdbaError, Result};

const LOCK_FILE_NAME: &str = ".lock";

/// An in-progress apply or rollback operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplyLock {
    pub changeset_id: String,
    pub pid: u32,
    pub started_at: DateTime<Utc>,
    /// `"apply"` or `"rollback"`.
    pub operation: String,
}

impl ApplyLock {
    /// Build a lock record for the current process.
    pub fn new(changeset_id: impl Into<String>, operation: impl Into<String>) -> Self {
        Self {
            changeset_id: changeset_id.into(),
            pid: std::process::id(),
            started_at: Utc::now(),
            operation: operation.into(),
        }
    }
}

fn lock_path(base_dir: &Path, fingerprint: &str) -> PathBuf {
    base_dir.join(fingerprint).join(LOCK_FILE_NAME)
}

/// Create the lock file under `base_dir/<fingerprint>/.lock`. Fails with
/// [`PgdbaError::LockContention`] if a lock already exists.
pub fn acquire_lock(base_dir: &Path, fingerprint: &str, lock: &ApplyLock) -> Result<()> {
    if let Some(existing) = check_lock(base_dir, fingerprint)? {
        return Err(PgdbaError::LockContention {
            changeset_id: existing.changeset_id,
            pid: existing.pid,
            operation: existing.operation,
            started_at: existing.started_at,
        });
    }

    let dir = base_dir.join(fingerprint);
    create_private_dir(&dir)?;

    let path = lock_path(base_dir, fingerprint);
    write_private_file(&path, &serde_json::to_vec(lock)?)?;
    Ok(())
}

/// Remove the lock file. A missing lock is not an error (idempotent).
pub fn release_lock(base_dir: &Path, fingerprint: &str) -> Result<()> {
    match fs::remove_file(lock_path(base_dir, fingerprint)) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Return the current lock holder, or `None` if no lock exists.
pub fn check_lock(base_dir: &Path, fingerprint: &str) -> Result<Option<ApplyLock>> {
    let data = match fs::read(lock_path(base_dir, fingerprint)) {
        Ok(data) => data,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    Ok(Some(serde_json::from_slice(&data)?))
}

fn create_private_dir(dir: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        let mut builder = fs::DirBuilder::new();
        builder.recursive(true).mode(0o700);
        builder.create(dir)?;
    }
    #[cfg(not(unix))]
    fs::create_dir_all(dir)?;
    Ok(())
}

fn write_private_file(path: &Path, data: &[u8]) -> Result<()> {
    fs::write(path, data)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;
    }
    Ok(())
}
