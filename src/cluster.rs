//! Cluster registry.
//!
//! Known clusters are recorded in a single JSON file at
//! `~/.pgdba/clusters.json`, keyed by name. Writes are whole-file
//! overwrites with mode 0600; concurrent writes are last-writer-wins, which
//! is acceptable because registry changes are rare and operator-initiated.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{PgdbaError, Result};

/// Origin of a cluster entry. Only `managed` clusters may be destroyed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    /// Created by `pgdba cluster init`; pgdba owns its lifecycle.
    Managed,
    /// Imported by `pgdba cluster connect`; pgdba was merely introduced.
    External,
}

/// A cluster record in the registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entry {
    pub name: String,
    pub patroni_url: String,
    pub pg_host: String,
    pub pg_port: u16,
    pub provider: String,
    pub source: Source,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub labels: Option<BTreeMap<String, String>>,
}

/// Name-to-entry registry persisted to a JSON file.
pub struct Registry {
    path: PathBuf,
}

impl Registry {
    /// Registry backed by an explicit file path.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Registry backed by `~/.pgdba/clusters.json`, creating the directory
    /// (mode 0700) if needed.
    pub fn default_location() -> Result<Self> {
        let dir = pgdba_home()?;
        create_private_dir(&dir)?;
        Ok(Self::new(dir.join("clusters.json")))
    }

    /// Insert or overwrite an entry, keyed by name.
    pub fn add(&self, entry: Entry) -> Result<()> {
        let mut entries = self.load()?;
        entries.insert(entry.name.clone(), entry);
        self.save(&entries)
    }

    /// Look up an entry by name.
    pub fn get(&self, name: &str) -> Result<Entry> {
        self.load()?
            .remove(name)
            .ok_or_else(|| PgdbaError::ClusterNotFound(name.to_string()))
    }

    /// All entries, ordered by name.
    pub fn list(&self) -> Result<Vec<Entry>> {
        Ok(self.load()?.into_values().collect())
    }

    /// Delete an entry by name.
    pub fn remove(&self, name: &str) -> Result<()> {
        let mut entries = self.load()?;
        if entries.remove(name).is_none() {
            return Err(PgdbaError::ClusterNotFound(name.to_string()));
        }
        self.save(&entries)
    }

    fn load(&self) -> Result<BTreeMap<String, Entry>> {
        let data = match fs::read(&self.path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(e) => return Err(e.into()),
        };
        if data.is_empty() {
            return Ok(BTreeMap::new());
        }
        Ok(serde_json::from_slice(&data)?)
    }

    fn save(&self, entries: &BTreeMap<String, Entry>) -> Result<()> {
        let data = serde_json::to_vec_pretty(entries)?;
        fs::write(&self.path, data)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&self.path, fs::Permissions::from_mode(0o600))?;
        }
        Ok(())
    }
}

/// The pgdba home directory, `~/.pgdba`.
pub fn pgdba_home() -> Result<PathBuf> {
    if let Ok(home) = std::env::var("PGDBA_HOME") {
        return Ok(PathBuf::from(home));
    }
    dirs::home_dir()
        .map(|h| h.join(".pgdba"))
        .ok_or_else(|| PgdbaError::Config("cannot determine home directory".into()))
}

/// Root directory for per-fingerprint snapshot state and apply locks,
/// `~/.pgdba/snapshots`, created (mode 0700) on first use.
pub fn snapshots_dir() -> Result<PathBuf> {
    let dir = pgdba_home()?.join("snapshots");
    create_private_dir(&dir)?;
    Ok(dir)
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

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn entry(name: &str, source: Source) -> Entry {
        Entry {
            name: name.into(),
            patroni_url: "http://10.0.0.1:8008".into(),
            pg_host: "10.0.0.1".into(),
            pg_port: 5432,
            provider: "docker".into(),
            source,
            created_at: Utc::now(),
            labels: None,
        }
    }

    #[test]
    fn test_add_get_list_remove() {
        let dir = TempDir::new().unwrap();
        let reg = Registry::new(dir.path().join("clusters.json"));

        reg.add(entry("prod", Source::External)).unwrap();
        reg.add(entry("staging", Source::Managed)).unwrap();

        let got = reg.get("prod").unwrap();
        assert_eq!(got.source, Source::External);

        let names: Vec<String> = reg.list().unwrap().into_iter().map(|e| e.name).collect();
        assert_eq!(names, vec!["prod", "staging"]);

        reg.remove("prod").unwrap();
        assert!(matches!(
            reg.get("prod"),
            Err(PgdbaError::ClusterNotFound(_))
        ));
    }

    #[test]
    fn test_missing_file_is_empty_registry() {
        let dir = TempDir::new().unwrap();
        let reg = Registry::new(dir.path().join("clusters.json"));
        assert!(reg.list().unwrap().is_empty());
    }

    #[test]
    fn test_get_unknown_cites_name() {
        let dir = TempDir::new().unwrap();
        let reg = Registry::new(dir.path().join("clusters.json"));
        let err = reg.get("ghost").unwrap_err();
        assert!(err.to_string().contains("ghost"));
    }

    #[test]
    fn test_add_overwrites_by_name() {
        let dir = TempDir::new().unwrap();
        let reg = Registry::new(dir.path().join("clusters.json"));

        reg.add(entry("prod", Source::External)).unwrap();
        let mut updated = entry("prod", Source::External);
        updated.pg_port = 6432;
        reg.add(updated).unwrap();

        assert_eq!(reg.get("prod").unwrap().pg_port, 6432);
        assert_eq!(reg.list().unwrap().len(), 1);
    }

    #[test]
    fn test_source_serializes_lowercase() {
        assert_eq!(serde_json::to_value(Source::Managed).unwrap(), "managed");
        assert_eq!(serde_json::to_value(Source::External).unwrap(), "external");
    }

    #[cfg(unix)]
    #[test]
    fn test_registry_file_is_private() {
        use std::os::unix::fs::PermissionsExt;
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("clusters.json");
        let reg = Registry::new(&path);
        reg.add(entry("prod", Source::Managed)).unwrap();

        let meta = std::fs::metadata(&path).unwrap();
        assert_eq!(meta.permissions().mode() & 0o777, 0o600);
    }
}
