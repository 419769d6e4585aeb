//! Command implementations.
//!
//! Each family module exposes `execute(args, ctx) -> Response`; the core
//! does the work, these modules resolve inputs and wrap outcomes in the
//! envelope. Failure envelopes always carry the core error message intact.

pub mod baseline;
pub mod cluster;
pub mod config;
pub mod failover;
pub mod health;
pub mod inspect;
pub mod query;
pub mod replica;

use pgdba::cluster::Registry;
use pgdba::config::{Config, PgConfig};
use pgdba::error::{PgdbaError, Result};

/// Shared command context: loaded configuration and the cluster registry.
pub struct Ctx {
    pub cfg: Config,
    pub registry: Registry,
    pub provider: String,
}

/// Resolve the Patroni URL from an explicit flag or a registry lookup.
pub fn resolve_patroni_url(ctx: &Ctx, name: &str, patroni_url: &str) -> Result<String> {
    if !patroni_url.is_empty() {
        return Ok(patroni_url.to_string());
    }
    if name.is_empty() {
        return Err(PgdbaError::Validation(
            "either --name or --patroni-url must be provided".into(),
        ));
    }
    Ok(ctx.registry.get(name)?.patroni_url)
}

/// Resolve PostgreSQL connection settings from the registry entry (if a
/// cluster name was given) layered over the global configuration.
pub fn resolve_pg_config(ctx: &Ctx, name: &str) -> Result<PgConfig> {
    let mut pg = ctx.cfg.pg.clone();

    if !name.is_empty() {
        let entry = ctx.registry.get(name)?;
        if !entry.pg_host.is_empty() {
            pg.host = entry.pg_host;
        }
        if entry.pg_port > 0 {
            pg.port = entry.pg_port;
        }
    }

    if pg.host.is_empty() {
        return Err(PgdbaError::Validation(
            "pg host not configured: use --name, PGDBA_PG_HOST, or a config file".into(),
        ));
    }
    Ok(pg)
}

#[cfg(test)]
pub(crate) mod testutil {
    use super::*;
    use pgdba::cluster::{Entry, Source};
    use tempfile::TempDir;

    /// A context backed by a throwaway registry file.
    pub fn ctx_with_registry(entries: Vec<Entry>) -> (Ctx, TempDir) {
        let dir = TempDir::new().unwrap();
        let registry = Registry::new(dir.path().join("clusters.json"));
        for e in entries {
            registry.add(e).unwrap();
        }
        let ctx = Ctx {
            cfg: Config::default(),
            registry,
            provider: "docker".into(),
        };
        (ctx, dir)
    }

    pub fn external_entry(name: &str, patroni_url: &str) -> Entry {
        Entry {
            name: name.into(),
            patroni_url: patroni_url.into(),
            pg_host: "10.0.0.1".into(),
            pg_port: 5432,
            provider: "docker".into(),
            source: Source::External,
            created_at: chrono::Utc::now(),
            labels: None,
        }
    }

    pub fn managed_entry(name: &str, patroni_url: &str) -> Entry {
        Entry {
            source: Source::Managed,
            ..external_entry(name, patroni_url)
        }
    }
}
