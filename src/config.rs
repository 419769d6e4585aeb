//! Tool-wide configuration.
//!
//! Loaded from an optional YAML file plus `PGDBA_*` environment overrides.
//! The database password is intentionally absent from this structure; it is
//! read exclusively from the `PGDBA_PG_PASSWORD` environment variable at
//! connection time and never persisted or logged.

use serde::{Deserialize, Serialize};

use crate::error::{PgdbaError, Result};

pub const DEFAULT_PG_PORT: u16 = 5432;
pub const DEFAULT_SSL_MODE: &str = "prefer";
pub const DEFAULT_PG_USER: &str = "postgres";
pub const DEFAULT_PG_DATABASE: &str = "postgres";
pub const DEFAULT_PROVIDER: &str = "docker";

const VALID_PROVIDERS: &[&str] = &["docker", "baremetal", "kubernetes"];

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub cluster: ClusterConfig,
    #[serde(default)]
    pub provider: ProviderConfig,
    #[serde(default)]
    pub pg: PgConfig,
    #[serde(default)]
    pub monitor: MonitorConfig,
}

/// Cluster-level metadata.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClusterConfig {
    #[serde(default)]
    pub name: String,
}

/// Infrastructure provider selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(rename = "type", default = "default_provider")]
    pub kind: String,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            kind: default_provider(),
        }
    }
}

/// PostgreSQL connection parameters. No password field: see module docs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PgConfig {
    #[serde(default)]
    pub host: String,
    #[serde(default = "default_pg_port")]
    pub port: u16,
    #[serde(default = "default_pg_user")]
    pub user: String,
    #[serde(default = "default_pg_database")]
    pub database: String,
    #[serde(default = "default_ssl_mode")]
    pub sslmode: String,
}

impl Default for PgConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: default_pg_port(),
            user: default_pg_user(),
            database: default_pg_database(),
            sslmode: default_ssl_mode(),
        }
    }
}

/// Optional monitoring integration endpoints.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MonitorConfig {
    #[serde(default)]
    pub prometheus_url: String,
    #[serde(default)]
    pub grafana_url: String,
}

fn default_provider() -> String {
    DEFAULT_PROVIDER.to_string()
}

fn default_pg_port() -> u16 {
    DEFAULT_PG_PORT
}

fn default_pg_user() -> String {
    DEFAULT_PG_USER.to_string()
}

fn default_pg_database() -> String {
    DEFAULT_PG_DATABASE.to_string()
}

fn default_ssl_mode() -> String {
    DEFAULT_SSL_MODE.to_string()
}

impl Config {
    /// Load configuration from an optional YAML file, then apply
    /// environment overrides. With no file, defaults plus environment
    /// variables are used.
    pub fn load(path: Option<&str>) -> Result<Self> {
        let mut cfg = match path {
            Some(path) => {
                let content = std::fs::read_to_string(path).map_err(|e| {
                    PgdbaError::Config(format!("read config file {path}: {e}"))
                })?;
                serde_yaml::from_str(&content)
                    .map_err(|e| PgdbaError::Config(format!("parse config file {path}: {e}")))?
            }
            None => Config::default(),
        };
        cfg.apply_env_overrides();
        Ok(cfg)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(host) = std::env::var("PGDBA_PG_HOST") {
            self.pg.host = host;
        }
        if let Ok(port) = std::env::var("PGDBA_PG_PORT") {
            if let Ok(port) = port.parse() {
                self.pg.port = port;
            }
        }
        if let Ok(user) = std::env::var("PGDBA_PG_USER") {
            self.pg.user = user;
        }
        if let Ok(database) = std::env::var("PGDBA_PG_DATABASE") {
            self.pg.database = database;
        }
        if let Ok(sslmode) = std::env::var("PGDBA_PG_SSLMODE") {
            self.pg.sslmode = sslmode;
        }
        if let Ok(kind) = std::env::var("PGDBA_PROVIDER_TYPE") {
            self.provider.kind = kind;
        }
        if let Ok(name) = std::env::var("PGDBA_CLUSTER_NAME") {
            self.cluster.name = name;
        }
        if let Ok(url) = std::env::var("PGDBA_MONITOR_PROMETHEUS_URL") {
            self.monitor.prometheus_url = url;
        }
        if let Ok(url) = std::env::var("PGDBA_MONITOR_GRAFANA_URL") {
            self.monitor.grafana_url = url;
        }
    }

    /// Check that the configuration is semantically valid.
    pub fn validate(&self) -> Result<()> {
        if !VALID_PROVIDERS.contains(&self.provider.kind.as_str()) {
            return Err(PgdbaError::Config(format!(
                "invalid provider type {:?}: must be one of docker, baremetal, kubernetes",
                self.provider.kind
            )));
        }
        if self.pg.port == 0 {
            return Err(PgdbaError::Config(
                "invalid pg.port 0: must be between 1 and 65535".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = Config::default();
        assert_eq!(cfg.pg.port, 5432);
        assert_eq!(cfg.pg.user, "postgres");
        assert_eq!(cfg.pg.sslmode, "prefer");
        assert_eq!(cfg.provider.kind, "docker");
        cfg.validate().unwrap();
    }

    #[test]
    fn test_yaml_round_trip_with_partial_file() {
        let yaml = "pg:\n  host: db.internal\n  port: 6432\n";
        let cfg: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(cfg.pg.host, "db.internal");
        assert_eq!(cfg.pg.port, 6432);
        // Unspecified fields keep their defaults.
        assert_eq!(cfg.pg.user, "postgres");
        assert_eq!(cfg.provider.kind, "docker");
    }

    #[test]
    fn test_provider_key_is_type() {
        let yaml = "provider:\n  type: kubernetes\n";
        let cfg: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(cfg.provider.kind, "kubernetes");
    }

    #[test]
    fn test_validate_rejects_unknown_provider() {
        let mut cfg = Config::default();
        cfg.provider.kind = "openstack".into();
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("openstack"));
    }

    #[test]
    fn test_password_has_no_home_in_config() {
        // The serialized shape must never grow a password field.
        let yaml = serde_yaml::to_string(&Config::default()).unwrap();
        assert!(!yaml.to_lowercase().contains("password"));
    }
}
