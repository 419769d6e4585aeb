//! PostgreSQL connections.
//!
//! The password is read exclusively from the `PGDBA_PG_PASSWORD`
//! environment variable; it never appears in config files, logs, or error
//! messages. An empty password is permitted (trust authentication).

use tokio_postgres::NoTls;
use tracing::debug;

use crate::config::PgConfig;
use crate::error::{PgdbaError, Result};
use crate::inspect::PgDb;

const PASSWORD_ENV: &str = "PGDBA_PG_PASSWORD";

/// Read the PostgreSQL password from the environment. There is no fallback.
pub fn password() -> String {
    std::env::var(PASSWORD_ENV).unwrap_or_default()
}

/// Assemble a libpq-style connection string. Callers obtain the password
/// via [`password`]; the result must not be logged.
pub fn dsn(cfg: &PgConfig, password: &str) -> String {
    format!(
        "host={} port={} user={} password={} dbname={} sslmode={}",
        cfg.host, cfg.port, cfg.user, password, cfg.database, cfg.sslmode
    )
}

/// Open a connection and return the [`PgDb`] adapter. The connection task
/// is driven in the background and ends when the client is dropped.
pub async fn connect(cfg: &PgConfig) -> Result<PgDb> {
    let dsn = dsn(cfg, &password());
    let (client, connection) =
        tokio_postgres::connect(&dsn, NoTls)
            .await
            .map_err(|e| PgdbaError::Connect {
                host: cfg.host.clone(),
                port: cfg.port,
                source: e,
            })?;

    tokio::spawn(async move {
        if let Err(e) = connection.await {
            debug!(error = %e, "postgres connection closed");
        }
    });

    Ok(PgDb::new(client))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pg_config() -> PgConfig {
        PgConfig {
            host: "10.0.0.1".into(),
            port: 5432,
            user: "postgres".into(),
            database: "postgres".into(),
            sslmode: "prefer".into(),
        }
    }

    #[test]
    fn test_dsn_shape() {
        let dsn = dsn(&pg_config(), "s3cret");
        assert_eq!(
            dsn,
            "host=10.0.0.1 port=5432 user=postgres password=s3cret dbname=postgres sslmode=prefer"
        );
    }

    #[test]
    fn test_connect_error_cites_endpoint_not_password() {
        // Connection refused against a closed port must produce an error
        // that names the endpoint and never echoes credentials.
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let mut cfg = pg_config();
        cfg.host = "127.0.0.1".into();
        cfg.port = 1; // nothing listens here

        let err = rt.block_on(connect(&cfg)).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("127.0.0.1:1"), "got: {msg}");
        assert!(!msg.contains("password"));
    }
}
