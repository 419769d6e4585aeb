//! PgBouncer configuration rendering.
//!
//! Pure string assembly for `pgbouncer.ini` and `userlist.txt`; writing the
//! files and reloading PgBouncer are the operator's business.

use std::collections::BTreeMap;
use std::fmt::Write;

use serde::{Deserialize, Serialize};

/// PgBouncer configuration parameters.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Defaults to `0.0.0.0` when empty.
    pub listen_addr: String,
    pub listen_port: u16,
    /// Path to `userlist.txt`.
    pub auth_file: String,
    pub admin_users: String,
    pub stats_users: String,
    /// `transaction` (recommended for OLTP), `session`, or `statement`.
    /// Defaults to `transaction` when empty.
    pub pool_mode: String,
    pub max_client_conn: u32,
    pub default_pool_size: u32,
    pub databases: Vec<Database>,
}

/// A single `[databases]` entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Database {
    /// Alias exposed by PgBouncer.
    pub name: String,
    /// Backend PostgreSQL host.
    pub host: String,
    /// Backend port; 0 means the default 5432.
    pub port: u16,
    /// Actual database name.
    pub dbname: String,
}

/// Generate `pgbouncer.ini` content.
pub fn render_config(cfg: &Config) -> String {
    let mut out = String::from("[databases]\n");

    for db in &cfg.databases {
        let port = if db.port == 0 { 5432 } else { db.port };
        let _ = writeln!(
            out,
            "{} = host={} port={} dbname={}",
            db.name, db.host, port, db.dbname
        );
    }

    out.push_str("\n[pgbouncer]\n");

    let listen_addr = if cfg.listen_addr.is_empty() {
        "0.0.0.0"
    } else {
        &cfg.listen_addr
    };
    let _ = writeln!(out, "listen_addr = {listen_addr}");
    let _ = writeln!(out, "listen_port = {}", cfg.listen_port);

    let pool_mode = if cfg.pool_mode.is_empty() {
        "transaction"
    } else {
        &cfg.pool_mode
    };
    let _ = writeln!(out, "pool_mode = {pool_mode}");

    let _ = writeln!(out, "max_client_conn = {}", cfg.max_client_conn);
    let _ = writeln!(out, "default_pool_size = {}", cfg.default_pool_size);

    if !cfg.auth_file.is_empty() {
        let _ = writeln!(out, "auth_file = {}", cfg.auth_file);
    }
    if !cfg.admin_users.is_empty() {
        let _ = writeln!(out, "admin_users = {}", cfg.admin_users);
    }
    if !cfg.stats_users.is_empty() {
        let _ = writeln!(out, "stats_users = {}", cfg.stats_users);
    }

    out
}

/// Generate `userlist.txt` content from a username-to-hash map. Each line
/// is `"username" "password_hash"`, ordered by username.
pub fn render_userlist(users: &BTreeMap<String, String>) -> String {
    let mut out = String::new();
    for (user, hash) in users {
        let _ = writeln!(out, "{user:?} {hash:?}");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_config_defaults() {
        let cfg = Config {
            listen_port: 6432,
            max_client_conn: 200,
            default_pool_size: 20,
            databases: vec![Database {
                name: "app".into(),
                host: "10.0.0.1".into(),
                port: 0,
                dbname: "appdb".into(),
            }],
            ..Default::default()
        };

        let ini = render_config(&cfg);
        assert!(ini.starts_with("[databases]\n"));
        assert!(ini.contains("app = host=10.0.0.1 port=5432 dbname=appdb"));
        assert!(ini.contains("listen_addr = 0.0.0.0"));
        assert!(ini.contains("pool_mode = transaction"));
        assert!(ini.contains("max_client_conn = 200"));
        // Optional keys absent when unset.
        assert!(!ini.contains("auth_file"));
        assert!(!ini.contains("admin_users"));
    }

    #[test]
    fn test_render_config_explicit_values() {
        let cfg = Config {
            listen_addr: "127.0.0.1".into(),
            listen_port: 6432,
            auth_file: "/etc/pgbouncer/userlist.txt".into(),
            admin_users: "admin".into(),
            stats_users: "stats".into(),
            pool_mode: "session".into(),
            max_client_conn: 100,
            default_pool_size: 10,
            databases: vec![],
        };

        let ini = render_config(&cfg);
        assert!(ini.contains("listen_addr = 127.0.0.1"));
        assert!(ini.contains("pool_mode = session"));
        assert!(ini.contains("auth_file = /etc/pgbouncer/userlist.txt"));
        assert!(ini.contains("admin_users = admin"));
        assert!(ini.contains("stats_users = stats"));
    }

    #[test]
    fn test_render_userlist_quotes_entries() {
        let mut users = BTreeMap::new();
        users.insert("app".to_string(), "md5abc123".to_string());
        users.insert("admin".to_string(), "SCRAM-SHA-256$...".to_string());

        let list = render_userlist(&users);
        let lines: Vec<&str> = list.lines().collect();
        assert_eq!(lines[0], r#""admin" "SCRAM-SHA-256$...""#);
        assert_eq!(lines[1], r#""app" "md5abc123""#);
    }
}
