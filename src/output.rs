//! The response envelope.
//!
//! Every pgdba command emits exactly one [`Response`], rendered as JSON,
//! YAML, or a fixed-layout table. The envelope is the only contract between
//! the core subsystems and whatever shell (human or AI agent) invoked them:
//! the core returns native types, the shell wraps them here.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{PgdbaError, Result};

/// The universal response envelope.
///
/// JSON field order is part of the contract: `success`, `timestamp`,
/// `command`, then `data` (success only), then `error` (failure only).
/// Absent payloads are omitted, not null.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    pub success: bool,
    pub timestamp: DateTime<Utc>,
    pub command: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Response {
    /// Construct a successful response carrying a data payload. A payload
    /// that serializes to null is omitted rather than emitted as `null`.
    pub fn success(command: impl Into<String>, data: impl Serialize) -> Self {
        let data = match serde_json::to_value(data) {
            Ok(serde_json::Value::Null) | Err(_) => None,
            Ok(value) => Some(value),
        };
        Self {
            success: true,
            timestamp: Utc::now(),
            command: command.into(),
            data,
            error: None,
        }
    }

    /// Construct a failed response capturing the error message.
    pub fn failure(command: impl Into<String>, err: impl fmt::Display) -> Self {
        Self {
            success: false,
            timestamp: Utc::now(),
            command: command.into(),
            data: None,
            error: Some(err.to_string()),
        }
    }
}

/// Output serialization format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    Json,
    Yaml,
    Table,
}

impl Default for Format {
    fn default() -> Self {
        Self::Json
    }
}

impl FromStr for Format {
    type Err = PgdbaError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "json" => Ok(Format::Json),
            "yaml" => Ok(Format::Yaml),
            "table" => Ok(Format::Table),
            other => Err(PgdbaError::UnknownFormat(other.to_string())),
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Format::Json => write!(f, "json"),
            Format::Yaml => write!(f, "yaml"),
            Format::Table => write!(f, "table"),
        }
    }
}

/// Serialize a response into the requested format.
pub fn render(resp: &Response, format: Format) -> Result<String> {
    match format {
        Format::Json => Ok(serde_json::to_string_pretty(resp)?),
        Format::Yaml => Ok(serde_yaml::to_string(resp)?),
        Format::Table => Ok(render_table(resp)),
    }
}

fn render_table(resp: &Response) -> String {
    let status = if resp.success { "SUCCESS" } else { "FAILURE" };
    let mut out = format!("{:<12} {:<20} {}\n", "STATUS", "COMMAND", "TIMESTAMP");
    out.push_str(&format!(
        "{:<12} {:<20} {}\n",
        status,
        resp.command,
        resp.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true)
    ));
    if let Some(ref err) = resp.error {
        out.push_str(&format!("ERROR: {}\n", err));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_envelope_json_shape() {
        let resp = Response::success("cluster status", serde_json::json!({"healthy": true}));
        let json = render(&resp, Format::Json).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(value["success"], true);
        assert_eq!(value["command"], "cluster status");
        assert_eq!(value["data"]["healthy"], true);
        assert!(value.get("error").is_none());

        // Field order is part of the contract.
        let keys: Vec<&str> = json
            .lines()
            .filter_map(|l| l.trim().strip_prefix('"'))
            .filter_map(|l| l.split('"').next())
            .collect();
        let success_pos = keys.iter().position(|k| *k == "success").unwrap();
        let timestamp_pos = keys.iter().position(|k| *k == "timestamp").unwrap();
        let command_pos = keys.iter().position(|k| *k == "command").unwrap();
        assert!(success_pos < timestamp_pos);
        assert!(timestamp_pos < command_pos);
    }

    #[test]
    fn test_failure_envelope_omits_data() {
        let resp = Response::failure("inspect", "connect to postgres: refused");
        let json = render(&resp, Format::Json).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(value["success"], false);
        assert_eq!(value["error"], "connect to postgres: refused");
        assert!(value.get("data").is_none());
    }

    #[test]
    fn test_timestamp_is_rfc3339() {
        let resp = Response::success("health check", ());
        let json = render(&resp, Format::Json).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        let ts = value["timestamp"].as_str().unwrap();
        assert!(DateTime::parse_from_rfc3339(ts).is_ok());
    }

    #[test]
    fn test_null_payload_is_omitted() {
        let resp = Response::success("restart", ());
        let json = render(&resp, Format::Json).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert!(value.get("data").is_none());
    }

    #[test]
    fn test_table_rendering() {
        let resp = Response::failure("failover trigger", "no primary found");
        let table = render(&resp, Format::Table).unwrap();
        let mut lines = table.lines();

        let header = lines.next().unwrap();
        assert!(header.starts_with("STATUS"));
        assert!(header.contains("COMMAND"));
        assert!(header.contains("TIMESTAMP"));

        let row = lines.next().unwrap();
        assert!(row.starts_with("FAILURE"));
        assert!(row.contains("failover trigger"));

        assert_eq!(lines.next().unwrap(), "ERROR: no primary found");
    }

    #[test]
    fn test_format_parsing() {
        assert_eq!("json".parse::<Format>().unwrap(), Format::Json);
        assert_eq!("yaml".parse::<Format>().unwrap(), Format::Yaml);
        assert_eq!("table".parse::<Format>().unwrap(), Format::Table);

        let err = "xml".parse::<Format>().unwrap_err();
        assert!(matches!(err, PgdbaError::UnknownFormat(_)));
        assert!(err.to_string().contains("xml"));
    }

    #[test]
    fn test_yaml_round_trip() {
        let resp = Response::success("replica list", serde_json::json!({"count": 2}));
        let yaml = render(&resp, Format::Yaml).unwrap();
        let parsed: Response = serde_yaml::from_str(&yaml).unwrap();
        assert!(parsed.success);
        assert_eq!(parsed.command, "replica list");
    }
}
