//! Warehouse configuration
//!
//! Selects the backend that `cdc_<table>` batches are written to. The
//! destination dataset comes from [`crate::PipelineConfig::dataset_id`].

use serde::Deserialize;
use std::time::Duration;

/// Public BigQuery REST endpoint
pub const DEFAULT_BIGQUERY_ENDPOINT: &str = "https://bigquery.googleapis.com/bigquery/v2";

/// Warehouse backend configuration
///
/// # Example
///
/// ```toml
/// [warehouse]
/// type = "clickhouse"
/// url = "http://localhost:8123"
/// username = "default"
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WarehouseConfig {
    /// BigQuery streaming inserts
    Bigquery(BigQueryConfig),

    /// ClickHouse over HTTP
    Clickhouse(ClickHouseConfig),

    /// JSON lines on stdout (local debugging)
    Stdout(StdoutConfig),
}

impl Default for WarehouseConfig {
    fn default() -> Self {
        Self::Bigquery(BigQueryConfig::default())
    }
}

impl WarehouseConfig {
    /// Backend name used in logs
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Bigquery(_) => "bigquery",
            Self::Clickhouse(_) => "clickhouse",
            Self::Stdout(_) => "stdout",
        }
    }
}

/// BigQuery backend
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BigQueryConfig {
    /// REST endpoint including the API version path
    /// Default: https://bigquery.googleapis.com/bigquery/v2
    pub endpoint: String,

    /// OAuth bearer token; omitted for the emulator
    pub access_token: Option<String>,

    /// Accept rows carrying `col_*` fields the table does not define
    /// Default: true
    pub ignore_unknown_values: bool,

    /// Insert the valid rows of a batch even when others are rejected
    /// Default: true
    pub skip_invalid_rows: bool,

    /// Timeout for a single REST call
    /// Default: 30s
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,

    /// Transport-level retries for transient total failures
    /// Default: 0
    pub retry_attempts: u32,
}

impl Default for BigQueryConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_BIGQUERY_ENDPOINT.to_string(),
            access_token: None,
            ignore_unknown_values: true,
            skip_invalid_rows: true,
            request_timeout: Duration::from_secs(30),
            retry_attempts: 0,
        }
    }
}

/// ClickHouse backend
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClickHouseConfig {
    /// HTTP interface URL
    /// Default: http://localhost:8123
    pub url: String,

    /// Username
    /// Default: default
    pub username: String,

    /// Password
    pub password: String,

    /// Transport-level retries for transient total failures
    /// Default: 0
    pub retry_attempts: u32,
}

impl Default for ClickHouseConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:8123".to_string(),
            username: "default".to_string(),
            password: String::new(),
            retry_attempts: 0,
        }
    }
}

/// Stdout backend
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StdoutConfig {
    /// Colorize the destination table prefix
    pub color: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_bigquery() {
        let WarehouseConfig::Bigquery(bq) = WarehouseConfig::default() else {
            panic!("expected bigquery");
        };
        assert_eq!(bq.endpoint, DEFAULT_BIGQUERY_ENDPOINT);
        assert!(bq.ignore_unknown_values);
        assert!(bq.skip_invalid_rows);
        assert_eq!(bq.retry_attempts, 0);
    }

    #[test]
    fn test_deserialize_clickhouse() {
        let toml = r#"
type = "clickhouse"
url = "http://ch:8123"
password = "secret"
retry_attempts = 3
"#;
        let config: WarehouseConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.type_name(), "clickhouse");
        let WarehouseConfig::Clickhouse(ch) = config else {
            panic!("expected clickhouse");
        };
        assert_eq!(ch.url, "http://ch:8123");
        assert_eq!(ch.username, "default");
        assert_eq!(ch.retry_attempts, 3);
    }

    #[test]
    fn test_deserialize_stdout() {
        let config: WarehouseConfig = toml::from_str("type = \"stdout\"\ncolor = true").unwrap();
        let WarehouseConfig::Stdout(stdout) = config else {
            panic!("expected stdout");
        };
        assert!(stdout.color);
    }
}
