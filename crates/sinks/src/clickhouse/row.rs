//! ClickHouse row type

use cdcflow_protocol::SinkRow;
use clickhouse::Row;
use serde::Serialize;

/// Row for `cdc_<table>`; timestamps are milliseconds since epoch
#[derive(Debug, Clone, PartialEq, Eq, Row, Serialize)]
pub struct ChangeRow {
    pub cdc_table: String,
    pub cdc_operation: String,
    pub cdc_timestamp: i64,
    pub before_data: Option<String>,
    pub after_data: Option<String>,
    pub raw_payload: Option<String>,
    pub ingested_at: i64,
    /// Flattened after-image, `Map(String, Nullable(String))`
    pub columns: Vec<(String, Option<String>)>,
}

impl From<&SinkRow> for ChangeRow {
    fn from(row: &SinkRow) -> Self {
        Self {
            cdc_table: row.cdc_table.clone(),
            cdc_operation: row.cdc_operation.to_string(),
            cdc_timestamp: row.cdc_timestamp.timestamp_millis(),
            before_data: row.before_data.clone(),
            after_data: row.after_data.clone(),
            raw_payload: Some(row.raw_payload.clone()),
            ingested_at: row.ingested_at.timestamp_millis(),
            columns: row
                .columns
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        }
    }
}
