//! Destination table layout
//!
//! Every source table lands in `cdc_<table>` with the same audit schema,
//! partitioned by day on `cdc_timestamp` and clustered by
//! `cdc_operation`. Flattened `col_*` columns are not part of the fixed
//! schema; backends decide how to store them.

use cdcflow_config::is_identifier;
use cdcflow_protocol::columns;

use crate::error::SinkError;

/// Prefix of destination table names
pub const TABLE_PREFIX: &str = "cdc_";

/// Column value type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    /// UTF-8 text
    String,
    /// Millisecond-precision UTC instant
    Timestamp,
}

/// One audit column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Column {
    /// Column name
    pub name: &'static str,
    /// Value type
    pub kind: ColumnType,
    /// Whether null is allowed
    pub nullable: bool,
}

const fn required(name: &'static str, kind: ColumnType) -> Column {
    Column {
        name,
        kind,
        nullable: false,
    }
}

const fn nullable(name: &'static str, kind: ColumnType) -> Column {
    Column {
        name,
        kind,
        nullable: true,
    }
}

/// Audit schema shared by every destination table, in column order
pub const AUDIT_COLUMNS: [Column; 7] = [
    required(columns::TABLE, ColumnType::String),
    required(columns::OPERATION, ColumnType::String),
    required(columns::TIMESTAMP, ColumnType::Timestamp),
    nullable(columns::BEFORE, ColumnType::String),
    nullable(columns::AFTER, ColumnType::String),
    nullable(columns::RAW, ColumnType::String),
    required(columns::INGESTED_AT, ColumnType::Timestamp),
];

/// Column used for day partitioning
pub const PARTITION_COLUMN: &str = columns::TIMESTAMP;

/// Columns used for clustering
pub const CLUSTER_COLUMNS: [&str; 1] = [columns::OPERATION];

/// Fully resolved destination for one source table
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TableSpec {
    dataset: String,
    table_id: String,
    source_table: String,
}

impl TableSpec {
    /// Resolve the destination for `source_table` in `dataset`
    ///
    /// Fails when the source name is not a plain identifier, so nothing
    /// reaches DDL or an API path unescaped.
    pub fn new(dataset: &str, source_table: &str) -> Result<Self, SinkError> {
        if !is_identifier(source_table) {
            return Err(SinkError::InvalidTableName(source_table.to_string()));
        }
        Ok(Self {
            dataset: dataset.to_string(),
            table_id: format!("{TABLE_PREFIX}{source_table}"),
            source_table: source_table.to_string(),
        })
    }

    /// Dataset (BigQuery) or database (ClickHouse)
    pub fn dataset(&self) -> &str {
        &self.dataset
    }

    /// Destination table, `cdc_<source>`
    pub fn table_id(&self) -> &str {
        &self.table_id
    }

    /// Source table name as it appeared in the change events
    pub fn source_table(&self) -> &str {
        &self.source_table
    }

    /// `dataset.table_id`
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.dataset, self.table_id)
    }

    /// Fixed audit columns
    pub fn columns(&self) -> &'static [Column] {
        &AUDIT_COLUMNS
    }
}
