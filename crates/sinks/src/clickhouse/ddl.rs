//! ClickHouse DDL for destination tables

use crate::schema::{CLUSTER_COLUMNS, ColumnType, PARTITION_COLUMN, TableSpec};

/// Name of the map column holding flattened `col_*` values
pub const COLUMNS_MAP: &str = "columns";

fn column_type(kind: ColumnType, nullable: bool) -> String {
    let base = match kind {
        ColumnType::String if nullable => "String",
        ColumnType::String => "LowCardinality(String)",
        ColumnType::Timestamp => "DateTime64(3, 'UTC')",
    };
    if nullable {
        format!("Nullable({base})")
    } else {
        base.to_string()
    }
}

/// `CREATE TABLE IF NOT EXISTS` statement for `spec`
pub fn create_table_sql(spec: &TableSpec) -> String {
    let mut columns: Vec<String> = spec
        .columns()
        .iter()
        .map(|c| format!("    {} {}", c.name, column_type(c.kind, c.nullable)))
        .collect();
    columns.push(format!("    {COLUMNS_MAP} Map(String, Nullable(String))"));

    let order_by = CLUSTER_COLUMNS
        .iter()
        .copied()
        .chain([PARTITION_COLUMN])
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        "CREATE TABLE IF NOT EXISTS {} (\n{}\n) ENGINE = MergeTree\nPARTITION BY toYYYYMMDD({PARTITION_COLUMN})\nORDER BY ({order_by})",
        spec.qualified_name(),
        columns.join(",\n"),
    )
}
