//! Tests for SinkWriter

use std::sync::Arc;

use cdcflow_metrics::SinkMetricsProvider;
use cdcflow_protocol::{SinkRow, parse, project};
use chrono::{TimeZone, Utc};

use crate::error::SinkError;
use crate::memory::MemoryWarehouse;
use crate::warehouse::Warehouse;
use crate::writer::SinkWriter;

fn row(table: &str, id: u32) -> SinkRow {
    let body = format!(
        r#"{{"op":"c","source":{{"table":"{table}"}},"ts_ms":1700000000000,"after":{{"id":{id}}}}}"#
    );
    let record = parse(body.as_bytes()).unwrap();
    project(&record, Utc.timestamp_millis_opt(1_700_000_001_000).unwrap())
}

fn rows(table: &str, n: u32) -> Vec<SinkRow> {
    (0..n).map(|i| row(table, i)).collect()
}

fn writer() -> (Arc<MemoryWarehouse>, SinkWriter) {
    let warehouse = Arc::new(MemoryWarehouse::new());
    let shared: Arc<dyn Warehouse> = warehouse.clone();
    let writer = SinkWriter::new(shared, "raw");
    (warehouse, writer)
}

#[tokio::test]
async fn test_write_batch_all_rows() {
    let (warehouse, writer) = writer();
    let outcome = writer.write_batch("orders", &rows("orders", 3)).await.unwrap();

    assert_eq!(outcome.written, 3);
    assert!(outcome.failures.is_empty());
    assert_eq!(warehouse.rows_for("orders").len(), 3);
    assert_eq!(warehouse.created_tables(), vec!["cdc_orders".to_string()]);
}

#[tokio::test]
async fn test_table_ensured_once() {
    let (warehouse, writer) = writer();
    writer.write_batch("orders", &rows("orders", 2)).await.unwrap();
    writer.write_batch("orders", &rows("orders", 2)).await.unwrap();
    writer.write_batch("products", &rows("products", 1)).await.unwrap();

    assert_eq!(warehouse.create_calls(), 2);
    assert!(writer.is_ensured("orders"));
    assert!(writer.is_ensured("products"));
    assert_eq!(writer.metrics_handle().snapshot().tables_provisioned, 2);
}

#[tokio::test]
async fn test_empty_batch_is_noop() {
    let (warehouse, writer) = writer();
    let outcome = writer.write_batch("orders", &[]).await.unwrap();
    assert_eq!(outcome.written, 0);
    assert_eq!(warehouse.create_calls(), 0);
    assert_eq!(warehouse.insert_calls(), 0);
}

#[tokio::test]
async fn test_partial_failure_reports_rejected_rows() {
    let (warehouse, writer) = writer();
    warehouse.reject_rows(|row| {
        (row.column("id") == Some(Some("1"))).then(|| "no such field: col_id".to_string())
    });

    let outcome = writer.write_batch("orders", &rows("orders", 3)).await.unwrap();
    assert_eq!(outcome.written, 2);
    assert_eq!(outcome.failed(), 1);
    assert_eq!(outcome.failures[0].index, 1);
    assert!(outcome.failures[0].reason.contains("col_id"));

    let snapshot = writer.metrics_handle().snapshot();
    assert_eq!(snapshot.rows_written, 2);
    assert_eq!(snapshot.rows_rejected, 1);
    assert_eq!(snapshot.write_failures, 0);
}

#[tokio::test]
async fn test_total_failure_is_err() {
    let (warehouse, writer) = writer();
    warehouse.fail_next_inserts(1);

    let err = writer.write_batch("orders", &rows("orders", 5)).await.unwrap_err();
    assert!(err.is_retryable());
    assert_eq!(warehouse.total_rows(), 0);
    assert_eq!(writer.metrics_handle().snapshot().write_failures, 1);

    // The next batch goes through; the table stays cached
    let outcome = writer.write_batch("orders", &rows("orders", 2)).await.unwrap();
    assert_eq!(outcome.written, 2);
    assert_eq!(warehouse.create_calls(), 1);
}

#[tokio::test]
async fn test_failed_provisioning_is_not_cached() {
    let (warehouse, writer) = writer();
    warehouse.set_unavailable(true);
    assert!(writer.write_batch("orders", &rows("orders", 1)).await.is_err());
    assert!(!writer.is_ensured("orders"));

    warehouse.set_unavailable(false);
    writer.write_batch("orders", &rows("orders", 1)).await.unwrap();
    assert!(writer.is_ensured("orders"));
    assert_eq!(warehouse.create_calls(), 2);
}

#[tokio::test]
async fn test_invalid_table_name_never_reaches_warehouse() {
    let (warehouse, writer) = writer();
    let err = writer
        .write_batch("orders;drop", &rows("orders", 1))
        .await
        .unwrap_err();
    assert!(matches!(err, SinkError::InvalidTableName(_)));
    assert_eq!(warehouse.create_calls(), 0);
    assert_eq!(warehouse.insert_calls(), 0);
}

#[tokio::test]
async fn test_metrics_handle_identity() {
    let (_warehouse, writer) = writer();
    let handle = writer.metrics_handle();
    assert_eq!(handle.sink_id(), "memory:raw");
    assert_eq!(handle.sink_type(), "memory");
}
