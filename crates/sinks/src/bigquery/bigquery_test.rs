//! BigQuery backend tests against an in-process mock of the REST API

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use axum::Router;
use axum::extract::{Json, Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use cdcflow_config::BigQueryConfig;
use cdcflow_protocol::{SinkRow, parse, project};
use chrono::{TimeZone, Utc};
use parking_lot::Mutex;
use serde_json::{Value, json};

use super::*;
use crate::writer::SinkWriter;

#[derive(Default)]
struct MockBigQuery {
    tables: Mutex<Vec<Value>>,
    inserts: Mutex<Vec<(String, Value)>>,
    fail_inserts: AtomicU32,
    deny_create: bool,
}

async fn create_table(
    State(state): State<Arc<MockBigQuery>>,
    Json(body): Json<Value>,
) -> Response {
    if state.deny_create {
        return (StatusCode::FORBIDDEN, "Access Denied: Dataset raw").into_response();
    }
    let mut tables = state.tables.lock();
    let id = body["tableReference"]["tableId"].clone();
    if tables.iter().any(|t| t["tableReference"]["tableId"] == id) {
        return (StatusCode::CONFLICT, "Already Exists").into_response();
    }
    tables.push(body.clone());
    Json(body).into_response()
}

async fn insert_all(
    State(state): State<Arc<MockBigQuery>>,
    Path((_project, _dataset, table)): Path<(String, String, String)>,
    Json(body): Json<Value>,
) -> Response {
    let failing = state
        .fail_inserts
        .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1))
        .is_ok();
    if failing {
        return (StatusCode::SERVICE_UNAVAILABLE, "backend error").into_response();
    }

    let rows = body["rows"].as_array().cloned().unwrap_or_default();
    let errors: Vec<Value> = rows
        .iter()
        .enumerate()
        .filter(|(_, row)| row["json"]["col_status"] == "bad")
        .map(|(index, _)| {
            json!({
                "index": index,
                "errors": [{"reason": "invalid", "location": "col_status", "message": "bad value"}]
            })
        })
        .collect();
    state.inserts.lock().push((table, body));

    if errors.is_empty() {
        Json(json!({"kind": "bigquery#tableDataInsertAllResponse"})).into_response()
    } else {
        Json(json!({"kind": "bigquery#tableDataInsertAllResponse", "insertErrors": errors}))
            .into_response()
    }
}

async fn spawn_mock(state: Arc<MockBigQuery>) -> String {
    let app = Router::new()
        .route("/projects/{project}/datasets/{dataset}/tables", post(create_table))
        .route(
            "/projects/{project}/datasets/{dataset}/tables/{table}/insertAll",
            post(insert_all),
        )
        .with_state(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

fn writer(endpoint: String, retry_attempts: u32) -> SinkWriter {
    let config = BigQueryConfig {
        endpoint,
        request_timeout: Duration::from_secs(5),
        retry_attempts,
        ..Default::default()
    };
    let warehouse = BigQueryWarehouse::new(&config, "proj").unwrap();
    SinkWriter::new(Arc::new(warehouse), "raw")
}

fn row(status: &str) -> SinkRow {
    let body = format!(
        r#"{{"op":"u","source":{{"table":"orders"}},"ts_ms":1700000000000,"before":{{"id":1}},"after":{{"id":1,"status":"{status}"}}}}"#
    );
    project(&parse(body.as_bytes()).unwrap(), Utc.timestamp_millis_opt(1_700_000_005_000).unwrap())
}

#[tokio::test]
async fn test_provisions_and_inserts() {
    let state = Arc::new(MockBigQuery::default());
    let writer = writer(spawn_mock(Arc::clone(&state)).await, 0);

    let outcome = writer.write_batch("orders", &[row("paid"), row("shipped")]).await.unwrap();
    assert_eq!(outcome.written, 2);

    let tables = state.tables.lock();
    assert_eq!(tables.len(), 1);
    let table = &tables[0];
    assert_eq!(table["tableReference"]["projectId"], "proj");
    assert_eq!(table["tableReference"]["datasetId"], "raw");
    assert_eq!(table["tableReference"]["tableId"], "cdc_orders");
    assert_eq!(table["timePartitioning"]["type"], "DAY");
    assert_eq!(table["timePartitioning"]["field"], "cdc_timestamp");
    assert_eq!(table["clustering"]["fields"], json!(["cdc_operation"]));
    assert_eq!(table["schema"]["fields"][2]["type"], "TIMESTAMP");
    assert_eq!(table["schema"]["fields"][0]["mode"], "REQUIRED");
    assert_eq!(table["schema"]["fields"][3]["mode"], "NULLABLE");

    let inserts = state.inserts.lock();
    let (table_id, body) = &inserts[0];
    assert_eq!(table_id, "cdc_orders");
    assert_eq!(body["skipInvalidRows"], true);
    assert_eq!(body["ignoreUnknownValues"], true);
    let first = &body["rows"][0]["json"];
    assert_eq!(first["cdc_operation"], "UPDATE");
    assert_eq!(first["cdc_timestamp"], "2023-11-14T22:13:20.000Z");
    assert_eq!(first["col_status"], "paid");
    assert_eq!(first["col_id"], "1");
}

#[tokio::test]
async fn test_existing_table_is_not_an_error() {
    let state = Arc::new(MockBigQuery::default());
    let endpoint = spawn_mock(Arc::clone(&state)).await;

    writer(endpoint.clone(), 0).write_batch("orders", &[row("a")]).await.unwrap();
    // A fresh writer has an empty cache and hits 409
    let outcome = writer(endpoint, 0).write_batch("orders", &[row("b")]).await.unwrap();
    assert_eq!(outcome.written, 1);
    assert_eq!(state.tables.lock().len(), 1);
    assert_eq!(state.inserts.lock().len(), 2);
}

#[tokio::test]
async fn test_insert_errors_become_row_failures() {
    let state = Arc::new(MockBigQuery::default());
    let writer = writer(spawn_mock(Arc::clone(&state)).await, 0);

    let outcome = writer
        .write_batch("orders", &[row("ok"), row("bad"), row("ok")])
        .await
        .unwrap();
    assert_eq!(outcome.written, 2);
    assert_eq!(outcome.failures.len(), 1);
    assert_eq!(outcome.failures[0].index, 1);
    assert!(outcome.failures[0].reason.contains("col_status"));
}

#[tokio::test]
async fn test_unavailable_without_retry_is_total_failure() {
    let state = Arc::new(MockBigQuery::default());
    state.fail_inserts.store(1, Ordering::Relaxed);
    let writer = writer(spawn_mock(Arc::clone(&state)).await, 0);

    let err = writer.write_batch("orders", &[row("a")]).await.unwrap_err();
    assert!(matches!(err, SinkError::Status { status: 503, .. }));
    assert!(state.inserts.lock().is_empty());
}

#[tokio::test]
async fn test_transport_retry_absorbs_transient_failure() {
    let state = Arc::new(MockBigQuery::default());
    state.fail_inserts.store(1, Ordering::Relaxed);
    let writer = writer(spawn_mock(Arc::clone(&state)).await, 2);

    let outcome = writer.write_batch("orders", &[row("a")]).await.unwrap();
    assert_eq!(outcome.written, 1);
    assert_eq!(state.inserts.lock().len(), 1);
}

#[tokio::test]
async fn test_denied_create_is_provision_error() {
    let state = Arc::new(MockBigQuery {
        deny_create: true,
        ..Default::default()
    });
    let writer = writer(spawn_mock(Arc::clone(&state)).await, 0);

    let err = writer.write_batch("orders", &[row("a")]).await.unwrap_err();
    assert!(matches!(err, SinkError::Provision { .. }));
    assert!(err.to_string().contains("raw.cdc_orders"));
    assert!(!writer.is_ensured("orders"));
}
