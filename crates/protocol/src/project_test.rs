//! Tests for row projection

use chrono::{DateTime, TimeZone, Utc};
use serde_json::json;

use crate::{columns, parse, project};

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
}

#[test]
fn test_insert_row() {
    let record = parse(
        br#"{"after":{"id":1,"status":"new","total":12.5,"paid":false,"note":null},"source":{"table":"orders"},"op":"c","ts_ms":1700000000000}"#,
    )
    .unwrap();
    let row = project(&record, now());

    assert_eq!(row.cdc_table, "orders");
    assert_eq!(row.cdc_operation, "INSERT");
    assert_eq!(row.cdc_timestamp.timestamp_millis(), 1_700_000_000_000);
    assert_eq!(row.ingested_at, now());
    assert!(row.before_data.is_none());
    assert_eq!(
        row.after_data.as_deref(),
        Some(r#"{"id":1,"note":null,"paid":false,"status":"new","total":12.5}"#)
    );
    assert_eq!(row.raw_payload, row.after_data.clone().unwrap());

    assert_eq!(row.column("id"), Some(Some("1")));
    assert_eq!(row.column("status"), Some(Some("new")));
    assert_eq!(row.column("total"), Some(Some("12.5")));
    assert_eq!(row.column("paid"), Some(Some("false")));
    assert_eq!(row.column("note"), Some(None));
    assert_eq!(row.column("missing"), None);
}

#[test]
fn test_delete_row_uses_before_as_raw() {
    let record =
        parse(br#"{"before":{"id":9,"email":"a@b.c"},"source":{"table":"users"},"op":"d"}"#)
            .unwrap();
    let row = project(&record, now());

    assert_eq!(row.cdc_operation, "DELETE");
    assert!(row.after_data.is_none());
    assert_eq!(row.raw_payload, r#"{"email":"a@b.c","id":9}"#);
    assert!(row.columns.is_empty());
}

#[test]
fn test_zero_timestamp_uses_ingestion_time() {
    let record = parse(br#"{"after":{"id":1},"op":"c","ts_ms":0}"#).unwrap();
    let row = project(&record, now());
    assert_eq!(row.cdc_timestamp, now());
}

#[test]
fn test_nested_values_are_stringified_as_json() {
    let record =
        parse(br#"{"after":{"tags":["a","b"],"meta":{"z":1,"a":2}},"op":"u"}"#).unwrap();
    let row = project(&record, now());

    assert_eq!(row.column("tags"), Some(Some(r#"["a","b"]"#)));
    assert_eq!(row.column("meta"), Some(Some(r#"{"a":2,"z":1}"#)));
}

#[test]
fn test_raw_payload_never_empty() {
    let bodies: [&[u8]; 5] = [
        br#"{"after":{"id":1},"op":"c"}"#,
        br#"{"before":{"id":1},"op":"d"}"#,
        br#"{"before":{},"op":"d"}"#,
        br#"{"after":{},"op":"x"}"#,
        br#"{"before":{"a":1},"after":{"a":2},"op":"u"}"#,
    ];
    for body in bodies {
        let row = project(&parse(body).unwrap(), now());
        assert!(!row.raw_payload.is_empty());
        let parsed: serde_json::Value = serde_json::from_str(&row.raw_payload).unwrap();
        assert!(parsed.is_object());
    }
}

#[test]
fn test_unknown_operation_label() {
    let row = project(&parse(br#"{"after":{"id":1},"op":"t"}"#).unwrap(), now());
    assert_eq!(row.cdc_operation, "UNKNOWN");
}

#[test]
fn test_projection_is_deterministic() {
    let record = parse(
        br#"{"before":{"b":2,"a":1},"after":{"z":[1,{"y":2,"x":1}],"a":"s"},"source":{"table":"orders"},"op":"u","ts_ms":42}"#,
    )
    .unwrap();

    let first = project(&record, now());
    let second = project(&record, now());

    assert_eq!(first, second);
    assert_eq!(
        serde_json::to_vec(&first).unwrap(),
        serde_json::to_vec(&second).unwrap()
    );
}

#[test]
fn test_serialized_shape() {
    let record = parse(
        br#"{"after":{"id":1,"note":null},"source":{"table":"orders"},"op":"c","ts_ms":1700000000000}"#,
    )
    .unwrap();
    let value = serde_json::to_value(project(&record, now())).unwrap();

    assert_eq!(value[columns::TABLE], "orders");
    assert_eq!(value[columns::OPERATION], "INSERT");
    assert_eq!(value[columns::TIMESTAMP], "2023-11-14T22:13:20.000Z");
    assert_eq!(value[columns::INGESTED_AT], "2024-03-01T12:00:00.000Z");
    assert_eq!(value[columns::BEFORE], json!(null));
    assert_eq!(value["col_id"], "1");
    assert_eq!(value["col_note"], json!(null));
    assert!(value.get("columns").is_none());
}
