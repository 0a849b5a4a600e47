//! Tests for envelope parsing

use crate::error::ParseError;
use crate::parse;
use crate::record::{Operation, UNKNOWN_TABLE};

#[test]
fn test_parse_insert() {
    let body = br#"{"before":null,"after":{"id":1,"status":"new"},"source":{"table":"orders"},"op":"c","ts_ms":1700000000000}"#;
    let record = parse(body).unwrap();

    assert_eq!(record.table_name, "orders");
    assert_eq!(record.operation, Operation::Create);
    assert!(record.before.is_none());
    assert_eq!(record.after.as_ref().unwrap()["status"], "new");
    assert_eq!(record.event_time_ms, 1_700_000_000_000);
}

#[test]
fn test_parse_delete_has_only_before() {
    let body = br#"{"before":{"id":7},"source":{"table":"users"},"op":"d","ts_ms":5}"#;
    let record = parse(body).unwrap();

    assert_eq!(record.operation, Operation::Delete);
    assert!(record.after.is_none());
    assert_eq!(record.before.as_ref().unwrap()["id"], 7);
}

#[test]
fn test_parse_snapshot_and_update() {
    let snapshot = parse(br#"{"after":{"id":1},"op":"r"}"#).unwrap();
    assert_eq!(snapshot.operation, Operation::Snapshot);

    let update = parse(br#"{"before":{"id":1},"after":{"id":1},"op":"u"}"#).unwrap();
    assert_eq!(update.operation, Operation::Update);
}

#[test]
fn test_missing_table_defaults_to_unknown() {
    let record = parse(br#"{"after":{"id":1},"op":"c"}"#).unwrap();
    assert_eq!(record.table_name, UNKNOWN_TABLE);

    let record = parse(br#"{"after":{"id":1},"source":{},"op":"c"}"#).unwrap();
    assert_eq!(record.table_name, UNKNOWN_TABLE);

    let record = parse(br#"{"after":{"id":1},"source":{"table":42},"op":"c"}"#).unwrap();
    assert_eq!(record.table_name, UNKNOWN_TABLE);
}

#[test]
fn test_unrecognized_op_is_tolerated() {
    for body in [
        &br#"{"after":{"id":1},"op":"x"}"#[..],
        &br#"{"after":{"id":1}}"#[..],
        &br#"{"after":{"id":1},"op":null}"#[..],
        &br#"{"after":{"id":1},"op":3}"#[..],
    ] {
        let record = parse(body).unwrap();
        assert_eq!(record.operation, Operation::Unknown);
        assert_eq!(record.operation.label(), "UNKNOWN");
    }
}

#[test]
fn test_timestamp_variants() {
    let missing = parse(br#"{"after":{"id":1}}"#).unwrap();
    assert_eq!(missing.event_time_ms, 0);

    let negative = parse(br#"{"after":{"id":1},"ts_ms":-10}"#).unwrap();
    assert_eq!(negative.event_time_ms, 0);

    let float = parse(br#"{"after":{"id":1},"ts_ms":1700000000000.9}"#).unwrap();
    assert_eq!(float.event_time_ms, 1_700_000_000_000);

    let text = parse(br#"{"after":{"id":1},"ts_ms":"1700000000000"}"#).unwrap();
    assert_eq!(text.event_time_ms, 0);
}

#[test]
fn test_malformed_json() {
    for body in [
        &b"not json"[..],
        &b""[..],
        &b"{\"after\":"[..],
        &[0xff, 0xfe][..],
    ] {
        assert!(matches!(parse(body), Err(ParseError::MalformedJson(_))));
    }
}

#[test]
fn test_non_object_envelope() {
    let err = parse(b"[1,2,3]").unwrap_err();
    assert!(matches!(err, ParseError::NotAnObject { found: "array" }));

    let err = parse(b"\"orders\"").unwrap_err();
    assert!(matches!(err, ParseError::NotAnObject { found: "string" }));
}

#[test]
fn test_both_images_absent() {
    assert!(matches!(
        parse(br#"{"source":{"table":"orders"},"op":"c"}"#),
        Err(ParseError::MissingImage)
    ));
    assert!(matches!(
        parse(br#"{"before":null,"after":null,"op":"u"}"#),
        Err(ParseError::MissingImage)
    ));
}

#[test]
fn test_non_object_image() {
    let err = parse(br#"{"after":[1,2],"op":"c"}"#).unwrap_err();
    assert!(matches!(
        err,
        ParseError::InvalidImage {
            field: "after",
            found: "array"
        }
    ));
}

#[test]
fn test_extra_fields_ignored() {
    let body = br#"{"after":{"id":1},"source":{"table":"orders","db":"shop","lsn":99},"op":"c","transaction":{"id":"t1"}}"#;
    let record = parse(body).unwrap();
    assert_eq!(record.table_name, "orders");
}
