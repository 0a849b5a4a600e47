//! Tests for parse error types

use crate::error::ParseError;
use crate::parse;

#[test]
fn test_kind_labels_are_stable() {
    let malformed = parse(b"{").unwrap_err();
    assert_eq!(malformed.kind(), "malformed_json");
    assert_eq!(ParseError::not_an_object("array").kind(), "not_an_object");
    assert_eq!(
        ParseError::invalid_image("after", "string").kind(),
        "invalid_image"
    );
    assert_eq!(ParseError::MissingImage.kind(), "missing_image");
}

#[test]
fn test_display_names_the_field() {
    let err = ParseError::invalid_image("before", "number");
    let msg = err.to_string();
    assert!(msg.contains("before"));
    assert!(msg.contains("number"));
}

#[test]
fn test_malformed_json_keeps_source() {
    let err = parse(b"not json").unwrap_err();
    assert!(matches!(err, ParseError::MalformedJson(_)));
    assert!(err.to_string().starts_with("malformed JSON"));
}
