//! Change-event envelope parser
//!
//! Decodes the vendor envelope
//!
//! ```json
//! {"before": {...}, "after": {...}, "source": {"table": "orders"}, "op": "c", "ts_ms": 1700000000000}
//! ```
//!
//! into a [`ChangeRecord`]. Missing optional fields are tolerated: the
//! table defaults to `"unknown"`, an absent or unrecognized `op` becomes
//! [`Operation::Unknown`] and an absent `ts_ms` becomes `0`. Only bodies
//! that cannot describe a row change are rejected.

use serde_json::Value;

use crate::error::ParseError;
use crate::record::{ChangeRecord, Operation, RowImage, UNKNOWN_TABLE};

/// Parse a single message body
///
/// # Errors
///
/// - [`ParseError::MalformedJson`] if the body is not UTF-8 JSON
/// - [`ParseError::NotAnObject`] if the top-level value is not an object
/// - [`ParseError::InvalidImage`] if `before`/`after` is neither object nor null
/// - [`ParseError::MissingImage`] if both images are absent
pub fn parse(body: &[u8]) -> Result<ChangeRecord, ParseError> {
    let value: Value = serde_json::from_slice(body)?;

    let Value::Object(mut envelope) = value else {
        return Err(ParseError::not_an_object(type_name(&value)));
    };

    let before = take_image(&mut envelope, "before")?;
    let after = take_image(&mut envelope, "after")?;
    if before.is_none() && after.is_none() {
        return Err(ParseError::MissingImage);
    }

    let table_name = envelope
        .get("source")
        .and_then(|source| source.get("table"))
        .and_then(Value::as_str)
        .unwrap_or(UNKNOWN_TABLE)
        .to_string();

    let operation = envelope
        .get("op")
        .and_then(Value::as_str)
        .map_or(Operation::Unknown, Operation::from_code);

    let event_time_ms = envelope.get("ts_ms").map_or(0, event_millis);

    Ok(ChangeRecord {
        table_name,
        operation,
        before,
        after,
        event_time_ms,
    })
}

/// Remove a row image from the envelope; `null` counts as absent
fn take_image(
    envelope: &mut serde_json::Map<String, Value>,
    field: &'static str,
) -> Result<Option<RowImage>, ParseError> {
    match envelope.remove(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Object(image)) => Ok(Some(image)),
        Some(other) => Err(ParseError::invalid_image(field, type_name(&other))),
    }
}

/// Millisecond timestamp; anything non-positive or non-numeric is unknown
fn event_millis(value: &Value) -> i64 {
    let millis = match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_u64().map(|v| i64::try_from(v).unwrap_or(i64::MAX)))
            .or_else(|| n.as_f64().map(|v| v as i64))
            .unwrap_or(0),
        _ => 0,
    };
    millis.max(0)
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
