//! Row projection
//!
//! Pure conversion from [`ChangeRecord`] to [`SinkRow`]. Images are
//! serialized as canonical JSON (keys in sorted order, no whitespace), so
//! projecting the same record at the same instant always yields identical
//! bytes.

use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::record::{ChangeRecord, RowImage};
use crate::row::{COLUMN_PREFIX, SinkRow};

const EMPTY_OBJECT: &str = "{}";

/// Project a change record into a warehouse row
///
/// `now` is the ingestion time. It fills `ingested_at` and stands in for
/// the event time when the envelope did not carry one.
pub fn project(record: &ChangeRecord, now: DateTime<Utc>) -> SinkRow {
    let before_data = record.before.as_ref().map(canonical_json);
    let after_data = record.after.as_ref().map(canonical_json);

    let raw_payload = after_data
        .clone()
        .or_else(|| before_data.clone())
        .unwrap_or_else(|| EMPTY_OBJECT.to_string());

    let columns = record.after.as_ref().map(flatten).unwrap_or_default();

    SinkRow {
        cdc_table: record.table_name.clone(),
        cdc_operation: record.operation.label(),
        cdc_timestamp: record.event_time().unwrap_or(now),
        before_data,
        after_data,
        raw_payload,
        ingested_at: now,
        columns,
    }
}

/// Serialize an image with sorted keys
fn canonical_json(image: &RowImage) -> String {
    // serde_json's Map is ordered by key without `preserve_order`, and
    // writing a Map cannot fail.
    Value::Object(image.clone()).to_string()
}

/// One `col_<key>` per top-level key; strings stay raw, other values
/// become their JSON text, JSON null becomes `None`
fn flatten(image: &RowImage) -> BTreeMap<String, Option<String>> {
    image
        .iter()
        .map(|(key, value)| {
            let text = match value {
                Value::Null => None,
                Value::String(s) => Some(s.clone()),
                other => Some(other.to_string()),
            };
            (format!("{COLUMN_PREFIX}{key}"), text)
        })
        .collect()
}
