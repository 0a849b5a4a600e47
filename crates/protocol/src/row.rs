//! Warehouse rows
//!
//! A [`SinkRow`] is what lands in `cdc_<table>`: fixed audit columns plus
//! one `col_<key>` column per top-level key of the after-image. Rows are
//! built once by [`crate::project`] and only moved afterwards.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Serialize, Serializer};
use std::collections::BTreeMap;

/// Prefix of flattened after-image columns
pub const COLUMN_PREFIX: &str = "col_";

/// Audit column names, in table order
pub mod columns {
    pub const TABLE: &str = "cdc_table";
    pub const OPERATION: &str = "cdc_operation";
    pub const TIMESTAMP: &str = "cdc_timestamp";
    pub const BEFORE: &str = "before_data";
    pub const AFTER: &str = "after_data";
    pub const RAW: &str = "raw_payload";
    pub const INGESTED_AT: &str = "ingested_at";
}

/// One row destined for the warehouse
///
/// Serializes to a flat JSON object with RFC 3339 millisecond timestamps,
/// which is the shape streaming-insert APIs expect. `None` flattened
/// values serialize as JSON `null`, distinct from an absent column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SinkRow {
    /// Source table
    pub cdc_table: String,

    /// Operation label (`INSERT`, `UPDATE`, ...)
    pub cdc_operation: &'static str,

    /// Source commit time, or ingestion time when unknown
    #[serde(serialize_with = "serialize_millis")]
    pub cdc_timestamp: DateTime<Utc>,

    /// Canonical JSON of the before-image
    pub before_data: Option<String>,

    /// Canonical JSON of the after-image
    pub after_data: Option<String>,

    /// Canonical JSON of after, else before, else `{}`; never empty
    pub raw_payload: String,

    /// Wall-clock time at projection
    #[serde(serialize_with = "serialize_millis")]
    pub ingested_at: DateTime<Utc>,

    /// Flattened after-image, keyed `col_<key>`
    #[serde(flatten)]
    pub columns: BTreeMap<String, Option<String>>,
}

impl SinkRow {
    /// Value of a flattened column by source key (without the prefix)
    ///
    /// Outer `None`: column absent. Inner `None`: column present, value null.
    pub fn column(&self, key: &str) -> Option<Option<&str>> {
        self.columns
            .get(&format!("{COLUMN_PREFIX}{key}"))
            .map(|v| v.as_deref())
    }
}

/// Format a timestamp the way rows serialize it
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn serialize_millis<S: Serializer>(ts: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&format_timestamp(ts))
}
