//! Normalized change records
//!
//! A [`ChangeRecord`] is one change-bus message after envelope decoding:
//! which table changed, how, the row images on either side of the change,
//! and when it happened at the source.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use std::fmt;

/// A row image: column name to JSON value
pub type RowImage = Map<String, Value>;

/// Table name used when the envelope does not carry one
pub const UNKNOWN_TABLE: &str = "unknown";

/// Kind of change captured at the source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// Row inserted (`c`)
    Create,
    /// Row updated (`u`)
    Update,
    /// Row deleted (`d`)
    Delete,
    /// Row read during an initial snapshot (`r`)
    Snapshot,
    /// Absent or unrecognized operation code
    Unknown,
}

impl Operation {
    /// Map a single-letter envelope code
    pub fn from_code(code: &str) -> Self {
        match code {
            "c" => Self::Create,
            "u" => Self::Update,
            "d" => Self::Delete,
            "r" => Self::Snapshot,
            _ => Self::Unknown,
        }
    }

    /// Label written to the `cdc_operation` column
    pub const fn label(self) -> &'static str {
        match self {
            Self::Create => "INSERT",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
            Self::Snapshot => "SNAPSHOT",
            Self::Unknown => "UNKNOWN",
        }
    }

    /// All operations, in label order
    pub const ALL: [Operation; 5] = [
        Self::Create,
        Self::Update,
        Self::Delete,
        Self::Snapshot,
        Self::Unknown,
    ];
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One change event, normalized
///
/// At least one of `before` / `after` is always present; the parser
/// rejects envelopes carrying neither.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeRecord {
    /// Logical source table
    pub table_name: String,

    /// What happened to the row
    pub operation: Operation,

    /// Row image before the change (absent on create and snapshot)
    pub before: Option<RowImage>,

    /// Row image after the change (absent on delete)
    pub after: Option<RowImage>,

    /// Source commit time in milliseconds since the epoch; `0` is unknown
    pub event_time_ms: i64,
}

impl ChangeRecord {
    /// Source commit time, or `None` when unknown or out of range
    pub fn event_time(&self) -> Option<DateTime<Utc>> {
        if self.event_time_ms <= 0 {
            return None;
        }
        DateTime::from_timestamp_millis(self.event_time_ms)
    }

    /// The image that best describes the row: `after`, else `before`
    pub fn current_image(&self) -> Option<&RowImage> {
        self.after.as_ref().or(self.before.as_ref())
    }
}
