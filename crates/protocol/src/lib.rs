//! cdcflow Protocol - change events in, warehouse rows out
//!
//! This crate provides the stateless types and functions at the edges of
//! the pipeline:
//! - `parse` - decode a change-event envelope into a `ChangeRecord`
//! - `ChangeRecord` / `Operation` - the normalized change
//! - `project` - turn a `ChangeRecord` into a `SinkRow`
//! - `SinkRow` - audit columns plus flattened `col_*` columns
//!
//! # Design Principles
//!
//! - **Tolerant decoding**: missing table, op or timestamp never fail a
//!   message; only bodies that cannot describe a row change do
//! - **Deterministic projection**: canonical JSON, so identical input
//!   yields identical rows
//! - **No I/O**: everything here is a pure function

mod error;
mod parse;
mod project;
mod record;
mod row;

pub use error::ParseError;
pub use parse::parse;
pub use project::project;
pub use record::{ChangeRecord, Operation, RowImage, UNKNOWN_TABLE};
pub use row::{COLUMN_PREFIX, SinkRow, columns, format_timestamp};

// Test modules - only compiled during testing
#[cfg(test)]
mod error_test;
#[cfg(test)]
mod parse_test;
#[cfg(test)]
mod project_test;
