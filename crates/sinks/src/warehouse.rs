//! Warehouse backend trait

use async_trait::async_trait;
use cdcflow_protocol::SinkRow;

use crate::error::SinkError;
use crate::schema::TableSpec;

/// A rejected row within an otherwise accepted insert
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowError {
    /// Position of the row in the submitted slice
    pub index: usize,
    /// Backend-provided reason
    pub reason: String,
}

impl RowError {
    /// Create a row error
    pub fn new(index: usize, reason: impl Into<String>) -> Self {
        Self {
            index,
            reason: reason.into(),
        }
    }
}

/// Result of an insert the backend accepted
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InsertOutcome {
    /// Rows the backend refused; the rest were written
    pub rejected: Vec<RowError>,
}

impl InsertOutcome {
    /// Every row was written
    pub fn all_written() -> Self {
        Self::default()
    }
}

/// Destination for batches of rows
///
/// Implementations must be callable from one flush task at a time but are
/// shared behind `Arc`, so they take `&self`.
#[async_trait]
pub trait Warehouse: Send + Sync {
    /// Backend name for logs and metrics
    fn name(&self) -> &'static str;

    /// Create the destination table if it does not exist
    async fn create_table(&self, spec: &TableSpec) -> Result<(), SinkError>;

    /// Insert rows in order
    ///
    /// `Err` means nothing may be assumed written. Partial rejection is
    /// reported through [`InsertOutcome::rejected`] and never retried here.
    async fn insert_rows(&self, spec: &TableSpec, rows: &[SinkRow]) -> Result<InsertOutcome, SinkError>;
}
