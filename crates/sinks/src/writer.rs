//! Per-table batch writer
//!
//! [`SinkWriter::write_batch`] is the single entry point the engine uses
//! to land rows. It resolves the destination, ensures the table exists
//! (once per process, cached after the first success), inserts, and
//! turns the backend's answer into a [`BatchOutcome`].

use std::collections::HashSet;
use std::sync::Arc;

use cdcflow_protocol::SinkRow;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::error::SinkError;
use crate::metrics::{SinkWriterMetrics, SinkWriterMetricsHandle};
use crate::schema::TableSpec;
use crate::warehouse::{RowError, Warehouse};

/// Row errors logged per partial failure
const LOGGED_ROW_ERRORS: usize = 3;

/// Outcome of a batch the warehouse accepted
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    /// Rows actually written
    pub written: usize,
    /// Rows the warehouse rejected
    pub failures: Vec<RowError>,
}

impl BatchOutcome {
    /// Number of rejected rows
    pub fn failed(&self) -> usize {
        self.failures.len()
    }
}

/// Writes batches for any table to one warehouse dataset
pub struct SinkWriter {
    warehouse: Arc<dyn Warehouse>,
    dataset: String,
    ensured: Mutex<HashSet<String>>,
    metrics: Arc<SinkWriterMetrics>,
}

impl SinkWriter {
    /// Create a writer targeting `dataset`
    pub fn new(warehouse: Arc<dyn Warehouse>, dataset: impl Into<String>) -> Self {
        Self {
            warehouse,
            dataset: dataset.into(),
            ensured: Mutex::new(HashSet::new()),
            metrics: Arc::new(SinkWriterMetrics::new()),
        }
    }

    /// Backend name
    pub fn warehouse_name(&self) -> &'static str {
        self.warehouse.name()
    }

    /// Destination dataset
    pub fn dataset(&self) -> &str {
        &self.dataset
    }

    /// Metrics handle for the reporter
    pub fn metrics_handle(&self) -> SinkWriterMetricsHandle {
        SinkWriterMetricsHandle::new(
            format!("{}:{}", self.warehouse.name(), self.dataset),
            self.warehouse.name(),
            Arc::clone(&self.metrics),
        )
    }

    /// Whether `table` has been ensured by this writer
    pub fn is_ensured(&self, table: &str) -> bool {
        self.ensured.lock().contains(table)
    }

    /// Write `rows` for source `table`
    ///
    /// `Err` is a total failure: treat every row as not written. A
    /// partially rejected batch is `Ok` with the rejected rows in
    /// `failures`; nothing is retried at this level.
    pub async fn write_batch(&self, table: &str, rows: &[SinkRow]) -> Result<BatchOutcome, SinkError> {
        if rows.is_empty() {
            return Ok(BatchOutcome::default());
        }

        let result = self.write_inner(table, rows).await;
        match &result {
            Ok(outcome) => {
                self.metrics.batches_written.inc();
                self.metrics.rows_written.add(outcome.written as u64);
                self.metrics.rows_rejected.add(outcome.failed() as u64);
            }
            Err(_) => self.metrics.write_failures.inc(),
        }
        result
    }

    async fn write_inner(&self, table: &str, rows: &[SinkRow]) -> Result<BatchOutcome, SinkError> {
        let spec = TableSpec::new(&self.dataset, table)?;
        self.ensure_table(&spec).await?;

        let outcome = self.warehouse.insert_rows(&spec, rows).await?;
        let mut failures = outcome.rejected;
        // Backends may report one error per row and field; count rows once
        failures.sort_by_key(|f| f.index);
        failures.dedup_by_key(|f| f.index);
        failures.retain(|f| f.index < rows.len());
        let written = rows.len() - failures.len();

        if failures.is_empty() {
            debug!(table = %spec.qualified_name(), rows = written, "batch written");
        } else {
            for failure in failures.iter().take(LOGGED_ROW_ERRORS) {
                warn!(
                    table = %spec.qualified_name(),
                    row = failure.index,
                    reason = %failure.reason,
                    "row rejected by warehouse"
                );
            }
            warn!(
                table = %spec.qualified_name(),
                written,
                failed = failures.len(),
                "partial batch failure"
            );
        }

        Ok(BatchOutcome { written, failures })
    }

    async fn ensure_table(&self, spec: &TableSpec) -> Result<(), SinkError> {
        if self.is_ensured(spec.source_table()) {
            return Ok(());
        }

        self.warehouse.create_table(spec).await?;
        if self.ensured.lock().insert(spec.source_table().to_string()) {
            self.metrics.tables_provisioned.inc();
            info!(
                table = %spec.qualified_name(),
                warehouse = self.warehouse.name(),
                "destination table ready"
            );
        }
        Ok(())
    }
}

impl std::fmt::Debug for SinkWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SinkWriter")
            .field("warehouse", &self.warehouse.name())
            .field("dataset", &self.dataset)
            .finish()
    }
}
