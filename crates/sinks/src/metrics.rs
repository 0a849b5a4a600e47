//! Sink writer metrics
//!
//! Atomic counters updated by [`crate::SinkWriter`] and read by the
//! metrics reporter through [`SinkWriterMetricsHandle`].

use std::sync::Arc;

use cdcflow_metrics::{Counter, SinkMetricsProvider, SinkMetricsSnapshot};

/// Counters for one writer
#[derive(Debug, Default)]
pub struct SinkWriterMetrics {
    /// Batches the backend accepted (fully or partially)
    pub batches_written: Counter,
    /// Rows written
    pub rows_written: Counter,
    /// Rows rejected individually by the backend
    pub rows_rejected: Counter,
    /// Batches that failed entirely
    pub write_failures: Counter,
    /// Tables ensured since startup
    pub tables_provisioned: Counter,
}

impl SinkWriterMetrics {
    /// Create new metrics with all counters at zero
    pub const fn new() -> Self {
        Self {
            batches_written: Counter::new(),
            rows_written: Counter::new(),
            rows_rejected: Counter::new(),
            write_failures: Counter::new(),
            tables_provisioned: Counter::new(),
        }
    }

    /// Take a snapshot of current values
    pub fn snapshot(&self) -> SinkMetricsSnapshot {
        SinkMetricsSnapshot {
            batches_written: self.batches_written.get(),
            rows_written: self.rows_written.get(),
            rows_rejected: self.rows_rejected.get(),
            write_failures: self.write_failures.get(),
            tables_provisioned: self.tables_provisioned.get(),
        }
    }
}

/// Handle for reading a writer's metrics
///
/// Holds an `Arc` to the counters, so it stays valid after the writer is
/// moved into the engine.
#[derive(Debug, Clone)]
pub struct SinkWriterMetricsHandle {
    id: String,
    sink_type: &'static str,
    metrics: Arc<SinkWriterMetrics>,
}

impl SinkWriterMetricsHandle {
    pub(crate) fn new(id: String, sink_type: &'static str, metrics: Arc<SinkWriterMetrics>) -> Self {
        Self {
            id,
            sink_type,
            metrics,
        }
    }
}

impl SinkMetricsProvider for SinkWriterMetricsHandle {
    fn sink_id(&self) -> &str {
        &self.id
    }

    fn sink_type(&self) -> &str {
        self.sink_type
    }

    fn snapshot(&self) -> SinkMetricsSnapshot {
        self.metrics.snapshot()
    }
}
