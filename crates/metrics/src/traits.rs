//! Metrics provider traits
//!
//! Components implement these so the reporter can collect their metrics
//! without knowing the concrete types. Snapshots are plain `Copy` structs;
//! the atomics behind them live in the owning crate.

use serde::Serialize;

/// Point-in-time snapshot of the ingestion engine
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct PipelineSnapshot {
    /// Messages delivered to the handler
    pub messages_received: u64,
    /// Messages acknowledged and dropped as unparseable
    pub parse_errors: u64,
    /// Rows currently waiting in table buffers
    pub rows_buffered: u64,
    /// Rows written to the warehouse since start
    pub rows_processed: u64,
    /// Rows rejected or lost to failed flushes
    pub rows_failed: u64,
    /// Flushes triggered by the row-count threshold
    pub flushes_size: u64,
    /// Flushes triggered by the time threshold
    pub flushes_interval: u64,
    /// Final flushes during shutdown
    pub flushes_shutdown: u64,
    /// Table writes that failed entirely
    pub flush_failures: u64,
    /// Rows written by the most recent flush
    pub last_flush_written: u64,
    /// Rows failed by the most recent flush
    pub last_flush_failed: u64,
}

impl PipelineSnapshot {
    /// Total flushes of any trigger
    pub fn flushes(&self) -> u64 {
        self.flushes_size + self.flushes_interval + self.flushes_shutdown
    }
}

/// Trait for the engine to provide metrics to the reporter
pub trait PipelineMetricsProvider: Send + Sync {
    /// Get a snapshot of engine metrics
    fn pipeline_snapshot(&self) -> PipelineSnapshot;
}

/// Point-in-time snapshot of a bus subscription
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct SourceMetricsSnapshot {
    /// Messages pulled from the bus
    pub messages_received: u64,
    /// Messages acknowledged
    pub messages_acked: u64,
    /// Messages negatively acknowledged (redelivered later)
    pub messages_nacked: u64,
    /// Delivered messages not yet settled
    pub outstanding: u64,
    /// Failed pull or acknowledge calls
    pub errors: u64,
}

/// Trait for bus subscribers to provide metrics to the reporter
pub trait SourceMetricsProvider: Send + Sync {
    /// Identifier for this subscription (usually the subscription id)
    fn source_id(&self) -> &str;

    /// Transport type (e.g., "pubsub", "file", "memory")
    fn source_type(&self) -> &str;

    /// Get a snapshot of current metrics
    fn snapshot(&self) -> SourceMetricsSnapshot;
}

/// Point-in-time snapshot of the sink writer
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct SinkMetricsSnapshot {
    /// Batches handed to the warehouse
    pub batches_written: u64,
    /// Rows the warehouse accepted
    pub rows_written: u64,
    /// Rows the warehouse rejected individually
    pub rows_rejected: u64,
    /// Batches that failed entirely
    pub write_failures: u64,
    /// Destination tables ensured since start
    pub tables_provisioned: u64,
}

/// Trait for sinks to provide metrics to the reporter
pub trait SinkMetricsProvider: Send + Sync {
    /// Identifier for this sink instance
    fn sink_id(&self) -> &str;

    /// Backend type (e.g., "bigquery", "clickhouse", "stdout")
    fn sink_type(&self) -> &str;

    /// Get a snapshot of current metrics
    fn snapshot(&self) -> SinkMetricsSnapshot;
}
