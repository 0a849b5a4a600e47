//! Engine metrics
//!
//! Counters are updated by message handlers and the flusher without
//! locking. The reporter reads them through [`EngineMetricsHandle`].

use std::sync::Arc;

use cdcflow_metrics::{Counter, Gauge, PipelineMetricsProvider, PipelineSnapshot};

use crate::policy::FlushTrigger;

/// Counters for one engine run
#[derive(Debug, Default)]
pub struct EngineMetrics {
    /// Messages handed to a handler
    pub messages_received: Counter,
    /// Messages acknowledged and dropped as unparseable
    pub parse_errors: Counter,
    /// Rows waiting in table buffers
    pub rows_buffered: Gauge,
    /// Rows the warehouse accepted
    pub rows_processed: Counter,
    /// Rows rejected or lost to failed writes
    pub rows_failed: Counter,
    /// Size-triggered flushes
    pub flushes_size: Counter,
    /// Interval-triggered flushes
    pub flushes_interval: Counter,
    /// Shutdown flushes
    pub flushes_shutdown: Counter,
    /// Table writes that failed entirely
    pub flush_failures: Counter,
    /// Rows written by the most recent flush
    pub last_flush_written: Gauge,
    /// Rows failed by the most recent flush
    pub last_flush_failed: Gauge,
}

impl EngineMetrics {
    /// Create new metrics with all counters at zero
    pub const fn new() -> Self {
        Self {
            messages_received: Counter::new(),
            parse_errors: Counter::new(),
            rows_buffered: Gauge::new(),
            rows_processed: Counter::new(),
            rows_failed: Counter::new(),
            flushes_size: Counter::new(),
            flushes_interval: Counter::new(),
            flushes_shutdown: Counter::new(),
            flush_failures: Counter::new(),
            last_flush_written: Gauge::new(),
            last_flush_failed: Gauge::new(),
        }
    }

    /// Record a completed flush
    #[inline]
    pub fn record_flush(&self, trigger: FlushTrigger, written: usize, failed: usize) {
        match trigger {
            FlushTrigger::Size => self.flushes_size.inc(),
            FlushTrigger::Interval => self.flushes_interval.inc(),
            FlushTrigger::Shutdown => self.flushes_shutdown.inc(),
        }
        self.rows_processed.add(written as u64);
        self.rows_failed.add(failed as u64);
        self.last_flush_written.set(written as u64);
        self.last_flush_failed.set(failed as u64);
    }

    /// Take a snapshot of current values
    pub fn snapshot(&self) -> PipelineSnapshot {
        PipelineSnapshot {
            messages_received: self.messages_received.get(),
            parse_errors: self.parse_errors.get(),
            rows_buffered: self.rows_buffered.get(),
            rows_processed: self.rows_processed.get(),
            rows_failed: self.rows_failed.get(),
            flushes_size: self.flushes_size.get(),
            flushes_interval: self.flushes_interval.get(),
            flushes_shutdown: self.flushes_shutdown.get(),
            flush_failures: self.flush_failures.get(),
            last_flush_written: self.last_flush_written.get(),
            last_flush_failed: self.last_flush_failed.get(),
        }
    }
}

/// Cloneable handle exposing engine metrics to the reporter
#[derive(Debug, Clone)]
pub struct EngineMetricsHandle {
    metrics: Arc<EngineMetrics>,
}

impl EngineMetricsHandle {
    pub(crate) fn new(metrics: Arc<EngineMetrics>) -> Self {
        Self { metrics }
    }
}

impl PipelineMetricsProvider for EngineMetricsHandle {
    fn pipeline_snapshot(&self) -> PipelineSnapshot {
        self.metrics.snapshot()
    }
}
