//! Collected metrics snapshot and rate calculations
//!
//! One collection holds every provider's snapshot at a point in time.
//! Two consecutive collections yield per-second rates and per-period
//! error deltas.

use crate::{PipelineSnapshot, SinkMetricsSnapshot, SourceMetricsSnapshot};
use std::time::{Duration, Instant};

/// Collected source snapshot with metadata
#[derive(Debug, Clone)]
pub struct CollectedSource {
    /// Source identifier
    pub id: String,
    /// Transport type
    pub source_type: String,
    /// Metrics snapshot
    pub snapshot: SourceMetricsSnapshot,
}

/// Collected sink snapshot with metadata
#[derive(Debug, Clone)]
pub struct CollectedSink {
    /// Sink identifier
    pub id: String,
    /// Backend type
    pub sink_type: String,
    /// Metrics snapshot
    pub snapshot: SinkMetricsSnapshot,
}

/// Complete metrics collection at a point in time
#[derive(Debug, Clone, Default)]
pub struct CollectedMetrics {
    /// When this collection was taken
    pub timestamp: Option<Instant>,

    /// Engine metrics
    pub pipeline: Option<PipelineSnapshot>,

    /// Bus subscription metrics
    pub sources: Vec<CollectedSource>,

    /// Sink writer metrics
    pub sinks: Vec<CollectedSink>,
}

impl CollectedMetrics {
    /// Create a new empty collection stamped now
    pub fn new() -> Self {
        Self {
            timestamp: Some(Instant::now()),
            ..Default::default()
        }
    }

    /// Calculate rates by comparing with a previous collection
    ///
    /// Returns None if timestamps are missing or no time has passed.
    pub fn rates(&self, previous: &CollectedMetrics) -> Option<MetricsRates> {
        let elapsed = self.timestamp?.checked_duration_since(previous.timestamp?)?;
        if elapsed.is_zero() {
            return None;
        }
        let secs = elapsed.as_secs_f64();

        let pipeline = match (&self.pipeline, &previous.pipeline) {
            (Some(current), Some(prev)) => Some(PipelineRates {
                messages_per_sec: rate(current.messages_received, prev.messages_received, secs),
                rows_per_sec: rate(current.rows_processed, prev.rows_processed, secs),
                rows_buffered: current.rows_buffered,
                parse_errors: current.parse_errors.saturating_sub(prev.parse_errors),
                rows_failed: current.rows_failed.saturating_sub(prev.rows_failed),
                flushes: current.flushes().saturating_sub(prev.flushes()),
            }),
            _ => None,
        };

        let sources = self
            .sources
            .iter()
            .filter_map(|current| {
                let prev = previous.sources.iter().find(|s| s.id == current.id)?;
                Some(SourceRates {
                    id: current.id.clone(),
                    source_type: current.source_type.clone(),
                    messages_per_sec: rate(
                        current.snapshot.messages_received,
                        prev.snapshot.messages_received,
                        secs,
                    ),
                    acks_per_sec: rate(
                        current.snapshot.messages_acked,
                        prev.snapshot.messages_acked,
                        secs,
                    ),
                    outstanding: current.snapshot.outstanding,
                    errors: current.snapshot.errors.saturating_sub(prev.snapshot.errors),
                })
            })
            .collect();

        let sinks = self
            .sinks
            .iter()
            .filter_map(|current| {
                let prev = previous.sinks.iter().find(|s| s.id == current.id)?;
                Some(SinkRates {
                    id: current.id.clone(),
                    sink_type: current.sink_type.clone(),
                    rows_per_sec: rate(
                        current.snapshot.rows_written,
                        prev.snapshot.rows_written,
                        secs,
                    ),
                    rows_rejected: current
                        .snapshot
                        .rows_rejected
                        .saturating_sub(prev.snapshot.rows_rejected),
                    failures: current
                        .snapshot
                        .write_failures
                        .saturating_sub(prev.snapshot.write_failures),
                })
            })
            .collect();

        Some(MetricsRates {
            elapsed,
            pipeline,
            sources,
            sinks,
        })
    }
}

/// Calculate rate per second
#[inline]
fn rate(current: u64, previous: u64, elapsed_secs: f64) -> f64 {
    current.saturating_sub(previous) as f64 / elapsed_secs
}

/// Calculated rates between two collections
#[derive(Debug, Clone)]
pub struct MetricsRates {
    /// Time elapsed between collections
    pub elapsed: Duration,

    /// Engine rates
    pub pipeline: Option<PipelineRates>,

    /// Per-subscription rates
    pub sources: Vec<SourceRates>,

    /// Per-sink rates
    pub sinks: Vec<SinkRates>,
}

/// Engine rates
#[derive(Debug, Clone, Copy)]
pub struct PipelineRates {
    /// Messages received per second
    pub messages_per_sec: f64,
    /// Rows written per second
    pub rows_per_sec: f64,
    /// Rows buffered at collection time
    pub rows_buffered: u64,
    /// Parse errors in this period
    pub parse_errors: u64,
    /// Failed rows in this period
    pub rows_failed: u64,
    /// Flushes in this period
    pub flushes: u64,
}

/// Subscription rates
#[derive(Debug, Clone)]
pub struct SourceRates {
    /// Source identifier
    pub id: String,
    /// Transport type
    pub source_type: String,
    /// Messages received per second
    pub messages_per_sec: f64,
    /// Acknowledgments per second
    pub acks_per_sec: f64,
    /// Unsettled messages at collection time
    pub outstanding: u64,
    /// Errors in this period
    pub errors: u64,
}

/// Sink rates
#[derive(Debug, Clone)]
pub struct SinkRates {
    /// Sink identifier
    pub id: String,
    /// Backend type
    pub sink_type: String,
    /// Rows written per second
    pub rows_per_sec: f64,
    /// Rejected rows in this period
    pub rows_rejected: u64,
    /// Failed batches in this period
    pub failures: u64,
}
