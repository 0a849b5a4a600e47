//! cdcflow - Metrics
//!
//! Internal metrics collection and reporting for observability.
//!
//! # Overview
//!
//! This crate provides:
//! - `Counter` / `Gauge` atomic wrappers used by every component
//! - Provider traits through which the engine, the bus subscriber and the
//!   sink writer expose point-in-time snapshots
//! - A unified reporter that logs snapshots and per-second rates on an
//!   interval, in human or JSON format
//!
//! # Metrics Handle Pattern
//!
//! Components keep their counters in an `Arc` and hand out a cheap handle
//! implementing the provider trait. The handle stays valid after `run()`
//! consumes the component.
//!
//! ```text
//! Engine (owns Arc<EngineMetrics>)
//!     │
//!     ├──► metrics_handle() → EngineMetricsHandle (implements PipelineMetricsProvider)
//!     │
//!     └──► run() [consumes self, Arc keeps metrics alive]
//! ```
//!
//! # Example
//!
//! ```ignore
//! use cdcflow_metrics::UnifiedReporter;
//! use std::sync::Arc;
//!
//! let reporter = UnifiedReporter::builder()
//!     .config(config.metrics.clone())
//!     .pipeline(Arc::new(engine.metrics_handle()))
//!     .sink(Arc::new(writer.metrics_handle()))
//!     .build();
//! tokio::spawn(reporter.run(cancel.clone()));
//! ```

mod collected;
pub mod format;
mod reporter;
mod traits;

pub use collected::{
    CollectedMetrics, CollectedSink, CollectedSource, MetricsRates, PipelineRates, SinkRates,
    SourceRates,
};
pub use format::{HumanFormatter, JsonFormatter, MetricsFormatter};
pub use reporter::{UnifiedReporter, UnifiedReporterBuilder};
pub use traits::{
    PipelineMetricsProvider, PipelineSnapshot, SinkMetricsProvider, SinkMetricsSnapshot,
    SourceMetricsProvider, SourceMetricsSnapshot,
};

use std::sync::atomic::{AtomicU64, Ordering};

/// Atomic counter wrapper for convenient metric operations
#[derive(Debug, Default)]
pub struct Counter(AtomicU64);

impl Counter {
    /// Create a new counter initialized to 0
    #[inline]
    pub const fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    /// Increment the counter by `val`
    #[inline]
    pub fn add(&self, val: u64) {
        self.0.fetch_add(val, Ordering::Relaxed);
    }

    /// Increment the counter by 1
    #[inline]
    pub fn inc(&self) {
        self.add(1);
    }

    /// Get the current value
    #[inline]
    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Atomic gauge: a value that is set rather than accumulated
#[derive(Debug, Default)]
pub struct Gauge(AtomicU64);

impl Gauge {
    /// Create a new gauge at 0
    #[inline]
    pub const fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    /// Replace the current value
    #[inline]
    pub fn set(&self, val: u64) {
        self.0.store(val, Ordering::Relaxed);
    }

    /// Increment by 1
    #[inline]
    pub fn inc(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    /// Decrement by 1, saturating at 0
    #[inline]
    pub fn dec(&self) {
        let _ = self
            .0
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |v| v.checked_sub(1));
    }

    /// Get the current value
    #[inline]
    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}
