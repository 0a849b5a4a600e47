//! Subscription metrics

use std::sync::Arc;

use cdcflow_metrics::{Counter, Gauge, SourceMetricsProvider, SourceMetricsSnapshot};

/// Counters shared by a subscriber, its flow controller and its ack handles
#[derive(Debug, Default)]
pub struct BusMetrics {
    /// Messages delivered to the consumer
    pub received: Counter,
    /// Messages acknowledged
    pub acked: Counter,
    /// Messages negatively acknowledged (explicitly or on drop)
    pub nacked: Counter,
    /// Messages holding a flow-control permit
    pub outstanding: Gauge,
    /// Failed bus API calls
    pub errors: Counter,
}

impl BusMetrics {
    /// Create new metrics with all counters at zero
    pub const fn new() -> Self {
        Self {
            received: Counter::new(),
            acked: Counter::new(),
            nacked: Counter::new(),
            outstanding: Gauge::new(),
            errors: Counter::new(),
        }
    }

    /// Take a snapshot of current values
    pub fn snapshot(&self) -> SourceMetricsSnapshot {
        SourceMetricsSnapshot {
            messages_received: self.received.get(),
            messages_acked: self.acked.get(),
            messages_nacked: self.nacked.get(),
            outstanding: self.outstanding.get(),
            errors: self.errors.get(),
        }
    }
}

/// Cloneable handle exposing a subscriber's metrics to the reporter
#[derive(Debug, Clone)]
pub struct BusMetricsHandle {
    id: String,
    transport: &'static str,
    metrics: Arc<BusMetrics>,
}

impl BusMetricsHandle {
    pub(crate) fn new(id: impl Into<String>, transport: &'static str, metrics: Arc<BusMetrics>) -> Self {
        Self {
            id: id.into(),
            transport,
            metrics,
        }
    }
}

impl SourceMetricsProvider for BusMetricsHandle {
    fn source_id(&self) -> &str {
        &self.id
    }

    fn source_type(&self) -> &str {
        self.transport
    }

    fn snapshot(&self) -> SourceMetricsSnapshot {
        self.metrics.snapshot()
    }
}
