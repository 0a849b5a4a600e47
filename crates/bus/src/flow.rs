//! Flow control
//!
//! Caps the number of delivered-but-unsettled messages. Every message
//! carries a [`FlowPermit`]; the permit returns to the pool when the
//! message is acknowledged, negatively acknowledged or dropped. A
//! subscriber that cannot obtain a permit stops pulling.

use std::sync::Arc;
use std::time::Duration;

use cdcflow_config::PipelineConfig;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::metrics::BusMetrics;

/// Flow-control settings for one subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlowControl {
    /// Maximum unsettled messages
    pub max_outstanding_messages: usize,
    /// Lease requested for each delivered message
    pub ack_deadline: Duration,
}

impl FlowControl {
    /// Settings from the pipeline configuration
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            max_outstanding_messages: config.max_outstanding_messages,
            ack_deadline: config.ack_deadline,
        }
    }
}

impl Default for FlowControl {
    fn default() -> Self {
        Self::from_config(&PipelineConfig::default())
    }
}

/// Shared permit pool for a subscription
#[derive(Debug, Clone)]
pub struct FlowController {
    permits: Arc<Semaphore>,
    max: usize,
    metrics: Arc<BusMetrics>,
}

impl FlowController {
    /// Create a pool of `max_outstanding_messages` permits (at least one)
    pub fn new(settings: &FlowControl, metrics: Arc<BusMetrics>) -> Self {
        let max = settings.max_outstanding_messages.max(1);
        Self {
            permits: Arc::new(Semaphore::new(max)),
            max,
            metrics,
        }
    }

    /// Wait for one permit; `None` once the pool is closed
    pub async fn acquire(&self) -> Option<FlowPermit> {
        let permit = Arc::clone(&self.permits).acquire_owned().await.ok()?;
        Some(self.wrap(permit))
    }

    /// Wait for one permit, then take up to `n - 1` more without waiting
    ///
    /// Returns an empty vector only when the pool is closed.
    pub async fn acquire_up_to(&self, n: usize) -> Vec<FlowPermit> {
        let Some(first) = self.acquire().await else {
            return Vec::new();
        };

        let mut permits = Vec::with_capacity(n.max(1));
        permits.push(first);
        while permits.len() < n {
            match Arc::clone(&self.permits).try_acquire_owned() {
                Ok(permit) => permits.push(self.wrap(permit)),
                Err(_) => break,
            }
        }
        permits
    }

    /// Permits in use, including ones reserved for a pull in flight
    pub fn outstanding(&self) -> usize {
        self.max - self.permits.available_permits()
    }

    /// Configured cap
    pub fn max_outstanding(&self) -> usize {
        self.max
    }

    /// Stop handing out permits; pending acquires return `None`
    pub fn close(&self) {
        self.permits.close();
    }

    fn wrap(&self, permit: OwnedSemaphorePermit) -> FlowPermit {
        self.metrics.outstanding.inc();
        FlowPermit {
            _permit: permit,
            metrics: Arc::clone(&self.metrics),
        }
    }
}

/// One unit of the flow-control window, held by a delivered message
#[derive(Debug)]
pub struct FlowPermit {
    _permit: OwnedSemaphorePermit,
    metrics: Arc<BusMetrics>,
}

impl FlowPermit {
    pub(crate) fn metrics(&self) -> &Arc<BusMetrics> {
        &self.metrics
    }
}

impl Drop for FlowPermit {
    fn drop(&mut self) {
        self.metrics.outstanding.dec();
    }
}
