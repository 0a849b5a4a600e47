//! Ingestion pipeline configuration
//!
//! Identifiers for the subscription and destination dataset, the dual
//! size/time flush thresholds, and the flow-control window. Loaded once at
//! startup and immutable afterwards.

use serde::Deserialize;
use std::num::NonZeroUsize;
use std::time::Duration;

/// Default project identifier (local development)
pub const DEFAULT_PROJECT_ID: &str = "local-dev";

/// Default subscription identifier
pub const DEFAULT_SUBSCRIPTION_ID: &str = "cdc-events-sub";

/// Default destination dataset
pub const DEFAULT_DATASET_ID: &str = "raw";

/// Pipeline configuration
///
/// # Example
///
/// ```toml
/// [pipeline]
/// project_id = "acme-prod"
/// subscription_id = "cdc-events-sub"
/// dataset_id = "raw"
/// batch_size = 500
/// flush_interval = "2s"
/// max_outstanding_messages = 2000
/// ack_deadline = "60s"
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Cloud project that owns the subscription and dataset
    pub project_id: String,

    /// Bus subscription to consume change events from
    pub subscription_id: String,

    /// Destination dataset for `cdc_<table>` tables
    pub dataset_id: String,

    /// Row-count flush threshold across all tables
    /// Default: 100
    pub batch_size: usize,

    /// Time-based flush threshold
    /// Default: 5s
    #[serde(with = "humantime_serde")]
    pub flush_interval: Duration,

    /// Bus flow-control cap on unacknowledged messages
    /// Default: 1000
    pub max_outstanding_messages: usize,

    /// Lease requested for each delivered message
    /// Default: 60s
    #[serde(with = "humantime_serde")]
    pub ack_deadline: Duration,

    /// Concurrent message-handler invocations
    /// Default: available parallelism
    pub workers: Option<usize>,

    /// Snapshots allowed to queue for the flush path before handlers wait
    /// Default: 4
    pub max_pending_flushes: usize,

    /// Upper bound on the shutdown drain
    /// Default: 30s
    #[serde(with = "humantime_serde")]
    pub shutdown_timeout: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            project_id: DEFAULT_PROJECT_ID.to_string(),
            subscription_id: DEFAULT_SUBSCRIPTION_ID.to_string(),
            dataset_id: DEFAULT_DATASET_ID.to_string(),
            batch_size: 100,
            flush_interval: Duration::from_secs(5),
            max_outstanding_messages: 1000,
            ack_deadline: Duration::from_secs(60),
            workers: None,
            max_pending_flushes: 4,
            shutdown_timeout: Duration::from_secs(30),
        }
    }
}

impl PipelineConfig {
    /// Set the row-count flush threshold
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Set the time-based flush threshold
    pub fn with_flush_interval(mut self, interval: Duration) -> Self {
        self.flush_interval = interval;
        self
    }

    /// Set the flow-control window
    pub fn with_max_outstanding_messages(mut self, max: usize) -> Self {
        self.max_outstanding_messages = max;
        self
    }

    /// Set the handler concurrency
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = Some(workers);
        self
    }

    /// Handler concurrency, falling back to the number of available cores
    pub fn effective_workers(&self) -> usize {
        self.workers.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(NonZeroUsize::get)
                .unwrap_or(4)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.project_id, "local-dev");
        assert_eq!(config.subscription_id, "cdc-events-sub");
        assert_eq!(config.dataset_id, "raw");
        assert_eq!(config.batch_size, 100);
        assert_eq!(config.flush_interval, Duration::from_secs(5));
        assert_eq!(config.max_outstanding_messages, 1000);
        assert_eq!(config.ack_deadline, Duration::from_secs(60));
        assert_eq!(config.max_pending_flushes, 4);
    }

    #[test]
    fn test_deserialize_partial() {
        let toml = r#"
batch_size = 250
flush_interval = "1500ms"
workers = 2
"#;
        let config: PipelineConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.batch_size, 250);
        assert_eq!(config.flush_interval, Duration::from_millis(1500));
        assert_eq!(config.effective_workers(), 2);
        assert_eq!(config.subscription_id, "cdc-events-sub");
    }

    #[test]
    fn test_builders() {
        let config = PipelineConfig::default()
            .with_batch_size(10)
            .with_flush_interval(Duration::from_secs(1))
            .with_max_outstanding_messages(20)
            .with_workers(3);
        assert_eq!(config.batch_size, 10);
        assert_eq!(config.flush_interval, Duration::from_secs(1));
        assert_eq!(config.max_outstanding_messages, 20);
        assert_eq!(config.workers, Some(3));
    }

    #[test]
    fn test_effective_workers_auto() {
        assert!(PipelineConfig::default().effective_workers() >= 1);
    }
}
