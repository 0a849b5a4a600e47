//! Unified metrics reporter
//!
//! Collects snapshots from the engine, the bus subscription and the sink
//! writer at the configured interval and logs them through `tracing`.

use crate::format::MetricsFormatter;
use crate::{
    CollectedMetrics, CollectedSink, CollectedSource, HumanFormatter, JsonFormatter,
    PipelineMetricsProvider, SinkMetricsProvider, SourceMetricsProvider,
};
use cdcflow_config::{MetricsConfig, MetricsFormat};
use std::sync::Arc;
use std::time::Instant;
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Builder for constructing a UnifiedReporter
#[derive(Default)]
pub struct UnifiedReporterBuilder {
    config: Option<MetricsConfig>,
    pipeline: Option<Arc<dyn PipelineMetricsProvider>>,
    sources: Vec<Arc<dyn SourceMetricsProvider>>,
    sinks: Vec<Arc<dyn SinkMetricsProvider>>,
}

impl UnifiedReporterBuilder {
    /// Create a new builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the metrics configuration
    pub fn config(mut self, config: MetricsConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Set the engine metrics provider
    pub fn pipeline(mut self, provider: Arc<dyn PipelineMetricsProvider>) -> Self {
        self.pipeline = Some(provider);
        self
    }

    /// Register a bus subscription metrics provider
    pub fn source(mut self, provider: Arc<dyn SourceMetricsProvider>) -> Self {
        self.sources.push(provider);
        self
    }

    /// Register a sink metrics provider
    pub fn sink(mut self, provider: Arc<dyn SinkMetricsProvider>) -> Self {
        self.sinks.push(provider);
        self
    }

    /// Build the UnifiedReporter
    pub fn build(self) -> UnifiedReporter {
        let config = self.config.unwrap_or_default();
        let formatter: Box<dyn MetricsFormatter> = match config.format {
            MetricsFormat::Human => Box::new(HumanFormatter::new()),
            MetricsFormat::Json => Box::new(JsonFormatter::new()),
        };

        UnifiedReporter {
            config,
            formatter,
            pipeline: self.pipeline,
            sources: self.sources,
            sinks: self.sinks,
            previous: None,
        }
    }
}

/// Unified metrics reporter
pub struct UnifiedReporter {
    config: MetricsConfig,
    formatter: Box<dyn MetricsFormatter>,
    pipeline: Option<Arc<dyn PipelineMetricsProvider>>,
    sources: Vec<Arc<dyn SourceMetricsProvider>>,
    sinks: Vec<Arc<dyn SinkMetricsProvider>>,
    previous: Option<CollectedMetrics>,
}

impl UnifiedReporter {
    /// Create a new builder
    pub fn builder() -> UnifiedReporterBuilder {
        UnifiedReporterBuilder::new()
    }

    /// Run the reporter until cancellation
    ///
    /// Spawn this as a tokio task. The first tick records a baseline;
    /// rates are reported from the second tick on.
    pub async fn run(mut self, cancel: CancellationToken) {
        if !self.config.enabled {
            info!("metrics reporting disabled");
            return;
        }

        let mut ticker = interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(
            interval_secs = self.config.interval.as_secs(),
            format = ?self.config.format,
            "metrics reporter started"
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("metrics reporter shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    self.report();
                }
            }
        }
    }

    /// Collect and report metrics once
    fn report(&mut self) {
        let metrics = self.collect();
        let rates = self.previous.as_ref().and_then(|prev| metrics.rates(prev));

        let output = self.formatter.format_unified(&metrics, rates.as_ref());
        for line in output.lines() {
            info!("{}", line);
        }

        self.previous = Some(metrics);
    }

    /// Collect metrics from all registered providers
    fn collect(&self) -> CollectedMetrics {
        CollectedMetrics {
            timestamp: Some(Instant::now()),
            pipeline: self.pipeline.as_ref().map(|p| p.pipeline_snapshot()),
            sources: self
                .sources
                .iter()
                .map(|s| CollectedSource {
                    id: s.source_id().to_string(),
                    source_type: s.source_type().to_string(),
                    snapshot: s.snapshot(),
                })
                .collect(),
            sinks: self
                .sinks
                .iter()
                .map(|s| CollectedSink {
                    id: s.sink_id().to_string(),
                    sink_type: s.sink_type().to_string(),
                    snapshot: s.snapshot(),
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{PipelineSnapshot, SinkMetricsSnapshot, SourceMetricsSnapshot};
    use std::time::Duration;

    struct TestPipeline;

    impl PipelineMetricsProvider for TestPipeline {
        fn pipeline_snapshot(&self) -> PipelineSnapshot {
            PipelineSnapshot {
                rows_processed: 250,
                ..Default::default()
            }
        }
    }

    struct TestSource;

    impl SourceMetricsProvider for TestSource {
        fn source_id(&self) -> &str {
            "cdc-events-sub"
        }
        fn source_type(&self) -> &str {
            "memory"
        }
        fn snapshot(&self) -> SourceMetricsSnapshot {
            SourceMetricsSnapshot::default()
        }
    }

    struct TestSink;

    impl SinkMetricsProvider for TestSink {
        fn sink_id(&self) -> &str {
            "raw"
        }
        fn sink_type(&self) -> &str {
            "memory"
        }
        fn snapshot(&self) -> SinkMetricsSnapshot {
            SinkMetricsSnapshot {
                rows_written: 250,
                ..Default::default()
            }
        }
    }

    #[test]
    fn test_builder_default() {
        let reporter = UnifiedReporter::builder().build();
        assert!(reporter.config.enabled);
        assert!(reporter.pipeline.is_none());
        assert!(reporter.sources.is_empty());
        assert!(reporter.sinks.is_empty());
    }

    #[test]
    fn test_collect_with_providers() {
        let reporter = UnifiedReporter::builder()
            .pipeline(Arc::new(TestPipeline))
            .source(Arc::new(TestSource))
            .sink(Arc::new(TestSink))
            .build();

        let metrics = reporter.collect();
        assert!(metrics.timestamp.is_some());
        assert_eq!(metrics.pipeline.unwrap().rows_processed, 250);
        assert_eq!(metrics.sources[0].id, "cdc-events-sub");
        assert_eq!(metrics.sinks[0].snapshot.rows_written, 250);
    }

    #[test]
    fn test_report_keeps_previous() {
        let mut reporter = UnifiedReporter::builder()
            .pipeline(Arc::new(TestPipeline))
            .build();
        reporter.report();
        assert!(reporter.previous.is_some());
    }

    #[tokio::test]
    async fn test_run_disabled() {
        let config = MetricsConfig {
            enabled: false,
            ..Default::default()
        };
        let reporter = UnifiedReporter::builder().config(config).build();
        reporter.run(CancellationToken::new()).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_cancellation() {
        let config = MetricsConfig {
            interval: Duration::from_secs(1),
            ..Default::default()
        };
        let reporter = UnifiedReporter::builder().config(config).build();
        let cancel = CancellationToken::new();

        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(3)).await;
            canceller.cancel();
        });

        reporter.run(cancel).await;
    }
}
