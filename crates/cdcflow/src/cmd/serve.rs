//! Serve command - run the ingestion engine
//!
//! Opens the configured subscription, writes to the configured warehouse
//! and runs until SIGINT/SIGTERM or until the subscription ends. On a
//! signal the engine drains (in-flight handlers, then one final flush),
//! bounded by `pipeline.shutdown_timeout`.

use std::sync::Arc;

use anyhow::{Context, Result};
use cdcflow_config::Config;
use cdcflow_metrics::UnifiedReporter;
use cdcflow_pipeline::{EngineError, EngineReport, IngestionEngine};
use cdcflow_sinks::SinkWriter;
use tokio::signal;
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Run the serve command
pub async fn run(config: Config) -> Result<()> {
    info!(
        version = env!("CARGO_PKG_VERSION"),
        platform = std::env::consts::OS,
        arch = std::env::consts::ARCH,
        project = %config.pipeline.project_id,
        subscription = %config.pipeline.subscription_id,
        dataset = %config.pipeline.dataset_id,
        bus = config.bus.type_name(),
        warehouse = config.warehouse.type_name(),
        "cdcflow starting"
    );

    if let Err(e) = run_engine(config).await {
        error!(error = %e, "cdcflow failed");
        return Err(e);
    }

    info!("cdcflow shutdown complete");
    Ok(())
}

/// Build the components, run the engine and coordinate shutdown
async fn run_engine(config: Config) -> Result<()> {
    let subscriber = cdcflow_bus::from_config(&config.pipeline, &config.bus)
        .context("failed to create bus subscriber")?;
    let warehouse = cdcflow_sinks::from_config(&config.pipeline, &config.warehouse)
        .context("failed to create warehouse client")?;
    let writer = Arc::new(SinkWriter::new(warehouse, config.pipeline.dataset_id.clone()));

    let engine = IngestionEngine::new(
        config.pipeline.clone(),
        Arc::clone(&subscriber),
        Arc::clone(&writer),
    );

    // Cancels the engine and the reporter together
    let cancel = CancellationToken::new();

    let metrics_task = if config.metrics.enabled {
        let reporter = UnifiedReporter::builder()
            .config(config.metrics.clone())
            .pipeline(Arc::new(engine.metrics_handle()))
            .source(Arc::new(subscriber.metrics_handle()))
            .sink(Arc::new(writer.metrics_handle()))
            .build();
        let cancel = cancel.clone();
        Some(tokio::spawn(async move { reporter.run(cancel).await }))
    } else {
        info!("metrics reporting disabled");
        None
    };

    let mut engine_task = tokio::spawn(engine.run(cancel.clone()));

    let outcome = tokio::select! {
        _ = wait_for_shutdown() => {
            info!("shutdown signal received, draining...");
            cancel.cancel();
            drain(&mut engine_task, &config).await
        }
        joined = &mut engine_task => {
            // Subscription ended, or the engine never started
            cancel.cancel();
            finish(joined)
        }
    };

    if let Some(task) = metrics_task
        && let Err(e) = task.await
    {
        warn!(error = %e, "metrics reporter panicked");
    }

    outcome.map(|_| ())
}

/// Wait for the engine to drain, up to the shutdown timeout
async fn drain(
    engine_task: &mut JoinHandle<Result<EngineReport, EngineError>>,
    config: &Config,
) -> Result<Option<EngineReport>> {
    let timeout = config.pipeline.shutdown_timeout;
    match tokio::time::timeout(timeout, &mut *engine_task).await {
        Ok(joined) => finish(joined),
        Err(_) => {
            warn!(
                timeout_secs = timeout.as_secs(),
                "engine did not drain within timeout, buffered rows may be lost"
            );
            engine_task.abort();
            Ok(None)
        }
    }
}

fn finish(joined: Result<Result<EngineReport, EngineError>, JoinError>) -> Result<Option<EngineReport>> {
    match joined {
        Ok(Ok(report)) => Ok(Some(report)),
        Ok(Err(e)) => Err(e).context("ingestion engine failed"),
        Err(e) => Err(anyhow::anyhow!("ingestion engine task panicked: {}", e)),
    }
}

/// Wait for SIGINT or SIGTERM
async fn wait_for_shutdown() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
