//! Ingestion engine
//!
//! The engine connects one bus subscription to one warehouse writer:
//!
//! ```text
//! Subscription ──► handlers (≤ workers) ──► TableBufferSet ──► flusher ──► SinkWriter
//!                  parse, project,           one mutex          one task,
//!                  append, ack                                  table by table
//! ```
//!
//! # Handlers
//!
//! Each delivered message is handled on its own task. A handler parses the
//! body, projects it to a row, appends the row under the buffer lock and
//! acknowledges the message. If the flush policy fires on that append, the
//! handler takes a snapshot and queues it for the flusher while still
//! holding the lock, so snapshots reach the flusher in the order they were
//! taken. Unparseable messages are counted, logged and acknowledged.
//!
//! Messages are acknowledged once buffered, before the warehouse has the
//! row. A failed table write therefore loses that table's rows from the
//! snapshot; they are counted in `rows_failed`.
//!
//! # Flusher
//!
//! A single task writes queued snapshots and, every `flush_interval`,
//! snapshots the buffers itself if the policy says they are due. Queued
//! snapshots hold a flush slot; with `max_pending_flushes` slots taken,
//! handlers wait before buffering more rows.
//!
//! # Shutdown
//!
//! On cancellation (or when the subscription ends) the engine stops taking
//! messages, waits for in-flight handlers, cancels the subscription, queues
//! one final snapshot and lets the flusher drain the queue before it exits.
//!
//! # Example
//!
//! ```ignore
//! let engine = IngestionEngine::new(config.pipeline.clone(), subscriber, writer);
//! let mut state = engine.state();
//! let report = engine.run(shutdown.clone()).await?;
//! ```

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use cdcflow_bus::{FlowControl, Message, Subscriber};
use cdcflow_config::PipelineConfig;
use cdcflow_protocol::{SinkRow, parse, project};
use cdcflow_sinks::SinkWriter;
use chrono::Utc;
use parking_lot::Mutex;
use tokio::sync::{OwnedSemaphorePermit, Semaphore, mpsc, watch};
use tokio::task::JoinSet;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::buffer::{BufferSnapshot, TableBufferSet};
use crate::error::{EngineError, Result};
use crate::metrics::{EngineMetrics, EngineMetricsHandle};
use crate::parse_log::ParseErrorLog;
use crate::policy::{FlushPolicy, FlushTrigger};

/// Shortest timer period, guarding against a zero flush interval
const MIN_TICK: Duration = Duration::from_millis(10);

/// Longest timer period; the policy still decides what is due
const MAX_TICK: Duration = Duration::from_secs(24 * 60 * 60);

/// Lifecycle of an engine run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    /// Opening the subscription
    Starting,
    /// Taking messages
    Running,
    /// Finishing in-flight work and writing the final flush
    Draining,
    /// Done; no further writes will happen
    Stopped,
}

impl EngineState {
    /// Label used in logs
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Draining => "draining",
            Self::Stopped => "stopped",
        }
    }
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Totals for a completed run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineReport {
    /// Messages handed to handlers
    pub messages_received: u64,
    /// Messages dropped as unparseable
    pub parse_errors: u64,
    /// Rows the warehouse accepted
    pub rows_processed: u64,
    /// Rows rejected or lost to failed writes
    pub rows_failed: u64,
    /// Flushes of any trigger
    pub flushes: u64,
}

/// Why the dispatch loop ended
#[derive(Debug, Clone, Copy)]
enum StopReason {
    Shutdown,
    EndOfStream,
}

impl StopReason {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Shutdown => "shutdown requested",
            Self::EndOfStream => "subscription ended",
        }
    }
}

/// Subscription-to-warehouse ingestion engine
pub struct IngestionEngine {
    config: PipelineConfig,
    subscriber: Arc<dyn Subscriber>,
    writer: Arc<SinkWriter>,
    metrics: Arc<EngineMetrics>,
    state: watch::Sender<EngineState>,
}

impl IngestionEngine {
    /// Create an engine; nothing runs until [`run`](Self::run)
    pub fn new(config: PipelineConfig, subscriber: Arc<dyn Subscriber>, writer: Arc<SinkWriter>) -> Self {
        let (state, _) = watch::channel(EngineState::Starting);
        Self {
            config,
            subscriber,
            writer,
            metrics: Arc::new(EngineMetrics::new()),
            state,
        }
    }

    /// Watch the engine's lifecycle
    pub fn state(&self) -> watch::Receiver<EngineState> {
        self.state.subscribe()
    }

    /// Metrics handle for the reporter
    pub fn metrics_handle(&self) -> EngineMetricsHandle {
        EngineMetricsHandle::new(Arc::clone(&self.metrics))
    }

    /// Run until `shutdown` is cancelled or the subscription ends
    ///
    /// Fails only when the subscription cannot be opened. Everything after
    /// that (bad messages, warehouse outages) is counted and survived.
    pub async fn run(self, shutdown: CancellationToken) -> Result<EngineReport> {
        let Self {
            config,
            subscriber,
            writer,
            metrics,
            state,
        } = self;

        state.send_replace(EngineState::Starting);
        let mut subscription = match subscriber.subscribe(FlowControl::from_config(&config)).await {
            Ok(subscription) => subscription,
            Err(e) => {
                tracing::error!(
                    subscription = subscriber.id(),
                    transport = subscriber.transport(),
                    error = %e,
                    "failed to open subscription"
                );
                state.send_replace(EngineState::Stopped);
                return Err(EngineError::Subscribe(e));
            }
        };

        let policy = FlushPolicy::from_config(&config);
        let (flush_tx, flush_rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared {
            buffers: Mutex::new(TableBufferSet::new(Instant::now())),
            policy,
            metrics: Arc::clone(&metrics),
            parse_log: ParseErrorLog::default(),
            flush_tx,
            flush_slots: Arc::new(Semaphore::new(config.max_pending_flushes.max(1))),
        });

        let flusher_stop = CancellationToken::new();
        let flusher = tokio::spawn(
            Flusher {
                shared: Arc::clone(&shared),
                writer: Arc::clone(&writer),
            }
            .run(flush_rx, flusher_stop.clone()),
        );

        let workers = config.effective_workers().max(1);
        state.send_replace(EngineState::Running);
        tracing::info!(
            subscription = subscriber.id(),
            transport = subscriber.transport(),
            warehouse = writer.warehouse_name(),
            dataset = writer.dataset(),
            batch_size = policy.batch_size(),
            flush_interval_ms = policy.flush_interval().as_millis() as u64,
            workers,
            "ingestion engine running"
        );

        let worker_slots = Arc::new(Semaphore::new(workers));
        let mut handlers = JoinSet::new();

        let reason = loop {
            tokio::select! {
                biased;

                _ = shutdown.cancelled() => break StopReason::Shutdown,

                Some(joined) = handlers.join_next(), if !handlers.is_empty() => {
                    log_handler_exit(joined);
                }

                message = subscription.recv() => {
                    let Some(message) = message else {
                        break StopReason::EndOfStream;
                    };
                    // Every worker may be parked on a flush slot behind a stalled write
                    let worker = tokio::select! {
                        biased;
                        _ = shutdown.cancelled() => None,
                        worker = Arc::clone(&worker_slots).acquire_owned() => worker.ok(),
                    };
                    let Some(worker) = worker else {
                        message.nack();
                        break StopReason::Shutdown;
                    };
                    let shared = Arc::clone(&shared);
                    handlers.spawn(async move {
                        shared.handle(message).await;
                        drop(worker);
                    });
                }
            }
        };

        state.send_replace(EngineState::Draining);
        tracing::info!(
            reason = reason.as_str(),
            in_flight = handlers.len(),
            "draining ingestion engine"
        );

        while let Some(joined) = handlers.join_next().await {
            log_handler_exit(joined);
        }
        subscription.cancel().await;

        shared.flush_remaining();
        flusher_stop.cancel();
        let flusher_result = flusher.await;

        state.send_replace(EngineState::Stopped);
        if let Err(e) = flusher_result {
            tracing::error!(error = %e, "flusher task failed");
            return Err(EngineError::Flusher(e.to_string()));
        }

        let snapshot = metrics.snapshot();
        let report = EngineReport {
            messages_received: snapshot.messages_received,
            parse_errors: snapshot.parse_errors,
            rows_processed: snapshot.rows_processed,
            rows_failed: snapshot.rows_failed,
            flushes: snapshot.flushes(),
        };
        tracing::info!(
            messages_received = report.messages_received,
            parse_errors = report.parse_errors,
            rows_processed = report.rows_processed,
            rows_failed = report.rows_failed,
            flushes = report.flushes,
            "ingestion engine stopped"
        );
        Ok(report)
    }
}

impl fmt::Debug for IngestionEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IngestionEngine")
            .field("subscription", &self.subscriber.id())
            .field("writer", &self.writer)
            .field("state", &*self.state.borrow())
            .finish()
    }
}

fn log_handler_exit(joined: std::result::Result<(), tokio::task::JoinError>) {
    if let Err(e) = joined {
        // The message was dropped unsettled and will be redelivered
        tracing::error!(error = %e, "message handler panicked");
    }
}

/// Flusher timer period for a flush interval
fn timer_period(flush_interval: Duration) -> Duration {
    flush_interval.clamp(MIN_TICK, MAX_TICK)
}

/// A snapshot waiting for the flusher
struct FlushJob {
    snapshot: BufferSnapshot,
    trigger: FlushTrigger,
    _slot: Option<OwnedSemaphorePermit>,
}

/// State shared by handlers and the flusher
struct Shared {
    buffers: Mutex<TableBufferSet>,
    policy: FlushPolicy,
    metrics: Arc<EngineMetrics>,
    parse_log: ParseErrorLog,
    flush_tx: mpsc::UnboundedSender<FlushJob>,
    flush_slots: Arc<Semaphore>,
}

impl Shared {
    async fn handle(&self, message: Message) {
        self.metrics.messages_received.inc();

        let record = match parse(message.data()) {
            Ok(record) => record,
            Err(e) => {
                self.metrics.parse_errors.inc();
                self.parse_log.record(message.id(), &e, message.data());
                message.ack();
                return;
            }
        };
        let row = project(&record, Utc::now());

        // Waits while max_pending_flushes snapshots are queued or writing
        let Ok(slot) = Arc::clone(&self.flush_slots).acquire_owned().await else {
            message.nack();
            return;
        };
        self.append(&record.table_name, row, slot);
        message.ack();
    }

    fn append(&self, table: &str, row: SinkRow, slot: OwnedSemaphorePermit) {
        let mut buffers = self.buffers.lock();
        let now = Instant::now();
        let total = buffers.append_at(table, row, now);

        if let Some(trigger) = self.policy.evaluate(total, buffers.since_last_flush(now)) {
            let snapshot = buffers.snapshot_and_clear(now);
            self.enqueue(snapshot, trigger, Some(slot));
        }
        self.metrics.rows_buffered.set(buffers.total_buffered() as u64);
    }

    /// Snapshot the buffers if the policy says they are due
    fn flush_if_due(&self, now: Instant) {
        let mut buffers = self.buffers.lock();
        if buffers.is_empty() {
            return;
        }
        if let Some(trigger) = self
            .policy
            .evaluate(buffers.total_buffered(), buffers.since_last_flush(now))
        {
            let snapshot = buffers.snapshot_and_clear(now);
            self.enqueue(snapshot, trigger, None);
            self.metrics.rows_buffered.set(0);
        }
    }

    /// Snapshot whatever is left, regardless of the policy
    fn flush_remaining(&self) {
        let mut buffers = self.buffers.lock();
        let snapshot = buffers.snapshot_and_clear(Instant::now());
        self.metrics.rows_buffered.set(0);
        if !snapshot.is_empty() {
            self.enqueue(snapshot, FlushTrigger::Shutdown, None);
        }
    }

    /// Queue a snapshot; callers hold the buffer lock
    fn enqueue(&self, snapshot: BufferSnapshot, trigger: FlushTrigger, slot: Option<OwnedSemaphorePermit>) {
        let rows = snapshot.total_rows();
        tracing::debug!(
            trigger = %trigger,
            rows,
            tables = snapshot.batches.len(),
            "flush queued"
        );

        let job = FlushJob {
            snapshot,
            trigger,
            _slot: slot,
        };
        if self.flush_tx.send(job).is_err() {
            self.metrics.rows_failed.add(rows as u64);
            tracing::error!(trigger = %trigger, rows, "flusher has stopped, rows dropped");
        }
    }
}

/// Single writer of snapshots to the warehouse
struct Flusher {
    shared: Arc<Shared>,
    writer: Arc<SinkWriter>,
}

impl Flusher {
    async fn run(self, mut jobs: mpsc::UnboundedReceiver<FlushJob>, stop: CancellationToken) {
        let period = timer_period(self.shared.policy.flush_interval());
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;

                _ = stop.cancelled() => break,

                job = jobs.recv() => match job {
                    Some(job) => self.write(job).await,
                    None => break,
                },

                _ = ticker.tick() => self.shared.flush_if_due(Instant::now()),
            }
        }

        jobs.close();
        while let Some(job) = jobs.recv().await {
            self.write(job).await;
        }
        tracing::debug!("flusher stopped");
    }

    async fn write(&self, job: FlushJob) {
        let FlushJob {
            snapshot,
            trigger,
            _slot,
        } = job;
        let started = Instant::now();
        let metrics = &self.shared.metrics;

        let mut written = 0;
        let mut failed = 0;
        for batch in &snapshot.batches {
            match self.writer.write_batch(&batch.table, &batch.rows).await {
                Ok(outcome) => {
                    written += outcome.written;
                    failed += outcome.failed();
                }
                Err(e) => {
                    metrics.flush_failures.inc();
                    failed += batch.rows.len();
                    tracing::error!(
                        table = %batch.table,
                        rows = batch.rows.len(),
                        trigger = %trigger,
                        error = %e,
                        "table write failed, rows dropped"
                    );
                }
            }
        }

        metrics.record_flush(trigger, written, failed);
        tracing::info!(
            trigger = %trigger,
            tables = snapshot.batches.len(),
            written,
            failed,
            total_processed = metrics.rows_processed.get(),
            duration_ms = started.elapsed().as_millis() as u64,
            "flush complete"
        );
    }
}
