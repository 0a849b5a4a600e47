//! Subscriber trait and active subscriptions

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::Result;
use crate::flow::{FlowControl, FlowController};
use crate::message::Message;
use crate::metrics::BusMetricsHandle;

/// A source of change-event messages
///
/// Implementations connect to one subscription. `subscribe` fails fast
/// when the subscription is missing or unreachable so the caller can
/// abort startup.
#[async_trait]
pub trait Subscriber: Send + Sync {
    /// Transport name ("pubsub", "file", "memory")
    fn transport(&self) -> &'static str;

    /// Subscription identifier used in logs and metrics
    fn id(&self) -> &str;

    /// Metrics handle for the reporter
    fn metrics_handle(&self) -> BusMetricsHandle;

    /// Start delivery
    async fn subscribe(&self, flow: FlowControl) -> Result<Subscription>;
}

/// Background task owned by a subscription
#[derive(Debug)]
pub(crate) struct Worker {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl Worker {
    pub(crate) fn new(cancel: CancellationToken, handle: JoinHandle<()>) -> Self {
        Self { cancel, handle }
    }

    async fn stop(self, name: &str) {
        self.cancel.cancel();
        if let Err(e) = self.handle.await {
            warn!(worker = name, error = %e, "subscription worker panicked");
        }
    }
}

/// An active subscription delivering messages until cancelled
///
/// Messages arrive on an internal channel filled by a producer task
/// (the pull loop for remote transports). Settlement is forwarded to an
/// optional acker task that batches calls to the bus.
#[derive(Debug)]
pub struct Subscription {
    id: String,
    receiver: mpsc::Receiver<Message>,
    flow: FlowController,
    producer: Option<Worker>,
    acker: Option<Worker>,
}

impl Subscription {
    pub(crate) fn new(id: impl Into<String>, receiver: mpsc::Receiver<Message>, flow: FlowController) -> Self {
        Self {
            id: id.into(),
            receiver,
            flow,
            producer: None,
            acker: None,
        }
    }

    pub(crate) fn with_producer(mut self, worker: Worker) -> Self {
        self.producer = Some(worker);
        self
    }

    pub(crate) fn with_acker(mut self, worker: Worker) -> Self {
        self.acker = Some(worker);
        self
    }

    /// Next message; `None` once the stream has ended
    pub async fn recv(&mut self) -> Option<Message> {
        self.receiver.recv().await
    }

    /// Messages delivered but not yet settled
    pub fn outstanding(&self) -> usize {
        self.flow.outstanding()
    }

    /// Stop delivery and flush pending acknowledgments
    ///
    /// Messages already pulled but not yet handed out are negatively
    /// acknowledged so the bus redelivers them. Returns once every
    /// settlement issued before the call has been forwarded to the bus.
    pub async fn cancel(mut self) {
        if let Some(producer) = &self.producer {
            producer.cancel.cancel();
        }
        self.receiver.close();

        let mut undelivered = 0usize;
        while let Ok(message) = self.receiver.try_recv() {
            message.nack();
            undelivered += 1;
        }

        if let Some(producer) = self.producer.take() {
            producer.stop("producer").await;
        }
        // The producer may have queued more before it observed the cancel
        while let Ok(message) = self.receiver.try_recv() {
            message.nack();
            undelivered += 1;
        }
        self.flow.close();

        if let Some(acker) = self.acker.take() {
            acker.stop("acker").await;
        }

        debug!(
            subscription = %self.id,
            undelivered,
            outstanding = self.flow.outstanding(),
            "subscription cancelled"
        );
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        for worker in [&self.producer, &self.acker].into_iter().flatten() {
            worker.cancel.cancel();
        }
    }
}
