//! In-process bus
//!
//! A [`MemoryPublisher`] feeds a [`MemorySubscriber`] through a channel.
//! Settlements are recorded in an [`AckLog`] so callers can assert on
//! exactly which messages were acknowledged. Dropping every publisher
//! ends the stream once the queued messages are delivered.
//!
//! # Example
//!
//! ```ignore
//! let (publisher, subscriber) = memory::channel("orders");
//! publisher.publish(r#"{"op":"c","after":{"id":1}}"#);
//! drop(publisher);
//! let mut subscription = subscriber.subscribe(FlowControl::default()).await?;
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::{BusError, Result};
use crate::flow::{FlowControl, FlowController};
use crate::message::{AckHandle, Acknowledger, Message};
use crate::metrics::{BusMetrics, BusMetricsHandle};
use crate::subscriber::{Subscriber, Subscription, Worker};

/// Create a connected publisher/subscriber pair
pub fn channel(id: impl Into<String>) -> (MemoryPublisher, MemorySubscriber) {
    let (tx, rx) = mpsc::unbounded_channel();
    let publisher = MemoryPublisher {
        tx,
        next_id: Arc::new(AtomicU64::new(1)),
    };
    let subscriber = MemorySubscriber {
        id: id.into(),
        incoming: Mutex::new(Some(rx)),
        failure: None,
        log: Arc::new(AckLog::default()),
        metrics: Arc::new(BusMetrics::new()),
    };
    (publisher, subscriber)
}

/// Publishing half of an in-process bus
#[derive(Debug, Clone)]
pub struct MemoryPublisher {
    tx: mpsc::UnboundedSender<(String, Bytes)>,
    next_id: Arc<AtomicU64>,
}

impl MemoryPublisher {
    /// Queue a message body; returns its id, or `None` if the subscriber is gone
    pub fn publish(&self, data: impl Into<Bytes>) -> Option<String> {
        let id = format!("mem-{}", self.next_id.fetch_add(1, Ordering::Relaxed));
        self.tx.send((id.clone(), data.into())).ok()?;
        Some(id)
    }
}

/// Record of every settlement, in order
#[derive(Debug, Default)]
pub struct AckLog {
    acked: Mutex<Vec<String>>,
    nacked: Mutex<Vec<String>>,
}

impl AckLog {
    /// Ids acknowledged so far
    pub fn acked(&self) -> Vec<String> {
        self.acked.lock().clone()
    }

    /// Ids negatively acknowledged so far
    pub fn nacked(&self) -> Vec<String> {
        self.nacked.lock().clone()
    }
}

impl Acknowledger for AckLog {
    fn ack(&self, ack_id: &str) {
        self.acked.lock().push(ack_id.to_string());
    }

    fn nack(&self, ack_id: &str) {
        self.nacked.lock().push(ack_id.to_string());
    }
}

/// Subscribing half of an in-process bus; can be subscribed once
#[derive(Debug)]
pub struct MemorySubscriber {
    id: String,
    incoming: Mutex<Option<mpsc::UnboundedReceiver<(String, Bytes)>>>,
    failure: Option<String>,
    log: Arc<AckLog>,
    metrics: Arc<BusMetrics>,
}

impl MemorySubscriber {
    /// A subscriber whose `subscribe` always fails with `reason`
    pub fn failing(id: impl Into<String>, reason: impl Into<String>) -> Self {
        let (_, mut subscriber) = channel(id);
        subscriber.failure = Some(reason.into());
        subscriber
    }

    /// Settlement log shared with every delivered message
    pub fn ack_log(&self) -> Arc<AckLog> {
        Arc::clone(&self.log)
    }
}

#[async_trait]
impl Subscriber for MemorySubscriber {
    fn transport(&self) -> &'static str {
        "memory"
    }

    fn id(&self) -> &str {
        &self.id
    }

    fn metrics_handle(&self) -> BusMetricsHandle {
        BusMetricsHandle::new(&self.id, self.transport(), Arc::clone(&self.metrics))
    }

    async fn subscribe(&self, flow: FlowControl) -> Result<Subscription> {
        if let Some(reason) = &self.failure {
            self.metrics.errors.inc();
            return Err(BusError::unavailable(&self.id, reason.clone()));
        }
        let incoming = self
            .incoming
            .lock()
            .take()
            .ok_or_else(|| BusError::AlreadySubscribed(self.id.clone()))?;

        let controller = FlowController::new(&flow, Arc::clone(&self.metrics));
        let (tx, rx) = mpsc::channel(64);
        let cancel = CancellationToken::new();
        let acker: Arc<dyn Acknowledger> = self.log.clone();

        let task = tokio::spawn(forward(
            incoming,
            controller.clone(),
            acker,
            tx,
            Arc::clone(&self.metrics),
            cancel.clone(),
        ));

        Ok(Subscription::new(&self.id, rx, controller).with_producer(Worker::new(cancel, task)))
    }
}

async fn forward(
    mut incoming: mpsc::UnboundedReceiver<(String, Bytes)>,
    flow: FlowController,
    acker: Arc<dyn Acknowledger>,
    tx: mpsc::Sender<Message>,
    metrics: Arc<BusMetrics>,
    cancel: CancellationToken,
) {
    loop {
        let next = tokio::select! {
            _ = cancel.cancelled() => break,
            next = incoming.recv() => next,
        };
        let Some((id, data)) = next else { break };

        let permit = tokio::select! {
            _ = cancel.cancelled() => break,
            permit = flow.acquire() => permit,
        };
        let Some(permit) = permit else { break };

        let message = Message::new(id.clone(), data, AckHandle::new(id, Arc::clone(&acker), permit));
        metrics.received.inc();
        if tx.send(message).await.is_err() {
            break;
        }
    }
}
