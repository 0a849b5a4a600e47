//! Google Pub/Sub pull subscriber
//!
//! Talks to the Pub/Sub REST API (or the emulator when `endpoint` points
//! at it). A pull task requests as many messages as the flow-control
//! window has room for, extends their lease to the configured ack
//! deadline and hands them to the consumer. A second task batches
//! acknowledgments.
//!
//! # Example
//!
//! ```ignore
//! let subscriber = PubSubSubscriber::new(&pubsub_config, "my-project", "cdc-events-sub")?;
//! let mut subscription = subscriber.subscribe(FlowControl::default()).await?;
//! while let Some(message) = subscription.recv().await {
//!     message.ack();
//! }
//! ```

mod acker;
mod api;


use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use cdcflow_config::PubSubConfig;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use self::acker::ChannelAcknowledger;
use self::api::{PubSubApi, ReceivedMessage};
use crate::backoff::Backoff;
use crate::error::{BusError, Result};
use crate::flow::{FlowControl, FlowController, FlowPermit};
use crate::message::{AckHandle, Acknowledger, Message};
use crate::metrics::{BusMetrics, BusMetricsHandle};
use crate::subscriber::{Subscriber, Subscription, Worker};

/// Pause between pulls that returned nothing
const IDLE_DELAY: Duration = Duration::from_millis(250);

/// Pull subscriber for one Pub/Sub subscription
#[derive(Debug)]
pub struct PubSubSubscriber {
    api: Arc<PubSubApi>,
    max_messages_per_pull: usize,
    ack_flush_interval: Duration,
    metrics: Arc<BusMetrics>,
}

impl PubSubSubscriber {
    /// Create a subscriber; no network traffic happens until `subscribe`
    pub fn new(config: &PubSubConfig, project_id: &str, subscription_id: &str) -> Result<Self> {
        Ok(Self {
            api: Arc::new(PubSubApi::new(config, project_id, subscription_id)?),
            max_messages_per_pull: config.max_messages_per_pull.max(1),
            ack_flush_interval: config.ack_flush_interval,
            metrics: Arc::new(BusMetrics::new()),
        })
    }
}

#[async_trait]
impl Subscriber for PubSubSubscriber {
    fn transport(&self) -> &'static str {
        "pubsub"
    }

    fn id(&self) -> &str {
        self.api.path()
    }

    fn metrics_handle(&self) -> BusMetricsHandle {
        BusMetricsHandle::new(self.api.path(), self.transport(), Arc::clone(&self.metrics))
    }

    async fn subscribe(&self, flow: FlowControl) -> Result<Subscription> {
        let info = self.api.get_subscription().await.map_err(|e| {
            self.metrics.errors.inc();
            BusError::unavailable(self.api.path(), e.to_string())
        })?;

        let lease_secs = u32::try_from(flow.ack_deadline.as_secs()).unwrap_or(u32::MAX);
        info!(
            subscription = %self.api.path(),
            name = %info.name,
            subscription_ack_deadline = ?info.ack_deadline_seconds,
            lease_secs,
            max_outstanding = flow.max_outstanding_messages,
            "subscribed"
        );

        let controller = FlowController::new(&flow, Arc::clone(&self.metrics));
        let (tx, rx) = mpsc::channel(self.max_messages_per_pull);

        let (acknowledger, queue) = acker::channel();
        let ack_cancel = CancellationToken::new();
        let ack_task = tokio::spawn(acker::run(
            Arc::clone(&self.api),
            queue,
            self.ack_flush_interval,
            Arc::clone(&self.metrics),
            ack_cancel.clone(),
        ));

        let pull_cancel = CancellationToken::new();
        let pull = PullLoop {
            api: Arc::clone(&self.api),
            flow: controller.clone(),
            acknowledger: Arc::new(acknowledger),
            tx,
            metrics: Arc::clone(&self.metrics),
            max_messages: self.max_messages_per_pull,
            lease_secs,
        };
        let pull_task = tokio::spawn(pull.run(pull_cancel.clone()));

        Ok(Subscription::new(self.api.path(), rx, controller)
            .with_producer(Worker::new(pull_cancel, pull_task))
            .with_acker(Worker::new(ack_cancel, ack_task)))
    }
}

/// Sleep for `delay`; true if cancelled first
async fn cancelled_during(cancel: &CancellationToken, delay: Duration) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => true,
        _ = tokio::time::sleep(delay) => false,
    }
}

struct PullLoop {
    api: Arc<PubSubApi>,
    flow: FlowController,
    acknowledger: Arc<ChannelAcknowledger>,
    tx: mpsc::Sender<Message>,
    metrics: Arc<BusMetrics>,
    max_messages: usize,
    lease_secs: u32,
}

impl PullLoop {
    async fn run(self, cancel: CancellationToken) {
        let mut backoff = Backoff::default();

        loop {
            let permits = tokio::select! {
                _ = cancel.cancelled() => break,
                permits = self.flow.acquire_up_to(self.max_messages) => permits,
            };
            if permits.is_empty() {
                break;
            }

            let pulled = tokio::select! {
                _ = cancel.cancelled() => break,
                pulled = self.api.pull(permits.len()) => pulled,
            };

            let received = match pulled {
                Ok(received) => {
                    backoff.reset();
                    received
                }
                Err(e) => {
                    self.metrics.errors.inc();
                    let delay = backoff.next_delay();
                    warn!(
                        subscription = %self.api.path(),
                        error = %e,
                        retry_in_ms = delay.as_millis() as u64,
                        "pull failed"
                    );
                    drop(permits);
                    if cancelled_during(&cancel, delay).await {
                        break;
                    }
                    continue;
                }
            };

            if received.is_empty() {
                drop(permits);
                if cancelled_during(&cancel, IDLE_DELAY).await {
                    break;
                }
                continue;
            }

            self.extend_lease(&received).await;
            if !self.deliver(received, permits).await {
                break;
            }
        }

        debug!(subscription = %self.api.path(), "pull loop stopped");
    }

    async fn extend_lease(&self, received: &[ReceivedMessage]) {
        let ids: Vec<String> = received.iter().map(|r| r.ack_id.clone()).collect();
        if let Err(e) = self.api.modify_ack_deadline(&ids, self.lease_secs).await {
            self.metrics.errors.inc();
            warn!(subscription = %self.api.path(), error = %e, "failed to extend message lease");
        }
    }

    /// Returns false once the consumer has gone away
    async fn deliver(&self, received: Vec<ReceivedMessage>, permits: Vec<FlowPermit>) -> bool {
        let mut permits = permits.into_iter();
        for received in received {
            let Some(permit) = permits.next() else {
                // More than requested; hand back for redelivery
                self.acknowledger.nack(&received.ack_id);
                continue;
            };

            let acker: Arc<dyn Acknowledger> = self.acknowledger.clone();
            let payload = received.message.payload();
            let message = Message::new(
                received.message.message_id,
                payload,
                AckHandle::new(received.ack_id, acker, permit),
            )
            .with_publish_time(received.message.publish_time)
            .with_delivery_attempt(received.delivery_attempt)
            .with_attributes(received.message.attributes);

            self.metrics.received.inc();
            // A closed receiver drops the message, which nacks it
            if self.tx.send(message).await.is_err() {
                return false;
            }
        }
        true
    }
}
