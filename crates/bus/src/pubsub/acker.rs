//! Batched acknowledgment task
//!
//! Ack and nack calls from message handles are queued on an unbounded
//! channel and forwarded to the bus in batches every flush interval, or
//! sooner when a batch reaches the API limit. Nacks are sent as an ack
//! deadline of zero so the bus redelivers immediately.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::api::PubSubApi;
use crate::message::Acknowledger;
use crate::metrics::BusMetrics;

/// Largest id list accepted by a single acknowledge call
pub(crate) const MAX_ACK_IDS_PER_REQUEST: usize = 1000;

#[derive(Debug)]
enum Settlement {
    Ack(String),
    Nack(String),
}

/// Sending half handed to every message
#[derive(Debug, Clone)]
pub(crate) struct ChannelAcknowledger {
    tx: mpsc::UnboundedSender<Settlement>,
}

impl Acknowledger for ChannelAcknowledger {
    fn ack(&self, ack_id: &str) {
        // A closed channel means the subscription is gone; the bus redelivers
        let _ = self.tx.send(Settlement::Ack(ack_id.to_string()));
    }

    fn nack(&self, ack_id: &str) {
        let _ = self.tx.send(Settlement::Nack(ack_id.to_string()));
    }
}

pub(crate) fn channel() -> (ChannelAcknowledger, AckQueue) {
    let (tx, rx) = mpsc::unbounded_channel();
    (ChannelAcknowledger { tx }, AckQueue { rx })
}

/// Receiving half, consumed by [`run`]
#[derive(Debug)]
pub(crate) struct AckQueue {
    rx: mpsc::UnboundedReceiver<Settlement>,
}

#[derive(Debug, Default)]
struct Pending {
    acks: Vec<String>,
    nacks: Vec<String>,
}

impl Pending {
    fn push(&mut self, settlement: Settlement) {
        match settlement {
            Settlement::Ack(id) => self.acks.push(id),
            Settlement::Nack(id) => self.nacks.push(id),
        }
    }

    fn is_full(&self) -> bool {
        self.acks.len() >= MAX_ACK_IDS_PER_REQUEST || self.nacks.len() >= MAX_ACK_IDS_PER_REQUEST
    }

    async fn flush(&mut self, api: &PubSubApi, metrics: &BusMetrics) {
        for chunk in self.acks.chunks(MAX_ACK_IDS_PER_REQUEST) {
            if let Err(e) = api.acknowledge(chunk).await {
                metrics.errors.inc();
                warn!(subscription = api.path(), count = chunk.len(), error = %e, "acknowledge failed, messages will be redelivered");
            }
        }
        for chunk in self.nacks.chunks(MAX_ACK_IDS_PER_REQUEST) {
            if let Err(e) = api.modify_ack_deadline(chunk, 0).await {
                metrics.errors.inc();
                warn!(subscription = api.path(), count = chunk.len(), error = %e, "nack failed, messages redeliver after lease expiry");
            }
        }
        self.acks.clear();
        self.nacks.clear();
    }
}

/// Forward settlements until cancelled, then flush whatever is queued
pub(crate) async fn run(
    api: Arc<PubSubApi>,
    mut queue: AckQueue,
    flush_interval: Duration,
    metrics: Arc<BusMetrics>,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(flush_interval.max(Duration::from_millis(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut pending = Pending::default();

    loop {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => break,

            settlement = queue.rx.recv() => {
                let Some(settlement) = settlement else { break };
                pending.push(settlement);
                if pending.is_full() {
                    pending.flush(&api, &metrics).await;
                }
            }

            _ = ticker.tick() => {
                pending.flush(&api, &metrics).await;
            }
        }
    }

    queue.rx.close();
    while let Ok(settlement) = queue.rx.try_recv() {
        pending.push(settlement);
    }
    debug!(
        subscription = api.path(),
        acks = pending.acks.len(),
        nacks = pending.nacks.len(),
        "flushing final acknowledgments"
    );
    pending.flush(&api, &metrics).await;
}
