//! Delivered messages and acknowledgment
//!
//! A [`Message`] owns a settle-once [`AckHandle`]. `ack()` and `nack()`
//! consume the message, so a message cannot be settled twice. A message
//! that is dropped unsettled is negatively acknowledged and will be
//! redelivered by the bus.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use chrono::{DateTime, Utc};

use crate::flow::FlowPermit;

/// Transport-side settlement of a message
///
/// Implementations must not block: they typically enqueue the id for a
/// background task that talks to the bus.
pub trait Acknowledger: Send + Sync + 'static {
    /// Confirm processing; the bus must not redeliver
    fn ack(&self, ack_id: &str);

    /// Reject; the bus should redeliver
    fn nack(&self, ack_id: &str);
}

/// Settle-once handle tying a message to its transport and flow permit
pub struct AckHandle {
    ack_id: String,
    acker: Arc<dyn Acknowledger>,
    permit: FlowPermit,
    settled: bool,
}

impl AckHandle {
    /// Create a handle for a delivered message
    pub fn new(ack_id: impl Into<String>, acker: Arc<dyn Acknowledger>, permit: FlowPermit) -> Self {
        Self {
            ack_id: ack_id.into(),
            acker,
            permit,
            settled: false,
        }
    }

    fn ack(mut self) {
        self.settled = true;
        self.acker.ack(&self.ack_id);
        self.permit.metrics().acked.inc();
    }

    fn nack(mut self) {
        self.settled = true;
        self.acker.nack(&self.ack_id);
        self.permit.metrics().nacked.inc();
    }
}

impl Drop for AckHandle {
    fn drop(&mut self) {
        if !self.settled {
            self.acker.nack(&self.ack_id);
            self.permit.metrics().nacked.inc();
        }
    }
}

impl fmt::Debug for AckHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AckHandle")
            .field("ack_id", &self.ack_id)
            .field("settled", &self.settled)
            .finish()
    }
}

/// One message delivered by a subscription
#[derive(Debug)]
pub struct Message {
    id: String,
    data: Bytes,
    publish_time: Option<DateTime<Utc>>,
    delivery_attempt: Option<u32>,
    attributes: HashMap<String, String>,
    ack: AckHandle,
}

impl Message {
    /// Create a message with just an id and payload
    pub fn new(id: impl Into<String>, data: impl Into<Bytes>, ack: AckHandle) -> Self {
        Self {
            id: id.into(),
            data: data.into(),
            publish_time: None,
            delivery_attempt: None,
            attributes: HashMap::new(),
            ack,
        }
    }

    /// Set the bus publish time
    pub fn with_publish_time(mut self, publish_time: Option<DateTime<Utc>>) -> Self {
        self.publish_time = publish_time;
        self
    }

    /// Set the delivery attempt (only reported with dead-lettering enabled)
    pub fn with_delivery_attempt(mut self, attempt: Option<u32>) -> Self {
        self.delivery_attempt = attempt;
        self
    }

    /// Set the message attributes
    pub fn with_attributes(mut self, attributes: HashMap<String, String>) -> Self {
        self.attributes = attributes;
        self
    }

    /// Bus-assigned message id
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Message body
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// When the bus accepted the message
    pub fn publish_time(&self) -> Option<DateTime<Utc>> {
        self.publish_time
    }

    /// How many times the bus has delivered this message
    pub fn delivery_attempt(&self) -> Option<u32> {
        self.delivery_attempt
    }

    /// Attribute value by key
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }

    /// Acknowledge: processing is complete and the bus must not redeliver
    pub fn ack(self) {
        self.ack.ack();
    }

    /// Negatively acknowledge: the bus should redeliver
    pub fn nack(self) {
        self.ack.nack();
    }
}
