//! Cdcflow Bus - change-event subscriptions
//!
//! A [`Subscriber`] connects to one subscription and yields [`Message`]s
//! under a flow-control window ([`FlowControl`]). Each message is settled
//! exactly once with `ack()` or `nack()`; dropping an unsettled message
//! nacks it.
//!
//! # Transports
//!
//! - [`PubSubSubscriber`]: Google Pub/Sub REST pull (or the emulator)
//! - [`FileSubscriber`]: JSON-lines replay
//! - [`memory`]: in-process channel with a settlement log
//!
//! # Example
//!
//! ```ignore
//! let subscriber = cdcflow_bus::from_config(&config.pipeline, &config.bus)?;
//! let mut subscription = subscriber.subscribe(FlowControl::from_config(&config.pipeline)).await?;
//! while let Some(message) = subscription.recv().await {
//!     handle(message.data());
//!     message.ack();
//! }
//! subscription.cancel().await;
//! ```

mod backoff;
mod error;
mod file;
mod flow;
mod message;
mod metrics;
mod pubsub;
mod subscriber;

pub mod memory;

use std::sync::Arc;

use cdcflow_config::{BusConfig, PipelineConfig};

pub use error::{BusError, Result};
pub use file::FileSubscriber;
pub use flow::{FlowControl, FlowController, FlowPermit};
pub use message::{AckHandle, Acknowledger, Message};
pub use metrics::{BusMetrics, BusMetricsHandle};
pub use pubsub::PubSubSubscriber;
pub use subscriber::{Subscriber, Subscription};

/// Build the subscriber described by the configuration
pub fn from_config(pipeline: &PipelineConfig, bus: &BusConfig) -> Result<Arc<dyn Subscriber>> {
    Ok(match bus {
        BusConfig::Pubsub(pubsub) => Arc::new(PubSubSubscriber::new(
            pubsub,
            &pipeline.project_id,
            &pipeline.subscription_id,
        )?),
        BusConfig::File(file) => Arc::new(FileSubscriber::from_config(file)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use cdcflow_config::FileBusConfig;

    #[test]
    fn test_from_config_selects_transport() {
        let pipeline = PipelineConfig::default();

        let pubsub = from_config(&pipeline, &BusConfig::default()).unwrap();
        assert_eq!(pubsub.transport(), "pubsub");
        assert_eq!(pubsub.id(), "projects/local-dev/subscriptions/cdc-events-sub");

        let file = BusConfig::File(FileBusConfig {
            path: "changes.jsonl".to_string(),
        });
        let replay = from_config(&pipeline, &file).unwrap();
        assert_eq!(replay.transport(), "file");
        assert_eq!(replay.id(), "changes.jsonl");
    }
}
