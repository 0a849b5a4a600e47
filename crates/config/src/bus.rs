//! Message bus configuration
//!
//! Transport settings for the change-event subscription. The subscription
//! identity and flow-control window live in [`crate::PipelineConfig`]; this
//! section only describes how to reach the bus.

use serde::Deserialize;
use std::time::Duration;

/// Public Pub/Sub REST endpoint
pub const DEFAULT_PUBSUB_ENDPOINT: &str = "https://pubsub.googleapis.com";

/// Bus transport configuration
///
/// # Example
///
/// ```toml
/// [bus]
/// type = "pubsub"
/// endpoint = "http://localhost:8085"
/// max_messages_per_pull = 200
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BusConfig {
    /// Google Pub/Sub over its REST pull API
    Pubsub(PubSubConfig),

    /// Replay a JSON-lines file, one message body per line
    File(FileBusConfig),
}

impl Default for BusConfig {
    fn default() -> Self {
        Self::Pubsub(PubSubConfig::default())
    }
}

impl BusConfig {
    /// Transport name used in logs
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Pubsub(_) => "pubsub",
            Self::File(_) => "file",
        }
    }
}

/// Pub/Sub pull transport
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PubSubConfig {
    /// REST endpoint (set to the emulator address for local runs)
    /// Default: https://pubsub.googleapis.com
    pub endpoint: String,

    /// OAuth bearer token; omitted for the emulator
    pub access_token: Option<String>,

    /// Upper bound on messages requested per pull
    /// Default: 100
    pub max_messages_per_pull: usize,

    /// Timeout for a single REST call (pull is long-polled)
    /// Default: 90s
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,

    /// How long acknowledgments are batched before being sent
    /// Default: 100ms
    #[serde(with = "humantime_serde")]
    pub ack_flush_interval: Duration,
}

impl Default for PubSubConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_PUBSUB_ENDPOINT.to_string(),
            access_token: None,
            max_messages_per_pull: 100,
            request_timeout: Duration::from_secs(90),
            ack_flush_interval: Duration::from_millis(100),
        }
    }
}

/// File replay transport
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FileBusConfig {
    /// Path to a JSON-lines file
    pub path: String,
}
