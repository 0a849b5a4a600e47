//! Pub/Sub REST v1 calls used by the pull subscriber

use std::collections::HashMap;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use cdcflow_config::PubSubConfig;
use serde::{Deserialize, Serialize};

use crate::error::{BusError, Result};

const MAX_ERROR_BODY: usize = 512;

/// Thin client for one subscription
#[derive(Debug)]
pub(crate) struct PubSubApi {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
    path: String,
}

impl PubSubApi {
    pub(crate) fn new(config: &PubSubConfig, project_id: &str, subscription_id: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;

        Ok(Self {
            client,
            base_url: config.endpoint.trim_end_matches('/').to_string(),
            token: config.access_token.clone(),
            path: format!("projects/{project_id}/subscriptions/{subscription_id}"),
        })
    }

    /// Fully-qualified subscription name
    pub(crate) fn path(&self) -> &str {
        &self.path
    }

    pub(crate) async fn get_subscription(&self) -> Result<SubscriptionInfo> {
        let url = format!("{}/v1/{}", self.base_url, self.path);
        let mut request = self.client.get(url);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        let response = check("get", request.send().await?).await?;
        Ok(response.json().await?)
    }

    pub(crate) async fn pull(&self, max_messages: usize) -> Result<Vec<ReceivedMessage>> {
        let body = PullRequest { max_messages };
        let response = self.post("pull", &body).await?;
        let pulled: PullResponse = response.json().await?;
        Ok(pulled.received_messages)
    }

    pub(crate) async fn acknowledge(&self, ack_ids: &[String]) -> Result<()> {
        self.post("acknowledge", &AcknowledgeRequest { ack_ids }).await?;
        Ok(())
    }

    pub(crate) async fn modify_ack_deadline(&self, ack_ids: &[String], seconds: u32) -> Result<()> {
        let body = ModifyAckDeadlineRequest {
            ack_ids,
            ack_deadline_seconds: seconds,
        };
        self.post("modifyAckDeadline", &body).await?;
        Ok(())
    }

    async fn post<T: Serialize>(&self, operation: &'static str, body: &T) -> Result<reqwest::Response> {
        let url = format!("{}/v1/{}:{}", self.base_url, self.path, operation);
        let mut request = self.client.post(url).json(body);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        check(operation, request.send().await?).await
    }
}

async fn check(operation: &'static str, response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let mut body = response.text().await.unwrap_or_default();
    if body.len() > MAX_ERROR_BODY {
        let mut end = MAX_ERROR_BODY;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        body.truncate(end);
    }
    Err(BusError::Status {
        operation,
        status: status.as_u16(),
        body,
    })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SubscriptionInfo {
    #[serde(default)]
    pub(crate) name: String,
    #[serde(default)]
    pub(crate) ack_deadline_seconds: Option<u32>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PullRequest {
    max_messages: usize,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PullResponse {
    #[serde(default)]
    received_messages: Vec<ReceivedMessage>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ReceivedMessage {
    pub(crate) ack_id: String,
    #[serde(default)]
    pub(crate) message: PubsubMessage,
    #[serde(default)]
    pub(crate) delivery_attempt: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct PubsubMessage {
    #[serde(default)]
    pub(crate) data: String,
    #[serde(default)]
    pub(crate) message_id: String,
    #[serde(default)]
    pub(crate) publish_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub(crate) attributes: HashMap<String, String>,
}

impl PubsubMessage {
    /// Decoded payload; bodies that are not valid base64 are passed through
    pub(crate) fn payload(&self) -> Bytes {
        match STANDARD.decode(self.data.as_bytes()) {
            Ok(decoded) => Bytes::from(decoded),
            Err(_) => Bytes::copy_from_slice(self.data.as_bytes()),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AcknowledgeRequest<'a> {
    ack_ids: &'a [String],
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ModifyAckDeadlineRequest<'a> {
    ack_ids: &'a [String],
    ack_deadline_seconds: u32,
}
