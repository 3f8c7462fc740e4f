//! Relay producer: publish events to a Pub/Sub topic over the REST API.

use crate::channels::MessageEvent;
use crate::config::GOOGLE_PUBSUB_API_BASE;
use crate::relay::token::TokenSource;
use crate::relay::wire::RelayMessage;
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum EnqueueError {
    #[error("encoding event: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("publish request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("publish rejected with http {status}: {body}")]
    Api { status: u16, body: String },
    #[error("publish response carried no message id")]
    NoMessageId,
    #[error("access token request rejected with http {status}: {body}")]
    Token { status: u16, body: String },
}

/// A named topic accepting opaque payloads.
#[async_trait]
pub trait EventQueue: Send + Sync {
    /// Publish one payload; returns the provider-assigned message id.
    async fn publish(&self, payload: Vec<u8>) -> Result<String, EnqueueError>;
}

/// Serialize the event and publish it. The returned id is logged by callers.
pub async fn enqueue(queue: &dyn EventQueue, event: &MessageEvent) -> Result<String, EnqueueError> {
    let payload = RelayMessage::encode(event)?;
    queue.publish(payload).await
}

#[derive(Debug, Serialize)]
struct PublishRequest {
    messages: Vec<PublishMessage>,
}

#[derive(Debug, Serialize)]
struct PublishMessage {
    data: String,
}

#[derive(Debug, Deserialize)]
struct PublishResponse {
    #[serde(rename = "messageIds", default)]
    message_ids: Vec<String>,
}

/// Google Cloud Pub/Sub topic publisher (`topics.publish`).
#[derive(Clone)]
pub struct PubSubPublisher {
    api_base: String,
    project_id: String,
    topic: String,
    token: TokenSource,
    client: reqwest::Client,
}

impl std::fmt::Debug for PubSubPublisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PubSubPublisher")
            .field("api_base", &self.api_base)
            .field("project_id", &self.project_id)
            .field("topic", &self.topic)
            .finish_non_exhaustive()
    }
}

impl PubSubPublisher {
    pub fn new(
        project_id: impl Into<String>,
        topic: impl Into<String>,
        api_base: Option<String>,
        token: TokenSource,
        timeout: Duration,
    ) -> Self {
        let api_base = api_base
            .map(|u| u.trim_end_matches('/').to_string())
            .unwrap_or_else(|| GOOGLE_PUBSUB_API_BASE.to_string());
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        Self {
            api_base,
            project_id: project_id.into(),
            topic: topic.into(),
            token,
            client,
        }
    }

    /// Fully qualified topic name.
    pub fn topic_path(&self) -> String {
        format!("projects/{}/topics/{}", self.project_id, self.topic)
    }
}

#[async_trait]
impl EventQueue for PubSubPublisher {
    async fn publish(&self, payload: Vec<u8>) -> Result<String, EnqueueError> {
        let url = format!("{}/v1/{}:publish", self.api_base, self.topic_path());
        let body = PublishRequest {
            messages: vec![PublishMessage {
                data: STANDARD.encode(payload),
            }],
        };
        let mut req = self.client.post(&url).json(&body);
        if let Some(token) = self.token.token().await? {
            req = req.bearer_auth(token);
        }
        let res = req.send().await?;
        if !res.status().is_success() {
            let status = res.status().as_u16();
            let body = res.text().await.unwrap_or_default();
            return Err(EnqueueError::Api { status, body });
        }
        let data: PublishResponse = res.json().await?;
        data.message_ids
            .into_iter()
            .next()
            .ok_or(EnqueueError::NoMessageId)
    }
}
