//! Stage-to-stage messaging.
//!
//! Stages exchange nothing but `{doc_id}`. Delivery into this stage is a
//! push: the queue POSTs either the bare message or a push envelope whose
//! `message.data` is the base64-encoded JSON message.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::PipelineError;
use crate::types::StageMessage;

/// Topic the ingest stage publishes to.
pub const TOPIC_INGEST: &str = "ingest";
/// Topic this stage publishes to after persisting a result.
pub const TOPIC_ANALYZED: &str = "analyzed";
/// Topic the summarizer publishes to.
pub const TOPIC_SUMMARIZED: &str = "summarized";

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PublishError {
    #[error("no endpoint configured for topic '{0}'")]
    UnknownTopic(String),
    #[error("publish request failed: {0}")]
    Request(String),
    #[error("push endpoint returned HTTP {0}")]
    Http(u16),
    #[error("queue unavailable: {0}")]
    Unavailable(String),
}

/// Publishes stage messages to named topics.
#[async_trait]
pub trait MessagePublisher: Send + Sync {
    async fn publish(&self, topic: &str, message: &StageMessage) -> Result<(), PublishError>;
}

/// Per-topic FIFO for single-process deployments and tests.
#[derive(Default)]
pub struct InMemoryQueue {
    topics: Mutex<HashMap<String, VecDeque<StageMessage>>>,
}

impl InMemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove and return everything queued on `topic`, oldest first.
    pub fn drain(&self, topic: &str) -> Vec<StageMessage> {
        let mut guard = self
            .topics
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        guard
            .get_mut(topic)
            .map(|queue| queue.drain(..).collect())
            .unwrap_or_default()
    }

    pub fn len(&self, topic: &str) -> usize {
        let guard = self
            .topics
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        guard.get(topic).map_or(0, VecDeque::len)
    }
}

#[async_trait]
impl MessagePublisher for InMemoryQueue {
    async fn publish(&self, topic: &str, message: &StageMessage) -> Result<(), PublishError> {
        let mut guard = self
            .topics
            .lock()
            .map_err(|_| PublishError::Unavailable("poisoned lock".into()))?;
        guard
            .entry(topic.to_string())
            .or_default()
            .push_back(message.clone());
        Ok(())
    }
}

/// POSTs each message to the push endpoint configured for its topic.
///
/// Any non-2xx answer is a failure; the caller leaves the inbound message
/// unacknowledged so it is redelivered.
pub struct HttpPublisher {
    client: reqwest::Client,
    endpoints: HashMap<String, String>,
    push_envelope: bool,
}

impl HttpPublisher {
    pub fn new(
        endpoints: HashMap<String, String>,
        timeout: Duration,
        push_envelope: bool,
    ) -> Result<Self, PublishError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .pool_max_idle_per_host(16)
            .build()
            .map_err(|e| PublishError::Unavailable(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            endpoints,
            push_envelope,
        })
    }
}

#[async_trait]
impl MessagePublisher for HttpPublisher {
    async fn publish(&self, topic: &str, message: &StageMessage) -> Result<(), PublishError> {
        let url = self
            .endpoints
            .get(topic)
            .ok_or_else(|| PublishError::UnknownTopic(topic.to_string()))?;
        let body = if self.push_envelope {
            PushEnvelope::wrap(message, topic)
                .and_then(|envelope| serde_json::to_value(envelope).map_err(|e| e.to_string()))
                .map_err(PublishError::Request)?
        } else {
            serde_json::to_value(message).map_err(|e| PublishError::Request(e.to_string()))?
        };

        let response = self
            .client
            .post(url)
            .json(&body)
            .send()
            .await
            .map_err(|e| PublishError::Request(e.to_string()))?;
        if !response.status().is_success() {
            return Err(PublishError::Http(response.status().as_u16()));
        }
        tracing::debug!(topic, doc_id = %message.doc_id, "message pushed");
        Ok(())
    }
}

/// Push delivery envelope: `{"message": {"data": "<base64 json>"}, ...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushEnvelope {
    pub message: PushMessage,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subscription: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushMessage {
    pub data: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub attributes: HashMap<String, String>,
}

impl PushEnvelope {
    pub fn wrap(message: &StageMessage, subscription: &str) -> Result<Self, String> {
        let json = serde_json::to_vec(message).map_err(|e| e.to_string())?;
        Ok(Self {
            message: PushMessage {
                data: BASE64.encode(json),
                message_id: None,
                attributes: HashMap::new(),
            },
            subscription: Some(subscription.to_string()),
        })
    }
}

/// Decode an inbound request body: a push envelope or a bare `{doc_id}`.
///
/// Anything undecodable is [`PipelineError::InvalidMessage`]; redelivering
/// the same bytes would fail the same way.
pub fn decode_stage_message(body: &[u8]) -> Result<StageMessage, PipelineError> {
    let value: Value = serde_json::from_slice(body)
        .map_err(|e| PipelineError::InvalidMessage(format!("body is not JSON: {e}")))?;

    let payload = match value.get("message").and_then(|m| m.get("data")) {
        Some(_) => {
            let envelope: PushEnvelope = serde_json::from_value(value).map_err(|e| {
                PipelineError::InvalidMessage(format!("malformed push envelope: {e}"))
            })?;
            let bytes = BASE64.decode(envelope.message.data.trim()).map_err(|e| {
                PipelineError::InvalidMessage(format!("message.data is not base64: {e}"))
            })?;
            serde_json::from_slice::<Value>(&bytes).map_err(|e| {
                PipelineError::InvalidMessage(format!("message.data is not JSON: {e}"))
            })?
        }
        None => value,
    };

    let doc_id = payload
        .get("doc_id")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .ok_or_else(|| PipelineError::InvalidMessage("missing doc_id".into()))?;
    Ok(StageMessage::new(doc_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_direct_json() {
        let msg = decode_stage_message(br#"{"doc_id": "2401.00001"}"#).unwrap();
        assert_eq!(msg.doc_id, "2401.00001");
    }

    #[test]
    fn decodes_push_envelope() {
        let envelope = PushEnvelope::wrap(&StageMessage::new("abc"), "echo-analyzer").unwrap();
        let body = serde_json::to_vec(&envelope).unwrap();
        assert_eq!(decode_stage_message(&body).unwrap().doc_id, "abc");
    }

    #[test]
    fn decodes_envelope_with_extra_fields() {
        let data = BASE64.encode(br#"{"doc_id":"xyz","source":"arxiv"}"#);
        let body = json!({
            "message": { "data": data, "messageId": "123", "publishTime": "2025-01-01T00:00:00Z" },
            "subscription": "projects/p/subscriptions/s"
        });
        let msg = decode_stage_message(body.to_string().as_bytes()).unwrap();
        assert_eq!(msg.doc_id, "xyz");
    }

    #[test]
    fn rejects_missing_or_blank_doc_id() {
        for body in [r#"{}"#, r#"{"doc_id": "  "}"#, r#"{"doc_id": 7}"#] {
            assert!(matches!(
                decode_stage_message(body.as_bytes()),
                Err(PipelineError::InvalidMessage(_))
            ));
        }
    }

    #[test]
    fn rejects_bad_base64_and_non_json() {
        let body = json!({ "message": { "data": "***" } }).to_string();
        assert!(matches!(
            decode_stage_message(body.as_bytes()),
            Err(PipelineError::InvalidMessage(_))
        ));
        assert!(decode_stage_message(b"not json").is_err());
    }

    #[tokio::test]
    async fn in_memory_queue_is_fifo_per_topic() {
        let queue = InMemoryQueue::new();
        queue
            .publish(TOPIC_ANALYZED, &StageMessage::new("a"))
            .await
            .unwrap();
        queue
            .publish(TOPIC_ANALYZED, &StageMessage::new("b"))
            .await
            .unwrap();
        queue
            .publish(TOPIC_SUMMARIZED, &StageMessage::new("c"))
            .await
            .unwrap();

        assert_eq!(queue.len(TOPIC_ANALYZED), 2);
        let drained: Vec<String> = queue
            .drain(TOPIC_ANALYZED)
            .into_iter()
            .map(|m| m.doc_id)
            .collect();
        assert_eq!(drained, vec!["a", "b"]);
        assert_eq!(queue.len(TOPIC_ANALYZED), 0);
        assert_eq!(queue.len(TOPIC_SUMMARIZED), 1);
        assert!(queue.drain(TOPIC_INGEST).is_empty());
    }

    #[tokio::test]
    async fn http_publisher_rejects_unknown_topic() {
        let publisher =
            HttpPublisher::new(HashMap::new(), Duration::from_millis(100), false).unwrap();
        let err = publisher
            .publish(TOPIC_ANALYZED, &StageMessage::new("a"))
            .await
            .unwrap_err();
        assert_eq!(err, PublishError::UnknownTopic("analyzed".into()));
    }
}
