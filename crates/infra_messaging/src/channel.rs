//! Channel abstractions
//!
//! Delivery is at-least-once: a handler may see the same message more than
//! once and must be idempotent. Ordering across topics is not guaranteed.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use core_kernel::MessageId;

use crate::error::ChannelError;

/// Suffix of every dead-letter topic
pub const DEAD_LETTER_SUFFIX: &str = ".dlq";

/// Dead-letter topic paired with `topic`
pub fn dead_letter_topic(topic: &str) -> String {
    format!("{}{}", topic, DEAD_LETTER_SUFFIX)
}

/// Envelope around a JSON payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub topic: String,
    pub payload: serde_json::Value,
    /// Deliveries attempted so far
    pub attempt: u32,
    pub published_at: DateTime<Utc>,
    /// Failure recorded by the last unsuccessful delivery
    pub last_error: Option<String>,
}

impl Message {
    pub fn new(topic: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            id: MessageId::new_v7(),
            topic: topic.into(),
            payload,
            attempt: 0,
            published_at: Utc::now(),
            last_error: None,
        }
    }

    /// Decodes the payload into `T`
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, ChannelError> {
        Ok(serde_json::from_value(self.payload.clone())?)
    }

    pub fn is_redelivery(&self) -> bool {
        self.attempt > 1
    }
}

/// Outcome of a failed delivery
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeliveryError {
    /// Transient failure: redeliver after backoff
    #[error("retry requested: {0}")]
    Retry(String),

    /// Permanent failure: route to the dead-letter topic now
    #[error("rejected: {0}")]
    Reject(String),
}

impl DeliveryError {
    pub fn retry(reason: impl Into<String>) -> Self {
        DeliveryError::Retry(reason.into())
    }

    pub fn reject(reason: impl Into<String>) -> Self {
        DeliveryError::Reject(reason.into())
    }
}

/// Consumer attached to a topic
#[async_trait]
pub trait MessageHandler: Send + Sync + 'static {
    async fn handle(&self, message: &Message) -> Result<(), DeliveryError>;
}

/// Topic-routed publish/subscribe with per-topic dead-letter routing
#[async_trait]
pub trait EventChannel: Send + Sync + 'static {
    /// Enqueues `payload` on `topic`
    async fn publish(&self, topic: &str, payload: serde_json::Value) -> Result<MessageId, ChannelError>;

    /// Attaches `handler` to `topic`; messages already queued are delivered too
    async fn subscribe(&self, topic: &str, handler: Arc<dyn MessageHandler>) -> Result<(), ChannelError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dead_letter_topic_name() {
        assert_eq!(dead_letter_topic("payment.confirmed"), "payment.confirmed.dlq");
    }

    #[test]
    fn test_decode_payload() {
        let message = Message::new("t", serde_json::json!({"n": 3}));
        #[derive(Deserialize)]
        struct Payload {
            n: u32,
        }
        assert_eq!(message.decode::<Payload>().unwrap().n, 3);
        assert!(message.decode::<Vec<u8>>().is_err());
    }
}
