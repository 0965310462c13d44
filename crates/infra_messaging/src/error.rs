//! Messaging errors

use thiserror::Error;

/// Errors raised by an [`crate::EventChannel`]
#[derive(Debug, Error)]
pub enum ChannelError {
    /// The channel has been shut down
    #[error("Channel is closed")]
    Closed,

    /// A handler is already attached to the topic
    #[error("Topic '{0}' already has a subscriber")]
    AlreadySubscribed(String),

    /// Failed to publish a message
    #[error("Publish failed for topic '{topic}': {reason}")]
    PublishFailed {
        topic: String,
        reason: String,
    },

    /// Payload could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
