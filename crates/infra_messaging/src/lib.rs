//! Messaging Infrastructure
//!
//! Durable, at-least-once, topic-routed publish/subscribe used by the policy
//! request workflow.
//!
//! - [`EventChannel`]: publish a JSON payload to a topic, subscribe a handler
//! - [`MessageHandler`]: consumer side; returns [`DeliveryError::Retry`] to have
//!   the message redelivered with backoff, [`DeliveryError::Reject`] to send it
//!   straight to the dead-letter topic
//! - [`RedeliveryPolicy`]: bounded exponential backoff
//! - [`InMemoryEventChannel`]: in-process implementation with a worker pool;
//!   `infra_db::PostgresEventChannel` implements the same trait over PostgreSQL
//!
//! Every topic `t` has a dead-letter topic `t.dlq` (see [`dead_letter_topic`]).

pub mod channel;
pub mod error;
pub mod memory;
pub mod retry;

pub use channel::{dead_letter_topic, DeliveryError, EventChannel, Message, MessageHandler};
pub use error::ChannelError;
pub use memory::{InMemoryChannelConfig, InMemoryEventChannel};
pub use retry::{RedeliveryPolicy, RedeliveryPolicyBuilder};
