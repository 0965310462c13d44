//! Message consumer
//!
//! Decodes inbound messages and dispatches them to the orchestration
//! handlers. The outcome maps onto the channel's delivery contract:
//!
//! | handler result | delivery |
//! |---|---|
//! | applied / discarded | ack |
//! | retryable error (gateway, store) | retry with backoff |
//! | publish failure after save | ack, logged |
//! | undecodable payload, other errors | dead-letter |

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{error, info, warn};

use core_kernel::OperationMetadata;
use domain_request::InboundEvent;
use infra_messaging::{ChannelError, DeliveryError, EventChannel, Message, MessageHandler};

use crate::error::{WorkflowError, WorkflowResult};
use crate::service::{HandleOutcome, OrchestrationService};
use crate::topics;

/// Feeds channel messages into an [`OrchestrationService`]
#[derive(Debug, Clone)]
pub struct WorkflowConsumer {
    service: Arc<OrchestrationService>,
}

impl WorkflowConsumer {
    pub fn new(service: Arc<OrchestrationService>) -> Self {
        Self { service }
    }

    /// Decodes and handles one message
    pub async fn process(&self, message: &Message) -> WorkflowResult<HandleOutcome> {
        let event: InboundEvent = message
            .decode()
            .map_err(|e| WorkflowError::MalformedMessage(e.to_string()))?;

        let expected_topic = topics::for_inbound(&event);
        if message.topic != expected_topic {
            warn!(
                topic = %message.topic,
                event_type = event.event_type(),
                expected_topic,
                "Event arrived on an unexpected topic"
            );
        }

        let metadata = OperationMetadata::with_correlation_id(message.id.to_string())
            .with_context("topic", message.topic.clone())
            .with_context("attempt", message.attempt.to_string());

        match &event {
            InboundEvent::Received(snapshot) => self.service.handle_received(snapshot, Some(metadata)).await,
            InboundEvent::PaymentConfirmed(payment) => self.service.handle_payment_confirmed(payment).await,
            InboundEvent::UnderwritingDecided(decision) => {
                self.service.handle_underwriting_decision(decision).await
            }
        }
    }
}

#[async_trait]
impl MessageHandler for WorkflowConsumer {
    async fn handle(&self, message: &Message) -> Result<(), DeliveryError> {
        match self.process(message).await {
            Ok(_) => Ok(()),
            Err(e @ WorkflowError::Publish { .. }) => {
                error!(message_id = %message.id, error = %e, "Acknowledging message whose event was not emitted");
                Ok(())
            }
            Err(e) if e.is_retryable() => {
                warn!(message_id = %message.id, attempt = message.attempt, error = %e, "Handler failed, requesting redelivery");
                Err(DeliveryError::retry(e.to_string()))
            }
            Err(e) => {
                error!(message_id = %message.id, error = %e, "Handler failed permanently");
                Err(DeliveryError::reject(e.to_string()))
            }
        }
    }
}

/// Attaches `consumer` to every inbound workflow topic
pub async fn subscribe_all(
    channel: &dyn EventChannel,
    consumer: Arc<WorkflowConsumer>,
) -> Result<(), ChannelError> {
    for topic in topics::INBOUND {
        channel.subscribe(topic, consumer.clone()).await?;
        info!(topic, "Consumer subscribed");
    }
    Ok(())
}
