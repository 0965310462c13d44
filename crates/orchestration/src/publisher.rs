//! Channel-backed event publisher

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use core_kernel::{DomainPort, PortError};
use domain_request::{EventPublisher, RequestEvent};
use infra_messaging::{ChannelError, EventChannel};

use crate::topics;

/// Publishes workflow events as JSON on their topics
#[derive(Clone)]
pub struct ChannelEventPublisher {
    channel: Arc<dyn EventChannel>,
}

impl ChannelEventPublisher {
    pub fn new(channel: Arc<dyn EventChannel>) -> Self {
        Self { channel }
    }
}

impl DomainPort for ChannelEventPublisher {}

#[async_trait]
impl EventPublisher for ChannelEventPublisher {
    async fn publish(&self, event: &RequestEvent) -> Result<(), PortError> {
        let topic = topics::for_event(event);
        let payload = serde_json::to_value(event)
            .map_err(|e| PortError::transformation(format!("cannot encode {}: {}", event.event_type(), e)))?;

        let message_id = self.channel.publish(topic, payload).await.map_err(|e| match e {
            ChannelError::Closed => PortError::service_unavailable("event channel"),
            other => PortError::connection(other.to_string()),
        })?;

        debug!(topic, message_id = %message_id, event_id = %event.event_id(), "Published event");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use domain_request::{RequestStatus, RiskClassification};
    use infra_messaging::InMemoryEventChannel;
    use test_utils::TestRequestBuilder;

    #[tokio::test]
    async fn test_events_routed_to_their_topics() {
        let channel = Arc::new(InMemoryEventChannel::default());
        let publisher = ChannelEventPublisher::new(channel.clone());
        let validated = TestRequestBuilder::new().build_with_status(RequestStatus::Validated);

        publisher.publish(&RequestEvent::received(&validated)).await.unwrap();
        publisher
            .publish(&RequestEvent::validated(&validated, RiskClassification::Regular))
            .await
            .unwrap();

        let queued = channel.pending(topics::REQUEST_VALIDATED).await;
        assert_eq!(queued.len(), 1);
        assert_eq!(queued[0].payload["event_type"], "REQUEST_VALIDATED");
        assert_eq!(queued[0].payload["classification"], "REGULAR");
        assert_eq!(channel.pending(topics::REQUEST_RECEIVED).await.len(), 1);
    }

    #[tokio::test]
    async fn test_closed_channel_is_unavailable() {
        let channel = Arc::new(InMemoryEventChannel::default());
        assert!(channel.shutdown(Duration::from_millis(100)).await);
        let publisher = ChannelEventPublisher::new(channel);

        let request = TestRequestBuilder::new().build();
        let err = publisher.publish(&RequestEvent::received(&request)).await.unwrap_err();

        assert!(matches!(err, PortError::ServiceUnavailable { .. }));
    }
}
