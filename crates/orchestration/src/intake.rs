//! Request intake
//!
//! The entry points through which requests are created and cancelled from
//! outside the workflow. Creation is the only place a request is born;
//! cancellation competes with the event handlers and uses the same
//! conditioned write.

use std::sync::Arc;

use tracing::{info, instrument, warn};

use core_kernel::{CustomerId, RequestId};
use domain_request::{
    EventPublisher, NewPolicyRequest, PolicyRequest, RequestEvent, RequestStatus, RequestStore,
};

use crate::error::{WorkflowError, WorkflowResult};

/// Create, cancel and query policy requests
#[derive(Clone)]
pub struct RequestIntake {
    store: Arc<dyn RequestStore>,
    publisher: Arc<dyn EventPublisher>,
}

impl RequestIntake {
    pub fn new(store: Arc<dyn RequestStore>, publisher: Arc<dyn EventPublisher>) -> Self {
        Self {
            store,
            publisher,
        }
    }

    /// Validates, stores and announces a new request
    ///
    /// The `Received` event is published only after the request is stored,
    /// so a consumer of that event always finds it.
    ///
    /// # Errors
    ///
    /// - `WorkflowError::Validation` for malformed input
    /// - `WorkflowError::PersistenceFatal` if the store fails
    /// - `WorkflowError::Publish` if the request was stored but not announced
    #[instrument(skip(self, new), fields(customer_id = %new.customer_id))]
    pub async fn create_request(&self, new: NewPolicyRequest) -> WorkflowResult<PolicyRequest> {
        let request = PolicyRequest::create(new).map_err(|e| {
            warn!(error = %e, "Rejected malformed request");
            WorkflowError::validation(e.to_string())
        })?;
        let request_id = request.id();

        self.store
            .create(&request)
            .await
            .map_err(|e| WorkflowError::from_store(request_id, e))?;
        info!(request_id = %request_id, category = %request.category(), "Policy request received");

        let event = RequestEvent::received(&request);
        self.publisher
            .publish(&event)
            .await
            .map_err(|source| WorkflowError::Publish {
                request_id,
                event_type: event.event_type(),
                source,
            })?;

        Ok(request)
    }

    /// Cancels a request that has not reached a terminal status
    ///
    /// One conditioned write against the status just read. Losing that
    /// write to a concurrent transition is reported as `InvalidTransition`
    /// from the status that won.
    ///
    /// # Errors
    ///
    /// - `WorkflowError::NotFound` for an unknown id
    /// - `WorkflowError::InvalidTransition` if the request already finished
    ///   or moved on concurrently
    #[instrument(skip(self), fields(request_id = %id))]
    pub async fn cancel(&self, id: RequestId) -> WorkflowResult<PolicyRequest> {
        let mut request = self.get_by_id(id).await?;
        let prior = request.status();

        request
            .cancel()
            .map_err(|e| WorkflowError::from_domain(id, e))?;

        match self.store.save(&request, prior).await {
            Ok(()) => {
                info!(from = %prior, "Policy request cancelled");
                Ok(request)
            }
            Err(e) if e.is_conflict() => {
                let current = self.get_by_id(id).await?.status();
                warn!(expected = %prior, current = %current, "Request progressed before cancellation");
                Err(WorkflowError::InvalidTransition {
                    request_id: id,
                    from: current,
                    to: RequestStatus::Cancelled,
                })
            }
            Err(e) => Err(WorkflowError::from_store(id, e)),
        }
    }

    pub async fn get_by_id(&self, id: RequestId) -> WorkflowResult<PolicyRequest> {
        self.store
            .find_by_id(id)
            .await
            .map_err(|e| WorkflowError::from_store(id, e))?
            .ok_or(WorkflowError::NotFound(id))
    }

    /// All requests of a customer, oldest first
    pub async fn list_by_customer(&self, customer_id: CustomerId) -> WorkflowResult<Vec<PolicyRequest>> {
        self.store
            .find_by_customer_id(customer_id)
            .await
            .map_err(WorkflowError::PersistenceFatal)
    }
}
