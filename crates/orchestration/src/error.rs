//! Workflow error taxonomy
//!
//! Every failure the workflow can produce, classified by what the caller
//! (or the message consumer) should do about it.

use core_kernel::{PortError, RequestId};
use domain_request::{RequestError, RequestStatus};
use thiserror::Error;

/// Errors produced by the orchestration handlers and the intake entry points
#[derive(Debug, Error)]
pub enum WorkflowError {
    /// Malformed intake input
    #[error("Validation error: {0}")]
    Validation(String),

    /// The request is no longer in a status that allows the change
    #[error("Request {request_id} cannot move from {from} to {to}")]
    InvalidTransition {
        request_id: RequestId,
        from: RequestStatus,
        to: RequestStatus,
    },

    #[error("Policy request not found: {0}")]
    NotFound(RequestId),

    /// Classification call failed or timed out; nothing was written
    #[error("Classification gateway failed for {request_id}: {source}")]
    Gateway {
        request_id: RequestId,
        #[source]
        source: PortError,
    },

    /// Conditioned writes kept losing to concurrent writers
    #[error("Request {request_id} kept changing concurrently after {attempts} attempts")]
    PersistenceConflict { request_id: RequestId, attempts: u32 },

    /// The store is unavailable or failed
    #[error("Persistence failed: {0}")]
    PersistenceFatal(#[source] PortError),

    /// The state change was stored but the event could not be emitted
    #[error("Failed to publish {event_type} for {request_id}: {source}")]
    Publish {
        request_id: RequestId,
        event_type: &'static str,
        #[source]
        source: PortError,
    },

    /// Undecodable message payload
    #[error("Malformed message: {0}")]
    MalformedMessage(String),
}

impl WorkflowError {
    pub fn validation(message: impl Into<String>) -> Self {
        WorkflowError::Validation(message.into())
    }

    pub fn gateway(request_id: RequestId, source: PortError) -> Self {
        WorkflowError::Gateway { request_id, source }
    }

    /// Lifts a domain error raised while changing `request_id`
    pub fn from_domain(request_id: RequestId, error: RequestError) -> Self {
        match error {
            RequestError::InvalidTransition { from, to } => {
                WorkflowError::InvalidTransition { request_id, from, to }
            }
            other => WorkflowError::Validation(other.to_string()),
        }
    }

    /// Lifts a store error raised while reading or writing `request_id`
    pub fn from_store(request_id: RequestId, error: PortError) -> Self {
        match error {
            PortError::NotFound { .. } => WorkflowError::NotFound(request_id),
            PortError::Conflict { .. } => WorkflowError::PersistenceConflict {
                request_id,
                attempts: 1,
            },
            other => WorkflowError::PersistenceFatal(other),
        }
    }

    /// True if redelivering the message may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            WorkflowError::Gateway { .. }
                | WorkflowError::PersistenceConflict { .. }
                | WorkflowError::PersistenceFatal(_)
        )
    }

    /// True for the kinds an intake caller is expected to handle
    pub fn is_caller_visible(&self) -> bool {
        matches!(
            self,
            WorkflowError::Validation(_)
                | WorkflowError::InvalidTransition { .. }
                | WorkflowError::NotFound(_)
        )
    }
}

pub type WorkflowResult<T> = Result<T, WorkflowError>;
