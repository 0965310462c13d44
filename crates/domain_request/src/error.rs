//! Policy request domain errors

use thiserror::Error;

use crate::status::RequestStatus;

/// Errors raised by the request aggregate and its value types
#[derive(Debug, Error)]
pub enum RequestError {
    /// Transition not present in the lifecycle table
    #[error("Invalid state transition from {from} to {to}")]
    InvalidTransition {
        from: RequestStatus,
        to: RequestStatus,
    },

    /// Input failed validation
    #[error("Validation error: {0}")]
    Validation(String),

    /// Coverage amounts are inconsistent with the insured amount
    #[error("Invalid coverage: {0}")]
    InvalidCoverage(String),
}

impl RequestError {
    /// Creates an invalid transition error
    pub fn invalid_transition(from: RequestStatus, to: RequestStatus) -> Self {
        RequestError::InvalidTransition { from, to }
    }

    /// Creates a validation error
    pub fn validation(message: impl Into<String>) -> Self {
        RequestError::Validation(message.into())
    }

    pub fn is_invalid_transition(&self) -> bool {
        matches!(self, RequestError::InvalidTransition { .. })
    }
}

impl From<validator::ValidationErrors> for RequestError {
    fn from(errors: validator::ValidationErrors) -> Self {
        RequestError::Validation(errors.to_string())
    }
}
