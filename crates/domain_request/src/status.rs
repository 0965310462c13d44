//! Request lifecycle states and the transition table
//!
//! ```text
//! RECEIVED ──> VALIDATED ──> PENDING ──> APPROVED
//!  │  │          │  │          │  │
//!  │  └──────────┼──┴──────────┼──┴──> REJECTED
//!  └─────────────┴─────────────┴─────> CANCELLED
//! ```
//!
//! RECEIVED goes straight to REJECTED when the classification puts the
//! insured amount over the eligibility limit.
//!
//! Terminal states accept no transition. Cancellation is derived from the
//! same table: a request is cancellable exactly when CANCELLED is a legal
//! target from its current status.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::RequestError;

/// Lifecycle status of a policy request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestStatus {
    /// Initial state, written by intake
    Received,
    /// Risk classification passed eligibility
    Validated,
    /// Payment confirmed, awaiting underwriting
    Pending,
    /// Terminal: failed eligibility or underwriting
    Rejected,
    /// Terminal: underwriting authorized
    Approved,
    /// Terminal: cancelled by the customer
    Cancelled,
}

impl RequestStatus {
    /// Every status, in lifecycle order
    pub const ALL: [RequestStatus; 6] = [
        RequestStatus::Received,
        RequestStatus::Validated,
        RequestStatus::Pending,
        RequestStatus::Rejected,
        RequestStatus::Approved,
        RequestStatus::Cancelled,
    ];

    /// Checks if `target` is a legal next status from `self`
    pub fn can_transition_to(self, target: RequestStatus) -> bool {
        use RequestStatus::*;
        matches!(
            (self, target),
            (Received, Validated) |
            (Received, Rejected) |
            (Received, Cancelled) |
            (Validated, Pending) |
            (Validated, Rejected) |
            (Validated, Cancelled) |
            (Pending, Approved) |
            (Pending, Rejected) |
            (Pending, Cancelled)
        )
    }

    /// Returns true for REJECTED, APPROVED and CANCELLED
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            RequestStatus::Rejected | RequestStatus::Approved | RequestStatus::Cancelled
        )
    }

    /// Returns true if a customer cancellation is currently allowed
    pub fn is_cancellable(self) -> bool {
        self.can_transition_to(RequestStatus::Cancelled)
    }

    /// Legal targets from this status
    pub fn allowed_targets(self) -> Vec<RequestStatus> {
        Self::ALL
            .into_iter()
            .filter(|target| self.can_transition_to(*target))
            .collect()
    }

    /// Validates a transition, returning the error the aggregate surfaces
    pub fn ensure_transition(self, target: RequestStatus) -> Result<(), RequestError> {
        if self.can_transition_to(target) {
            Ok(())
        } else {
            Err(RequestError::invalid_transition(self, target))
        }
    }

    /// Wire/storage name
    pub fn as_str(self) -> &'static str {
        match self {
            RequestStatus::Received => "RECEIVED",
            RequestStatus::Validated => "VALIDATED",
            RequestStatus::Pending => "PENDING",
            RequestStatus::Rejected => "REJECTED",
            RequestStatus::Approved => "APPROVED",
            RequestStatus::Cancelled => "CANCELLED",
        }
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RequestStatus {
    type Err = RequestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| RequestError::validation(format!("unknown request status: {}", s)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_received_can_be_rejected_by_eligibility() {
        assert!(RequestStatus::Received.can_transition_to(RequestStatus::Rejected));
        assert!(RequestStatus::Received
            .ensure_transition(RequestStatus::Rejected)
            .is_ok());
        assert_eq!(
            RequestStatus::Received.allowed_targets(),
            vec![
                RequestStatus::Validated,
                RequestStatus::Rejected,
                RequestStatus::Cancelled
            ]
        );
    }

    #[test]
    fn test_terminal_states_accept_nothing() {
        for status in RequestStatus::ALL.into_iter().filter(|s| s.is_terminal()) {
            assert!(status.allowed_targets().is_empty());
        }
    }

    #[test]
    fn test_cancellable_states() {
        let cancellable: Vec<_> = RequestStatus::ALL
            .into_iter()
            .filter(|s| s.is_cancellable())
            .collect();
        assert_eq!(
            cancellable,
            vec![RequestStatus::Received, RequestStatus::Validated, RequestStatus::Pending]
        );
    }

    #[test]
    fn test_parse_round_trip_names() {
        for status in RequestStatus::ALL {
            assert_eq!(status.as_str().parse::<RequestStatus>().unwrap(), status);
        }
        assert!("DONE".parse::<RequestStatus>().is_err());
    }
}
