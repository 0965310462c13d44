//! Ports and Adapters Infrastructure
//!
//! Shared types for the hexagonal boundary between the workflow core and
//! its collaborators (request store, classification gateway, event channel).
//!
//! ```text
//!            ┌──────────────────────────────────────┐
//!            │        OrchestrationService          │
//!            └──────────────────────────────────────┘
//!                 │              │              │
//!                 ▼              ▼              ▼
//!          RequestStore   Classification   EventPublisher
//!                           Gateway
//!                 ▲              ▲              ▲
//!          ┌──────┴─────┐ ┌──────┴──────┐ ┌─────┴───────┐
//!          │ PostgreSQL │ │  Fraud API  │ │ EventChannel│
//!          │ / in-memory│ │ / static    │ │             │
//!          └────────────┘ └─────────────┘ └─────────────┘
//! ```
//!
//! Every port returns [`PortError`]. The orchestration layer only asks it
//! three questions: [`PortError::is_transient`] (redeliver),
//! [`PortError::is_conflict`] (re-read) and [`PortError::is_not_found`]
//! (discard). Which adapter produced the error does not matter.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

type BoxedSource = Box<dyn std::error::Error + Send + Sync>;

/// Failure reported by any port implementation
#[derive(Debug, Error)]
pub enum PortError {
    #[error("{entity_type} {id} not found")]
    NotFound { entity_type: String, id: String },

    /// A conditioned write found the record in a different state
    #[error("Conflict: {message}")]
    Conflict { message: String },

    #[error("Connection error: {message}")]
    Connection {
        message: String,
        #[source]
        source: Option<BoxedSource>,
    },

    #[error("{operation} timed out after {duration_ms}ms")]
    Timeout { operation: String, duration_ms: u64 },

    /// Credentials were refused by a remote system
    #[error("Unauthorized: {message}")]
    Unauthorized { message: String },

    #[error("Rate limited, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("{service} is unavailable")]
    ServiceUnavailable { service: String },

    /// Data could not be mapped to or from the adapter's representation
    #[error("Transformation error: {message}")]
    Transformation { message: String },

    #[error("Internal error: {message}")]
    Internal {
        message: String,
        #[source]
        source: Option<BoxedSource>,
    },
}

impl PortError {
    pub fn not_found(entity_type: impl Into<String>, id: impl fmt::Display) -> Self {
        PortError::NotFound {
            entity_type: entity_type.into(),
            id: id.to_string(),
        }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        PortError::Conflict {
            message: message.into(),
        }
    }

    pub fn connection(message: impl Into<String>) -> Self {
        PortError::Connection {
            message: message.into(),
            source: None,
        }
    }

    pub fn timeout(operation: impl Into<String>, duration_ms: u64) -> Self {
        PortError::Timeout {
            operation: operation.into(),
            duration_ms,
        }
    }

    pub fn service_unavailable(service: impl Into<String>) -> Self {
        PortError::ServiceUnavailable {
            service: service.into(),
        }
    }

    pub fn transformation(message: impl Into<String>) -> Self {
        PortError::Transformation {
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        PortError::Internal {
            message: message.into(),
            source: None,
        }
    }

    /// Whether the same call may succeed if repeated later
    ///
    /// Conflicts are not transient: retrying the same write cannot succeed,
    /// the caller has to re-read first.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            PortError::Connection { .. }
                | PortError::Timeout { .. }
                | PortError::RateLimited { .. }
                | PortError::ServiceUnavailable { .. }
        )
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, PortError::NotFound { .. })
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, PortError::Conflict { .. })
    }
}

/// Marker for port traits; implementations must be shareable across tasks
pub trait DomainPort: Send + Sync + 'static {}

/// Circuit breaker tuning for remote adapters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that open the circuit
    pub failure_threshold: u32,
    /// Seconds an open circuit waits before letting a trial call through
    pub reset_timeout_secs: u64,
    /// Successful trial calls needed to close it again
    pub success_threshold: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout_secs: 30,
            success_threshold: 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdapterHealth {
    Healthy,
    /// Reachable but refusing some work (e.g. circuit open)
    Degraded,
    Unhealthy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheckResult {
    pub adapter_id: String,
    pub status: AdapterHealth,
    pub latency_ms: u64,
    pub message: Option<String>,
    pub checked_at: DateTime<Utc>,
}

impl HealthCheckResult {
    pub fn is_healthy(&self) -> bool {
        self.status == AdapterHealth::Healthy
    }
}

/// Adapters that can check their backing system
#[async_trait::async_trait]
pub trait HealthCheckable: Send + Sync {
    async fn health_check(&self) -> HealthCheckResult;
}

/// Tracing context passed along with a port call
///
/// The consumer fills it from the message being handled so a remote call
/// can be correlated with the delivery that caused it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OperationMetadata {
    pub correlation_id: Option<String>,
    pub context: BTreeMap<String, String>,
}

impl OperationMetadata {
    pub fn with_correlation_id(correlation_id: impl Into<String>) -> Self {
        Self {
            correlation_id: Some(correlation_id.into()),
            context: BTreeMap::new(),
        }
    }

    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_message_names_entity() {
        let error = PortError::not_found("PolicyRequest", "123");
        assert!(error.is_not_found());
        assert!(!error.is_transient());
        assert_eq!(error.to_string(), "PolicyRequest 123 not found");
    }

    #[test]
    fn test_transient_classification() {
        assert!(PortError::timeout("classify", 5000).is_transient());
        assert!(PortError::RateLimited { retry_after_secs: 60 }.is_transient());
        assert!(PortError::service_unavailable("fraud-api").is_transient());
        assert!(PortError::connection("reset by peer").is_transient());

        assert!(!PortError::transformation("bad row").is_transient());
        assert!(!PortError::internal("boom").is_transient());
        assert!(!PortError::Unauthorized { message: "bad key".into() }.is_transient());
    }

    #[test]
    fn test_conflict_is_not_transient() {
        let conflict = PortError::conflict("status changed");
        assert!(conflict.is_conflict());
        assert!(!conflict.is_transient());
    }

    #[test]
    fn test_metadata_context_accumulates() {
        let metadata = OperationMetadata::with_correlation_id("MSG-1")
            .with_context("topic", "payment.confirmed")
            .with_context("attempt", "2");

        assert_eq!(metadata.correlation_id.as_deref(), Some("MSG-1"));
        assert_eq!(metadata.context.len(), 2);
        assert_eq!(metadata.context["attempt"], "2");
    }
}
