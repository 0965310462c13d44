//! Policy Request Domain Ports
//!
//! Port interfaces the workflow depends on. Each has at least one adapter:
//!
//! - [`RequestStore`]: PostgreSQL (infra_db) or in-memory ([`mock`])
//! - [`RiskClassificationGateway`]: HTTP fraud API or the static table
//!   (see [`crate::adapters`])
//! - [`EventPublisher`]: the messaging channel (orchestration) or a
//!   recording double ([`mock`])
//!
//! # Conditioned writes
//!
//! `RequestStore::save` takes the status the caller read before deciding.
//! Implementations must compare and write atomically and answer
//! `PortError::Conflict` when the stored status no longer matches, so that
//! two workers racing on the same request never both win.

use async_trait::async_trait;

use core_kernel::{
    CustomerId, DomainPort, HealthCheckable, OperationMetadata, PortError, RequestId,
};

use crate::classification::ClassificationResult;
use crate::events::RequestEvent;
use crate::request::PolicyRequest;
use crate::status::RequestStatus;

/// Durable keyed storage for requests and their history
#[async_trait]
pub trait RequestStore: DomainPort + HealthCheckable {
    /// Inserts a freshly created request
    ///
    /// Returns `PortError::Conflict` if the id already exists.
    async fn create(&self, request: &PolicyRequest) -> Result<(), PortError>;

    async fn find_by_id(&self, id: RequestId) -> Result<Option<PolicyRequest>, PortError>;

    /// All requests of a customer, oldest first
    async fn find_by_customer_id(
        &self,
        customer_id: CustomerId,
    ) -> Result<Vec<PolicyRequest>, PortError>;

    /// Writes `request` only if the stored status still equals `expected_prior`
    async fn save(
        &self,
        request: &PolicyRequest,
        expected_prior: RequestStatus,
    ) -> Result<(), PortError>;

    /// True if the customer has a request that has not reached a terminal status
    async fn exists_active_by_customer_id(&self, customer_id: CustomerId) -> Result<bool, PortError>;
}

/// Fraud/risk classification oracle
#[async_trait]
pub trait RiskClassificationGateway: DomainPort + HealthCheckable {
    async fn classify(
        &self,
        request_id: RequestId,
        customer_id: CustomerId,
        metadata: Option<OperationMetadata>,
    ) -> Result<ClassificationResult, PortError>;
}

/// Outbound side of the event channel
#[async_trait]
pub trait EventPublisher: DomainPort {
    async fn publish(&self, event: &RequestEvent) -> Result<(), PortError>;
}

/// In-memory implementations for tests
///
/// Neither adapter touches the network or a database, so workflow tests can
/// run them under a multi-threaded runtime and observe every write.
#[cfg(any(test, feature = "mock"))]
pub mod mock {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
    use std::sync::Arc;
    use tokio::sync::RwLock;
    use chrono::Utc;

    use core_kernel::{AdapterHealth, HealthCheckResult};

    /// In-memory RequestStore with compare-and-swap saves
    #[derive(Debug, Default, Clone)]
    pub struct InMemoryRequestStore {
        requests: Arc<RwLock<HashMap<RequestId, PolicyRequest>>>,
        failing_saves: Arc<AtomicU32>,
        save_count: Arc<AtomicU32>,
    }

    impl InMemoryRequestStore {
        pub fn new() -> Self {
            Self::default()
        }

        /// Pre-populates the store
        pub async fn with_requests(requests: Vec<PolicyRequest>) -> Self {
            let store = Self::new();
            for request in requests {
                store.requests.write().await.insert(request.id(), request);
            }
            store
        }

        /// Makes the next `count` saves fail with a connection error
        pub fn fail_next_saves(&self, count: u32) {
            self.failing_saves.store(count, Ordering::SeqCst);
        }

        /// Number of successful saves
        pub fn save_count(&self) -> u32 {
            self.save_count.load(Ordering::SeqCst)
        }

        pub async fn len(&self) -> usize {
            self.requests.read().await.len()
        }

        pub async fn is_empty(&self) -> bool {
            self.requests.read().await.is_empty()
        }

        fn take_failure(&self) -> bool {
            self.failing_saves
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
        }
    }

    impl DomainPort for InMemoryRequestStore {}

    #[async_trait]
    impl HealthCheckable for InMemoryRequestStore {
        async fn health_check(&self) -> HealthCheckResult {
            HealthCheckResult {
                adapter_id: "in-memory-request-store".to_string(),
                status: AdapterHealth::Healthy,
                latency_ms: 0,
                message: Some("Mock adapter always healthy".to_string()),
                checked_at: Utc::now(),
            }
        }
    }

    #[async_trait]
    impl RequestStore for InMemoryRequestStore {
        async fn create(&self, request: &PolicyRequest) -> Result<(), PortError> {
            let mut requests = self.requests.write().await;
            if requests.contains_key(&request.id()) {
                return Err(PortError::conflict(format!("request {} already exists", request.id())));
            }
            requests.insert(request.id(), request.clone());
            Ok(())
        }

        async fn find_by_id(&self, id: RequestId) -> Result<Option<PolicyRequest>, PortError> {
            Ok(self.requests.read().await.get(&id).cloned())
        }

        async fn find_by_customer_id(
            &self,
            customer_id: CustomerId,
        ) -> Result<Vec<PolicyRequest>, PortError> {
            let mut found: Vec<_> = self
                .requests
                .read()
                .await
                .values()
                .filter(|r| r.customer_id() == customer_id)
                .cloned()
                .collect();
            found.sort_by_key(|r| r.created_at());
            Ok(found)
        }

        async fn save(
            &self,
            request: &PolicyRequest,
            expected_prior: RequestStatus,
        ) -> Result<(), PortError> {
            if self.take_failure() {
                return Err(PortError::connection("injected save failure"));
            }

            let mut requests = self.requests.write().await;
            let stored = requests
                .get(&request.id())
                .ok_or_else(|| PortError::not_found("PolicyRequest", request.id()))?;
            if stored.status() != expected_prior {
                return Err(PortError::conflict(format!(
                    "request {} is {} but {} was expected",
                    request.id(),
                    stored.status(),
                    expected_prior
                )));
            }
            requests.insert(request.id(), request.clone());
            self.save_count.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn exists_active_by_customer_id(
            &self,
            customer_id: CustomerId,
        ) -> Result<bool, PortError> {
            Ok(self
                .requests
                .read()
                .await
                .values()
                .any(|r| r.customer_id() == customer_id && r.finished_at().is_none()))
        }
    }

    /// Publisher that keeps every event in memory
    #[derive(Debug, Default, Clone)]
    pub struct RecordingEventPublisher {
        events: Arc<RwLock<Vec<RequestEvent>>>,
        failing: Arc<AtomicBool>,
    }

    impl RecordingEventPublisher {
        pub fn new() -> Self {
            Self::default()
        }

        /// Makes every publish fail until reset
        pub fn set_failing(&self, failing: bool) {
            self.failing.store(failing, Ordering::SeqCst);
        }

        pub async fn events(&self) -> Vec<RequestEvent> {
            self.events.read().await.clone()
        }

        pub async fn events_for(&self, id: RequestId) -> Vec<RequestEvent> {
            self.events
                .read()
                .await
                .iter()
                .filter(|e| e.request_id() == id)
                .cloned()
                .collect()
        }
    }

    impl DomainPort for RecordingEventPublisher {}

    #[async_trait]
    impl EventPublisher for RecordingEventPublisher {
        async fn publish(&self, event: &RequestEvent) -> Result<(), PortError> {
            if self.failing.load(Ordering::SeqCst) {
                return Err(PortError::service_unavailable("recording publisher"));
            }
            self.events.write().await.push(event.clone());
            Ok(())
        }
    }
}
