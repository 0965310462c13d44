//! Deterministic classification gateway
//!
//! Answers from an injected customer table and a default. Used when no
//! fraud API is configured and as the gateway double in workflow tests.
//! Latency and a number of leading failures can be injected to exercise
//! timeouts and redelivery.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use core_kernel::{
    AdapterHealth, CustomerId, DomainPort, HealthCheckResult, HealthCheckable,
    OperationMetadata, PortError, RequestId,
};

use crate::classification::{ClassificationResult, Occurrence, OccurrenceType, RiskClassification};
use crate::ports::RiskClassificationGateway;

#[derive(Debug, Clone)]
pub struct StaticClassificationGateway {
    classifications: HashMap<CustomerId, RiskClassification>,
    default: RiskClassification,
    latency: Option<Duration>,
    failures_remaining: Arc<AtomicU32>,
    calls: Arc<AtomicU32>,
}

impl Default for StaticClassificationGateway {
    fn default() -> Self {
        Self::new(RiskClassification::Regular)
    }
}

impl StaticClassificationGateway {
    /// Every unknown customer gets `default`
    pub fn new(default: RiskClassification) -> Self {
        Self {
            classifications: HashMap::new(),
            default,
            latency: None,
            failures_remaining: Arc::new(AtomicU32::new(0)),
            calls: Arc::new(AtomicU32::new(0)),
        }
    }

    pub fn with_customer(mut self, customer_id: CustomerId, classification: RiskClassification) -> Self {
        self.classifications.insert(customer_id, classification);
        self
    }

    /// Sleeps this long before answering
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// The first `count` calls fail with `ServiceUnavailable`
    pub fn failing_times(self, count: u32) -> Self {
        self.failures_remaining.store(count, Ordering::SeqCst);
        self
    }

    /// Number of classify calls received, failed ones included
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    fn classification_for(&self, customer_id: &CustomerId) -> RiskClassification {
        self.classifications
            .get(customer_id)
            .copied()
            .unwrap_or(self.default)
    }
}

fn occurrences_for(classification: RiskClassification) -> Vec<Occurrence> {
    if classification != RiskClassification::HighRisk {
        return Vec::new();
    }
    let now = Utc::now();
    vec![
        Occurrence {
            id: Uuid::new_v4(),
            product_id: None,
            occurrence_type: OccurrenceType::Fraud,
            description: "Attempted fraud on a previous policy".to_string(),
            created_at: now,
            updated_at: now,
        },
        Occurrence {
            id: Uuid::new_v4(),
            product_id: None,
            occurrence_type: OccurrenceType::Suspicion,
            description: "Unusual claim frequency".to_string(),
            created_at: now,
            updated_at: now,
        },
    ]
}

impl DomainPort for StaticClassificationGateway {}

#[async_trait]
impl HealthCheckable for StaticClassificationGateway {
    async fn health_check(&self) -> HealthCheckResult {
        HealthCheckResult {
            adapter_id: "static-classification-gateway".to_string(),
            status: AdapterHealth::Healthy,
            latency_ms: 0,
            message: Some(format!("{} customers mapped", self.classifications.len())),
            checked_at: Utc::now(),
        }
    }
}

#[async_trait]
impl RiskClassificationGateway for StaticClassificationGateway {
    async fn classify(
        &self,
        request_id: RequestId,
        customer_id: CustomerId,
        _metadata: Option<OperationMetadata>,
    ) -> Result<ClassificationResult, PortError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        if self
            .failures_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(PortError::service_unavailable("static classification gateway"));
        }

        let classification = self.classification_for(&customer_id);
        Ok(ClassificationResult {
            request_id,
            customer_id,
            analyzed_at: Utc::now(),
            classification,
            occurrences: occurrences_for(classification),
        })
    }
}
