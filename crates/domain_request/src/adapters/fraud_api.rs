//! Fraud API Gateway
//!
//! REST adapter for the external fraud/risk classification service. It
//! implements [`RiskClassificationGateway`] by calling
//! `GET {base_url}/fraud-check/{request_id}?customerId={customer_id}`.
//!
//! # Error Handling
//!
//! Responses are mapped to `PortError` variants:
//! - 404 -> `PortError::NotFound`
//! - 401/403 -> `PortError::Unauthorized`
//! - 429 -> `PortError::RateLimited`
//! - 5xx -> `PortError::ServiceUnavailable`
//! - Timeouts -> `PortError::Timeout`
//! - Unreadable body -> `PortError::Transformation`
//!
//! Transient failures count against a circuit breaker. While it is open,
//! calls fail fast with `ServiceUnavailable` and no request is sent.

use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Client, StatusCode};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, instrument, warn};

use core_kernel::{
    AdapterHealth, CircuitBreakerConfig, CustomerId, DomainPort, HealthCheckResult,
    HealthCheckable, OperationMetadata, PortError, RequestId,
};

use crate::classification::ClassificationResult;
use crate::ports::RiskClassificationGateway;

const SERVICE_NAME: &str = "fraud-api";

/// Configuration for the fraud API adapter
#[derive(Debug, Clone)]
pub struct FraudApiConfig {
    /// Base URL of the API (e.g., "https://fraud.example.com/api/v1")
    pub base_url: String,

    /// Sent as a bearer token when present
    pub api_key: Option<String>,

    /// Per-request timeout in milliseconds
    pub timeout_ms: u64,

    pub circuit_breaker: Option<CircuitBreakerConfig>,
}

impl Default for FraudApiConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            api_key: None,
            timeout_ms: 2000,
            circuit_breaker: Some(CircuitBreakerConfig {
                failure_threshold: 5,
                success_threshold: 1,
                reset_timeout_secs: 30,
            }),
        }
    }
}

#[derive(Debug)]
struct CircuitBreaker {
    config: CircuitBreakerConfig,
    failure_count: AtomicU64,
    success_count: AtomicU64,
    is_open: AtomicBool,
    opened_at: RwLock<Option<Instant>>,
}

impl CircuitBreaker {
    fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            failure_count: AtomicU64::new(0),
            success_count: AtomicU64::new(0),
            is_open: AtomicBool::new(false),
            opened_at: RwLock::new(None),
        }
    }

    async fn is_available(&self) -> bool {
        if !self.is_open.load(Ordering::Relaxed) {
            return true;
        }

        // Half-open once the reset timeout has elapsed
        match *self.opened_at.read().await {
            Some(time) => time.elapsed() > Duration::from_secs(self.config.reset_timeout_secs),
            None => true,
        }
    }

    fn record_success(&self) {
        self.failure_count.store(0, Ordering::Relaxed);
        if !self.is_open.load(Ordering::Relaxed) {
            return;
        }
        let success = self.success_count.fetch_add(1, Ordering::Relaxed) + 1;
        if success >= self.config.success_threshold as u64 {
            self.is_open.store(false, Ordering::Relaxed);
            self.success_count.store(0, Ordering::Relaxed);
        }
    }

    async fn record_failure(&self) {
        self.success_count.store(0, Ordering::Relaxed);
        let failures = self.failure_count.fetch_add(1, Ordering::Relaxed) + 1;
        if failures >= self.config.failure_threshold as u64 {
            self.is_open.store(true, Ordering::Relaxed);
            *self.opened_at.write().await = Some(Instant::now());
        }
    }
}

/// HTTP adapter for the fraud classification API
#[derive(Debug, Clone)]
pub struct FraudApiGateway {
    client: Client,
    config: FraudApiConfig,
    circuit_breaker: Option<Arc<CircuitBreaker>>,
}

impl FraudApiGateway {
    /// Creates the adapter and its HTTP client
    ///
    /// # Errors
    ///
    /// Returns `PortError::Internal` if the HTTP client cannot be built
    pub fn new(config: FraudApiConfig) -> Result<Self, PortError> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| PortError::Internal {
                message: "failed to build fraud API client".to_string(),
                source: Some(Box::new(e)),
            })?;
        let circuit_breaker = config
            .circuit_breaker
            .clone()
            .map(|cb| Arc::new(CircuitBreaker::new(cb)));

        Ok(Self {
            client,
            config,
            circuit_breaker,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    /// Checks if the circuit breaker is open (blocking requests)
    pub async fn is_circuit_open(&self) -> bool {
        match self.circuit_breaker {
            Some(ref cb) => !cb.is_available().await,
            None => false,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), path)
    }

    fn map_transport_error(&self, error: reqwest::Error) -> PortError {
        if error.is_timeout() {
            PortError::timeout("fraud-check", self.config.timeout_ms)
        } else {
            PortError::Connection {
                message: format!("fraud API request failed: {}", error),
                source: Some(Box::new(error)),
            }
        }
    }

    async fn fetch_classification(
        &self,
        request_id: RequestId,
        customer_id: CustomerId,
        metadata: Option<OperationMetadata>,
    ) -> Result<ClassificationResult, PortError> {
        let mut request = self
            .client
            .get(self.url(&format!("fraud-check/{}", request_id.as_uuid())))
            .query(&[("customerId", customer_id.as_uuid().to_string())]);
        if let Some(ref key) = self.config.api_key {
            request = request.bearer_auth(key);
        }
        if let Some(correlation_id) = metadata.and_then(|m| m.correlation_id) {
            request = request.header("X-Correlation-Id", correlation_id);
        }

        let response = request
            .send()
            .await
            .map_err(|e| self.map_transport_error(e))?;

        match response.status() {
            status if status.is_success() => response
                .json::<ClassificationResult>()
                .await
                .map_err(|e| PortError::transformation(format!("invalid fraud API response: {}", e))),
            StatusCode::NOT_FOUND => Err(PortError::not_found("FraudCheck", request_id)),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(PortError::Unauthorized {
                message: format!("fraud API refused credentials ({})", response.status()),
            }),
            StatusCode::TOO_MANY_REQUESTS => {
                let retry_after_secs = response
                    .headers()
                    .get(reqwest::header::RETRY_AFTER)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(1);
                Err(PortError::RateLimited { retry_after_secs })
            }
            status if status.is_server_error() => Err(PortError::service_unavailable(format!(
                "{} answered {}",
                SERVICE_NAME, status
            ))),
            status => Err(PortError::internal(format!(
                "unexpected fraud API status {}",
                status
            ))),
        }
    }
}

impl DomainPort for FraudApiGateway {}

#[async_trait]
impl HealthCheckable for FraudApiGateway {
    async fn health_check(&self) -> HealthCheckResult {
        let start = Instant::now();

        if self.is_circuit_open().await {
            return HealthCheckResult {
                adapter_id: "fraud-api-gateway".to_string(),
                status: AdapterHealth::Degraded,
                latency_ms: 0,
                message: Some("Circuit breaker is open".to_string()),
                checked_at: Utc::now(),
            };
        }

        let result = self.client.get(self.url("health")).send().await;
        let latency_ms = start.elapsed().as_millis() as u64;

        let (status, message) = match result {
            Ok(response) if response.status().is_success() => (AdapterHealth::Healthy, None),
            Ok(response) => (
                AdapterHealth::Unhealthy,
                Some(format!("health endpoint answered {}", response.status())),
            ),
            Err(e) => (AdapterHealth::Unhealthy, Some(format!("health check failed: {}", e))),
        };

        HealthCheckResult {
            adapter_id: "fraud-api-gateway".to_string(),
            status,
            latency_ms,
            message,
            checked_at: Utc::now(),
        }
    }
}

#[async_trait]
impl RiskClassificationGateway for FraudApiGateway {
    #[instrument(skip(self, metadata), fields(request_id = %request_id, customer_id = %customer_id))]
    async fn classify(
        &self,
        request_id: RequestId,
        customer_id: CustomerId,
        metadata: Option<OperationMetadata>,
    ) -> Result<ClassificationResult, PortError> {
        if let Some(ref cb) = self.circuit_breaker {
            if !cb.is_available().await {
                return Err(PortError::ServiceUnavailable {
                    service: "Circuit breaker is open".to_string(),
                });
            }
        }

        let result = self.fetch_classification(request_id, customer_id, metadata).await;

        if let Some(ref cb) = self.circuit_breaker {
            match &result {
                Ok(_) => cb.record_success(),
                Err(e) if e.is_transient() => {
                    warn!(error = %e, "fraud API call failed");
                    cb.record_failure().await;
                }
                Err(_) => {}
            }
        }

        if let Ok(ref classification) = result {
            debug!(
                classification = %classification.classification,
                occurrences = classification.occurrences.len(),
                "Classification received"
            );
        }
        result
    }
}
