//! PostgreSQL Request Store
//!
//! Implements the `RequestStore` port on top of [`PolicyRequestRepository`],
//! translating between the aggregate and its row representation. Loaded
//! rows go through `PolicyRequest::restore`, so a corrupted history surfaces
//! as a transformation error rather than an inconsistent aggregate.
//!
//! # Example
//!
//! ```rust,ignore
//! use infra_db::adapters::PostgresRequestStore;
//! use domain_request::RequestStore;
//! use std::sync::Arc;
//!
//! let store: Arc<dyn RequestStore> = Arc::new(PostgresRequestStore::new(pool));
//! let request = store.find_by_id(request_id).await?;
//! ```

use async_trait::async_trait;
use chrono::Utc;
use sqlx::types::Json;
use sqlx::PgPool;
use tracing::{debug, instrument};
use uuid::Uuid;

use core_kernel::{
    AdapterHealth, CustomerId, DomainPort, HealthCheckResult, HealthCheckable, PortError, RequestId,
};
use domain_request::{
    PolicyRequest, PolicyRequestParts, RequestError, RequestStatus, RequestStore,
    StatusHistoryEntry,
};

use crate::repositories::request::{
    HistoryRow, PolicyRequestRepository, PolicyRequestRow, RequestWithHistory,
};

const ADAPTER_ID: &str = "postgres-request-store";

/// PostgreSQL-backed implementation of [`RequestStore`]
#[derive(Debug, Clone)]
pub struct PostgresRequestStore {
    repository: PolicyRequestRepository,
}

impl PostgresRequestStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            repository: PolicyRequestRepository::new(pool),
        }
    }

    /// Returns a reference to the underlying repository
    pub fn repository(&self) -> &PolicyRequestRepository {
        &self.repository
    }
}

impl DomainPort for PostgresRequestStore {}

#[async_trait]
impl HealthCheckable for PostgresRequestStore {
    async fn health_check(&self) -> HealthCheckResult {
        let start = std::time::Instant::now();

        let result = sqlx::query_scalar::<_, i32>("SELECT 1")
            .fetch_one(self.repository.pool())
            .await;

        let latency_ms = start.elapsed().as_millis() as u64;

        let (status, message) = match result {
            Ok(_) => (AdapterHealth::Healthy, None),
            Err(e) => (AdapterHealth::Unhealthy, Some(format!("Database error: {}", e))),
        };

        HealthCheckResult {
            adapter_id: ADAPTER_ID.to_string(),
            status,
            latency_ms,
            message,
            checked_at: Utc::now(),
        }
    }
}

#[async_trait]
impl RequestStore for PostgresRequestStore {
    #[instrument(skip(self, request), fields(request_id = %request.id()))]
    async fn create(&self, request: &PolicyRequest) -> Result<(), PortError> {
        let row = to_row(request)?;
        let history = history_rows(request)?;
        self.repository.insert(&row, &history).await?;
        Ok(())
    }

    #[instrument(skip(self), fields(request_id = %id))]
    async fn find_by_id(&self, id: RequestId) -> Result<Option<PolicyRequest>, PortError> {
        debug!("Loading policy request");
        self.repository
            .get_by_id(id.into())
            .await?
            .map(from_rows)
            .transpose()
    }

    #[instrument(skip(self), fields(customer_id = %customer_id))]
    async fn find_by_customer_id(
        &self,
        customer_id: CustomerId,
    ) -> Result<Vec<PolicyRequest>, PortError> {
        self.repository
            .find_by_customer(customer_id.into())
            .await?
            .into_iter()
            .map(from_rows)
            .collect()
    }

    #[instrument(skip(self, request), fields(request_id = %request.id(), from = %expected_prior, to = %request.status()))]
    async fn save(
        &self,
        request: &PolicyRequest,
        expected_prior: RequestStatus,
    ) -> Result<(), PortError> {
        let row = to_row(request)?;
        let history = history_rows(request)?;
        self.repository
            .update_if_status(&row, expected_prior.as_str(), &history)
            .await?;
        Ok(())
    }

    async fn exists_active_by_customer_id(&self, customer_id: CustomerId) -> Result<bool, PortError> {
        Ok(self
            .repository
            .exists_active_by_customer(customer_id.into())
            .await?)
    }
}

// ============================================================================
// Row mapping
// ============================================================================

fn to_row(request: &PolicyRequest) -> Result<PolicyRequestRow, PortError> {
    let version = i32::try_from(request.version())
        .map_err(|_| PortError::transformation(format!("version {} out of range", request.version())))?;

    Ok(PolicyRequestRow {
        id: request.id().into(),
        customer_id: request.customer_id().into(),
        product_id: request.product_id().to_string(),
        category: request.category().as_str().to_string(),
        sales_channel: request.sales_channel().to_string(),
        payment_method: request.payment_method().to_string(),
        total_monthly_premium_amount: request.total_monthly_premium_amount(),
        insured_amount: request.insured_amount(),
        coverages: Json(request.coverages().clone()),
        assistances: Json(request.assistances().to_vec()),
        status: request.status().as_str().to_string(),
        classification: request.classification().map(|c| c.as_str().to_string()),
        created_at: request.created_at(),
        finished_at: request.finished_at(),
        version,
    })
}

fn history_rows(request: &PolicyRequest) -> Result<Vec<HistoryRow>, PortError> {
    let request_id: Uuid = request.id().into();
    request
        .history()
        .iter()
        .enumerate()
        .map(|(index, entry)| {
            let seq = i32::try_from(index + 1)
                .map_err(|_| PortError::transformation("history too long"))?;
            Ok(HistoryRow {
                request_id,
                seq,
                status: entry.status.as_str().to_string(),
                recorded_at: entry.timestamp,
                note: entry.note.clone(),
            })
        })
        .collect()
}

fn from_rows(data: RequestWithHistory) -> Result<PolicyRequest, PortError> {
    let RequestWithHistory { request: row, history } = data;
    let id = row.id;
    let corrupt = |e: RequestError| {
        PortError::transformation(format!("stored request {} is invalid: {}", id, e))
    };

    let history = history
        .into_iter()
        .map(|h| {
            Ok(StatusHistoryEntry {
                status: h.status.parse().map_err(corrupt)?,
                timestamp: h.recorded_at,
                note: h.note,
            })
        })
        .collect::<Result<Vec<_>, PortError>>()?;

    let parts = PolicyRequestParts {
        id: RequestId::from(row.id),
        customer_id: CustomerId::from(row.customer_id),
        product_id: row.product_id,
        category: row.category.parse().map_err(corrupt)?,
        sales_channel: row.sales_channel,
        payment_method: row.payment_method,
        total_monthly_premium_amount: row.total_monthly_premium_amount,
        insured_amount: row.insured_amount,
        coverages: row.coverages.0,
        assistances: row.assistances.0,
        status: row.status.parse().map_err(corrupt)?,
        classification: row
            .classification
            .as_deref()
            .map(str::parse)
            .transpose()
            .map_err(corrupt)?,
        created_at: row.created_at,
        finished_at: row.finished_at,
        history,
        version: u32::try_from(row.version)
            .map_err(|_| PortError::transformation(format!("negative version on {}", id)))?,
    };

    PolicyRequest::restore(parts).map_err(corrupt)
}
