//! Policy request repository
//!
//! Rows live in `policy_requests`; the status trail lives in
//! `policy_request_history`, keyed by `(request_id, seq)` with `seq`
//! starting at 1. History is append-only: updates only ever insert the
//! entries beyond what is already stored.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, Transaction};
use tracing::debug;
use uuid::Uuid;

use crate::error::DatabaseError;

const SELECT_REQUEST: &str = r#"
    SELECT
        id,
        customer_id,
        product_id,
        category,
        sales_channel,
        payment_method,
        total_monthly_premium_amount,
        insured_amount,
        coverages,
        assistances,
        status,
        classification,
        created_at,
        finished_at,
        version
    FROM policy_requests
"#;

/// Terminal statuses, kept in step with the domain lifecycle
const TERMINAL_STATUSES: [&str; 3] = ["REJECTED", "APPROVED", "CANCELLED"];

/// Repository for policy requests and their status history
#[derive(Debug, Clone)]
pub struct PolicyRequestRepository {
    pool: PgPool,
}

impl PolicyRequestRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Inserts a request row together with its initial history
    ///
    /// # Errors
    ///
    /// `DatabaseError::DuplicateEntry` if the id is already taken
    pub async fn insert(
        &self,
        row: &PolicyRequestRow,
        history: &[HistoryRow],
    ) -> Result<(), DatabaseError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO policy_requests (
                id, customer_id, product_id, category, sales_channel, payment_method,
                total_monthly_premium_amount, insured_amount, coverages, assistances,
                status, classification, created_at, finished_at, version
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            "#,
        )
        .bind(row.id)
        .bind(row.customer_id)
        .bind(&row.product_id)
        .bind(&row.category)
        .bind(&row.sales_channel)
        .bind(&row.payment_method)
        .bind(row.total_monthly_premium_amount)
        .bind(row.insured_amount)
        .bind(&row.coverages)
        .bind(&row.assistances)
        .bind(&row.status)
        .bind(&row.classification)
        .bind(row.created_at)
        .bind(row.finished_at)
        .bind(row.version)
        .execute(&mut *tx)
        .await?;

        insert_history(&mut tx, history).await?;
        tx.commit().await?;

        debug!(request_id = %row.id, "Inserted policy request");
        Ok(())
    }

    /// Loads a request and its full history
    pub async fn get_by_id(&self, id: Uuid) -> Result<Option<RequestWithHistory>, DatabaseError> {
        let row = sqlx::query_as::<_, PolicyRequestRow>(&format!("{SELECT_REQUEST} WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        let Some(request) = row else {
            return Ok(None);
        };

        let history = sqlx::query_as::<_, HistoryRow>(
            r#"
            SELECT request_id, seq, status, recorded_at, note
            FROM policy_request_history
            WHERE request_id = $1
            ORDER BY seq
            "#,
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;

        Ok(Some(RequestWithHistory { request, history }))
    }

    /// All requests of a customer with their histories, oldest first
    pub async fn find_by_customer(
        &self,
        customer_id: Uuid,
    ) -> Result<Vec<RequestWithHistory>, DatabaseError> {
        let rows = sqlx::query_as::<_, PolicyRequestRow>(&format!(
            "{SELECT_REQUEST} WHERE customer_id = $1 ORDER BY created_at, id"
        ))
        .bind(customer_id)
        .fetch_all(&self.pool)
        .await?;

        if rows.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();
        let history = sqlx::query_as::<_, HistoryRow>(
            r#"
            SELECT request_id, seq, status, recorded_at, note
            FROM policy_request_history
            WHERE request_id = ANY($1)
            ORDER BY request_id, seq
            "#,
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?;

        let mut by_request: HashMap<Uuid, Vec<HistoryRow>> = HashMap::new();
        for entry in history {
            by_request.entry(entry.request_id).or_default().push(entry);
        }

        Ok(rows
            .into_iter()
            .map(|request| {
                let history = by_request.remove(&request.id).unwrap_or_default();
                RequestWithHistory { request, history }
            })
            .collect())
    }

    /// Writes the mutable columns if the stored status equals `expected_status`
    ///
    /// History entries whose `seq` is beyond the stored maximum are appended
    /// in the same transaction.
    ///
    /// # Errors
    ///
    /// - `DatabaseError::NotFound` if no row has this id
    /// - `DatabaseError::Conflict` if the stored status differs
    pub async fn update_if_status(
        &self,
        row: &PolicyRequestRow,
        expected_status: &str,
        history: &[HistoryRow],
    ) -> Result<(), DatabaseError> {
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            r#"
            UPDATE policy_requests
            SET status = $3,
                classification = $4,
                finished_at = $5,
                version = $6
            WHERE id = $1 AND status = $2
            "#,
        )
        .bind(row.id)
        .bind(expected_status)
        .bind(&row.status)
        .bind(&row.classification)
        .bind(row.finished_at)
        .bind(row.version)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if updated == 0 {
            let current: Option<String> =
                sqlx::query_scalar("SELECT status FROM policy_requests WHERE id = $1")
                    .bind(row.id)
                    .fetch_optional(&mut *tx)
                    .await?;
            tx.rollback().await?;

            return Err(match current {
                None => DatabaseError::not_found("PolicyRequest", row.id),
                Some(status) => DatabaseError::conflict(format!(
                    "request {} is {} but {} was expected",
                    row.id, status, expected_status
                )),
            });
        }

        let stored: i32 = sqlx::query_scalar(
            "SELECT COALESCE(MAX(seq), 0) FROM policy_request_history WHERE request_id = $1",
        )
        .bind(row.id)
        .fetch_one(&mut *tx)
        .await?;

        let appended: Vec<HistoryRow> = history.iter().filter(|h| h.seq > stored).cloned().collect();
        insert_history(&mut tx, &appended).await?;
        tx.commit().await?;

        debug!(
            request_id = %row.id,
            status = %row.status,
            appended = appended.len(),
            "Updated policy request"
        );
        Ok(())
    }

    /// True if the customer has a request outside the terminal statuses
    pub async fn exists_active_by_customer(&self, customer_id: Uuid) -> Result<bool, DatabaseError> {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM policy_requests
                WHERE customer_id = $1 AND status <> ALL($2)
            )
            "#,
        )
        .bind(customer_id)
        .bind(&TERMINAL_STATUSES[..])
        .fetch_one(&self.pool)
        .await?;

        Ok(exists)
    }
}

async fn insert_history(
    tx: &mut Transaction<'_, Postgres>,
    history: &[HistoryRow],
) -> Result<(), DatabaseError> {
    for entry in history {
        sqlx::query(
            r#"
            INSERT INTO policy_request_history (request_id, seq, status, recorded_at, note)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(entry.request_id)
        .bind(entry.seq)
        .bind(&entry.status)
        .bind(entry.recorded_at)
        .bind(&entry.note)
        .execute(&mut **tx)
        .await?;
    }
    Ok(())
}

// ============================================================================
// Row types
// ============================================================================

/// Row in `policy_requests`
///
/// Enumerations are stored by their wire names.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct PolicyRequestRow {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub product_id: String,
    pub category: String,
    pub sales_channel: String,
    pub payment_method: String,
    pub total_monthly_premium_amount: Decimal,
    pub insured_amount: Decimal,
    pub coverages: Json<BTreeMap<String, Decimal>>,
    pub assistances: Json<Vec<String>>,
    pub status: String,
    pub classification: Option<String>,
    pub created_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub version: i32,
}

/// Row in `policy_request_history`
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct HistoryRow {
    pub request_id: Uuid,
    /// 1-based position in the trail
    pub seq: i32,
    pub status: String,
    pub recorded_at: DateTime<Utc>,
    pub note: String,
}

/// A request row with its ordered history
#[derive(Debug, Clone)]
pub struct RequestWithHistory {
    pub request: PolicyRequestRow,
    pub history: Vec<HistoryRow>,
}
