//! Workflow message repository
//!
//! Rows live in `workflow_messages`. Workers claim ready rows with
//! `FOR UPDATE SKIP LOCKED`, so concurrent workers, in this process or in
//! another one, never receive the same row at the same time.

use std::time::Duration;

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::debug;
use uuid::Uuid;

use crate::error::DatabaseError;

/// Repository for queued workflow messages
#[derive(Debug, Clone)]
pub struct MessageRepository {
    pool: PgPool,
}

impl MessageRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn insert(&self, row: &MessageRow) -> Result<(), DatabaseError> {
        sqlx::query(
            r#"
            INSERT INTO workflow_messages (id, topic, payload, attempt, last_error, published_at, available_at)
            VALUES ($1, $2, $3, $4, $5, $6, $6)
            "#,
        )
        .bind(row.id)
        .bind(&row.topic)
        .bind(&row.payload)
        .bind(row.attempt)
        .bind(&row.last_error)
        .bind(row.published_at)
        .execute(&self.pool)
        .await?;

        debug!(message_id = %row.id, topic = %row.topic, "Inserted workflow message");
        Ok(())
    }

    /// Claims the oldest ready message on `topic`
    ///
    /// The claim counts as a delivery attempt and hides the row for
    /// `visibility` unless it is acknowledged, rescheduled or dead-lettered
    /// first.
    pub async fn claim_next(
        &self,
        topic: &str,
        visibility: Duration,
    ) -> Result<Option<MessageRow>, DatabaseError> {
        let row = sqlx::query_as::<_, MessageRow>(
            r#"
            UPDATE workflow_messages AS m
            SET attempt = m.attempt + 1,
                available_at = now() + make_interval(secs => $2)
            FROM (
                SELECT id FROM workflow_messages
                WHERE topic = $1 AND acked_at IS NULL AND available_at <= now()
                ORDER BY available_at, published_at
                LIMIT 1
                FOR UPDATE SKIP LOCKED
            ) AS ready
            WHERE m.id = ready.id
            RETURNING m.id, m.topic, m.payload, m.attempt, m.last_error, m.published_at
            "#,
        )
        .bind(topic)
        .bind(visibility.as_secs_f64())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    pub async fn ack(&self, id: Uuid) -> Result<(), DatabaseError> {
        let updated = sqlx::query(
            "UPDATE workflow_messages SET acked_at = now() WHERE id = $1 AND acked_at IS NULL",
        )
        .bind(id)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if updated == 0 {
            return Err(DatabaseError::not_found("WorkflowMessage", id));
        }
        Ok(())
    }

    /// Makes a claimed message ready again after `delay`
    pub async fn reschedule(
        &self,
        id: Uuid,
        delay: Duration,
        last_error: &str,
    ) -> Result<(), DatabaseError> {
        let updated = sqlx::query(
            r#"
            UPDATE workflow_messages
            SET available_at = now() + make_interval(secs => $2),
                last_error = $3
            WHERE id = $1 AND acked_at IS NULL
            "#,
        )
        .bind(id)
        .bind(delay.as_secs_f64())
        .bind(last_error)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if updated == 0 {
            return Err(DatabaseError::not_found("WorkflowMessage", id));
        }
        Ok(())
    }

    /// Moves a claimed message onto `dead_letter_topic`, ready immediately
    ///
    /// The attempt count is kept so the dead letter shows how many
    /// deliveries failed.
    pub async fn dead_letter(
        &self,
        id: Uuid,
        dead_letter_topic: &str,
        last_error: &str,
    ) -> Result<(), DatabaseError> {
        let updated = sqlx::query(
            r#"
            UPDATE workflow_messages
            SET topic = $2,
                last_error = $3,
                available_at = now()
            WHERE id = $1 AND acked_at IS NULL
            "#,
        )
        .bind(id)
        .bind(dead_letter_topic)
        .bind(last_error)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if updated == 0 {
            return Err(DatabaseError::not_found("WorkflowMessage", id));
        }
        Ok(())
    }

    /// Unacknowledged messages on `topic`, oldest first
    pub async fn list_unacked(&self, topic: &str) -> Result<Vec<MessageRow>, DatabaseError> {
        let rows = sqlx::query_as::<_, MessageRow>(
            r#"
            SELECT id, topic, payload, attempt, last_error, published_at
            FROM workflow_messages
            WHERE topic = $1 AND acked_at IS NULL
            ORDER BY published_at, id
            "#,
        )
        .bind(topic)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    pub async fn count_unacked(&self, topics: &[String]) -> Result<i64, DatabaseError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM workflow_messages WHERE topic = ANY($1) AND acked_at IS NULL",
        )
        .bind(topics)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    /// Deletes messages acknowledged before `cutoff`
    pub async fn purge_acked_before(&self, cutoff: DateTime<Utc>) -> Result<u64, DatabaseError> {
        let deleted = sqlx::query("DELETE FROM workflow_messages WHERE acked_at < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await?
            .rows_affected();

        Ok(deleted)
    }
}

/// Row in `workflow_messages`, as handed to a consumer
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct MessageRow {
    pub id: Uuid,
    pub topic: String,
    pub payload: serde_json::Value,
    /// Deliveries attempted, including the one in progress after a claim
    pub attempt: i32,
    pub last_error: Option<String>,
    pub published_at: DateTime<Utc>,
}
