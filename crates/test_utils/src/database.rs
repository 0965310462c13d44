//! PostgreSQL for integration tests
//!
//! Each [`TestDatabase`] owns a throwaway container with the request store
//! and workflow message schema applied. The container stops when the value is dropped, so keep
//! it alive for the whole test.

use std::error::Error;
use std::time::Duration;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use testcontainers::{runners::AsyncRunner, ContainerAsync, ImageExt};
use testcontainers_modules::postgres::Postgres;
use uuid::Uuid;

const IMAGE_TAG: &str = "16-alpine";
const DATABASE: &str = "policy_requests_test";
const CREDENTIAL: &str = "workflow";

const SCHEMA: [&str; 2] = [
    include_str!("../../../migrations/20240101_000001_policy_requests.sql"),
    include_str!("../../../migrations/20240101_000002_workflow_messages.sql"),
];

pub type TestDbResult<T> = Result<T, Box<dyn Error + Send + Sync>>;

pub struct TestDatabase {
    _container: ContainerAsync<Postgres>,
    url: String,
    pool: PgPool,
}

impl TestDatabase {
    /// Starts a container and applies the schema
    pub async fn start() -> TestDbResult<Self> {
        let container = Postgres::default()
            .with_db_name(DATABASE)
            .with_user(CREDENTIAL)
            .with_password(CREDENTIAL)
            .with_tag(IMAGE_TAG)
            .start()
            .await?;

        let host = container.get_host().await?;
        let port = container.get_host_port_ipv4(5432).await?;
        let url = format!(
            "postgres://{user}:{user}@{host}:{port}/{DATABASE}",
            user = CREDENTIAL
        );

        // Racing writers in the concurrency tests each hold a connection.
        let pool = PgPoolOptions::new()
            .max_connections(8)
            .acquire_timeout(Duration::from_secs(20))
            .connect(&url)
            .await?;
        for migration in SCHEMA {
            sqlx::raw_sql(migration).execute(&pool).await?;
        }

        Ok(Self {
            _container: container,
            url,
            pool,
        })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Rows in the status history for one request, read straight from the table
    pub async fn history_rows(&self, request_id: Uuid) -> TestDbResult<i64> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM policy_request_history WHERE request_id = $1",
        )
        .bind(request_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    /// Empties every table, keeping the schema
    pub async fn truncate(&self) -> TestDbResult<()> {
        sqlx::raw_sql("TRUNCATE policy_request_history, policy_requests, workflow_messages")
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
