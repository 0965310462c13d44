//! Infrastructure Database Layer
//!
//! PostgreSQL persistence for policy requests and for the workflow's event
//! channel, using SQLx.
//!
//! # Architecture
//!
//! The crate follows the repository pattern: `repositories` holds the SQL
//! and row types, `adapters` implements the domain's `RequestStore` port on
//! top of them.
//!
//! # Concurrency
//!
//! Every state write is conditioned on the status the writer read. The
//! update and the history append happen in one transaction, so a lost race
//! leaves no partial history behind.
//!
//! # Event channel
//!
//! [`PostgresEventChannel`] queues messages in `workflow_messages`. Claims
//! use `FOR UPDATE SKIP LOCKED`, so several worker processes can share one
//! database.
//!
//! # Example
//!
//! ```rust,ignore
//! use infra_db::{create_pool, run_migrations, DatabaseConfig, PostgresRequestStore};
//!
//! let pool = create_pool(DatabaseConfig::new("postgres://localhost/policy_requests")).await?;
//! run_migrations(&pool).await?;
//! let store = PostgresRequestStore::new(pool);
//! ```

pub mod pool;
pub mod error;
pub mod repositories;
pub mod adapters;

pub use pool::{create_pool, run_migrations, DatabaseConfig, DatabasePool};
pub use error::DatabaseError;
pub use adapters::{PostgresChannelConfig, PostgresEventChannel, PostgresRequestStore};
