//! Domain Adapters
//!
//! Implementations of domain and messaging ports backed by PostgreSQL.
//!
//! ```rust,ignore
//! use infra_db::adapters::PostgresRequestStore;
//! use domain_request::RequestStore;
//!
//! let store = PostgresRequestStore::new(pool);
//! let request = store.find_by_id(request_id).await?;
//! ```

pub mod channel;
pub mod request;

pub use channel::{PostgresChannelConfig, PostgresEventChannel};
pub use request::PostgresRequestStore;
