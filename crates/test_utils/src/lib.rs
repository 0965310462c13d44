//! Shared test support for the policy request workspace
//!
//! Builders and fixtures produce requests in any lifecycle status without
//! walking them through the workflow. `assertions` checks the lifecycle
//! invariants with failure messages that print the history. `database`
//! starts a disposable PostgreSQL for the store's integration tests.

pub mod assertions;
pub mod builders;
pub mod database;
pub mod fixtures;
pub mod generators;

pub use assertions::*;
pub use builders::*;
pub use database::{TestDatabase, TestDbResult};
pub use fixtures::*;
pub use generators::*;
