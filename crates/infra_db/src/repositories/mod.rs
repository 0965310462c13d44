//! Repository implementations
//!
//! Repositories own the SQL and the row types. They know nothing about the
//! domain aggregate; adapters map rows to domain values.

pub mod message;
pub mod request;

pub use message::{MessageRepository, MessageRow};
pub use request::{HistoryRow, PolicyRequestRow, PolicyRequestRepository, RequestWithHistory};
