//! Database errors and their mapping onto [`PortError`]
//!
//! | PostgreSQL / SQLx                 | `DatabaseError`      | `PortError`      |
//! |-----------------------------------|----------------------|------------------|
//! | 23505 unique_violation            | `DuplicateEntry`     | `Conflict`       |
//! | 40001, 40P01                      | `Conflict`           | `Conflict`       |
//! | 23514 check_violation             | `ConstraintViolation`| `Internal`       |
//! | pool timeout / closed, I/O, TLS   | `ConnectionFailed`   | `Connection`     |
//! | column decode                     | `Decode`             | `Transformation` |
//! | anything else                     | `QueryFailed`        | `Internal`       |

use core_kernel::PortError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("Database connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    #[error("{entity} {id} does not exist")]
    NotFound { entity: &'static str, id: String },

    #[error("Duplicate key: {0}")]
    DuplicateEntry(String),

    /// Conditioned write lost, or PostgreSQL aborted the transaction
    #[error("Concurrent modification: {0}")]
    Conflict(String),

    #[error("Check constraint violated: {0}")]
    ConstraintViolation(String),

    #[error("Column could not be decoded: {0}")]
    Decode(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),
}

impl DatabaseError {
    pub fn not_found(entity: &'static str, id: impl std::fmt::Display) -> Self {
        DatabaseError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        DatabaseError::Conflict(message.into())
    }
}

impl From<sqlx::Error> for DatabaseError {
    fn from(error: sqlx::Error) -> Self {
        match &error {
            sqlx::Error::Database(db) => {
                let message = db.message().to_string();
                match db.code().as_deref() {
                    Some("23505") => DatabaseError::DuplicateEntry(message),
                    Some("23514") => DatabaseError::ConstraintViolation(message),
                    Some("40001") | Some("40P01") => DatabaseError::Conflict(message),
                    _ => DatabaseError::QueryFailed(message),
                }
            }
            sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::Io(_)
            | sqlx::Error::Tls(_) => DatabaseError::ConnectionFailed(error.to_string()),
            sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
                DatabaseError::Decode(error.to_string())
            }
            _ => DatabaseError::QueryFailed(error.to_string()),
        }
    }
}

impl From<DatabaseError> for PortError {
    fn from(e: DatabaseError) -> Self {
        match e {
            DatabaseError::NotFound { entity, id } => PortError::not_found(entity, id),
            DatabaseError::Conflict(msg) | DatabaseError::DuplicateEntry(msg) => {
                PortError::conflict(msg)
            }
            DatabaseError::ConnectionFailed(msg) => PortError::connection(msg),
            DatabaseError::Decode(msg) => PortError::transformation(msg),
            other => PortError::Internal {
                message: other.to_string(),
                source: Some(Box::new(other)),
            },
        }
    }
}
