//! Kernel error type
//!
//! Errors raised by the kernel itself, independent of any port. Today that
//! is limited to parsing identifiers received as text (message payloads,
//! configuration, operator input).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    /// Text that does not hold a UUID, with or without the display prefix
    #[error("Invalid {kind} identifier '{value}': {source}")]
    InvalidIdentifier {
        kind: &'static str,
        value: String,
        #[source]
        source: uuid::Error,
    },
}

impl CoreError {
    pub fn invalid_identifier(kind: &'static str, value: &str, source: uuid::Error) -> Self {
        CoreError::InvalidIdentifier {
            kind,
            value: value.to_string(),
            source,
        }
    }
}
