//! Error taxonomy for the collaboration session boundary

use crate::store::StoreError;

pub type CollabResult<T> = Result<T, CollabError>;

/// Errors surfaced to a connection as an `error` event
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum CollabError {
    /// Bad or missing credential. Terminates the connection.
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Valid identity, access denied
    #[error("Access denied: {0}")]
    Authorization(String),

    /// Malformed or inconsistent payload
    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// Store or transport failure
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CollabError {
    /// Stable code sent on the wire
    pub fn code(&self) -> &'static str {
        match self {
            CollabError::Authentication(_) => "AUTHENTICATION_FAILED",
            CollabError::Authorization(_) => "ACCESS_DENIED",
            CollabError::Validation(_) => "VALIDATION_FAILED",
            CollabError::NotFound(_) => "NOT_FOUND",
            CollabError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    pub fn terminates_connection(&self) -> bool {
        matches!(self, CollabError::Authentication(_))
    }
}

impl From<StoreError> for CollabError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(id) => CollabError::NotFound(format!("document {}", id)),
            StoreError::Forbidden(id) => CollabError::Authorization(format!("document {}", id)),
            StoreError::Unavailable(msg) => CollabError::Internal(msg),
        }
    }
}
