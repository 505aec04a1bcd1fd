pub mod audit;
pub mod cards;
pub mod study;

use thiserror::Error;

use crate::db::StoreError;

/// Domain errors surfaced to callers. Storage errors are classified at this
/// boundary and never leak upward except inside `Internal`.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    InvalidInput(String),
    #[error("{0}")]
    AlreadyExists(String),
    #[error("{0}")]
    Timeout(String),
    #[error("internal error: {0}")]
    Internal(#[source] StoreError),
}

impl ServiceError {
    pub fn code(&self) -> &'static str {
        match self {
            ServiceError::NotFound(_) => "NOT_FOUND",
            ServiceError::InvalidInput(_) => "INVALID_INPUT",
            ServiceError::AlreadyExists(_) => "ALREADY_EXISTS",
            ServiceError::Timeout(_) => "TIMEOUT",
            ServiceError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        ServiceError::InvalidInput(message.into())
    }
}

impl From<StoreError> for ServiceError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => ServiceError::NotFound("record not found".to_string()),
            StoreError::Duplicate => ServiceError::AlreadyExists("record already exists".to_string()),
            StoreError::LockTimeout => {
                ServiceError::Timeout("timed out waiting for a database lock".to_string())
            }
            other => ServiceError::Internal(other),
        }
    }
}
