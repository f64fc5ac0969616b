use thiserror::Error;

use drover_data::StoreError;

/// Error taxonomy for engine operations.
///
/// Validation and permission failures happen before anything is
/// persisted. `Inconsistent` marks the fatal cases: a status write
/// that targeted an unknown pairing, or a task persisted whose
/// dispatch job could not be submitted.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("{0}")]
    Validation(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Task '{0}' disappeared before it could be updated")]
    Vanished(String),

    #[error("{0}")]
    Inconsistent(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<rusqlite::Error> for EngineError {
    fn from(e: rusqlite::Error) -> Self {
        EngineError::Store(StoreError::Database(e))
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
