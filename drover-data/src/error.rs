use thiserror::Error;

/// Error types for store operations.
/// These are used by the data layer and by everything built on top of it.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Invalid status value: {0}. Valid values: NOT_STARTED, EXECUTING, FINISHED, ERROR, UNKNOWN")]
    InvalidStatus(String),

    #[error("Invalid visibility value: {0}. Valid values: PUBLIC, PRIVATE")]
    InvalidVisibility(String),

    #[error("Invalid domain payload: {0}")]
    InvalidExtension(String),

    #[error("Task has no id")]
    MissingTaskId,
}

pub type Result<T> = std::result::Result<T, StoreError>;
