use thiserror::Error;

/// Errors that can occur within the job store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Underlying SQLite / rusqlite error.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// A job with this id already exists (admission must treat as duplicate).
    #[error("Job already exists: {id}")]
    JobExists { id: String },

    /// No job with the given id exists in the store.
    #[error("Job not found: {id}")]
    JobNotFound { id: String },

    /// Headers / body / response payload failed to (de)serialize.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, StoreError>;
