use thiserror::Error;

/// Errors that can occur within the scheduler engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Malformed or invalid input to `schedule`, rejected before any
    /// state mutation.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Job store failure (admission transaction, drain queries).
    #[error("Store error: {0}")]
    Store(#[from] drip_store::StoreError),

    /// Wake-timer persistence failure.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Outbound HTTP client could not be constructed.
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    /// A persisted timestamp failed to parse.
    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(#[from] chrono::ParseError),
}

pub type Result<T> = std::result::Result<T, EngineError>;
