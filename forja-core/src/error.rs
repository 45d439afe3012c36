use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Infrastructure errors reported by a [`DataStore`](crate::DataStore).
///
/// The contract with the isolation layer is that backends report failures
/// as values, never by panicking: every error here is caught upstream and
/// converted into the safest empty/denied outcome.
#[derive(Error, Debug, Clone)]
pub enum StoreError {
    #[error("Unknown table: {0}")]
    UnknownTable(String),

    #[error("Invalid filter on column '{column}': {reason}")]
    InvalidFilter { column: String, reason: String },

    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Backend unavailable: {0}")]
    Unavailable(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
