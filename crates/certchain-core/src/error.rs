//! Error types for certchain core.

use thiserror::Error;

/// Core errors that can occur while hashing, queueing or batching.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Batching was requested with no items.
    #[error("cannot build a batch from zero items")]
    EmptyBatch,

    #[error("batch too large: {0} items")]
    BatchTooLarge(usize),

    #[error("invalid digest: {0}")]
    InvalidDigest(String),

    #[error("unknown content type: {0}")]
    UnknownContentType(String),

    #[error("encoding error: {0}")]
    EncodingError(String),

    #[error("decoding error: {0}")]
    DecodingError(String),
}

impl From<hex::FromHexError> for CoreError {
    fn from(e: hex::FromHexError) -> Self {
        CoreError::InvalidDigest(e.to_string())
    }
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
