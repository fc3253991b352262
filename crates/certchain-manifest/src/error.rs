//! Error types for manifest signing.

use thiserror::Error;

/// Errors that can occur while building or signing a manifest.
#[derive(Debug, Error)]
pub enum ManifestError {
    /// No signing key is configured and insecure mode is off.
    #[error("no signing key configured (set CERTCHAIN_SIGNING_KEY or enable insecure mode)")]
    MissingKey,

    /// The configured key is not 32 bytes of hex.
    #[error("invalid signing key: {0}")]
    InvalidKey(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    SerializationError(String),

    /// Core error.
    #[error("core error: {0}")]
    CoreError(#[from] certchain_core::CoreError),
}

impl From<serde_json::Error> for ManifestError {
    fn from(e: serde_json::Error) -> Self {
        Self::SerializationError(e.to_string())
    }
}

/// Result type for manifest operations.
pub type Result<T> = std::result::Result<T, ManifestError>;
