//! Error types for ledger anchoring.

use thiserror::Error;

/// Errors that can occur while talking to a ledger.
#[derive(Debug, Error)]
pub enum AnchorError {
    /// The ledger client is not connected.
    #[error("ledger not connected: {0}")]
    NotConnected(String),

    /// The ledger rejected the transaction.
    #[error("transaction rejected: {0}")]
    Rejected(String),

    /// Transport-level error.
    #[error("transport error: {0}")]
    TransportError(String),

    /// No certification exists for the given on-chain batch id.
    #[error("unknown on-chain batch: {0}")]
    UnknownBatch(u64),

    /// Network name not recognized.
    #[error("unknown network: {0}")]
    UnknownNetwork(String),
}

/// Result type for ledger operations.
pub type Result<T> = std::result::Result<T, AnchorError>;
