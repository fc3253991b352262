//! Error types for the certification pipeline.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use certchain_anchor::AnchorError;
use certchain_core::CoreError;
use certchain_manifest::ManifestError;
use certchain_store::StoreError;

/// Errors that can occur during pipeline operations.
#[derive(Debug, Error)]
pub enum CertchainError {
    /// Core error.
    #[error("core error: {0}")]
    Core(#[from] CoreError),

    /// Storage error.
    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    /// Ledger client error.
    #[error("ledger error: {0}")]
    Anchor(#[from] AnchorError),

    /// Manifest signing error.
    #[error("manifest error: {0}")]
    Manifest(#[from] ManifestError),

    /// Nothing to batch.
    #[error("cannot create a batch with no items")]
    EmptyBatch,

    /// The batch was already anchored; carries the existing transaction.
    #[error("batch {batch_id} already confirmed in {tx_hash}")]
    AlreadyConfirmed { batch_id: u64, tx_hash: String },

    /// The ledger client is not connected. Retriable.
    #[error("ledger unavailable on {network}: {reason}")]
    LedgerUnavailable { network: String, reason: String },

    /// The ledger refused the submission. The batch stays pending.
    #[error("ledger rejected submission: {0}")]
    LedgerRejected(String),

    /// A state change the batch lifecycle does not allow.
    #[error("invalid transition for batch {batch_id}: {reason}")]
    InvalidTransition { batch_id: u64, reason: String },

    /// Batch not found.
    #[error("batch not found: {0}")]
    BatchNotFound(u64),

    /// A batch with this id was already recorded.
    #[error("batch already recorded: {0}")]
    DuplicateBatch(u64),
}

impl CertchainError {
    /// Whether retrying the same call later may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CertchainError::LedgerUnavailable { .. } | CertchainError::LedgerRejected(_)
        )
    }
}

/// Result type for pipeline operations.
pub type Result<T> = std::result::Result<T, CertchainError>;

/// A durable-storage write that failed without failing the operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageWarning {
    /// What was being persisted, e.g. `save_batch`.
    pub operation: String,
    pub message: String,
}

impl StorageWarning {
    pub fn new(operation: impl Into<String>, error: &StoreError) -> Self {
        Self {
            operation: operation.into(),
            message: error.to_string(),
        }
    }
}

impl fmt::Display for StorageWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} failed: {}", self.operation, self.message)
    }
}

/// Run a mirror write, turning failure into a warning.
pub(crate) async fn soft<F>(operation: &str, write: F, warnings: &mut Vec<StorageWarning>)
where
    F: std::future::Future<Output = certchain_store::Result<()>>,
{
    if let Err(e) = write.await {
        tracing::warn!(operation, error = %e, "Durable store write failed, continuing");
        warnings.push(StorageWarning::new(operation, &e));
    }
}
