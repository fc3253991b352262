//! Store trait: the narrow repository interface the pipeline persists through.
//!
//! The in-process batch ledger is authoritative; a store is its durable
//! mirror and the lookup of last resort for records from earlier process
//! lifetimes.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use certchain_core::{now_millis, Batch, CertificationManifest, ContentType, Digest, MerkleProof};

use crate::error::Result;

/// A certification manifest as persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestRecord {
    pub content_hash: Digest,
    pub manifest_hash: Digest,
    pub content_type: ContentType,
    /// Batch the content was included in, once batched.
    pub batch_id: Option<u64>,
    pub manifest: CertificationManifest,
    /// When the record was first saved (Unix ms).
    pub created_at: i64,
}

impl ManifestRecord {
    pub fn new(manifest_hash: Digest, manifest: CertificationManifest) -> Self {
        Self {
            content_hash: manifest.content_hash,
            manifest_hash,
            content_type: manifest.content_type,
            batch_id: None,
            manifest,
            created_at: now_millis(),
        }
    }
}

/// One audit trail entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    pub action: String,
    pub entity_type: String,
    pub entity_id: String,
    pub actor_id: Option<String>,
    pub details: serde_json::Value,
    /// Unix ms.
    pub created_at: i64,
}

impl AuditEntry {
    pub fn new(
        action: impl Into<String>,
        entity_type: impl Into<String>,
        entity_id: impl Into<String>,
    ) -> Self {
        Self {
            action: action.into(),
            entity_type: entity_type.into(),
            entity_id: entity_id.into(),
            actor_id: None,
            details: serde_json::Value::Null,
            created_at: now_millis(),
        }
    }

    pub fn actor(mut self, actor_id: impl Into<String>) -> Self {
        self.actor_id = Some(actor_id.into());
        self
    }

    pub fn details(mut self, details: serde_json::Value) -> Self {
        self.details = details;
        self
    }
}

/// Aggregate counts over the store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreStats {
    pub total_batches: u64,
    pub pending_batches: u64,
    pub confirmed_batches: u64,
    pub total_proofs: u64,
    pub total_manifests: u64,
    /// Highest batch id ever saved.
    pub last_batch_id: Option<u64>,
}

/// The Store trait: async interface for pipeline persistence.
///
/// # Design Notes
///
/// - **Upserts**: saving a batch or manifest that already exists replaces it.
/// - **Latest proof wins**: content certified in several batches resolves
///   to the proof from the highest batch id.
#[async_trait]
pub trait Store: Send + Sync {
    // ─────────────────────────────────────────────────────────────────────────
    // Batch Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Insert or replace a batch.
    async fn save_batch(&self, batch: &Batch) -> Result<()>;

    /// Get a batch by id.
    async fn get_batch(&self, batch_id: u64) -> Result<Option<Batch>>;

    /// All batches ordered by batch id.
    async fn list_batches(&self) -> Result<Vec<Batch>>;

    /// Batches still waiting for confirmation, ordered by batch id.
    async fn pending_batches(&self) -> Result<Vec<Batch>>;

    // ─────────────────────────────────────────────────────────────────────────
    // Proof Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Insert or replace a proof, keyed by (content hash, batch id).
    async fn save_proof(&self, proof: &MerkleProof) -> Result<()>;

    /// Get the most recent proof for a content hash.
    async fn get_proof(&self, content_hash: &Digest) -> Result<Option<MerkleProof>>;

    // ─────────────────────────────────────────────────────────────────────────
    // Manifest Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Insert or replace the manifest for a content hash.
    async fn save_manifest(&self, record: &ManifestRecord) -> Result<()>;

    /// Get the manifest for a content hash.
    async fn get_manifest(&self, content_hash: &Digest) -> Result<Option<ManifestRecord>>;

    /// Link a manifest to the batch that included it.
    ///
    /// # Returns
    /// `true` if a manifest for `content_hash` existed.
    async fn update_manifest_batch(&self, content_hash: &Digest, batch_id: u64) -> Result<bool>;

    // ─────────────────────────────────────────────────────────────────────────
    // Audit & Stats
    // ─────────────────────────────────────────────────────────────────────────

    /// Append an audit entry.
    async fn log_audit(&self, entry: &AuditEntry) -> Result<()>;

    /// Most recent audit entries, newest first.
    async fn audit_log(&self, limit: usize) -> Result<Vec<AuditEntry>>;

    /// Aggregate counts.
    async fn get_stats(&self) -> Result<StoreStats>;
}

/// Extension trait for common store patterns.
pub trait StoreExt: Store {
    /// Save a batch followed by each of its proofs.
    ///
    /// Stops at the first failure; records saved before it stay saved.
    fn save_batch_with_proofs(
        &self,
        batch: &Batch,
        proofs: &[MerkleProof],
    ) -> impl std::future::Future<Output = Result<()>> + Send;
}

impl<S: Store + ?Sized> StoreExt for S {
    async fn save_batch_with_proofs(&self, batch: &Batch, proofs: &[MerkleProof]) -> Result<()> {
        self.save_batch(batch).await?;
        for proof in proofs {
            self.save_proof(proof).await?;
        }
        Ok(())
    }
}
