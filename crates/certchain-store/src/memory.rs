//! In-memory implementation of the Store trait.
//!
//! Same semantics as SQLite with no persistence. It can also be switched
//! offline, which makes every call fail with `Unavailable`; tests use this
//! to exercise the pipeline's soft-failure paths.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;

use certchain_core::{Batch, BatchStatus, Digest, MerkleProof};

use crate::error::{Result, StoreError};
use crate::traits::{AuditEntry, ManifestRecord, Store, StoreStats};

/// In-memory store implementation.
///
/// All data is lost when the store is dropped. Thread-safe via RwLock.
pub struct MemoryStore {
    inner: RwLock<MemoryStoreInner>,
    offline: AtomicBool,
}

#[derive(Default)]
struct MemoryStoreInner {
    /// Batches by id.
    batches: BTreeMap<u64, Batch>,

    /// Proofs by content hash, then batch id.
    proofs: HashMap<Digest, BTreeMap<u64, MerkleProof>>,

    /// Manifests by content hash.
    manifests: HashMap<Digest, ManifestRecord>,

    /// Audit entries in insertion order.
    audit: Vec<AuditEntry>,
}

impl MemoryStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(MemoryStoreInner::default()),
            offline: AtomicBool::new(false),
        }
    }

    /// Make every subsequent call fail (`true`) or succeed again (`false`).
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, MemoryStoreInner>> {
        self.check_online()?;
        Ok(self.inner.read().unwrap_or_else(PoisonError::into_inner))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, MemoryStoreInner>> {
        self.check_online()?;
        Ok(self.inner.write().unwrap_or_else(PoisonError::into_inner))
    }

    fn check_online(&self) -> Result<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory store is offline".into()));
        }
        Ok(())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn save_batch(&self, batch: &Batch) -> Result<()> {
        let mut inner = self.write()?;
        inner.batches.insert(batch.batch_id, batch.clone());
        Ok(())
    }

    async fn get_batch(&self, batch_id: u64) -> Result<Option<Batch>> {
        let inner = self.read()?;
        Ok(inner.batches.get(&batch_id).cloned())
    }

    async fn list_batches(&self) -> Result<Vec<Batch>> {
        let inner = self.read()?;
        Ok(inner.batches.values().cloned().collect())
    }

    async fn pending_batches(&self) -> Result<Vec<Batch>> {
        let inner = self.read()?;
        Ok(inner
            .batches
            .values()
            .filter(|b| b.status == BatchStatus::Pending)
            .cloned()
            .collect())
    }

    async fn save_proof(&self, proof: &MerkleProof) -> Result<()> {
        let mut inner = self.write()?;
        inner
            .proofs
            .entry(proof.content_hash)
            .or_default()
            .insert(proof.batch_id, proof.clone());
        Ok(())
    }

    async fn get_proof(&self, content_hash: &Digest) -> Result<Option<MerkleProof>> {
        let inner = self.read()?;
        Ok(inner
            .proofs
            .get(content_hash)
            .and_then(|by_batch| by_batch.values().next_back())
            .cloned())
    }

    async fn save_manifest(&self, record: &ManifestRecord) -> Result<()> {
        let mut inner = self.write()?;
        inner.manifests.insert(record.content_hash, record.clone());
        Ok(())
    }

    async fn get_manifest(&self, content_hash: &Digest) -> Result<Option<ManifestRecord>> {
        let inner = self.read()?;
        Ok(inner.manifests.get(content_hash).cloned())
    }

    async fn update_manifest_batch(&self, content_hash: &Digest, batch_id: u64) -> Result<bool> {
        let mut inner = self.write()?;
        match inner.manifests.get_mut(content_hash) {
            Some(record) => {
                record.batch_id = Some(batch_id);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn log_audit(&self, entry: &AuditEntry) -> Result<()> {
        let mut inner = self.write()?;
        inner.audit.push(entry.clone());
        Ok(())
    }

    async fn audit_log(&self, limit: usize) -> Result<Vec<AuditEntry>> {
        let inner = self.read()?;
        Ok(inner.audit.iter().rev().take(limit).cloned().collect())
    }

    async fn get_stats(&self) -> Result<StoreStats> {
        let inner = self.read()?;
        let confirmed = inner
            .batches
            .values()
            .filter(|b| b.status == BatchStatus::Confirmed)
            .count() as u64;
        let total = inner.batches.len() as u64;

        Ok(StoreStats {
            total_batches: total,
            pending_batches: total - confirmed,
            confirmed_batches: confirmed,
            total_proofs: inner.proofs.values().map(|p| p.len() as u64).sum(),
            total_manifests: inner.manifests.len() as u64,
            last_batch_id: inner.batches.keys().next_back().copied(),
        })
    }
}
