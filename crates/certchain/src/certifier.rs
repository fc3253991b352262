//! The Certifier: unified API for the certification pipeline.
//!
//! Brings together the queue, the batch builder, the batch ledger, ledger
//! submission, verification and optional manifest signing.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use certchain_anchor::{LedgerClient, LedgerStatus};
use certchain_core::{
    Batch, BatchBuilder, BatchStatus, CertificationQueue, Digest, MerkleProof, PayloadRef,
    ProofStep, QueueItem, SequentialBatchIds,
};
use certchain_manifest::{ManifestSigner, SignableContent};
use certchain_store::{AuditEntry, ManifestRecord, Store, StoreStats};

use crate::certify::{create_manifest, CertificationRequest, CertifyResponse, ManifestRegistry};
use crate::config::CertifierConfig;
use crate::error::{soft, CertchainError, Result, StorageWarning};
use crate::ledger::BatchLedger;
use crate::submit::{ChainSubmitter, SubmitReceipt};
use crate::verify::{check_proof, ProofVerifier, VerificationReport};

/// Position and sibling path of one item in a new batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexedProof {
    pub index: u32,
    pub proof: Vec<ProofStep>,
}

/// A freshly created batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedBatch {
    pub batch_id: u64,
    pub merkle_root: Digest,
    pub item_count: u32,
    pub proofs: HashMap<Digest, IndexedProof>,
    pub warnings: Vec<StorageWarning>,
}

/// Pipeline counters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CertifierStats {
    pub queue_size: u32,
    pub total_batches: usize,
    pub pending_batches: usize,
    pub confirmed_batches: usize,
    pub registered_manifests: usize,
    /// Durable store counts, when the store answered.
    pub store: Option<StoreStats>,
    pub warnings: Vec<String>,
}

/// The main Certifier struct.
///
/// Provides a unified API for:
/// - Certifying content and queueing it for batching
/// - Building Merkle batches and issuing inclusion proofs
/// - Anchoring batch roots on the ledger
/// - Verifying content against local records and the ledger
pub struct Certifier<S: Store, L: LedgerClient> {
    config: CertifierConfig,
    store: Arc<S>,
    client: Arc<L>,
    queue: CertificationQueue,
    builder: BatchBuilder,
    batches: Arc<BatchLedger<S>>,
    registry: Arc<ManifestRegistry>,
    submitter: ChainSubmitter<S, L>,
    verifier: ProofVerifier,
    signer: Option<ManifestSigner>,
}

impl<S: Store + 'static, L: LedgerClient + 'static> Certifier<S, L> {
    /// Create a certifier allocating batch ids from 1.
    pub fn new(store: S, client: L, config: CertifierConfig) -> Self {
        Self::with_first_batch_id(Arc::new(store), Arc::new(client), config, 1)
    }

    /// Create a certifier that continues batch numbering after the highest
    /// batch id already in the store.
    pub async fn open(store: S, client: L, config: CertifierConfig) -> Result<Self> {
        let stats = store.get_stats().await?;
        let first = stats.last_batch_id.map_or(1, |id| id + 1);
        info!(first_batch_id = first, "Opening certifier");
        Ok(Self::with_first_batch_id(
            Arc::new(store),
            Arc::new(client),
            config,
            first,
        ))
    }

    fn with_first_batch_id(
        store: Arc<S>,
        client: Arc<L>,
        config: CertifierConfig,
        first_batch_id: u64,
    ) -> Self {
        let batches = Arc::new(BatchLedger::new(store.clone()));
        let registry = Arc::new(ManifestRegistry::new());
        let builder = BatchBuilder::new(
            Arc::new(SequentialBatchIds::starting_at(first_batch_id)),
            config.network.clone(),
        );
        let submitter = ChainSubmitter::new(
            batches.clone(),
            client.clone(),
            store.clone(),
            config.metadata_uri_prefix.clone(),
        );
        let verifier =
            ProofVerifier::standard(registry.clone(), store.clone(), batches.clone(), client.clone());

        Self {
            config,
            store,
            client,
            queue: CertificationQueue::new(),
            builder,
            batches,
            registry,
            submitter,
            verifier,
            signer: None,
        }
    }

    /// Attach a manifest signer for requests that ask for a signed envelope.
    pub fn with_signer(mut self, signer: ManifestSigner) -> Self {
        self.signer = Some(signer);
        self
    }

    /// Get the store reference.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Get the ledger client reference.
    pub fn ledger_client(&self) -> &L {
        &self.client
    }

    pub fn config(&self) -> &CertifierConfig {
        &self.config
    }

    pub fn signer(&self) -> Option<&ManifestSigner> {
        self.signer.as_ref()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Certification
    // ─────────────────────────────────────────────────────────────────────────

    /// Certify content: build its manifest, queue it for batching and
    /// persist the manifest.
    ///
    /// Content already waiting in the queue is not queued twice; the
    /// response then carries the earlier manifest.
    pub async fn certify(&self, request: CertificationRequest) -> Result<CertifyResponse> {
        let manifest = create_manifest(&request, &self.config)?;
        let manifest_hash = manifest.manifest_hash()?;
        let content_hash = manifest.content_hash;

        let item = QueueItem::new(
            content_hash,
            manifest.content_type,
            PayloadRef::new(manifest_hash.to_hex()),
        );
        let queued = self.queue.push(item);
        if !queued {
            if let Some(existing) = self.registry.get(&content_hash) {
                debug!(hash = %content_hash, "Content already queued");
                return Ok(CertifyResponse {
                    content_hash,
                    manifest_hash: existing.manifest_hash,
                    manifest: existing.manifest,
                    queued: false,
                    signed_envelope: None,
                    warnings: Vec::new(),
                    signing_warnings: Vec::new(),
                });
            }
        }

        let record = ManifestRecord::new(manifest_hash, manifest.clone());
        self.registry.insert(record.clone());

        let mut warnings = Vec::new();
        soft("save_manifest", self.store.save_manifest(&record), &mut warnings).await;
        let audit = AuditEntry::new("content_certified", "manifest", content_hash.to_hex())
            .actor(manifest.operator_id.clone())
            .details(json!({
                "manifestHash": manifest_hash,
                "contentType": manifest.content_type,
                "modelId": manifest.model_id,
            }));
        soft("log_audit", self.store.log_audit(&audit), &mut warnings).await;

        let (signed_envelope, signing_warnings) = self.sign_if_requested(&request, &manifest)?;

        info!(
            hash = %content_hash,
            manifest = %manifest_hash,
            findings = manifest.has_compliance_findings(),
            "Content certified"
        );
        Ok(CertifyResponse {
            content_hash,
            manifest_hash,
            manifest,
            queued,
            signed_envelope,
            warnings,
            signing_warnings,
        })
    }

    fn sign_if_requested(
        &self,
        request: &CertificationRequest,
        manifest: &certchain_core::CertificationManifest,
    ) -> Result<(Option<certchain_manifest::SignedManifestEnvelope>, Vec<String>)> {
        if !request.sign {
            return Ok((None, Vec::new()));
        }
        let Some(signer) = &self.signer else {
            warn!(hash = %manifest.content_hash, "Signed manifest requested but no signer attached");
            return Ok((
                None,
                vec!["Signed manifest requested but no manifest signer is attached".to_string()],
            ));
        };

        let content = SignableContent {
            id: manifest.content_hash.to_hex(),
            container_type: manifest.content_type.to_string(),
            namespace: manifest
                .organization_id
                .clone()
                .unwrap_or_else(|| "certchain".to_string()),
            version: 1,
            name: request
                .title
                .clone()
                .unwrap_or_else(|| manifest.content_hash.to_hex()),
            author: Some(manifest.operator_id.clone()),
            created_at: manifest.generated_at,
            updated_at: manifest.certified_at,
            body: request.content.to_vec(),
            citations: request.citations(),
        };
        let signed = signer.sign(&content)?;
        Ok((Some(signed.envelope), signed.warnings))
    }

    /// Verify a content hash.
    pub async fn verify(&self, content_hash: &Digest) -> VerificationReport {
        self.verifier.verify(*content_hash).await
    }

    /// Verify a hex content hash.
    pub async fn verify_hex(&self, content_hash: &str) -> Result<VerificationReport> {
        let hash = Digest::from_hex(content_hash).map_err(certchain_core::CoreError::from)?;
        Ok(self.verify(&hash).await)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Queue
    // ─────────────────────────────────────────────────────────────────────────

    pub fn queue_size(&self) -> u32 {
        self.queue.size()
    }

    /// Snapshot of queued items in arrival order.
    pub fn queued_items(&self) -> Vec<QueueItem> {
        self.queue.peek()
    }

    /// Drop everything waiting in the queue.
    pub fn clear_queue(&self) -> usize {
        let cleared = self.queue.clear();
        info!(cleared, "Cleared certification queue");
        cleared
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Batches
    // ─────────────────────────────────────────────────────────────────────────

    /// Build and record a pending batch over `items`, in the given order.
    pub async fn create_batch(&self, items: &[QueueItem]) -> Result<CreatedBatch> {
        if items.is_empty() {
            return Err(CertchainError::EmptyBatch);
        }
        let built = self.builder.build(items)?;
        let batch_id = built.batch.batch_id;

        let mut warnings = self.batches.record(&built.batch, &built.proofs).await?;

        let audit = AuditEntry::new("batch_created", "batch", batch_id.to_string()).details(json!({
            "merkleRoot": built.batch.merkle_root,
            "itemCount": built.batch.item_count,
            "network": built.batch.network,
        }));
        soft("log_audit", self.store.log_audit(&audit), &mut warnings).await;

        for item in items {
            self.registry.assign_batch(&item.content_hash, batch_id);
            if let Err(e) = self
                .store
                .update_manifest_batch(&item.content_hash, batch_id)
                .await
            {
                warn!(batch_id, hash = %item.content_hash, error = %e, "Failed to link manifest to batch");
                warnings.push(StorageWarning::new("update_manifest_batch", &e));
            }
        }

        info!(
            batch_id,
            item_count = built.batch.item_count,
            root = %built.batch.merkle_root,
            "Batch created"
        );

        let proofs = built
            .proofs
            .into_iter()
            .map(|p| {
                (
                    p.content_hash,
                    IndexedProof {
                        index: p.leaf_index,
                        proof: p.sibling_path,
                    },
                )
            })
            .collect();

        Ok(CreatedBatch {
            batch_id,
            merkle_root: built.batch.merkle_root,
            item_count: built.batch.item_count,
            proofs,
            warnings,
        })
    }

    /// Drain the queue into a new batch.
    ///
    /// If batch creation fails, the drained items go back into the queue.
    pub async fn create_batch_from_queue(&self) -> Result<CreatedBatch> {
        let items = self.queue.drain();
        if items.is_empty() {
            return Err(CertchainError::EmptyBatch);
        }
        match self.create_batch(&items).await {
            Ok(created) => Ok(created),
            Err(e) => {
                warn!(error = %e, items = items.len(), "Batch creation failed, requeueing items");
                for item in items {
                    self.queue.push(item);
                }
                Err(e)
            }
        }
    }

    pub fn get_batch_local(&self, batch_id: u64) -> Option<Batch> {
        self.batches.get(batch_id)
    }

    /// All batches in creation order.
    pub fn get_all_batches(&self) -> Vec<Batch> {
        self.batches.list()
    }

    /// Set a batch's status directly, for confirmations learned out of band.
    ///
    /// Confirming needs both a transaction hash and a block number. A
    /// confirmed batch never goes back to pending.
    pub async fn update_batch_status(
        &self,
        batch_id: u64,
        status: BatchStatus,
        tx_hash: Option<&str>,
        block_number: Option<u64>,
    ) -> Result<Batch> {
        let current = self
            .batches
            .get(batch_id)
            .ok_or(CertchainError::BatchNotFound(batch_id))?;

        match status {
            BatchStatus::Pending if current.is_confirmed() => {
                Err(CertchainError::InvalidTransition {
                    batch_id,
                    reason: "a confirmed batch cannot return to pending".to_string(),
                })
            }
            BatchStatus::Pending => Ok(current),
            BatchStatus::Confirmed => {
                let (Some(tx_hash), Some(block_number)) = (tx_hash, block_number) else {
                    return Err(CertchainError::InvalidTransition {
                        batch_id,
                        reason: "confirmation requires a transaction hash and block number"
                            .to_string(),
                    });
                };
                let outcome = self
                    .batches
                    .transition(batch_id, tx_hash, block_number, current.on_chain_batch_id)
                    .await?;
                Ok(outcome.batch)
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Proofs
    // ─────────────────────────────────────────────────────────────────────────

    /// Pure inclusion check against a root.
    pub fn verify_proof(&self, content_hash: &Digest, proof: &[ProofStep], root: &Digest) -> bool {
        check_proof(content_hash, proof, root)
    }

    /// Latest in-process proof for a content hash.
    pub fn get_proof_by_hash(&self, content_hash: &Digest) -> Option<MerkleProof> {
        self.batches.get_by_hash(content_hash)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Ledger
    // ─────────────────────────────────────────────────────────────────────────

    /// Anchor a batch root on the ledger.
    pub async fn submit_batch(&self, batch_id: u64) -> Result<SubmitReceipt> {
        self.submitter.submit(batch_id).await
    }

    pub async fn ledger_status(&self) -> Result<LedgerStatus> {
        Ok(self.client.get_status().await?)
    }

    pub async fn stats(&self) -> CertifierStats {
        let mut warnings = Vec::new();
        let store = match self.store.get_stats().await {
            Ok(stats) => Some(stats),
            Err(e) => {
                warnings.push(format!("store: {e}"));
                None
            }
        };
        CertifierStats {
            queue_size: self.queue.size(),
            total_batches: self.batches.len(),
            pending_batches: self.batches.count_by_status(BatchStatus::Pending),
            confirmed_batches: self.batches.count_by_status(BatchStatus::Confirmed),
            registered_manifests: self.registry.len(),
            store,
            warnings,
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Auto-batching
    // ─────────────────────────────────────────────────────────────────────────

    /// Periodically batch the queue, and submit the batch when
    /// `auto_submit` is set. Runs until the handle is aborted.
    pub fn spawn_auto_batcher(self: Arc<Self>) -> JoinHandle<()> {
        let period = self.config.auto_batch_interval;
        self.spawn_auto_batcher_every(period)
    }

    /// Like [`spawn_auto_batcher`](Self::spawn_auto_batcher) with an explicit period.
    pub fn spawn_auto_batcher_every(self: Arc<Self>, period: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            // The first tick completes immediately.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                self.auto_batch_once().await;
            }
        })
    }

    async fn auto_batch_once(&self) {
        if self.queue.is_empty() {
            return;
        }
        let created = match self.create_batch_from_queue().await {
            Ok(created) => created,
            Err(CertchainError::EmptyBatch) => return,
            Err(e) => {
                warn!(error = %e, "Auto-batch failed");
                return;
            }
        };
        info!(batch_id = created.batch_id, items = created.item_count, "Auto-batched queue");

        if self.config.auto_submit {
            if let Err(e) = self.submit_batch(created.batch_id).await {
                warn!(batch_id = created.batch_id, error = %e, "Auto-submit failed, batch stays pending");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use certchain_anchor::MemoryLedger;
    use certchain_core::ContentType;
    use certchain_store::MemoryStore;

    fn certifier() -> Certifier<MemoryStore, MemoryLedger> {
        Certifier::new(
            MemoryStore::new(),
            MemoryLedger::new(),
            CertifierConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_certify_queues_and_persists() {
        let c = certifier();
        let response = c
            .certify(CertificationRequest::new(&b"hello"[..], ContentType::Text))
            .await
            .unwrap();

        assert!(response.queued);
        assert!(response.warnings.is_empty());
        assert_eq!(c.queue_size(), 1);
        assert_eq!(
            c.queued_items()[0].payload_ref.as_str(),
            response.manifest_hash.to_hex()
        );

        let stored = c.store().get_manifest(&response.content_hash).await.unwrap();
        assert_eq!(stored.unwrap().manifest_hash, response.manifest_hash);
        let audit = c.store().audit_log(1).await.unwrap();
        assert_eq!(audit[0].action, "content_certified");
        assert_eq!(audit[0].actor_id.as_deref(), Some("anonymous"));
    }

    #[tokio::test]
    async fn test_duplicate_content_not_requeued() {
        let c = certifier();
        let first = c
            .certify(CertificationRequest::new(&b"same"[..], ContentType::Text))
            .await
            .unwrap();
        let second = c
            .certify(CertificationRequest::new(&b"same"[..], ContentType::Text).operator("bob"))
            .await
            .unwrap();

        assert!(!second.queued);
        assert_eq!(second.manifest_hash, first.manifest_hash);
        assert_eq!(c.queue_size(), 1);
    }

    #[tokio::test]
    async fn test_create_batch_from_empty_queue() {
        let c = certifier();
        assert!(matches!(
            c.create_batch_from_queue().await,
            Err(CertchainError::EmptyBatch)
        ));
        assert!(matches!(
            c.create_batch(&[]).await,
            Err(CertchainError::EmptyBatch)
        ));
    }

    #[tokio::test]
    async fn test_create_batch_links_manifests() {
        let c = certifier();
        let a = c
            .certify(CertificationRequest::new(&b"a"[..], ContentType::Image))
            .await
            .unwrap();
        c.certify(CertificationRequest::new(&b"b"[..], ContentType::Image))
            .await
            .unwrap();

        let created = c.create_batch_from_queue().await.unwrap();
        assert_eq!(created.batch_id, 1);
        assert_eq!(created.item_count, 2);
        assert_eq!(c.queue_size(), 0);
        assert_eq!(created.proofs[&a.content_hash].index, 0);

        let record = c.store().get_manifest(&a.content_hash).await.unwrap().unwrap();
        assert_eq!(record.batch_id, Some(1));
        let actions: Vec<String> = c
            .store()
            .audit_log(10)
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.action)
            .collect();
        assert_eq!(actions[0], "batch_created");
    }

    #[tokio::test]
    async fn test_failed_batch_requeues_items() {
        let c = certifier();

        // Occupy batch id 1 so the next build collides.
        let taken = BatchBuilder::new(Arc::new(SequentialBatchIds::default()), "base-mainnet");
        let item = QueueItem::new(Digest::hash(b"z"), ContentType::Text, Default::default());
        let built = taken.build(&[item]).unwrap();
        c.batches.record(&built.batch, &built.proofs).await.unwrap();

        c.certify(CertificationRequest::new(&b"a"[..], ContentType::Text))
            .await
            .unwrap();
        c.certify(CertificationRequest::new(&b"b"[..], ContentType::Text))
            .await
            .unwrap();

        assert!(matches!(
            c.create_batch_from_queue().await,
            Err(CertchainError::DuplicateBatch(1))
        ));
        assert_eq!(c.queue_size(), 2);

        // The next id is free.
        let created = c.create_batch_from_queue().await.unwrap();
        assert_eq!(created.batch_id, 2);
    }

    #[tokio::test]
    async fn test_update_batch_status() {
        let c = certifier();
        c.certify(CertificationRequest::new(&b"a"[..], ContentType::Text))
            .await
            .unwrap();
        let created = c.create_batch_from_queue().await.unwrap();
        let id = created.batch_id;

        assert!(matches!(
            c.update_batch_status(id, BatchStatus::Confirmed, Some("0x1"), None)
                .await,
            Err(CertchainError::InvalidTransition { .. })
        ));
        let batch = c
            .update_batch_status(id, BatchStatus::Confirmed, Some("0x1"), Some(7))
            .await
            .unwrap();
        assert!(batch.is_confirmed());
        assert!(matches!(
            c.update_batch_status(id, BatchStatus::Pending, None, None).await,
            Err(CertchainError::InvalidTransition { .. })
        ));
        assert!(matches!(
            c.update_batch_status(99, BatchStatus::Pending, None, None).await,
            Err(CertchainError::BatchNotFound(99))
        ));
    }

    #[tokio::test]
    async fn test_open_continues_batch_ids() {
        let store = MemoryStore::new();
        {
            let builder =
                BatchBuilder::new(Arc::new(SequentialBatchIds::starting_at(41)), "base-mainnet");
            let item = QueueItem::new(Digest::hash(b"old"), ContentType::Text, Default::default());
            let built = builder.build(&[item]).unwrap();
            store.save_batch(&built.batch).await.unwrap();
        }

        let c = Certifier::open(store, MemoryLedger::new(), CertifierConfig::default())
            .await
            .unwrap();
        c.certify(CertificationRequest::new(&b"new"[..], ContentType::Text))
            .await
            .unwrap();
        let created = c.create_batch_from_queue().await.unwrap();
        assert_eq!(created.batch_id, 42);
    }

    #[tokio::test]
    async fn test_stats() {
        let c = certifier();
        c.certify(CertificationRequest::new(&b"a"[..], ContentType::Text))
            .await
            .unwrap();
        let stats = c.stats().await;
        assert_eq!(stats.queue_size, 1);
        assert_eq!(stats.registered_manifests, 1);
        assert_eq!(stats.store.unwrap().total_manifests, 1);

        c.store().set_offline(true);
        let stats = c.stats().await;
        assert!(stats.store.is_none());
        assert_eq!(stats.warnings.len(), 1);
    }

    #[tokio::test]
    async fn test_verify_hex_rejects_garbage() {
        let c = certifier();
        assert!(c.verify_hex("not-hex").await.is_err());
        let report = c.verify_hex(&"ab".repeat(32)).await.unwrap();
        assert!(!report.verified);
    }
}
