//! The batch ledger: authoritative in-process record of batches and proofs.
//!
//! Every write lands in memory first and is then mirrored to the durable
//! store. A mirror failure never rolls back the in-memory state; it comes
//! back to the caller as a [`StorageWarning`].
//!
//! Batches move from `Pending` to `Confirmed` exactly once. Confirming again
//! with the same transaction is a no-op; confirming with a different one is
//! refused.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::{debug, error, info};

use certchain_core::{now_millis, Batch, BatchStatus, Digest, MerkleProof};
use certchain_store::{Store, StoreExt};

use crate::error::{soft, CertchainError, Result, StorageWarning};

/// Result of a confirmation attempt.
#[derive(Debug, Clone)]
pub struct TransitionOutcome {
    /// The batch after the call.
    pub batch: Batch,
    /// `false` when the batch was already confirmed with the same transaction.
    pub changed: bool,
    pub warnings: Vec<StorageWarning>,
}

#[derive(Default)]
struct LedgerState {
    batches: HashMap<u64, Batch>,
    /// Batch ids in creation order.
    order: Vec<u64>,
    /// Latest proof per content hash.
    proofs: HashMap<Digest, MerkleProof>,
}

/// In-memory batch ledger with a durable mirror.
pub struct BatchLedger<S: Store> {
    state: RwLock<LedgerState>,
    mirror: Arc<S>,
}

impl<S: Store> BatchLedger<S> {
    pub fn new(mirror: Arc<S>) -> Self {
        Self {
            state: RwLock::new(LedgerState::default()),
            mirror,
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, LedgerState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, LedgerState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record a freshly built batch and index its proofs.
    ///
    /// A batch id can be recorded only once.
    pub async fn record(
        &self,
        batch: &Batch,
        proofs: &[MerkleProof],
    ) -> Result<Vec<StorageWarning>> {
        {
            let mut state = self.write();
            if state.batches.contains_key(&batch.batch_id) {
                return Err(CertchainError::DuplicateBatch(batch.batch_id));
            }
            state.batches.insert(batch.batch_id, batch.clone());
            state.order.push(batch.batch_id);
            for proof in proofs {
                state.proofs.insert(proof.content_hash, proof.clone());
            }
        }
        debug!(batch_id = batch.batch_id, proofs = proofs.len(), "Recorded batch");

        let mut warnings = Vec::new();
        soft(
            "save_batch_with_proofs",
            self.mirror.save_batch_with_proofs(batch, proofs),
            &mut warnings,
        )
        .await;
        Ok(warnings)
    }

    /// Get a batch by id.
    pub fn get(&self, batch_id: u64) -> Option<Batch> {
        self.read().batches.get(&batch_id).cloned()
    }

    /// Latest proof for a content hash.
    pub fn get_by_hash(&self, content_hash: &Digest) -> Option<MerkleProof> {
        self.read().proofs.get(content_hash).cloned()
    }

    /// All batches in creation order.
    pub fn list(&self) -> Vec<Batch> {
        let state = self.read();
        state
            .order
            .iter()
            .filter_map(|id| state.batches.get(id).cloned())
            .collect()
    }

    /// Number of batches per status.
    pub fn count_by_status(&self, status: BatchStatus) -> usize {
        self.read()
            .batches
            .values()
            .filter(|b| b.status == status)
            .count()
    }

    pub fn len(&self) -> usize {
        self.read().order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Move a batch to `Confirmed`.
    ///
    /// # Errors
    /// - `BatchNotFound` if the batch was never recorded
    /// - `InvalidTransition` if `tx_hash` is empty, or the batch is already
    ///   confirmed with a different transaction
    pub async fn transition(
        &self,
        batch_id: u64,
        tx_hash: &str,
        block_number: u64,
        on_chain_batch_id: Option<u64>,
    ) -> Result<TransitionOutcome> {
        if tx_hash.trim().is_empty() {
            return Err(CertchainError::InvalidTransition {
                batch_id,
                reason: "confirmation requires a transaction hash".to_string(),
            });
        }

        let batch = {
            let mut state = self.write();
            let batch = state
                .batches
                .get_mut(&batch_id)
                .ok_or(CertchainError::BatchNotFound(batch_id))?;

            if batch.is_confirmed() {
                let existing = batch.tx_hash.clone().unwrap_or_default();
                if existing == tx_hash {
                    debug!(batch_id, tx_hash, "Batch already confirmed with this transaction");
                    return Ok(TransitionOutcome {
                        batch: batch.clone(),
                        changed: false,
                        warnings: Vec::new(),
                    });
                }
                error!(
                    batch_id,
                    existing = %existing,
                    attempted = tx_hash,
                    "Refusing to re-confirm batch with a different transaction"
                );
                return Err(CertchainError::InvalidTransition {
                    batch_id,
                    reason: format!("already confirmed in {existing}, not {tx_hash}"),
                });
            }

            batch.status = BatchStatus::Confirmed;
            batch.tx_hash = Some(tx_hash.to_string());
            batch.block_number = Some(block_number);
            batch.on_chain_batch_id = on_chain_batch_id;
            batch.confirmed_at = Some(now_millis());
            batch.clone()
        };
        info!(batch_id, tx_hash, block_number, "Batch confirmed");

        let mut warnings = Vec::new();
        soft("save_batch", self.mirror.save_batch(&batch), &mut warnings).await;
        Ok(TransitionOutcome {
            batch,
            changed: true,
            warnings,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use certchain_core::{BatchBuilder, ContentType, QueueItem, SequentialBatchIds};
    use certchain_store::MemoryStore;

    fn build(n: usize, first_id: u64) -> (Batch, Vec<MerkleProof>) {
        let builder = BatchBuilder::new(
            Arc::new(SequentialBatchIds::starting_at(first_id)),
            "base-sepolia",
        );
        let items: Vec<QueueItem> = (0..n)
            .map(|i| {
                QueueItem::new(
                    Digest::hash(format!("item-{first_id}-{i}").as_bytes()),
                    ContentType::Text,
                    Default::default(),
                )
            })
            .collect();
        let built = builder.build(&items).unwrap();
        (built.batch, built.proofs)
    }

    #[tokio::test]
    async fn test_record_and_lookup() {
        let store = Arc::new(MemoryStore::new());
        let ledger = BatchLedger::new(store.clone());
        let (batch, proofs) = build(3, 1);

        let warnings = ledger.record(&batch, &proofs).await.unwrap();
        assert!(warnings.is_empty());
        assert_eq!(ledger.get(1).unwrap(), batch);
        assert_eq!(ledger.get_by_hash(&proofs[2].content_hash).unwrap(), proofs[2]);
        assert!(ledger.get_by_hash(&Digest::hash(b"other")).is_none());

        // Mirrored.
        assert_eq!(store.get_batch(1).await.unwrap().unwrap(), batch);
        assert!(store.get_proof(&proofs[0].content_hash).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_duplicate_batch_rejected() {
        let ledger = BatchLedger::new(Arc::new(MemoryStore::new()));
        let (batch, proofs) = build(2, 1);
        ledger.record(&batch, &proofs).await.unwrap();
        assert!(matches!(
            ledger.record(&batch, &proofs).await,
            Err(CertchainError::DuplicateBatch(1))
        ));
        assert_eq!(ledger.len(), 1);
    }

    #[tokio::test]
    async fn test_list_in_creation_order() {
        let ledger = BatchLedger::new(Arc::new(MemoryStore::new()));
        for id in [5, 2, 9] {
            let (batch, proofs) = build(1, id);
            ledger.record(&batch, &proofs).await.unwrap();
        }
        let ids: Vec<u64> = ledger.list().iter().map(|b| b.batch_id).collect();
        assert_eq!(ids, vec![5, 2, 9]);
    }

    #[tokio::test]
    async fn test_transition_once() {
        let store = Arc::new(MemoryStore::new());
        let ledger = BatchLedger::new(store.clone());
        let (batch, proofs) = build(2, 1);
        ledger.record(&batch, &proofs).await.unwrap();

        let outcome = ledger.transition(1, "0xaaa", 10, Some(4)).await.unwrap();
        assert!(outcome.changed);
        assert_eq!(outcome.batch.status, BatchStatus::Confirmed);
        assert_eq!(outcome.batch.tx_hash.as_deref(), Some("0xaaa"));
        assert_eq!(outcome.batch.ledger_batch_id(), 4);
        assert!(outcome.batch.confirmed_at.is_some());
        assert!(store.get_batch(1).await.unwrap().unwrap().is_confirmed());

        let again = ledger.transition(1, "0xaaa", 10, Some(4)).await.unwrap();
        assert!(!again.changed);

        let conflict = ledger.transition(1, "0xbbb", 11, Some(5)).await;
        assert!(matches!(
            conflict,
            Err(CertchainError::InvalidTransition { batch_id: 1, .. })
        ));
        assert_eq!(ledger.get(1).unwrap().tx_hash.as_deref(), Some("0xaaa"));
        assert_eq!(ledger.count_by_status(BatchStatus::Confirmed), 1);
    }

    #[tokio::test]
    async fn test_transition_errors() {
        let ledger = BatchLedger::new(Arc::new(MemoryStore::new()));
        assert!(matches!(
            ledger.transition(42, "0xaaa", 1, None).await,
            Err(CertchainError::BatchNotFound(42))
        ));

        let (batch, proofs) = build(1, 1);
        ledger.record(&batch, &proofs).await.unwrap();
        assert!(matches!(
            ledger.transition(1, "", 1, None).await,
            Err(CertchainError::InvalidTransition { .. })
        ));
        assert!(!ledger.get(1).unwrap().is_confirmed());
    }

    #[tokio::test]
    async fn test_mirror_failure_is_soft() {
        let store = Arc::new(MemoryStore::new());
        let ledger = BatchLedger::new(store.clone());
        store.set_offline(true);

        let (batch, proofs) = build(2, 1);
        let warnings = ledger.record(&batch, &proofs).await.unwrap();
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].operation, "save_batch_with_proofs");
        assert!(ledger.get(1).is_some());

        let outcome = ledger.transition(1, "0xaaa", 10, None).await.unwrap();
        assert!(outcome.changed);
        assert_eq!(outcome.warnings.len(), 1);
        assert!(ledger.get(1).unwrap().is_confirmed());

        store.set_offline(false);
        assert!(store.get_batch(1).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_latest_proof_wins() {
        let ledger = BatchLedger::new(Arc::new(MemoryStore::new()));
        let shared = Digest::hash(b"shared");
        let item = QueueItem::new(shared, ContentType::Text, Default::default());
        let builder = BatchBuilder::new(Arc::new(SequentialBatchIds::default()), "base-sepolia");

        for _ in 0..2 {
            let built = builder.build(std::slice::from_ref(&item)).unwrap();
            ledger.record(&built.batch, &built.proofs).await.unwrap();
        }
        assert_eq!(ledger.get_by_hash(&shared).unwrap().batch_id, 2);
    }
}
