//! Anchoring batch roots on the ledger.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{error, info, warn};

use certchain_anchor::LedgerClient;
use certchain_store::{AuditEntry, Store};

use crate::error::{soft, CertchainError, Result, StorageWarning};
use crate::ledger::BatchLedger;

/// Outcome of a successful submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitReceipt {
    pub batch_id: u64,
    pub tx_hash: String,
    pub block_number: u64,
    pub on_chain_batch_id: u64,
    pub explorer_url: String,
    pub warnings: Vec<StorageWarning>,
}

/// Submits pending batch roots through a [`LedgerClient`].
///
/// Makes exactly one ledger call per submission and never retries; a
/// rejected batch stays pending and can be submitted again.
pub struct ChainSubmitter<S: Store, L: LedgerClient> {
    batches: Arc<BatchLedger<S>>,
    client: Arc<L>,
    store: Arc<S>,
    metadata_uri_prefix: String,
}

impl<S: Store, L: LedgerClient> ChainSubmitter<S, L> {
    pub fn new(
        batches: Arc<BatchLedger<S>>,
        client: Arc<L>,
        store: Arc<S>,
        metadata_uri_prefix: impl Into<String>,
    ) -> Self {
        Self {
            batches,
            client,
            store,
            metadata_uri_prefix: metadata_uri_prefix.into(),
        }
    }

    /// Anchor a batch root and confirm the batch.
    ///
    /// # Errors
    /// - `BatchNotFound` for an unknown batch
    /// - `AlreadyConfirmed` with the existing transaction, including when a
    ///   concurrent submission confirmed the batch first
    /// - `LedgerUnavailable` when the client is not connected
    /// - `LedgerRejected` when the ledger refuses the transaction
    pub async fn submit(&self, batch_id: u64) -> Result<SubmitReceipt> {
        let batch = self
            .batches
            .get(batch_id)
            .ok_or(CertchainError::BatchNotFound(batch_id))?;
        if let Some(tx_hash) = batch.tx_hash.clone().filter(|_| batch.is_confirmed()) {
            return Err(CertchainError::AlreadyConfirmed { batch_id, tx_hash });
        }

        let status = self
            .client
            .get_status()
            .await
            .map_err(|e| CertchainError::LedgerUnavailable {
                network: batch.network.clone(),
                reason: e.to_string(),
            })?;
        if !status.connected {
            warn!(batch_id, network = %status.network, "Ledger not connected, batch stays pending");
            return Err(CertchainError::LedgerUnavailable {
                network: status.network,
                reason: "client not connected".to_string(),
            });
        }

        let metadata_uri = format!("{}{}", self.metadata_uri_prefix, batch_id);
        let receipt = self
            .client
            .certify_batch(&batch.merkle_root, &metadata_uri, batch.item_count)
            .await
            .map_err(|e| {
                warn!(batch_id, error = %e, "Ledger rejected batch, batch stays pending");
                CertchainError::LedgerRejected(e.to_string())
            })?;

        let outcome = match self
            .batches
            .transition(
                batch_id,
                &receipt.tx_hash,
                receipt.block_number,
                Some(receipt.on_chain_batch_id),
            )
            .await
        {
            Ok(outcome) => outcome,
            Err(CertchainError::InvalidTransition { .. }) => {
                let winner = self
                    .batches
                    .get(batch_id)
                    .and_then(|b| b.tx_hash)
                    .unwrap_or_default();
                error!(
                    batch_id,
                    winner = %winner,
                    orphaned = %receipt.tx_hash,
                    "Lost submission race; ledger holds a duplicate anchor"
                );
                return Err(CertchainError::AlreadyConfirmed {
                    batch_id,
                    tx_hash: winner,
                });
            }
            Err(e) => return Err(e),
        };

        let mut warnings = outcome.warnings;
        let audit = AuditEntry::new("batch_submitted", "batch", batch_id.to_string()).details(
            json!({
                "txHash": receipt.tx_hash,
                "blockNumber": receipt.block_number,
                "onChainBatchId": receipt.on_chain_batch_id,
                "merkleRoot": batch.merkle_root,
                "network": batch.network,
            }),
        );
        soft("log_audit", self.store.log_audit(&audit), &mut warnings).await;

        info!(
            batch_id,
            tx_hash = %receipt.tx_hash,
            block_number = receipt.block_number,
            "Batch submitted"
        );

        Ok(SubmitReceipt {
            batch_id,
            explorer_url: self.client.explorer_url(&receipt.tx_hash),
            tx_hash: receipt.tx_hash,
            block_number: receipt.block_number,
            on_chain_batch_id: receipt.on_chain_batch_id,
            warnings,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use certchain_anchor::MemoryLedger;
    use certchain_core::{
        BatchBuilder, BatchStatus, ContentType, Digest, QueueItem, SequentialBatchIds,
    };
    use certchain_store::MemoryStore;

    struct Harness {
        store: Arc<MemoryStore>,
        client: Arc<MemoryLedger>,
        batches: Arc<BatchLedger<MemoryStore>>,
        submitter: ChainSubmitter<MemoryStore, MemoryLedger>,
    }

    async fn harness(items: usize) -> Harness {
        let store = Arc::new(MemoryStore::new());
        let client = Arc::new(MemoryLedger::new());
        let batches = Arc::new(BatchLedger::new(store.clone()));
        let builder = BatchBuilder::new(Arc::new(SequentialBatchIds::default()), "base-sepolia");
        let items: Vec<QueueItem> = (0..items)
            .map(|i| {
                QueueItem::new(
                    Digest::hash(&[i as u8]),
                    ContentType::Product,
                    Default::default(),
                )
            })
            .collect();
        let built = builder.build(&items).unwrap();
        batches.record(&built.batch, &built.proofs).await.unwrap();

        let submitter =
            ChainSubmitter::new(batches.clone(), client.clone(), store.clone(), "ipfs://pending-");
        Harness {
            store,
            client,
            batches,
            submitter,
        }
    }

    #[tokio::test]
    async fn test_submit_confirms_batch() {
        let h = harness(3).await;
        let receipt = h.submitter.submit(1).await.unwrap();

        assert_eq!(receipt.batch_id, 1);
        assert_eq!(receipt.on_chain_batch_id, 1);
        assert!(receipt.explorer_url.ends_with(&receipt.tx_hash));
        assert!(receipt.warnings.is_empty());

        let batch = h.batches.get(1).unwrap();
        assert_eq!(batch.status, BatchStatus::Confirmed);
        assert_eq!(batch.tx_hash.as_deref(), Some(receipt.tx_hash.as_str()));

        let cert = h.client.get_certification(1).await.unwrap().unwrap();
        assert_eq!(cert.merkle_root, batch.merkle_root);
        assert_eq!(cert.metadata_uri, "ipfs://pending-1");
        assert_eq!(cert.item_count, 3);

        let audit = h.store.audit_log(10).await.unwrap();
        assert_eq!(audit[0].action, "batch_submitted");
        assert_eq!(audit[0].details["txHash"], receipt.tx_hash);
    }

    #[tokio::test]
    async fn test_resubmit_reports_existing_tx() {
        let h = harness(2).await;
        let first = h.submitter.submit(1).await.unwrap();

        match h.submitter.submit(1).await {
            Err(CertchainError::AlreadyConfirmed { batch_id, tx_hash }) => {
                assert_eq!(batch_id, 1);
                assert_eq!(tx_hash, first.tx_hash);
            }
            other => panic!("expected AlreadyConfirmed, got {other:?}"),
        }
        assert_eq!(h.client.certification_count().await, 1);
    }

    #[tokio::test]
    async fn test_ledger_unavailable_leaves_pending() {
        let h = harness(2).await;
        h.client.set_connected(false).await;

        let err = h.submitter.submit(1).await.unwrap_err();
        assert!(matches!(err, CertchainError::LedgerUnavailable { .. }));
        assert!(err.is_retryable());
        assert_eq!(h.batches.get(1).unwrap().status, BatchStatus::Pending);

        h.client.set_connected(true).await;
        assert!(h.submitter.submit(1).await.is_ok());
    }

    #[tokio::test]
    async fn test_rejection_leaves_pending() {
        let h = harness(2).await;
        h.client.reject_next("nonce too low").await;

        let err = h.submitter.submit(1).await.unwrap_err();
        match &err {
            CertchainError::LedgerRejected(reason) => assert!(reason.contains("nonce too low")),
            other => panic!("expected LedgerRejected, got {other:?}"),
        }
        assert!(!h.batches.get(1).unwrap().is_confirmed());

        let receipt = h.submitter.submit(1).await.unwrap();
        assert!(h.batches.get(1).unwrap().is_confirmed());
        assert_eq!(receipt.on_chain_batch_id, 1);
    }

    #[tokio::test]
    async fn test_unknown_batch() {
        let h = harness(1).await;
        assert!(matches!(
            h.submitter.submit(9).await,
            Err(CertchainError::BatchNotFound(9))
        ));
    }

    #[tokio::test]
    async fn test_audit_failure_is_soft() {
        let h = harness(2).await;
        h.store.set_offline(true);

        let receipt = h.submitter.submit(1).await.unwrap();
        // save_batch on confirm, then log_audit.
        assert_eq!(receipt.warnings.len(), 2);
        assert!(h.batches.get(1).unwrap().is_confirmed());
    }
}
