//! Test fixtures and helpers.
//!
//! Common setup code for integration tests.

use certchain::{
    CertificationRequest, Certifier, CertifierConfig, ContentType, CreatedBatch, Digest,
    SubmitReceipt,
};
use certchain_anchor::MemoryLedger;
use certchain_store::MemoryStore;

/// A certifier over a memory store and a simulated ledger.
pub struct TestFixture {
    pub certifier: Certifier<MemoryStore, MemoryLedger>,
}

impl TestFixture {
    /// Create a new fixture with default configuration.
    pub fn new() -> Self {
        Self::with_config(CertifierConfig::default())
    }

    pub fn with_config(config: CertifierConfig) -> Self {
        Self {
            certifier: Certifier::new(MemoryStore::new(), MemoryLedger::new(), config),
        }
    }

    pub fn store(&self) -> &MemoryStore {
        self.certifier.store()
    }

    pub fn ledger(&self) -> &MemoryLedger {
        self.certifier.ledger_client()
    }

    /// Certify a text body and return its content hash.
    ///
    /// # Panics
    /// If certification fails.
    pub async fn certify_text(&self, body: &str) -> Digest {
        self.certifier
            .certify(CertificationRequest::new(
                body.as_bytes().to_vec(),
                ContentType::Text,
            ))
            .await
            .expect("certify")
            .content_hash
    }

    /// Certify `count` distinct random bodies.
    pub async fn certify_many(&self, count: usize) -> Vec<Digest> {
        let mut hashes = Vec::with_capacity(count);
        for _ in 0..count {
            let body = hex::encode(rand::random::<[u8; 16]>());
            hashes.push(self.certify_text(&body).await);
        }
        hashes
    }

    /// Drain the queue into a batch.
    ///
    /// # Panics
    /// If the queue is empty.
    pub async fn batch(&self) -> CreatedBatch {
        self.certifier
            .create_batch_from_queue()
            .await
            .expect("create batch")
    }

    /// Drain the queue into a batch and anchor it.
    pub async fn batch_and_submit(&self) -> SubmitReceipt {
        let created = self.batch().await;
        self.certifier
            .submit_batch(created.batch_id)
            .await
            .expect("submit batch")
    }
}

impl Default for TestFixture {
    fn default() -> Self {
        Self::new()
    }
}
