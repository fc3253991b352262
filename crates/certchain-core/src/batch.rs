//! Batches, inclusion proofs and the batch builder.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::digest::Digest;
use crate::error::Result;
use crate::merkle::{compute_root, MerkleTree, ProofStep};
use crate::queue::QueueItem;
use crate::types::now_millis;

/// Lifecycle state of a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchStatus {
    /// Built locally, root not yet anchored.
    Pending,
    /// Root anchored on the ledger.
    Confirmed,
}

impl BatchStatus {
    pub const fn as_str(&self) -> &'static str {
        match self {
            BatchStatus::Pending => "pending",
            BatchStatus::Confirmed => "confirmed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(BatchStatus::Pending),
            "confirmed" => Some(BatchStatus::Confirmed),
            _ => None,
        }
    }
}

/// One Merkle tree worth of certified items.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Batch {
    pub batch_id: u64,
    pub merkle_root: Digest,
    pub item_count: u32,
    pub status: BatchStatus,
    /// Ledger network the batch targets.
    pub network: String,
    pub tx_hash: Option<String>,
    pub block_number: Option<u64>,
    /// Identifier the ledger assigned when the root was anchored.
    pub on_chain_batch_id: Option<u64>,
    /// Creation time (Unix ms).
    pub created_at: i64,
    /// Confirmation time (Unix ms).
    pub confirmed_at: Option<i64>,
}

impl Batch {
    pub fn is_confirmed(&self) -> bool {
        self.status == BatchStatus::Confirmed
    }

    /// The identifier to use when talking to the ledger about this batch.
    pub fn ledger_batch_id(&self) -> u64 {
        self.on_chain_batch_id.unwrap_or(self.batch_id)
    }
}

/// Inclusion proof of one content hash in one batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MerkleProof {
    pub content_hash: Digest,
    pub batch_id: u64,
    pub leaf_index: u32,
    pub sibling_path: Vec<ProofStep>,
}

impl MerkleProof {
    /// Root implied by this proof.
    pub fn implied_root(&self) -> Digest {
        compute_root(&self.content_hash, &self.sibling_path)
    }

    /// Check this proof against a batch root.
    pub fn verify(&self, root: &Digest) -> bool {
        self.implied_root() == *root
    }
}

/// Source of batch identifiers.
///
/// Ids are assigned, not derived from content, so two batches over the same
/// items still get distinct ids.
pub trait BatchIdAllocator: Send + Sync {
    /// Allocate the next id. Ids are strictly increasing.
    fn next_batch_id(&self) -> u64;
}

/// Process-local monotonic counter.
#[derive(Debug)]
pub struct SequentialBatchIds {
    next: AtomicU64,
}

impl SequentialBatchIds {
    /// Start allocating at `first`.
    pub fn starting_at(first: u64) -> Self {
        Self {
            next: AtomicU64::new(first),
        }
    }
}

impl Default for SequentialBatchIds {
    fn default() -> Self {
        Self::starting_at(1)
    }
}

impl BatchIdAllocator for SequentialBatchIds {
    fn next_batch_id(&self) -> u64 {
        self.next.fetch_add(1, Ordering::SeqCst)
    }
}

/// Output of a batch build.
#[derive(Debug, Clone)]
pub struct BuiltBatch {
    pub batch: Batch,
    /// One proof per item, in leaf order.
    pub proofs: Vec<MerkleProof>,
}

/// Turns queued items into a pending batch plus inclusion proofs.
#[derive(Clone)]
pub struct BatchBuilder {
    ids: Arc<dyn BatchIdAllocator>,
    network: String,
}

impl BatchBuilder {
    pub fn new(ids: Arc<dyn BatchIdAllocator>, network: impl Into<String>) -> Self {
        Self {
            ids,
            network: network.into(),
        }
    }

    /// The network new batches are tagged with.
    pub fn network(&self) -> &str {
        &self.network
    }

    /// Build a batch over `items` in the given order.
    ///
    /// Fails with `EmptyBatch` when `items` is empty. No id is consumed on
    /// failure.
    pub fn build(&self, items: &[QueueItem]) -> Result<BuiltBatch> {
        let leaves: Vec<Digest> = items.iter().map(|i| i.content_hash).collect();
        let tree = MerkleTree::from_leaves(leaves)?;

        let batch_id = self.ids.next_batch_id();
        let batch = Batch {
            batch_id,
            merkle_root: tree.root(),
            item_count: tree.leaf_count() as u32,
            status: BatchStatus::Pending,
            network: self.network.clone(),
            tx_hash: None,
            block_number: None,
            on_chain_batch_id: None,
            created_at: now_millis(),
            confirmed_at: None,
        };

        let proofs = tree
            .leaves()
            .iter()
            .enumerate()
            .map(|(index, leaf)| {
                let sibling_path = tree
                    .proof(index)
                    .unwrap_or_else(|| unreachable!("leaf index within tree"));
                MerkleProof {
                    content_hash: *leaf,
                    batch_id,
                    leaf_index: index as u32,
                    sibling_path,
                }
            })
            .collect();

        tracing::debug!(
            batch_id,
            item_count = batch.item_count,
            root = %batch.merkle_root,
            "built batch"
        );

        Ok(BuiltBatch { batch, proofs })
    }
}
