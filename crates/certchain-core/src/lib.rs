//! # certchain core
//!
//! Pure primitives for certchain: digests, canonical hashing, the
//! certification queue, Merkle batches and inclusion proofs.
//!
//! This crate contains no storage and no networking.
//!
//! ## Key Types
//!
//! - [`Digest`] - 32-byte Blake3 digest, hex in every text form
//! - [`ContentHasher`] - hashing of raw content and structured metadata
//! - [`CertificationQueue`] - ordered, deduplicating intake buffer
//! - [`BatchBuilder`] - turns queued items into a [`Batch`] and [`MerkleProof`]s
//! - [`MerkleTree`] - the binary tree behind every batch
//!
//! ## Usage
//!
//! ```rust
//! use std::sync::Arc;
//! use certchain_core::{BatchBuilder, CertificationQueue, ContentType, SequentialBatchIds, Submission};
//!
//! let queue = CertificationQueue::new();
//! queue.enqueue(Submission::new(b"first".to_vec(), ContentType::Text));
//! queue.enqueue(Submission::new(b"second".to_vec(), ContentType::Text));
//!
//! let builder = BatchBuilder::new(Arc::new(SequentialBatchIds::default()), "base-sepolia");
//! let built = builder.build(&queue.drain()).unwrap();
//! assert!(built.proofs.iter().all(|p| p.verify(&built.batch.merkle_root)));
//! ```
//!
//! ## Canonicalization
//!
//! Structured values are hashed over deterministic CBOR. See [`canonical`].

pub mod batch;
pub mod canonical;
pub mod certificate;
pub mod digest;
pub mod error;
pub mod hash;
pub mod merkle;
pub mod queue;
pub mod types;

pub use batch::{
    Batch, BatchBuilder, BatchIdAllocator, BatchStatus, BuiltBatch, MerkleProof,
    SequentialBatchIds,
};
pub use canonical::canonical_bytes;
pub use certificate::{
    CertificationManifest, ComplianceResult, ComplianceStatus, ExecutionMode, ProductContext,
};
pub use digest::Digest;
pub use error::{CoreError, Result};
pub use hash::ContentHasher;
pub use merkle::{compute_root, expected_depth, verify_proof, MerkleTree, ProofStep, Side};
pub use queue::{CertificationQueue, QueueItem, Submission};
pub use types::{now_millis, ContentType, PayloadRef};
