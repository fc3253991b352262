//! # Certchain
//!
//! The unified API for certchain: content certification through Merkle
//! batches anchored on a ledger.
//!
//! ## Overview
//!
//! Certchain provides an embeddable library for:
//!
//! - **Certification**: Hash content, record a provenance manifest and queue
//!   it for batching
//! - **Batching**: Combine queued hashes into a Merkle tree with one
//!   inclusion proof per item
//! - **Anchoring**: Publish a batch root to a ledger exactly once
//! - **Verification**: Assemble everything known about a content hash, from
//!   local records up to the ledger
//! - **Signed manifests**: Wrap manifests in a keyed-hash envelope that
//!   detects tampering
//!
//! ## Key Concepts
//!
//! - **Batch**: Pending until its root is anchored, then Confirmed for good.
//! - **Inclusion proof**: Sibling path from a leaf to the batch root.
//! - **Storage warning**: A durable write that failed without failing the
//!   operation. In-memory state stays authoritative.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use certchain::{CertificationRequest, Certifier, CertifierConfig};
//! use certchain::anchor::MemoryLedger;
//! use certchain::core::ContentType;
//! use certchain::store::SqliteStore;
//!
//! async fn example() {
//!     let store = SqliteStore::open("certchain.db").unwrap();
//!     let certifier = Certifier::open(store, MemoryLedger::new(), CertifierConfig::default())
//!         .await
//!         .unwrap();
//!
//!     let response = certifier
//!         .certify(CertificationRequest::new(&b"generated caption"[..], ContentType::Text))
//!         .await
//!         .unwrap();
//!
//!     let batch = certifier.create_batch_from_queue().await.unwrap();
//!     certifier.submit_batch(batch.batch_id).await.unwrap();
//!
//!     let report = certifier.verify(&response.content_hash).await;
//!     assert!(report.blockchain.verified);
//! }
//! ```
//!
//! ## Re-exports
//!
//! This crate re-exports the component crates for convenience:
//!
//! - `certchain::core` - Hashing, queue, Merkle trees and batches
//! - `certchain::store` - Storage abstraction and SQLite
//! - `certchain::anchor` - Ledger client abstraction
//! - `certchain::manifest` - Signed manifest envelopes

pub mod certifier;
pub mod certify;
pub mod config;
pub mod error;
pub mod ledger;
pub mod submit;
pub mod verify;

// Re-export component crates
pub use certchain_anchor as anchor;
pub use certchain_core as core;
pub use certchain_manifest as manifest;
pub use certchain_store as store;

// Re-export main types for convenience
pub use certifier::{Certifier, CertifierStats, CreatedBatch, IndexedProof};
pub use certify::{
    create_manifest, CertificationRequest, CertifyResponse, ComplianceChecks, ManifestRegistry,
};
pub use config::CertifierConfig;
pub use error::{CertchainError, Result, StorageWarning};
pub use ledger::{BatchLedger, TransitionOutcome};
pub use submit::{ChainSubmitter, SubmitReceipt};
pub use verify::{
    check_proof, BlockchainCheck, Links, Probe, ProofVerifier, VerificationReport,
};

// Re-export commonly used core types
pub use certchain_core::{
    Batch, BatchStatus, CertificationManifest, ContentHasher, ContentType, Digest, MerkleProof,
    ProofStep, QueueItem, Side,
};
