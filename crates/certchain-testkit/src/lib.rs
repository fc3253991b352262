//! # Certchain Testkit
//!
//! Testing utilities for certchain.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Merkle vectors**: Fixed leaf sets checked against an independent
//!   recursive construction of the tree
//! - **Generators**: Proptest strategies for property-based testing
//! - **Fixtures**: A ready-made certifier over in-memory storage and ledger
//!
//! ## Merkle Vectors
//!
//! ```rust
//! use certchain_testkit::vectors::{all_vectors, verify_all_vectors};
//!
//! for vector in all_vectors() {
//!     println!("{}: {} leaves", vector.name, vector.leaves.len());
//! }
//! verify_all_vectors().unwrap();
//! ```
//!
//! ## Property Testing
//!
//! ```rust,ignore
//! use proptest::prelude::*;
//! use certchain_testkit::generators::leaves;
//!
//! proptest! {
//!     #[test]
//!     fn every_proof_verifies(leaves in leaves(64)) {
//!         let tree = MerkleTree::from_leaves(leaves.clone()).unwrap();
//!         for (i, leaf) in leaves.iter().enumerate() {
//!             prop_assert!(verify_proof(leaf, &tree.proof(i).unwrap(), &tree.root()));
//!         }
//!     }
//! }
//! ```
//!
//! ## Test Fixtures
//!
//! ```rust,no_run
//! use certchain_testkit::fixtures::TestFixture;
//!
//! async fn example() {
//!     let fixture = TestFixture::new();
//!     let hashes = fixture.certify_many(3).await;
//!     let receipt = fixture.batch_and_submit().await;
//! }
//! ```

pub mod fixtures;
pub mod generators;
pub mod vectors;

pub use fixtures::TestFixture;
pub use generators::{leaves, RequestParams};
pub use vectors::{all_vectors, reference_root, verify_all_vectors, MerkleVector};
