//! # certchain anchor
//!
//! Ledger abstraction for anchoring batch roots.
//!
//! ## Key Types
//!
//! - [`LedgerClient`] - The async trait every ledger backend implements
//! - [`MemoryLedger`] - Simulated ledger for tests and offline runs
//! - [`Network`] - Known networks and their explorers
//!
//! ## Usage
//!
//! ```rust
//! use certchain_anchor::{LedgerClient, MemoryLedger};
//! use certchain_core::Digest;
//!
//! # tokio_test_block(async {
//! let ledger = MemoryLedger::new();
//! let receipt = ledger
//!     .certify_batch(&Digest::hash(b"root"), "ipfs://pending-1", 1)
//!     .await
//!     .unwrap();
//! println!("{}", ledger.explorer_url(&receipt.tx_hash));
//! # });
//! # fn tokio_test_block<F: std::future::Future>(f: F) -> F::Output {
//! #     tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(f)
//! # }
//! ```

pub mod client;
pub mod error;
pub mod memory;
pub mod network;

pub use client::{AnchorReceipt, LedgerClient, LedgerStatus, OnChainCertification};
pub use error::{AnchorError, Result};
pub use memory::{MemoryLedger, MemoryLedgerConfig};
pub use network::Network;
