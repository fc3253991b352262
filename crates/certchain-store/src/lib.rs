//! # certchain store
//!
//! Persistence abstraction for certchain. The pipeline keeps its working
//! state in memory and mirrors batches, proofs, manifests and audit entries
//! through the [`Store`] trait.
//!
//! ## Key Types
//!
//! - [`Store`] - The async trait for all persistence operations
//! - [`SqliteStore`] - SQLite-based durable storage
//! - [`MemoryStore`] - In-memory storage for tests and ephemeral runs
//! - [`ManifestRecord`] - A persisted certification manifest
//! - [`AuditEntry`] - One audit trail entry
//!
//! ## Usage
//!
//! ```rust,no_run
//! use certchain_store::{SqliteStore, Store};
//!
//! async fn example() {
//!     // Open a SQLite database
//!     let store = SqliteStore::open("certchain.db").unwrap();
//!
//!     // Or use an in-memory database for testing
//!     let store = SqliteStore::open_memory().unwrap();
//!
//!     let stats = store.get_stats().await.unwrap();
//!     println!("{} batches", stats.total_batches);
//! }
//! ```

pub mod error;
pub mod memory;
pub mod migration;
pub mod sqlite;
pub mod traits;

pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use traits::{AuditEntry, ManifestRecord, Store, StoreExt, StoreStats};
