//! SQLite implementation of the Store trait.
//!
//! This is the durable storage backend. It uses rusqlite with bundled
//! SQLite, wrapped in async via tokio::spawn_blocking.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension};

use certchain_core::{Batch, BatchStatus, ContentType, Digest, MerkleProof, ProofStep};

use crate::error::{Result, StoreError};
use crate::migration;
use crate::traits::{AuditEntry, ManifestRecord, Store, StoreStats};

/// SQLite-based store implementation.
///
/// Thread-safe via internal Mutex. All operations use spawn_blocking
/// to avoid blocking the async runtime.
pub struct SqliteStore {
    /// The SQLite connection, protected by a mutex.
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open a SQLite database at the given path.
    ///
    /// Creates the file and runs migrations if it doesn't exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let mut conn = Connection::open(path)?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory SQLite database.
    ///
    /// Useful for testing.
    pub fn open_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory()?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run a blocking operation on the connection off the async runtime.
    async fn run<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.conn.clone();

        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().map_err(|e| {
                StoreError::Database(rusqlite::Error::SqliteFailure(
                    rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_LOCKED),
                    Some(format!("mutex poisoned: {}", e)),
                ))
            })?;
            f(&conn)
        })
        .await
        .map_err(|e| {
            StoreError::Database(rusqlite::Error::SqliteFailure(
                rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_ERROR),
                Some(format!("spawn_blocking failed: {}", e)),
            ))
        })?
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Row helpers
// ─────────────────────────────────────────────────────────────────────────────

fn digest_column(row: &rusqlite::Row<'_>, column: &str) -> rusqlite::Result<Digest> {
    let bytes: Vec<u8> = row.get(column)?;
    Digest::from_slice(&bytes)
        .map_err(|_| rusqlite::Error::InvalidColumnType(0, column.into(), Type::Blob))
}

fn conversion_error(ty: Type, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(0, ty, message.into())
}

fn opt_u64(value: Option<i64>) -> Option<u64> {
    value.map(|v| v as u64)
}

fn row_to_batch(row: &rusqlite::Row<'_>) -> rusqlite::Result<Batch> {
    let status: String = row.get("status")?;
    let status = BatchStatus::parse(&status)
        .ok_or_else(|| conversion_error(Type::Text, format!("unknown batch status: {}", status)))?;

    Ok(Batch {
        batch_id: row.get::<_, i64>("batch_id")? as u64,
        merkle_root: digest_column(row, "merkle_root")?,
        item_count: row.get::<_, i64>("item_count")? as u32,
        status,
        network: row.get("network")?,
        tx_hash: row.get("tx_hash")?,
        block_number: opt_u64(row.get("block_number")?),
        on_chain_batch_id: opt_u64(row.get("on_chain_batch_id")?),
        created_at: row.get("created_at")?,
        confirmed_at: row.get("confirmed_at")?,
    })
}

fn row_to_proof(row: &rusqlite::Row<'_>) -> rusqlite::Result<MerkleProof> {
    let path_cbor: Vec<u8> = row.get("sibling_path")?;
    let sibling_path: Vec<ProofStep> = ciborium::from_reader(&path_cbor[..])
        .map_err(|e| conversion_error(Type::Blob, format!("sibling_path: {}", e)))?;

    Ok(MerkleProof {
        content_hash: digest_column(row, "content_hash")?,
        batch_id: row.get::<_, i64>("batch_id")? as u64,
        leaf_index: row.get::<_, i64>("leaf_index")? as u32,
        sibling_path,
    })
}

fn row_to_manifest(row: &rusqlite::Row<'_>) -> rusqlite::Result<ManifestRecord> {
    let content_type: String = row.get("content_type")?;
    let content_type: ContentType = content_type
        .parse()
        .map_err(|e: certchain_core::CoreError| conversion_error(Type::Text, e.to_string()))?;
    let manifest_json: String = row.get("manifest_data")?;
    let manifest = serde_json::from_str(&manifest_json)
        .map_err(|e| conversion_error(Type::Text, format!("manifest_data: {}", e)))?;

    Ok(ManifestRecord {
        content_hash: digest_column(row, "content_hash")?,
        manifest_hash: digest_column(row, "manifest_hash")?,
        content_type,
        batch_id: opt_u64(row.get("batch_id")?),
        manifest,
        created_at: row.get("created_at")?,
    })
}

fn row_to_audit(row: &rusqlite::Row<'_>) -> rusqlite::Result<AuditEntry> {
    let details: String = row.get("details")?;
    let details = serde_json::from_str(&details)
        .map_err(|e| conversion_error(Type::Text, format!("details: {}", e)))?;

    Ok(AuditEntry {
        action: row.get("action")?,
        entity_type: row.get("entity_type")?,
        entity_id: row.get("entity_id")?,
        actor_id: row.get("actor_id")?,
        details,
        created_at: row.get("created_at")?,
    })
}

// Sibling paths are stored as CBOR
fn encode_path(path: &[ProofStep]) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    ciborium::into_writer(path, &mut buf).map_err(|e| StoreError::Serialization(e.to_string()))?;
    Ok(buf)
}

const BATCH_COLUMNS: &str = "batch_id, merkle_root, item_count, status, network, tx_hash, \
     block_number, on_chain_batch_id, created_at, confirmed_at";

#[async_trait]
impl Store for SqliteStore {
    async fn save_batch(&self, batch: &Batch) -> Result<()> {
        let batch = batch.clone();

        self.run(move |conn| {
            conn.execute(
                "INSERT INTO batches (
                    batch_id, merkle_root, item_count, status, network, tx_hash,
                    block_number, on_chain_batch_id, created_at, confirmed_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                ON CONFLICT(batch_id) DO UPDATE SET
                    merkle_root = excluded.merkle_root,
                    item_count = excluded.item_count,
                    status = excluded.status,
                    network = excluded.network,
                    tx_hash = excluded.tx_hash,
                    block_number = excluded.block_number,
                    on_chain_batch_id = excluded.on_chain_batch_id,
                    confirmed_at = excluded.confirmed_at",
                params![
                    batch.batch_id as i64,
                    batch.merkle_root.as_bytes().as_slice(),
                    batch.item_count as i64,
                    batch.status.as_str(),
                    batch.network,
                    batch.tx_hash,
                    batch.block_number.map(|n| n as i64),
                    batch.on_chain_batch_id.map(|n| n as i64),
                    batch.created_at,
                    batch.confirmed_at,
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn get_batch(&self, batch_id: u64) -> Result<Option<Batch>> {
        self.run(move |conn| {
            conn.query_row(
                &format!("SELECT {} FROM batches WHERE batch_id = ?1", BATCH_COLUMNS),
                params![batch_id as i64],
                row_to_batch,
            )
            .optional()
            .map_err(StoreError::from)
        })
        .await
    }

    async fn list_batches(&self) -> Result<Vec<Batch>> {
        self.run(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM batches ORDER BY batch_id",
                BATCH_COLUMNS
            ))?;
            let batches = stmt
                .query_map([], row_to_batch)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(batches)
        })
        .await
    }

    async fn pending_batches(&self) -> Result<Vec<Batch>> {
        self.run(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM batches WHERE status = ?1 ORDER BY batch_id",
                BATCH_COLUMNS
            ))?;
            let batches = stmt
                .query_map(params![BatchStatus::Pending.as_str()], row_to_batch)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(batches)
        })
        .await
    }

    async fn save_proof(&self, proof: &MerkleProof) -> Result<()> {
        let proof = proof.clone();

        self.run(move |conn| {
            let path = encode_path(&proof.sibling_path)?;
            conn.execute(
                "INSERT OR REPLACE INTO proofs (content_hash, batch_id, leaf_index, sibling_path)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    proof.content_hash.as_bytes().as_slice(),
                    proof.batch_id as i64,
                    proof.leaf_index as i64,
                    path,
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn get_proof(&self, content_hash: &Digest) -> Result<Option<MerkleProof>> {
        let content_hash = *content_hash;

        self.run(move |conn| {
            conn.query_row(
                "SELECT content_hash, batch_id, leaf_index, sibling_path
                 FROM proofs WHERE content_hash = ?1
                 ORDER BY batch_id DESC LIMIT 1",
                params![content_hash.as_bytes().as_slice()],
                row_to_proof,
            )
            .optional()
            .map_err(StoreError::from)
        })
        .await
    }

    async fn save_manifest(&self, record: &ManifestRecord) -> Result<()> {
        let record = record.clone();

        self.run(move |conn| {
            let manifest_json = serde_json::to_string(&record.manifest)?;
            conn.execute(
                "INSERT OR REPLACE INTO manifests (
                    content_hash, manifest_hash, content_type, batch_id, manifest_data, created_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    record.content_hash.as_bytes().as_slice(),
                    record.manifest_hash.as_bytes().as_slice(),
                    record.content_type.as_str(),
                    record.batch_id.map(|n| n as i64),
                    manifest_json,
                    record.created_at,
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn get_manifest(&self, content_hash: &Digest) -> Result<Option<ManifestRecord>> {
        let content_hash = *content_hash;

        self.run(move |conn| {
            conn.query_row(
                "SELECT content_hash, manifest_hash, content_type, batch_id, manifest_data, created_at
                 FROM manifests WHERE content_hash = ?1",
                params![content_hash.as_bytes().as_slice()],
                row_to_manifest,
            )
            .optional()
            .map_err(StoreError::from)
        })
        .await
    }

    async fn update_manifest_batch(&self, content_hash: &Digest, batch_id: u64) -> Result<bool> {
        let content_hash = *content_hash;

        self.run(move |conn| {
            let updated = conn.execute(
                "UPDATE manifests SET batch_id = ?1 WHERE content_hash = ?2",
                params![batch_id as i64, content_hash.as_bytes().as_slice()],
            )?;
            Ok(updated > 0)
        })
        .await
    }

    async fn log_audit(&self, entry: &AuditEntry) -> Result<()> {
        let entry = entry.clone();

        self.run(move |conn| {
            let details = serde_json::to_string(&entry.details)?;
            conn.execute(
                "INSERT INTO audit_log (action, entity_type, entity_id, actor_id, details, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    entry.action,
                    entry.entity_type,
                    entry.entity_id,
                    entry.actor_id,
                    details,
                    entry.created_at,
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn audit_log(&self, limit: usize) -> Result<Vec<AuditEntry>> {
        self.run(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT action, entity_type, entity_id, actor_id, details, created_at
                 FROM audit_log ORDER BY id DESC LIMIT ?1",
            )?;
            let entries = stmt
                .query_map(params![limit as i64], row_to_audit)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(entries)
        })
        .await
    }

    async fn get_stats(&self) -> Result<StoreStats> {
        self.run(|conn| {
            let (total, pending, confirmed, last): (i64, i64, i64, Option<i64>) = conn.query_row(
                "SELECT COUNT(*),
                        COALESCE(SUM(status = 'pending'), 0),
                        COALESCE(SUM(status = 'confirmed'), 0),
                        MAX(batch_id)
                 FROM batches",
                [],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
            )?;
            let proofs: i64 = conn.query_row("SELECT COUNT(*) FROM proofs", [], |row| row.get(0))?;
            let manifests: i64 =
                conn.query_row("SELECT COUNT(*) FROM manifests", [], |row| row.get(0))?;

            Ok(StoreStats {
                total_batches: total as u64,
                pending_batches: pending as u64,
                confirmed_batches: confirmed as u64,
                total_proofs: proofs as u64,
                total_manifests: manifests as u64,
                last_batch_id: opt_u64(last),
            })
        })
        .await
    }
}
