//! Database schema migrations for SQLite.
//!
//! Each migration is a SQL batch that transforms the schema from version N
//! to N+1. Applied versions are recorded in `schema_migrations`.

use rusqlite::Connection;

use certchain_core::now_millis;

use crate::error::{Result, StoreError};

/// Current schema version.
pub const CURRENT_VERSION: u32 = 1;

/// Initialize or migrate the database schema.
///
/// This function is idempotent - it can be called multiple times safely.
pub fn migrate(conn: &mut Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at INTEGER NOT NULL
        )",
        [],
    )?;

    let current: u32 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
        [],
        |row| row.get(0),
    )?;

    if current > CURRENT_VERSION {
        return Err(StoreError::Migration(format!(
            "database schema version {} is newer than supported version {}",
            current, CURRENT_VERSION
        )));
    }

    if current < CURRENT_VERSION {
        let tx = conn.transaction()?;

        for version in (current + 1)..=CURRENT_VERSION {
            apply_migration(&tx, version)?;

            tx.execute(
                "INSERT INTO schema_migrations (version, applied_at) VALUES (?1, ?2)",
                rusqlite::params![version, now_millis()],
            )?;
            tracing::info!(version, "applied schema migration");
        }

        tx.commit()?;
    }

    Ok(())
}

/// Apply a specific migration version.
fn apply_migration(conn: &Connection, version: u32) -> Result<()> {
    match version {
        1 => apply_v1(conn),
        _ => Err(StoreError::Migration(format!(
            "unknown migration version: {}",
            version
        ))),
    }
}

/// Migration v1: Initial schema.
fn apply_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        -- Batches: one Merkle tree each
        CREATE TABLE batches (
            batch_id INTEGER PRIMARY KEY,     -- locally assigned, monotonic
            merkle_root BLOB NOT NULL,        -- 32 bytes
            item_count INTEGER NOT NULL,
            status TEXT NOT NULL,             -- 'pending' | 'confirmed'
            network TEXT NOT NULL,
            tx_hash TEXT,
            block_number INTEGER,
            on_chain_batch_id INTEGER,
            created_at INTEGER NOT NULL,      -- Unix ms
            confirmed_at INTEGER
        );

        -- Inclusion proofs, one per (content, batch)
        CREATE TABLE proofs (
            content_hash BLOB NOT NULL,       -- 32 bytes
            batch_id INTEGER NOT NULL,
            leaf_index INTEGER NOT NULL,
            sibling_path BLOB NOT NULL,       -- CBOR array of {hash, side}
            PRIMARY KEY (content_hash, batch_id)
        );

        -- Certification manifests
        CREATE TABLE manifests (
            content_hash BLOB PRIMARY KEY,    -- 32 bytes
            manifest_hash BLOB NOT NULL,      -- 32 bytes
            content_type TEXT NOT NULL,
            batch_id INTEGER,
            manifest_data TEXT NOT NULL,      -- JSON
            created_at INTEGER NOT NULL
        );

        -- Audit trail
        CREATE TABLE audit_log (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            action TEXT NOT NULL,
            entity_type TEXT NOT NULL,
            entity_id TEXT NOT NULL,
            actor_id TEXT,
            details TEXT NOT NULL,            -- JSON
            created_at INTEGER NOT NULL
        );

        CREATE INDEX idx_batches_status ON batches(status);
        CREATE INDEX idx_proofs_batch ON proofs(batch_id);
        CREATE INDEX idx_manifests_batch ON manifests(batch_id);
        CREATE INDEX idx_audit_entity ON audit_log(entity_type, entity_id);
        "#,
    )?;

    Ok(())
}
