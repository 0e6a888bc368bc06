//! Mirror store implementation using SQLite.
//!
//! Operations are split by table family:
//!
//! - `workflow_ops`: workflow upserts, fingerprints, and reads
//! - `execution_ops`: execution upserts, fingerprints, and reads
//! - `derive_ops`: set-based derivation statements and structure writes
//! - `extension_ops`: tables filled by the enhanced and ultra passes
//! - `sync_run_ops`: the sync-run audit log

mod derive_ops;
mod execution_ops;
mod extension_ops;
mod sync_run_ops;
mod workflow_ops;

use std::path::Path;

use parking_lot::{Mutex, MutexGuard};
use rusqlite::{Connection, Transaction};
use tracing::info;

use crate::error::{Result, StoreError};

mod embedded {
    use refinery::embed_migrations;
    embed_migrations!("migrations");
}

// ─────────────────────────────────────────────────────────────────────────────
// Mirror Store
// ─────────────────────────────────────────────────────────────────────────────

/// Local mirror backed by SQLite.
///
/// Thread-safe via an internal `Mutex<Connection>`; every public operation
/// holds the lock for its full duration, so multi-statement operations are
/// never interleaved.
pub struct MirrorStore {
    conn: Mutex<Connection>,
}

impl std::fmt::Debug for MirrorStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MirrorStore").finish_non_exhaustive()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Initialization
// ─────────────────────────────────────────────────────────────────────────────

impl MirrorStore {
    /// Open (or create) the database at `path` and run pending migrations.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;

        let mut store = Self {
            conn: Mutex::new(conn),
        };
        store.run_migrations()?;

        info!(path = %path.display(), "Mirror store opened");
        Ok(store)
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let mut store = Self {
            conn: Mutex::new(conn),
        };
        store.run_migrations()?;
        Ok(store)
    }

    fn run_migrations(&mut self) -> Result<()> {
        let conn = self.conn.get_mut();
        let report = embedded::migrations::runner()
            .run(conn)
            .map_err(|e| StoreError::Migration(e.to_string()))?;
        for migration in report.applied_migrations() {
            info!(migration = %migration, "Applied migration");
        }
        Ok(())
    }

    /// Lock the connection for use.
    pub(crate) fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock()
    }

    /// Run `f` inside a single transaction, committing on success.
    pub(crate) fn with_transaction<T>(
        &self,
        f: impl FnOnce(&Transaction<'_>) -> Result<T>,
    ) -> Result<T> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let value = f(&tx)?;
        tx.commit()?;
        Ok(value)
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_open_in_memory_runs_migrations() {
        let store = MirrorStore::open_in_memory().unwrap();
        let tables: i64 = store
            .conn()
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table'
                 AND name IN ('workflows', 'executions', 'workflow_nodes', 'sync_runs',
                              'workflow_tags', 'workflow_versions', 'workflow_connections',
                              'workflow_triggers', 'workflow_analysis')",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(tables, 9);
    }

    #[test]
    fn test_open_on_disk_creates_parent_and_reopens() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("mirror.db");

        {
            let store = MirrorStore::open(&path).unwrap();
            store
                .upsert_workflow(&test_support::workflow(serde_json::json!({"id": "wf-1"})))
                .unwrap();
        }

        let store = MirrorStore::open(&path).unwrap();
        assert!(store.get_workflow("wf-1").unwrap().is_some());
    }

    #[test]
    fn test_transaction_rolls_back_on_error() {
        let store = MirrorStore::open_in_memory().unwrap();
        let result: Result<()> = store.with_transaction(|tx| {
            tx.execute(
                "INSERT INTO workflow_tags (workflow_id, tag_id, tag_name) VALUES ('a', 't', 'x')",
                [],
            )?;
            Err(StoreError::NotFound("forced".into()))
        });
        assert!(result.is_err());

        let count: i64 = store
            .conn()
            .query_row("SELECT COUNT(*) FROM workflow_tags", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }
}
