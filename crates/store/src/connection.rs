//! Database connection management for the document store.
//!
//! Handles opening the SQLite database, applying required pragmas
//! (WAL mode), and migrating to the newest supplied schema generation.

use std::path::Path;

use tokio_rusqlite::Connection;

use crate::error::StoreError;
use crate::migrations;
use crate::schema::SchemaGeneration;

/// Handle to the versioned document database.
///
/// Wraps a tokio-rusqlite connection that runs storage operations on a
/// background thread; callers suspend at each `.await`.
#[derive(Clone, Debug)]
pub struct DocumentStore {
    pub(crate) conn: Connection,
    generation: i64,
}

impl DocumentStore {
    /// Open the database at `path`, migrating to the newest generation in
    /// `history` (oldest to newest).
    ///
    /// Creates the file and its parent directories if absent. Reopening an
    /// already-migrated database performs no writes.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::StorageUnavailable`] if the host denies the
    /// directory or database file, [`StoreError::SchemaConflict`] if the
    /// on-disk generation is newer than `history`, and
    /// [`StoreError::Migration`] for an invalid history.
    pub async fn open(path: impl AsRef<Path>, history: &[SchemaGeneration]) -> Result<Self, StoreError> {
        let path = path.as_ref();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)
                .map_err(|e| StoreError::StorageUnavailable(format!("cannot create {}: {e}", parent.display())))?;
        }

        let conn = Connection::open(path)
            .await
            .map_err(|e| StoreError::StorageUnavailable(format!("cannot open {}: {e}", path.display())))?;

        Self::init(conn, history).await
    }

    /// Open an in-memory database for testing, with the same pragma
    /// configuration and migration behavior as file-based databases.
    pub async fn open_in_memory(history: &[SchemaGeneration]) -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()
            .await
            .map_err(|e| StoreError::StorageUnavailable(e.to_string()))?;

        Self::init(conn, history).await
    }

    async fn init(conn: Connection, history: &[SchemaGeneration]) -> Result<Self, StoreError> {
        conn.call(|conn| {
            conn.execute_batch(
                "PRAGMA journal_mode=WAL;
                 PRAGMA synchronous=NORMAL;
                 PRAGMA temp_store=MEMORY;
                 PRAGMA foreign_keys=ON;",
            )?;
            Ok(())
        })
        .await
        .map_err(StoreError::Io)?;

        let generation = migrations::run(&conn, history).await?;

        Ok(Self { conn, generation })
    }

    /// The schema generation the database is at after opening.
    pub fn generation(&self) -> i64 {
        self.generation
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::SCHEMA_HISTORY;

    #[tokio::test]
    async fn test_open_in_memory() {
        let store = DocumentStore::open_in_memory(SCHEMA_HISTORY).await.unwrap();
        assert_eq!(store.generation(), 2);
    }

    #[tokio::test]
    async fn test_reopen_is_write_free() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ecriture.sqlite");

        {
            let store = DocumentStore::open(&path, SCHEMA_HISTORY).await.unwrap();
            assert_eq!(store.generation(), 2);
        }

        let store = DocumentStore::open(&path, SCHEMA_HISTORY).await.unwrap();
        let applied: i64 = store
            .conn
            .call(|conn| conn.query_row("SELECT COUNT(*) FROM _generations", [], |row| row.get(0)))
            .await
            .unwrap();

        assert_eq!(applied, SCHEMA_HISTORY.len() as i64);
    }

    #[tokio::test]
    async fn test_open_creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/data/ecriture.sqlite");

        let store = DocumentStore::open(&path, SCHEMA_HISTORY).await.unwrap();
        assert_eq!(store.generation(), 2);
        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_reopen_with_older_history_conflicts() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ecriture.sqlite");

        DocumentStore::open(&path, SCHEMA_HISTORY).await.unwrap();

        let result = DocumentStore::open(&path, &SCHEMA_HISTORY[..1]).await;
        assert!(matches!(result, Err(StoreError::SchemaConflict { on_disk: 2, latest: 1 })));
    }
}
