//! Named cache-generation store.
//!
//! One SQLite database holds every generation: a `generations` row per
//! name and an `entries` row per cached request identity. Deleting a
//! generation cascades to its entries. Access runs through tokio-rusqlite
//! on a background thread.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tokio_rusqlite::{Connection, params, rusqlite};

use crate::error::OfflineError;
use crate::hash::request_key;
use crate::migrations;

/// A cached response, keyed by the request identity that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedResponse {
    pub method: String,
    pub url: String,
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
    pub fetched_at: String,
}

/// Cache database handle.
#[derive(Clone, Debug)]
pub struct CacheStore {
    pub(crate) conn: Connection,
}

impl CacheStore {
    /// Open a cache database at the specified path.
    ///
    /// Creates the file if it doesn't exist, applies performance pragmas,
    /// and runs any pending migrations. `foreign_keys` stays ON so
    /// generation deletion cascades to entries.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, OfflineError> {
        let conn = Connection::open(path).await.map_err(|e| OfflineError::Database(e.into()))?;
        Self::init(conn).await
    }

    /// Open an in-memory cache database for testing.
    pub async fn open_in_memory() -> Result<Self, OfflineError> {
        let conn = Connection::open_in_memory().await.map_err(|e| OfflineError::Database(e.into()))?;
        Self::init(conn).await
    }

    async fn init(conn: Connection) -> Result<Self, OfflineError> {
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
        .map_err(OfflineError::Database)?;

        migrations::run(&conn).await?;

        Ok(Self { conn })
    }

    /// Open a generation by name, creating it if absent.
    pub async fn open_generation(&self, name: &str) -> Result<(), OfflineError> {
        let name = name.to_string();
        let created_at = chrono::Utc::now().to_rfc3339();
        self.conn
            .call(move |conn| -> Result<(), OfflineError> {
                conn.execute(
                    "INSERT OR IGNORE INTO generations (name, created_at) VALUES (?1, ?2)",
                    params![name, created_at],
                )?;
                Ok(())
            })
            .await
            .map_err(OfflineError::from)
    }

    /// Names of all existing generations.
    pub async fn list_generations(&self) -> Result<Vec<String>, OfflineError> {
        self.conn
            .call(|conn| -> Result<Vec<String>, OfflineError> {
                let mut stmt = conn.prepare("SELECT name FROM generations ORDER BY name")?;
                let names = stmt.query_map([], |row| row.get(0))?.collect::<Result<Vec<String>, _>>()?;
                Ok(names)
            })
            .await
            .map_err(OfflineError::from)
    }

    /// Delete a generation and, by cascade, every entry it holds.
    ///
    /// Deleting an absent generation is a no-op.
    pub async fn delete_generation(&self, name: &str) -> Result<(), OfflineError> {
        let name = name.to_string();
        self.conn
            .call(move |conn| -> Result<(), OfflineError> {
                conn.execute("DELETE FROM generations WHERE name = ?1", params![name])?;
                Ok(())
            })
            .await
            .map_err(OfflineError::from)
    }

    /// Insert or update an entry under its request identity.
    ///
    /// Uses UPSERT semantics: a re-fetch of the same identity replaces the
    /// previously observed response.
    pub async fn put_entry(&self, generation: &str, entry: &CachedResponse) -> Result<(), OfflineError> {
        let generation = generation.to_string();
        let key = request_key(&entry.method, &entry.url);
        let headers_json =
            serde_json::to_string(&entry.headers).map_err(|e| OfflineError::Corrupt(e.to_string()))?;
        let entry = entry.clone();

        self.conn
            .call(move |conn| -> Result<(), OfflineError> {
                conn.execute(
                    "INSERT INTO entries (
                        generation, key_hash, method, url, status, headers_json, body, fetched_at
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                    ON CONFLICT(generation, key_hash) DO UPDATE SET
                        method = excluded.method,
                        url = excluded.url,
                        status = excluded.status,
                        headers_json = excluded.headers_json,
                        body = excluded.body,
                        fetched_at = excluded.fetched_at",
                    params![
                        generation,
                        key,
                        entry.method,
                        entry.url,
                        entry.status,
                        headers_json,
                        entry.body,
                        entry.fetched_at,
                    ],
                )?;
                Ok(())
            })
            .await
            .map_err(OfflineError::from)
    }

    /// Look up an entry by request identity.
    ///
    /// Returns None if the generation holds no response for it.
    pub async fn match_entry(
        &self, generation: &str, method: &str, url: &str,
    ) -> Result<Option<CachedResponse>, OfflineError> {
        let generation = generation.to_string();
        let key = request_key(method, url);

        self.conn
            .call(move |conn| -> Result<Option<CachedResponse>, OfflineError> {
                let mut stmt = conn.prepare(
                    "SELECT method, url, status, headers_json, body, fetched_at
                     FROM entries WHERE generation = ?1 AND key_hash = ?2",
                )?;

                let result = stmt.query_row(params![generation, key], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, u16>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, Vec<u8>>(4)?,
                        row.get::<_, String>(5)?,
                    ))
                });

                match result {
                    Ok((method, url, status, headers_json, body, fetched_at)) => {
                        let headers = serde_json::from_str(&headers_json)
                            .map_err(|e| OfflineError::Corrupt(e.to_string()))?;
                        Ok(Some(CachedResponse { method, url, status, headers, body, fetched_at }))
                    }
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e.into()),
                }
            })
            .await
            .map_err(OfflineError::from)
    }

    /// Number of entries a generation holds.
    pub async fn entry_count(&self, generation: &str) -> Result<u64, OfflineError> {
        let generation = generation.to_string();
        self.conn
            .call(move |conn| -> Result<u64, OfflineError> {
                let count: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM entries WHERE generation = ?1",
                    params![generation],
                    |row| row.get(0),
                )?;
                Ok(count as u64)
            })
            .await
            .map_err(OfflineError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shell_entry(url: &str, body: &str) -> CachedResponse {
        CachedResponse {
            method: "GET".to_string(),
            url: url.to_string(),
            status: 200,
            headers: vec![("content-type".to_string(), "text/html".to_string())],
            body: body.as_bytes().to_vec(),
            fetched_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    #[tokio::test]
    async fn test_put_and_match() {
        let store = CacheStore::open_in_memory().await.unwrap();
        store.open_generation("ecriture-v1").await.unwrap();

        let entry = shell_entry("http://localhost/", "<html>shell</html>");
        store.put_entry("ecriture-v1", &entry).await.unwrap();

        let hit = store.match_entry("ecriture-v1", "GET", "http://localhost/").await.unwrap().unwrap();
        assert_eq!(hit, entry);
    }

    #[tokio::test]
    async fn test_match_missing() {
        let store = CacheStore::open_in_memory().await.unwrap();
        store.open_generation("ecriture-v1").await.unwrap();

        let miss = store.match_entry("ecriture-v1", "GET", "http://localhost/missing").await.unwrap();
        assert!(miss.is_none());
    }

    #[tokio::test]
    async fn test_put_upserts() {
        let store = CacheStore::open_in_memory().await.unwrap();
        store.open_generation("ecriture-v1").await.unwrap();

        store.put_entry("ecriture-v1", &shell_entry("http://localhost/", "old")).await.unwrap();
        store.put_entry("ecriture-v1", &shell_entry("http://localhost/", "new")).await.unwrap();

        let hit = store.match_entry("ecriture-v1", "GET", "http://localhost/").await.unwrap().unwrap();
        assert_eq!(hit.body, b"new");
        assert_eq!(store.entry_count("ecriture-v1").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_generations_are_isolated() {
        let store = CacheStore::open_in_memory().await.unwrap();
        store.open_generation("ecriture-v1").await.unwrap();
        store.open_generation("ecriture-v2").await.unwrap();

        store.put_entry("ecriture-v1", &shell_entry("http://localhost/", "v1")).await.unwrap();

        assert!(store.match_entry("ecriture-v2", "GET", "http://localhost/").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_open_generation_idempotent() {
        let store = CacheStore::open_in_memory().await.unwrap();
        store.open_generation("ecriture-v1").await.unwrap();
        store.put_entry("ecriture-v1", &shell_entry("http://localhost/", "kept")).await.unwrap();

        store.open_generation("ecriture-v1").await.unwrap();

        assert_eq!(store.entry_count("ecriture-v1").await.unwrap(), 1);
        assert_eq!(store.list_generations().await.unwrap(), vec!["ecriture-v1".to_string()]);
    }

    #[tokio::test]
    async fn test_delete_generation_cascades() {
        let store = CacheStore::open_in_memory().await.unwrap();
        store.open_generation("ecriture-v1").await.unwrap();
        store.put_entry("ecriture-v1", &shell_entry("http://localhost/", "gone")).await.unwrap();

        store.delete_generation("ecriture-v1").await.unwrap();

        assert!(store.list_generations().await.unwrap().is_empty());
        assert!(store.match_entry("ecriture-v1", "GET", "http://localhost/").await.unwrap().is_none());
        assert_eq!(store.entry_count("ecriture-v1").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_delete_absent_generation_is_noop() {
        let store = CacheStore::open_in_memory().await.unwrap();
        store.delete_generation("never-existed").await.unwrap();
    }
}
