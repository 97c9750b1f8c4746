//! Document CRUD operations.
//!
//! Documents are stored one row per document: a rowid primary key plus the
//! fields as a JSON object with camelCase keys, matching what the
//! application serializes to its frontend. AUTOINCREMENT keeps ids
//! monotonic for the lifetime of the database, so a deleted id is never
//! reissued.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio_rusqlite::{params, rusqlite};

use crate::connection::DocumentStore;
use crate::error::StoreError;

/// Creation payload for a document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EcritureInput {
    pub title: String,
    /// Lower bound of the writing-goal length range. Stored as-is.
    pub min_size: i64,
    /// Upper bound of the writing-goal length range. Stored as-is.
    pub max_size: i64,
    pub body: String,
}

/// A stored document.
///
/// `min_size`/`max_size` and the timestamps were introduced at schema
/// generation 2. On documents persisted under generation 1 they read as
/// `None`; the store never synthesizes values for fields a later generation
/// renamed or added.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ecriture {
    /// Primary key, assigned once at creation and never reused.
    #[serde(skip)]
    pub id: i64,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_size: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_size: Option<i64>,
    pub body: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified_at: Option<String>,
}

/// Partial update for a document; `None` fields are left unchanged.
#[derive(Debug, Clone, Default)]
pub struct EcriturePatch {
    pub title: Option<String>,
    pub min_size: Option<i64>,
    pub max_size: Option<i64>,
    pub body: Option<String>,
}

impl EcriturePatch {
    /// The supplied fields as JSON entries, keyed the way they are stored.
    fn entries(&self) -> Map<String, Value> {
        let mut fields = Map::new();
        if let Some(title) = &self.title {
            fields.insert("title".into(), Value::from(title.clone()));
        }
        if let Some(min_size) = self.min_size {
            fields.insert("minSize".into(), Value::from(min_size));
        }
        if let Some(max_size) = self.max_size {
            fields.insert("maxSize".into(), Value::from(max_size));
        }
        if let Some(body) = &self.body {
            fields.insert("body".into(), Value::from(body.clone()));
        }
        fields
    }
}

fn parse_document(id: i64, data: &str) -> Result<Ecriture, StoreError> {
    let mut doc: Ecriture =
        serde_json::from_str(data).map_err(|e| StoreError::Corrupt { id, reason: e.to_string() })?;
    doc.id = id;
    Ok(doc)
}

impl DocumentStore {
    /// Persist a new document and return its assigned id.
    ///
    /// Sets `createdAt == modifiedAt` to the current time.
    pub async fn create(&self, input: &EcritureInput) -> Result<i64, StoreError> {
        let now = Utc::now().to_rfc3339();
        let data = serde_json::json!({
            "title": input.title,
            "minSize": input.min_size,
            "maxSize": input.max_size,
            "body": input.body,
            "createdAt": now,
            "modifiedAt": now,
        })
        .to_string();

        self.conn
            .call(move |conn| -> Result<i64, StoreError> {
                conn.execute("INSERT INTO ecritures (data) VALUES (?1)", params![data])
                    .map_err(StoreError::from)?;
                Ok(conn.last_insert_rowid())
            })
            .await
            .map_err(StoreError::from)
    }

    /// Get a document by id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if the id does not exist.
    pub async fn get(&self, id: i64) -> Result<Ecriture, StoreError> {
        self.conn
            .call(move |conn| -> Result<Ecriture, StoreError> {
                let result =
                    conn.query_row("SELECT data FROM ecritures WHERE id = ?1", params![id], |row| {
                        row.get::<_, String>(0)
                    });

                match result {
                    Ok(data) => parse_document(id, &data),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Err(StoreError::NotFound(id)),
                    Err(e) => Err(e.into()),
                }
            })
            .await
            .map_err(StoreError::from)
    }

    /// Apply a partial update and refresh `modifiedAt`.
    ///
    /// Only the supplied fields change. Keys the current schema generation
    /// does not know about (e.g. a legacy `targetSize`) survive the merge.
    /// The read-merge-write runs inside one transaction.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if the id does not exist.
    pub async fn update(&self, id: i64, patch: &EcriturePatch) -> Result<(), StoreError> {
        let fields = patch.entries();
        let now = Utc::now().to_rfc3339();

        self.conn
            .call(move |conn| -> Result<(), StoreError> {
                let tx = conn.transaction().map_err(StoreError::from)?;

                let data = match tx.query_row(
                    "SELECT data FROM ecritures WHERE id = ?1",
                    params![id],
                    |row| row.get::<_, String>(0),
                ) {
                    Ok(data) => data,
                    Err(rusqlite::Error::QueryReturnedNoRows) => return Err(StoreError::NotFound(id)),
                    Err(e) => return Err(e.into()),
                };

                let mut doc: Value = serde_json::from_str(&data)
                    .map_err(|e| StoreError::Corrupt { id, reason: e.to_string() })?;
                let Some(object) = doc.as_object_mut() else {
                    return Err(StoreError::Corrupt { id, reason: "payload is not an object".into() });
                };

                for (key, value) in fields {
                    object.insert(key, value);
                }
                object.insert("modifiedAt".into(), Value::from(now));

                tx.execute(
                    "UPDATE ecritures SET data = ?1 WHERE id = ?2",
                    params![doc.to_string(), id],
                )
                .map_err(StoreError::from)?;
                tx.commit().map_err(StoreError::from)?;
                Ok(())
            })
            .await
            .map_err(StoreError::from)
    }

    /// Delete a document by id. The id is never reissued.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if the id does not exist.
    pub async fn delete(&self, id: i64) -> Result<(), StoreError> {
        self.conn
            .call(move |conn| -> Result<(), StoreError> {
                let affected = conn
                    .execute("DELETE FROM ecritures WHERE id = ?1", params![id])
                    .map_err(StoreError::from)?;
                if affected == 0 {
                    return Err(StoreError::NotFound(id));
                }
                Ok(())
            })
            .await
            .map_err(StoreError::from)
    }

    /// All documents, ordered by ascending id.
    pub async fn list(&self) -> Result<Vec<Ecriture>, StoreError> {
        self.conn
            .call(|conn| -> Result<Vec<Ecriture>, StoreError> {
                let mut stmt = conn
                    .prepare("SELECT id, data FROM ecritures ORDER BY id ASC")
                    .map_err(StoreError::from)?;

                let rows = stmt
                    .query_map([], |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)))
                    .map_err(StoreError::from)?;

                let mut documents = Vec::new();
                for row in rows {
                    let (id, data) = row.map_err(StoreError::from)?;
                    documents.push(parse_document(id, &data)?);
                }
                Ok(documents)
            })
            .await
            .map_err(StoreError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::SCHEMA_HISTORY;

    fn draft() -> EcritureInput {
        EcritureInput {
            title: "draft".to_string(),
            min_size: 100,
            max_size: 500,
            body: "hello".to_string(),
        }
    }

    async fn insert_legacy(store: &DocumentStore, data: &'static str) -> i64 {
        store
            .conn
            .call(move |conn| -> Result<i64, StoreError> {
                conn.execute("INSERT INTO ecritures (data) VALUES (?1)", params![data])?;
                Ok(conn.last_insert_rowid())
            })
            .await
            .unwrap()
    }

    async fn raw_data(store: &DocumentStore, id: i64) -> String {
        store
            .conn
            .call(move |conn| {
                conn.query_row("SELECT data FROM ecritures WHERE id = ?1", params![id], |row| row.get(0))
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_create_then_get() {
        let store = DocumentStore::open_in_memory(SCHEMA_HISTORY).await.unwrap();

        let id = store.create(&draft()).await.unwrap();
        let doc = store.get(id).await.unwrap();

        assert_eq!(doc.id, id);
        assert_eq!(doc.title, "draft");
        assert_eq!(doc.min_size, Some(100));
        assert_eq!(doc.max_size, Some(500));
        assert_eq!(doc.body, "hello");
        assert!(doc.created_at.is_some());
        assert_eq!(doc.created_at, doc.modified_at);
    }

    #[tokio::test]
    async fn test_update_partial_leaves_other_fields() {
        let store = DocumentStore::open_in_memory(SCHEMA_HISTORY).await.unwrap();
        let id = store.create(&draft()).await.unwrap();

        let patch = EcriturePatch { body: Some("hello world".to_string()), ..Default::default() };
        store.update(id, &patch).await.unwrap();

        let doc = store.get(id).await.unwrap();
        assert_eq!(doc.body, "hello world");
        assert_eq!(doc.title, "draft");
        assert_eq!(doc.min_size, Some(100));
        assert_eq!(doc.max_size, Some(500));
    }

    #[tokio::test]
    async fn test_update_refreshes_modified_at() {
        let store = DocumentStore::open_in_memory(SCHEMA_HISTORY).await.unwrap();
        let id = store.create(&draft()).await.unwrap();
        let before = store.get(id).await.unwrap();

        tokio::time::sleep(tokio::time::Duration::from_millis(10)).await;
        store.update(id, &EcriturePatch { title: Some("revised".to_string()), ..Default::default() })
            .await
            .unwrap();

        let after = store.get(id).await.unwrap();
        assert_eq!(after.created_at, before.created_at);
        assert!(after.modified_at > before.modified_at);
    }

    #[tokio::test]
    async fn test_update_missing_is_not_found() {
        let store = DocumentStore::open_in_memory(SCHEMA_HISTORY).await.unwrap();
        let result = store.update(99, &EcriturePatch::default()).await;
        assert!(matches!(result, Err(StoreError::NotFound(99))));
    }

    #[tokio::test]
    async fn test_delete_then_get_is_not_found() {
        let store = DocumentStore::open_in_memory(SCHEMA_HISTORY).await.unwrap();
        let id = store.create(&draft()).await.unwrap();

        store.delete(id).await.unwrap();

        assert!(matches!(store.get(id).await, Err(StoreError::NotFound(_))));
        assert!(matches!(store.delete(id).await, Err(StoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_deleted_id_is_never_reissued() {
        let store = DocumentStore::open_in_memory(SCHEMA_HISTORY).await.unwrap();

        let first = store.create(&draft()).await.unwrap();
        let second = store.create(&draft()).await.unwrap();
        store.delete(second).await.unwrap();

        let third = store.create(&draft()).await.unwrap();
        assert!(third > second);
        assert!(first < second);
    }

    #[tokio::test]
    async fn test_list_ordered_by_id() {
        let store = DocumentStore::open_in_memory(SCHEMA_HISTORY).await.unwrap();
        for title in ["a", "b", "c"] {
            store.create(&EcritureInput { title: title.to_string(), ..draft() }).await.unwrap();
        }

        let docs = store.list().await.unwrap();
        assert_eq!(docs.len(), 3);
        assert!(docs.windows(2).all(|pair| pair[0].id < pair[1].id));
        assert_eq!(docs[0].title, "a");
        assert_eq!(docs[2].title, "c");
    }

    #[tokio::test]
    async fn test_legacy_document_reads_renamed_fields_as_absent() {
        let store = DocumentStore::open_in_memory(SCHEMA_HISTORY).await.unwrap();
        let id = insert_legacy(&store, r#"{"title":"legacy","targetSize":300,"body":"old"}"#).await;

        let doc = store.get(id).await.unwrap();
        assert_eq!(doc.title, "legacy");
        assert_eq!(doc.body, "old");
        assert_eq!(doc.min_size, None);
        assert_eq!(doc.max_size, None);
        assert_eq!(doc.created_at, None);
        assert_eq!(doc.modified_at, None);
    }

    #[tokio::test]
    async fn test_update_preserves_unknown_legacy_keys() {
        let store = DocumentStore::open_in_memory(SCHEMA_HISTORY).await.unwrap();
        let id = insert_legacy(&store, r#"{"title":"legacy","targetSize":300,"body":"old"}"#).await;

        store.update(id, &EcriturePatch { title: Some("renamed".to_string()), ..Default::default() })
            .await
            .unwrap();

        let data = raw_data(&store, id).await;
        assert!(data.contains("targetSize"));

        let doc = store.get(id).await.unwrap();
        assert_eq!(doc.title, "renamed");
        assert_eq!(doc.min_size, None);
        assert!(doc.modified_at.is_some());
        assert_eq!(doc.created_at, None);
    }

    #[tokio::test]
    async fn test_migration_keeps_documents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ecriture.sqlite");

        {
            let store = DocumentStore::open(&path, &SCHEMA_HISTORY[..1]).await.unwrap();
            assert_eq!(store.generation(), 1);
            insert_legacy(&store, r#"{"title":"legacy","targetSize":300,"body":"old"}"#).await;
        }

        let store = DocumentStore::open(&path, SCHEMA_HISTORY).await.unwrap();
        assert_eq!(store.generation(), 2);

        let docs = store.list().await.unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].title, "legacy");
        assert_eq!(docs[0].body, "old");
        assert_eq!(docs[0].min_size, None);

        let data = raw_data(&store, docs[0].id).await;
        assert!(data.contains("targetSize"));
    }

    #[tokio::test]
    async fn test_end_to_end_document_lifecycle() {
        let store = DocumentStore::open_in_memory(SCHEMA_HISTORY).await.unwrap();

        let id = store.create(&draft()).await.unwrap();
        assert_eq!(id, 1);

        tokio::time::sleep(tokio::time::Duration::from_millis(10)).await;
        store.update(1, &EcriturePatch { body: Some("hello world".to_string()), ..Default::default() })
            .await
            .unwrap();

        let doc = store.get(1).await.unwrap();
        assert_eq!(doc.body, "hello world");
        assert!(doc.modified_at > doc.created_at);

        store.delete(1).await.unwrap();
        assert!(matches!(store.get(1).await, Err(StoreError::NotFound(1))));
    }
}
