//! Schema-generation migration for the document database.
//!
//! Applied generations are tracked in a `_generations` version table. On
//! open, every pending generation is applied in increasing version order:
//! the collection table is created if absent and the expression-index set is
//! reconciled against the generation's declared attributes. Document
//! payloads are never rewritten; fields introduced by a later generation
//! stay absent on older documents until the caller writes them.

use std::collections::HashSet;

use tokio_rusqlite::{Connection, params, rusqlite};

use crate::error::StoreError;
use crate::schema::SchemaGeneration;

/// Run any pending schema generations, oldest to newest.
///
/// Returns the active generation after migration. Re-running against an
/// already-migrated database performs no writes.
///
/// # Errors
///
/// - [`StoreError::Migration`] if the history is empty, not strictly
///   increasing, or declares non-identifier attribute names
/// - [`StoreError::SchemaConflict`] if the on-disk generation is newer than
///   the newest supplied definition
/// - [`StoreError::Io`] if any statement fails
pub async fn run(conn: &Connection, history: &[SchemaGeneration]) -> Result<i64, StoreError> {
    validate(history)?;
    let history = history.to_vec();

    conn.call(move |conn| -> Result<i64, StoreError> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS _generations (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL
            )",
            [],
        )
        .map_err(StoreError::from)?;

        let current: i64 = conn
            .query_row("SELECT COALESCE(MAX(version), 0) FROM _generations", [], |row| row.get(0))
            .map_err(StoreError::from)?;

        let latest = history[history.len() - 1].version;
        if current > latest {
            return Err(StoreError::SchemaConflict { on_disk: current, latest });
        }

        for generation in history.iter().filter(|g| g.version > current) {
            apply(conn, generation)?;
            conn.execute(
                "INSERT INTO _generations (version, applied_at) VALUES (?1, ?2)",
                params![generation.version, chrono::Utc::now().to_rfc3339()],
            )
            .map_err(StoreError::from)?;
            tracing::debug!(version = generation.version, "applied schema generation");
        }

        Ok(latest)
    })
    .await
    .map_err(StoreError::from)
}

fn validate(history: &[SchemaGeneration]) -> Result<(), StoreError> {
    if history.is_empty() {
        return Err(StoreError::Migration("schema history is empty".into()));
    }
    for pair in history.windows(2) {
        if pair[0].version >= pair[1].version {
            return Err(StoreError::Migration(format!(
                "schema history versions must strictly increase ({} then {})",
                pair[0].version, pair[1].version
            )));
        }
    }
    for generation in history {
        if generation.version < 1 {
            return Err(StoreError::Migration(format!("generation {} must be >= 1", generation.version)));
        }
        if !generation.attrs_are_identifiers() {
            return Err(StoreError::Migration(format!(
                "generation {} declares a non-identifier attribute",
                generation.version
            )));
        }
    }
    Ok(())
}

/// Bring the collection table and its index set up to one generation.
///
/// Attribute names are validated identifiers, so splicing them into index
/// DDL is safe (DDL cannot be parameterized).
fn apply(conn: &rusqlite::Connection, generation: &SchemaGeneration) -> Result<(), StoreError> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS ecritures (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            data TEXT NOT NULL
        )",
        [],
    )
    .map_err(StoreError::from)?;

    let desired: HashSet<String> = generation.indexed.iter().map(|attr| format!("idx_ecritures_{attr}")).collect();

    let existing: Vec<String> = {
        let mut stmt = conn
            .prepare("SELECT name FROM sqlite_master WHERE type = 'index' AND name LIKE 'idx_ecritures_%'")
            .map_err(StoreError::from)?;
        let names = stmt
            .query_map([], |row| row.get(0))
            .map_err(StoreError::from)?
            .collect::<Result<Vec<String>, _>>()
            .map_err(StoreError::from)?;
        names
    };

    for name in existing.iter().filter(|name| !desired.contains(*name)) {
        conn.execute_batch(&format!("DROP INDEX IF EXISTS {name}")).map_err(StoreError::from)?;
    }

    for attr in generation.indexed {
        conn.execute_batch(&format!(
            "CREATE INDEX IF NOT EXISTS idx_ecritures_{attr} ON ecritures (json_extract(data, '$.{attr}'))"
        ))
        .map_err(StoreError::from)?;
    }

    Ok(())
}
