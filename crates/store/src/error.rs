//! Error types for the document store.
//!
//! Every failure mode is a distinct variant so callers can route on it:
//! initialization failures are fatal, per-call failures are recoverable.

use tokio_rusqlite::rusqlite;

/// Errors surfaced by [`crate::DocumentStore`].
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Persistent storage denied or unsupported by the host. Fatal to
    /// initialization; callers fall back to in-memory operation.
    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),

    /// The on-disk generation is newer than any supplied schema definition.
    /// The running application is older than the stored data.
    #[error("schema conflict: on-disk generation {on_disk} is newer than latest known generation {latest}")]
    SchemaConflict { on_disk: i64, latest: i64 },

    /// Invalid schema history or failed generation bookkeeping.
    #[error("migration failed: {0}")]
    Migration(String),

    /// Storage-engine I/O failure on a CRUD operation. Surfaced per call,
    /// never retried internally.
    #[error("storage i/o error: {0}")]
    Io(tokio_rusqlite::Error),

    /// The referenced document id does not exist.
    #[error("document {0} not found")]
    NotFound(i64),

    /// A stored payload no longer parses as a document.
    #[error("document {id} is corrupt: {reason}")]
    Corrupt { id: i64, reason: String },
}

impl From<tokio_rusqlite::Error<StoreError>> for StoreError {
    fn from(err: tokio_rusqlite::Error<StoreError>) -> Self {
        match err {
            tokio_rusqlite::Error::Error(e) => e,
            tokio_rusqlite::Error::ConnectionClosed => StoreError::Io(tokio_rusqlite::Error::ConnectionClosed),
            tokio_rusqlite::Error::Close(c) => StoreError::Io(tokio_rusqlite::Error::Close(c)),
            _ => StoreError::Io(tokio_rusqlite::Error::ConnectionClosed),
        }
    }
}

impl From<tokio_rusqlite::Error<rusqlite::Error>> for StoreError {
    fn from(err: tokio_rusqlite::Error<rusqlite::Error>) -> Self {
        StoreError::Io(err)
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        StoreError::Io(tokio_rusqlite::Error::Error(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = StoreError::NotFound(42);
        assert!(err.to_string().contains("42"));
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn test_schema_conflict_display() {
        let err = StoreError::SchemaConflict { on_disk: 3, latest: 2 };
        assert!(err.to_string().contains("generation 3"));
        assert!(err.to_string().contains("generation 2"));
    }
}
