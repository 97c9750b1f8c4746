//! Error types for the offline cache controller.
//!
//! Per the controller's propagation policy, only install-phase failures and
//! explicit store-surface calls return these; failures inside interception
//! (cache writes, lookups) and eviction are logged and isolated.

use tokio_rusqlite::rusqlite;

use crate::config::ConfigError;

/// Errors surfaced by the offline cache layer.
#[derive(Debug, thiserror::Error)]
pub enum OfflineError {
    /// Configuration failed to load or validate.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A manifest path or intercepted URL does not resolve.
    #[error("invalid url: {0}")]
    InvalidUrl(String),

    /// Network transport failure on an intercepted request.
    #[error("http error: {0}")]
    Http(String),

    /// All-or-nothing manifest prefetch aborted; the generation never
    /// becomes active and the previous one keeps serving.
    #[error("install of {url} failed: {reason}")]
    Install { url: String, reason: String },

    /// Cache database operation failed.
    #[error("cache database error: {0}")]
    Database(tokio_rusqlite::Error),

    /// Cache schema migration failed to apply.
    #[error("cache migration failed: {0}")]
    Migration(String),

    /// A stored entry no longer decodes.
    #[error("cache entry corrupt: {0}")]
    Corrupt(String),
}

impl From<tokio_rusqlite::Error<OfflineError>> for OfflineError {
    fn from(err: tokio_rusqlite::Error<OfflineError>) -> Self {
        match err {
            tokio_rusqlite::Error::Error(e) => e,
            tokio_rusqlite::Error::ConnectionClosed => OfflineError::Database(tokio_rusqlite::Error::ConnectionClosed),
            tokio_rusqlite::Error::Close(c) => OfflineError::Database(tokio_rusqlite::Error::Close(c)),
            _ => OfflineError::Database(tokio_rusqlite::Error::ConnectionClosed),
        }
    }
}

impl From<tokio_rusqlite::Error<rusqlite::Error>> for OfflineError {
    fn from(err: tokio_rusqlite::Error<rusqlite::Error>) -> Self {
        OfflineError::Database(err)
    }
}

impl From<rusqlite::Error> for OfflineError {
    fn from(err: rusqlite::Error) -> Self {
        OfflineError::Database(tokio_rusqlite::Error::Error(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_install_error_display() {
        let err = OfflineError::Install { url: "http://localhost/".into(), reason: "status 404".into() };
        assert!(err.to_string().contains("http://localhost/"));
        assert!(err.to_string().contains("status 404"));
    }
}
