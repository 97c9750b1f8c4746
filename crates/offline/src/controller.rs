//! Cache-generation lifecycle and fetch interception.
//!
//! The controller walks one generation through
//! `Uninitialized → Installing → Active`:
//!
//! - **install**: open the generation named for this deployment and
//!   prefetch the manifest, all-or-nothing.
//! - **activate**: evict every other generation, then start serving.
//! - **intercept**: per request, cache-first against the active generation;
//!   misses go to the network and plain successful responses are cached
//!   behind the caller's back.
//!
//! Superseded generations are evicted rows, not controller states. There is
//! no TTL or revalidation; staleness is bounded by the deploy cycle.

use chrono::Utc;
use futures_util::future::join_all;
use reqwest::{Method, StatusCode, Url};

use crate::config::OfflineConfig;
use crate::error::OfflineError;
use crate::fetch::{FetchClient, FetchResponse};
use crate::generations::{CacheStore, CachedResponse};

/// Lifecycle phase of the controller's own generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Uninitialized,
    Installing,
    Active,
}

/// Where an intercepted response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSource {
    Cache,
    Network,
}

/// Response handed back to the intercepted caller.
#[derive(Debug, Clone)]
pub struct InterceptedResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: bytes::Bytes,
    pub source: ResponseSource,
}

impl InterceptedResponse {
    fn from_cache(entry: CachedResponse) -> Self {
        Self {
            status: entry.status,
            headers: entry.headers,
            body: bytes::Bytes::from(entry.body),
            source: ResponseSource::Cache,
        }
    }

    fn from_network(response: FetchResponse) -> Self {
        Self {
            status: response.status.as_u16(),
            headers: response.header_pairs(),
            body: response.bytes,
            source: ResponseSource::Network,
        }
    }
}

/// Whether a network response may enter the cache.
///
/// The cache admits only plain successful responses: GET, status 200, and a
/// final URL (after redirects) on the same origin as the request. Anything
/// else is relayed to the caller untouched.
fn is_cacheable(method: &Method, requested: &Url, response: &FetchResponse, max_bytes: usize) -> bool {
    *method == Method::GET
        && response.status == StatusCode::OK
        && response.final_url.origin() == requested.origin()
        && response.bytes.len() <= max_bytes
}

fn to_entry(method: &Method, url: &Url, response: &FetchResponse) -> CachedResponse {
    CachedResponse {
        method: method.to_string(),
        url: url.to_string(),
        status: response.status.as_u16(),
        headers: response.header_pairs(),
        body: response.bytes.to_vec(),
        fetched_at: Utc::now().to_rfc3339(),
    }
}

/// Offline cache controller for one deployed generation.
pub struct OfflineCacheController {
    store: CacheStore,
    client: FetchClient,
    config: OfflineConfig,
    origin: Url,
    phase: Phase,
}

impl OfflineCacheController {
    /// Create a controller over the configured cache database.
    ///
    /// The controller starts `Uninitialized`; the host drives `install`
    /// then `activate` before interception serves from cache.
    pub async fn new(config: OfflineConfig) -> Result<Self, OfflineError> {
        config.validate()?;
        let store = CacheStore::open(&config.db_path).await?;
        Self::with_store(config, store)
    }

    fn with_store(config: OfflineConfig, store: CacheStore) -> Result<Self, OfflineError> {
        let origin = Url::parse(&config.shell_origin).map_err(|e| OfflineError::InvalidUrl(e.to_string()))?;
        let client = FetchClient::new(&config)?;
        Ok(Self { store, client, config, origin, phase: Phase::Uninitialized })
    }

    /// Current lifecycle phase.
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Name of the generation this controller serves from.
    pub fn generation_name(&self) -> &str {
        &self.config.cache_name
    }

    /// Resolve a manifest path or intercepted URL against the shell origin.
    fn resolve(&self, raw: &str) -> Result<Url, OfflineError> {
        if raw.contains("://") {
            Url::parse(raw).map_err(|e| OfflineError::InvalidUrl(format!("{raw}: {e}")))
        } else {
            self.origin.join(raw).map_err(|e| OfflineError::InvalidUrl(format!("{raw}: {e}")))
        }
    }

    /// Install this deployment's generation: open it and prefetch the
    /// manifest.
    ///
    /// All-or-nothing: the first manifest URL that fails to fetch, store,
    /// or answer anything but 200 aborts the installation, and the
    /// generation never becomes active. Entries already prefetched stay in
    /// the inactive generation; a retried install overwrites them.
    pub async fn install(&mut self) -> Result<(), OfflineError> {
        self.phase = Phase::Installing;
        let generation = self.config.cache_name.clone();

        self.store.open_generation(&generation).await?;
        tracing::debug!(generation = %generation, "opened cache generation");

        for raw in &self.config.manifest {
            let url = self.resolve(raw)?;
            let response = self
                .client
                .fetch(Method::GET, &url)
                .await
                .map_err(|e| OfflineError::Install { url: url.to_string(), reason: e.to_string() })?;

            if response.status != StatusCode::OK {
                return Err(OfflineError::Install {
                    url: url.to_string(),
                    reason: format!("status {}", response.status.as_u16()),
                });
            }

            self.store
                .put_entry(&generation, &to_entry(&Method::GET, &url, &response))
                .await
                .map_err(|e| OfflineError::Install { url: url.to_string(), reason: e.to_string() })?;
        }

        tracing::debug!(generation = %generation, urls = self.config.manifest.len(), "manifest prefetched");
        Ok(())
    }

    /// Activate this generation: evict every other one, then serve.
    ///
    /// Evictions run concurrently and are awaited before activation
    /// completes; a failed eviction is logged and isolated so it cannot
    /// block its siblings or the activation itself.
    pub async fn activate(&mut self) {
        match self.store.list_generations().await {
            Ok(names) => {
                let evictions = names
                    .into_iter()
                    .filter(|name| *name != self.config.cache_name)
                    .map(|name| {
                        let store = self.store.clone();
                        async move {
                            if let Err(e) = store.delete_generation(&name).await {
                                tracing::warn!(generation = %name, error = %e, "failed to evict cache generation");
                            }
                        }
                    });
                join_all(evictions).await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "could not enumerate cache generations for eviction");
            }
        }

        self.phase = Phase::Active;
        tracing::debug!(generation = %self.config.cache_name, "cache generation active");
    }

    /// Decide cache-vs-network for one outgoing request.
    ///
    /// Cache-first: a stored response for the request identity is returned
    /// without touching the network. Otherwise the request is forwarded;
    /// cacheable responses are stored on a spawned task so the write can
    /// neither delay nor fail the response already on its way back.
    ///
    /// # Errors
    ///
    /// Returns [`OfflineError::Http`] when the request misses the cache and
    /// the network transport fails; that failure belongs to the caller.
    pub async fn intercept(&self, method: Method, url: &str) -> Result<InterceptedResponse, OfflineError> {
        let url = self.resolve(url)?;

        if self.phase == Phase::Active {
            match self.store.match_entry(&self.config.cache_name, method.as_str(), url.as_str()).await {
                Ok(Some(hit)) => {
                    tracing::debug!(url = %url, "serving from cache");
                    return Ok(InterceptedResponse::from_cache(hit));
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(url = %url, error = %e, "cache lookup failed, falling through to network");
                }
            }
        }

        let response = self.client.fetch(method.clone(), &url).await?;

        if self.phase == Phase::Active && is_cacheable(&method, &url, &response, self.config.max_entry_bytes) {
            let store = self.store.clone();
            let generation = self.config.cache_name.clone();
            let entry = to_entry(&method, &url, &response);
            tokio::spawn(async move {
                if let Err(e) = store.put_entry(&generation, &entry).await {
                    tracing::warn!(generation = %generation, error = %e, "cache write failed");
                }
            });
        }

        Ok(InterceptedResponse::from_network(response))
    }
}
