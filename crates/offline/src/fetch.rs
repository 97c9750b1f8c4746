//! Network fetch client for intercepted requests.
//!
//! Thin reqwest wrapper with the controller's user agent, timeout, and
//! redirect bound. Non-success statuses are returned as values, not errors:
//! the interceptor must hand them back to the caller untouched (and
//! uncached), so only transport-level failures surface as `Err`.

use std::time::Instant;

use bytes::Bytes;
use reqwest::{Client, Method, StatusCode, Url, header};

use crate::config::OfflineConfig;
use crate::error::OfflineError;

/// Response from a forwarded network fetch.
#[derive(Debug, Clone)]
pub struct FetchResponse {
    /// The original URL requested.
    pub url: Url,
    /// The final URL after redirects.
    pub final_url: Url,
    /// HTTP status code.
    pub status: StatusCode,
    /// Content-Type header.
    pub content_type: Option<String>,
    /// Response headers.
    pub headers: header::HeaderMap,
    /// Response body bytes.
    pub bytes: Bytes,
    /// Time taken to fetch in milliseconds.
    pub fetch_ms: u64,
}

impl FetchResponse {
    /// Headers as name/value string pairs, for storage alongside the body.
    ///
    /// Values that are not valid UTF-8 are skipped.
    pub fn header_pairs(&self) -> Vec<(String, String)> {
        self.headers
            .iter()
            .filter_map(|(name, value)| Some((name.as_str().to_string(), value.to_str().ok()?.to_string())))
            .collect()
    }
}

/// HTTP fetch client for the offline controller.
#[derive(Clone)]
pub struct FetchClient {
    http: Client,
}

impl FetchClient {
    /// Create a new fetch client from the controller configuration.
    pub fn new(config: &OfflineConfig) -> Result<Self, OfflineError> {
        let http = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.timeout())
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .use_rustls_tls()
            .gzip(true)
            .brotli(true)
            .deflate(true)
            .build()
            .map_err(|e| OfflineError::Http(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { http })
    }

    /// Forward a request to the network, returning whatever comes back.
    ///
    /// # Errors
    ///
    /// Returns [`OfflineError::Http`] only for transport failures
    /// (connect, timeout, body read); any HTTP status is a success value.
    pub async fn fetch(&self, method: Method, url: &Url) -> Result<FetchResponse, OfflineError> {
        let start = Instant::now();

        let response = self
            .http
            .request(method, url.clone())
            .send()
            .await
            .map_err(|e| OfflineError::Http(format!("network error: {e}")))?;

        let status = response.status();
        let final_url = response.url().clone();
        let headers = response.headers().clone();

        let bytes = response
            .bytes()
            .await
            .map_err(|e| OfflineError::Http(format!("failed to read response: {e}")))?;

        let content_type = headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());

        let fetch_ms = start.elapsed().as_millis() as u64;

        tracing::debug!(
            "fetched {} -> {} {} in {}ms ({} bytes)",
            url,
            final_url,
            status.as_u16(),
            fetch_ms,
            bytes.len()
        );

        Ok(FetchResponse { url: url.clone(), final_url, status, content_type, headers, bytes, fetch_ms })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_builds_from_default_config() {
        let client = FetchClient::new(&OfflineConfig::default());
        assert!(client.is_ok());
    }

    #[test]
    fn test_header_pairs_skips_non_utf8() {
        let mut headers = header::HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, header::HeaderValue::from_static("text/html"));
        headers.insert("x-binary", header::HeaderValue::from_bytes(&[0xff, 0xfe]).unwrap());

        let response = FetchResponse {
            url: Url::parse("http://localhost/").unwrap(),
            final_url: Url::parse("http://localhost/").unwrap(),
            status: StatusCode::OK,
            content_type: Some("text/html".to_string()),
            headers,
            bytes: Bytes::new(),
            fetch_ms: 0,
        };

        let pairs = response.header_pairs();
        assert_eq!(pairs, vec![("content-type".to_string(), "text/html".to_string())]);
    }
}
