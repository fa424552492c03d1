//! Object store backed by a remote bucket reachable over HTTP
//!
//! Metadata is read with HEAD requests and partial reads are forwarded as
//! `Range` requests, so a ranged read never transfers the whole object.

use crate::error::{EdgeError, Result};
use crate::models::{ByteRange, ObjectKey, ObjectMetadata, StoredObject};
use crate::object_store::ObjectStore;
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::HeaderMap;
use reqwest::{Client, StatusCode};
use std::time::Duration;
use tracing::{debug, warn};

/// HTTP client for a bucket exposed at `base_url`
pub struct HttpObjectStore {
    client: Client,
    base_url: String,
}

impl HttpObjectStore {
    /// Create a store with a 10 second request timeout
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        Self::with_timeout(base_url, Duration::from_secs(10))
    }

    /// Create a store with a custom request timeout
    pub fn with_timeout(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| EdgeError::ConfigError(format!("Failed to create HTTP client: {}", e)))?;

        Ok(HttpObjectStore {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn object_url(&self, key: &ObjectKey) -> String {
        format!("{}/{}", self.base_url, key.as_str())
    }

    /// Map a non-success status to an error, logging the failure
    fn status_error(url: &str, status: StatusCode) -> EdgeError {
        warn!("Store returned error for url={}: status={}", url, status);
        EdgeError::from_store_status(
            status.as_u16(),
            format!("store returned {}", status),
        )
    }
}

fn header_string(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_string())
}

fn content_length(headers: &HeaderMap) -> Option<u64> {
    headers
        .get("content-length")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok())
}

/// Total size from a `Content-Range: bytes s-e/total` header
fn content_range_total(headers: &HeaderMap) -> Option<u64> {
    let value = headers.get("content-range")?.to_str().ok()?;
    let (_, total) = value.rsplit_once('/')?;
    total.trim().parse::<u64>().ok()
}

/// Build metadata from response headers; `size` is supplied by the caller
/// because its source depends on the status (Content-Length vs Content-Range).
fn metadata_from_headers(headers: &HeaderMap, size: Option<u64>) -> ObjectMetadata {
    ObjectMetadata {
        size,
        etag: header_string(headers, "etag"),
        content_type: header_string(headers, "content-type"),
        cache_control: header_string(headers, "cache-control"),
    }
}

#[async_trait]
impl ObjectStore for HttpObjectStore {
    async fn get(&self, key: &ObjectKey, range: Option<ByteRange>) -> Result<Option<StoredObject>> {
        let url = self.object_url(key);
        debug!("Fetching object url={}, range={:?}", url, range);

        let mut request = self.client.get(&url);
        if let Some(range) = range {
            request = request.header("range", range.to_header());
        }

        let response = request.send().await.map_err(|e| {
            warn!("GET request failed for url={}: {}", url, e);
            EdgeError::from(e)
        })?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(Self::status_error(&url, status));
        }

        let headers = response.headers().clone();
        let partial = status == StatusCode::PARTIAL_CONTENT;
        let body = response.bytes().await.map_err(|e| {
            warn!("Failed to read body for url={}: {}", url, e);
            EdgeError::from(e)
        })?;

        match (range, partial) {
            (Some(range), true) => {
                if body.len() as u64 != range.size() {
                    return Err(EdgeError::StoreUnavailable(format!(
                        "store returned {} bytes for range {}-{}",
                        body.len(),
                        range.start,
                        range.end
                    )));
                }
                let size = content_range_total(&headers);
                Ok(Some(StoredObject::new(metadata_from_headers(&headers, size), body)))
            }
            (Some(range), false) => {
                // Origin ignored the Range header and sent everything.
                let total = body.len() as u64;
                if range.end >= total {
                    return Err(EdgeError::UnsatisfiableRange(format!(
                        "range {}-{} exceeds object size {}",
                        range.start, range.end, total
                    )));
                }
                let slice: Bytes = body.slice(range.start as usize..=range.end as usize);
                Ok(Some(StoredObject::new(
                    metadata_from_headers(&headers, Some(total)),
                    slice,
                )))
            }
            (None, _) => {
                let size = Some(body.len() as u64);
                Ok(Some(StoredObject::new(metadata_from_headers(&headers, size), body)))
            }
        }
    }

    async fn head(&self, key: &ObjectKey) -> Result<Option<ObjectMetadata>> {
        let url = self.object_url(key);
        debug!("Fetching metadata url={}", url);

        let response = self.client.head(&url).send().await.map_err(|e| {
            warn!("HEAD request failed for url={}: {}", url, e);
            EdgeError::from(e)
        })?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(Self::status_error(&url, status));
        }

        let headers = response.headers();
        let metadata = metadata_from_headers(headers, content_length(headers));
        debug!(
            "Fetched metadata url={}: size={:?}, etag={:?}",
            url, metadata.size, metadata.etag
        );
        Ok(Some(metadata))
    }
}
