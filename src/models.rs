//! Core data models for the edge asset cache

use crate::error::{EdgeError, Result};
use bytes::Bytes;
use http::{HeaderMap, StatusCode};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Represents a resolved byte interval of an object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ByteRange {
    /// Starting byte position (inclusive)
    pub start: u64,
    /// Ending byte position (inclusive)
    pub end: u64,
}

impl ByteRange {
    /// Create a new ByteRange
    ///
    /// # Returns
    /// * `Ok(ByteRange)` if `start <= end`
    /// * `Err(EdgeError::InvalidRange)` otherwise
    pub fn new(start: u64, end: u64) -> Result<Self> {
        if start > end {
            return Err(EdgeError::InvalidRange(format!(
                "start ({}) must be <= end ({})",
                start, end
            )));
        }
        Ok(ByteRange { start, end })
    }

    /// Get the size of this byte range in bytes
    pub fn size(&self) -> u64 {
        self.end - self.start + 1
    }

    /// Convert this ByteRange to an HTTP Range request header value
    pub fn to_header(&self) -> String {
        format!("bytes={}-{}", self.start, self.end)
    }

    /// Format the `Content-Range` response header value for an object of `total` bytes
    pub fn content_range(&self, total: u64) -> String {
        format!("bytes {}-{}/{}", self.start, self.end, total)
    }
}

/// Normalized identity of an object in the backing store.
///
/// Never starts with `/`. The root path maps to the configured default key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectKey(String);

impl ObjectKey {
    /// Build an object key from a request path
    pub fn from_path(path: &str, default_key: &str) -> Self {
        let trimmed = path.trim_start_matches('/');
        if trimmed.is_empty() {
            ObjectKey(default_key.trim_start_matches('/').to_string())
        } else {
            ObjectKey(trimmed.to_string())
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Lowercased text after the last `.` of the final path segment
    pub fn extension(&self) -> Option<String> {
        let segment = self.0.rsplit('/').next().unwrap_or(&self.0);
        let (_, ext) = segment.rsplit_once('.')?;
        if ext.is_empty() {
            None
        } else {
            Some(ext.to_ascii_lowercase())
        }
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Edge cache identity of a request.
///
/// The method is always normalized to GET so HEAD and GET share one slot.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// Build a cache key from the request path and optional query string
    pub fn new(path: &str, query: Option<&str>, include_query: bool) -> Self {
        match query {
            Some(q) if include_query && !q.is_empty() => CacheKey(format!("GET {}?{}", path, q)),
            _ => CacheKey(format!("GET {}", path)),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Metadata the backing store reports for an object
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectMetadata {
    /// Total size in bytes, if the store exposes it
    pub size: Option<u64>,
    /// Store-assigned entity tag
    pub etag: Option<String>,
    /// Store-supplied content type
    pub content_type: Option<String>,
    /// Store-supplied cache-control hint
    pub cache_control: Option<String>,
}

impl ObjectMetadata {
    pub fn new(size: u64, etag: impl Into<String>) -> Self {
        ObjectMetadata {
            size: Some(size),
            etag: Some(etag.into()),
            content_type: None,
            cache_control: None,
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn with_cache_control(mut self, cache_control: impl Into<String>) -> Self {
        self.cache_control = Some(cache_control.into());
        self
    }
}

/// One object as retrieved from the backing store for a single request
#[derive(Debug, Clone)]
pub struct StoredObject {
    pub metadata: ObjectMetadata,
    /// Full object bytes, or only the requested interval for ranged reads
    pub body: Bytes,
}

impl StoredObject {
    pub fn new(metadata: ObjectMetadata, body: Bytes) -> Self {
        StoredObject { metadata, body }
    }
}

/// Copy of a full (status 200) response kept in the edge cache
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedObject {
    pub metadata: ObjectMetadata,
    pub body: Bytes,
}

impl CachedObject {
    /// Wrap a full object body. The recorded size always matches the body.
    pub fn new(mut metadata: ObjectMetadata, body: Bytes) -> Self {
        metadata.size = Some(body.len() as u64);
        CachedObject { metadata, body }
    }

    /// Number of bytes this entry occupies in memory
    pub fn weight(&self) -> usize {
        self.body.len()
    }
}

/// Outbound response produced by the edge proxy
#[derive(Debug, Clone)]
pub struct EdgeResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl EdgeResponse {
    pub fn new(status: StatusCode, headers: HeaderMap, body: Bytes) -> Self {
        EdgeResponse {
            status,
            headers,
            body,
        }
    }

    /// Header value as a string, if present and valid UTF-8
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Drop the body while keeping status and headers (HEAD responses)
    pub fn without_body(mut self) -> Self {
        self.body = Bytes::new();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_byte_range_new() {
        let range = ByteRange::new(0, 1023).unwrap();
        assert_eq!(range.start, 0);
        assert_eq!(range.end, 1023);
        assert_eq!(range.size(), 1024);
    }

    #[test]
    fn test_byte_range_invalid() {
        assert!(ByteRange::new(100, 50).is_err());
    }

    #[test]
    fn test_byte_range_headers() {
        let range = ByteRange::new(0, 99).unwrap();
        assert_eq!(range.to_header(), "bytes=0-99");
        assert_eq!(range.content_range(1000), "bytes 0-99/1000");
    }

    #[test]
    fn test_object_key_strips_leading_separators() {
        assert_eq!(ObjectKey::from_path("/Build/x.wasm", "index.html").as_str(), "Build/x.wasm");
        assert_eq!(ObjectKey::from_path("///a/b", "index.html").as_str(), "a/b");
    }

    #[test]
    fn test_object_key_default_for_root() {
        assert_eq!(ObjectKey::from_path("/", "index.html").as_str(), "index.html");
        assert_eq!(ObjectKey::from_path("", "/index.html").as_str(), "index.html");
    }

    #[test]
    fn test_object_key_extension() {
        assert_eq!(ObjectKey::from_path("/a/Game.WASM", "i").extension().as_deref(), Some("wasm"));
        assert_eq!(ObjectKey::from_path("/v1.2/README", "i").extension(), None);
        assert_eq!(ObjectKey::from_path("/file.", "i").extension(), None);
        assert_eq!(ObjectKey::from_path("/a.tar.gz", "i").extension().as_deref(), Some("gz"));
    }

    #[test]
    fn test_cache_key_normalization() {
        let with_query = CacheKey::new("/a.js", Some("v=2"), true);
        assert_eq!(with_query.as_str(), "GET /a.js?v=2");

        let ignored = CacheKey::new("/a.js", Some("v=2"), false);
        assert_eq!(ignored.as_str(), "GET /a.js");

        let empty = CacheKey::new("/a.js", Some(""), true);
        assert_eq!(empty.as_str(), "GET /a.js");
    }

    #[test]
    fn test_cached_object_size_matches_body() {
        let meta = ObjectMetadata::new(999, "\"e\"");
        let cached = CachedObject::new(meta, Bytes::from_static(b"abc"));
        assert_eq!(cached.metadata.size, Some(3));
        assert_eq!(cached.weight(), 3);
    }
}
