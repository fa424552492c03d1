//! Request normalization: method classification, keys and header extraction

use crate::config::EdgeConfig;
use crate::models::{CacheKey, ObjectKey};
use crate::range::RangeRequest;
use http::{header, HeaderMap, HeaderValue, Method};
use std::sync::Arc;
use tracing::debug;

/// How the proxy treats a request method
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    Get,
    Head,
    Preflight,
    Unsupported,
}

/// Extracts what the proxy needs from an incoming request
pub struct RequestAnalyzer {
    config: Arc<EdgeConfig>,
}

impl RequestAnalyzer {
    pub fn new(config: Arc<EdgeConfig>) -> Self {
        RequestAnalyzer { config }
    }

    pub fn classify(&self, method: &Method) -> RequestKind {
        match *method {
            Method::GET => RequestKind::Get,
            Method::HEAD => RequestKind::Head,
            Method::OPTIONS => RequestKind::Preflight,
            _ => {
                debug!("Unsupported method: {}", method);
                RequestKind::Unsupported
            }
        }
    }

    /// Object key for a request path; the root maps to the default object
    pub fn object_key(&self, path: &str) -> ObjectKey {
        ObjectKey::from_path(path, &self.config.default_object_key)
    }

    /// Cache identity for a request; HEAD and GET share it
    pub fn cache_key(&self, path: &str, query: Option<&str>) -> CacheKey {
        CacheKey::new(path, query, self.config.cache_key_include_query)
    }

    /// Parse the client's Range header
    ///
    /// # Returns
    /// [`RangeRequest::None`] when absent, not UTF-8, or not a single byte range
    pub fn extract_client_range(&self, headers: &HeaderMap<HeaderValue>) -> RangeRequest {
        let value = headers.get(header::RANGE).and_then(|v| v.to_str().ok());
        let range = RangeRequest::parse(value);
        if range.is_requested() {
            debug!("Extracted client range: {:?} from header: {:?}", range, value);
        }
        range
    }

    /// The client's `If-None-Match` value, trimmed
    pub fn extract_if_none_match(&self, headers: &HeaderMap<HeaderValue>) -> Option<String> {
        headers
            .get(header::IF_NONE_MATCH)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }
}
