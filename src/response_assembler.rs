//! Response assembler: status, headers and body for every outcome
//!
//! The assembler is the only place that decides which headers a response
//! carries. Object responses always advertise `Accept-Ranges`, the entity tag
//! (when known), a content type and cache policy; every response, including
//! errors and preflight, carries the CORS headers when CORS is enabled.

use crate::config::EdgeConfig;
use crate::error::{EdgeError, Result};
use crate::mime;
use crate::models::{ByteRange, EdgeResponse, ObjectKey, ObjectMetadata};
use bytes::Bytes;
use http::header::{self, HeaderName};
use http::{HeaderMap, HeaderValue, StatusCode};
use tracing::debug;

const ALLOWED_METHODS: &str = "GET, HEAD, OPTIONS";
const VARY: &str = "Accept-Encoding, Origin";

fn header_value(value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value)
        .map_err(|e| EdgeError::AssemblyError(format!("Invalid header value '{}': {}", value, e)))
}

/// Builds outbound responses according to the configured header policy
#[derive(Debug, Clone)]
pub struct ResponseAssembler {
    enable_cors: bool,
    cache_control: HeaderValue,
    honor_store_cache_control: bool,
}

impl ResponseAssembler {
    /// Create an assembler from the configuration
    ///
    /// # Returns
    /// * `Err(EdgeError::ConfigError)` if `cache_control` is not a valid header value
    pub fn new(config: &EdgeConfig) -> Result<Self> {
        let cache_control = HeaderValue::from_str(&config.cache_control).map_err(|e| {
            EdgeError::ConfigError(format!(
                "Invalid cache_control '{}': {}",
                config.cache_control, e
            ))
        })?;

        Ok(ResponseAssembler {
            enable_cors: config.enable_cors,
            cache_control,
            honor_store_cache_control: config.honor_store_cache_control,
        })
    }

    /// Headers present on every response
    fn base_headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        if self.enable_cors {
            headers.insert(
                header::ACCESS_CONTROL_ALLOW_ORIGIN,
                HeaderValue::from_static("*"),
            );
            headers.insert(
                header::ACCESS_CONTROL_ALLOW_METHODS,
                HeaderValue::from_static(ALLOWED_METHODS),
            );
            headers.insert(
                header::ACCESS_CONTROL_ALLOW_HEADERS,
                HeaderValue::from_static("*"),
            );
        }
        headers
    }

    /// Content type: store metadata, then the key's extension, then the generic binary type
    pub fn content_type(&self, key: &ObjectKey, metadata: &ObjectMetadata) -> String {
        match metadata.content_type.as_deref() {
            Some(ct) if !ct.trim().is_empty() => ct.to_string(),
            _ => mime::content_type_for_extension(key.extension().as_deref()).to_string(),
        }
    }

    fn cache_control(&self, metadata: &ObjectMetadata) -> Result<HeaderValue> {
        match metadata.cache_control.as_deref() {
            Some(cc) if self.honor_store_cache_control && !cc.trim().is_empty() => {
                header_value(cc)
            }
            _ => Ok(self.cache_control.clone()),
        }
    }

    /// Headers shared by 200, 206, 304 and 416 object responses
    fn object_headers(&self, key: &ObjectKey, metadata: &ObjectMetadata) -> Result<HeaderMap> {
        let mut headers = self.base_headers();

        headers.insert(header::ACCEPT_RANGES, HeaderValue::from_static("bytes"));
        headers.insert(
            header::CONTENT_TYPE,
            header_value(&self.content_type(key, metadata))?,
        );
        headers.insert(header::CACHE_CONTROL, self.cache_control(metadata)?);

        if let Some(etag) = &metadata.etag {
            headers.insert(header::ETAG, header_value(etag)?);
        }
        if self.enable_cors {
            headers.insert(header::VARY, HeaderValue::from_static(VARY));
        }

        Ok(headers)
    }

    fn set_content_length(headers: &mut HeaderMap, length: u64) {
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from(length));
    }

    /// 204 reply to a CORS preflight
    pub fn preflight(&self) -> EdgeResponse {
        let mut headers = self.base_headers();
        headers.insert(header::ALLOW, HeaderValue::from_static(ALLOWED_METHODS));
        EdgeResponse::new(StatusCode::NO_CONTENT, headers, Bytes::new())
    }

    /// Empty-bodied error response carrying the CORS headers
    pub fn error_status(&self, status: StatusCode) -> EdgeResponse {
        let mut headers = self.base_headers();
        Self::set_content_length(&mut headers, 0);
        if status == StatusCode::METHOD_NOT_ALLOWED {
            headers.insert(header::ALLOW, HeaderValue::from_static(ALLOWED_METHODS));
        }
        EdgeResponse::new(status, headers, Bytes::new())
    }

    pub fn not_found(&self) -> EdgeResponse {
        self.error_status(StatusCode::NOT_FOUND)
    }

    /// Map an error onto its response status
    pub fn error(&self, err: &EdgeError) -> EdgeResponse {
        let status = StatusCode::from_u16(err.to_http_status())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        self.error_status(status)
    }

    /// 200 with the whole object
    pub fn full(
        &self,
        key: &ObjectKey,
        metadata: &ObjectMetadata,
        body: Bytes,
    ) -> Result<EdgeResponse> {
        let mut headers = self.object_headers(key, metadata)?;
        Self::set_content_length(&mut headers, body.len() as u64);

        debug!("Assembled full response: key={}, bytes={}", key, body.len());
        Ok(EdgeResponse::new(StatusCode::OK, headers, body))
    }

    fn partial_headers(
        &self,
        key: &ObjectKey,
        metadata: &ObjectMetadata,
        range: ByteRange,
        total: u64,
    ) -> Result<HeaderMap> {
        if range.end >= total {
            return Err(EdgeError::AssemblyError(format!(
                "Range end {} exceeds object size {}",
                range.end, total
            )));
        }

        let mut headers = self.object_headers(key, metadata)?;
        Self::set_content_length(&mut headers, range.size());
        headers.insert(header::CONTENT_RANGE, header_value(&range.content_range(total))?);
        Ok(headers)
    }

    /// 206 with exactly the bytes of `range`
    ///
    /// # Arguments
    /// * `total` - Full object size, reported in `Content-Range`
    /// * `body` - The interval's bytes; must be `range.size()` long
    pub fn partial(
        &self,
        key: &ObjectKey,
        metadata: &ObjectMetadata,
        range: ByteRange,
        total: u64,
        body: Bytes,
    ) -> Result<EdgeResponse> {
        if body.len() as u64 != range.size() {
            return Err(EdgeError::AssemblyError(format!(
                "Body of {} bytes does not match range {}-{}",
                body.len(),
                range.start,
                range.end
            )));
        }

        let headers = self.partial_headers(key, metadata, range, total)?;
        debug!(
            "Assembled partial response: key={}, range={}-{}/{}",
            key, range.start, range.end, total
        );
        Ok(EdgeResponse::new(StatusCode::PARTIAL_CONTENT, headers, body))
    }

    /// HEAD counterpart of [`ResponseAssembler::full`], sized from metadata
    pub fn full_head(&self, key: &ObjectKey, metadata: &ObjectMetadata) -> Result<EdgeResponse> {
        let mut headers = self.object_headers(key, metadata)?;
        if let Some(size) = metadata.size {
            Self::set_content_length(&mut headers, size);
        }
        Ok(EdgeResponse::new(StatusCode::OK, headers, Bytes::new()))
    }

    /// HEAD counterpart of [`ResponseAssembler::partial`]
    pub fn partial_head(
        &self,
        key: &ObjectKey,
        metadata: &ObjectMetadata,
        range: ByteRange,
        total: u64,
    ) -> Result<EdgeResponse> {
        let headers = self.partial_headers(key, metadata, range, total)?;
        Ok(EdgeResponse::new(StatusCode::PARTIAL_CONTENT, headers, Bytes::new()))
    }

    /// 304 without a body
    pub fn not_modified(&self, key: &ObjectKey, metadata: &ObjectMetadata) -> Result<EdgeResponse> {
        let headers = self.object_headers(key, metadata)?;
        debug!("Assembled not-modified response: key={}", key);
        Ok(EdgeResponse::new(StatusCode::NOT_MODIFIED, headers, Bytes::new()))
    }

    /// 416 reporting the object size as `Content-Range: bytes */size`
    pub fn unsatisfiable(
        &self,
        key: &ObjectKey,
        metadata: &ObjectMetadata,
    ) -> Result<EdgeResponse> {
        let mut headers = self.object_headers(key, metadata)?;
        headers.remove(header::CONTENT_TYPE);
        Self::set_content_length(&mut headers, 0);
        if let Some(size) = metadata.size {
            headers.insert(
                header::CONTENT_RANGE,
                header_value(&format!("bytes */{}", size))?,
            );
        }

        debug!("Assembled unsatisfiable-range response: key={}", key);
        Ok(EdgeResponse::new(
            StatusCode::RANGE_NOT_SATISFIABLE,
            headers,
            Bytes::new(),
        ))
    }
}

/// Names of the CORS headers every response carries when CORS is enabled
pub fn cors_header_names() -> [HeaderName; 3] {
    [
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        header::ACCESS_CONTROL_ALLOW_METHODS,
        header::ACCESS_CONTROL_ALLOW_HEADERS,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IMMUTABLE_CACHE_CONTROL;

    fn assembler() -> ResponseAssembler {
        ResponseAssembler::new(&EdgeConfig::default()).unwrap()
    }

    fn key(path: &str) -> ObjectKey {
        ObjectKey::from_path(path, "index.html")
    }

    #[test]
    fn test_full_response_headers() {
        let meta = ObjectMetadata::new(5, "\"abc\"");
        let resp = assembler()
            .full(&key("/Build/game.wasm"), &meta, Bytes::from_static(b"hello"))
            .unwrap();

        assert_eq!(resp.status, StatusCode::OK);
        assert_eq!(resp.header("content-length"), Some("5"));
        assert_eq!(resp.header("content-type"), Some("application/wasm"));
        assert_eq!(resp.header("etag"), Some("\"abc\""));
        assert_eq!(resp.header("accept-ranges"), Some("bytes"));
        assert_eq!(resp.header("cache-control"), Some(IMMUTABLE_CACHE_CONTROL));
        assert_eq!(resp.header("vary"), Some("Accept-Encoding, Origin"));
        assert_eq!(resp.header("access-control-allow-origin"), Some("*"));
        assert_eq!(
            resp.header("access-control-allow-methods"),
            Some("GET, HEAD, OPTIONS")
        );
        assert_eq!(resp.header("access-control-allow-headers"), Some("*"));
    }

    #[test]
    fn test_store_content_type_wins() {
        let meta = ObjectMetadata::new(1, "\"a\"").with_content_type("text/x-custom");
        let resp = assembler()
            .full(&key("/a.wasm"), &meta, Bytes::from_static(b"x"))
            .unwrap();
        assert_eq!(resp.header("content-type"), Some("text/x-custom"));
    }

    #[test]
    fn test_unknown_extension_falls_back() {
        let resp = assembler()
            .full(&key("/blob"), &ObjectMetadata::default(), Bytes::new())
            .unwrap();
        assert_eq!(resp.header("content-type"), Some("application/octet-stream"));
        assert!(resp.header("etag").is_none());
    }

    #[test]
    fn test_store_cache_control_only_when_honored() {
        let meta = ObjectMetadata::new(1, "\"a\"").with_cache_control("no-cache");
        let resp = assembler().full(&key("/a"), &meta, Bytes::from_static(b"x")).unwrap();
        assert_eq!(resp.header("cache-control"), Some(IMMUTABLE_CACHE_CONTROL));

        let config = EdgeConfig {
            honor_store_cache_control: true,
            ..Default::default()
        };
        let honoring = ResponseAssembler::new(&config).unwrap();
        let resp = honoring.full(&key("/a"), &meta, Bytes::from_static(b"x")).unwrap();
        assert_eq!(resp.header("cache-control"), Some("no-cache"));
    }

    #[test]
    fn test_partial_response() {
        let meta = ObjectMetadata::new(1000, "\"e\"");
        let range = ByteRange::new(0, 99).unwrap();
        let resp = assembler()
            .partial(&key("/v.mp4"), &meta, range, 1000, Bytes::from(vec![0u8; 100]))
            .unwrap();

        assert_eq!(resp.status, StatusCode::PARTIAL_CONTENT);
        assert_eq!(resp.header("content-range"), Some("bytes 0-99/1000"));
        assert_eq!(resp.header("content-length"), Some("100"));
        assert_eq!(resp.header("content-type"), Some("video/mp4"));
    }

    #[test]
    fn test_partial_rejects_mismatched_body() {
        let meta = ObjectMetadata::new(1000, "\"e\"");
        let range = ByteRange::new(0, 99).unwrap();
        let short = Bytes::from(vec![0u8; 10]);
        let result = assembler().partial(&key("/v"), &meta, range, 1000, short);
        assert!(matches!(result, Err(EdgeError::AssemblyError(_))));

        let beyond = ByteRange::new(0, 1000).unwrap();
        let long = Bytes::from(vec![0u8; 1001]);
        let result = assembler().partial(&key("/v"), &meta, beyond, 1000, long);
        assert!(matches!(result, Err(EdgeError::AssemblyError(_))));
    }

    #[test]
    fn test_head_variants_match_get_headers() {
        let a = assembler();
        let meta = ObjectMetadata::new(1000, "\"e\"");
        let body = Bytes::from(vec![1u8; 1000]);

        let get = a.full(&key("/a.png"), &meta, body.clone()).unwrap();
        let head = a.full_head(&key("/a.png"), &meta).unwrap();
        assert_eq!(get.headers, head.headers);
        assert!(head.body.is_empty());

        let range = ByteRange::new(10, 19).unwrap();
        let get = a.partial(&key("/a.png"), &meta, range, 1000, body.slice(10..20)).unwrap();
        let head = a.partial_head(&key("/a.png"), &meta, range, 1000).unwrap();
        assert_eq!(get.headers, head.headers);
        assert_eq!(head.status, StatusCode::PARTIAL_CONTENT);
    }

    #[test]
    fn test_not_modified_has_etag_and_no_body() {
        let meta = ObjectMetadata::new(10, "\"e\"");
        let resp = assembler().not_modified(&key("/a.css"), &meta).unwrap();
        assert_eq!(resp.status, StatusCode::NOT_MODIFIED);
        assert_eq!(resp.header("etag"), Some("\"e\""));
        assert!(resp.body.is_empty());
    }

    #[test]
    fn test_unsatisfiable_reports_size() {
        let meta = ObjectMetadata::new(1000, "\"e\"");
        let resp = assembler().unsatisfiable(&key("/a"), &meta).unwrap();
        assert_eq!(resp.status, StatusCode::RANGE_NOT_SATISFIABLE);
        assert_eq!(resp.header("content-range"), Some("bytes */1000"));
        assert_eq!(resp.header("content-length"), Some("0"));
    }

    #[test]
    fn test_error_responses_carry_cors() {
        let a = assembler();
        for resp in [
            a.not_found(),
            a.error(&EdgeError::MethodNotAllowed("POST".to_string())),
            a.error(&EdgeError::StoreUnavailable("down".to_string())),
        ] {
            assert!(resp.body.is_empty());
            for name in cors_header_names() {
                assert!(resp.headers.contains_key(&name), "missing {}", name);
            }
        }
        let rejected = a.error(&EdgeError::MethodNotAllowed("PUT".to_string()));
        assert_eq!(rejected.status, StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(rejected.header("allow"), Some("GET, HEAD, OPTIONS"));
        assert_eq!(
            a.error(&EdgeError::StoreUnavailable("down".to_string())).status,
            StatusCode::BAD_GATEWAY
        );
    }

    #[test]
    fn test_cors_disabled() {
        let config = EdgeConfig {
            enable_cors: false,
            ..Default::default()
        };
        let a = ResponseAssembler::new(&config).unwrap();
        let resp = a.full(&key("/a"), &ObjectMetadata::default(), Bytes::new()).unwrap();
        assert!(resp.header("access-control-allow-origin").is_none());
        assert!(resp.header("vary").is_none());
        assert_eq!(a.preflight().status, StatusCode::NO_CONTENT);
    }

    #[test]
    fn test_invalid_cache_control_rejected() {
        let config = EdgeConfig {
            cache_control: "bad\nvalue".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            ResponseAssembler::new(&config),
            Err(EdgeError::ConfigError(_))
        ));
    }
}
