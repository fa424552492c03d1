//! Main EdgeProxy structure and context
//!
//! This module provides the EdgeProxy that coordinates the edge cache, the
//! backing object store and the response assembler, along with the
//! EdgeContext that carries per-request state.

use crate::cache::EdgeCache;
use crate::cache_filler::CacheFiller;
use crate::conditional;
use crate::config::EdgeConfig;
use crate::error::{EdgeError, Result};
use crate::metrics::EdgeMetrics;
use crate::models::{
    ByteRange, CacheKey, CachedObject, EdgeResponse, ObjectKey, ObjectMetadata, StoredObject,
};
use crate::object_store::ObjectStore;
use crate::range::{RangeDecision, RangeRequest};
use crate::request_analyzer::{RequestAnalyzer, RequestKind};
use crate::response_assembler::ResponseAssembler;
use crate::store_metrics::StoreMetrics;
use bytes::Bytes;
use http::{HeaderMap, HeaderValue, Method};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Where a response came from
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CacheStatus {
    /// Served from the edge cache
    Hit,
    /// Served from the backing store
    Miss,
    /// The cache was not consulted (preflight, rejected method, cache disabled)
    #[default]
    Bypass,
}

impl fmt::Display for CacheStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CacheStatus::Hit => "hit",
            CacheStatus::Miss => "miss",
            CacheStatus::Bypass => "bypass",
        };
        f.write_str(s)
    }
}

/// What to send once the object's metadata is known
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Plan {
    Full,
    Partial(ByteRange),
    NotModified,
    Unsatisfiable,
}

/// Per-request state for the edge proxy
#[derive(Debug, Clone, Default)]
pub struct EdgeContext {
    /// Normalized key in the backing store
    pub object_key: Option<ObjectKey>,

    /// Edge cache identity
    pub cache_key: Option<CacheKey>,

    /// Client's Range request, before resolution
    pub range: RangeRequest,

    /// Client's If-None-Match value
    pub if_none_match: Option<String>,

    /// Whether the body must be omitted
    pub head: bool,

    pub cache_status: CacheStatus,

    /// Error that produced the response, if any
    pub error: Option<EdgeError>,
}

impl EdgeContext {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Edge cache coordinator
///
/// EdgeProxy owns no global state: the object store and the edge cache are
/// injected, so any number of proxies can run side by side (as the tests do).
pub struct EdgeProxy {
    config: Arc<EdgeConfig>,
    store: Arc<dyn ObjectStore>,
    cache: Option<Arc<dyn EdgeCache>>,
    filler: Option<CacheFiller>,
    analyzer: RequestAnalyzer,
    assembler: ResponseAssembler,
    metrics: Arc<EdgeMetrics>,
    store_metrics: Option<StoreMetrics>,
}

impl EdgeProxy {
    /// Create a new EdgeProxy
    ///
    /// When a cache is supplied, a background fill worker is spawned, so this
    /// must be called from within a tokio runtime.
    ///
    /// # Arguments
    /// * `config` - Validated configuration
    /// * `store` - Backing object store
    /// * `cache` - Edge cache, or `None` to always read from the store
    pub fn new(
        config: Arc<EdgeConfig>,
        store: Arc<dyn ObjectStore>,
        cache: Option<Arc<dyn EdgeCache>>,
    ) -> Result<Self> {
        let metrics = Arc::new(EdgeMetrics::new());
        let assembler = ResponseAssembler::new(&config)?;
        let analyzer = RequestAnalyzer::new(Arc::clone(&config));

        let filler = cache.as_ref().map(|cache| {
            CacheFiller::spawn(
                Arc::clone(cache),
                config.cache_fill_queue_size,
                Arc::clone(&metrics),
            )
        });

        Ok(EdgeProxy {
            config,
            store,
            cache,
            filler,
            analyzer,
            assembler,
            metrics,
            store_metrics: None,
        })
    }

    /// Attach Prometheus store latency metrics
    pub fn with_store_metrics(mut self, store_metrics: StoreMetrics) -> Self {
        self.store_metrics = Some(store_metrics);
        self
    }

    pub fn config(&self) -> &EdgeConfig {
        &self.config
    }

    pub fn metrics(&self) -> &EdgeMetrics {
        &self.metrics
    }

    pub fn metrics_arc(&self) -> Arc<EdgeMetrics> {
        Arc::clone(&self.metrics)
    }

    pub fn store_metrics(&self) -> Option<&StoreMetrics> {
        self.store_metrics.as_ref()
    }

    /// Wait for every cache fill submitted so far to be written
    pub async fn flush_cache_fills(&self) {
        if let Some(filler) = &self.filler {
            filler.flush().await;
        }
    }

    /// Handle one request end to end
    ///
    /// Never fails: errors are turned into their status responses here.
    pub async fn handle(
        &self,
        method: &Method,
        path: &str,
        query: Option<&str>,
        headers: &HeaderMap<HeaderValue>,
    ) -> EdgeResponse {
        let start = Instant::now();
        let mut ctx = EdgeContext::new();

        let response = match self.process(method, path, query, headers, &mut ctx).await {
            Ok(response) => response,
            Err(e) => {
                let response = self.assembler.error(&e);
                ctx.error = Some(e);
                response
            }
        };

        let duration = start.elapsed();
        self.metrics.record_response(response.status.as_u16());
        self.metrics.record_request_duration(duration);
        self.metrics.record_bytes_to_client(response.body.len() as u64);

        self.logging(method, path, &ctx, &response, duration.as_millis() as u64);
        response
    }

    async fn process(
        &self,
        method: &Method,
        path: &str,
        query: Option<&str>,
        headers: &HeaderMap<HeaderValue>,
        ctx: &mut EdgeContext,
    ) -> Result<EdgeResponse> {
        match self.analyzer.classify(method) {
            RequestKind::Preflight => return Ok(self.assembler.preflight()),
            RequestKind::Unsupported => {
                return Err(EdgeError::MethodNotAllowed(method.to_string()))
            }
            RequestKind::Head => ctx.head = true,
            RequestKind::Get => {}
        }

        let object_key = self.analyzer.object_key(path);
        let cache_key = self.analyzer.cache_key(path, query);
        ctx.range = self.analyzer.extract_client_range(headers);
        ctx.if_none_match = self.analyzer.extract_if_none_match(headers);

        debug!(
            "Processing request: method={}, key={}, cache_key={}, range={:?}",
            method, object_key, cache_key, ctx.range
        );

        if let Some(entry) = self.lookup_cache(&cache_key, ctx).await {
            let response = self.respond_from_cache(&object_key, entry, ctx)?;
            self.metrics.record_bytes_from_cache(response.body.len() as u64);
            ctx.object_key = Some(object_key);
            ctx.cache_key = Some(cache_key);
            return Ok(response);
        }

        let response = self.respond_from_store(&object_key, &cache_key, ctx).await;
        ctx.object_key = Some(object_key);
        ctx.cache_key = Some(cache_key);
        response
    }

    /// Look up the edge cache; errors are logged and treated as misses
    async fn lookup_cache(&self, key: &CacheKey, ctx: &mut EdgeContext) -> Option<CachedObject> {
        let cache = self.cache.as_ref()?;

        match cache.lookup(key).await {
            Ok(Some(entry)) => {
                ctx.cache_status = CacheStatus::Hit;
                self.metrics.record_cache_hit();
                Some(entry)
            }
            Ok(None) => {
                ctx.cache_status = CacheStatus::Miss;
                self.metrics.record_cache_miss();
                None
            }
            Err(e) => {
                warn!("Cache lookup failed, reading from store: key={}, error={}", key, e);
                ctx.cache_status = CacheStatus::Miss;
                self.metrics.record_cache_error();
                self.metrics.record_cache_miss();
                None
            }
        }
    }

    /// Decide between 200, 206, 304 and 416 from the object's metadata
    fn plan(&self, ctx: &EdgeContext, metadata: &ObjectMetadata) -> Plan {
        let decision = ctx.range.resolve(metadata.size);

        if let RangeDecision::Partial(range) = decision {
            return Plan::Partial(range);
        }

        if conditional::is_not_modified(
            ctx.if_none_match.as_deref(),
            metadata.etag.as_deref(),
            decision.is_partial(),
        ) {
            return Plan::NotModified;
        }

        match decision {
            RangeDecision::Unsatisfiable => Plan::Unsatisfiable,
            _ => Plan::Full,
        }
    }

    /// Answer from a cached full response
    fn respond_from_cache(
        &self,
        key: &ObjectKey,
        entry: CachedObject,
        ctx: &EdgeContext,
    ) -> Result<EdgeResponse> {
        let CachedObject { mut metadata, body } = entry;
        // Ranges are resolved against the bytes actually held.
        let total = body.len() as u64;
        metadata.size = Some(total);

        let response = match self.plan(ctx, &metadata) {
            Plan::Full => self.assembler.full(key, &metadata, body)?,
            Plan::Partial(range) => {
                let body = body.slice(range.start as usize..=range.end as usize);
                self.assembler.partial(key, &metadata, range, total, body)?
            }
            Plan::NotModified => self.assembler.not_modified(key, &metadata)?,
            Plan::Unsatisfiable => self.assembler.unsatisfiable(key, &metadata)?,
        };

        Ok(if ctx.head {
            response.without_body()
        } else {
            response
        })
    }

    /// Answer from the backing store on a cache miss
    async fn respond_from_store(
        &self,
        key: &ObjectKey,
        cache_key: &CacheKey,
        ctx: &EdgeContext,
    ) -> Result<EdgeResponse> {
        // A plain GET needs the body whatever the metadata says.
        if !ctx.head && !ctx.range.is_requested() && ctx.if_none_match.is_none() {
            let Some(object) = self.store_get(key, None).await? else {
                return Ok(self.assembler.not_found());
            };
            return self.full_from_store(key, cache_key, object);
        }

        let Some(metadata) = self.store_head(key).await? else {
            return Ok(self.assembler.not_found());
        };

        match self.plan(ctx, &metadata) {
            Plan::NotModified => self.assembler.not_modified(key, &metadata),
            Plan::Unsatisfiable => self.assembler.unsatisfiable(key, &metadata),
            Plan::Full if ctx.head => self.assembler.full_head(key, &metadata),
            Plan::Partial(range) if ctx.head => {
                let total = metadata.size.unwrap_or(range.end + 1);
                self.assembler.partial_head(key, &metadata, range, total)
            }
            Plan::Full => {
                let Some(object) = self.store_get(key, None).await? else {
                    return Ok(self.assembler.not_found());
                };
                self.full_from_store(key, cache_key, object)
            }
            Plan::Partial(range) => {
                let Some(object) = self.store_get(key, Some(range)).await? else {
                    return Ok(self.assembler.not_found());
                };
                let total = object
                    .metadata
                    .size
                    .or(metadata.size)
                    .unwrap_or(range.end + 1);
                self.assembler
                    .partial(key, &object.metadata, range, total, object.body)
            }
        }
    }

    /// Build a 200 from a full store read and hand a copy to the cache
    fn full_from_store(
        &self,
        key: &ObjectKey,
        cache_key: &CacheKey,
        object: StoredObject,
    ) -> Result<EdgeResponse> {
        let StoredObject { mut metadata, body } = object;
        metadata.size = Some(body.len() as u64);

        let response = self.assembler.full(key, &metadata, body.clone())?;
        self.populate_cache(cache_key, metadata, body);
        Ok(response)
    }

    /// Submit a full response to the background filler without waiting
    fn populate_cache(&self, key: &CacheKey, metadata: ObjectMetadata, body: Bytes) {
        let Some(filler) = &self.filler else {
            return;
        };

        if body.len() > self.config.max_cacheable_object_bytes {
            debug!(
                "Object too large to cache: key={}, bytes={}, limit={}",
                key,
                body.len(),
                self.config.max_cacheable_object_bytes
            );
            return;
        }

        filler.submit(key.clone(), CachedObject::new(metadata, body));
    }

    async fn store_get(
        &self,
        key: &ObjectKey,
        range: Option<ByteRange>,
    ) -> Result<Option<StoredObject>> {
        let operation = if range.is_some() { "get_range" } else { "get" };
        let start = Instant::now();
        let result = self.store.get(key, range).await;

        let outcome = match &result {
            Ok(Some(object)) => {
                self.metrics.record_bytes_from_store(object.body.len() as u64);
                "hit"
            }
            Ok(None) => "absent",
            Err(_) => "error",
        };
        self.record_store_call(operation, outcome, start);

        result.map_err(|e| {
            warn!("Store read failed: key={}, range={:?}, error={}", key, range, e);
            e
        })
    }

    async fn store_head(&self, key: &ObjectKey) -> Result<Option<ObjectMetadata>> {
        let start = Instant::now();
        let result = self.store.head(key).await;

        let outcome = match &result {
            Ok(Some(_)) => "hit",
            Ok(None) => "absent",
            Err(_) => "error",
        };
        self.record_store_call("head", outcome, start);

        result.map_err(|e| {
            warn!("Store metadata read failed: key={}, error={}", key, e);
            e
        })
    }

    fn record_store_call(&self, operation: &str, outcome: &str, start: Instant) {
        self.metrics.record_store_read(outcome != "error");
        if let Some(store_metrics) = &self.store_metrics {
            store_metrics.record(operation, outcome, start.elapsed());
        }
    }

    /// Log request completion information
    ///
    /// # Arguments
    /// * `method` - HTTP method of the request
    /// * `path` - Request path
    /// * `ctx` - The request context
    /// * `response` - The response being returned
    /// * `duration_ms` - Request duration in milliseconds
    pub fn logging(
        &self,
        method: &Method,
        path: &str,
        ctx: &EdgeContext,
        response: &EdgeResponse,
        duration_ms: u64,
    ) {
        if let Some(err) = &ctx.error {
            warn!(
                "Request failed: method={}, path={}, status={}, error={}, duration_ms={}",
                method,
                path,
                response.status.as_u16(),
                err,
                duration_ms
            );
        } else {
            info!(
                "Request completed: method={}, path={}, status={}, cache={}, bytes={}, ms={}",
                method,
                path,
                response.status.as_u16(),
                ctx.cache_status,
                response.body.len(),
                duration_ms
            );
        }
    }
}
