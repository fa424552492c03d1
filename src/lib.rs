//! Edge Asset Cache
//!
//! An HTTP edge cache for immutable objects (web assets, Unity WebGL build
//! artifacts, video) held in a backing object store.
//!
//! # Overview
//!
//! Every read request is answered from a fast edge cache when possible and
//! from the backing store otherwise. Full responses read from the store are
//! copied into the cache in the background, so the client never waits for
//! the cache write.
//!
//! # Features
//!
//! - **Conditional requests**: `If-None-Match` equal to the object's ETag yields 304
//! - **Byte ranges**: single `bytes=` ranges yield 206 (or 416 when unsatisfiable);
//!   only the requested interval is read from the store
//! - **Two-tier edge cache**: in-memory LRU in front of an on-disk tier that
//!   survives restarts
//! - **Fire-and-forget population**: a bounded queue and a worker task write
//!   cache entries off the request path
//! - **CORS and immutable caching headers** on every response
//! - **Metrics**: atomic counters and Prometheus store latency histograms
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use edge_asset_cache::{EdgeConfig, EdgeProxy, MemoryObjectStore, TieredCache};
//! use http::{HeaderMap, Method};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # async fn run() -> edge_asset_cache::Result<()> {
//! let store = Arc::new(MemoryObjectStore::new());
//! store.put("index.html", "<h1>hello</h1>");
//!
//! let cache = Arc::new(TieredCache::memory_only(Duration::from_secs(3600), 64 * 1024 * 1024));
//! let proxy = EdgeProxy::new(Arc::new(EdgeConfig::default()), store, Some(cache))?;
//!
//! let response = proxy.handle(&Method::GET, "/", None, &HeaderMap::new()).await;
//! assert_eq!(response.status, 200);
//! # Ok(())
//! # }
//! ```
//!
//! # Architecture
//!
//! - [`EdgeProxy`]: coordinates cache, store and assembler for each request
//! - [`RequestAnalyzer`]: method classification, object and cache keys, header extraction
//! - [`range`]: `Range` header parsing and resolution against the object size
//! - [`conditional`]: `If-None-Match` evaluation
//! - [`ResponseAssembler`]: status, headers and body for every outcome
//! - [`ObjectStore`]: backing store interface ([`MemoryObjectStore`],
//!   [`FsObjectStore`], [`HttpObjectStore`])
//! - [`EdgeCache`]: edge cache interface, implemented by [`TieredCache`]
//! - [`CacheFiller`]: background cache population
//! - [`EdgeServer`]: hyper HTTP/1.1 front end

pub mod cache;
pub mod cache_filler;
pub mod conditional;
pub mod config;
pub mod error;
pub mod metrics;
pub mod metrics_endpoint;
pub mod mime;
pub mod models;
pub mod object_store;
pub mod origin_store;
pub mod proxy;
pub mod range;
pub mod request_analyzer;
pub mod response_assembler;
pub mod server;
pub mod store_metrics;
pub mod tiered_cache;

// Re-export commonly used types
pub use cache::EdgeCache;
pub use cache_filler::CacheFiller;
pub use config::{EdgeConfig, MetricsEndpointConfig, StoreConfig};
pub use error::{EdgeError, Result};
pub use metrics::{EdgeMetrics, MetricsSnapshot};
pub use metrics_endpoint::MetricsEndpoint;
pub use models::{
    ByteRange, CacheKey, CachedObject, EdgeResponse, ObjectKey, ObjectMetadata, StoredObject,
};
pub use object_store::{FsObjectStore, MemoryObjectStore, ObjectStore};
pub use origin_store::HttpObjectStore;
pub use proxy::{CacheStatus, EdgeContext, EdgeProxy};
pub use range::{RangeDecision, RangeRequest};
pub use request_analyzer::{RequestAnalyzer, RequestKind};
pub use response_assembler::ResponseAssembler;
pub use server::EdgeServer;
pub use store_metrics::StoreMetrics;
pub use tiered_cache::{TieredCache, TieredCacheStats};
