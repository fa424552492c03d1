//! Edge cache interface
//!
//! The proxy talks to the edge cache only through [`EdgeCache`], so the
//! cache implementation (and its lifecycle) is owned by whoever builds the
//! proxy. [`crate::tiered_cache::TieredCache`] is the production
//! implementation; tests substitute their own.

use crate::error::Result;
use crate::models::{CacheKey, CachedObject};
use async_trait::async_trait;

/// A fast cache of full object responses keyed by normalized request identity
#[async_trait]
pub trait EdgeCache: Send + Sync {
    /// Look up a cached full response
    ///
    /// Returns `Ok(None)` on a miss or when the entry has expired.
    async fn lookup(&self, key: &CacheKey) -> Result<Option<CachedObject>>;

    /// Store a full response under `key`, replacing any previous entry
    async fn store(&self, key: &CacheKey, entry: CachedObject) -> Result<()>;
}
