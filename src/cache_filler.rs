//! Background population of the edge cache
//!
//! The request path hands full responses to a bounded queue and returns
//! immediately. A single worker task drains the queue and writes entries into
//! the [`EdgeCache`]. Failures are logged and counted, never surfaced to the
//! request that produced the entry.

use crate::cache::EdgeCache;
use crate::metrics::EdgeMetrics;
use crate::models::{CacheKey, CachedObject};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

#[derive(Debug)]
enum FillMessage {
    Store { key: CacheKey, entry: CachedObject },
    Flush(oneshot::Sender<()>),
}

/// Handle to the cache fill worker
///
/// The worker stops once every handle has been dropped and the queue is drained.
#[derive(Clone)]
pub struct CacheFiller {
    tx: mpsc::Sender<FillMessage>,
    metrics: Arc<EdgeMetrics>,
}

impl CacheFiller {
    /// Spawn the fill worker on the current tokio runtime
    ///
    /// # Arguments
    /// * `cache` - Cache receiving the entries
    /// * `capacity` - Maximum number of fills waiting in the queue
    /// * `metrics` - Shared metrics collector
    pub fn spawn(cache: Arc<dyn EdgeCache>, capacity: usize, metrics: Arc<EdgeMetrics>) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let worker_metrics = Arc::clone(&metrics);

        tokio::spawn(async move {
            Self::fill_task(rx, cache, worker_metrics).await;
        });

        CacheFiller { tx, metrics }
    }

    /// Queue an entry without waiting
    ///
    /// Returns `false` if the queue is full or the worker is gone; the fill is
    /// then dropped and the response is served uncached.
    pub fn submit(&self, key: CacheKey, entry: CachedObject) -> bool {
        let accepted = match self.tx.try_send(FillMessage::Store { key, entry }) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(FillMessage::Store { key, .. })) => {
                warn!("Cache fill queue full, dropping fill: key={}", key);
                false
            }
            Err(e) => {
                warn!("Cache fill worker unavailable: {}", e);
                false
            }
        };

        self.metrics.record_fill_submitted(accepted);
        accepted
    }

    /// Wait until every fill submitted before this call has been processed
    pub async fn flush(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        if self.tx.send(FillMessage::Flush(done_tx)).await.is_err() {
            return;
        }
        let _ = done_rx.await;
    }

    async fn fill_task(
        mut rx: mpsc::Receiver<FillMessage>,
        cache: Arc<dyn EdgeCache>,
        metrics: Arc<EdgeMetrics>,
    ) {
        debug!("Cache fill worker started");

        while let Some(msg) = rx.recv().await {
            match msg {
                FillMessage::Store { key, entry } => {
                    let size = entry.weight();
                    match cache.store(&key, entry).await {
                        Ok(()) => {
                            debug!("Cache fill completed: key={}, bytes={}", key, size);
                            metrics.record_fill_result(true);
                        }
                        Err(e) => {
                            warn!("Cache fill failed: key={}, error={}", key, e);
                            metrics.record_fill_result(false);
                        }
                    }
                }
                FillMessage::Flush(done) => {
                    let _ = done.send(());
                }
            }
        }

        info!("Cache fill worker stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{EdgeError, Result};
    use crate::models::ObjectMetadata;
    use async_trait::async_trait;
    use bytes::Bytes;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingCache {
        entries: Mutex<HashMap<String, CachedObject>>,
        fail: bool,
    }

    #[async_trait]
    impl EdgeCache for RecordingCache {
        async fn lookup(&self, key: &CacheKey) -> Result<Option<CachedObject>> {
            Ok(self.entries.lock().unwrap().get(key.as_str()).cloned())
        }

        async fn store(&self, key: &CacheKey, entry: CachedObject) -> Result<()> {
            if self.fail {
                return Err(EdgeError::CacheError("write refused".to_string()));
            }
            self.entries
                .lock()
                .unwrap()
                .insert(key.as_str().to_string(), entry);
            Ok(())
        }
    }

    fn entry(body: &'static [u8]) -> CachedObject {
        CachedObject::new(ObjectMetadata::default(), Bytes::from_static(body))
    }

    #[tokio::test]
    async fn test_submit_and_flush() {
        let cache = Arc::new(RecordingCache::default());
        let metrics = Arc::new(EdgeMetrics::new());
        let filler = CacheFiller::spawn(cache.clone(), 8, metrics.clone());

        let key = CacheKey::new("/a.js", None, true);
        assert!(filler.submit(key.clone(), entry(b"abc")));
        filler.flush().await;

        let stored = cache.lookup(&key).await.unwrap().unwrap();
        assert_eq!(stored.body, Bytes::from_static(b"abc"));

        let stats = metrics.get_stats();
        assert_eq!(stats.fills_submitted, 1);
        assert_eq!(stats.fills_completed, 1);
    }

    #[tokio::test]
    async fn test_failed_store_is_counted() {
        let cache = Arc::new(RecordingCache {
            fail: true,
            ..Default::default()
        });
        let metrics = Arc::new(EdgeMetrics::new());
        let filler = CacheFiller::spawn(cache, 8, metrics.clone());

        assert!(filler.submit(CacheKey::new("/a", None, true), entry(b"x")));
        filler.flush().await;

        let stats = metrics.get_stats();
        assert_eq!(stats.fills_failed, 1);
        assert_eq!(stats.fills_completed, 0);
    }

    #[test]
    fn test_full_queue_drops_fill() {
        // A current-thread runtime that is never driven keeps the worker idle,
        // so the queue fills up deterministically.
        let rt = tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap();
        let _guard = rt.enter();

        let metrics = Arc::new(EdgeMetrics::new());
        let filler = CacheFiller::spawn(Arc::new(RecordingCache::default()), 1, metrics.clone());

        assert!(filler.submit(CacheKey::new("/a", None, true), entry(b"a")));
        assert!(!filler.submit(CacheKey::new("/b", None, true), entry(b"b")));

        let stats = metrics.get_stats();
        assert_eq!(stats.fills_submitted, 1);
        assert_eq!(stats.fills_dropped, 1);
    }
}
