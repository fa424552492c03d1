//! Metrics collection for the edge asset cache
//!
//! This module provides thread-safe metrics collection using atomic operations.
//! It tracks requests by outcome, cache lookups, background cache fills,
//! backing store reads, transferred bytes and latencies.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Metrics collector for the edge proxy
///
/// All operations are thread-safe using atomic operations.
#[derive(Debug, Default)]
pub struct EdgeMetrics {
    // Request statistics
    total_requests: AtomicU64,
    full_responses: AtomicU64,
    partial_responses: AtomicU64,
    not_modified_responses: AtomicU64,
    client_error_responses: AtomicU64,
    server_error_responses: AtomicU64,

    // Cache statistics
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    cache_errors: AtomicU64,

    // Background fill statistics
    fills_submitted: AtomicU64,
    fills_dropped: AtomicU64,
    fills_completed: AtomicU64,
    fills_failed: AtomicU64,

    // Backing store statistics
    store_reads: AtomicU64,
    store_errors: AtomicU64,

    // Byte statistics
    bytes_from_store: AtomicU64,
    bytes_from_cache: AtomicU64,
    bytes_to_client: AtomicU64,

    // Latency statistics (stored as microseconds)
    total_request_duration_us: AtomicU64,
}

/// Snapshot of metrics at a point in time
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub total_requests: u64,
    pub full_responses: u64,
    pub partial_responses: u64,
    pub not_modified_responses: u64,
    pub client_error_responses: u64,
    pub server_error_responses: u64,

    pub cache_hits: u64,
    pub cache_misses: u64,
    pub cache_errors: u64,

    pub fills_submitted: u64,
    pub fills_dropped: u64,
    pub fills_completed: u64,
    pub fills_failed: u64,

    pub store_reads: u64,
    pub store_errors: u64,

    pub bytes_from_store: u64,
    pub bytes_from_cache: u64,
    pub bytes_to_client: u64,

    pub total_request_duration_us: u64,
}

impl EdgeMetrics {
    /// Create a new metrics collector
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a finished request by its response status
    pub fn record_response(&self, status: u16) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        let bucket = match status {
            200 => &self.full_responses,
            206 => &self.partial_responses,
            304 => &self.not_modified_responses,
            400..=499 => &self.client_error_responses,
            500..=599 => &self.server_error_responses,
            _ => return,
        };
        bucket.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_miss(&self) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a failed cache lookup (treated as a miss by the proxy)
    pub fn record_cache_error(&self) {
        self.cache_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a cache fill handed to the background worker
    ///
    /// # Arguments
    /// * `accepted` - false when the fill queue was full and the fill was dropped
    pub fn record_fill_submitted(&self, accepted: bool) {
        if accepted {
            self.fills_submitted.fetch_add(1, Ordering::Relaxed);
        } else {
            self.fills_dropped.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Record the outcome of a background cache fill
    pub fn record_fill_result(&self, success: bool) {
        if success {
            self.fills_completed.fetch_add(1, Ordering::Relaxed);
        } else {
            self.fills_failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Record a call to the backing store
    pub fn record_store_read(&self, success: bool) {
        self.store_reads.fetch_add(1, Ordering::Relaxed);
        if !success {
            self.store_errors.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_bytes_from_store(&self, bytes: u64) {
        self.bytes_from_store.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn record_bytes_from_cache(&self, bytes: u64) {
        self.bytes_from_cache.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn record_bytes_to_client(&self, bytes: u64) {
        self.bytes_to_client.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn record_request_duration(&self, duration: Duration) {
        self.total_request_duration_us
            .fetch_add(duration.as_micros() as u64, Ordering::Relaxed);
    }

    /// Get a snapshot of current metrics
    ///
    /// The snapshot may not be perfectly consistent across fields while
    /// requests are in flight.
    pub fn get_stats(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            total_requests: self.total_requests.load(Ordering::Relaxed),
            full_responses: self.full_responses.load(Ordering::Relaxed),
            partial_responses: self.partial_responses.load(Ordering::Relaxed),
            not_modified_responses: self.not_modified_responses.load(Ordering::Relaxed),
            client_error_responses: self.client_error_responses.load(Ordering::Relaxed),
            server_error_responses: self.server_error_responses.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
            cache_errors: self.cache_errors.load(Ordering::Relaxed),
            fills_submitted: self.fills_submitted.load(Ordering::Relaxed),
            fills_dropped: self.fills_dropped.load(Ordering::Relaxed),
            fills_completed: self.fills_completed.load(Ordering::Relaxed),
            fills_failed: self.fills_failed.load(Ordering::Relaxed),
            store_reads: self.store_reads.load(Ordering::Relaxed),
            store_errors: self.store_errors.load(Ordering::Relaxed),
            bytes_from_store: self.bytes_from_store.load(Ordering::Relaxed),
            bytes_from_cache: self.bytes_from_cache.load(Ordering::Relaxed),
            bytes_to_client: self.bytes_to_client.load(Ordering::Relaxed),
            total_request_duration_us: self.total_request_duration_us.load(Ordering::Relaxed),
        }
    }
}

impl MetricsSnapshot {
    /// Calculate cache hit rate as a percentage (0.0 to 100.0)
    pub fn cache_hit_rate(&self) -> f64 {
        let total = self.cache_hits + self.cache_misses;
        if total == 0 {
            0.0
        } else {
            (self.cache_hits as f64 / total as f64) * 100.0
        }
    }

    /// Calculate average request duration in milliseconds
    pub fn avg_request_duration_ms(&self) -> f64 {
        if self.total_requests == 0 {
            0.0
        } else {
            (self.total_request_duration_us as f64 / self.total_requests as f64) / 1000.0
        }
    }

    /// Calculate store error rate as a percentage (0.0 to 100.0)
    pub fn store_error_rate(&self) -> f64 {
        if self.store_reads == 0 {
            0.0
        } else {
            (self.store_errors as f64 / self.store_reads as f64) * 100.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_record_response_buckets() {
        let metrics = EdgeMetrics::new();

        for status in [200, 200, 206, 304, 404, 416, 502, 204] {
            metrics.record_response(status);
        }

        let stats = metrics.get_stats();
        assert_eq!(stats.total_requests, 8);
        assert_eq!(stats.full_responses, 2);
        assert_eq!(stats.partial_responses, 1);
        assert_eq!(stats.not_modified_responses, 1);
        assert_eq!(stats.client_error_responses, 2);
        assert_eq!(stats.server_error_responses, 1);
    }

    #[test]
    fn test_record_fills() {
        let metrics = EdgeMetrics::new();

        metrics.record_fill_submitted(true);
        metrics.record_fill_submitted(true);
        metrics.record_fill_submitted(false);
        metrics.record_fill_result(true);
        metrics.record_fill_result(false);

        let stats = metrics.get_stats();
        assert_eq!(stats.fills_submitted, 2);
        assert_eq!(stats.fills_dropped, 1);
        assert_eq!(stats.fills_completed, 1);
        assert_eq!(stats.fills_failed, 1);
    }

    #[test]
    fn test_cache_hit_rate() {
        let metrics = EdgeMetrics::new();
        assert_eq!(metrics.get_stats().cache_hit_rate(), 0.0);

        metrics.record_cache_hit();
        metrics.record_cache_hit();
        metrics.record_cache_hit();
        metrics.record_cache_miss();

        assert_eq!(metrics.get_stats().cache_hit_rate(), 75.0);
    }

    #[test]
    fn test_store_error_rate_and_latency() {
        let metrics = EdgeMetrics::new();

        metrics.record_store_read(true);
        metrics.record_store_read(false);
        metrics.record_response(200);
        metrics.record_request_duration(Duration::from_millis(100));
        metrics.record_response(502);
        metrics.record_request_duration(Duration::from_millis(200));

        let stats = metrics.get_stats();
        assert_eq!(stats.store_error_rate(), 50.0);
        assert_eq!(stats.avg_request_duration_ms(), 150.0);
    }

    #[test]
    fn test_thread_safety() {
        let metrics = Arc::new(EdgeMetrics::new());
        let mut handles = vec![];

        for _ in 0..10 {
            let metrics_clone = Arc::clone(&metrics);
            handles.push(thread::spawn(move || {
                for _ in 0..100 {
                    metrics_clone.record_response(200);
                    metrics_clone.record_cache_hit();
                    metrics_clone.record_bytes_to_client(10);
                }
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }

        let stats = metrics.get_stats();
        assert_eq!(stats.total_requests, 1000);
        assert_eq!(stats.cache_hits, 1000);
        assert_eq!(stats.bytes_to_client, 10_000);
    }
}
