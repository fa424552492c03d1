//! Prometheus metrics for backing store calls

use prometheus::{CounterVec, HistogramVec, Registry};
use std::sync::Arc;
use std::time::Duration;

/// Latency and outcome of calls to the backing object store
#[derive(Clone)]
pub struct StoreMetrics {
    /// Store calls by operation (get, get_range, head) and result (hit, absent, error)
    pub store_requests_total: Arc<CounterVec>,

    /// Duration of store calls
    pub store_duration_seconds: Arc<HistogramVec>,

    registry: Registry,
}

impl StoreMetrics {
    /// Create store metrics in a fresh registry
    pub fn new() -> Result<Self, prometheus::Error> {
        Self::with_registry(Registry::new())
    }

    /// Create store metrics registered in `registry`
    pub fn with_registry(registry: Registry) -> Result<Self, prometheus::Error> {
        let store_requests_total = CounterVec::new(
            prometheus::Opts::new(
                "edge_cache_store_requests_total",
                "Total number of backing store calls",
            ),
            &["operation", "result"],
        )?;
        registry.register(Box::new(store_requests_total.clone()))?;

        let store_duration_seconds = HistogramVec::new(
            prometheus::HistogramOpts::new(
                "edge_cache_store_duration_seconds",
                "Duration of backing store calls in seconds",
            )
            .buckets(vec![
                0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0,
            ]),
            &["operation"],
        )?;
        registry.register(Box::new(store_duration_seconds.clone()))?;

        Ok(Self {
            store_requests_total: Arc::new(store_requests_total),
            store_duration_seconds: Arc::new(store_duration_seconds),
            registry,
        })
    }

    /// Record one store call
    pub fn record(&self, operation: &str, result: &str, duration: Duration) {
        self.store_requests_total
            .with_label_values(&[operation, result])
            .inc();
        self.store_duration_seconds
            .with_label_values(&[operation])
            .observe(duration.as_secs_f64());
    }

    /// Render all store metrics in Prometheus text format
    pub fn gather_text(&self) -> String {
        use prometheus::Encoder;

        let mut buffer = Vec::new();
        let encoder = prometheus::TextEncoder::new();
        if let Err(e) = encoder.encode(&self.registry.gather(), &mut buffer) {
            tracing::warn!("Failed to encode store metrics: {}", e);
            return String::new();
        }
        String::from_utf8(buffer).unwrap_or_default()
    }
}
