//! Metrics HTTP Endpoint
//!
//! Serves runtime metrics on a separate port:
//! - `/metrics`: Prometheus text format (request counters plus store latency histograms)
//! - `/stats`: the same counters as JSON
//! - `/health`: liveness check

use crate::metrics::{EdgeMetrics, MetricsSnapshot};
use crate::store_metrics::StoreMetrics;
use http::header::CONTENT_TYPE;
use http::HeaderValue;
use http_body_util::Full;
use hyper::body::Bytes;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::fmt::Write;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info};

/// Metrics endpoint server
pub struct MetricsEndpoint {
    metrics: Arc<EdgeMetrics>,
    store_metrics: Option<StoreMetrics>,
    addr: SocketAddr,
}

impl MetricsEndpoint {
    /// Create a new metrics endpoint
    ///
    /// # Example
    /// ```no_run
    /// use edge_asset_cache::metrics::EdgeMetrics;
    /// use edge_asset_cache::metrics_endpoint::MetricsEndpoint;
    /// use std::sync::Arc;
    ///
    /// let metrics = Arc::new(EdgeMetrics::new());
    /// let endpoint = MetricsEndpoint::new(metrics, "127.0.0.1:9090".parse().unwrap());
    /// ```
    pub fn new(metrics: Arc<EdgeMetrics>, addr: SocketAddr) -> Self {
        Self {
            metrics,
            store_metrics: None,
            addr,
        }
    }

    /// Also expose the store latency histograms on `/metrics`
    pub fn with_store_metrics(mut self, store_metrics: Option<StoreMetrics>) -> Self {
        self.store_metrics = store_metrics;
        self
    }

    /// Start the metrics endpoint server
    ///
    /// Runs until the process is terminated or the listener fails.
    pub async fn start(self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let listener = TcpListener::bind(self.addr).await?;
        info!("Metrics endpoint listening on http://{}", self.addr);

        let state = Arc::new(self);

        loop {
            let (stream, _) = listener.accept().await?;
            let io = TokioIo::new(stream);
            let state = Arc::clone(&state);

            tokio::task::spawn(async move {
                let service = service_fn(move |req| {
                    let state = Arc::clone(&state);
                    async move { state.handle_request(req).await }
                });

                if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                    error!("Error serving metrics connection: {:?}", err);
                }
            });
        }
    }

    async fn handle_request<B>(
        &self,
        req: Request<B>,
    ) -> Result<Response<Full<Bytes>>, hyper::Error> {
        Ok(self.route(req.uri().path()))
    }

    fn route(&self, path: &str) -> Response<Full<Bytes>> {
        match path {
            "/metrics" => {
                let mut body = format_prometheus_metrics(&self.metrics.get_stats());
                if let Some(store_metrics) = &self.store_metrics {
                    body.push_str(&store_metrics.gather_text());
                }
                text_response(
                    StatusCode::OK,
                    "text/plain; version=0.0.4; charset=utf-8",
                    body,
                )
            }
            "/stats" => text_response(
                StatusCode::OK,
                "application/json",
                format_json_stats(&self.metrics.get_stats()),
            ),
            "/health" => text_response(
                StatusCode::OK,
                "application/json",
                r#"{"status":"healthy"}"#.to_string(),
            ),
            _ => text_response(
                StatusCode::NOT_FOUND,
                "text/plain",
                "404 Not Found".to_string(),
            ),
        }
    }
}

fn text_response(
    status: StatusCode,
    content_type: &'static str,
    body: String,
) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from(body)));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    response
}

fn push_metric(
    output: &mut String,
    name: &str,
    kind: &str,
    help: &str,
    value: impl std::fmt::Display,
) {
    let _ = writeln!(output, "# HELP edge_cache_{} {}", name, help);
    let _ = writeln!(output, "# TYPE edge_cache_{} {}", name, kind);
    let _ = writeln!(output, "edge_cache_{} {}", name, value);
    output.push('\n');
}

/// Format metrics in Prometheus exposition format
fn format_prometheus_metrics(snapshot: &MetricsSnapshot) -> String {
    let counters: [(&str, &str, u64); 18] = [
        ("requests_total", "Total number of requests processed", snapshot.total_requests),
        ("full_responses_total", "Number of 200 responses", snapshot.full_responses),
        ("partial_responses_total", "Number of 206 responses", snapshot.partial_responses),
        (
            "not_modified_responses_total",
            "Number of 304 responses",
            snapshot.not_modified_responses,
        ),
        (
            "client_error_responses_total",
            "Number of 4xx responses",
            snapshot.client_error_responses,
        ),
        (
            "server_error_responses_total",
            "Number of 5xx responses",
            snapshot.server_error_responses,
        ),
        ("cache_hits_total", "Number of cache hits", snapshot.cache_hits),
        ("cache_misses_total", "Number of cache misses", snapshot.cache_misses),
        ("cache_errors_total", "Number of failed cache lookups", snapshot.cache_errors),
        ("fills_submitted_total", "Cache fills queued", snapshot.fills_submitted),
        (
            "fills_dropped_total",
            "Cache fills dropped because the queue was full",
            snapshot.fills_dropped,
        ),
        ("fills_completed_total", "Cache fills written", snapshot.fills_completed),
        ("fills_failed_total", "Cache fills that failed", snapshot.fills_failed),
        ("store_reads_total", "Backing store calls", snapshot.store_reads),
        ("store_errors_total", "Failed backing store calls", snapshot.store_errors),
        (
            "bytes_from_store_total",
            "Total bytes read from the backing store",
            snapshot.bytes_from_store,
        ),
        (
            "bytes_from_cache_total",
            "Body bytes served from the edge cache",
            snapshot.bytes_from_cache,
        ),
        ("bytes_to_client_total", "Total body bytes sent to clients", snapshot.bytes_to_client),
    ];

    let mut output = String::new();
    for (name, help, value) in counters {
        push_metric(&mut output, name, "counter", help, value);
    }

    push_metric(
        &mut output,
        "cache_hit_rate",
        "gauge",
        "Cache hit rate percentage",
        format!("{:.2}", snapshot.cache_hit_rate()),
    );
    push_metric(
        &mut output,
        "request_duration_ms_avg",
        "gauge",
        "Average request duration in milliseconds",
        format!("{:.2}", snapshot.avg_request_duration_ms()),
    );

    output
}

fn format_json_stats(snapshot: &MetricsSnapshot) -> String {
    serde_json::json!({
        "counters": snapshot,
        "cache_hit_rate": snapshot.cache_hit_rate(),
        "store_error_rate": snapshot.store_error_rate(),
        "avg_request_duration_ms": snapshot.avg_request_duration_ms(),
    })
    .to_string()
}
