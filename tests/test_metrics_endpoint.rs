//! Integration tests for the metrics endpoint
//!
//! These tests verify that the metrics HTTP endpoint correctly exposes
//! edge counters in Prometheus format and JSON.

use edge_asset_cache::{EdgeMetrics, MetricsEndpoint, StoreMetrics};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

async fn free_addr() -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener); // Release the port
    addr
}

async fn fetch(addr: SocketAddr, route: &str) -> (u16, String) {
    let url = format!("http://{}{}", addr, route);
    let response = timeout(Duration::from_secs(2), reqwest::get(&url))
        .await
        .expect("request timed out")
        .expect("request failed");
    let status = response.status().as_u16();
    (status, response.text().await.unwrap())
}

#[tokio::test]
async fn test_metrics_endpoint_serves_metrics() {
    let metrics = Arc::new(EdgeMetrics::new());
    metrics.record_response(200);
    metrics.record_response(206);
    metrics.record_response(404);
    metrics.record_cache_hit();
    metrics.record_cache_miss();
    metrics.record_bytes_from_store(1000);

    let store_metrics = StoreMetrics::new().unwrap();
    store_metrics.record("get", "hit", Duration::from_millis(3));

    let addr = free_addr().await;
    let endpoint = MetricsEndpoint::new(Arc::clone(&metrics), addr)
        .with_store_metrics(Some(store_metrics));
    let handle = tokio::spawn(async move { endpoint.start().await });

    // Give the server time to start
    tokio::time::sleep(Duration::from_millis(200)).await;

    let (status, body) = fetch(addr, "/metrics").await;
    assert_eq!(status, 200);
    assert!(body.contains("edge_cache_requests_total 3"));
    assert!(body.contains("edge_cache_partial_responses_total 1"));
    assert!(body.contains("edge_cache_client_error_responses_total 1"));
    assert!(body.contains("edge_cache_cache_hit_rate 50.00"));
    assert!(body.contains("edge_cache_bytes_from_store_total 1000"));
    assert!(body.contains("edge_cache_store_duration_seconds_bucket"));

    let (status, body) = fetch(addr, "/stats").await;
    assert_eq!(status, 200);
    let stats: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(stats["counters"]["total_requests"], 3);
    assert_eq!(stats["counters"]["cache_hits"], 1);

    let (status, body) = fetch(addr, "/health").await;
    assert_eq!(status, 200);
    assert!(body.contains("healthy"));

    let (status, _) = fetch(addr, "/unknown").await;
    assert_eq!(status, 404);

    handle.abort();
}

#[tokio::test]
async fn test_metrics_endpoint_reflects_updates() {
    let metrics = Arc::new(EdgeMetrics::new());
    let addr = free_addr().await;
    let endpoint = MetricsEndpoint::new(Arc::clone(&metrics), addr);
    let handle = tokio::spawn(async move { endpoint.start().await });
    tokio::time::sleep(Duration::from_millis(200)).await;

    let (_, body) = fetch(addr, "/metrics").await;
    assert!(body.contains("edge_cache_requests_total 0"));

    metrics.record_response(200);
    metrics.record_fill_submitted(false);

    let (_, body) = fetch(addr, "/metrics").await;
    assert!(body.contains("edge_cache_requests_total 1"));
    assert!(body.contains("edge_cache_fills_dropped_total 1"));
    // No store histograms without a registry attached
    assert!(!body.contains("edge_cache_store_duration_seconds"));

    handle.abort();
}
