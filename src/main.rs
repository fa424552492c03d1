//! Edge Asset Cache Server
//!
//! Loads configuration, sets up logging, builds the backing store and edge
//! cache, and serves HTTP until Ctrl-C.

use anyhow::{bail, Context};
use edge_asset_cache::{
    EdgeCache, EdgeConfig, EdgeProxy, EdgeServer, FsObjectStore, HttpObjectStore,
    MemoryObjectStore, MetricsEndpoint, ObjectStore, StoreMetrics, TieredCache,
};
use std::env;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Main entry point for the edge asset cache
///
/// # Usage
/// ```bash
/// # Start with default config (edge-asset-cache.yaml)
/// edge-asset-cache
///
/// # Start with custom config
/// edge-asset-cache /path/to/config.yaml
/// ```
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_target(false)
        .with_thread_ids(true)
        .with_line_number(true)
        .init();

    info!("Starting Edge Asset Cache");

    let config_path = env::args()
        .nth(1)
        .unwrap_or_else(|| "edge-asset-cache.yaml".to_string());

    info!("Loading configuration from: {}", config_path);

    let config = EdgeConfig::from_file(&config_path)
        .with_context(|| format!("failed to load configuration from {}", config_path))?;

    info!("Configuration loaded successfully");
    info!("  - Listen address: {}", config.listen_address);
    info!("  - Store backend: {}", config.store.backend);
    info!("  - Default object: {}", config.default_object_key);
    info!("  - Cache enabled: {}", config.enable_cache);
    info!("  - Cache TTL: {} seconds", config.cache_ttl);
    info!("  - CORS enabled: {}", config.enable_cors);

    let config = Arc::new(config);
    let store = build_store(&config)?;
    let cache = build_cache(&config).await?;
    let edge_cache = cache
        .as_ref()
        .map(|cache| Arc::clone(cache) as Arc<dyn EdgeCache>);

    let store_metrics = StoreMetrics::new().context("failed to register store metrics")?;
    let proxy = Arc::new(
        EdgeProxy::new(Arc::clone(&config), store, edge_cache)?
            .with_store_metrics(store_metrics.clone()),
    );

    if let Some(metrics_config) = &config.metrics_endpoint {
        if metrics_config.enabled {
            let addr = metrics_config
                .address
                .parse()
                .with_context(|| format!("invalid metrics address {}", metrics_config.address))?;
            let endpoint = MetricsEndpoint::new(proxy.metrics_arc(), addr)
                .with_store_metrics(Some(store_metrics));

            tokio::spawn(async move {
                if let Err(e) = endpoint.start().await {
                    error!("Metrics endpoint failed: {}", e);
                }
            });
        }
    }

    let server = EdgeServer::bind(Arc::clone(&proxy), config.socket_addr()?).await?;
    server
        .serve(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Failed to listen for shutdown signal: {}", e);
            }
        })
        .await?;

    info!("Flushing pending cache fills");
    proxy.flush_cache_fills().await;
    if let Some(cache) = &cache {
        info!("Waiting for the L2 disk writer to drain");
        cache.shutdown().await;
    }

    let stats = proxy.metrics().get_stats();
    info!(
        "Shutdown complete: requests={}, cache_hit_rate={:.2}%",
        stats.total_requests,
        stats.cache_hit_rate()
    );
    Ok(())
}

fn build_store(config: &EdgeConfig) -> anyhow::Result<Arc<dyn ObjectStore>> {
    let store = &config.store;
    let built: Arc<dyn ObjectStore> = match store.backend.as_str() {
        "fs" => {
            let root = store.root_dir.as_deref().context("store.root_dir is not set")?;
            info!("Serving objects from directory {}", root);
            Arc::new(FsObjectStore::new(root))
        }
        "http" => {
            let url = store.origin_url.as_deref().context("store.origin_url is not set")?;
            info!("Serving objects from origin {}", url);
            Arc::new(HttpObjectStore::with_timeout(url, store.timeout())?)
        }
        "memory" => {
            warn!("Using an empty in-memory store; every request will return 404");
            Arc::new(MemoryObjectStore::new())
        }
        other => bail!("unsupported store backend '{}'", other),
    };
    Ok(built)
}

async fn build_cache(config: &EdgeConfig) -> anyhow::Result<Option<Arc<TieredCache>>> {
    if !config.enable_cache {
        info!("Edge cache disabled");
        return Ok(None);
    }

    let cache = if config.enable_l2_cache {
        TieredCache::new(
            config.cache_ttl_duration(),
            config.l1_cache_size_bytes,
            &config.l2_cache_dir,
        )
        .await?
    } else {
        TieredCache::memory_only(config.cache_ttl_duration(), config.l1_cache_size_bytes)
    };

    Ok(Some(Arc::new(cache)))
}
