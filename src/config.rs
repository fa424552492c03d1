//! Configuration management for the edge asset cache

use crate::error::{EdgeError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

/// Value sent in `Cache-Control` for published objects
pub const IMMUTABLE_CACHE_CONTROL: &str = "public, max-age=31536000, immutable";

/// Configuration for the edge asset cache
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgeConfig {
    /// Address the asset server listens on (default: "0.0.0.0:8080")
    #[serde(default = "default_listen_address")]
    pub listen_address: String,

    /// Object served for the root path (default: "index.html")
    #[serde(default = "default_object_key")]
    pub default_object_key: String,

    /// Whether to send CORS permission headers (default: true)
    #[serde(default = "default_true")]
    pub enable_cors: bool,

    /// Cache-Control sent on successful object responses
    #[serde(default = "default_cache_control")]
    pub cache_control: String,

    /// Prefer the store's cache-control metadata over `cache_control` (default: false)
    #[serde(default)]
    pub honor_store_cache_control: bool,

    /// Whether to enable the edge cache (default: true)
    #[serde(default = "default_true")]
    pub enable_cache: bool,

    /// Cache TTL in seconds (default: 3600 = 1 hour)
    #[serde(default = "default_cache_ttl")]
    pub cache_ttl: u64,

    /// L1 (memory) cache size in bytes (default: 100MB)
    #[serde(default = "default_l1_cache_size")]
    pub l1_cache_size_bytes: usize,

    /// Objects larger than this are served but never cached (default: 32MB)
    #[serde(default = "default_max_cacheable")]
    pub max_cacheable_object_bytes: usize,

    /// Whether to enable L2 disk cache (default: true)
    #[serde(default = "default_true")]
    pub enable_l2_cache: bool,

    /// L2 (disk) cache directory (default: /var/cache/edge-asset-cache)
    #[serde(default = "default_l2_cache_dir")]
    pub l2_cache_dir: String,

    /// Include the query string in the cache key (default: true)
    #[serde(default = "default_true")]
    pub cache_key_include_query: bool,

    /// Capacity of the background cache fill queue (default: 1024)
    #[serde(default = "default_fill_queue_size")]
    pub cache_fill_queue_size: usize,

    /// Backing object store
    #[serde(default)]
    pub store: StoreConfig,

    /// Metrics endpoint configuration (optional)
    #[serde(default)]
    pub metrics_endpoint: Option<MetricsEndpointConfig>,
}

/// Backing store selection
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoreConfig {
    /// "fs", "http" or "memory" (default: "fs")
    #[serde(default = "default_store_backend")]
    pub backend: String,

    /// Root directory for the "fs" backend
    #[serde(default)]
    pub root_dir: Option<String>,

    /// Base URL of the bucket for the "http" backend
    #[serde(default)]
    pub origin_url: Option<String>,

    /// Per-request timeout against the store in seconds (default: 10)
    #[serde(default = "default_store_timeout")]
    pub timeout_secs: u64,
}

/// Configuration for the metrics HTTP endpoint
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MetricsEndpointConfig {
    /// Whether to enable the metrics endpoint (default: false)
    #[serde(default)]
    pub enabled: bool,

    /// Address to bind the metrics endpoint to (default: "127.0.0.1:9090")
    #[serde(default = "default_metrics_address")]
    pub address: String,
}

impl Default for MetricsEndpointConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            address: default_metrics_address(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: default_store_backend(),
            root_dir: Some("./public".to_string()),
            origin_url: None,
            timeout_secs: default_store_timeout(),
        }
    }
}

impl StoreConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    fn validate(&self) -> Result<()> {
        if self.timeout_secs == 0 {
            return Err(EdgeError::ConfigError(
                "store.timeout_secs must be greater than 0".to_string(),
            ));
        }

        match self.backend.as_str() {
            "fs" => match self.root_dir.as_deref() {
                Some(dir) if !dir.is_empty() => Ok(()),
                _ => Err(EdgeError::ConfigError(
                    "store.root_dir is required when store.backend is 'fs'".to_string(),
                )),
            },
            "http" => match self.origin_url.as_deref() {
                Some(url) if url.starts_with("http://") || url.starts_with("https://") => Ok(()),
                Some(url) => Err(EdgeError::ConfigError(format!(
                    "store.origin_url must be an http(s) URL, got '{}'",
                    url
                ))),
                None => Err(EdgeError::ConfigError(
                    "store.origin_url is required when store.backend is 'http'".to_string(),
                )),
            },
            "memory" => Ok(()),
            other => Err(EdgeError::ConfigError(format!(
                "Invalid store.backend '{}', must be 'fs', 'http' or 'memory'",
                other
            ))),
        }
    }
}

// Default value functions for serde
fn default_listen_address() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_object_key() -> String {
    "index.html".to_string()
}

fn default_true() -> bool {
    true
}

fn default_cache_control() -> String {
    IMMUTABLE_CACHE_CONTROL.to_string()
}

fn default_cache_ttl() -> u64 {
    3600 // 1 hour
}

fn default_l1_cache_size() -> usize {
    100 * 1024 * 1024 // 100MB
}

fn default_max_cacheable() -> usize {
    32 * 1024 * 1024 // 32MB
}

fn default_l2_cache_dir() -> String {
    "/var/cache/edge-asset-cache".to_string()
}

fn default_fill_queue_size() -> usize {
    1024
}

fn default_store_backend() -> String {
    "fs".to_string()
}

fn default_store_timeout() -> u64 {
    10
}

fn default_metrics_address() -> String {
    "127.0.0.1:9090".to_string()
}

impl Default for EdgeConfig {
    fn default() -> Self {
        EdgeConfig {
            listen_address: default_listen_address(),
            default_object_key: default_object_key(),
            enable_cors: default_true(),
            cache_control: default_cache_control(),
            honor_store_cache_control: false,
            enable_cache: default_true(),
            cache_ttl: default_cache_ttl(),
            l1_cache_size_bytes: default_l1_cache_size(),
            max_cacheable_object_bytes: default_max_cacheable(),
            enable_l2_cache: default_true(),
            l2_cache_dir: default_l2_cache_dir(),
            cache_key_include_query: default_true(),
            cache_fill_queue_size: default_fill_queue_size(),
            store: StoreConfig::default(),
            metrics_endpoint: None,
        }
    }
}

impl EdgeConfig {
    /// Load configuration from a YAML file
    ///
    /// # Returns
    /// * `Ok(EdgeConfig)` if loading and validation succeed
    /// * `Err(EdgeError)` if the file cannot be read or the config is invalid
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref()).map_err(|e| {
            EdgeError::ConfigError(format!("Failed to read config file: {}", e))
        })?;

        Self::from_yaml(&content)
    }

    /// Parse and validate configuration from YAML text
    pub fn from_yaml(content: &str) -> Result<Self> {
        let config: EdgeConfig = serde_yaml::from_str(content).map_err(|e| {
            EdgeError::ConfigError(format!("Failed to parse config file: {}", e))
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    ///
    /// # Validation Rules
    /// - listen_address must be a socket address
    /// - default_object_key must be non-empty and must not start with '/'
    /// - cache_ttl and l1_cache_size_bytes must be > 0 when caching is enabled
    /// - max_cacheable_object_bytes must fit in L1
    /// - cache_fill_queue_size must be > 0
    /// - store and metrics endpoint settings must be consistent
    pub fn validate(&self) -> Result<()> {
        self.socket_addr()?;

        if self.default_object_key.is_empty() {
            return Err(EdgeError::ConfigError(
                "default_object_key must not be empty".to_string(),
            ));
        }
        if self.default_object_key.starts_with('/') {
            return Err(EdgeError::ConfigError(format!(
                "default_object_key must not start with '/', got '{}'",
                self.default_object_key
            )));
        }

        if self.enable_cache {
            if self.cache_ttl == 0 {
                return Err(EdgeError::ConfigError(
                    "cache_ttl must be greater than 0 when caching is enabled".to_string(),
                ));
            }
            if self.l1_cache_size_bytes == 0 {
                return Err(EdgeError::ConfigError(
                    "l1_cache_size_bytes must be greater than 0 when caching is enabled"
                        .to_string(),
                ));
            }
            if self.max_cacheable_object_bytes > self.l1_cache_size_bytes {
                return Err(EdgeError::ConfigError(format!(
                    "max_cacheable_object_bytes ({}) must not exceed l1_cache_size_bytes ({})",
                    self.max_cacheable_object_bytes, self.l1_cache_size_bytes
                )));
            }
            if self.enable_l2_cache && self.l2_cache_dir.is_empty() {
                return Err(EdgeError::ConfigError(
                    "l2_cache_dir must not be empty when the L2 cache is enabled".to_string(),
                ));
            }
        }

        if self.cache_fill_queue_size == 0 {
            return Err(EdgeError::ConfigError(
                "cache_fill_queue_size must be greater than 0".to_string(),
            ));
        }

        self.store.validate()?;

        if let Some(metrics) = &self.metrics_endpoint {
            if metrics.enabled {
                metrics.address.parse::<SocketAddr>().map_err(|e| {
                    EdgeError::ConfigError(format!(
                        "Invalid metrics_endpoint.address '{}': {}",
                        metrics.address, e
                    ))
                })?;
            }
        }

        Ok(())
    }

    /// Parsed listen address
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        self.listen_address.parse::<SocketAddr>().map_err(|e| {
            EdgeError::ConfigError(format!(
                "Invalid listen_address '{}': {}",
                self.listen_address, e
            ))
        })
    }

    pub fn cache_ttl_duration(&self) -> Duration {
        Duration::from_secs(self.cache_ttl)
    }
}
