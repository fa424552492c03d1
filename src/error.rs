//! Error types for the edge asset cache

use thiserror::Error;

/// Result type alias for edge cache operations
pub type Result<T> = std::result::Result<T, EdgeError>;

/// Error types that can occur while serving an object
#[derive(Error, Debug, Clone)]
pub enum EdgeError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("Method not allowed: {0}")]
    MethodNotAllowed(String),

    #[error("Invalid byte range: {0}")]
    InvalidRange(String),

    #[error("Unsatisfiable range: {0}")]
    UnsatisfiableRange(String),

    #[error("Backing store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Cache error: {0}")]
    CacheError(String),

    #[error("Response assembly error: {0}")]
    AssemblyError(String),

    #[error("IO error: {0}")]
    IoError(String),

    #[error("Network timeout: {0}")]
    Timeout(String),
}

impl From<std::io::Error> for EdgeError {
    fn from(err: std::io::Error) -> Self {
        EdgeError::IoError(err.to_string())
    }
}

impl From<reqwest::Error> for EdgeError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            EdgeError::Timeout(err.to_string())
        } else {
            EdgeError::StoreUnavailable(err.to_string())
        }
    }
}

impl EdgeError {
    /// Whether a store client could reasonably retry the failed operation.
    ///
    /// The request path never retries on its own; this only classifies
    /// errors for the store layer and for logging.
    pub fn should_retry(&self) -> bool {
        match self {
            EdgeError::StoreUnavailable(_) => true,
            EdgeError::Timeout(_) => true,
            EdgeError::IoError(_) => true,

            EdgeError::ConfigError(_) => false,
            EdgeError::NotFound(_) => false,
            EdgeError::MethodNotAllowed(_) => false,
            EdgeError::InvalidRange(_) => false,
            EdgeError::UnsatisfiableRange(_) => false,
            EdgeError::CacheError(_) => false,
            EdgeError::AssemblyError(_) => false,
        }
    }

    /// Convert error to HTTP status code
    ///
    /// - Missing objects: 404
    /// - Unsupported methods: 405
    /// - Bad or unsatisfiable ranges: 416
    /// - Backing store failures: 502 (504 on timeout)
    /// - Everything else: 500
    pub fn to_http_status(&self) -> u16 {
        match self {
            EdgeError::NotFound(_) => 404,
            EdgeError::MethodNotAllowed(_) => 405,

            EdgeError::InvalidRange(_) => 416,
            EdgeError::UnsatisfiableRange(_) => 416,

            EdgeError::StoreUnavailable(_) => 502,
            EdgeError::Timeout(_) => 504,

            EdgeError::ConfigError(_) => 500,
            EdgeError::CacheError(_) => 500,
            EdgeError::AssemblyError(_) => 500,
            EdgeError::IoError(_) => 500,
        }
    }

    /// Create an error from a status code returned by a remote store
    ///
    /// Only failures reach here: 404 is reported by the store as absence,
    /// so any other 4xx is treated as the store misbehaving.
    pub fn from_store_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status {
            404 => EdgeError::NotFound(message),
            416 => EdgeError::UnsatisfiableRange(message),
            504 => EdgeError::Timeout(format!("HTTP {}: {}", status, message)),
            _ => EdgeError::StoreUnavailable(format!("HTTP {}: {}", status, message)),
        }
    }
}
