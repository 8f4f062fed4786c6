//! Error types for dexsync.
//!
//! One enum covers the upstream client, the catalog store, the cache layer and
//! the seeder. The read path never surfaces cache errors (the cache manager
//! degrades them to misses), so the `Cache*` variants mostly show up in logs.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Main error type for dexsync.
#[derive(Debug, Error)]
pub enum DexError {
    // Upstream transport errors
    #[error("Network error: {message}")]
    Network {
        message: String,
        #[source]
        source: Option<reqwest::Error>,
    },

    #[error("Request timeout after {0:?}")]
    Timeout(Duration),

    #[error("Rate limited by {service}, retry after {retry_after_secs:?} seconds")]
    RateLimited {
        service: String,
        retry_after_secs: Option<u64>,
    },

    #[error("Upstream returned HTTP {status} for {url}")]
    UpstreamStatus { status: u16, url: String },

    /// Body ended early or was not valid JSON. Worth another attempt.
    #[error("Failed to decode upstream response: {message}")]
    Decode { message: String },

    // Upstream content errors
    #[error("Pokemon {id} not found")]
    NotFound { id: u32 },

    #[error("Malformed payload for pokemon {id}: {message}")]
    Malformed { id: u32, message: String },

    // Storage errors
    #[error("Database error: {message}")]
    Database {
        message: String,
        #[source]
        source: Option<rusqlite::Error>,
    },

    #[error("Cache backend error: {message}")]
    Cache { message: String },

    #[error("Cache serialization error: {message}")]
    CacheSerialization { message: String },

    #[error("IO error at {path:?}: {message}")]
    Io {
        message: String,
        path: Option<PathBuf>,
        #[source]
        source: Option<std::io::Error>,
    },

    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    // Seeding errors
    #[error("A seeding run is already in progress")]
    SeedInProgress,

    #[error("Unknown batch label: {label}")]
    UnknownBatch { label: String },

    // Configuration and input errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Validation error for {field}: {message}")]
    Validation { field: String, message: String },

    #[error("Invalid params: {message}")]
    InvalidParams { message: String },

    #[error("{0}")]
    Other(String),
}

/// Result type alias for dexsync operations.
pub type Result<T> = std::result::Result<T, DexError>;

impl From<std::io::Error> for DexError {
    fn from(err: std::io::Error) -> Self {
        DexError::Io {
            message: err.to_string(),
            path: None,
            source: Some(err),
        }
    }
}

impl From<serde_json::Error> for DexError {
    fn from(err: serde_json::Error) -> Self {
        DexError::Json {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl From<rusqlite::Error> for DexError {
    fn from(err: rusqlite::Error) -> Self {
        DexError::Database {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl From<reqwest::Error> for DexError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            DexError::Timeout(Duration::from_secs(0))
        } else if err.is_decode() || err.is_body() {
            DexError::Decode {
                message: err.to_string(),
            }
        } else {
            DexError::Network {
                message: err.to_string(),
                source: Some(err),
            }
        }
    }
}

impl DexError {
    /// Create an IO error with path context.
    pub fn io_with_path(err: std::io::Error, path: impl Into<PathBuf>) -> Self {
        DexError::Io {
            message: err.to_string(),
            path: Some(path.into()),
            source: Some(err),
        }
    }

    /// Create a validation error for a named field.
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        DexError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Convert to a JSON-RPC error code.
    ///
    /// Application codes:
    /// - -32000: Upstream/connectivity error
    /// - -32002: Pokemon not found
    /// - -32003: Upstream payload rejected
    /// - -32005: Validation error
    /// - -32006: Seeding already running
    pub fn to_rpc_error_code(&self) -> i32 {
        match self {
            DexError::Network { .. }
            | DexError::Timeout(_)
            | DexError::RateLimited { .. }
            | DexError::UpstreamStatus { .. }
            | DexError::Decode { .. } => -32000,

            DexError::NotFound { .. } => -32002,

            DexError::Malformed { .. } => -32003,

            DexError::Validation { .. } | DexError::UnknownBatch { .. } => -32005,

            DexError::SeedInProgress => -32006,

            DexError::InvalidParams { .. } => -32602,

            _ => -32603,
        }
    }

    /// Minimum wait the upstream asked for before trying again.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            DexError::RateLimited {
                retry_after_secs: Some(secs),
                ..
            } => Some(Duration::from_secs(*secs)),
            _ => None,
        }
    }

    /// Check if this error should trigger a retry.
    ///
    /// Transient failures are transport problems, throttling, 408/429/5xx
    /// responses and bodies that were cut off or garbled in transit.
    pub fn is_retryable(&self) -> bool {
        match self {
            DexError::Network { .. }
            | DexError::Timeout(_)
            | DexError::RateLimited { .. }
            | DexError::Decode { .. } => true,
            DexError::UpstreamStatus { status, .. } => {
                matches!(status, 408 | 429) || (500..600).contains(status)
            }
            _ => false,
        }
    }
}
