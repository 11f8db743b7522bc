//! Error types for the cache engine
//!
//! Provides unified error handling using thiserror.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::cache::TransformKind;

// == Transform Error ==
/// Failure inside the value transform pipeline.
///
/// A transform error always fails the surrounding operation: the engine never
/// stores or returns bytes that skipped a transform the policy asked for.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransformError {
    /// The policy requested a transform that is not installed
    #[error("Transform not available: {0}")]
    Unavailable(TransformKind),

    #[error("Compression failed: {0}")]
    Compression(String),

    #[error("Decompression failed: {0}")]
    Decompression(String),

    #[error("Encryption failed: {0}")]
    Encryption(String),

    #[error("Decryption failed: {0}")]
    Decryption(String),

    /// Key material rejected by the cipher
    #[error("Invalid encryption key: {0}")]
    InvalidKey(String),
}

// == Fetch Error ==
/// Failure reported by a caller-supplied fetch function.
///
/// Cloneable so a single fetch outcome can be handed to every caller that
/// joined the same in-flight refresh.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Fetch failed for key '{key}': {message}")]
pub struct FetchError {
    pub key: String,
    pub message: String,
}

impl FetchError {
    pub fn new(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            message: message.into(),
        }
    }
}

// == Cache Error Enum ==
/// Unified error type for the cache engine.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Key not found in cache
    #[error("Key not found: {0}")]
    NotFound(String),

    /// Invalid request data
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// A single entry is larger than the whole cache
    #[error("Entry '{key}' of {size} bytes exceeds cache capacity of {capacity} bytes")]
    EntryTooLarge {
        key: String,
        size: usize,
        capacity: usize,
    },

    /// Size accounting invariant violated; eviction could not make room
    #[error("Capacity invariant violated: {0}")]
    Capacity(String),

    #[error(transparent)]
    Transform(#[from] TransformError),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// Value could not be converted to or from its stored JSON form
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid engine configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

// == IntoResponse Implementation ==
impl IntoResponse for CacheError {
    fn into_response(self) -> Response {
        let status = match &self {
            CacheError::NotFound(_) => StatusCode::NOT_FOUND,
            CacheError::InvalidRequest(_) | CacheError::Serialization(_) => {
                StatusCode::BAD_REQUEST
            }
            CacheError::EntryTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            CacheError::Fetch(_) => StatusCode::BAD_GATEWAY,
            CacheError::Capacity(_)
            | CacheError::Transform(_)
            | CacheError::Config(_)
            | CacheError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(json!({
            "error": self.to_string()
        }));

        (status, body).into_response()
    }
}

// == Result Type Alias ==
/// Convenience Result type for the cache engine.
pub type Result<T> = std::result::Result<T, CacheError>;
