//! API Handlers
//!
//! HTTP request handlers for each cache server endpoint.

use axum::{
    extract::{Path, State},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::Value;
use tracing::warn;

use crate::cache::{CacheEngine, EdgeRule, EntryInfo, StatsSnapshot};
use crate::config::Config;
use crate::error::{CacheError, Result};
use crate::models::{
    ClearResponse, DeleteResponse, GetResponse, HealthResponse, InvalidateRequest,
    InvalidateResponse, SetRequest, SetResponse,
};

/// Response header reporting whether a read was served from the cache.
pub const CACHE_STATUS_HEADER: &str = "x-cache";

/// Application state shared across all handlers.
///
/// The engine is a cheap cloneable handle; all locking happens inside it.
#[derive(Clone, Debug)]
pub struct AppState {
    pub engine: CacheEngine,
}

impl AppState {
    pub fn new(engine: CacheEngine) -> Self {
        Self { engine }
    }

    /// Creates a new AppState from configuration.
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self::new(CacheEngine::from_config(config)?))
    }
}

/// Handler for PUT /cache/:key
///
/// Stores any JSON value under the key class policy, adjusted by the
/// optional fields of the body.
pub async fn set_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Json(req): Json<SetRequest>,
) -> Result<Json<SetResponse>> {
    if let Some(error_msg) = req.validate() {
        return Err(CacheError::InvalidRequest(error_msg));
    }

    state.engine.set_with(&key, &req.value, &req.to_override())?;

    Ok(Json(SetResponse::new(key)))
}

/// Handler for GET /cache/:key
///
/// Tags the response with `x-cache: HIT` or `MISS`. A value that cannot be
/// decoded is served as a miss rather than an error.
pub async fn get_handler(State(state): State<AppState>, Path(key): Path<String>) -> Response {
    match state.engine.get::<Value>(&key) {
        Ok(Some(value)) => (
            [(CACHE_STATUS_HEADER, "HIT")],
            Json(GetResponse::new(key, value)),
        )
            .into_response(),
        Ok(None) => ([(CACHE_STATUS_HEADER, "MISS")], CacheError::NotFound(key)).into_response(),
        Err(err) => {
            warn!("Cache read of '{}' failed, serving miss: {}", key, err);
            ([(CACHE_STATUS_HEADER, "MISS")], CacheError::NotFound(key)).into_response()
        }
    }
}

/// Handler for DELETE /cache/:key
pub async fn delete_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<DeleteResponse>> {
    if !state.engine.delete(&key) {
        return Err(CacheError::NotFound(key));
    }

    Ok(Json(DeleteResponse::new(key)))
}

/// Handler for GET /cache/:key/meta
///
/// Entry metadata; does not count as a hit or miss.
pub async fn meta_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<EntryInfo>> {
    state
        .engine
        .inspect(&key)
        .map(Json)
        .ok_or(CacheError::NotFound(key))
}

/// Handler for POST /invalidate
pub async fn invalidate_handler(
    State(state): State<AppState>,
    Json(req): Json<InvalidateRequest>,
) -> Result<Json<InvalidateResponse>> {
    if let Some(error_msg) = req.validate() {
        return Err(CacheError::InvalidRequest(error_msg));
    }

    let invalidated = state.engine.invalidate_by_tags(&req.tags);

    Ok(Json(InvalidateResponse::new(invalidated)))
}

/// Handler for POST /clear
pub async fn clear_handler(State(state): State<AppState>) -> Json<ClearResponse> {
    state.engine.clear();
    Json(ClearResponse::cleared())
}

/// Handler for GET /stats
pub async fn stats_handler(State(state): State<AppState>) -> Json<StatsSnapshot> {
    Json(state.engine.stats())
}

/// Handler for GET /edge-rules
///
/// Strategy table for browser-side caches, derived from the same key class
/// policies the engine applies.
pub async fn edge_rules_handler(State(state): State<AppState>) -> Json<Vec<EdgeRule>> {
    Json(state.engine.resolver().edge_rules())
}

/// Handler for GET /health
pub async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse::healthy(state.engine.len()))
}
