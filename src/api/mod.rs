//! API Module
//!
//! HTTP handlers and routing for the cache server REST API.
//!
//! # Endpoints
//! - `PUT /cache/:key` - Store a JSON value
//! - `GET /cache/:key` - Retrieve a value (`x-cache: HIT|MISS`)
//! - `DELETE /cache/:key` - Delete a key
//! - `GET /cache/:key/meta` - Inspect entry metadata
//! - `POST /invalidate` - Remove entries by tag
//! - `POST /clear` - Drop all entries and reset statistics
//! - `GET /stats` - Get cache statistics
//! - `GET /edge-rules` - Strategy table for browser caches
//! - `GET /health` - Health check endpoint

pub mod handlers;
pub mod routes;

pub use handlers::*;
pub use routes::create_router;
