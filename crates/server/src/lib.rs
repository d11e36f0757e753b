//! corpusdb-server — HTTP server for corpusdb.
//!
//! Provides the REST API, snapshot scheduling, and the embedding provider
//! boundary. Core database logic lives in `corpusdb-core`.

/// REST API layer: Axum router, HTTP handlers, models, metrics.
pub mod api;
/// Embedding provider interface and local test provider.
pub mod embedding;
