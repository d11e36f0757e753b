//! Request and response data transfer objects for the REST API.
//!
//! Entity types from `corpusdb-core` serialize directly where they match
//! the wire shape (libraries, documents, chunks, stats); the types here
//! cover everything with a distinct request/response form.

use corpusdb_core::entity::{Chunk, Metadata};
use corpusdb_core::filter_types::Filter;
use corpusdb_core::index::{IndexKind, IndexStats};
use corpusdb_core::search::SearchHit;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Request body for `POST /libraries`.
#[derive(Debug, Deserialize)]
pub struct CreateLibraryRequest {
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub metadata: Metadata,
    /// Index kind to use for lazy builds; defaults to the server-wide kind.
    pub index_kind: Option<IndexKind>,
    /// When set, approximate search never pads from an exact scan.
    #[serde(default)]
    pub strict: bool,
}

/// Request body for `PUT /libraries/:id`.
#[derive(Debug, Deserialize)]
pub struct UpdateLibraryRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub metadata: Option<Metadata>,
}

/// Request body for `POST /libraries/:lid/documents`.
#[derive(Debug, Deserialize)]
pub struct CreateDocumentRequest {
    pub name: String,
    #[serde(default)]
    pub metadata: Metadata,
}

/// Request body for `PUT /libraries/:lid/documents/:did`.
#[derive(Debug, Deserialize)]
pub struct UpdateDocumentRequest {
    pub name: Option<String>,
    pub metadata: Option<Metadata>,
}

/// One element of the array body for
/// `POST /libraries/:lid/documents/:did/chunks`.
#[derive(Debug, Deserialize)]
pub struct CreateChunkRequest {
    pub text: String,
    pub embedding: Vec<f64>,
    #[serde(default)]
    pub metadata: Metadata,
}

/// Request body for chunk updates. The embedding is immutable; supplying
/// one is rejected with 400.
#[derive(Debug, Deserialize)]
pub struct UpdateChunkRequest {
    pub text: Option<String>,
    pub metadata: Option<Metadata>,
    pub embedding: Option<Vec<f64>>,
}

/// Query parameters for `POST /libraries/:id/index`.
#[derive(Debug, Deserialize)]
pub struct BuildIndexQuery {
    pub kind: Option<String>,
}

/// Optional body for `POST /libraries/:id/index` with per-build tuning.
#[derive(Debug, Default, Deserialize)]
pub struct BuildIndexRequest {
    pub leaf_size: Option<usize>,
    pub lsh_bands: Option<usize>,
    pub lsh_hashes: Option<usize>,
    pub lsh_probes: Option<usize>,
    pub lsh_seed: Option<u64>,
}

fn default_k() -> usize {
    5
}

/// Request body for `POST /search/libraries/:lid`.
#[derive(Debug, Deserialize)]
pub struct SearchRequest {
    pub query_embedding: Vec<f64>,
    #[serde(default = "default_k")]
    pub k: usize,
    pub filters: Option<Filter>,
}

/// Request body for `POST /search/libraries`.
#[derive(Debug, Deserialize)]
pub struct MultiSearchRequest {
    pub query_embedding: Vec<f64>,
    #[serde(default = "default_k")]
    pub k: usize,
    pub library_ids: Vec<Uuid>,
    pub filters: Option<Filter>,
}

/// One ranked hit: the chunk plus its L2 distance from the query.
#[derive(Debug, Serialize)]
pub struct SearchHitResponse {
    pub distance: f64,
    pub chunk: Chunk,
}

impl From<SearchHit> for SearchHitResponse {
    fn from(hit: SearchHit) -> Self {
        Self {
            distance: hit.distance,
            chunk: (*hit.chunk).clone(),
        }
    }
}

/// Response body for single-library search.
#[derive(Debug, Serialize)]
pub struct SearchResponse {
    pub results: Vec<SearchHitResponse>,
    pub count: usize,
    pub index_kind: Option<IndexKind>,
}

/// Response body for multi-library search: one independent per-library
/// result set, keyed by library id.
#[derive(Debug, Serialize)]
pub struct MultiSearchResponse {
    pub results: HashMap<Uuid, SearchResponse>,
}

/// Response body for `POST /libraries/:id/index`.
#[derive(Debug, Serialize)]
pub struct BuildIndexResponse {
    pub message: String,
    pub stats: IndexStats,
}

/// Response body for `GET /libraries/:id/analytics`.
#[derive(Debug, Serialize)]
pub struct AnalyticsResponse {
    pub library_id: Uuid,
    pub total_documents: usize,
    pub total_chunks: usize,
    pub average_chunk_length: f64,
    pub embedding_dimension: Option<usize>,
    pub index: Option<IndexStats>,
}

/// Response body for `GET /health`.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub library_count: usize,
    pub chunk_count: usize,
}

/// Generic success message response.
#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}
