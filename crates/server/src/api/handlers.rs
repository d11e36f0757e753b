//! HTTP request handlers and shared application state.
//!
//! Each public async function corresponds to an API route registered in
//! [`create_router`](crate::api::create_router). Handlers extract path and
//! body parameters via Axum extractors and delegate to the
//! [`Database`](corpusdb_core::storage::Database) and
//! [`LibraryHandle`](corpusdb_core::storage::LibraryHandle) methods,
//! returning JSON responses or [`ApiError`](crate::api::errors::ApiError)
//! on failure.
//!
//! Embedding vectors arrive pre-computed; any call to an embedding provider
//! happens before a request reaches the engine, so no lock is ever held
//! across an external call.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use metrics_exporter_prometheus::PrometheusHandle;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Instant;
use uuid::Uuid;

use corpusdb_core::config;
use corpusdb_core::entity::{Chunk, Document, Library, Metadata};
use corpusdb_core::index::IndexConfig;
use corpusdb_core::storage::{ChunkDraft, Database, LibraryStats};

use crate::api::errors::ApiError;
use crate::api::metrics;
use crate::api::models::*;

/// Shared application state passed to every handler via Axum's `State`
/// extractor.
#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    /// Index configuration applied to newly created libraries.
    pub default_index_config: IndexConfig,
    /// Snapshot target; `None` runs the store in-memory only.
    pub snapshot_path: Option<PathBuf>,
    pub prometheus_handle: PrometheusHandle,
    pub start_time: Instant,
}

fn validate_name(name: &str) -> Result<(), ApiError> {
    if name.is_empty() || name.len() > config::MAX_NAME_LEN {
        return Err(ApiError::BadRequest(format!(
            "name must be 1-{} characters",
            config::MAX_NAME_LEN
        )));
    }
    Ok(())
}

fn validate_description(description: &str) -> Result<(), ApiError> {
    if description.len() > config::MAX_DESCRIPTION_LEN {
        return Err(ApiError::BadRequest(format!(
            "description must be at most {} characters",
            config::MAX_DESCRIPTION_LEN
        )));
    }
    Ok(())
}

fn validate_metadata(metadata: &Metadata) -> Result<(), ApiError> {
    if metadata.len() > config::MAX_METADATA_KEYS {
        return Err(ApiError::BadRequest(format!(
            "metadata exceeds maximum of {} keys",
            config::MAX_METADATA_KEYS
        )));
    }
    Ok(())
}

/// `GET /health` — server status, version, uptime, and store counts.
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        library_count: state.db.library_count(),
        chunk_count: state.db.chunk_count(),
    })
}

/// `GET /metrics` — Prometheus exposition of request and store metrics.
pub async fn metrics_endpoint(State(state): State<AppState>) -> String {
    metrics::update_store_metrics(&state.db);
    state.prometheus_handle.render()
}

// ── Libraries ──────────────────────────────────────────────────────────

/// `POST /libraries` — creates an empty library. Returns 201 with the
/// library record.
pub async fn create_library(
    State(state): State<AppState>,
    Json(req): Json<CreateLibraryRequest>,
) -> Result<(StatusCode, Json<Library>), ApiError> {
    validate_name(&req.name)?;
    validate_description(&req.description)?;
    validate_metadata(&req.metadata)?;

    let mut index_config = state.default_index_config.clone();
    if let Some(kind) = req.index_kind {
        index_config.kind = kind;
    }
    let record = state
        .db
        .create_library(req.name, req.description, req.metadata, index_config, req.strict);

    metrics::record_write("library", "create");
    tracing::info!(library = %record.id, name = %record.name, "library created");
    Ok((StatusCode::CREATED, Json(record)))
}

/// `GET /libraries` — all library records in creation order.
pub async fn list_libraries(State(state): State<AppState>) -> Json<Vec<Library>> {
    Json(state.db.list_libraries())
}

/// `GET /libraries/:id` — one library record.
pub async fn get_library(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Library>, ApiError> {
    Ok(Json(state.db.get_library(id)?.record()))
}

/// `PUT /libraries/:id` — updates name, description, and/or metadata.
pub async fn update_library(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateLibraryRequest>,
) -> Result<Json<Library>, ApiError> {
    if let Some(ref name) = req.name {
        validate_name(name)?;
    }
    if let Some(ref description) = req.description {
        validate_description(description)?;
    }
    if let Some(ref metadata) = req.metadata {
        validate_metadata(metadata)?;
    }
    let lib = state.db.get_library(id)?;
    let record = lib.update_record(req.name, req.description, req.metadata);
    metrics::record_write("library", "update");
    Ok(Json(record))
}

/// `DELETE /libraries/:id` — cascading delete of the library, its
/// documents, chunks, and index. Returns 204.
pub async fn delete_library(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    state.db.delete_library(id)?;
    metrics::record_write("library", "delete");
    tracing::info!(library = %id, "library deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// `POST /libraries/:id/index?kind={linear|kdtree|lsh}` — explicit index
/// build. The kind defaults to the library's current configuration; the
/// optional body overrides tuning parameters. 409 when the library holds
/// no chunks.
pub async fn build_index(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<BuildIndexQuery>,
    body: Option<Json<BuildIndexRequest>>,
) -> Result<Json<BuildIndexResponse>, ApiError> {
    let lib = state.db.get_library(id)?;

    let mut index_config = lib.data.read().index_config.clone();
    if let Some(ref kind) = query.kind {
        index_config.kind = kind.parse().map_err(ApiError::from)?;
    }
    let Json(overrides) = body.unwrap_or_default();
    if let Some(leaf_size) = overrides.leaf_size {
        index_config.leaf_size = leaf_size;
    }
    if let Some(bands) = overrides.lsh_bands {
        index_config.lsh_bands = bands;
    }
    if let Some(hashes) = overrides.lsh_hashes {
        index_config.lsh_hashes = hashes;
    }
    if let Some(probes) = overrides.lsh_probes {
        index_config.lsh_probes = probes;
    }
    if let Some(seed) = overrides.lsh_seed {
        index_config.lsh_seed = seed;
    }

    let stats = lib.build_index(index_config)?;
    metrics::record_write("index", "build");
    tracing::info!(library = %id, kind = %stats.kind, size = stats.size, "index built");
    Ok(Json(BuildIndexResponse {
        message: format!("{} index built over {} chunks", stats.kind, stats.size),
        stats,
    }))
}

/// `GET /libraries/:id/stats` — entity counts plus index stats.
pub async fn library_stats(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<LibraryStats>, ApiError> {
    Ok(Json(state.db.get_library(id)?.stats()))
}

/// `GET /libraries/:id/analytics` — chunk statistics and index info.
pub async fn library_analytics(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<AnalyticsResponse>, ApiError> {
    let lib = state.db.get_library(id)?;
    let data = lib.data.read();
    let total_chunks = data.chunks.len();
    let total_text: usize = data.chunks.values().map(|c| c.text.len()).sum();
    let average_chunk_length = if total_chunks > 0 {
        total_text as f64 / total_chunks as f64
    } else {
        0.0
    };
    Ok(Json(AnalyticsResponse {
        library_id: id,
        total_documents: data.documents.len(),
        total_chunks,
        average_chunk_length,
        embedding_dimension: data.record.dimension,
        index: data.index.as_ref().map(|ix| ix.stats()),
    }))
}

// ── Documents ──────────────────────────────────────────────────────────

/// `POST /libraries/:lid/documents` — creates a document. Returns 201.
pub async fn create_document(
    State(state): State<AppState>,
    Path(lid): Path<Uuid>,
    Json(req): Json<CreateDocumentRequest>,
) -> Result<(StatusCode, Json<Document>), ApiError> {
    validate_name(&req.name)?;
    validate_metadata(&req.metadata)?;
    let lib = state.db.get_library(lid)?;
    let doc = lib.create_document(req.name, req.metadata);
    metrics::record_write("document", "create");
    Ok((StatusCode::CREATED, Json((*doc).clone())))
}

/// `GET /libraries/:lid/documents` — documents in creation order.
pub async fn list_documents(
    State(state): State<AppState>,
    Path(lid): Path<Uuid>,
) -> Result<Json<Vec<Document>>, ApiError> {
    let lib = state.db.get_library(lid)?;
    Ok(Json(
        lib.list_documents().iter().map(|d| (**d).clone()).collect(),
    ))
}

/// `GET /libraries/:lid/documents/:did` — one document.
pub async fn get_document(
    State(state): State<AppState>,
    Path((lid, did)): Path<(Uuid, Uuid)>,
) -> Result<Json<Document>, ApiError> {
    let lib = state.db.get_library(lid)?;
    let doc = lib
        .get_document(did)
        .ok_or_else(|| ApiError::NotFound(format!("document {did}")))?;
    Ok(Json((*doc).clone()))
}

/// `PUT /libraries/:lid/documents/:did` — updates name and/or metadata.
pub async fn update_document(
    State(state): State<AppState>,
    Path((lid, did)): Path<(Uuid, Uuid)>,
    Json(req): Json<UpdateDocumentRequest>,
) -> Result<Json<Document>, ApiError> {
    if let Some(ref name) = req.name {
        validate_name(name)?;
    }
    if let Some(ref metadata) = req.metadata {
        validate_metadata(metadata)?;
    }
    let lib = state.db.get_library(lid)?;
    let doc = lib.update_document(did, req.name, req.metadata)?;
    metrics::record_write("document", "update");
    Ok(Json((*doc).clone()))
}

/// `DELETE /libraries/:lid/documents/:did` — deletes the document and all
/// its chunks. Returns 204.
pub async fn delete_document(
    State(state): State<AppState>,
    Path((lid, did)): Path<(Uuid, Uuid)>,
) -> Result<StatusCode, ApiError> {
    let lib = state.db.get_library(lid)?;
    lib.delete_document(did)?;
    metrics::record_write("document", "delete");
    Ok(StatusCode::NO_CONTENT)
}

// ── Chunks ─────────────────────────────────────────────────────────────

/// `POST /libraries/:lid/documents/:did/chunks` — appends a batch of
/// chunks atomically. Returns 201 with the created chunks.
pub async fn append_chunks(
    State(state): State<AppState>,
    Path((lid, did)): Path<(Uuid, Uuid)>,
    Json(req): Json<Vec<CreateChunkRequest>>,
) -> Result<(StatusCode, Json<Vec<Chunk>>), ApiError> {
    for chunk in &req {
        validate_metadata(&chunk.metadata)?;
    }
    let drafts: Vec<ChunkDraft> = req
        .into_iter()
        .map(|c| ChunkDraft {
            text: c.text,
            embedding: c.embedding,
            metadata: c.metadata,
        })
        .collect();

    let lib = state.db.get_library(lid)?;
    let chunks = lib.append_chunks(did, drafts)?;
    metrics::record_write("chunk", "append");
    tracing::debug!(library = %lid, document = %did, count = chunks.len(), "chunks appended");
    Ok((
        StatusCode::CREATED,
        Json(chunks.iter().map(|c| (**c).clone()).collect()),
    ))
}

/// `GET /libraries/:lid/documents/:did/chunks` — chunks in insertion order.
pub async fn list_chunks(
    State(state): State<AppState>,
    Path((lid, did)): Path<(Uuid, Uuid)>,
) -> Result<Json<Vec<Chunk>>, ApiError> {
    let lib = state.db.get_library(lid)?;
    let chunks = lib.list_chunks(did)?;
    Ok(Json(chunks.iter().map(|c| (**c).clone()).collect()))
}

/// `GET /libraries/:lid/documents/:did/chunks/:cid` — one chunk.
pub async fn get_chunk(
    State(state): State<AppState>,
    Path((lid, did, cid)): Path<(Uuid, Uuid, Uuid)>,
) -> Result<Json<Chunk>, ApiError> {
    let lib = state.db.get_library(lid)?;
    let chunk = lib
        .get_chunk(cid)
        .filter(|c| c.document_id == did)
        .ok_or_else(|| ApiError::NotFound(format!("chunk {cid}")))?;
    Ok(Json((*chunk).clone()))
}

/// `PUT /libraries/:lid/documents/:did/chunks/:cid` — updates text and/or
/// metadata. Embeddings are immutable: delete and re-append instead.
pub async fn update_chunk(
    State(state): State<AppState>,
    Path((lid, did, cid)): Path<(Uuid, Uuid, Uuid)>,
    Json(req): Json<UpdateChunkRequest>,
) -> Result<Json<Chunk>, ApiError> {
    if req.embedding.is_some() {
        return Err(ApiError::BadRequest(
            "chunk embeddings are immutable; delete and re-append the chunk".into(),
        ));
    }
    if let Some(ref metadata) = req.metadata {
        validate_metadata(metadata)?;
    }
    let lib = state.db.get_library(lid)?;
    if lib.get_chunk(cid).filter(|c| c.document_id == did).is_none() {
        return Err(ApiError::NotFound(format!("chunk {cid}")));
    }
    let chunk = lib.update_chunk(cid, req.text, req.metadata)?;
    metrics::record_write("chunk", "update");
    Ok(Json((*chunk).clone()))
}

/// `DELETE /libraries/:lid/documents/:did/chunks/:cid` — returns 204.
pub async fn delete_chunk(
    State(state): State<AppState>,
    Path((lid, did, cid)): Path<(Uuid, Uuid, Uuid)>,
) -> Result<StatusCode, ApiError> {
    let lib = state.db.get_library(lid)?;
    if lib.get_chunk(cid).filter(|c| c.document_id == did).is_none() {
        return Err(ApiError::NotFound(format!("chunk {cid}")));
    }
    lib.delete_chunk(cid)?;
    metrics::record_write("chunk", "delete");
    Ok(StatusCode::NO_CONTENT)
}

// ── Search ─────────────────────────────────────────────────────────────

/// `POST /search/libraries/:lid` — k-NN search within one library, with
/// optional metadata filters.
pub async fn search_library(
    State(state): State<AppState>,
    Path(lid): Path<Uuid>,
    Json(req): Json<SearchRequest>,
) -> Result<Json<SearchResponse>, ApiError> {
    let lib = state.db.get_library(lid)?;
    let hits = lib.search(&req.query_embedding, req.k, req.filters.as_ref())?;
    let record = lib.record();
    if let Some(kind) = record.index_kind {
        metrics::record_search(&kind.to_string());
    }
    Ok(Json(SearchResponse {
        count: hits.len(),
        results: hits.into_iter().map(SearchHitResponse::from).collect(),
        index_kind: record.index_kind,
    }))
}

/// `POST /search/libraries` — k-NN search across several libraries. Each
/// library is searched under its own read lease (no global consistent
/// cut); a library that fails to search contributes an empty result set.
pub async fn search_libraries(
    State(state): State<AppState>,
    Json(req): Json<MultiSearchRequest>,
) -> Result<Json<MultiSearchResponse>, ApiError> {
    if req.library_ids.is_empty() {
        return Err(ApiError::BadRequest("library_ids is empty".into()));
    }

    let mut results = HashMap::with_capacity(req.library_ids.len());
    for lid in req.library_ids {
        let outcome = state.db.get_library(lid).and_then(|lib| {
            let hits = lib.search(&req.query_embedding, req.k, req.filters.as_ref())?;
            Ok((hits, lib.record().index_kind))
        });
        let response = match outcome {
            Ok((hits, index_kind)) => SearchResponse {
                count: hits.len(),
                results: hits.into_iter().map(SearchHitResponse::from).collect(),
                index_kind,
            },
            Err(e) => {
                tracing::warn!(library = %lid, "multi-library search skipped: {e}");
                SearchResponse {
                    count: 0,
                    results: Vec::new(),
                    index_kind: None,
                }
            }
        };
        results.insert(lid, response);
    }
    Ok(Json(MultiSearchResponse { results }))
}
