//! Per-library storage aggregate and its concurrency envelope.
//!
//! A [`LibraryHandle`] wraps one library's documents, chunks, index state,
//! and index object behind a single `RwLock`. Document/chunk mutations and
//! index builds take the lock in write mode; searches take it in read mode.
//! Cloning a handle produces a new reference to the same shared data.
//!
//! The index follows a small state machine: `Empty → Building → Ready →
//! Stale → Building → …`. Any chunk mutation moves Ready to Stale; a search
//! that observes a non-Ready state re-acquires the lock in write mode,
//! double-checks, rebuilds if still needed, then downgrades to read and
//! searches. Waiters queue on the lock itself, so exactly one build runs
//! per library at a time.

use chrono::Utc;
use parking_lot::{RwLock, RwLockWriteGuard};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::config;
use crate::entity::{Chunk, Document, Library, Metadata};
use crate::error::{CoreError, Result};
use crate::filter_types::Filter;
use crate::index::{IndexConfig, IndexPoint, IndexStats, VectorIndex};
use crate::search::filter::chunk_matches;
use crate::search::SearchHit;
use crate::vector::ensure_finite;

/// Index lifecycle state for one library.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexState {
    /// No index has ever been built.
    Empty,
    /// A build is executing under the write lock.
    Building,
    /// The index reflects the current chunk set.
    Ready,
    /// The index exists but predates at least one chunk mutation.
    Stale,
}

/// Input for a chunk insert: everything but the identifiers, which the
/// store assigns.
#[derive(Debug, Clone)]
pub struct ChunkDraft {
    pub text: String,
    pub embedding: Vec<f64>,
    pub metadata: Metadata,
}

/// Counts and index information for one library.
#[derive(Debug, Clone, Serialize)]
pub struct LibraryStats {
    pub id: Uuid,
    pub name: String,
    pub document_count: usize,
    pub chunk_count: usize,
    pub dimension: Option<usize>,
    pub index_state: IndexState,
    pub index: Option<IndexStats>,
}

/// Internal data for a library, protected by a `RwLock`.
///
/// Secondary tables (`doc_order`, `by_document`) are updated in the same
/// critical section as the primary maps. `by_document` keeps chunk ids in
/// insertion order; index builds walk that order so distance ties resolve
/// stably across rebuilds.
#[derive(Debug)]
pub struct LibraryData {
    pub record: Library,
    pub documents: HashMap<Uuid, Arc<Document>>,
    pub doc_order: Vec<Uuid>,
    pub chunks: HashMap<Uuid, Arc<Chunk>>,
    pub by_document: HashMap<Uuid, Vec<Uuid>>,
    pub index_config: IndexConfig,
    pub index_state: IndexState,
    pub index: Option<VectorIndex>,
}

impl LibraryData {
    pub fn new(record: Library, index_config: IndexConfig) -> Self {
        Self {
            record,
            documents: HashMap::new(),
            doc_order: Vec::new(),
            chunks: HashMap::new(),
            by_document: HashMap::new(),
            index_config,
            index_state: IndexState::Empty,
            index: None,
        }
    }

    /// All `(chunk id, embedding)` pairs in insertion order.
    fn collect_points(&self) -> Vec<IndexPoint> {
        let mut points = Vec::with_capacity(self.chunks.len());
        for doc_id in &self.doc_order {
            let Some(chunk_ids) = self.by_document.get(doc_id) else {
                continue;
            };
            for chunk_id in chunk_ids {
                if let Some(chunk) = self.chunks.get(chunk_id) {
                    points.push(IndexPoint {
                        id: chunk.id,
                        vector: chunk.embedding.clone(),
                    });
                }
            }
        }
        points
    }

    fn mark_stale(&mut self) {
        if self.index_state == IndexState::Ready {
            self.index_state = IndexState::Stale;
        }
    }

    fn touch(&mut self) {
        self.record.updated_at = Utc::now();
    }

    /// Rebuilds the index from the current chunk set and moves to Ready.
    /// Callers must hold the write lock.
    fn rebuild_index(&mut self) {
        self.index_state = IndexState::Building;
        let points = self.collect_points();
        let mut index = VectorIndex::from_config(&self.index_config);
        index.build(points);
        self.record.index_kind = Some(index.kind());
        self.record.index_built_at = index.stats().built_at;
        self.index = Some(index);
        self.index_state = IndexState::Ready;
    }

    /// Validate referential invariants after deserialization.
    ///
    /// Every document must belong to this library; every chunk must resolve
    /// its document and carry this library's id and dimension; the secondary
    /// tables must mirror the primary maps exactly.
    pub fn validate(&self) -> std::result::Result<(), String> {
        let lib_id = self.record.id;

        if self.doc_order.len() != self.documents.len() {
            return Err(format!(
                "doc_order has {} entries but documents has {}",
                self.doc_order.len(),
                self.documents.len()
            ));
        }
        for doc_id in &self.doc_order {
            let doc = self
                .documents
                .get(doc_id)
                .ok_or_else(|| format!("doc_order references unknown document {doc_id}"))?;
            if doc.library_id != lib_id {
                return Err(format!(
                    "document {doc_id} has library_id {} in library {lib_id}",
                    doc.library_id
                ));
            }
        }

        let indexed_chunks: usize = self.by_document.values().map(Vec::len).sum();
        if indexed_chunks != self.chunks.len() {
            return Err(format!(
                "by_document references {indexed_chunks} chunks but chunks has {}",
                self.chunks.len()
            ));
        }
        for (doc_id, chunk_ids) in &self.by_document {
            if !self.documents.contains_key(doc_id) {
                return Err(format!("by_document references unknown document {doc_id}"));
            }
            for chunk_id in chunk_ids {
                let chunk = self
                    .chunks
                    .get(chunk_id)
                    .ok_or_else(|| format!("by_document references unknown chunk {chunk_id}"))?;
                if chunk.document_id != *doc_id {
                    return Err(format!(
                        "chunk {chunk_id} has document_id {} but is listed under {doc_id}",
                        chunk.document_id
                    ));
                }
                if chunk.library_id != lib_id {
                    return Err(format!(
                        "chunk {chunk_id} has library_id {} in library {lib_id}",
                        chunk.library_id
                    ));
                }
                if let Some(dim) = self.record.dimension {
                    if chunk.embedding.len() != dim {
                        return Err(format!(
                            "chunk {chunk_id} has dimension {} but library has {dim}",
                            chunk.embedding.len()
                        ));
                    }
                }
            }
        }

        Ok(())
    }
}

/// A thread-safe handle to one library's data.
#[derive(Debug, Clone)]
pub struct LibraryHandle {
    pub data: Arc<RwLock<LibraryData>>,
}

impl LibraryHandle {
    pub fn new(record: Library, index_config: IndexConfig) -> Self {
        Self {
            data: Arc::new(RwLock::new(LibraryData::new(record, index_config))),
        }
    }

    /// A point-in-time copy of the library record.
    pub fn record(&self) -> Library {
        self.data.read().record.clone()
    }

    pub fn document_count(&self) -> usize {
        self.data.read().documents.len()
    }

    pub fn chunk_count(&self) -> usize {
        self.data.read().chunks.len()
    }

    /// Updates name/description/metadata on the library record.
    pub fn update_record(
        &self,
        name: Option<String>,
        description: Option<String>,
        metadata: Option<Metadata>,
    ) -> Library {
        let mut data = self.data.write();
        if let Some(name) = name {
            data.record.name = name;
        }
        if let Some(description) = description {
            data.record.description = description;
        }
        if let Some(metadata) = metadata {
            data.record.metadata = metadata;
        }
        data.touch();
        data.record.clone()
    }

    // ── Documents ──────────────────────────────────────────────────────

    pub fn create_document(&self, name: String, metadata: Metadata) -> Arc<Document> {
        let mut data = self.data.write();
        let doc = Arc::new(Document::new(data.record.id, name, metadata));
        data.doc_order.push(doc.id);
        data.by_document.insert(doc.id, Vec::new());
        data.documents.insert(doc.id, Arc::clone(&doc));
        data.touch();
        doc
    }

    pub fn get_document(&self, id: Uuid) -> Option<Arc<Document>> {
        self.data.read().documents.get(&id).cloned()
    }

    /// Documents in creation order.
    pub fn list_documents(&self) -> Vec<Arc<Document>> {
        let data = self.data.read();
        data.doc_order
            .iter()
            .filter_map(|id| data.documents.get(id).cloned())
            .collect()
    }

    pub fn update_document(
        &self,
        id: Uuid,
        name: Option<String>,
        metadata: Option<Metadata>,
    ) -> Result<Arc<Document>> {
        let mut data = self.data.write();
        let doc = data
            .documents
            .get_mut(&id)
            .ok_or_else(|| CoreError::NotFound(format!("document {id}")))?;
        let updated = Arc::make_mut(doc);
        if let Some(name) = name {
            updated.name = name;
        }
        if let Some(metadata) = metadata {
            updated.metadata = metadata;
        }
        updated.updated_at = Utc::now();
        let doc = Arc::clone(doc);
        data.touch();
        Ok(doc)
    }

    /// Deletes a document and all its chunks.
    pub fn delete_document(&self, id: Uuid) -> Result<()> {
        let mut data = self.data.write();
        if data.documents.remove(&id).is_none() {
            return Err(CoreError::NotFound(format!("document {id}")));
        }
        data.doc_order.retain(|d| *d != id);
        let chunk_ids = data.by_document.remove(&id).unwrap_or_default();
        let had_chunks = !chunk_ids.is_empty();
        for chunk_id in chunk_ids {
            data.chunks.remove(&chunk_id);
        }
        if had_chunks {
            data.mark_stale();
        }
        data.touch();
        Ok(())
    }

    // ── Chunks ─────────────────────────────────────────────────────────

    /// Appends a batch of chunks to a document atomically: either every
    /// draft is validated and inserted, or none is. The first chunk ever
    /// inserted fixes the library's dimension.
    pub fn append_chunks(&self, document_id: Uuid, drafts: Vec<ChunkDraft>) -> Result<Vec<Arc<Chunk>>> {
        if drafts.is_empty() {
            return Err(CoreError::Invalid("chunk batch is empty".into()));
        }
        if drafts.len() > config::MAX_BATCH_SIZE {
            return Err(CoreError::Invalid(format!(
                "chunk batch exceeds maximum of {} entries",
                config::MAX_BATCH_SIZE
            )));
        }

        let mut data = self.data.write();
        if !data.documents.contains_key(&document_id) {
            return Err(CoreError::NotFound(format!("document {document_id}")));
        }

        let expected_dim = data.record.dimension.unwrap_or(drafts[0].embedding.len());
        if expected_dim == 0 || expected_dim > config::MAX_DIMENSION {
            return Err(CoreError::Invalid(format!(
                "embedding dimension must be 1-{}",
                config::MAX_DIMENSION
            )));
        }
        for draft in &drafts {
            if draft.text.is_empty() {
                return Err(CoreError::Invalid("chunk text is empty".into()));
            }
            if draft.text.len() > config::MAX_TEXT_LEN {
                return Err(CoreError::Invalid(format!(
                    "chunk text exceeds maximum of {} bytes",
                    config::MAX_TEXT_LEN
                )));
            }
            ensure_finite(&draft.embedding)?;
            if draft.embedding.len() != expected_dim {
                return Err(CoreError::Conflict(format!(
                    "embedding dimension {} does not match library dimension {expected_dim}",
                    draft.embedding.len()
                )));
            }
        }

        let lib_id = data.record.id;
        let chunks: Vec<Arc<Chunk>> = drafts
            .into_iter()
            .map(|d| Arc::new(Chunk::new(lib_id, document_id, d.text, d.embedding, d.metadata)))
            .collect();
        for chunk in &chunks {
            data.chunks.insert(chunk.id, Arc::clone(chunk));
            data.by_document
                .entry(document_id)
                .or_default()
                .push(chunk.id);
        }
        data.record.dimension = Some(expected_dim);
        data.mark_stale();
        data.touch();
        Ok(chunks)
    }

    pub fn get_chunk(&self, id: Uuid) -> Option<Arc<Chunk>> {
        self.data.read().chunks.get(&id).cloned()
    }

    /// Chunks of one document in insertion order.
    pub fn list_chunks(&self, document_id: Uuid) -> Result<Vec<Arc<Chunk>>> {
        let data = self.data.read();
        let chunk_ids = data
            .by_document
            .get(&document_id)
            .ok_or_else(|| CoreError::NotFound(format!("document {document_id}")))?;
        Ok(chunk_ids
            .iter()
            .filter_map(|id| data.chunks.get(id).cloned())
            .collect())
    }

    /// Updates a chunk's text and/or metadata. The embedding is immutable;
    /// replacing it means deleting and re-inserting the chunk.
    pub fn update_chunk(
        &self,
        id: Uuid,
        text: Option<String>,
        metadata: Option<Metadata>,
    ) -> Result<Arc<Chunk>> {
        let mut data = self.data.write();
        let chunk = data
            .chunks
            .get_mut(&id)
            .ok_or_else(|| CoreError::NotFound(format!("chunk {id}")))?;
        let updated = Arc::make_mut(chunk);
        if let Some(text) = text {
            if text.is_empty() {
                return Err(CoreError::Invalid("chunk text is empty".into()));
            }
            updated.text = text;
        }
        if let Some(metadata) = metadata {
            updated.metadata = metadata;
        }
        let chunk = Arc::clone(chunk);
        data.touch();
        Ok(chunk)
    }

    pub fn delete_chunk(&self, id: Uuid) -> Result<()> {
        let mut data = self.data.write();
        let chunk = data
            .chunks
            .remove(&id)
            .ok_or_else(|| CoreError::NotFound(format!("chunk {id}")))?;
        if let Some(chunk_ids) = data.by_document.get_mut(&chunk.document_id) {
            chunk_ids.retain(|c| *c != id);
        }
        data.mark_stale();
        data.touch();
        Ok(())
    }

    // ── Index ──────────────────────────────────────────────────────────

    /// Explicitly (re)builds the index with the given configuration, which
    /// becomes the library's configuration for subsequent lazy rebuilds.
    pub fn build_index(&self, index_config: IndexConfig) -> Result<IndexStats> {
        validate_index_config(&index_config)?;
        let mut data = self.data.write();
        if data.chunks.is_empty() {
            return Err(CoreError::Conflict(
                "cannot build an index over an empty library".into(),
            ));
        }
        data.index_config = index_config;
        data.rebuild_index();
        let stats = data
            .index
            .as_ref()
            .map(VectorIndex::stats)
            .ok_or_else(|| CoreError::Internal("index missing after build".into()))?;
        Ok(stats)
    }

    /// k-NN search with optional metadata filtering.
    ///
    /// Reflects every write that completed before this call acquired its
    /// read lease. On a Stale or Empty index the call upgrades to the write
    /// lock, double-checks the state (another searcher may have built it
    /// while this one waited), rebuilds if still needed, then downgrades
    /// and searches.
    pub fn search(&self, query: &[f64], k: usize, filter: Option<&Filter>) -> Result<Vec<SearchHit>> {
        if k == 0 || k > config::MAX_K {
            return Err(CoreError::Invalid(format!("k must be 1-{}", config::MAX_K)));
        }
        ensure_finite(query)?;
        if let Some(filter) = filter {
            filter.validate()?;
        }

        {
            let data = self.data.read();
            if data.index_state == IndexState::Ready {
                return run_search(&data, query, k, filter);
            }
        }

        let mut data = self.data.write();
        if data.index_state != IndexState::Ready {
            if data.chunks.is_empty() {
                return Ok(Vec::new());
            }
            data.rebuild_index();
        }
        let data = RwLockWriteGuard::downgrade(data);
        run_search(&data, query, k, filter)
    }

    pub fn stats(&self) -> LibraryStats {
        let data = self.data.read();
        LibraryStats {
            id: data.record.id,
            name: data.record.name.clone(),
            document_count: data.documents.len(),
            chunk_count: data.chunks.len(),
            dimension: data.record.dimension,
            index_state: data.index_state,
            index: data.index.as_ref().map(VectorIndex::stats),
        }
    }
}

fn validate_index_config(config: &IndexConfig) -> Result<()> {
    if config.leaf_size == 0 {
        return Err(CoreError::Invalid("leaf_size must be >= 1".into()));
    }
    if config.lsh_bands == 0 {
        return Err(CoreError::Invalid("lsh_bands must be >= 1".into()));
    }
    if config.lsh_hashes == 0 || config.lsh_hashes > crate::config::MAX_LSH_HASHES {
        return Err(CoreError::Invalid(format!(
            "lsh_hashes must be 1-{}",
            crate::config::MAX_LSH_HASHES
        )));
    }
    Ok(())
}

/// Executes a search against a Ready index and materializes hits from the
/// chunk table. Callers hold at least the read lock, so every id the index
/// returns resolves.
fn run_search(
    data: &LibraryData,
    query: &[f64],
    k: usize,
    filter: Option<&Filter>,
) -> Result<Vec<SearchHit>> {
    if data.chunks.is_empty() {
        return Ok(Vec::new());
    }
    if let Some(dim) = data.record.dimension {
        if query.len() != dim {
            return Err(CoreError::Invalid(format!(
                "query dimension {} does not match library dimension {dim}",
                query.len()
            )));
        }
    }
    let index = data
        .index
        .as_ref()
        .ok_or_else(|| CoreError::Internal("index missing in ready state".into()))?;

    let empty = Metadata::new();
    let accepts = |id: Uuid| -> bool {
        let Some(filter) = filter else { return true };
        let Some(chunk) = data.chunks.get(&id) else {
            return false;
        };
        let doc_meta = data
            .documents
            .get(&chunk.document_id)
            .map(|d| &d.metadata)
            .unwrap_or(&empty);
        chunk_matches(&chunk.metadata, doc_meta, filter)
    };

    let ids = index.search(
        query,
        k,
        data.record.strict,
        filter.map(|_| &accepts as &(dyn Fn(Uuid) -> bool)),
    )?;

    ids.into_iter()
        .map(|(id, distance)| {
            data.chunks
                .get(&id)
                .map(|chunk| SearchHit {
                    chunk: Arc::clone(chunk),
                    distance,
                })
                .ok_or_else(|| CoreError::Internal(format!("index returned unknown chunk {id}")))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::MetadataValue;
    use crate::index::IndexKind;

    fn library() -> LibraryHandle {
        let record = Library::new("test".into(), "test library".into(), Metadata::new());
        LibraryHandle::new(record, IndexConfig::default())
    }

    fn draft(text: &str, embedding: Vec<f64>) -> ChunkDraft {
        ChunkDraft {
            text: text.into(),
            embedding,
            metadata: Metadata::new(),
        }
    }

    fn draft_with_meta(text: &str, embedding: Vec<f64>, key: &str, value: MetadataValue) -> ChunkDraft {
        ChunkDraft {
            text: text.into(),
            embedding,
            metadata: [(key.to_string(), value)].into_iter().collect(),
        }
    }

    fn basis_library() -> (LibraryHandle, Uuid, Vec<Uuid>) {
        let lib = library();
        let doc = lib.create_document("d1".into(), Metadata::new());
        let chunks = lib
            .append_chunks(
                doc.id,
                vec![
                    draft("a", vec![1.0, 0.0, 0.0]),
                    draft("b", vec![0.0, 1.0, 0.0]),
                    draft("c", vec![0.0, 0.0, 1.0]),
                ],
            )
            .unwrap();
        let ids = chunks.iter().map(|c| c.id).collect();
        (lib, doc.id, ids)
    }

    #[test]
    fn first_chunk_fixes_dimension() {
        let (lib, doc_id, _) = basis_library();
        assert_eq!(lib.record().dimension, Some(3));

        let err = lib
            .append_chunks(doc_id, vec![draft("wrong", vec![1.0, 0.0])])
            .unwrap_err();
        assert!(matches!(err, CoreError::Conflict(_)));
        assert_eq!(lib.chunk_count(), 3);
    }

    #[test]
    fn batch_insert_is_all_or_nothing() {
        let (lib, doc_id, _) = basis_library();
        let err = lib
            .append_chunks(
                doc_id,
                vec![draft("good", vec![1.0, 1.0, 1.0]), draft("bad", vec![1.0])],
            )
            .unwrap_err();
        assert!(matches!(err, CoreError::Conflict(_)));
        assert_eq!(lib.chunk_count(), 3);
    }

    #[test]
    fn non_finite_embedding_is_invalid() {
        let (lib, doc_id, _) = basis_library();
        let err = lib
            .append_chunks(doc_id, vec![draft("nan", vec![f64::NAN, 0.0, 0.0])])
            .unwrap_err();
        assert!(matches!(err, CoreError::Invalid(_)));
    }

    #[test]
    fn delete_document_cascades_to_chunks() {
        let (lib, doc_id, _) = basis_library();
        lib.delete_document(doc_id).unwrap();
        assert_eq!(lib.document_count(), 0);
        assert_eq!(lib.chunk_count(), 0);
        let data = lib.data.read();
        assert!(data.by_document.is_empty());
        assert!(data.validate().is_ok());
    }

    #[test]
    fn referential_invariants_hold() {
        let (lib, _, _) = basis_library();
        let doc2 = lib.create_document("d2".into(), Metadata::new());
        lib.append_chunks(doc2.id, vec![draft("x", vec![0.5, 0.5, 0.0])])
            .unwrap();
        let data = lib.data.read();
        assert!(data.validate().is_ok());
        for chunk in data.chunks.values() {
            let doc = data.documents.get(&chunk.document_id).unwrap();
            assert_eq!(doc.library_id, chunk.library_id);
        }
    }

    #[test]
    fn linear_search_ranks_basis_vectors() {
        let (lib, _, ids) = basis_library();
        lib.build_index(IndexConfig::default()).unwrap();

        let hits = lib.search(&[0.9, 0.1, 0.0], 2, None).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].chunk.id, ids[0]);
        assert_eq!(hits[1].chunk.id, ids[1]);
        assert!(hits[0].distance < hits[1].distance);
    }

    #[test]
    fn kdtree_search_matches_linear() {
        let (lib, _, ids) = basis_library();
        lib.build_index(IndexConfig {
            kind: IndexKind::KdTree,
            ..IndexConfig::default()
        })
        .unwrap();

        let hits = lib.search(&[0.9, 0.1, 0.0], 2, None).unwrap();
        assert_eq!(hits[0].chunk.id, ids[0]);
        assert_eq!(hits[1].chunk.id, ids[1]);
    }

    #[test]
    fn filtered_search_returns_only_matches() {
        let (lib, doc_id, _) = basis_library();
        let tagged = lib
            .append_chunks(
                doc_id,
                vec![draft_with_meta(
                    "intro copy",
                    vec![1.0, 0.0, 0.0],
                    "section",
                    MetadataValue::Str("intro".into()),
                )],
            )
            .unwrap();

        let filter: Filter = serde_json::from_str(
            r#"{"clauses": [{"field": "section", "op": "eq", "value": "intro"}]}"#,
        )
        .unwrap();
        let hits = lib.search(&[1.0, 0.0, 0.0], 3, Some(&filter)).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].chunk.id, tagged[0].id);
    }

    #[test]
    fn document_metadata_reaches_the_filter() {
        let lib = library();
        let doc = lib.create_document(
            "tagged".into(),
            [("team".to_string(), MetadataValue::Str("infra".into()))]
                .into_iter()
                .collect(),
        );
        lib.append_chunks(doc.id, vec![draft("x", vec![1.0, 0.0])])
            .unwrap();

        let filter: Filter = serde_json::from_str(
            r#"{"clauses": [{"field": "team", "op": "eq", "value": "infra"}]}"#,
        )
        .unwrap();
        let hits = lib.search(&[1.0, 0.0], 1, Some(&filter)).unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[test]
    fn build_on_empty_library_conflicts() {
        let lib = library();
        let err = lib.build_index(IndexConfig::default()).unwrap_err();
        assert!(matches!(err, CoreError::Conflict(_)));
    }

    #[test]
    fn search_on_empty_library_is_empty() {
        let lib = library();
        assert!(lib.search(&[1.0, 0.0], 5, None).unwrap().is_empty());
    }

    #[test]
    fn search_validates_inputs() {
        let (lib, _, _) = basis_library();
        assert!(matches!(
            lib.search(&[1.0, 0.0, 0.0], 0, None),
            Err(CoreError::Invalid(_))
        ));
        assert!(matches!(
            lib.search(&[f64::NAN, 0.0, 0.0], 1, None),
            Err(CoreError::Invalid(_))
        ));
        assert!(matches!(
            lib.search(&[1.0, 0.0], 1, None),
            Err(CoreError::Invalid(_))
        ));
    }

    #[test]
    fn writes_mark_ready_index_stale() {
        let (lib, doc_id, _) = basis_library();
        lib.build_index(IndexConfig::default()).unwrap();
        assert_eq!(lib.data.read().index_state, IndexState::Ready);

        lib.append_chunks(doc_id, vec![draft("new", vec![0.9, 0.05, 0.05])])
            .unwrap();
        assert_eq!(lib.data.read().index_state, IndexState::Stale);
    }

    #[test]
    fn stale_index_rebuilds_lazily_and_sees_new_chunk() {
        let (lib, doc_id, _) = basis_library();
        lib.build_index(IndexConfig::default()).unwrap();

        let inserted = lib
            .append_chunks(doc_id, vec![draft("close", vec![0.95, 0.05, 0.0])])
            .unwrap();
        let hits = lib.search(&[0.95, 0.05, 0.0], 1, None).unwrap();
        assert_eq!(hits[0].chunk.id, inserted[0].id);
        assert_eq!(lib.data.read().index_state, IndexState::Ready);
    }

    #[test]
    fn first_search_builds_from_empty_state() {
        let (lib, _, ids) = basis_library();
        assert_eq!(lib.data.read().index_state, IndexState::Empty);
        let hits = lib.search(&[1.0, 0.0, 0.0], 1, None).unwrap();
        assert_eq!(hits[0].chunk.id, ids[0]);
        assert_eq!(lib.record().index_kind, Some(IndexKind::Linear));
    }

    #[test]
    fn rebuild_is_idempotent_for_identical_chunks() {
        let (lib, _, _) = basis_library();
        let query = [0.4, 0.4, 0.2];
        lib.build_index(IndexConfig::default()).unwrap();
        let first: Vec<Uuid> = lib
            .search(&query, 3, None)
            .unwrap()
            .iter()
            .map(|h| h.chunk.id)
            .collect();
        lib.build_index(IndexConfig::default()).unwrap();
        let second: Vec<Uuid> = lib
            .search(&query, 3, None)
            .unwrap()
            .iter()
            .map(|h| h.chunk.id)
            .collect();
        assert_eq!(first, second);
    }

    #[test]
    fn chunk_update_touches_metadata_only() {
        let (lib, _, ids) = basis_library();
        let updated = lib
            .update_chunk(
                ids[0],
                Some("renamed".into()),
                Some(
                    [("lang".to_string(), MetadataValue::Str("en".into()))]
                        .into_iter()
                        .collect(),
                ),
            )
            .unwrap();
        assert_eq!(updated.text, "renamed");
        assert_eq!(updated.embedding, vec![1.0, 0.0, 0.0]);
    }

    #[test]
    fn invalid_index_config_is_rejected() {
        let (lib, _, _) = basis_library();
        let err = lib
            .build_index(IndexConfig {
                kind: IndexKind::Lsh,
                lsh_hashes: 0,
                ..IndexConfig::default()
            })
            .unwrap_err();
        assert!(matches!(err, CoreError::Invalid(_)));
    }
}
