//! Durable snapshots of the entity store.
//!
//! The whole store serializes to a single self-describing JSON document:
//! format version, then libraries, documents, and chunks in dependency
//! order. Per-library index configuration is included; materialized indexes
//! are not — they rebuild lazily after load. Floating-point values
//! round-trip exactly (serde_json emits shortest round-trippable forms).
//!
//! Writes go to a temp file and rename into place, so a crash never leaves
//! a partially-written snapshot. Loads are all-or-nothing: any decode or
//! referential-integrity failure rejects the whole file.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use uuid::Uuid;

use crate::entity::{Chunk, Document, Library};
use crate::error::{CoreError, Result};
use crate::index::IndexConfig;
use crate::storage::catalog::Database;
use crate::storage::library::{IndexState, LibraryData, LibraryHandle};

/// Current snapshot format version. Bumped on incompatible layout changes;
/// an unknown version fails decode.
pub const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct LibraryEntry {
    #[serde(flatten)]
    record: Library,
    index_config: IndexConfig,
}

#[derive(Debug, Serialize, Deserialize)]
struct SnapshotFile {
    version: u32,
    libraries: Vec<LibraryEntry>,
    documents: Vec<Arc<Document>>,
    chunks: Vec<Arc<Chunk>>,
}

/// Serializes the whole store to `path` with an atomic temp-then-rename
/// write. Each library is read under its own lock; the snapshot is not a
/// globally consistent cut across libraries.
pub fn save_snapshot(db: &Database, path: &Path) -> Result<()> {
    let handles: Vec<LibraryHandle> = db.libraries.read().values().cloned().collect();

    let mut libraries = Vec::with_capacity(handles.len());
    let mut documents = Vec::new();
    let mut chunks = Vec::new();
    for handle in &handles {
        let data = handle.data.read();
        libraries.push(LibraryEntry {
            record: data.record.clone(),
            index_config: data.index_config.clone(),
        });
        for doc_id in &data.doc_order {
            if let Some(doc) = data.documents.get(doc_id) {
                documents.push(Arc::clone(doc));
            }
            for chunk_id in data.by_document.get(doc_id).into_iter().flatten() {
                if let Some(chunk) = data.chunks.get(chunk_id) {
                    chunks.push(Arc::clone(chunk));
                }
            }
        }
    }
    libraries.sort_by_key(|e| e.record.created_at);

    let snapshot = SnapshotFile {
        version: SNAPSHOT_VERSION,
        libraries,
        documents,
        chunks,
    };
    let bytes = serde_json::to_vec(&snapshot)
        .map_err(|e| CoreError::Internal(format!("snapshot encode failed: {e}")))?;

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let tmp_path = path.with_extension("tmp");
    fs::write(&tmp_path, &bytes)?;
    fs::rename(&tmp_path, path)?;

    tracing::info!(
        path = %path.display(),
        libraries = snapshot.libraries.len(),
        chunks = snapshot.chunks.len(),
        bytes = bytes.len(),
        "snapshot saved"
    );
    Ok(())
}

/// Loads a snapshot into a fresh [`Database`]. In-memory state is only
/// produced on full success; a truncated, malformed, unknown-version, or
/// referentially-broken file returns an error and nothing else.
pub fn load_snapshot(path: &Path) -> Result<Database> {
    let raw = fs::read(path)?;
    let snapshot: SnapshotFile = serde_json::from_slice(&raw)
        .map_err(|e| CoreError::Corrupt(format!("snapshot decode failed: {e}")))?;
    if snapshot.version != SNAPSHOT_VERSION {
        return Err(CoreError::Corrupt(format!(
            "unknown snapshot version {} (this build reads {SNAPSHOT_VERSION})",
            snapshot.version
        )));
    }

    let mut per_library: HashMap<Uuid, LibraryData> = snapshot
        .libraries
        .into_iter()
        .map(|entry| {
            // A library that had an index resumes as Stale so the next
            // search rebuilds it; one that never did stays Empty.
            let had_index = entry.record.index_kind.is_some();
            let mut data = LibraryData::new(entry.record, entry.index_config);
            data.index_state = if had_index {
                IndexState::Stale
            } else {
                IndexState::Empty
            };
            (data.record.id, data)
        })
        .collect();

    for doc in snapshot.documents {
        let data = per_library.get_mut(&doc.library_id).ok_or_else(|| {
            CoreError::Corrupt(format!(
                "document {} references unknown library {}",
                doc.id, doc.library_id
            ))
        })?;
        data.doc_order.push(doc.id);
        data.by_document.insert(doc.id, Vec::new());
        data.documents.insert(doc.id, doc);
    }

    for chunk in snapshot.chunks {
        let data = per_library.get_mut(&chunk.library_id).ok_or_else(|| {
            CoreError::Corrupt(format!(
                "chunk {} references unknown library {}",
                chunk.id, chunk.library_id
            ))
        })?;
        let siblings = data.by_document.get_mut(&chunk.document_id).ok_or_else(|| {
            CoreError::Corrupt(format!(
                "chunk {} references unknown document {}",
                chunk.id, chunk.document_id
            ))
        })?;
        siblings.push(chunk.id);
        data.chunks.insert(chunk.id, chunk);
    }

    let db = Database::new();
    let mut loaded_libraries = 0usize;
    let mut loaded_chunks = 0usize;
    for (id, data) in per_library {
        data.validate()
            .map_err(|e| CoreError::Corrupt(format!("snapshot validation failed: {e}")))?;
        loaded_libraries += 1;
        loaded_chunks += data.chunks.len();
        db.insert_handle(
            id,
            LibraryHandle {
                data: Arc::new(parking_lot::RwLock::new(data)),
            },
        );
    }

    tracing::info!(
        path = %path.display(),
        libraries = loaded_libraries,
        chunks = loaded_chunks,
        "snapshot loaded"
    );
    Ok(db)
}
