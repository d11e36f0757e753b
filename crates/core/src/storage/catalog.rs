//! The library catalogue.
//!
//! A [`Database`] maps library ids to [`LibraryHandle`]s behind a single
//! RwLock. The catalogue lock protects membership only: it is taken in
//! write mode for library create/delete and in read mode just long enough
//! to clone a handle for per-library work. No cross-library ordering is
//! promised; multi-library searches snapshot each library independently.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::entity::{Library, Metadata};
use crate::error::{CoreError, Result};
use crate::index::IndexConfig;
use crate::storage::library::LibraryHandle;

/// Database holds all libraries.
#[derive(Debug, Clone, Default)]
pub struct Database {
    pub libraries: Arc<RwLock<HashMap<Uuid, LibraryHandle>>>,
}

impl Database {
    /// Creates a new empty database.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new empty library and returns its record.
    pub fn create_library(
        &self,
        name: String,
        description: String,
        metadata: Metadata,
        index_config: IndexConfig,
        strict: bool,
    ) -> Library {
        let mut record = Library::new(name, description, metadata);
        record.strict = strict;
        let snapshot = record.clone();
        let handle = LibraryHandle::new(record, index_config);
        self.libraries.write().insert(snapshot.id, handle);
        snapshot
    }

    /// Returns a cloned handle to the library, or `NotFound`.
    pub fn get_library(&self, id: Uuid) -> Result<LibraryHandle> {
        self.libraries
            .read()
            .get(&id)
            .cloned()
            .ok_or_else(|| CoreError::NotFound(format!("library {id}")))
    }

    /// Deletes a library, cascading to all its documents, chunks, and its
    /// index (they share the handle's lifetime).
    pub fn delete_library(&self, id: Uuid) -> Result<()> {
        self.libraries
            .write()
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| CoreError::NotFound(format!("library {id}")))
    }

    /// Point-in-time records of all libraries, ordered by creation time.
    pub fn list_libraries(&self) -> Vec<Library> {
        let mut records: Vec<Library> = self
            .libraries
            .read()
            .values()
            .map(LibraryHandle::record)
            .collect();
        records.sort_by_key(|r| r.created_at);
        records
    }

    /// Inserts an already-populated handle, used by snapshot load.
    pub(crate) fn insert_handle(&self, id: Uuid, handle: LibraryHandle) {
        self.libraries.write().insert(id, handle);
    }

    pub fn library_count(&self) -> usize {
        self.libraries.read().len()
    }

    /// Total chunks across all libraries.
    pub fn chunk_count(&self) -> usize {
        let handles: Vec<LibraryHandle> = self.libraries.read().values().cloned().collect();
        handles.iter().map(LibraryHandle::chunk_count).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::library::ChunkDraft;

    fn draft(embedding: Vec<f64>) -> ChunkDraft {
        ChunkDraft {
            text: "chunk".into(),
            embedding,
            metadata: Metadata::new(),
        }
    }

    #[test]
    fn create_get_delete_roundtrip() {
        let db = Database::new();
        let record = db.create_library(
            "a".into(),
            "first".into(),
            Metadata::new(),
            IndexConfig::default(),
            false,
        );
        assert!(db.get_library(record.id).is_ok());
        db.delete_library(record.id).unwrap();
        assert!(matches!(
            db.get_library(record.id),
            Err(CoreError::NotFound(_))
        ));
    }

    #[test]
    fn delete_cascades_everything() {
        let db = Database::new();
        let record = db.create_library(
            "a".into(),
            "first".into(),
            Metadata::new(),
            IndexConfig::default(),
            false,
        );
        let lib = db.get_library(record.id).unwrap();
        let doc = lib.create_document("d".into(), Metadata::new());
        lib.append_chunks(doc.id, vec![draft(vec![1.0, 0.0])]).unwrap();

        db.delete_library(record.id).unwrap();
        assert_eq!(db.library_count(), 0);
        assert_eq!(db.chunk_count(), 0);
    }

    #[test]
    fn listing_is_creation_ordered() {
        let db = Database::new();
        let a = db.create_library("a".into(), "".into(), Metadata::new(), IndexConfig::default(), false);
        let b = db.create_library("b".into(), "".into(), Metadata::new(), IndexConfig::default(), false);
        let names: Vec<Uuid> = db.list_libraries().iter().map(|r| r.id).collect();
        assert_eq!(names, vec![a.id, b.id]);
    }

    /// Readers run concurrently with a writer inserting chunks; every hit a
    /// reader observes must resolve to a chunk whose embedding length
    /// matches the library dimension.
    #[test]
    fn concurrent_readers_never_observe_torn_state() {
        let db = Database::new();
        let record = db.create_library(
            "busy".into(),
            "concurrency".into(),
            Metadata::new(),
            IndexConfig::default(),
            false,
        );
        let lib = db.get_library(record.id).unwrap();
        let doc = lib.create_document("d".into(), Metadata::new());
        lib.append_chunks(doc.id, vec![draft(vec![0.0, 0.0, 0.0])])
            .unwrap();

        std::thread::scope(|scope| {
            let writer_lib = lib.clone();
            let doc_id = doc.id;
            scope.spawn(move || {
                for i in 0..1000 {
                    let x = (i % 97) as f64 / 97.0;
                    writer_lib
                        .append_chunks(doc_id, vec![draft(vec![x, 1.0 - x, 0.5])])
                        .unwrap();
                }
            });

            for reader in 0..8 {
                let reader_lib = lib.clone();
                scope.spawn(move || {
                    let query = [reader as f64 / 8.0, 0.5, 0.25];
                    for _ in 0..50 {
                        let hits = reader_lib.search(&query, 10, None).unwrap();
                        for hit in &hits {
                            assert_eq!(hit.chunk.embedding.len(), 3);
                            assert!(reader_lib.get_chunk(hit.chunk.id).is_some());
                        }
                    }
                });
            }
        });

        assert_eq!(lib.chunk_count(), 1001);
        assert!(lib.data.read().validate().is_ok());
    }
}
