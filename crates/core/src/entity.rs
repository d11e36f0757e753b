//! Core entity types for corpusdb.
//!
//! Three entity kinds form the ownership hierarchy: a `Library` owns
//! `Document`s, a `Document` owns `Chunk`s. Each carries a UUID, timestamps,
//! and a schemaless metadata map of typed scalars used by filtered search.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use crate::index::IndexKind;

/// A typed metadata value attached to an entity.
///
/// Untagged in JSON: `"a"`, `7`, `7.5`, `true` map directly. Only scalars are
/// supported; nested objects and arrays are rejected at the API boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    /// Boolean value.
    Bool(bool),
    /// 64-bit signed integer.
    Int(i64),
    /// 64-bit floating-point number.
    Float(f64),
    /// UTF-8 string.
    Str(String),
}

/// Schemaless metadata: field name to scalar value.
pub type Metadata = HashMap<String, MetadataValue>;

/// The top-level container. Owns documents and a single current index.
///
/// `dimension` is unset until the first chunk is inserted and fixed
/// thereafter. `strict` controls whether approximate search may pad its
/// result set from an exact fall-back scan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Library {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub metadata: Metadata,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Kind of the most recently built index, if any.
    pub index_kind: Option<IndexKind>,
    /// When the index was last built.
    pub index_built_at: Option<DateTime<Utc>>,
    /// Embedding dimension, fixed on first chunk insert.
    pub dimension: Option<usize>,
    /// When set, approximate search returns fewer than `k` results instead
    /// of padding from an exact scan.
    #[serde(default)]
    pub strict: bool,
}

impl Library {
    /// Creates a new empty library with a random UUID.
    pub fn new(name: String, description: String, metadata: Metadata) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name,
            description,
            metadata,
            created_at: now,
            updated_at: now,
            index_kind: None,
            index_built_at: None,
            dimension: None,
            strict: false,
        }
    }
}

/// A logical text unit within a library. Owns chunks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: Uuid,
    pub library_id: Uuid,
    pub name: String,
    #[serde(default)]
    pub metadata: Metadata,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Document {
    /// Creates a new document belonging to `library_id`.
    pub fn new(library_id: Uuid, name: String, metadata: Metadata) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            library_id,
            name,
            metadata,
            created_at: now,
            updated_at: now,
        }
    }
}

/// An indexed unit: text, a fixed-dimension embedding, and metadata.
///
/// The embedding is immutable after creation; text and metadata may be
/// updated. `library_id` is denormalized so a chunk resolves its library
/// without a document lookup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub id: Uuid,
    pub document_id: Uuid,
    pub library_id: Uuid,
    pub text: String,
    pub embedding: Vec<f64>,
    #[serde(default)]
    pub metadata: Metadata,
    pub created_at: DateTime<Utc>,
}

impl Chunk {
    /// Creates a new chunk belonging to `document_id` in `library_id`.
    pub fn new(
        library_id: Uuid,
        document_id: Uuid,
        text: String,
        embedding: Vec<f64>,
        metadata: Metadata,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            document_id,
            library_id,
            text,
            embedding,
            metadata,
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metadata_value_untagged_roundtrip() {
        let m: Metadata = [
            ("s".to_string(), MetadataValue::Str("intro".into())),
            ("i".to_string(), MetadataValue::Int(7)),
            ("f".to_string(), MetadataValue::Float(7.5)),
            ("b".to_string(), MetadataValue::Bool(true)),
        ]
        .into_iter()
        .collect();

        let json = serde_json::to_string(&m).unwrap();
        let back: Metadata = serde_json::from_str(&json).unwrap();
        assert_eq!(back, m);
    }

    #[test]
    fn metadata_int_stays_int() {
        let v: MetadataValue = serde_json::from_str("42").unwrap();
        assert_eq!(v, MetadataValue::Int(42));
        let v: MetadataValue = serde_json::from_str("42.0").unwrap();
        assert_eq!(v, MetadataValue::Float(42.0));
    }

    #[test]
    fn chunk_links_to_parents() {
        let lib = Library::new("l".into(), "d".into(), Metadata::new());
        let doc = Document::new(lib.id, "doc".into(), Metadata::new());
        let chunk = Chunk::new(lib.id, doc.id, "t".into(), vec![1.0, 0.0], Metadata::new());
        assert_eq!(chunk.library_id, lib.id);
        assert_eq!(chunk.document_id, doc.id);
    }
}
