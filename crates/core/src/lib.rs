//! # corpusdb-core
//!
//! Embeddable in-memory vector database engine. Libraries own documents,
//! documents own chunks; each chunk carries a fixed-dimension embedding and
//! scalar metadata. Per-library nearest-neighbour indexes come in three
//! variants — exhaustive scan, balanced KD-tree, and random-hyperplane LSH —
//! behind one closed interface, with metadata predicate filtering layered on
//! top of similarity ranking.
//!
//! This crate has zero async dependencies — suitable for embedding directly
//! in Rust or behind the HTTP facade in `corpusdb-server`.

/// Validation limits and index tuning defaults.
pub mod config;
/// Core entity types: `Library`, `Document`, `Chunk`, `MetadataValue`.
pub mod entity;
/// Error kinds surfaced by the engine.
pub mod error;
/// Metadata filter types used by search and storage layers.
pub mod filter_types;
/// Nearest-neighbour indexes: linear, KD-tree, LSH, and the factory.
pub mod index;
/// Search primitives: hit materialization and filter evaluation.
pub mod search;
/// Storage layer: catalogue, per-library aggregates, snapshots.
pub mod storage;
/// Vector primitives: L2, dot product, cosine, norm.
pub mod vector;
