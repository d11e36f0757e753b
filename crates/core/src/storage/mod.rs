//! Storage layer: the library catalogue, per-library aggregates, and
//! durable snapshots.

/// The library catalogue and its membership lock.
pub mod catalog;
/// Per-library documents, chunks, index state, and lock discipline.
pub mod library;
/// Whole-store snapshot serialization.
pub mod snapshot;

pub use catalog::Database;
pub use library::{ChunkDraft, IndexState, LibraryData, LibraryHandle, LibraryStats};
pub use snapshot::{load_snapshot, save_snapshot, SNAPSHOT_VERSION};
