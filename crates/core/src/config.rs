//! Global configuration constants for corpusdb.
//!
//! Validation limits and index tuning defaults live here as compile-time
//! constants; runtime configuration is handled via CLI arguments and
//! environment variables in the server crate.

/// Maximum allowed embedding dimension.
pub const MAX_DIMENSION: usize = 4096;

/// Maximum number of results (`k`) per search request.
pub const MAX_K: usize = 100;

/// Maximum length of a library or document name in characters.
pub const MAX_NAME_LEN: usize = 255;

/// Maximum length of a library description in characters.
pub const MAX_DESCRIPTION_LEN: usize = 1000;

/// Maximum length of chunk text in bytes.
pub const MAX_TEXT_LEN: usize = 1_000_000;

/// Maximum number of chunks per bulk append request.
pub const MAX_BATCH_SIZE: usize = 1_000;

/// Maximum number of metadata keys per entity.
pub const MAX_METADATA_KEYS: usize = 64;

/// Default KD-tree leaf size: subtrees at or below this size are stored as
/// flat point runs and scanned linearly.
pub const DEFAULT_KDTREE_LEAF_SIZE: usize = 16;

/// Multiplier applied to `k` inside tree search when a metadata filter is
/// present, so selective filters still yield `k` post-filter results.
pub const FILTER_K_EXPANSION: usize = 4;

/// Default number of LSH bands (independent hash tables).
pub const DEFAULT_LSH_BANDS: usize = 10;

/// Default number of sign-hashes per LSH band (bits per signature).
pub const DEFAULT_LSH_HASHES: usize = 6;

/// Default number of extra single-bit-flip buckets probed per band during
/// LSH queries. Probing the most uncertain bits raises recall at a small
/// candidate-set cost.
pub const DEFAULT_LSH_PROBES: usize = 2;

/// Default RNG seed for LSH hyperplane generation. The seed is part of the
/// per-library index configuration so rebuilds are reproducible.
pub const DEFAULT_LSH_SEED: u64 = 42;

/// Maximum number of sign-hashes per band (signatures are packed into a u64).
pub const MAX_LSH_HASHES: usize = 64;

/// Default HTTP server port.
pub const DEFAULT_PORT: u16 = 8000;

/// Default interval (in seconds) between automatic snapshots. 0 = snapshot
/// only on shutdown.
pub const DEFAULT_SNAPSHOT_INTERVAL_SECS: u64 = 300;

/// Per-request timeout in seconds.
pub const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Maximum HTTP request body size in bytes (10 MB).
pub const MAX_REQUEST_BODY_BYTES: usize = 10 * 1024 * 1024;
