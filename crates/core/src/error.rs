//! Error types surfaced by the engine.
//!
//! The core recovers nothing locally: every failure propagates to the caller
//! with its kind and a human-readable cause. The server crate maps these
//! kinds onto HTTP status codes.

use thiserror::Error;

/// Errors that can occur in the storage and index layers.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Unknown library, document, or chunk id.
    #[error("not found: {0}")]
    NotFound(String),

    /// Operation precondition unmet (index build on an empty library,
    /// dimension mismatch after the first chunk, duplicate id).
    #[error("conflict: {0}")]
    Conflict(String),

    /// Malformed input: non-finite embedding, unsupported filter form,
    /// out-of-range `k`.
    #[error("invalid: {0}")]
    Invalid(String),

    /// Approximate search returned fewer than `k` results while the
    /// library's strict flag is set.
    #[error("degraded: {0}")]
    Degraded(String),

    /// Snapshot read/write failure.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Snapshot decode failure: truncated, malformed, or unknown version.
    #[error("corrupt snapshot: {0}")]
    Corrupt(String),

    /// Invariant violation inside the engine.
    #[error("internal error: {0}")]
    Internal(String),
}

/// A specialized Result type for engine operations.
pub type Result<T> = std::result::Result<T, CoreError>;
