//! Search primitives: result materialization and metadata filtering.

/// Metadata filter evaluation against chunk and parent-document maps.
pub mod filter;

use std::sync::Arc;

use crate::entity::Chunk;

/// A ranked search result: the matched chunk and its L2 distance from the
/// query (lower is closer).
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub chunk: Arc<Chunk>,
    pub distance: f64,
}
