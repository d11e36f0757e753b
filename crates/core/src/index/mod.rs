//! Nearest-neighbour index implementations.
//!
//! Three variants behind one closed interface: exhaustive [`LinearIndex`],
//! spatial [`KdTreeIndex`], and approximate [`LshIndex`]. An index stores
//! chunk ids and copies of their embeddings only — never chunk objects —
//! and is rebuilt from scratch whenever the owning library's chunk set
//! changes (total rebuild is the only maintenance path).

/// Balanced KD-tree with branch-and-bound k-NN.
pub mod kdtree;
/// Exhaustive scan index.
pub mod linear;
/// Random-hyperplane locality-sensitive hashing index.
pub mod lsh;

pub use kdtree::KdTreeIndex;
pub use linear::LinearIndex;
pub use lsh::LshIndex;

use chrono::{DateTime, Utc};
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use std::collections::BinaryHeap;
use uuid::Uuid;

use crate::config;
use crate::error::Result;

/// Tag selecting an index variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexKind {
    Linear,
    KdTree,
    Lsh,
}

impl std::fmt::Display for IndexKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let tag = match self {
            IndexKind::Linear => "linear",
            IndexKind::KdTree => "kdtree",
            IndexKind::Lsh => "lsh",
        };
        f.write_str(tag)
    }
}

impl std::str::FromStr for IndexKind {
    type Err = crate::error::CoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "linear" => Ok(IndexKind::Linear),
            "kdtree" => Ok(IndexKind::KdTree),
            "lsh" => Ok(IndexKind::Lsh),
            other => Err(crate::error::CoreError::Invalid(format!(
                "unknown index kind '{other}' (expected linear, kdtree, or lsh)"
            ))),
        }
    }
}

/// Per-library index configuration, persisted in snapshots so a reload can
/// rebuild the same index. KD-tree and LSH fields are ignored by the other
/// variants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexConfig {
    pub kind: IndexKind,
    #[serde(default = "default_leaf_size")]
    pub leaf_size: usize,
    #[serde(default = "default_lsh_bands")]
    pub lsh_bands: usize,
    #[serde(default = "default_lsh_hashes")]
    pub lsh_hashes: usize,
    #[serde(default = "default_lsh_probes")]
    pub lsh_probes: usize,
    #[serde(default = "default_lsh_seed")]
    pub lsh_seed: u64,
}

fn default_leaf_size() -> usize {
    config::DEFAULT_KDTREE_LEAF_SIZE
}
fn default_lsh_bands() -> usize {
    config::DEFAULT_LSH_BANDS
}
fn default_lsh_hashes() -> usize {
    config::DEFAULT_LSH_HASHES
}
fn default_lsh_probes() -> usize {
    config::DEFAULT_LSH_PROBES
}
fn default_lsh_seed() -> u64 {
    config::DEFAULT_LSH_SEED
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            kind: IndexKind::Linear,
            leaf_size: default_leaf_size(),
            lsh_bands: default_lsh_bands(),
            lsh_hashes: default_lsh_hashes(),
            lsh_probes: default_lsh_probes(),
            lsh_seed: default_lsh_seed(),
        }
    }
}

/// An `(id, vector)` pair handed to `build`. The id is the only link back to
/// the chunk table; results are materialized by resolving ids there.
#[derive(Debug, Clone)]
pub struct IndexPoint {
    pub id: Uuid,
    pub vector: Vec<f64>,
}

/// Size, build timestamp, kind tag, and configuration echo for an index.
#[derive(Debug, Clone, Serialize)]
pub struct IndexStats {
    pub kind: IndexKind,
    pub size: usize,
    pub built_at: Option<DateTime<Utc>>,
    pub config: serde_json::Value,
}

/// Predicate deciding whether a chunk id participates in a search. Applied
/// when scoring a point; the indexes never prune on metadata structurally.
pub type IdFilter<'a> = &'a (dyn Fn(Uuid) -> bool + 'a);

/// The closed set of index variants. All expose `build`, `search`, `stats`.
#[derive(Debug)]
pub enum VectorIndex {
    Linear(LinearIndex),
    KdTree(KdTreeIndex),
    Lsh(LshIndex),
}

impl VectorIndex {
    /// Factory: constructs an empty index of the configured kind.
    pub fn from_config(config: &IndexConfig) -> Self {
        match config.kind {
            IndexKind::Linear => VectorIndex::Linear(LinearIndex::new()),
            IndexKind::KdTree => VectorIndex::KdTree(KdTreeIndex::new(config.leaf_size)),
            IndexKind::Lsh => VectorIndex::Lsh(LshIndex::new(
                config.lsh_bands,
                config.lsh_hashes,
                config.lsh_probes,
                config.lsh_seed,
            )),
        }
    }

    /// Replaces any prior state with an index over the given points.
    /// Idempotent; callers pass points in chunk insertion order so that
    /// distance ties resolve stably.
    pub fn build(&mut self, points: Vec<IndexPoint>) {
        match self {
            VectorIndex::Linear(ix) => ix.build(points),
            VectorIndex::KdTree(ix) => ix.build(points),
            VectorIndex::Lsh(ix) => ix.build(points),
        }
    }

    /// Returns up to `k` `(id, distance)` pairs sorted by ascending L2
    /// distance. `strict` only affects the LSH variant (no exact-scan
    /// padding when candidates run short).
    pub fn search(
        &self,
        query: &[f64],
        k: usize,
        strict: bool,
        filter: Option<IdFilter<'_>>,
    ) -> Result<Vec<(Uuid, f64)>> {
        match self {
            VectorIndex::Linear(ix) => Ok(ix.search(query, k, filter)),
            VectorIndex::KdTree(ix) => Ok(ix.search(query, k, filter)),
            VectorIndex::Lsh(ix) => ix.search(query, k, strict, filter),
        }
    }

    /// Size, build timestamp, kind tag, configuration echo.
    pub fn stats(&self) -> IndexStats {
        match self {
            VectorIndex::Linear(ix) => ix.stats(),
            VectorIndex::KdTree(ix) => ix.stats(),
            VectorIndex::Lsh(ix) => ix.stats(),
        }
    }

    pub fn kind(&self) -> IndexKind {
        match self {
            VectorIndex::Linear(_) => IndexKind::Linear,
            VectorIndex::KdTree(_) => IndexKind::KdTree,
            VectorIndex::Lsh(_) => IndexKind::Lsh,
        }
    }
}

/// A result candidate: squared distance plus the point's insertion sequence
/// number. Max-heap ordering; on equal distance the later-inserted point is
/// the greater (worse) entry, so ties resolve to insertion order.
#[derive(Debug, Clone, PartialEq, Eq)]
struct HeapEntry {
    distance_sq: OrderedFloat<f64>,
    seq: usize,
    id: Uuid,
}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.distance_sq
            .cmp(&other.distance_sq)
            .then(self.seq.cmp(&other.seq))
    }
}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

/// Bounded max-heap of the `k` best hits so far (worst at the top).
#[derive(Debug)]
pub(crate) struct NeighborHeap {
    capacity: usize,
    heap: BinaryHeap<HeapEntry>,
}

impl NeighborHeap {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            capacity,
            heap: BinaryHeap::with_capacity(capacity + 1),
        }
    }

    /// Offers a candidate; keeps only the `capacity` best.
    pub(crate) fn push(&mut self, id: Uuid, distance_sq: f64, seq: usize) {
        let entry = HeapEntry {
            distance_sq: OrderedFloat(distance_sq),
            seq,
            id,
        };
        if self.heap.len() < self.capacity {
            self.heap.push(entry);
        } else if let Some(worst) = self.heap.peek() {
            if entry < *worst {
                self.heap.pop();
                self.heap.push(entry);
            }
        }
    }

    pub(crate) fn is_full(&self) -> bool {
        self.heap.len() >= self.capacity
    }

    /// Squared distance of the current worst retained hit, or +inf while the
    /// heap has spare capacity. This is the branch-and-bound pruning radius.
    pub(crate) fn worst_sq(&self) -> f64 {
        if self.is_full() {
            self.heap.peek().map_or(f64::INFINITY, |e| e.distance_sq.0)
        } else {
            f64::INFINITY
        }
    }

    /// Drains into `(id, distance)` pairs sorted ascending, square-rooting
    /// at this boundary.
    pub(crate) fn into_sorted(self) -> Vec<(Uuid, f64)> {
        self.heap
            .into_sorted_vec()
            .into_iter()
            .map(|e| (e.id, e.distance_sq.0.sqrt()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_parses_and_prints() {
        for (tag, kind) in [
            ("linear", IndexKind::Linear),
            ("kdtree", IndexKind::KdTree),
            ("lsh", IndexKind::Lsh),
        ] {
            assert_eq!(tag.parse::<IndexKind>().unwrap(), kind);
            assert_eq!(kind.to_string(), tag);
        }
        assert!("hnsw".parse::<IndexKind>().is_err());
    }

    #[test]
    fn heap_keeps_k_best_sorted() {
        let mut heap = NeighborHeap::new(2);
        let ids: Vec<Uuid> = (0..4).map(|_| Uuid::new_v4()).collect();
        heap.push(ids[0], 9.0, 0);
        heap.push(ids[1], 1.0, 1);
        heap.push(ids[2], 4.0, 2);
        heap.push(ids[3], 16.0, 3);
        let out = heap.into_sorted();
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].0, ids[1]);
        assert_eq!(out[1].0, ids[2]);
        assert!((out[0].1 - 1.0).abs() < 1e-12);
        assert!((out[1].1 - 2.0).abs() < 1e-12);
    }

    #[test]
    fn heap_breaks_ties_by_insertion_order() {
        let mut heap = NeighborHeap::new(1);
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();
        heap.push(first, 4.0, 0);
        heap.push(second, 4.0, 1);
        let out = heap.into_sorted();
        assert_eq!(out[0].0, first);
    }

    #[test]
    fn heap_worst_is_infinite_until_full() {
        let mut heap = NeighborHeap::new(2);
        assert_eq!(heap.worst_sq(), f64::INFINITY);
        heap.push(Uuid::new_v4(), 1.0, 0);
        assert_eq!(heap.worst_sq(), f64::INFINITY);
        heap.push(Uuid::new_v4(), 3.0, 1);
        assert_eq!(heap.worst_sq(), 3.0);
    }
}
