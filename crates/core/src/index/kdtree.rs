//! Balanced KD-tree index with branch-and-bound k-NN.
//!
//! Construction splits on the axis of maximum variance at each level,
//! selecting the median with `select_nth_unstable_by` (no full sort), for an
//! O(n log n) build. Runs at or below the configured leaf size are stored as
//! flat point ranges and scanned linearly.
//!
//! Search is exact against L2. High-dimensional inputs (d beyond ~20)
//! degrade toward a linear scan; this is inherent to the structure and
//! documented rather than mitigated.

use chrono::{DateTime, Utc};
use serde_json::json;
use uuid::Uuid;

use crate::config::FILTER_K_EXPANSION;
use crate::index::{IdFilter, IndexKind, IndexPoint, IndexStats, NeighborHeap};
use crate::vector::l2_sq;

#[derive(Debug, Clone)]
enum KdNode {
    Split {
        axis: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    /// Range into the build-time point permutation.
    Leaf { start: usize, end: usize },
}

#[derive(Debug)]
pub struct KdTreeIndex {
    leaf_size: usize,
    /// Points in insertion order; `order` carries the spatial permutation so
    /// insertion sequence numbers survive for stable tie-breaking.
    points: Vec<IndexPoint>,
    order: Vec<usize>,
    nodes: Vec<KdNode>,
    root: Option<usize>,
    built_at: Option<DateTime<Utc>>,
}

impl KdTreeIndex {
    pub fn new(leaf_size: usize) -> Self {
        Self {
            leaf_size: leaf_size.max(1),
            points: Vec::new(),
            order: Vec::new(),
            nodes: Vec::new(),
            root: None,
            built_at: None,
        }
    }

    /// Replaces all prior state with a balanced tree over the given points.
    pub fn build(&mut self, points: Vec<IndexPoint>) {
        self.points = points;
        self.order = (0..self.points.len()).collect();
        self.nodes.clear();
        self.root = if self.points.is_empty() {
            None
        } else {
            let end = self.points.len();
            Some(build_node(
                &self.points,
                &mut self.order,
                &mut self.nodes,
                self.leaf_size,
                0,
                end,
            ))
        };
        self.built_at = Some(Utc::now());
    }

    /// Exact k-NN via best-first descent: the child whose region contains
    /// the query is visited first; the sibling only when the splitting plane
    /// is closer than the current k-th distance. When a filter is present,
    /// the internal heap capacity is widened to `k · FILTER_K_EXPANSION` so
    /// selective filters still surface `k` hits where they exist.
    pub fn search(&self, query: &[f64], k: usize, filter: Option<IdFilter<'_>>) -> Vec<(Uuid, f64)> {
        let Some(root) = self.root else {
            return Vec::new();
        };
        let internal_k = if filter.is_some() {
            k.saturating_mul(FILTER_K_EXPANSION)
        } else {
            k
        };
        let mut heap = NeighborHeap::new(internal_k);
        self.search_node(root, query, &mut heap, filter);
        let mut hits = heap.into_sorted();
        hits.truncate(k);
        hits
    }

    fn search_node(
        &self,
        node: usize,
        query: &[f64],
        heap: &mut NeighborHeap,
        filter: Option<IdFilter<'_>>,
    ) {
        match self.nodes[node] {
            KdNode::Leaf { start, end } => {
                for &seq in &self.order[start..end] {
                    let point = &self.points[seq];
                    if let Some(filter) = filter {
                        if !filter(point.id) {
                            continue;
                        }
                    }
                    heap.push(point.id, l2_sq(query, &point.vector), seq);
                }
            }
            KdNode::Split {
                axis,
                threshold,
                left,
                right,
            } => {
                let diff = query[axis] - threshold;
                let (near, far) = if diff < 0.0 { (left, right) } else { (right, left) };
                self.search_node(near, query, heap, filter);
                if diff * diff < heap.worst_sq() {
                    self.search_node(far, query, heap, filter);
                }
            }
        }
    }

    pub fn stats(&self) -> IndexStats {
        IndexStats {
            kind: IndexKind::KdTree,
            size: self.points.len(),
            built_at: self.built_at,
            config: json!({
                "leaf_size": self.leaf_size,
                "split_axis": "max_variance",
            }),
        }
    }
}

/// Recursively partitions `order[start..end]`, appending nodes and returning
/// the subtree root's slot.
fn build_node(
    points: &[IndexPoint],
    order: &mut [usize],
    nodes: &mut Vec<KdNode>,
    leaf_size: usize,
    start: usize,
    end: usize,
) -> usize {
    let len = end - start;
    if len <= leaf_size {
        nodes.push(KdNode::Leaf { start, end });
        return nodes.len() - 1;
    }

    let axis = widest_axis(points, &order[start..end]);
    let mid = len / 2;
    order[start..end].select_nth_unstable_by(mid, |&a, &b| {
        points[a].vector[axis]
            .partial_cmp(&points[b].vector[axis])
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    let threshold = points[order[start + mid]].vector[axis];

    // Reserve this node's slot before recursing so child slots follow it.
    let slot = nodes.len();
    nodes.push(KdNode::Leaf { start: 0, end: 0 });
    let left = build_node(points, order, nodes, leaf_size, start, start + mid);
    let right = build_node(points, order, nodes, leaf_size, start + mid, end);
    nodes[slot] = KdNode::Split {
        axis,
        threshold,
        left,
        right,
    };
    slot
}

/// Axis of maximum variance over the given point subset.
fn widest_axis(points: &[IndexPoint], subset: &[usize]) -> usize {
    let dim = points[subset[0]].vector.len();
    let n = subset.len() as f64;
    let mut best_axis = 0;
    let mut best_var = f64::NEG_INFINITY;
    for axis in 0..dim {
        let mean: f64 = subset.iter().map(|&i| points[i].vector[axis]).sum::<f64>() / n;
        let var: f64 = subset
            .iter()
            .map(|&i| {
                let d = points[i].vector[axis] - mean;
                d * d
            })
            .sum::<f64>()
            / n;
        if var > best_var {
            best_var = var;
            best_axis = axis;
        }
    }
    best_axis
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::LinearIndex;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn random_points(n: usize, dim: usize, rng: &mut StdRng) -> Vec<IndexPoint> {
        (0..n)
            .map(|_| IndexPoint {
                id: Uuid::new_v4(),
                vector: (0..dim).map(|_| rng.gen_range(-1.0..1.0)).collect(),
            })
            .collect()
    }

    #[test]
    fn empty_tree_returns_nothing() {
        let mut index = KdTreeIndex::new(16);
        index.build(Vec::new());
        assert!(index.search(&[0.0, 0.0], 5, None).is_empty());
    }

    #[test]
    fn axis_aligned_basis_query() {
        let vectors = [
            vec![1.0, 0.0, 0.0],
            vec![0.0, 1.0, 0.0],
            vec![0.0, 0.0, 1.0],
        ];
        let points: Vec<IndexPoint> = vectors
            .into_iter()
            .map(|v| IndexPoint {
                id: Uuid::new_v4(),
                vector: v,
            })
            .collect();
        let ids: Vec<Uuid> = points.iter().map(|p| p.id).collect();

        let mut index = KdTreeIndex::new(1);
        index.build(points);
        let hits = index.search(&[0.9, 0.1, 0.0], 2, None);
        assert_eq!(hits[0].0, ids[0]);
        assert_eq!(hits[1].0, ids[1]);
    }

    #[test]
    fn matches_linear_scan_exactly() {
        let mut rng = StdRng::seed_from_u64(7);
        let points = random_points(300, 6, &mut rng);

        let mut tree = KdTreeIndex::new(8);
        tree.build(points.clone());
        let mut linear = LinearIndex::new();
        linear.build(points);

        for _ in 0..25 {
            let query: Vec<f64> = (0..6).map(|_| rng.gen_range(-1.0..1.0)).collect();
            let from_tree = tree.search(&query, 10, None);
            let from_scan = linear.search(&query, 10, None);
            let tree_ids: Vec<Uuid> = from_tree.iter().map(|h| h.0).collect();
            let scan_ids: Vec<Uuid> = from_scan.iter().map(|h| h.0).collect();
            assert_eq!(tree_ids, scan_ids);
            for (a, b) in from_tree.iter().zip(&from_scan) {
                assert!((a.1 - b.1).abs() < 1e-9);
            }
        }
    }

    #[test]
    fn distances_are_non_decreasing() {
        let mut rng = StdRng::seed_from_u64(11);
        let points = random_points(200, 4, &mut rng);
        let mut tree = KdTreeIndex::new(16);
        tree.build(points);

        let hits = tree.search(&[0.1, -0.2, 0.3, 0.0], 20, None);
        for pair in hits.windows(2) {
            assert!(pair[0].1 <= pair[1].1);
        }
    }

    #[test]
    fn filtered_search_respects_predicate() {
        let mut rng = StdRng::seed_from_u64(13);
        let points = random_points(100, 4, &mut rng);
        let allowed: std::collections::HashSet<Uuid> =
            points.iter().step_by(3).map(|p| p.id).collect();

        let mut tree = KdTreeIndex::new(8);
        tree.build(points);

        let filter = |id: Uuid| allowed.contains(&id);
        let hits = tree.search(&[0.0, 0.0, 0.0, 0.0], 50, Some(&filter));
        assert!(!hits.is_empty());
        assert!(hits.iter().all(|h| allowed.contains(&h.0)));
    }

    #[test]
    fn rebuild_is_idempotent() {
        let mut rng = StdRng::seed_from_u64(17);
        let points = random_points(64, 3, &mut rng);
        let query = [0.2, 0.2, 0.2];

        let mut tree = KdTreeIndex::new(4);
        tree.build(points.clone());
        let first: Vec<Uuid> = tree.search(&query, 5, None).iter().map(|h| h.0).collect();
        tree.build(points);
        let second: Vec<Uuid> = tree.search(&query, 5, None).iter().map(|h| h.0).collect();
        assert_eq!(first, second);
    }
}
