//! Exhaustive scan index.
//!
//! Stores `(id, vector)` pairs contiguously; build is O(1) beyond the copy,
//! search is O(n·d) with a bounded max-heap of size `k`. Exact, with ties
//! broken by insertion order.

use chrono::{DateTime, Utc};
use serde_json::json;
use uuid::Uuid;

use crate::index::{IdFilter, IndexKind, IndexPoint, IndexStats, NeighborHeap};
use crate::vector::l2_sq;

#[derive(Debug, Default)]
pub struct LinearIndex {
    points: Vec<IndexPoint>,
    built_at: Option<DateTime<Utc>>,
}

impl LinearIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces all prior state with the given points.
    pub fn build(&mut self, points: Vec<IndexPoint>) {
        self.points = points;
        self.built_at = Some(Utc::now());
    }

    /// Scans every point, filtering before the distance computation (the
    /// predicate is cheaper than the arithmetic for any real dimension).
    pub fn search(&self, query: &[f64], k: usize, filter: Option<IdFilter<'_>>) -> Vec<(Uuid, f64)> {
        let mut heap = NeighborHeap::new(k);
        for (seq, point) in self.points.iter().enumerate() {
            if let Some(filter) = filter {
                if !filter(point.id) {
                    continue;
                }
            }
            heap.push(point.id, l2_sq(query, &point.vector), seq);
        }
        heap.into_sorted()
    }

    pub fn stats(&self) -> IndexStats {
        IndexStats {
            kind: IndexKind::Linear,
            size: self.points.len(),
            built_at: self.built_at,
            config: json!({}),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_points() -> (Vec<IndexPoint>, Vec<Uuid>) {
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
        let ids = points.iter().map(|p| p.id).collect();
        (points, ids)
    }

    #[test]
    fn returns_nearest_first() {
        let (points, ids) = unit_points();
        let mut index = LinearIndex::new();
        index.build(points);

        let hits = index.search(&[0.9, 0.1, 0.0], 2, None);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].0, ids[0]);
        assert_eq!(hits[1].0, ids[1]);
        assert!(hits[0].1 < hits[1].1);
    }

    #[test]
    fn k_larger_than_size_returns_all() {
        let (points, _) = unit_points();
        let mut index = LinearIndex::new();
        index.build(points);
        assert_eq!(index.search(&[0.0, 0.0, 0.0], 10, None).len(), 3);
    }

    #[test]
    fn filter_excludes_points() {
        let (points, ids) = unit_points();
        let keep = ids[2];
        let mut index = LinearIndex::new();
        index.build(points);

        let filter = |id: Uuid| id == keep;
        let hits = index.search(&[1.0, 0.0, 0.0], 3, Some(&filter));
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].0, keep);
    }

    #[test]
    fn rebuild_replaces_contents() {
        let (points, _) = unit_points();
        let mut index = LinearIndex::new();
        index.build(points);
        index.build(vec![IndexPoint {
            id: Uuid::new_v4(),
            vector: vec![5.0, 5.0, 5.0],
        }]);
        assert_eq!(index.stats().size, 1);
    }

    #[test]
    fn equidistant_ties_keep_insertion_order() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let mut index = LinearIndex::new();
        index.build(vec![
            IndexPoint {
                id: a,
                vector: vec![1.0, 0.0],
            },
            IndexPoint {
                id: b,
                vector: vec![-1.0, 0.0],
            },
        ]);
        let hits = index.search(&[0.0, 0.0], 1, None);
        assert_eq!(hits[0].0, a);
    }
}
