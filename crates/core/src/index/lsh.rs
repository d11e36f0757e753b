//! Random-hyperplane locality-sensitive hashing index.
//!
//! Configuration is B bands of H sign-hashes each. Every hash is a random
//! unit vector drawn from N(0, I) by a seeded RNG, so rebuilds with the same
//! seed produce identical hash families. A point's band signature packs the
//! H signs of its projections into a u64; each band keeps a hashtable from
//! signature to point slots.
//!
//! Queries take the union of bucket contents across bands — widened by
//! probing the buckets reachable by flipping the least-confident signature
//! bits — then score every candidate exactly with L2 and apply the metadata
//! filter. Recall rises with more bands and falls with more hashes per band.

use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, StandardNormal};
use serde_json::json;
use std::collections::HashMap;
use uuid::Uuid;

use crate::error::{CoreError, Result};
use crate::index::{IdFilter, IndexKind, IndexPoint, IndexStats, NeighborHeap};
use crate::vector::{dot, l2_sq, norm};

#[derive(Debug)]
pub struct LshIndex {
    bands: usize,
    hashes_per_band: usize,
    probes: usize,
    seed: u64,
    /// `bands * hashes_per_band` unit hyperplane normals, band-major.
    planes: Vec<Vec<f64>>,
    /// Per-band signature → point slots.
    tables: Vec<HashMap<u64, Vec<usize>>>,
    points: Vec<IndexPoint>,
    built_at: Option<DateTime<Utc>>,
}

impl LshIndex {
    pub fn new(bands: usize, hashes_per_band: usize, probes: usize, seed: u64) -> Self {
        Self {
            bands: bands.max(1),
            hashes_per_band: hashes_per_band.clamp(1, 64),
            probes,
            seed,
            planes: Vec::new(),
            tables: Vec::new(),
            points: Vec::new(),
            built_at: None,
        }
    }

    /// Replaces all prior state: regenerates the hash family from the seed,
    /// then hashes every point into each band's table.
    pub fn build(&mut self, points: Vec<IndexPoint>) {
        self.points = points;
        self.tables = (0..self.bands).map(|_| HashMap::new()).collect();
        self.planes.clear();
        self.built_at = Some(Utc::now());

        let Some(first) = self.points.first() else {
            return;
        };
        let dim = first.vector.len();

        let mut rng = StdRng::seed_from_u64(self.seed);
        self.planes = (0..self.bands * self.hashes_per_band)
            .map(|_| random_unit_vector(dim, &mut rng))
            .collect();

        for slot in 0..self.points.len() {
            for band in 0..self.bands {
                let sig = self.signature(band, &self.points[slot].vector);
                self.tables[band].entry(sig).or_default().push(slot);
            }
        }
    }

    /// Band signature: H sign bits packed into a u64 (fast path, no margins).
    fn signature(&self, band: usize, vector: &[f64]) -> u64 {
        let base = band * self.hashes_per_band;
        let mut sig = 0u64;
        for i in 0..self.hashes_per_band {
            if dot(&self.planes[base + i], vector) >= 0.0 {
                sig |= 1 << i;
            }
        }
        sig
    }

    /// Band signature plus per-bit projection magnitudes, sorted ascending
    /// so the most uncertain bits come first (multi-probe candidates).
    fn signature_with_margins(&self, band: usize, vector: &[f64]) -> (u64, Vec<(usize, f64)>) {
        let base = band * self.hashes_per_band;
        let mut sig = 0u64;
        let mut margins = Vec::with_capacity(self.hashes_per_band);
        for i in 0..self.hashes_per_band {
            let projection = dot(&self.planes[base + i], vector);
            if projection >= 0.0 {
                sig |= 1 << i;
            }
            margins.push((i, projection.abs()));
        }
        margins.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
        (sig, margins)
    }

    /// Candidate slots: union of the query's bucket in every band, plus the
    /// buckets reached by flipping each of the `probes` least-confident
    /// bits. Returned in ascending slot (insertion) order.
    fn candidates(&self, query: &[f64]) -> Vec<usize> {
        let mut seen = vec![false; self.points.len()];
        let mut out = Vec::new();
        for band in 0..self.bands {
            let (sig, margins) = self.signature_with_margins(band, query);
            for key in probe_keys(sig, &margins, self.probes) {
                if let Some(slots) = self.tables[band].get(&key) {
                    for &slot in slots {
                        if !seen[slot] {
                            seen[slot] = true;
                            out.push(slot);
                        }
                    }
                }
            }
        }
        out.sort_unstable();
        out
    }

    /// Approximate k-NN. Candidates are scored exactly; when fewer than `k`
    /// survive, the result is padded from an exact linear fall-back unless
    /// `strict` is set. In strict mode an unfiltered shortfall (the hash
    /// family missed points that exist) surfaces as [`CoreError::Degraded`].
    pub fn search(
        &self,
        query: &[f64],
        k: usize,
        strict: bool,
        filter: Option<IdFilter<'_>>,
    ) -> Result<Vec<(Uuid, f64)>> {
        let mut heap = NeighborHeap::new(k);
        for slot in self.candidates(query) {
            let point = &self.points[slot];
            if let Some(filter) = filter {
                if !filter(point.id) {
                    continue;
                }
            }
            heap.push(point.id, l2_sq(query, &point.vector), slot);
        }

        let hits = heap.into_sorted();
        if hits.len() >= k {
            return Ok(hits);
        }

        if strict {
            if filter.is_none() && self.points.len() >= k {
                return Err(CoreError::Degraded(format!(
                    "lsh search returned {} of {} requested results in strict mode",
                    hits.len(),
                    k
                )));
            }
            return Ok(hits);
        }

        // Fall-back: exact scan over all points, which subsumes the partial
        // candidate result.
        let mut heap = NeighborHeap::new(k);
        for (slot, point) in self.points.iter().enumerate() {
            if let Some(filter) = filter {
                if !filter(point.id) {
                    continue;
                }
            }
            heap.push(point.id, l2_sq(query, &point.vector), slot);
        }
        Ok(heap.into_sorted())
    }

    pub fn stats(&self) -> IndexStats {
        let bucket_count: usize = self.tables.iter().map(HashMap::len).sum();
        IndexStats {
            kind: IndexKind::Lsh,
            size: self.points.len(),
            built_at: self.built_at,
            config: json!({
                "bands": self.bands,
                "hashes_per_band": self.hashes_per_band,
                "probes": self.probes,
                "seed": self.seed,
                "buckets": bucket_count,
            }),
        }
    }
}

/// The base bucket key plus one perturbed key per probed bit. `margins` must
/// be sorted ascending by uncertainty.
fn probe_keys(base: u64, margins: &[(usize, f64)], probes: usize) -> Vec<u64> {
    let mut keys = Vec::with_capacity(1 + probes);
    keys.push(base);
    for &(bit, _) in margins.iter().take(probes) {
        keys.push(base ^ (1 << bit));
    }
    keys
}

/// A unit vector with direction drawn from the isotropic Gaussian.
fn random_unit_vector(dim: usize, rng: &mut StdRng) -> Vec<f64> {
    loop {
        let v: Vec<f64> = (0..dim).map(|_| StandardNormal.sample(rng)).collect();
        let n = norm(&v);
        if n > 0.0 {
            return v.iter().map(|x| x / n).collect();
        }
    }
}
