//! Embedding provider interface.
//!
//! The engine accepts pre-computed vectors only and never calls a provider
//! itself; callers embed text at the boundary, before any lock is taken.
//! This module defines that boundary plus a deterministic local provider
//! for demos and tests. Remote providers authenticate with credentials
//! from configuration, which the engine treats as opaque.

use corpusdb_core::vector::norm;

/// What the embedding will be used for. Some providers produce different
/// vectors for stored documents than for queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbedPurpose {
    Document,
    Query,
}

/// Turns batches of text into fixed-dimension vectors.
pub trait EmbeddingProvider: Send + Sync {
    /// Embeds each input text, preserving order. All returned vectors share
    /// the provider's dimension.
    fn embed(&self, texts: &[String], purpose: EmbedPurpose) -> Result<Vec<Vec<f64>>, String>;

    /// The dimension of every vector this provider produces.
    fn dimension(&self) -> usize;
}

/// A deterministic, dependency-free provider: tokens hash into buckets of a
/// fixed-dimension vector, which is then L2-normalized. Useless for real
/// retrieval quality, ideal for reproducible tests and demos.
#[derive(Debug, Clone)]
pub struct HashingProvider {
    dimension: usize,
}

impl HashingProvider {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }

    fn embed_one(&self, text: &str) -> Vec<f64> {
        let mut v = vec![0.0f64; self.dimension];
        for token in text.split_whitespace() {
            let bucket = fnv1a(token.as_bytes()) as usize % self.dimension;
            v[bucket] += 1.0;
        }
        let n = norm(&v);
        if n > 0.0 {
            for x in &mut v {
                *x /= n;
            }
        }
        v
    }
}

impl EmbeddingProvider for HashingProvider {
    fn embed(&self, texts: &[String], _purpose: EmbedPurpose) -> Result<Vec<Vec<f64>>, String> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash = 0xcbf29ce484222325u64;
    for &b in bytes {
        hash ^= b as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash
}
