//! Hash-based fallback embedder.
//!
//! Produces deterministic pseudo-embeddings from token hashes. Not
//! semantic, but stable across runs, which keeps the vector pipeline and
//! its tests exercisable without model downloads. Texts sharing tokens get
//! correlated vectors, so ranking is still better than random.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use crate::error::Result;
use crate::semantic::Embedder;

/// Deterministic hash-based embedder.
#[derive(Debug, Clone)]
pub struct FallbackEmbedder {
    dimensions: usize,
}

impl FallbackEmbedder {
    /// Creates a fallback embedder with the given dimensionality.
    #[must_use]
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
        }
    }

    fn token_slot(&self, token: &str) -> (usize, f32) {
        let mut hasher = DefaultHasher::new();
        token.hash(&mut hasher);
        let hash = hasher.finish();
        let slot = (hash % self.dimensions as u64) as usize;
        // Sign from a second hash bit keeps the vector roughly centered
        let sign = if hash & (1 << 63) == 0 { 1.0 } else { -1.0 };
        (slot, sign)
    }
}

impl Embedder for FallbackEmbedder {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn embed(&self, text: &str, _is_query: bool) -> Result<Vec<f32>> {
        let mut vector = vec![0.0f32; self.dimensions];

        for token in text.to_lowercase().split_whitespace() {
            let token = token.trim_matches(|c: char| !c.is_alphanumeric());
            if token.is_empty() {
                continue;
            }
            let (slot, sign) = self.token_slot(token);
            vector[slot] += sign;
        }

        // L2-normalize so cosine similarity behaves
        let norm: f32 = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }

        Ok(vector)
    }

    fn model_name(&self) -> &str {
        "hash-fallback"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::semantic::cosine_similarity;

    #[test]
    fn test_deterministic() {
        let embedder = FallbackEmbedder::new(64);
        let a = embedder.embed("sick leave policy", false).unwrap();
        let b = embedder.embed("sick leave policy", false).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_dimensions() {
        let embedder = FallbackEmbedder::new(32);
        assert_eq!(embedder.dimensions(), 32);
        assert_eq!(embedder.embed("text", false).unwrap().len(), 32);
    }

    #[test]
    fn test_shared_tokens_correlate() {
        let embedder = FallbackEmbedder::new(128);
        let a = embedder.embed("sick leave entitlement", false).unwrap();
        let b = embedder.embed("sick leave days", false).unwrap();
        let c = embedder.embed("pension plan contributions", false).unwrap();
        assert!(cosine_similarity(&a, &b) > cosine_similarity(&a, &c));
    }

    #[test]
    fn test_empty_text() {
        let embedder = FallbackEmbedder::new(16);
        let v = embedder.embed("", false).unwrap();
        assert_eq!(v.len(), 16);
        assert!(v.iter().all(|x| *x == 0.0));
    }

    #[test]
    fn test_normalized() {
        let embedder = FallbackEmbedder::new(64);
        let v = embedder.embed("overtime pay rates", false).unwrap();
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_zero_dimension_clamped() {
        let embedder = FallbackEmbedder::new(0);
        assert_eq!(embedder.dimensions(), 1);
    }
}
