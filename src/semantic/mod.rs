//! Dense-vector semantic search.
//!
//! An [`Embedder`] turns queries and passages into dense vectors; the
//! collection stores them alongside a metadata mirror and answers cosine
//! similarity queries. A cross-encoder re-ranker refines the top
//! candidates when available.
//!
//! # Feature flags
//!
//! - `fastembed-embeddings`: BGE-base-en-v1.5 via `fastembed` (768 dims)
//!   plus the cross-encoder re-ranker.
//! - Without the feature: a deterministic hash-based fallback embedder
//!   (not semantic, but stable for tests and degraded deployments).

mod collection;
mod fallback;
pub mod tfidf;

#[cfg(feature = "fastembed-embeddings")]
mod fastembed_impl;
#[cfg(feature = "fastembed-embeddings")]
pub mod rerank;

pub use collection::{
    add_chunk_embedding, add_page_embedding, delete_file_embeddings, rebuild_semantic_index,
    search_semantic, search_semantic_with_rerank, semantic_to_search_result, SemanticOptions,
    EMBED_BATCH_SIZE, STORED_DOCUMENT_LIMIT,
};
pub use fallback::FallbackEmbedder;

#[cfg(feature = "fastembed-embeddings")]
pub use fastembed_impl::FastEmbedEmbedder;

use crate::error::Result;

/// Default embedding dimensions for BGE-base-en-v1.5.
///
/// The authoritative dimension constant; the fallback embedder matches it
/// so stored vectors stay comparable across builds.
pub const DEFAULT_DIMENSIONS: usize = 768;

/// Trait for embedding generators.
///
/// Implementations must be thread-safe (`Send + Sync`); the retrieval
/// orchestrator calls them from worker threads. Models that need
/// asymmetric prefixes apply them based on `is_query` so indexing and
/// search stay consistent.
pub trait Embedder: Send + Sync {
    /// Returns the embedding dimensions.
    fn dimensions(&self) -> usize;

    /// Embeds one text. `is_query` selects the query-side prefix for
    /// asymmetric models.
    fn embed(&self, text: &str, is_query: bool) -> Result<Vec<f32>>;

    /// Embeds multiple texts. The default implementation is sequential;
    /// implementations may batch.
    fn embed_batch(&self, texts: &[&str], is_query: bool) -> Result<Vec<Vec<f32>>> {
        texts.iter().map(|t| self.embed(t, is_query)).collect()
    }

    /// Model identifier recorded with stored vectors.
    fn model_name(&self) -> &str;
}

/// Creates the default embedder for the build configuration.
#[cfg(feature = "fastembed-embeddings")]
pub fn create_embedder() -> Result<Box<dyn Embedder>> {
    Ok(Box::new(FastEmbedEmbedder::new()?))
}

/// Creates the default embedder for the build configuration.
#[cfg(not(feature = "fastembed-embeddings"))]
pub fn create_embedder() -> Result<Box<dyn Embedder>> {
    Ok(Box::new(FallbackEmbedder::new(DEFAULT_DIMENSIONS)))
}

/// Computes cosine similarity between two vectors.
///
/// Returns 0.0 for mismatched lengths or zero-magnitude vectors.
#[must_use]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let mag_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let mag_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if mag_a == 0.0 || mag_b == 0.0 {
        return 0.0;
    }

    dot / (mag_a * mag_b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_identical() {
        let a = vec![1.0, 0.0, 0.0];
        assert!((cosine_similarity(&a, &a) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_orthogonal() {
        let a = vec![1.0, 0.0];
        let b = vec![0.0, 1.0];
        assert!(cosine_similarity(&a, &b).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_opposite() {
        let a = vec![1.0, 0.0];
        let b = vec![-1.0, 0.0];
        assert!((cosine_similarity(&a, &b) + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_length_mismatch() {
        assert!(cosine_similarity(&[1.0], &[1.0, 0.0]).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_zero_vector() {
        assert!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]).abs() < 1e-6);
    }

    #[test]
    fn test_create_embedder() {
        let embedder = create_embedder().unwrap();
        assert_eq!(embedder.dimensions(), DEFAULT_DIMENSIONS);
    }

    #[test]
    fn test_embed_batch_default_impl() {
        let embedder = FallbackEmbedder::new(16);
        let texts = vec!["hello", "world"];
        let out = embedder.embed_batch(&texts, false).unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].len(), 16);
    }
}
