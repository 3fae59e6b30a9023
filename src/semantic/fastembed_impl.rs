//! `FastEmbed`-based semantic embedder.
//!
//! BGE-base-en-v1.5 via fastembed (ONNX). The model is a process
//! singleton, lazily loaded on first use, and called behind a mutex. BGE
//! is an asymmetric model: queries and passages get distinct prefixes,
//! applied identically during indexing and search.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::OnceLock;

use crate::error::{Result, StorageError};
use crate::semantic::{Embedder, DEFAULT_DIMENSIONS};

/// Thread-safe singleton for the embedding model.
static EMBEDDING_MODEL: OnceLock<std::sync::Mutex<fastembed::TextEmbedding>> = OnceLock::new();

const QUERY_PREFIX: &str = "query: ";
const PASSAGE_PREFIX: &str = "passage: ";

/// `FastEmbed` embedder using BGE-base-en-v1.5 (768 dimensions).
pub struct FastEmbedEmbedder {
    model_name: &'static str,
}

impl FastEmbedEmbedder {
    /// Creates the embedder. The model itself loads lazily on the first
    /// `embed()` call to keep cold starts fast.
    pub fn new() -> Result<Self> {
        Ok(Self {
            model_name: "BAAI/bge-base-en-v1.5",
        })
    }

    fn get_model() -> Result<&'static std::sync::Mutex<fastembed::TextEmbedding>> {
        if let Some(model) = EMBEDDING_MODEL.get() {
            return Ok(model);
        }

        let options = fastembed::InitOptions::new(fastembed::EmbeddingModel::BGEBaseENV15)
            .with_show_download_progress(false);

        let model = fastembed::TextEmbedding::try_new(options).map_err(|e| {
            StorageError::Database(format!("failed to load embedding model: {e}"))
        })?;

        // Another thread may have beaten us to it; use whichever won
        let _ = EMBEDDING_MODEL.set(std::sync::Mutex::new(model));
        EMBEDDING_MODEL.get().ok_or_else(|| {
            StorageError::Database("embedding model initialization race".to_string()).into()
        })
    }

    fn prefixed(texts: &[&str], is_query: bool) -> Vec<String> {
        let prefix = if is_query { QUERY_PREFIX } else { PASSAGE_PREFIX };
        texts.iter().map(|t| format!("{prefix}{t}")).collect()
    }
}

impl Embedder for FastEmbedEmbedder {
    fn dimensions(&self) -> usize {
        DEFAULT_DIMENSIONS
    }

    fn embed(&self, text: &str, is_query: bool) -> Result<Vec<f32>> {
        let mut batch = self.embed_batch(&[text], is_query)?;
        batch.pop().ok_or_else(|| {
            StorageError::Database("no embedding returned from model".to_string()).into()
        })
    }

    fn embed_batch(&self, texts: &[&str], is_query: bool) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let model = Self::get_model()?;
        let mut model = model
            .lock()
            .map_err(|e| StorageError::Database(format!("embedding model lock poisoned: {e}")))?;

        let inputs = Self::prefixed(texts, is_query);

        // The ONNX runtime can panic on malformed inputs; degrade to an
        // error instead of unwinding through the worker pool.
        let result = catch_unwind(AssertUnwindSafe(|| model.embed(inputs, None)));

        result
            .map_err(|panic_info| {
                let message = panic_info
                    .downcast_ref::<&str>()
                    .map(|s| (*s).to_string())
                    .or_else(|| panic_info.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                crate::error::Error::Storage(StorageError::Database(format!(
                    "ONNX runtime panic: {message}"
                )))
            })?
            .map_err(|e| {
                crate::error::Error::Storage(StorageError::Database(format!(
                    "embedding failed: {e}"
                )))
            })
    }

    fn model_name(&self) -> &str {
        self.model_name
    }
}
