//! Cross-encoder re-ranking.
//!
//! Scores (query, passage) pairs jointly for much better precision than
//! the bi-encoder alone. The model is a lazily loaded process singleton;
//! callers degrade gracefully when it is unavailable.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::OnceLock;

use tracing::warn;

use crate::error::{Result, StorageError};

static RERANKER: OnceLock<std::sync::Mutex<fastembed::TextRerank>> = OnceLock::new();

fn get_reranker() -> Result<&'static std::sync::Mutex<fastembed::TextRerank>> {
    if let Some(model) = RERANKER.get() {
        return Ok(model);
    }

    let options = fastembed::RerankInitOptions::new(fastembed::RerankerModel::BGERerankerBase)
        .with_show_download_progress(false);

    let model = fastembed::TextRerank::try_new(options)
        .map_err(|e| StorageError::Database(format!("failed to load re-ranker: {e}")))?;

    let _ = RERANKER.set(std::sync::Mutex::new(model));
    RERANKER.get().ok_or_else(|| {
        StorageError::Database("re-ranker initialization race".to_string()).into()
    })
}

/// Scores each document against the query with the cross-encoder.
///
/// Returns one score per document, in input order. Errors (including model
/// load failures) are surfaced so callers can fall back to bi-encoder
/// order.
pub fn rerank_scores(query: &str, documents: &[&str]) -> Result<Vec<f32>> {
    if documents.is_empty() {
        return Ok(Vec::new());
    }

    let model = get_reranker()?;
    let mut model = model
        .lock()
        .map_err(|e| StorageError::Database(format!("re-ranker lock poisoned: {e}")))?;

    let result = catch_unwind(AssertUnwindSafe(|| {
        model.rerank(query, documents.to_vec(), false, None)
    }));

    let ranked = result
        .map_err(|panic_info| {
            let message = panic_info
                .downcast_ref::<&str>()
                .map(|s| (*s).to_string())
                .or_else(|| panic_info.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            warn!(error = %message, "re-ranker panicked");
            crate::error::Error::Storage(StorageError::Database(format!(
                "re-ranker panic: {message}"
            )))
        })?
        .map_err(|e| {
            crate::error::Error::Storage(StorageError::Database(format!("re-rank failed: {e}")))
        })?;

    // fastembed returns results sorted by score; restore input order
    let mut scores = vec![0.0f32; documents.len()];
    for item in ranked {
        if let Some(slot) = scores.get_mut(item.index) {
            *slot = item.score;
        }
    }
    Ok(scores)
}
