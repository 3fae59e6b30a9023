//! Engine configuration.
//!
//! All tunables are read from the environment with sensible defaults so the
//! engine can run unconfigured in tests. No global state: a [`Settings`]
//! value is constructed once and threaded through the engine.

use std::env;
use std::path::PathBuf;

/// Default Claude model identifier.
pub const DEFAULT_CLAUDE_MODEL: &str = "claude-sonnet-4-5-20250929";

/// Default bi-encoder embedding model.
pub const DEFAULT_EMBEDDING_MODEL: &str = "BAAI/bge-base-en-v1.5";

/// Default cross-encoder re-ranker model.
pub const DEFAULT_RERANKER_MODEL: &str = "BAAI/bge-reranker-base";

/// Total character budget for the packed LLM context (~50K tokens).
pub const MAX_CONTEXT_BUDGET: usize = 200_000;

/// Per-source soft cap within the context budget.
pub const MAX_CONTEXT_PER_SOURCE: usize = 8_000;

/// RRF rank constant.
pub const RRF_K: u32 = 60;

/// Default fusion weights for [semantic, chunk, page, expanded] retrievers.
pub const RRF_WEIGHTS: [f64; 4] = [1.5, 1.2, 1.0, 0.8];

/// Fusion weight applied to wage-table rows.
pub const WAGE_TABLE_WEIGHT: f64 = 2.0;

/// Engine settings loaded from the environment.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Anthropic API key; empty means the Q&A surface is unconfigured.
    pub anthropic_api_key: String,
    /// Claude model identifier for answer synthesis.
    pub claude_model: String,
    /// Path to the relational database file.
    pub database_path: PathBuf,
    /// Directory scanned for agreement PDFs.
    pub agreements_dir: PathBuf,
    /// Directory holding derived indices (TF-IDF store, version marker).
    pub index_dir: PathBuf,
    /// Maximum hits returned by retrieval.
    pub max_retrieval_results: usize,
    /// Total character budget for packed context.
    pub max_context_budget: usize,
    /// Per-source character cap within the budget.
    pub max_context_per_source: usize,
    /// RRF rank constant.
    pub rrf_k: u32,
    /// Fusion weights for [semantic, chunk, page, expanded].
    pub rrf_weights: [f64; 4],
    /// Bi-encoder model id.
    pub embedding_model: String,
    /// Cross-encoder re-ranker model id.
    pub reranker_model: String,
    /// Maximum characters per text chunk.
    pub chunk_max_size: usize,
    /// Minimum accumulated characters before a heading flushes a chunk.
    pub chunk_min_size: usize,
    /// Word-aligned overlap carried between consecutive chunks.
    pub chunk_overlap: usize,
    /// LLM request timeout in seconds.
    pub llm_timeout_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            anthropic_api_key: String::new(),
            claude_model: DEFAULT_CLAUDE_MODEL.to_string(),
            database_path: PathBuf::from("data/app.db"),
            agreements_dir: PathBuf::from("data/agreements"),
            index_dir: PathBuf::from("data/index"),
            max_retrieval_results: 10,
            max_context_budget: MAX_CONTEXT_BUDGET,
            max_context_per_source: MAX_CONTEXT_PER_SOURCE,
            rrf_k: RRF_K,
            rrf_weights: RRF_WEIGHTS,
            embedding_model: DEFAULT_EMBEDDING_MODEL.to_string(),
            reranker_model: DEFAULT_RERANKER_MODEL.to_string(),
            chunk_max_size: 2000,
            chunk_min_size: 200,
            chunk_overlap: 200,
            llm_timeout_secs: 60,
        }
    }
}

impl Settings {
    /// Loads settings from environment variables, falling back to defaults.
    #[must_use]
    pub fn from_env() -> Self {
        let mut settings = Self::default();

        if let Ok(v) = env::var("ANTHROPIC_API_KEY") {
            settings.anthropic_api_key = v;
        }
        if let Ok(v) = env::var("CLAUDE_MODEL") {
            if !v.is_empty() {
                settings.claude_model = v;
            }
        }
        if let Ok(v) = env::var("DATABASE_PATH") {
            if !v.is_empty() {
                settings.database_path = PathBuf::from(v);
            }
        }
        if let Ok(v) = env::var("AGREEMENTS_DIR") {
            if !v.is_empty() {
                settings.agreements_dir = PathBuf::from(v);
            }
        }
        if let Ok(v) = env::var("INDEX_DIR") {
            if !v.is_empty() {
                settings.index_dir = PathBuf::from(v);
            }
        }
        if let Some(v) = parse_env("MAX_RETRIEVAL_RESULTS") {
            settings.max_retrieval_results = v;
        }
        if let Some(v) = parse_env("MAX_CONTEXT_BUDGET") {
            settings.max_context_budget = v;
        }
        if let Some(v) = parse_env("MAX_CONTEXT_PER_SOURCE") {
            settings.max_context_per_source = v;
        }
        if let Some(v) = parse_env::<u32>("RRF_K") {
            settings.rrf_k = v;
        }
        if let Ok(v) = env::var("EMBEDDING_MODEL") {
            if !v.is_empty() {
                settings.embedding_model = v;
            }
        }
        if let Ok(v) = env::var("RERANKER_MODEL") {
            if !v.is_empty() {
                settings.reranker_model = v;
            }
        }
        if let Some(v) = parse_env("CHUNK_MAX_SIZE") {
            settings.chunk_max_size = v;
        }
        if let Some(v) = parse_env("CHUNK_MIN_SIZE") {
            settings.chunk_min_size = v;
        }
        if let Some(v) = parse_env("CHUNK_OVERLAP") {
            settings.chunk_overlap = v;
        }

        settings
    }

    /// Returns true when the external LLM can be called.
    #[must_use]
    pub fn has_api_key(&self) -> bool {
        !self.anthropic_api_key.is_empty()
    }
}

fn parse_env<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|v| v.parse().ok())
}
