//! The engine: one handle threading settings, storage, synonyms, the
//! embedder and the LLM client through every subsystem.
//!
//! The original design goal: no module-level mutable state. Everything a
//! request needs hangs off a cheaply cloneable [`Engine`]; worker threads
//! clone it and share the inner state through an `Arc`.

use std::path::Path;
use std::sync::{Arc, RwLock};

use tracing::warn;

use crate::compare::{compare_documents_multi, MultiCompareResult};
use crate::compare_ai::{AiCompareResult, MatrixResult, SearchAnalysis};
use crate::config::Settings;
use crate::error::Result;
use crate::indexer::{self, IndexOptions, ReindexReport};
use crate::models::{
    FileInfo, IndexReport, QAResponse, RebuildReport, ScanReport, SearchResult,
};
use crate::qa::{answer_question, AnswerModel, AnthropicClient};
use crate::search::{self, SearchOptions};
use crate::semantic::tfidf::TfidfIndex;
use crate::semantic::{create_embedder, Embedder};
use crate::storage::{DbStats, Store};
use crate::synonyms::SynonymMap;

struct EngineInner {
    settings: Settings,
    store: Store,
    synonyms: SynonymMap,
    embedder: Box<dyn Embedder>,
    model: RwLock<Option<Arc<dyn AnswerModel>>>,
    tfidf: RwLock<Option<Arc<TfidfIndex>>>,
}

/// Engine handle. Clones share the same state.
#[derive(Clone)]
pub struct Engine {
    inner: Arc<EngineInner>,
}

impl Engine {
    /// Opens the engine against the configured database path. The LLM
    /// client is constructed only when an API key is configured.
    pub fn new(settings: Settings) -> Result<Self> {
        let store = Store::open(&settings.database_path)?;
        store.init()?;
        Self::assemble(settings, store)
    }

    /// Creates an engine over an in-memory store. Used by tests and
    /// ephemeral tooling.
    pub fn in_memory(settings: Settings) -> Result<Self> {
        let store = Store::in_memory()?;
        store.init()?;
        Self::assemble(settings, store)
    }

    fn assemble(settings: Settings, store: Store) -> Result<Self> {
        let model: Option<Arc<dyn AnswerModel>> = if settings.has_api_key() {
            match AnthropicClient::new(
                &settings.anthropic_api_key,
                &settings.claude_model,
                settings.llm_timeout_secs,
            ) {
                Ok(client) => Some(Arc::new(client)),
                Err(e) => {
                    warn!(error = %e, "LLM client unavailable");
                    None
                }
            }
        } else {
            None
        };

        let embedder = create_embedder()?;

        Ok(Self {
            inner: Arc::new(EngineInner {
                settings,
                store,
                synonyms: SynonymMap::new(),
                embedder,
                model: RwLock::new(model),
                tfidf: RwLock::new(None),
            }),
        })
    }

    /// Replaces the answer model on all handles sharing this engine. The
    /// seam the tests use to mock the LLM.
    pub fn set_model(&self, model: Arc<dyn AnswerModel>) {
        if let Ok(mut guard) = self.inner.model.write() {
            *guard = Some(model);
        }
    }

    /// Engine settings.
    #[must_use]
    pub fn settings(&self) -> &Settings {
        &self.inner.settings
    }

    /// The relational store.
    #[must_use]
    pub fn store(&self) -> &Store {
        &self.inner.store
    }

    /// The synonym service.
    #[must_use]
    pub fn synonyms(&self) -> &SynonymMap {
        &self.inner.synonyms
    }

    /// The embedding model.
    #[must_use]
    pub fn embedder(&self) -> &dyn Embedder {
        self.inner.embedder.as_ref()
    }

    /// The answer model, when configured.
    #[must_use]
    pub fn model(&self) -> Option<Arc<dyn AnswerModel>> {
        self.inner.model.read().ok().and_then(|guard| guard.clone())
    }

    /// The TF-IDF page index, lazily loaded from the index directory.
    #[must_use]
    pub fn tfidf(&self) -> Option<Arc<TfidfIndex>> {
        if let Ok(guard) = self.inner.tfidf.read() {
            if let Some(index) = guard.as_ref() {
                return Some(Arc::clone(index));
            }
        }

        let path = TfidfIndex::default_path(&self.inner.settings.index_dir);
        let loaded = TfidfIndex::load(&path)?;
        let loaded = Arc::new(loaded);
        if let Ok(mut guard) = self.inner.tfidf.write() {
            *guard = Some(Arc::clone(&loaded));
        }
        Some(loaded)
    }

    // ==================== API surface ====================

    /// Scans a directory for agreement PDFs. Never raises; errors land in
    /// the report.
    pub fn scan(&self, dir: &Path) -> Result<ScanReport> {
        crate::scanner::scan_directory(self.store(), dir)
    }

    /// Indexes one file from disk.
    pub fn index_file(&self, file_id: i64, opts: &IndexOptions) -> Result<IndexReport> {
        indexer::index_file(self, file_id, opts)
    }

    /// Reindexes every tracked file.
    pub fn reindex_all(&self, opts: &IndexOptions) -> Result<ReindexReport> {
        indexer::reindex_all(self, opts)
    }

    /// Page search with phrase/proximity re-ranking. Never raises on a bad
    /// query; returns an empty list.
    pub fn search(&self, query: &str, opts: &SearchOptions) -> Result<Vec<SearchResult>> {
        let results = search::search_pages(self.store(), query, opts)?;
        Ok(search::rank_results_by_phrase_proximity(
            self.store(),
            results,
            query,
        ))
    }

    /// Answers a question over the indexed corpus.
    #[must_use]
    pub fn answer(&self, question: &str) -> QAResponse {
        answer_question(self, question)
    }

    /// Compares multiple documents by topic.
    pub fn compare_documents_multi(
        &self,
        doc_ids: &[i64],
        topic: Option<&str>,
    ) -> Result<MultiCompareResult> {
        compare_documents_multi(self.store(), doc_ids, topic)
    }

    /// AI comparison of documents on a topic. Problems surface in the
    /// result's `error` field; this never raises.
    #[must_use]
    pub fn ai_compare_documents(&self, doc_ids: &[i64], topic: Option<&str>) -> AiCompareResult {
        crate::compare_ai::ai_compare_documents(self, doc_ids, topic)
    }

    /// Structured comparison matrix across documents for a topic.
    #[must_use]
    pub fn compare_matrix(&self, topic: &str, doc_ids: &[i64]) -> MatrixResult {
        crate::compare_ai::compare_matrix(self, topic, doc_ids)
    }

    /// AI analysis of search results for a query.
    #[must_use]
    pub fn analyze_search_results(&self, query: &str, file_id: Option<i64>) -> SearchAnalysis {
        crate::compare_ai::analyze_search_results(self, query, file_id)
    }

    /// Toggles a file's public flag; errors when the file is unknown.
    pub fn toggle_public(&self, file_id: i64) -> Result<bool> {
        self.store().toggle_public(file_id)
    }

    /// Rebuilds both FTS indexes from the entity tables.
    pub fn rebuild_fts(&self) -> Result<RebuildReport> {
        let pages = self.store().rebuild_fts()?;
        Ok(RebuildReport {
            success: true,
            items_indexed: pages,
            message: format!("Rebuilt FTS for {pages} pages"),
        })
    }

    /// Rebuilds the dense-vector collection from indexed chunks (or pages).
    pub fn rebuild_semantic_index(
        &self,
        use_chunks: bool,
        progress: Option<&mut dyn FnMut(usize, usize, &str)>,
    ) -> Result<RebuildReport> {
        crate::semantic::rebuild_semantic_index(self.store(), self.embedder(), use_chunks, progress)
    }

    /// Rebuilds the TF-IDF page index and persists it under the index
    /// directory.
    pub fn rebuild_vector_index(
        &self,
        progress: Option<&mut dyn FnMut(usize, usize, &str)>,
    ) -> Result<RebuildReport> {
        let (index, report) = TfidfIndex::build(self.store(), progress)?;
        if report.success {
            let path = TfidfIndex::default_path(&self.inner.settings.index_dir);
            index.save(&path)?;
            if let Ok(mut guard) = self.inner.tfidf.write() {
                *guard = Some(Arc::new(index));
            }
        }
        Ok(report)
    }

    /// All tracked files.
    pub fn list_files(&self) -> Result<Vec<FileInfo>> {
        self.store().list_files()
    }

    /// Database statistics.
    pub fn stats(&self) -> Result<DbStats> {
        self.store().stats()
    }
}
