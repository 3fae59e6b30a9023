//! Hybrid retrieval orchestration.
//!
//! The primary path fans four retrievers out onto worker threads
//! (semantic with re-rank, chunk FTS, page FTS, synonym-expanded page FTS)
//! and fuses the survivors with weighted RRF. When the parallel path comes
//! back empty, or the query names a specific document, a staged fallback
//! ladder runs instead. Every stage returns empty on "no match"; only the
//! orchestrator's caller turns emptiness into a user-facing answer.

use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use regex::Regex;
use tracing::{debug, warn};

use crate::config::WAGE_TABLE_WEIGHT;
use crate::engine::Engine;
use crate::models::{Hit, SearchResult};
use crate::search::{
    search_chunks, search_pages, weighted_rrf_fusion, SearchMode, SearchOptions,
};
use crate::semantic::{
    search_semantic, search_semantic_with_rerank, semantic_to_search_result, SemanticOptions,
};

/// Per-retriever timeout in the parallel path.
pub const TASK_TIMEOUT: Duration = Duration::from_secs(10);

/// Total gather timeout in the parallel path.
pub const GATHER_TIMEOUT: Duration = Duration::from_secs(30);

/// Candidate pool size for the cross-encoder re-rank stage.
const RERANK_INITIAL_LIMIT: usize = 50;

/// Wage-table rows fetched for value queries.
const WAGE_TABLE_LIMIT: usize = 5;

/// Query terms that trigger wage-table augmentation.
pub(crate) const VALUE_QUERY_TERMS: &[&str] = &[
    "wage",
    "salary",
    "pay",
    "rate",
    "hour",
    "compensation",
    "overtime",
    "benefit",
    "allowance",
    "premium",
    "differential",
];

/// Outcome of a retrieval: fused hits, the stage tag that produced them,
/// and the raw chunk/semantic hits that carry heading metadata.
#[derive(Debug, Clone)]
pub struct RetrievalOutcome {
    /// Fused, deduplicated hits in rank order.
    pub hits: Vec<SearchResult>,
    /// Stage tag for diagnostics (`hybrid_parallel+tables`, `fts_and`, ...).
    pub method: String,
    /// Raw hits with structural context, for prompt assembly.
    pub context_hits: Vec<Hit>,
}

impl RetrievalOutcome {
    fn empty() -> Self {
        Self {
            hits: Vec::new(),
            method: "none".to_string(),
            context_hits: Vec::new(),
        }
    }
}

/// Which retriever produced a parallel task's output. Order fixes the
/// fusion weight assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum TaskKind {
    Semantic = 0,
    Chunk = 1,
    Page = 2,
    Expanded = 3,
}

struct TaskOutput {
    kind: TaskKind,
    results: Vec<SearchResult>,
    context: Vec<Hit>,
}

/// True when the query asks for monetary or rate values.
fn is_value_query(question: &str) -> bool {
    let lower = question.to_lowercase();
    VALUE_QUERY_TERMS.iter().any(|term| lower.contains(term))
}

/// Runs the four retrieval strategies in parallel and fuses the results.
///
/// Each task gets its own per-task timeout and the whole gather a separate
/// total deadline; a failed or late task contributes nothing but does not
/// abort the others. Stragglers are detached; they never touch persistent
/// state.
fn parallel_hybrid_retrieve(
    engine: &Engine,
    question: &str,
    limit: usize,
    file_id: Option<i64>,
) -> RetrievalOutcome {
    // One channel per task so each straggler burns only its own timeout
    let mut receivers: Vec<mpsc::Receiver<TaskOutput>> = Vec::with_capacity(4);

    {
        let engine = engine.clone();
        let question = question.to_string();
        let (tx, rx) = mpsc::channel::<TaskOutput>();
        receivers.push(rx);
        thread::spawn(move || {
            let output = match search_semantic_with_rerank(
                engine.store(),
                engine.embedder(),
                &question,
                limit * 2,
                file_id,
                RERANK_INITIAL_LIMIT,
            ) {
                Ok(hits) => TaskOutput {
                    kind: TaskKind::Semantic,
                    results: hits.iter().map(semantic_to_search_result).collect(),
                    context: hits.into_iter().map(Hit::Semantic).collect(),
                },
                Err(e) => {
                    warn!(error = %e, "semantic retrieval failed");
                    TaskOutput {
                        kind: TaskKind::Semantic,
                        results: Vec::new(),
                        context: Vec::new(),
                    }
                }
            };
            let _ = tx.send(output);
        });
    }

    {
        let engine = engine.clone();
        let question = question.to_string();
        let (tx, rx) = mpsc::channel::<TaskOutput>();
        receivers.push(rx);
        thread::spawn(move || {
            let opts = SearchOptions {
                limit: limit * 2,
                mode: SearchMode::Or,
                file_id,
                fallback_to_or: false,
            };
            let output = match search_chunks(engine.store(), &question, &opts) {
                Ok(chunks) => TaskOutput {
                    kind: TaskKind::Chunk,
                    results: chunks.iter().map(chunk_to_search_result).collect(),
                    context: chunks.into_iter().map(Hit::Chunk).collect(),
                },
                Err(e) => {
                    warn!(error = %e, "chunk retrieval failed");
                    TaskOutput {
                        kind: TaskKind::Chunk,
                        results: Vec::new(),
                        context: Vec::new(),
                    }
                }
            };
            let _ = tx.send(output);
        });
    }

    {
        let engine = engine.clone();
        let question = question.to_string();
        let (tx, rx) = mpsc::channel::<TaskOutput>();
        receivers.push(rx);
        thread::spawn(move || {
            let opts = SearchOptions {
                limit: limit * 2,
                mode: SearchMode::Or,
                file_id,
                fallback_to_or: false,
            };
            let results = search_pages(engine.store(), &question, &opts).unwrap_or_else(|e| {
                warn!(error = %e, "page retrieval failed");
                Vec::new()
            });
            let _ = tx.send(TaskOutput {
                kind: TaskKind::Page,
                results,
                context: Vec::new(),
            });
        });
    }

    {
        let engine = engine.clone();
        let question = question.to_string();
        let (tx, rx) = mpsc::channel::<TaskOutput>();
        receivers.push(rx);
        thread::spawn(move || {
            let results = engine
                .synonyms()
                .expand_query(engine.store(), &question)
                .ok()
                .and_then(|variants| variants.into_iter().nth(1))
                .map(|variant| {
                    let opts = SearchOptions {
                        limit,
                        mode: SearchMode::Or,
                        file_id,
                        fallback_to_or: false,
                    };
                    search_pages(engine.store(), &variant, &opts).unwrap_or_default()
                })
                .unwrap_or_default();
            let _ = tx.send(TaskOutput {
                kind: TaskKind::Expanded,
                results,
                context: Vec::new(),
            });
        });
    }
    // Two deadline tiers, as in the original: each task is waited on for at
    // most TASK_TIMEOUT of its own, while the gather as a whole stops at
    // GATHER_TIMEOUT from start. A task that finishes while another was
    // being drained is collected instantly on its turn, so one slow task
    // never hides the others' results.
    let start = Instant::now();
    let hard_deadline = start + GATHER_TIMEOUT;
    let mut outputs: Vec<TaskOutput> = Vec::with_capacity(receivers.len());
    for rx in receivers {
        let now = Instant::now();
        if now >= hard_deadline {
            warn!(received = outputs.len(), "parallel retrieval gather timed out");
            break;
        }
        let wait = TASK_TIMEOUT.min(hard_deadline - now);
        match rx.recv_timeout(wait) {
            Ok(output) => outputs.push(output),
            Err(mpsc::RecvTimeoutError::Timeout) => {
                warn!("retrieval task timed out");
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                warn!("retrieval task terminated without a result");
            }
        }
    }

    // Deterministic fusion: weights assigned by retriever kind
    outputs.sort_by_key(|o| o.kind);

    let mut lists: Vec<Vec<SearchResult>> = Vec::new();
    let mut weights: Vec<f64> = Vec::new();
    let mut context_hits: Vec<Hit> = Vec::new();
    let configured = engine.settings().rrf_weights;

    for output in outputs {
        if output.results.is_empty() {
            continue;
        }
        lists.push(output.results);
        weights.push(configured[output.kind as usize]);
        context_hits.extend(output.context);
    }

    if lists.is_empty() {
        return RetrievalOutcome::empty();
    }

    let fused = weighted_rrf_fusion(&lists, &weights, engine.settings().rrf_k, limit);
    debug!(
        lists = lists.len(),
        fused = fused.len(),
        "parallel hybrid retrieval fused"
    );

    RetrievalOutcome {
        hits: fused,
        method: "hybrid_parallel".to_string(),
        context_hits,
    }
}

fn chunk_to_search_result(chunk: &crate::models::ChunkHit) -> SearchResult {
    SearchResult {
        file_id: chunk.file_id,
        file_path: chunk.file_path.clone(),
        filename: chunk.filename.clone(),
        page_number: chunk.page_start,
        snippet: chunk.snippet.clone(),
        score: chunk.score,
    }
}

/// Fetches wage-table rows for value queries, falling back to a page-text
/// LIKE heuristic when no flagged tables exist.
fn query_wage_tables(engine: &Engine, question: &str, file_id: Option<i64>) -> Vec<SearchResult> {
    if !is_value_query(question) {
        return Vec::new();
    }

    let tables = match engine.store().wage_tables(file_id, WAGE_TABLE_LIMIT) {
        Ok(tables) => tables,
        Err(e) => {
            warn!(error = %e, "wage table query failed");
            return Vec::new();
        }
    };

    if !tables.is_empty() {
        return tables
            .into_iter()
            .map(|table| SearchResult {
                file_id: table.file_id,
                file_path: table.file_path,
                filename: table.filename,
                page_number: table.page_number,
                snippet: table.markdown_text.chars().take(200).collect(),
                score: WAGE_TABLE_WEIGHT,
            })
            .collect();
    }

    engine
        .store()
        .money_pages(file_id, WAGE_TABLE_LIMIT)
        .unwrap_or_else(|e| {
            warn!(error = %e, "money page fallback failed");
            Vec::new()
        })
}

/// One pass of the staged fallback ladder, optionally scoped to a file.
fn fallback_ladder(
    engine: &Engine,
    question: &str,
    limit: usize,
    file_id: Option<i64>,
) -> Option<RetrievalOutcome> {
    let store = engine.store();
    let tag = |base: &str| {
        if file_id.is_some() {
            match base {
                "semantic" => "semantic_scoped".to_string(),
                "sql_like" => "sql_like_scoped".to_string(),
                other => {
                    // chunk_and -> chunk_scoped_and, fts_or -> fts_scoped_or
                    match other.rsplit_once('_') {
                        Some((head, mode)) => format!("{head}_scoped_{mode}"),
                        None => format!("{other}_scoped"),
                    }
                }
            }
        } else {
            base.to_string()
        }
    };

    // Semantic (single-stage)
    if let Ok(hits) = search_semantic(
        store,
        engine.embedder(),
        question,
        &SemanticOptions {
            limit,
            file_id,
            chunks_only: false,
        },
    ) {
        if !hits.is_empty() {
            return Some(RetrievalOutcome {
                hits: hits.iter().map(semantic_to_search_result).collect(),
                method: tag("semantic"),
                context_hits: hits.into_iter().map(Hit::Semantic).collect(),
            });
        }
    }

    // Chunk FTS AND then OR
    for mode in [SearchMode::And, SearchMode::Or] {
        let opts = SearchOptions {
            limit,
            mode,
            file_id,
            fallback_to_or: false,
        };
        if let Ok(chunks) = search_chunks(store, question, &opts) {
            if !chunks.is_empty() {
                let base = if mode == SearchMode::And {
                    "chunk_and"
                } else {
                    "chunk_or"
                };
                return Some(RetrievalOutcome {
                    hits: chunks.iter().map(chunk_to_search_result).collect(),
                    method: tag(base),
                    context_hits: chunks.into_iter().map(Hit::Chunk).collect(),
                });
            }
        }
    }

    // Page FTS AND then OR
    for mode in [SearchMode::And, SearchMode::Or] {
        let opts = SearchOptions {
            limit,
            mode,
            file_id,
            fallback_to_or: false,
        };
        if let Ok(results) = search_pages(store, question, &opts) {
            if !results.is_empty() {
                let base = if mode == SearchMode::And {
                    "fts_and"
                } else {
                    "fts_or"
                };
                return Some(RetrievalOutcome {
                    hits: results,
                    method: tag(base),
                    context_hits: Vec::new(),
                });
            }
        }
    }

    // Synonym-expanded variants (skip the original)
    if let Ok(variants) = engine.synonyms().expand_query(store, question) {
        for variant in variants.into_iter().skip(1) {
            let opts = SearchOptions {
                limit,
                mode: SearchMode::Or,
                file_id,
                fallback_to_or: false,
            };
            if let Ok(results) = search_pages(store, &variant, &opts) {
                if !results.is_empty() {
                    return Some(RetrievalOutcome {
                        hits: results,
                        method: tag("fts_synonym"),
                        context_hits: Vec::new(),
                    });
                }
            }
        }
    }

    // SQL substring with word-boundary re-filter
    let keywords: Vec<String> = crate::search::extract_keywords(question)
        .into_iter()
        .take(5)
        .collect();
    if !keywords.is_empty() {
        if let Ok(rows) = store.like_search_pages(&keywords, file_id, limit * 3) {
            let results = word_boundary_filter(rows, &keywords, limit);
            if !results.is_empty() {
                return Some(RetrievalOutcome {
                    hits: results,
                    method: tag("sql_like"),
                    context_hits: Vec::new(),
                });
            }
        }
    }

    // Last resort: page FTS OR merged with the TF-IDF store via RRF
    let fts_or = search_pages(
        store,
        question,
        &SearchOptions {
            limit: limit * 2,
            mode: SearchMode::Or,
            file_id,
            fallback_to_or: false,
        },
    )
    .unwrap_or_default();
    let tfidf_hits = engine
        .tfidf()
        .map(|index| index.search(question, limit * 2, file_id))
        .unwrap_or_default();

    if !fts_or.is_empty() || !tfidf_hits.is_empty() {
        let fused = weighted_rrf_fusion(
            &[fts_or, tfidf_hits],
            &[1.0, 1.0],
            engine.settings().rrf_k,
            limit,
        );
        if !fused.is_empty() {
            return Some(RetrievalOutcome {
                hits: fused,
                method: tag("hybrid"),
                context_hits: Vec::new(),
            });
        }
    }

    None
}

fn word_boundary_filter(
    rows: Vec<(SearchResult, String)>,
    keywords: &[String],
    limit: usize,
) -> Vec<SearchResult> {
    let patterns: Vec<Regex> = keywords
        .iter()
        .filter_map(|kw| Regex::new(&format!(r"(?i)\b{}\b", regex::escape(kw))).ok())
        .collect();

    rows.into_iter()
        .filter(|(_, text)| patterns.iter().any(|re| re.is_match(text)))
        .map(|(result, _)| result)
        .take(limit)
        .collect()
}

/// Retrieves hits for a question: parallel hybrid first, then the staged
/// fallback ladder. Returns the fused hits, a stage tag, and the raw
/// context hits for prompt assembly.
#[must_use]
pub fn retrieve_with_fallback(engine: &Engine, question: &str, limit: usize) -> RetrievalOutcome {
    // Stage 0: document-scoped search when the query names a file
    let reference = crate::synonyms::detect_document_reference(engine.store(), question)
        .unwrap_or_else(|e| {
            warn!(error = %e, "document reference detection failed");
            None
        });

    if let Some(reference) = reference {
        debug!(
            file_id = reference.file_id,
            name = %reference.matched_name,
            "document reference detected"
        );
        if let Some(outcome) = fallback_ladder(
            engine,
            &reference.remaining_query,
            limit,
            Some(reference.file_id),
        ) {
            return outcome;
        }
        // Scoped search found nothing; fall through to the global path
    }

    let outcome = parallel_hybrid_retrieve(engine, question, limit, None);
    if !outcome.hits.is_empty() {
        let table_results = query_wage_tables(engine, question, None);
        if table_results.is_empty() {
            return outcome;
        }
        let fused = weighted_rrf_fusion(
            &[table_results, outcome.hits],
            &[WAGE_TABLE_WEIGHT, 1.0],
            engine.settings().rrf_k,
            limit,
        );
        return RetrievalOutcome {
            hits: fused,
            method: format!("{}+tables", outcome.method),
            context_hits: outcome.context_hits,
        };
    }

    fallback_ladder(engine, question, limit, None).unwrap_or_else(RetrievalOutcome::empty)
}
