//! The dense-vector collection.
//!
//! Entries are keyed by stable ids (`chunk_<file_id>_<chunk_id>` /
//! `page_<file_id>_<page_id>`) and carry a metadata mirror of the fields
//! retrieval needs for filtering and citation. Similarity is cosine;
//! queries scan the stored vectors in parallel.

use rayon::prelude::*;
use tracing::info;

use crate::error::Result;
use crate::models::{RebuildReport, SearchResult, SemanticHit};
use crate::semantic::{cosine_similarity, Embedder};
use crate::storage::{Store, StoredChunk, VectorEntry};

/// Stored document text is truncated to this many characters.
pub const STORED_DOCUMENT_LIMIT: usize = 1000;

/// Texts are embedded at most this many characters long.
const EMBED_TEXT_LIMIT: usize = 2000;

/// Batch size for rebuild embedding.
pub const EMBED_BATCH_SIZE: usize = 32;

/// Options for semantic search.
#[derive(Debug, Clone, Default)]
pub struct SemanticOptions {
    /// Maximum results.
    pub limit: usize,
    /// Restrict to one file.
    pub file_id: Option<i64>,
    /// Skip page-level entries.
    pub chunks_only: bool,
}

fn truncate_chars(text: &str, limit: usize) -> String {
    text.chars().take(limit).collect()
}

/// Adds (or replaces) the embedding for one chunk.
pub fn add_chunk_embedding(
    store: &Store,
    embedder: &dyn Embedder,
    chunk: &StoredChunk,
) -> Result<()> {
    let embed_text = truncate_chars(&chunk.text, EMBED_TEXT_LIMIT);
    let embedding = embedder.embed(&embed_text, false)?;

    let entry = VectorEntry {
        id: format!("chunk_{}_{}", chunk.file_id, chunk.id),
        file_id: chunk.file_id,
        chunk_id: Some(chunk.id),
        page_id: None,
        page_number: chunk.page_start,
        page_start: chunk.page_start,
        page_end: chunk.page_end,
        filename: chunk.filename.clone(),
        file_path: chunk.file_path.clone(),
        heading: chunk.heading.clone(),
        is_page: false,
        document: truncate_chars(&chunk.text, STORED_DOCUMENT_LIMIT),
        embedding,
        model_name: Some(embedder.model_name().to_string()),
    };
    store.upsert_vector_entries(&[entry])
}

/// Adds (or replaces) the embedding for one page.
#[allow(clippy::too_many_arguments)]
pub fn add_page_embedding(
    store: &Store,
    embedder: &dyn Embedder,
    page_id: i64,
    file_id: i64,
    page_number: u32,
    text: &str,
    filename: &str,
    file_path: &str,
) -> Result<()> {
    let embed_text = truncate_chars(text, EMBED_TEXT_LIMIT);
    let embedding = embedder.embed(&embed_text, false)?;

    let entry = VectorEntry {
        id: format!("page_{file_id}_{page_id}"),
        file_id,
        chunk_id: None,
        page_id: Some(page_id),
        page_number,
        page_start: page_number,
        page_end: page_number,
        filename: filename.to_string(),
        file_path: file_path.to_string(),
        heading: None,
        is_page: true,
        document: truncate_chars(text, STORED_DOCUMENT_LIMIT),
        embedding,
        model_name: Some(embedder.model_name().to_string()),
    };
    store.upsert_vector_entries(&[entry])
}

/// Searches the collection for semantically similar content.
///
/// Similarity is `max(0, cosine)` mapped into [0, 1]; results come back
/// sorted by similarity descending.
pub fn search_semantic(
    store: &Store,
    embedder: &dyn Embedder,
    query: &str,
    opts: &SemanticOptions,
) -> Result<Vec<SemanticHit>> {
    let entries = store.vector_entries(opts.file_id, opts.chunks_only)?;
    if entries.is_empty() {
        return Ok(Vec::new());
    }

    let query_embedding = embedder.embed(query, true)?;

    let mut scored: Vec<(f32, &VectorEntry)> = entries
        .par_iter()
        .map(|entry| {
            (
                cosine_similarity(&query_embedding, &entry.embedding).max(0.0),
                entry,
            )
        })
        .collect();

    scored.sort_by(|a, b| {
        b.0.partial_cmp(&a.0)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.1.id.cmp(&b.1.id))
    });

    Ok(scored
        .into_iter()
        .take(opts.limit)
        .map(|(similarity, entry)| SemanticHit {
            file_id: entry.file_id,
            chunk_id: entry.chunk_id,
            page_number: entry.page_number,
            filename: entry.filename.clone(),
            file_path: entry.file_path.clone(),
            text: entry.document.clone(),
            heading: entry.heading.clone(),
            score: f64::from(similarity),
        })
        .collect())
}

/// Two-stage retrieval: bi-encoder candidates re-scored by the
/// cross-encoder. Falls back to bi-encoder order when the re-ranker is
/// unavailable or fails.
pub fn search_semantic_with_rerank(
    store: &Store,
    embedder: &dyn Embedder,
    query: &str,
    limit: usize,
    file_id: Option<i64>,
    initial_limit: usize,
) -> Result<Vec<SemanticHit>> {
    let candidates = search_semantic(
        store,
        embedder,
        query,
        &SemanticOptions {
            limit: initial_limit,
            file_id,
            chunks_only: false,
        },
    )?;

    if candidates.len() <= limit {
        return Ok(candidates);
    }

    rerank_candidates(query, candidates, limit)
}

#[cfg(feature = "fastembed-embeddings")]
fn rerank_candidates(
    query: &str,
    mut candidates: Vec<SemanticHit>,
    limit: usize,
) -> Result<Vec<SemanticHit>> {
    let documents: Vec<&str> = candidates.iter().map(|c| c.text.as_str()).collect();
    match crate::semantic::rerank::rerank_scores(query, &documents) {
        Ok(scores) => {
            let mut scored: Vec<(f32, SemanticHit)> =
                scores.into_iter().zip(candidates).collect();
            scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
            Ok(scored
                .into_iter()
                .take(limit)
                .map(|(score, mut hit)| {
                    hit.score = f64::from(score);
                    hit
                })
                .collect())
        }
        Err(e) => {
            tracing::warn!(error = %e, "re-ranking failed, using bi-encoder order");
            candidates.truncate(limit);
            Ok(candidates)
        }
    }
}

#[cfg(not(feature = "fastembed-embeddings"))]
fn rerank_candidates(
    _query: &str,
    mut candidates: Vec<SemanticHit>,
    limit: usize,
) -> Result<Vec<SemanticHit>> {
    candidates.truncate(limit);
    Ok(candidates)
}

/// Removes every collection entry belonging to a file.
pub fn delete_file_embeddings(store: &Store, file_id: i64) -> Result<usize> {
    let removed = store.delete_file_vectors(file_id)?;
    if removed > 0 {
        info!(file_id, removed, "deleted file embeddings");
    }
    Ok(removed)
}

/// Rebuilds the whole collection from indexed content.
///
/// Clears the collection, then re-embeds all chunks (or pages when
/// `use_chunks` is false) of indexed files in batches, reporting progress
/// through the callback.
pub fn rebuild_semantic_index(
    store: &Store,
    embedder: &dyn Embedder,
    use_chunks: bool,
    mut progress: Option<&mut dyn FnMut(usize, usize, &str)>,
) -> Result<RebuildReport> {
    store.clear_vectors()?;

    // (entry skeleton, text to embed) pairs in stable order
    let inputs: Vec<(VectorEntry, String)> = if use_chunks {
        store
            .all_indexed_chunks()?
            .into_iter()
            .map(|chunk| {
                let embed_text = truncate_chars(&chunk.text, EMBED_TEXT_LIMIT);
                let entry = VectorEntry {
                    id: format!("chunk_{}_{}", chunk.file_id, chunk.id),
                    file_id: chunk.file_id,
                    chunk_id: Some(chunk.id),
                    page_id: None,
                    page_number: chunk.page_start,
                    page_start: chunk.page_start,
                    page_end: chunk.page_end,
                    filename: chunk.filename,
                    file_path: chunk.file_path,
                    heading: chunk.heading,
                    is_page: false,
                    document: truncate_chars(&chunk.text, STORED_DOCUMENT_LIMIT),
                    embedding: Vec::new(),
                    model_name: None,
                };
                (entry, embed_text)
            })
            .collect()
    } else {
        store
            .all_indexed_pages()?
            .into_iter()
            .map(|(page_id, file_id, page_number, text, filename, path)| {
                let embed_text = truncate_chars(&text, EMBED_TEXT_LIMIT);
                let entry = VectorEntry {
                    id: format!("page_{file_id}_{page_id}"),
                    file_id,
                    chunk_id: None,
                    page_id: Some(page_id),
                    page_number,
                    page_start: page_number,
                    page_end: page_number,
                    filename,
                    file_path: path,
                    heading: None,
                    is_page: true,
                    document: truncate_chars(&text, STORED_DOCUMENT_LIMIT),
                    embedding: Vec::new(),
                    model_name: None,
                };
                (entry, embed_text)
            })
            .collect()
    };

    if inputs.is_empty() {
        return Ok(RebuildReport {
            success: false,
            items_indexed: 0,
            message: "No content found to index".to_string(),
        });
    }

    let total = inputs.len();
    if let Some(cb) = progress.as_mut() {
        cb(0, total, "Starting semantic indexing...");
    }

    let mut indexed = 0usize;
    for batch in inputs.chunks(EMBED_BATCH_SIZE) {
        let batch_texts: Vec<&str> = batch.iter().map(|(_, t)| t.as_str()).collect();
        let embeddings = embedder.embed_batch(&batch_texts, false)?;

        let entries: Vec<VectorEntry> = batch
            .iter()
            .zip(embeddings)
            .map(|((entry, _), embedding)| {
                let mut entry = entry.clone();
                entry.embedding = embedding;
                entry.model_name = Some(embedder.model_name().to_string());
                entry
            })
            .collect();

        store.upsert_vector_entries(&entries)?;
        indexed += batch.len();

        if let Some(cb) = progress.as_mut() {
            cb(indexed, total, &format!("Indexed {indexed}/{total} items..."));
        }
    }

    info!(indexed, use_chunks, "semantic index rebuilt");
    Ok(RebuildReport {
        success: true,
        items_indexed: indexed,
        message: format!("Successfully indexed {indexed} items"),
    })
}

/// Converts a semantic hit to the page-level result shape.
#[must_use]
pub fn semantic_to_search_result(hit: &SemanticHit) -> SearchResult {
    SearchResult {
        file_id: hit.file_id,
        file_path: hit.file_path.clone(),
        filename: hit.filename.clone(),
        page_number: hit.page_number,
        snippet: hit.text.clone(),
        score: hit.score,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunking::ChunkType;
    use crate::extract::PageText;
    use crate::models::FileStatus;
    use crate::semantic::FallbackEmbedder;

    fn seeded() -> (Store, i64) {
        let store = Store::in_memory().unwrap();
        store.init().unwrap();
        let id = store
            .insert_file("/tmp/a.pdf", "a.pdf", "hash", 0.0, 1)
            .unwrap();
        let pages = vec![
            PageText {
                page_number: 1,
                text: "Employees receive sick leave of five days each year.".to_string(),
                raw_text: String::new(),
            },
            PageText {
                page_number: 2,
                text: "Pension contributions are matched by the employer.".to_string(),
                raw_text: String::new(),
            },
        ];
        let chunks = vec![
            crate::chunking::DocumentChunk {
                chunk_number: 1,
                text: "Employees receive sick leave of five days each year.".to_string(),
                heading: Some("Article 5 — Sick Leave".to_string()),
                parent_heading: None,
                section_number: Some("5".to_string()),
                page_start: 1,
                page_end: 1,
                headings_in_chunk: vec![],
                chunk_type: ChunkType::Text,
            },
            crate::chunking::DocumentChunk {
                chunk_number: 2,
                text: "Pension contributions are matched by the employer.".to_string(),
                heading: Some("Article 12 — Pension".to_string()),
                parent_heading: None,
                section_number: Some("12".to_string()),
                page_start: 2,
                page_end: 2,
                headings_in_chunk: vec![],
                chunk_type: ChunkType::Text,
            },
        ];
        store.replace_file_content(id, &pages, &[], &chunks).unwrap();
        store.set_file_indexed(id, 2).unwrap();
        assert_eq!(store.get_file(id).unwrap().unwrap().status, FileStatus::Indexed);
        (store, id)
    }

    #[test]
    fn test_rebuild_and_search() {
        let (store, _) = seeded();
        let embedder = FallbackEmbedder::new(64);

        let report = rebuild_semantic_index(&store, &embedder, true, None).unwrap();
        assert!(report.success);
        assert_eq!(report.items_indexed, 2);
        assert_eq!(store.vector_count().unwrap(), 2);

        let hits = search_semantic(
            &store,
            &embedder,
            "sick leave days",
            &SemanticOptions {
                limit: 2,
                file_id: None,
                chunks_only: false,
            },
        )
        .unwrap();
        assert_eq!(hits.len(), 2);
        // Token overlap puts the sick-leave chunk first
        assert_eq!(hits[0].heading.as_deref(), Some("Article 5 — Sick Leave"));
        assert!(hits[0].score >= hits[1].score);
    }

    #[test]
    fn test_rebuild_progress_callback() {
        let (store, _) = seeded();
        let embedder = FallbackEmbedder::new(16);

        let mut calls = Vec::new();
        {
            let mut cb = |current: usize, total: usize, _msg: &str| {
                calls.push((current, total));
            };
            rebuild_semantic_index(&store, &embedder, true, Some(&mut cb)).unwrap();
        }
        assert_eq!(calls.first(), Some(&(0, 2)));
        assert_eq!(calls.last(), Some(&(2, 2)));
    }

    #[test]
    fn test_rebuild_empty_store() {
        let store = Store::in_memory().unwrap();
        store.init().unwrap();
        let embedder = FallbackEmbedder::new(16);
        let report = rebuild_semantic_index(&store, &embedder, true, None).unwrap();
        assert!(!report.success);
        assert_eq!(report.items_indexed, 0);
    }

    #[test]
    fn test_search_empty_collection() {
        let (store, _) = seeded();
        let embedder = FallbackEmbedder::new(16);
        let hits = search_semantic(
            &store,
            &embedder,
            "anything",
            &SemanticOptions {
                limit: 5,
                ..SemanticOptions::default()
            },
        )
        .unwrap();
        assert!(hits.is_empty());
    }

    #[test]
    fn test_add_and_delete_chunk_embedding() {
        let (store, id) = seeded();
        let embedder = FallbackEmbedder::new(16);

        let chunks = store.chunks_for_file(id).unwrap();
        add_chunk_embedding(&store, &embedder, &chunks[0]).unwrap();
        assert_eq!(store.vector_count().unwrap(), 1);

        // Upsert with the same stable id does not duplicate
        add_chunk_embedding(&store, &embedder, &chunks[0]).unwrap();
        assert_eq!(store.vector_count().unwrap(), 1);

        assert_eq!(delete_file_embeddings(&store, id).unwrap(), 1);
        assert_eq!(store.vector_count().unwrap(), 0);
    }

    #[test]
    fn test_page_rebuild() {
        let (store, _) = seeded();
        let embedder = FallbackEmbedder::new(16);
        let report = rebuild_semantic_index(&store, &embedder, false, None).unwrap();
        assert!(report.success);
        assert_eq!(report.items_indexed, 2);

        let hits = search_semantic(
            &store,
            &embedder,
            "pension employer",
            &SemanticOptions {
                limit: 1,
                file_id: None,
                chunks_only: true,
            },
        )
        .unwrap();
        // Pages only; chunks_only filters everything out
        assert!(hits.is_empty());
    }

    #[test]
    fn test_rerank_degrades_to_truncate() {
        let (store, _) = seeded();
        let embedder = FallbackEmbedder::new(32);
        rebuild_semantic_index(&store, &embedder, true, None).unwrap();

        let hits =
            search_semantic_with_rerank(&store, &embedder, "sick leave", 1, None, 50).unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[test]
    fn test_semantic_to_search_result() {
        let hit = SemanticHit {
            file_id: 1,
            chunk_id: Some(2),
            page_number: 3,
            filename: "a.pdf".to_string(),
            file_path: "/tmp/a.pdf".to_string(),
            text: "text".to_string(),
            heading: None,
            score: 0.8,
        };
        let sr = semantic_to_search_result(&hit);
        assert_eq!(sr.page_number, 3);
        assert!((sr.score - 0.8).abs() < f64::EPSILON);
    }
}
