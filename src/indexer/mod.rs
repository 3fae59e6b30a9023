//! Per-file indexing pipeline.
//!
//! `index_file` drives extraction -> storage -> chunking -> embeddings for
//! one file, flipping its status through indexing -> indexed (or error).
//! All derived rows are replaced in a single transaction, so readers never
//! observe a half-indexed file. `reindex_all` batches over every tracked
//! file, counting per-file failures without aborting.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::chunking::{create_semantic_chunks, ChunkConfig};
use crate::engine::Engine;
use crate::error::{Error, Result, StorageError};
use crate::extract::{self, ExtractedDocument};
use crate::models::{FileStatus, IndexReport};
use crate::semantic::add_chunk_embedding;

/// Options for indexing.
#[derive(Debug, Clone, Copy)]
pub struct IndexOptions {
    /// Run structure-aware chunking (default true).
    pub use_structure: bool,
    /// Build dense embeddings per chunk (default false; rebuilds are the
    /// usual bulk path).
    pub build_embeddings: bool,
}

impl Default for IndexOptions {
    fn default() -> Self {
        Self {
            use_structure: true,
            build_embeddings: false,
        }
    }
}

/// Result of a reindex-all batch.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReindexReport {
    /// Files indexed successfully.
    pub success: usize,
    /// Files that failed.
    pub failed: usize,
    /// Per-file error messages.
    pub errors: Vec<(i64, String)>,
}

/// Indexes one file from disk.
///
/// # Errors
///
/// Returns an error when the file row is missing, extraction fails, or a
/// storage write fails. The file's status reflects the failure.
pub fn index_file(engine: &Engine, file_id: i64, opts: &IndexOptions) -> Result<IndexReport> {
    let file = engine
        .store()
        .get_file(file_id)?
        .ok_or_else(|| StorageError::FileNotFound {
            identifier: file_id.to_string(),
        })?;

    engine
        .store()
        .set_file_status(file_id, FileStatus::Indexing, None)?;

    let document = match extract::extract(Path::new(&file.path)) {
        Ok(document) => document,
        Err(e) => {
            engine
                .store()
                .set_file_status(file_id, FileStatus::Error, Some(&e.to_string()))?;
            return Err(e.into());
        }
    };

    match index_extracted(engine, file_id, &document, opts) {
        Ok(report) => Ok(report),
        Err(e) => {
            engine
                .store()
                .set_file_status(file_id, FileStatus::Error, Some(&e.to_string()))?;
            Err(e)
        }
    }
}

/// Stores an already-extracted document for a file.
///
/// Split out from [`index_file`] so ingestion is testable without PDF
/// fixtures. Performs steps 3-8 of the pipeline: replace derived rows in
/// one transaction, optionally build embeddings, then mark indexed.
pub fn index_extracted(
    engine: &Engine,
    file_id: i64,
    document: &ExtractedDocument,
    opts: &IndexOptions,
) -> Result<IndexReport> {
    let store = engine.store();

    let chunks = if opts.use_structure {
        match create_semantic_chunks(
            &document.structured_pages,
            &document.tables,
            ChunkConfig {
                max_chunk_size: engine.settings().chunk_max_size,
                min_chunk_size: engine.settings().chunk_min_size,
                overlap_size: engine.settings().chunk_overlap,
            },
        ) {
            Ok(chunks) => chunks,
            Err(e) => {
                // Page-only indexing still works without structure
                warn!(file_id, error = %e, "structure chunking failed");
                Vec::new()
            }
        }
    } else {
        Vec::new()
    };

    let (pages, chunk_count) =
        store.replace_file_content(file_id, &document.pages, &document.tables, &chunks)?;

    let mut embeddings = 0usize;
    if opts.build_embeddings && chunk_count > 0 {
        match store.chunks_for_file(file_id) {
            Ok(stored_chunks) => {
                for chunk in &stored_chunks {
                    match add_chunk_embedding(store, engine.embedder(), chunk) {
                        Ok(()) => embeddings += 1,
                        Err(e) => {
                            warn!(file_id, chunk_id = chunk.id, error = %e, "embedding failed");
                        }
                    }
                }
            }
            Err(e) => warn!(file_id, error = %e, "embedding pass skipped"),
        }
    }

    if pages == 0 {
        let message = "extraction produced no pages";
        store.set_file_status(file_id, FileStatus::Error, Some(message))?;
        return Err(Error::InvalidState {
            message: message.to_string(),
        });
    }

    store.set_file_indexed(file_id, pages)?;
    info!(file_id, pages, chunks = chunk_count, embeddings, "file indexed");

    Ok(IndexReport {
        pages,
        chunks: chunk_count,
        embeddings,
    })
}

/// Reindexes every tracked file. A per-file failure increments the error
/// counter but does not abort the batch.
pub fn reindex_all(engine: &Engine, opts: &IndexOptions) -> Result<ReindexReport> {
    let files = engine.store().list_files()?;
    let mut report = ReindexReport::default();

    for file in files {
        match index_file(engine, file.id, opts) {
            Ok(_) => report.success += 1,
            Err(e) => {
                report.failed += 1;
                report.errors.push((file.id, e.to_string()));
            }
        }
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use crate::extract::extract_from_raw_pages;

    fn engine() -> Engine {
        Engine::in_memory(Settings::default()).unwrap()
    }

    fn sample_document() -> ExtractedDocument {
        extract_from_raw_pages(&[
            "ARTICLE 5 — SICK LEAVE\nEmployees are entitled to five days of sick leave per year, accrued monthly and usable for personal illness or family care responsibilities as defined here."
                .to_string(),
            "SCHEDULE A\nClassification    Hourly Rate\nLabourer    $28.50\nOperator    $31.00"
                .to_string(),
        ])
    }

    #[test]
    fn test_index_extracted_full() {
        let engine = engine();
        let id = engine
            .store()
            .insert_file("/tmp/a.pdf", "a.pdf", "hash", 0.0, 1)
            .unwrap();

        let report =
            index_extracted(&engine, id, &sample_document(), &IndexOptions::default()).unwrap();
        assert_eq!(report.pages, 2);
        assert!(report.chunks > 0);

        let file = engine.store().get_file(id).unwrap().unwrap();
        assert_eq!(file.status, FileStatus::Indexed);
        assert_eq!(file.pages, Some(2));
        assert!(file.extracted_at.is_some());

        // Invariant: page count, FTS rows and stored pages agree
        assert_eq!(engine.store().page_count(id).unwrap(), 2);
        assert_eq!(engine.store().fts_page_count(id).unwrap(), 2);

        // The wage table landed as a table row and a table chunk
        assert_eq!(engine.store().wage_tables(Some(id), 5).unwrap().len(), 1);
    }

    #[test]
    fn test_index_idempotent() {
        let engine = engine();
        let id = engine
            .store()
            .insert_file("/tmp/a.pdf", "a.pdf", "hash", 0.0, 1)
            .unwrap();

        let first =
            index_extracted(&engine, id, &sample_document(), &IndexOptions::default()).unwrap();
        let second =
            index_extracted(&engine, id, &sample_document(), &IndexOptions::default()).unwrap();

        assert_eq!(first.pages, second.pages);
        assert_eq!(first.chunks, second.chunks);
        assert_eq!(engine.store().page_count(id).unwrap(), 2);
        assert_eq!(engine.store().fts_page_count(id).unwrap(), 2);
        assert_eq!(engine.store().chunk_count(id).unwrap(), first.chunks);
    }

    #[test]
    fn test_index_with_embeddings() {
        let engine = engine();
        let id = engine
            .store()
            .insert_file("/tmp/a.pdf", "a.pdf", "hash", 0.0, 1)
            .unwrap();

        let opts = IndexOptions {
            use_structure: true,
            build_embeddings: true,
        };
        let report = index_extracted(&engine, id, &sample_document(), &opts).unwrap();
        assert!(report.embeddings > 0);
        assert_eq!(engine.store().vector_count().unwrap(), report.embeddings);
    }

    #[test]
    fn test_index_without_structure() {
        let engine = engine();
        let id = engine
            .store()
            .insert_file("/tmp/a.pdf", "a.pdf", "hash", 0.0, 1)
            .unwrap();

        let opts = IndexOptions {
            use_structure: false,
            build_embeddings: false,
        };
        let report = index_extracted(&engine, id, &sample_document(), &opts).unwrap();
        assert_eq!(report.chunks, 0);
        assert_eq!(report.pages, 2);
    }

    #[test]
    fn test_index_file_missing_row() {
        let engine = engine();
        let err = index_file(&engine, 12345, &IndexOptions::default());
        assert!(err.is_err());
    }

    #[test]
    fn test_index_file_unreadable_marks_error() {
        let engine = engine();
        let id = engine
            .store()
            .insert_file("/nonexistent/missing.pdf", "missing.pdf", "hash", 0.0, 1)
            .unwrap();

        let err = index_file(&engine, id, &IndexOptions::default());
        assert!(err.is_err());

        let file = engine.store().get_file(id).unwrap().unwrap();
        assert_eq!(file.status, FileStatus::Error);
        assert!(file.last_error.is_some());
    }

    #[test]
    fn test_reindex_all_counts_failures() {
        let engine = engine();
        engine
            .store()
            .insert_file("/nonexistent/a.pdf", "a.pdf", "h1", 0.0, 1)
            .unwrap();
        engine
            .store()
            .insert_file("/nonexistent/b.pdf", "b.pdf", "h2", 0.0, 1)
            .unwrap();

        let report = reindex_all(&engine, &IndexOptions::default()).unwrap();
        assert_eq!(report.success, 0);
        assert_eq!(report.failed, 2);
        assert_eq!(report.errors.len(), 2);
    }
}
