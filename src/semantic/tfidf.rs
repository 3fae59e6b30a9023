//! TF-IDF page index.
//!
//! The last-resort retriever: a sparse TF-IDF matrix over indexed pages
//! (unigrams + bigrams, sublinear tf, document-frequency bounds, capped
//! vocabulary), persisted as JSON under the index directory. Unlike the
//! dense collection it needs no model, so it is always rebuildable.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::Result;
use crate::models::{RebuildReport, SearchResult};
use crate::storage::Store;

/// Vocabulary cap, matching common retrieval practice for small corpora.
pub const MAX_FEATURES: usize = 10_000;

/// Terms in more than this fraction of documents are dropped.
pub const MAX_DF_RATIO: f64 = 0.95;

/// Index filename under the index directory.
pub const INDEX_FILENAME: &str = "tfidf_index.json";

/// Metadata for one indexed page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageMeta {
    /// Page row id.
    pub page_id: i64,
    /// Owning file id.
    pub file_id: i64,
    /// Page number.
    pub page_number: u32,
    /// Owning filename.
    pub filename: String,
    /// Owning file path.
    pub file_path: String,
    /// Leading snippet of the page text.
    pub snippet: String,
}

/// A sparse L2-normalized vector: (term id, weight) pairs sorted by term id.
type SparseVec = Vec<(u32, f32)>;

/// Persisted TF-IDF index.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TfidfIndex {
    vocabulary: HashMap<String, u32>,
    idf: Vec<f32>,
    rows: Vec<SparseVec>,
    meta: Vec<PageMeta>,
}

fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.len() > 1)
        .map(str::to_string)
        .collect()
}

/// Unigrams plus adjacent bigrams.
fn terms_of(text: &str) -> Vec<String> {
    let tokens = tokenize(text);
    let mut terms = tokens.clone();
    for pair in tokens.windows(2) {
        terms.push(format!("{} {}", pair[0], pair[1]));
    }
    terms
}

fn sparse_dot(a: &SparseVec, b: &SparseVec) -> f32 {
    let mut sum = 0.0;
    let (mut i, mut j) = (0, 0);
    while i < a.len() && j < b.len() {
        match a[i].0.cmp(&b[j].0) {
            std::cmp::Ordering::Less => i += 1,
            std::cmp::Ordering::Greater => j += 1,
            std::cmp::Ordering::Equal => {
                sum += a[i].1 * b[j].1;
                i += 1;
                j += 1;
            }
        }
    }
    sum
}

fn normalize(vec: &mut SparseVec) {
    let norm: f32 = vec.iter().map(|(_, w)| w * w).sum::<f32>().sqrt();
    if norm > 0.0 {
        for (_, w) in vec.iter_mut() {
            *w /= norm;
        }
    }
}

impl TfidfIndex {
    /// Number of indexed pages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the index holds no pages.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Vocabulary size.
    #[must_use]
    pub fn vocabulary_size(&self) -> usize {
        self.vocabulary.len()
    }

    /// Builds the index from all indexed pages in the store.
    pub fn build(
        store: &Store,
        mut progress: Option<&mut dyn FnMut(usize, usize, &str)>,
    ) -> Result<(Self, RebuildReport)> {
        let pages = store.all_indexed_pages()?;
        if pages.is_empty() {
            return Ok((
                Self::default(),
                RebuildReport {
                    success: false,
                    items_indexed: 0,
                    message: "No indexed pages found".to_string(),
                },
            ));
        }

        let total = pages.len();
        if let Some(cb) = progress.as_mut() {
            cb(0, total, "Starting TF-IDF vectorization...");
        }

        // Pass 1: document frequencies
        let mut df: HashMap<String, usize> = HashMap::new();
        let mut page_terms: Vec<Vec<String>> = Vec::with_capacity(total);
        for (i, (_, _, _, text, _, _)) in pages.iter().enumerate() {
            let terms = terms_of(text);
            let mut seen: Vec<&String> = terms.iter().collect();
            seen.sort_unstable();
            seen.dedup();
            for term in seen {
                *df.entry(term.clone()).or_insert(0) += 1;
            }
            page_terms.push(terms);
            if let Some(cb) = progress.as_mut() {
                if (i + 1) % 100 == 0 {
                    cb(i + 1, total, &format!("Preparing texts: {}/{total}", i + 1));
                }
            }
        }

        // Vocabulary: drop near-ubiquitous terms, keep the most frequent
        let max_df = ((total as f64) * MAX_DF_RATIO).ceil() as usize;
        let mut candidates: Vec<(String, usize)> = df
            .into_iter()
            .filter(|(_, count)| *count <= max_df || total < 3)
            .collect();
        candidates.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        candidates.truncate(MAX_FEATURES);

        let vocabulary: HashMap<String, u32> = candidates
            .iter()
            .enumerate()
            .map(|(idx, (term, _))| (term.clone(), idx as u32))
            .collect();

        let idf: Vec<f32> = {
            let mut idf = vec![0.0f32; vocabulary.len()];
            for (term, count) in &candidates {
                if let Some(&id) = vocabulary.get(term) {
                    idf[id as usize] =
                        ((1.0 + total as f64) / (1.0 + *count as f64)).ln() as f32 + 1.0;
                }
            }
            idf
        };

        if let Some(cb) = progress.as_mut() {
            cb(total, total, "Building TF-IDF matrix...");
        }

        // Pass 2: sublinear tf * idf rows, L2-normalized
        let mut rows = Vec::with_capacity(total);
        let mut meta = Vec::with_capacity(total);

        for (terms, (page_id, file_id, page_number, text, filename, path)) in
            page_terms.into_iter().zip(pages)
        {
            let mut counts: HashMap<u32, f32> = HashMap::new();
            for term in terms {
                if let Some(&id) = vocabulary.get(&term) {
                    *counts.entry(id).or_insert(0.0) += 1.0;
                }
            }
            let mut row: SparseVec = counts
                .into_iter()
                .map(|(id, tf)| (id, (1.0 + tf.ln()) * idf[id as usize]))
                .collect();
            row.sort_unstable_by_key(|(id, _)| *id);
            normalize(&mut row);

            rows.push(row);
            meta.push(PageMeta {
                page_id,
                file_id,
                page_number,
                filename,
                file_path: path,
                snippet: text.chars().take(200).collect(),
            });
        }

        let index = Self {
            vocabulary,
            idf,
            rows,
            meta,
        };
        let report = RebuildReport {
            success: true,
            items_indexed: total,
            message: format!("Successfully indexed {total} pages"),
        };
        info!(pages = total, vocab = index.vocabulary_size(), "TF-IDF index built");
        Ok((index, report))
    }

    /// Embeds a query into the index's term space.
    fn embed_query(&self, query: &str) -> SparseVec {
        let mut counts: HashMap<u32, f32> = HashMap::new();
        for term in terms_of(query) {
            if let Some(&id) = self.vocabulary.get(&term) {
                *counts.entry(id).or_insert(0.0) += 1.0;
            }
        }
        let mut vec: SparseVec = counts
            .into_iter()
            .map(|(id, tf)| (id, (1.0 + tf.ln()) * self.idf[id as usize]))
            .collect();
        vec.sort_unstable_by_key(|(id, _)| *id);
        normalize(&mut vec);
        vec
    }

    /// Cosine-similarity search over the indexed pages.
    ///
    /// Pages with zero similarity are skipped; results are sorted by
    /// similarity descending with (file id, page) as the deterministic
    /// tiebreaker.
    #[must_use]
    pub fn search(&self, query: &str, limit: usize, file_id: Option<i64>) -> Vec<SearchResult> {
        if self.is_empty() {
            return Vec::new();
        }

        let query_vec = self.embed_query(query);
        if query_vec.is_empty() {
            return Vec::new();
        }

        let mut scored: Vec<(f32, &PageMeta)> = self
            .rows
            .iter()
            .zip(&self.meta)
            .filter(|(_, meta)| file_id.map_or(true, |fid| meta.file_id == fid))
            .map(|(row, meta)| (sparse_dot(&query_vec, row), meta))
            .filter(|(score, _)| *score > 0.0)
            .collect();

        scored.sort_by(|a, b| {
            b.0.partial_cmp(&a.0)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| (a.1.file_id, a.1.page_number).cmp(&(b.1.file_id, b.1.page_number)))
        });

        scored
            .into_iter()
            .take(limit)
            .map(|(score, meta)| SearchResult {
                file_id: meta.file_id,
                file_path: meta.file_path.clone(),
                filename: meta.filename.clone(),
                page_number: meta.page_number,
                snippet: meta.snippet.clone(),
                score: f64::from(score),
            })
            .collect()
    }

    /// Default on-disk location under the index directory.
    #[must_use]
    pub fn default_path(index_dir: &Path) -> PathBuf {
        index_dir.join(INDEX_FILENAME)
    }

    /// Persists the index as JSON.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let json = serde_json::to_string(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Loads a previously saved index; `None` when the file is absent or
    /// unreadable.
    #[must_use]
    pub fn load(path: &Path) -> Option<Self> {
        let data = std::fs::read_to_string(path).ok()?;
        serde_json::from_str(&data).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::PageText;

    fn seeded_store() -> Store {
        let store = Store::in_memory().unwrap();
        store.init().unwrap();
        let id = store
            .insert_file("/tmp/a.pdf", "a.pdf", "hash", 0.0, 1)
            .unwrap();
        let pages = vec![
            PageText {
                page_number: 1,
                text: "Employees accrue sick leave credits every month of service.".to_string(),
                raw_text: String::new(),
            },
            PageText {
                page_number: 2,
                text: "The grievance procedure has three steps ending in arbitration.".to_string(),
                raw_text: String::new(),
            },
            PageText {
                page_number: 3,
                text: "Vacation entitlement increases with years of completed service."
                    .to_string(),
                raw_text: String::new(),
            },
        ];
        store.replace_file_content(id, &pages, &[], &[]).unwrap();
        store.set_file_indexed(id, 3).unwrap();
        store
    }

    #[test]
    fn test_build_and_search() {
        let store = seeded_store();
        let (index, report) = TfidfIndex::build(&store, None).unwrap();
        assert!(report.success);
        assert_eq!(index.len(), 3);

        let hits = index.search("grievance arbitration", 3, None);
        assert!(!hits.is_empty());
        assert_eq!(hits[0].page_number, 2);
    }

    #[test]
    fn test_search_no_vocabulary_match() {
        let store = seeded_store();
        let (index, _) = TfidfIndex::build(&store, None).unwrap();
        assert!(index.search("zzz qqq", 3, None).is_empty());
    }

    #[test]
    fn test_search_file_scope() {
        let store = seeded_store();
        let (index, _) = TfidfIndex::build(&store, None).unwrap();
        assert!(index.search("grievance", 3, Some(999)).is_empty());
    }

    #[test]
    fn test_empty_store() {
        let store = Store::in_memory().unwrap();
        store.init().unwrap();
        let (index, report) = TfidfIndex::build(&store, None).unwrap();
        assert!(!report.success);
        assert!(index.is_empty());
        assert!(index.search("anything", 3, None).is_empty());
    }

    #[test]
    fn test_save_load_round_trip() {
        let store = seeded_store();
        let (index, _) = TfidfIndex::build(&store, None).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = TfidfIndex::default_path(dir.path());
        index.save(&path).unwrap();

        let loaded = TfidfIndex::load(&path).unwrap();
        assert_eq!(loaded.len(), index.len());
        assert_eq!(loaded.vocabulary_size(), index.vocabulary_size());

        let a = index.search("sick leave", 3, None);
        let b = loaded.search("sick leave", 3, None);
        assert_eq!(a.len(), b.len());
        if let (Some(x), Some(y)) = (a.first(), b.first()) {
            assert_eq!(x.page_number, y.page_number);
        }
    }

    #[test]
    fn test_load_missing_file() {
        assert!(TfidfIndex::load(Path::new("/nonexistent/tfidf.json")).is_none());
    }

    #[test]
    fn test_bigrams_in_vocabulary() {
        let store = seeded_store();
        let (index, _) = TfidfIndex::build(&store, None).unwrap();
        assert!(index.vocabulary.contains_key("sick leave"));
    }
}
