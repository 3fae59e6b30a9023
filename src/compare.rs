//! Multi-document topic comparison.
//!
//! Finds every occurrence of a topic term across selected documents and
//! returns `<mark>`-highlighted context windows with word-boundary-clean
//! edges, grouped per file.

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::models::FileStatus;
use crate::storage::Store;

/// Context window radius around each match, in characters.
const CONTEXT_RADIUS: usize = 50;

/// A single term occurrence with highlighted context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TermMatch {
    /// Page the match is on.
    pub page: u32,
    /// Character offset of the match within the page text.
    pub start: usize,
    /// Character offset just past the match.
    pub end: usize,
    /// Context window with the term wrapped in `<mark>` tags.
    pub context: String,
}

/// Summary of one compared document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComparedDocument {
    /// File id.
    pub file_id: i64,
    /// Filename.
    pub filename: String,
    /// Page count.
    pub page_count: usize,
}

/// A match attributed to its file, for the flat cross-document list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompareMatch {
    /// File id.
    pub file_id: i64,
    /// Filename.
    pub filename: String,
    /// Page number.
    pub page_number: u32,
    /// Highlighted context snippet.
    pub snippet: String,
}

/// Result of a multi-document comparison.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MultiCompareResult {
    /// Documents included (indexed files only).
    pub documents: Vec<ComparedDocument>,
    /// All matches across the documents.
    pub matches: Vec<CompareMatch>,
    /// The topic searched, if any.
    pub topic: Option<String>,
}

/// Finds all occurrences of a term across pages, with highlighted context.
#[must_use]
pub fn find_term_locations(pages: &[(u32, String)], term: &str) -> Vec<TermMatch> {
    let term_trimmed = term.trim();
    if term_trimmed.is_empty() {
        return Vec::new();
    }
    let term_lower = term_trimmed.to_lowercase();
    let term_chars = term_lower.chars().count();

    let mut matches = Vec::new();

    for (page_number, text) in pages {
        let chars: Vec<char> = text.chars().collect();
        let text_lower: String = text.to_lowercase();
        let lower_chars: Vec<char> = text_lower.chars().collect();

        let mut search_from = 0usize;
        while search_from + term_chars <= lower_chars.len() {
            let window: String = lower_chars[search_from..search_from + term_chars]
                .iter()
                .collect();
            if window != term_lower {
                search_from += 1;
                continue;
            }
            let pos = search_from;
            let match_end = pos + term_chars;

            // Context window, pulled in to word boundaries
            let mut context_start = pos.saturating_sub(CONTEXT_RADIUS);
            let mut context_end = (match_end + CONTEXT_RADIUS).min(chars.len());

            if context_start > 0 {
                if let Some(offset) = chars[context_start..pos].iter().position(|c| *c == ' ') {
                    context_start += offset + 1;
                }
            }
            if context_end < chars.len() {
                if let Some(offset) = chars[match_end..context_end]
                    .iter()
                    .rposition(|c| *c == ' ')
                {
                    context_end = match_end + offset;
                }
            }

            let before: String = chars[context_start..pos].iter().collect();
            let matched: String = chars[pos..match_end].iter().collect();
            let after: String = chars[match_end..context_end].iter().collect();

            matches.push(TermMatch {
                page: *page_number,
                start: pos,
                end: match_end,
                context: format!("{before}<mark>{matched}</mark>{after}"),
            });

            search_from = pos + 1;
        }
    }

    matches
}

/// Compares multiple documents, optionally filtering by topic.
///
/// Only indexed files participate; unknown or unindexed ids are skipped.
pub fn compare_documents_multi(
    store: &Store,
    doc_ids: &[i64],
    topic: Option<&str>,
) -> Result<MultiCompareResult> {
    let topic = topic.map(str::trim).filter(|t| !t.is_empty());
    let mut result = MultiCompareResult {
        topic: topic.map(str::to_string),
        ..MultiCompareResult::default()
    };

    for &file_id in doc_ids {
        let Some(file) = store.get_file(file_id)? else {
            continue;
        };
        if file.status != FileStatus::Indexed {
            continue;
        }

        let pages = store.get_document_pages(file_id)?;
        result.documents.push(ComparedDocument {
            file_id,
            filename: file.filename.clone(),
            page_count: pages.len(),
        });

        if let Some(topic) = topic {
            for term_match in find_term_locations(&pages, topic) {
                result.matches.push(CompareMatch {
                    file_id,
                    filename: file.filename.clone(),
                    page_number: term_match.page,
                    snippet: term_match.context,
                });
            }
        }
    }

    Ok(result)
}
