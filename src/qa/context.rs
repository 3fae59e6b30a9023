//! Token-budgeted context packing.
//!
//! Fused hits are turned into `[Source i]` blocks in rank order, preferring
//! chunk/semantic raw data (which carries heading metadata) over plain page
//! text, truncating at sentence boundaries, and stopping when the total
//! character budget is exhausted.

use std::collections::HashMap;

use crate::error::Result;
use crate::models::{Citation, Hit, SearchResult};
use crate::storage::Store;

/// Output of context packing.
#[derive(Debug, Clone, Default)]
pub struct PackedContext {
    /// One formatted block per packed source.
    pub parts: Vec<String>,
    /// Provisional citation per packed source.
    pub citations: Vec<Citation>,
    /// First heading seen among the packed chunk hits.
    pub detected_heading: Option<String>,
    /// Whether the budget cut packing short.
    pub truncated: bool,
}

impl PackedContext {
    /// Joins the blocks into the prompt context string.
    #[must_use]
    pub fn joined(&self) -> String {
        self.parts.join("\n---\n")
    }
}

/// Truncates text at the nearest sentence boundary within `max_chars`,
/// falling back to the last word boundary at >= 80% of the cap.
#[must_use]
pub fn truncate_at_sentence(text: &str, max_chars: usize) -> String {
    let chars: Vec<char> = text.chars().collect();
    if chars.len() <= max_chars {
        return text.to_string();
    }

    let truncated: String = chars[..max_chars].iter().collect();

    // Look back up to 200 chars for sentence-ending punctuation
    let search_floor = max_chars.saturating_sub(200);
    let truncated_chars: Vec<char> = truncated.chars().collect();
    for i in (search_floor..truncated_chars.len()).rev() {
        let c = truncated_chars[i];
        if matches!(c, '.' | '!' | '?' | '\n') {
            let next_ok = truncated_chars
                .get(i + 1)
                .map_or(true, |n| matches!(n, ' ' | '\n' | '\t'));
            if next_ok {
                return truncated_chars[..=i].iter().collect();
            }
        }
    }

    // Word boundary fallback
    if let Some(last_space) = truncated.rfind(' ') {
        let chars_before = truncated[..last_space].chars().count();
        if chars_before * 10 >= max_chars * 8 {
            return truncated[..last_space].to_string();
        }
    }

    truncated
}

fn first_chars(text: &str, limit: usize) -> String {
    text.chars().take(limit).collect()
}

/// Packs fused hits into budgeted `[Source i]` context blocks.
///
/// `context_hits` supplies chunk/semantic raw data keyed by (file, page);
/// when present for a hit, the full chunk text and heading metadata are
/// used instead of the plain page text.
pub fn pack_context(
    store: &Store,
    results: &[SearchResult],
    context_hits: &[Hit],
    total_budget: usize,
    per_source_cap: usize,
) -> Result<PackedContext> {
    let mut packed = PackedContext::default();

    // First heading from the raw context hits (chunk metadata is the most
    // reliable heading source)
    packed.detected_heading = context_hits
        .iter()
        .find_map(|hit| hit.heading().map(str::to_string));

    let mut context_map: HashMap<(i64, u32), &Hit> = HashMap::new();
    for hit in context_hits {
        context_map.entry((hit.file_id(), hit.page())).or_insert(hit);
    }

    let mut total_chars = 0usize;

    for (i, result) in results.iter().enumerate() {
        if total_chars >= total_budget {
            packed.truncated = true;
            break;
        }

        let remaining = total_budget - total_chars;
        let source_limit = per_source_cap.min(remaining);
        let source_label = format!("Source {}", i + 1);

        let key = (result.file_id, result.page_number);
        let (part, citation) = if let Some(context) = context_map.get(&key) {
            // Prefer the stored full chunk text over the snippet
            let text = match context.chunk_id() {
                Some(chunk_id) => store
                    .get_chunk(chunk_id)?
                    .map_or_else(|| context.text().to_string(), |chunk| chunk.text),
                None => context.text().to_string(),
            };
            let preview = truncate_at_sentence(&text, source_limit);

            let mut heading_info = String::new();
            if let Some(heading) = context.heading() {
                if let Some(parent) = context.parent_heading() {
                    heading_info.push_str(&format!("\nPARENT: {parent}"));
                }
                heading_info.push_str(&format!("\nHEADING: {heading}"));
                if let Some(section) = context.section_number() {
                    heading_info.push_str(&format!(" (Section {section})"));
                }
            }

            let page_start = context.page();
            let page_end = context.page_end();
            let page_range = if page_start == page_end {
                format!("Page {page_start}")
            } else {
                format!("Pages {page_start}-{page_end}")
            };

            let citation = Citation {
                file_id: result.file_id,
                file_path: result.file_path.clone(),
                filename: result.filename.clone(),
                page_number: result.page_number,
                cited_text: first_chars(&preview, 200),
            };
            (
                format!(
                    "[{source_label}] {}, {page_range}:{heading_info}\n{preview}\n",
                    result.filename
                ),
                citation,
            )
        } else {
            // Plain page text
            let Some(page_text) = store.get_page_text(result.file_id, result.page_number)? else {
                continue;
            };
            let preview = truncate_at_sentence(&page_text, source_limit);

            let citation = Citation {
                file_id: result.file_id,
                file_path: result.file_path.clone(),
                filename: result.filename.clone(),
                page_number: result.page_number,
                cited_text: first_chars(&preview, 200),
            };

            let part = if i == 0 && packed.detected_heading.is_some() {
                let heading = packed.detected_heading.as_deref().unwrap_or_default();
                format!(
                    "[{source_label}] {}, Page {}:\nHEADING: {heading}\n{preview}\n",
                    result.filename, result.page_number
                )
            } else {
                format!(
                    "[{source_label}] {}, Page {}:\n{preview}\n",
                    result.filename, result.page_number
                )
            };
            (part, citation)
        };

        // Whole blocks only: a block that would break the budget is dropped
        let part_len = part.chars().count();
        if total_chars + part_len > total_budget && !packed.parts.is_empty() {
            packed.truncated = true;
            break;
        }

        total_chars += part_len;
        packed.parts.push(part);
        packed.citations.push(citation);
    }

    Ok(packed)
}
