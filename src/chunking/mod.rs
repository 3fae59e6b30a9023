//! Semantic chunking based on document structure.
//!
//! Chunks are cut at Article/Section boundaries with a size ceiling, carry
//! their heading context, and are prefixed with a word-aligned overlap from
//! the predecessor so cross-boundary sentences survive retrieval. Tables
//! get dedicated chunks that are never size-split.

use serde::{Deserialize, Serialize};

use crate::error::{ChunkingError, Result};
use crate::extract::{extract_section_number, StructuredPage, TableData};

/// Maximum characters per text chunk.
pub const DEFAULT_MAX_CHUNK_SIZE: usize = 2000;

/// Minimum accumulated characters before a heading flushes a chunk.
pub const DEFAULT_MIN_CHUNK_SIZE: usize = 200;

/// Target overlap carried from the previous chunk.
pub const DEFAULT_OVERLAP_SIZE: usize = 200;

/// Kind of content a chunk holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkType {
    /// Running text.
    Text,
    /// A markdown-rendered table.
    Table,
}

impl ChunkType {
    /// Database string representation.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Table => "table",
        }
    }

    /// Parses the database string representation.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        if s == "table" {
            Self::Table
        } else {
            Self::Text
        }
    }
}

/// A semantic chunk of document content with metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentChunk {
    /// Per-file sequence number (1-indexed).
    pub chunk_number: u32,
    /// Chunk text, including any overlap prefix.
    pub text: String,
    /// Current section heading.
    pub heading: Option<String>,
    /// Parent heading (the Article a Section belongs to).
    pub parent_heading: Option<String>,
    /// Extracted section/article number.
    pub section_number: Option<String>,
    /// First page covered.
    pub page_start: u32,
    /// Last page covered.
    pub page_end: u32,
    /// All headings spanning the chunk.
    pub headings_in_chunk: Vec<String>,
    /// Text or table.
    pub chunk_type: ChunkType,
}

/// Chunking configuration.
#[derive(Debug, Clone, Copy)]
pub struct ChunkConfig {
    /// Maximum characters per chunk before a forced flush.
    pub max_chunk_size: usize,
    /// Minimum accumulated characters before a heading flushes.
    pub min_chunk_size: usize,
    /// Overlap carried between consecutive chunks.
    pub overlap_size: usize,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            max_chunk_size: DEFAULT_MAX_CHUNK_SIZE,
            min_chunk_size: DEFAULT_MIN_CHUNK_SIZE,
            overlap_size: DEFAULT_OVERLAP_SIZE,
        }
    }
}

impl ChunkConfig {
    fn validate(&self) -> Result<()> {
        if self.max_chunk_size == 0 {
            return Err(ChunkingError::InvalidConfig {
                reason: "max_chunk_size must be > 0".to_string(),
            }
            .into());
        }
        if self.overlap_size >= self.max_chunk_size {
            return Err(ChunkingError::OverlapTooLarge {
                overlap: self.overlap_size,
                size: self.max_chunk_size,
            }
            .into());
        }
        Ok(())
    }
}

/// Running state while walking pages line by line.
struct ChunkBuilder {
    config: ChunkConfig,
    chunks: Vec<DocumentChunk>,
    chunk_number: u32,
    previous_chunk_text: String,
    current_lines: Vec<String>,
    current_heading: Option<String>,
    current_parent: Option<String>,
    current_section: Option<String>,
    current_headings: Vec<String>,
    current_page_start: u32,
}

impl ChunkBuilder {
    fn new(config: ChunkConfig) -> Self {
        Self {
            config,
            chunks: Vec::new(),
            chunk_number: 0,
            previous_chunk_text: String::new(),
            current_lines: Vec::new(),
            current_heading: None,
            current_parent: None,
            current_section: None,
            current_headings: Vec::new(),
            current_page_start: 1,
        }
    }

    fn accumulated_len(&self) -> usize {
        if self.current_lines.is_empty() {
            return 0;
        }
        let text_len: usize = self.current_lines.iter().map(|l| l.chars().count()).sum();
        text_len + self.current_lines.len() - 1
    }

    fn flush(&mut self, page_end: u32) {
        let current_text = self.current_lines.join("\n").trim().to_string();
        if current_text.is_empty() {
            self.current_lines.clear();
            return;
        }

        self.chunk_number += 1;
        let overlap = overlap_text(&self.previous_chunk_text, self.config.overlap_size);
        let text = if overlap.is_empty() {
            current_text.clone()
        } else {
            format!("{overlap}\n\n{current_text}")
        };

        self.chunks.push(DocumentChunk {
            chunk_number: self.chunk_number,
            text,
            heading: self.current_heading.clone(),
            parent_heading: self.current_parent.clone(),
            section_number: self.current_section.clone(),
            page_start: self.current_page_start,
            page_end,
            headings_in_chunk: self.current_headings.clone(),
            chunk_type: ChunkType::Text,
        });

        self.previous_chunk_text = current_text;
        self.current_lines.clear();
        self.current_headings.clear();
    }
}

/// Creates semantic chunks from structured pages with overlap.
///
/// Chunks are cut at level-1/2 heading boundaries once enough text has
/// accumulated, with a hard size ceiling as a fallback. Documents with no
/// detected headings fall back to one chunk per page. Table chunks are
/// appended after the text chunks.
///
/// # Errors
///
/// Returns an error when the configuration is invalid (zero chunk size or
/// overlap >= chunk size).
pub fn create_semantic_chunks(
    pages: &[StructuredPage],
    tables: &[TableData],
    config: ChunkConfig,
) -> Result<Vec<DocumentChunk>> {
    config.validate()?;

    let has_headings = pages.iter().any(|p| !p.headings.is_empty());

    let mut chunks = if has_headings {
        chunk_by_headings(pages, config)
    } else {
        chunk_by_pages(pages, config)
    };

    append_table_chunks(&mut chunks, tables);
    Ok(chunks)
}

/// Fallback: one chunk per page, each prefixed with overlap from the
/// previous page.
fn chunk_by_pages(pages: &[StructuredPage], config: ChunkConfig) -> Vec<DocumentChunk> {
    let mut chunks = Vec::with_capacity(pages.len());
    let mut previous_text = String::new();
    let mut chunk_number = 0;

    for page in pages {
        chunk_number += 1;
        let overlap = overlap_text(&previous_text, config.overlap_size);
        let text = if overlap.is_empty() {
            page.text.clone()
        } else {
            format!("{overlap}\n\n{}", page.text).trim().to_string()
        };
        chunks.push(DocumentChunk {
            chunk_number,
            text,
            heading: None,
            parent_heading: None,
            section_number: None,
            page_start: page.page_number,
            page_end: page.page_number,
            headings_in_chunk: Vec::new(),
            chunk_type: ChunkType::Text,
        });
        previous_text = page.text.clone();
    }

    chunks
}

fn chunk_by_headings(pages: &[StructuredPage], config: ChunkConfig) -> Vec<DocumentChunk> {
    let mut builder = ChunkBuilder::new(config);

    for page in pages {
        for (line_idx, line) in page.text.split('\n').enumerate() {
            let line_number = (line_idx + 1) as u32;
            let heading_match = page
                .headings
                .iter()
                .find(|h| h.line_number == line_number)
                .filter(|h| h.level <= 2);

            if let Some(heading) = heading_match {
                // A major heading starts a new chunk once enough text exists
                if builder.accumulated_len() >= config.min_chunk_size {
                    builder.flush(page.page_number);
                    builder.current_page_start = page.page_number;
                }

                if heading.level == 1 {
                    builder.current_parent = None;
                } else if builder.current_heading.is_some() {
                    builder.current_parent = builder.current_heading.clone();
                }
                builder.current_heading = Some(heading.text.clone());
                builder.current_section = extract_section_number(&heading.text);
                builder.current_headings.push(heading.text.clone());
            }

            builder.current_lines.push(line.to_string());

            if builder.accumulated_len() >= config.max_chunk_size {
                builder.flush(page.page_number);
                builder.current_page_start = page.page_number;
            }
        }
    }

    if let Some(last_page) = pages.last() {
        builder.flush(last_page.page_number);
    }

    builder.chunks
}

/// Appends one dedicated chunk per table. Tables keep their markdown whole
/// (no size split, no overlap) and adopt the nearest heading when the page
/// text did not supply one.
fn append_table_chunks(chunks: &mut Vec<DocumentChunk>, tables: &[TableData]) {
    let mut chunk_number = chunks.last().map_or(0, |c| c.chunk_number);

    let mut sorted: Vec<&TableData> = tables.iter().collect();
    sorted.sort_by_key(|t| (t.page_number, t.table_index));

    for table in sorted {
        chunk_number += 1;

        let mut heading = table.context_heading.clone();
        if heading.is_none() {
            // Nearest text chunk whose page range contains the table's page
            heading = chunks
                .iter()
                .rev()
                .filter(|c| c.chunk_type == ChunkType::Text)
                .find(|c| {
                    c.page_start <= table.page_number
                        && table.page_number <= c.page_end
                        && c.heading.is_some()
                })
                .and_then(|c| c.heading.clone());
        }

        chunks.push(DocumentChunk {
            chunk_number,
            text: table.markdown_text.clone(),
            heading: heading.clone(),
            parent_heading: None,
            section_number: None,
            page_start: table.page_number,
            page_end: table.page_number,
            headings_in_chunk: heading.into_iter().collect(),
            chunk_type: ChunkType::Table,
        });
    }
}

/// Returns the last `overlap_size` characters of `text`, trimmed forward to
/// the first word boundary so words are never split.
#[must_use]
pub fn overlap_text(text: &str, overlap_size: usize) -> String {
    if overlap_size == 0 || text.is_empty() {
        return String::new();
    }

    let chars: Vec<char> = text.chars().collect();
    if chars.len() <= overlap_size {
        return text.trim().to_string();
    }

    let mut overlap: String = chars[chars.len() - overlap_size..].iter().collect();

    // Drop the leading word fragment if the cut landed mid-word
    if let Some(space_idx) = overlap.find(' ') {
        let chars_before = overlap[..space_idx].chars().count();
        if chars_before > 0 && chars_before < overlap_size / 2 {
            overlap = overlap[space_idx + 1..].to_string();
        }
    }

    overlap.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::extract_from_raw_pages;

    fn pages_from(raw: &[&str]) -> Vec<StructuredPage> {
        let raw: Vec<String> = raw.iter().map(|s| (*s).to_string()).collect();
        extract_from_raw_pages(&raw).structured_pages
    }

    #[test]
    fn test_no_headings_one_chunk_per_page() {
        let pages = pages_from(&["plain body text one", "plain body text two"]);
        let chunks = create_semantic_chunks(&pages, &[], ChunkConfig::default()).unwrap();
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].page_start, 1);
        assert_eq!(chunks[1].page_start, 2);
        // Second chunk starts with overlap from the first page
        assert!(chunks[1].text.starts_with("plain body text one"));
    }

    #[test]
    fn test_heading_chunks_carry_context() {
        let body = "Employees accrue one day of sick leave per month worked. ".repeat(5);
        let raw1 = format!("ARTICLE 5 — SICK LEAVE\n{body}");
        let raw2 = format!("ARTICLE 6 — VACATION\n{body}");
        let pages = pages_from(&[&raw1, &raw2]);
        let chunks = create_semantic_chunks(&pages, &[], ChunkConfig::default()).unwrap();

        assert!(chunks.len() >= 2);
        assert_eq!(chunks[0].heading.as_deref(), Some("ARTICLE 5 — SICK LEAVE"));
        let last = chunks.last().unwrap();
        assert_eq!(last.heading.as_deref(), Some("ARTICLE 6 — VACATION"));
    }

    #[test]
    fn test_parent_heading_tracking() {
        let body = "Body sentence that is repeated to accumulate sufficient size. ".repeat(5);
        let raw = format!("ARTICLE 7 — HOURS OF WORK\n{body}\n7.01 Overtime\n{body}");
        let pages = pages_from(&[&raw]);
        let chunks = create_semantic_chunks(&pages, &[], ChunkConfig::default()).unwrap();

        let overtime_chunk = chunks
            .iter()
            .find(|c| c.heading.as_deref() == Some("7.01 Overtime"))
            .unwrap();
        assert_eq!(
            overtime_chunk.parent_heading.as_deref(),
            Some("ARTICLE 7 — HOURS OF WORK")
        );
        assert_eq!(overtime_chunk.section_number.as_deref(), Some("7.01"));
    }

    #[test]
    fn test_size_forced_flush() {
        let line = "x".repeat(100);
        let mut body = String::from("ARTICLE 1 — LONG\n");
        for _ in 0..40 {
            body.push_str(&line);
            body.push('\n');
        }
        let pages = pages_from(&[&body]);
        let config = ChunkConfig::default();
        let chunks = create_semantic_chunks(&pages, &[], config).unwrap();

        assert!(chunks.len() >= 2, "oversized section must split");
        for chunk in &chunks {
            // Overlap prefix plus a final line can exceed the cap slightly,
            // but no chunk should run far past it
            assert!(chunk.text.chars().count() <= config.max_chunk_size + config.overlap_size + 200);
        }
    }

    #[test]
    fn test_overlap_is_word_aligned() {
        let text = format!("{} final words survive", "lead ".repeat(100));
        let overlap = overlap_text(&text, 200);
        assert!(overlap.chars().count() <= 200);
        assert!(!overlap.starts_with(' '));
        // The cut never leaves a leading half-word when a boundary is near
        assert!(overlap.ends_with("final words survive"));
    }

    #[test]
    fn test_overlap_short_text_returned_whole() {
        assert_eq!(overlap_text("short text", 200), "short text");
    }

    #[test]
    fn test_overlap_zero_size() {
        assert_eq!(overlap_text("anything", 0), "");
    }

    #[test]
    fn test_table_chunks_appended() {
        let raw = "ARTICLE 22 — WAGES\nRates below.\nClassification    Rate\nLabourer    $28.50\nOperator    $31.00";
        let doc = extract_from_raw_pages(&[raw.to_string()]);
        let chunks =
            create_semantic_chunks(&doc.structured_pages, &doc.tables, ChunkConfig::default())
                .unwrap();

        let table_chunk = chunks
            .iter()
            .find(|c| c.chunk_type == ChunkType::Table)
            .unwrap();
        assert!(table_chunk.text.contains("$28.50"));
        assert_eq!(
            table_chunk.heading.as_deref(),
            Some("ARTICLE 22 — WAGES")
        );
        // Table chunks carry no overlap
        assert!(table_chunk.text.starts_with('|'));
    }

    #[test]
    fn test_table_chunk_adopts_nearest_heading() {
        let table = TableData {
            page_number: 1,
            table_index: 0,
            headers: vec!["Step".to_string(), "Rate".to_string()],
            rows: vec![vec!["1".to_string(), "$20.00".to_string()]],
            markdown_text: "| Step | Rate |".to_string(),
            context_heading: None,
            is_wage_table: true,
        };
        let body = "Wage details are below for all classifications covered. ".repeat(5);
        let raw = format!("ARTICLE 22 — WAGES\n{body}");
        let pages = pages_from(&[&raw]);
        let chunks = create_semantic_chunks(&pages, &[table], ChunkConfig::default()).unwrap();

        let table_chunk = chunks
            .iter()
            .find(|c| c.chunk_type == ChunkType::Table)
            .unwrap();
        assert_eq!(table_chunk.heading.as_deref(), Some("ARTICLE 22 — WAGES"));
    }

    #[test]
    fn test_invalid_config() {
        let config = ChunkConfig {
            max_chunk_size: 100,
            min_chunk_size: 10,
            overlap_size: 100,
        };
        assert!(create_semantic_chunks(&[], &[], config).is_err());

        let config = ChunkConfig {
            max_chunk_size: 0,
            min_chunk_size: 0,
            overlap_size: 0,
        };
        assert!(create_semantic_chunks(&[], &[], config).is_err());
    }

    #[test]
    fn test_chunk_numbers_sequential() {
        let pages = pages_from(&["page one text", "page two text", "page three text"]);
        let chunks = create_semantic_chunks(&pages, &[], ChunkConfig::default()).unwrap();
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.chunk_number, (i + 1) as u32);
        }
    }

    #[test]
    fn test_cleaned_text_coverage() {
        // Every character of the cleaned page text appears in some chunk
        let body = "Unique sentence about grievance arbitration procedures here. ".repeat(4);
        let raw = format!("ARTICLE 9 — GRIEVANCE\n{body}");
        let pages = pages_from(&[&raw]);
        let chunks = create_semantic_chunks(&pages, &[], ChunkConfig::default()).unwrap();

        let all_text: String = chunks.iter().map(|c| c.text.as_str()).collect();
        for line in pages[0].text.split('\n') {
            assert!(all_text.contains(line.trim()), "missing line: {line}");
        }
    }
}
