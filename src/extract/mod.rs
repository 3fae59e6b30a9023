//! Structure-aware PDF extraction.
//!
//! Produces three views of a document:
//! - cleaned + raw text per page (headers/footers stripped from the cleaned
//!   variant only),
//! - structural annotations (detected headings per page),
//! - table grids with markdown renderings and wage flags.
//!
//! Extraction is deterministic: identical input bytes yield byte-identical
//! output.

pub mod headings;
pub mod normalize;
pub mod pdf;
pub mod tables;

use std::path::Path;

use serde::{Deserialize, Serialize};

pub use headings::{detect_heading, extract_section_number, Heading, HeadingKind};
pub use normalize::{dehyphenate, detect_repeated_lines, normalize_text, remove_repeated_lines};
pub use tables::{detect_wage_table, find_context_heading, format_table_as_markdown, TableData};

use crate::error::ExtractError;

/// Fraction of pages a line must appear on to count as a header/footer.
pub const REPEATED_LINE_THRESHOLD: f64 = 0.6;

/// Extracted text from a single PDF page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageText {
    /// Page number (1-indexed).
    pub page_number: u32,
    /// Cleaned text for indexing (headers/footers removed).
    pub text: String,
    /// Normalized but complete text for display.
    pub raw_text: String,
}

/// Page content with structural annotations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructuredPage {
    /// Page number (1-indexed).
    pub page_number: u32,
    /// Cleaned text.
    pub text: String,
    /// Normalized but complete text.
    pub raw_text: String,
    /// Headings detected on this page.
    pub headings: Vec<Heading>,
}

/// Full output of document extraction.
#[derive(Debug, Clone)]
pub struct ExtractedDocument {
    /// Per-page cleaned/raw text.
    pub pages: Vec<PageText>,
    /// Per-page structural annotations.
    pub structured_pages: Vec<StructuredPage>,
    /// All tables across the document.
    pub tables: Vec<TableData>,
}

/// Extracts a PDF with full structure analysis.
///
/// # Errors
///
/// Returns [`ExtractError`] when the file is unreadable.
pub fn extract(path: &Path) -> Result<ExtractedDocument, ExtractError> {
    let raw_pages = pdf::extract_raw_pages(path)?;
    Ok(extract_from_raw_pages(&raw_pages))
}

/// Runs the full extraction pipeline over pre-extracted raw page texts.
///
/// Split out from [`extract`] so the pipeline is testable without PDF
/// fixtures; the indexer and tests share this code path.
#[must_use]
pub fn extract_from_raw_pages(raw_pages: &[String]) -> ExtractedDocument {
    // Normalize all pages first so repeated-line detection is consistent
    let normalized: Vec<String> = raw_pages.iter().map(|p| normalize_text(p)).collect();

    let repeated = detect_repeated_lines(&normalized, REPEATED_LINE_THRESHOLD);

    let mut pages = Vec::with_capacity(raw_pages.len());
    let mut structured_pages = Vec::with_capacity(raw_pages.len());
    let mut all_tables = Vec::new();

    for (i, normalized_text) in normalized.iter().enumerate() {
        let page_number = (i + 1) as u32;
        let cleaned = if repeated.is_empty() {
            normalized_text.clone()
        } else {
            remove_repeated_lines(normalized_text, &repeated)
        };

        // Tables come from the raw text: whitespace columns are collapsed
        // away by normalization
        let page_tables = tables::extract_tables_from_page(&raw_pages[i], &cleaned, page_number);
        all_tables.extend(page_tables);

        let mut page_headings = Vec::new();
        for (line_idx, line) in cleaned.split('\n').enumerate() {
            if let Some(heading) = detect_heading(line, (line_idx + 1) as u32, page_number) {
                page_headings.push(heading);
            }
        }

        pages.push(PageText {
            page_number,
            text: cleaned.clone(),
            raw_text: normalized_text.clone(),
        });
        structured_pages.push(StructuredPage {
            page_number,
            text: cleaned,
            raw_text: normalized_text.clone(),
            headings: page_headings,
        });
    }

    ExtractedDocument {
        pages,
        structured_pages,
        tables: all_tables,
    }
}

/// A document outline entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutlineEntry {
    /// Heading level.
    pub level: u8,
    /// Heading text.
    pub text: String,
    /// Page number.
    pub page: u32,
    /// Recognition kind.
    pub kind: HeadingKind,
}

/// Generates a document outline (table of contents) from detected headings.
#[must_use]
pub fn get_document_outline(pages: &[StructuredPage]) -> Vec<OutlineEntry> {
    pages
        .iter()
        .flat_map(|page| {
            page.headings.iter().map(|h| OutlineEntry {
                level: h.level,
                text: h.text.clone(),
                page: h.page_number,
                kind: h.kind,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(pages: &[&str]) -> Vec<String> {
        pages.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn test_extract_from_raw_pages_basic() {
        let doc = extract_from_raw_pages(&raw(&[
            "ARTICLE 1 — RECOGNITION\nThe employer recognizes the union.",
            "ARTICLE 2 — WAGES\nRates are set out in Schedule A.",
        ]));
        assert_eq!(doc.pages.len(), 2);
        assert_eq!(doc.pages[0].page_number, 1);
        assert!(doc.structured_pages[0]
            .headings
            .iter()
            .any(|h| h.text.starts_with("ARTICLE 1")));
    }

    #[test]
    fn test_extraction_deterministic() {
        let input = raw(&[
            "ARTICLE 1\nem ployees re-\nceive pay",
            "footer\nbody one",
            "footer\nbody two",
            "footer\nbody three",
        ]);
        let a = extract_from_raw_pages(&input);
        let b = extract_from_raw_pages(&input);
        for (pa, pb) in a.pages.iter().zip(b.pages.iter()) {
            assert_eq!(pa.text, pb.text);
            assert_eq!(pa.raw_text, pb.raw_text);
        }
    }

    #[test]
    fn test_header_footer_stripped_from_cleaned_only() {
        let input = raw(&[
            "City Agreement 2024\npage one body",
            "City Agreement 2024\npage two body",
            "City Agreement 2024\npage three body",
            "City Agreement 2024\npage four body",
        ]);
        let doc = extract_from_raw_pages(&input);
        for page in &doc.pages {
            assert!(!page.text.contains("City Agreement 2024"));
            assert!(page.raw_text.contains("City Agreement 2024"));
        }
    }

    #[test]
    fn test_header_footer_skipped_below_three_pages() {
        let input = raw(&["Repeated\nbody a", "Repeated\nbody b"]);
        let doc = extract_from_raw_pages(&input);
        assert!(doc.pages[0].text.contains("Repeated"));
    }

    #[test]
    fn test_tables_detected_from_raw_text() {
        let input = raw(&[
            "SCHEDULE A\nClassification    Rate\nLabourer    $28.50\nOperator    $31.00",
        ]);
        let doc = extract_from_raw_pages(&input);
        assert_eq!(doc.tables.len(), 1);
        assert!(doc.tables[0].is_wage_table);
        assert_eq!(doc.tables[0].page_number, 1);
    }

    #[test]
    fn test_outline() {
        let doc = extract_from_raw_pages(&raw(&[
            "ARTICLE 1 — RECOGNITION\nbody\n7.01 Overtime\nbody",
        ]));
        let outline = get_document_outline(&doc.structured_pages);
        assert_eq!(outline.len(), 2);
        assert_eq!(outline[0].level, 1);
        assert_eq!(outline[1].level, 2);
    }

    #[test]
    fn test_empty_input() {
        let doc = extract_from_raw_pages(&[]);
        assert!(doc.pages.is_empty());
        assert!(doc.tables.is_empty());
    }
}
