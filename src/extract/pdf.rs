//! PDF text backend.
//!
//! Thin wrapper over `lopdf`: loads a document and pulls raw text per page.
//! A page-level failure substitutes a placeholder line so one broken page
//! never sinks the whole document.

use std::path::Path;

use lopdf::Document;
use tracing::warn;

use crate::error::ExtractError;

/// Loads a PDF document, mapping backend failures to [`ExtractError`].
pub fn load_document(path: &Path) -> Result<Document, ExtractError> {
    Document::load(path).map_err(|e| ExtractError::Unreadable {
        reason: e.to_string(),
    })
}

/// Returns the page count of a PDF, or 0 if it cannot be read.
#[must_use]
pub fn page_count(path: &Path) -> usize {
    load_document(path).map_or(0, |doc| doc.get_pages().len())
}

/// Extracts raw text for every page of a PDF, in page order.
///
/// A page whose text cannot be decoded yields `[Page N extraction failed]`
/// instead of aborting the document.
pub fn extract_raw_pages(path: &Path) -> Result<Vec<String>, ExtractError> {
    let doc = load_document(path)?;
    let page_numbers: Vec<u32> = doc.get_pages().keys().copied().collect();
    if page_numbers.is_empty() {
        return Err(ExtractError::Empty {
            path: path.display().to_string(),
        });
    }

    let mut pages = Vec::with_capacity(page_numbers.len());
    for number in page_numbers {
        match doc.extract_text(&[number]) {
            Ok(text) => pages.push(text),
            Err(e) => {
                warn!(page = number, error = %e, "page text extraction failed");
                pages.push(format!("[Page {number} extraction failed]"));
            }
        }
    }
    Ok(pages)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_missing_file() {
        let err = load_document(Path::new("/nonexistent/file.pdf"));
        assert!(err.is_err());
    }

    #[test]
    fn test_page_count_missing_file() {
        assert_eq!(page_count(Path::new("/nonexistent/file.pdf")), 0);
    }

    #[test]
    fn test_extract_raw_pages_missing_file() {
        let err = extract_raw_pages(Path::new("/nonexistent/file.pdf"));
        assert!(matches!(err, Err(ExtractError::Unreadable { .. })));
    }

    #[test]
    fn test_extract_not_a_pdf() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fake.pdf");
        std::fs::write(&path, b"this is not a pdf").unwrap();
        assert!(extract_raw_pages(&path).is_err());
    }
}
