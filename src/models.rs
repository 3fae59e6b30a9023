//! Shared data-transfer types.
//!
//! These types cross subsystem boundaries: retrieval hits, citations,
//! Q&A responses and file bookkeeping records.

use serde::{Deserialize, Serialize};

/// Indexing lifecycle state of a tracked file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileStatus {
    /// Discovered but not yet indexed.
    Pending,
    /// Indexing in progress.
    Indexing,
    /// Fully indexed; pages, chunks and (if enabled) embeddings exist.
    Indexed,
    /// Indexing failed; see `last_error`.
    Error,
}

impl FileStatus {
    /// Database string representation.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Indexing => "indexing",
            Self::Indexed => "indexed",
            Self::Error => "error",
        }
    }

    /// Parses the database string representation.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s {
            "indexing" => Self::Indexing,
            "indexed" => Self::Indexed,
            "error" => Self::Error,
            _ => Self::Pending,
        }
    }
}

/// Information about a tracked PDF file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileInfo {
    /// Database id.
    pub id: i64,
    /// Absolute path (identity).
    pub path: String,
    /// Base filename.
    pub filename: String,
    /// SHA-256 of the file content.
    pub sha256: String,
    /// Modification time (seconds since epoch).
    pub mtime: f64,
    /// File size in bytes.
    pub size: u64,
    /// Indexing status.
    pub status: FileStatus,
    /// Last indexing error, if any.
    pub last_error: Option<String>,
    /// Page count once indexed.
    pub pages: Option<u32>,
    /// Extraction timestamp (RFC 3339).
    pub extracted_at: Option<String>,
    /// Row creation timestamp.
    pub created_at: Option<String>,
    /// Whether the file is visible without admin access.
    pub public_read: bool,
    /// Employer name from metadata.
    pub employer_name: Option<String>,
    /// Union local from metadata.
    pub union_local: Option<String>,
    /// Agreement effective date.
    pub effective_date: Option<String>,
    /// Agreement expiry date.
    pub expiry_date: Option<String>,
    /// Region from metadata.
    pub region: Option<String>,
    /// Short display name used for document-reference detection.
    pub short_name: Option<String>,
}

/// A single page-level search result with citation info.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    /// Source file id.
    pub file_id: i64,
    /// Source file path.
    pub file_path: String,
    /// Source filename.
    pub filename: String,
    /// Page number (1-indexed).
    pub page_number: u32,
    /// Snippet with `<mark>` highlighting.
    pub snippet: String,
    /// Score; meaning depends on the producing retriever.
    pub score: f64,
}

/// A chunk-level search result carrying structural context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkHit {
    /// Source file id.
    pub file_id: i64,
    /// Source file path.
    pub file_path: String,
    /// Source filename.
    pub filename: String,
    /// Chunk row id.
    pub chunk_id: i64,
    /// Section heading, if detected.
    pub heading: Option<String>,
    /// Parent heading (Article for a Section).
    pub parent_heading: Option<String>,
    /// Extracted section/article number.
    pub section_number: Option<String>,
    /// First page covered by the chunk.
    pub page_start: u32,
    /// Last page covered by the chunk.
    pub page_end: u32,
    /// Snippet with `<mark>` highlighting.
    pub snippet: String,
    /// BM25 score (absolute value; lower rank is better match).
    pub score: f64,
}

/// A dense-vector search result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SemanticHit {
    /// Source file id.
    pub file_id: i64,
    /// Chunk row id when the entry indexes a chunk.
    pub chunk_id: Option<i64>,
    /// Page number (page entries) or page start (chunk entries).
    pub page_number: u32,
    /// Source filename.
    pub filename: String,
    /// Source file path.
    pub file_path: String,
    /// Truncated stored document text.
    pub text: String,
    /// Section heading, if present in metadata.
    pub heading: Option<String>,
    /// Similarity in [0, 1]; higher is better.
    pub score: f64,
}

/// A retrieval hit from any retriever, with a common accessor surface.
///
/// The three hit shapes differ only by optional structural metadata; this
/// sum type lets the prompt assembler consume them uniformly.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Hit {
    /// Page FTS hit.
    Page(SearchResult),
    /// Chunk FTS hit.
    Chunk(ChunkHit),
    /// Dense-vector hit.
    Semantic(SemanticHit),
}

impl Hit {
    /// Source file id.
    #[must_use]
    pub fn file_id(&self) -> i64 {
        match self {
            Self::Page(h) => h.file_id,
            Self::Chunk(h) => h.file_id,
            Self::Semantic(h) => h.file_id,
        }
    }

    /// Primary page reference (page number or page start).
    #[must_use]
    pub fn page(&self) -> u32 {
        match self {
            Self::Page(h) => h.page_number,
            Self::Chunk(h) => h.page_start,
            Self::Semantic(h) => h.page_number,
        }
    }

    /// Last page of the hit's span.
    #[must_use]
    pub fn page_end(&self) -> u32 {
        match self {
            Self::Chunk(h) => h.page_end,
            Self::Page(h) => h.page_number,
            Self::Semantic(h) => h.page_number,
        }
    }

    /// Chunk id when the hit references a stored chunk.
    #[must_use]
    pub fn chunk_id(&self) -> Option<i64> {
        match self {
            Self::Page(_) => None,
            Self::Chunk(h) => Some(h.chunk_id),
            Self::Semantic(h) => h.chunk_id,
        }
    }

    /// Heading metadata, when the retriever carries it.
    #[must_use]
    pub fn heading(&self) -> Option<&str> {
        match self {
            Self::Page(_) => None,
            Self::Chunk(h) => h.heading.as_deref(),
            Self::Semantic(h) => h.heading.as_deref(),
        }
    }

    /// Parent heading metadata.
    #[must_use]
    pub fn parent_heading(&self) -> Option<&str> {
        match self {
            Self::Chunk(h) => h.parent_heading.as_deref(),
            _ => None,
        }
    }

    /// Section number metadata.
    #[must_use]
    pub fn section_number(&self) -> Option<&str> {
        match self {
            Self::Chunk(h) => h.section_number.as_deref(),
            _ => None,
        }
    }

    /// Best available text for the hit (snippet or stored document).
    #[must_use]
    pub fn text(&self) -> &str {
        match self {
            Self::Page(h) => &h.snippet,
            Self::Chunk(h) => &h.snippet,
            Self::Semantic(h) => &h.text,
        }
    }

    /// Retriever score.
    #[must_use]
    pub fn score(&self) -> f64 {
        match self {
            Self::Page(h) => h.score,
            Self::Chunk(h) => h.score,
            Self::Semantic(h) => h.score,
        }
    }
}

/// A citation reference attached to an answer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Citation {
    /// Source file id.
    pub file_id: i64,
    /// Source file path.
    pub file_path: String,
    /// Source filename.
    pub filename: String,
    /// Page number cited.
    pub page_number: u32,
    /// First 200 characters of the cited excerpt.
    pub cited_text: String,
}

/// Retrieval and validation diagnostics attached to a response.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Diagnostics {
    /// Retrieval stage that produced the hits.
    pub method: String,
    /// Number of fused hits.
    pub results_count: usize,
    /// Number of raw context hits (chunk/semantic).
    pub chunk_results_count: usize,
    /// Whether context packing hit the total budget.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub context_truncated: bool,
    /// Sources actually packed when truncated.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sources_used: Option<usize>,
    /// Sources available before truncation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sources_available: Option<usize>,
    /// Format-validation issues (non-fatal).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub validation_issues: Vec<String>,
    /// Query classification summary.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query_type: Option<String>,
}

/// Response from the Q&A pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QAResponse {
    /// Answer text (or a no-evidence / error explanation).
    pub answer: String,
    /// Citations backing the answer; empty for no-evidence responses.
    pub citations: Vec<Citation>,
    /// True when no supporting text was found.
    pub no_evidence: bool,
    /// Retrieval stage tag, for transparency.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retrieval_method: Option<String>,
    /// Synonym expansions applied, term -> variants.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub synonyms_used: Option<std::collections::BTreeMap<String, Vec<String>>>,
    /// Retrieval diagnostics.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diagnostics: Option<Diagnostics>,
    /// Content-verification warnings; never suppress the answer.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub verification_warnings: Vec<String>,
}

impl QAResponse {
    /// Builds a no-evidence response with the given explanation.
    #[must_use]
    pub fn no_evidence(answer: impl Into<String>) -> Self {
        Self {
            answer: answer.into(),
            citations: Vec::new(),
            no_evidence: true,
            retrieval_method: None,
            synonyms_used: None,
            diagnostics: None,
            verification_warnings: Vec::new(),
        }
    }
}

/// Counters reported by a directory scan.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScanReport {
    /// Files discovered for the first time.
    pub new: usize,
    /// Files whose content hash changed.
    pub changed: usize,
    /// Files unchanged since the last scan.
    pub unchanged: usize,
    /// Tracked files no longer on disk (rows removed).
    pub missing: usize,
    /// Per-file scan errors.
    pub errors: Vec<ScanError>,
}

/// A single scan failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanError {
    /// Path that failed.
    pub path: String,
    /// Error description.
    pub error: String,
}

/// Result of indexing one file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexReport {
    /// Pages stored.
    pub pages: usize,
    /// Chunks stored.
    pub chunks: usize,
    /// Embeddings stored.
    pub embeddings: usize,
}

/// Result of a full index rebuild.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RebuildReport {
    /// Whether the rebuild completed.
    pub success: bool,
    /// Items (pages or chunks) indexed.
    pub items_indexed: usize,
    /// Human-readable summary.
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_status_round_trip() {
        for status in [
            FileStatus::Pending,
            FileStatus::Indexing,
            FileStatus::Indexed,
            FileStatus::Error,
        ] {
            assert_eq!(FileStatus::parse(status.as_str()), status);
        }
    }

    #[test]
    fn test_file_status_parse_unknown() {
        assert_eq!(FileStatus::parse("garbage"), FileStatus::Pending);
    }

    #[test]
    fn test_hit_accessors() {
        let hit = Hit::Chunk(ChunkHit {
            file_id: 3,
            file_path: "/tmp/a.pdf".to_string(),
            filename: "a.pdf".to_string(),
            chunk_id: 11,
            heading: Some("Article 5 — Sick Time".to_string()),
            parent_heading: None,
            section_number: Some("5".to_string()),
            page_start: 4,
            page_end: 6,
            snippet: "sick leave".to_string(),
            score: 1.2,
        });

        assert_eq!(hit.file_id(), 3);
        assert_eq!(hit.page(), 4);
        assert_eq!(hit.page_end(), 6);
        assert_eq!(hit.chunk_id(), Some(11));
        assert_eq!(hit.heading(), Some("Article 5 — Sick Time"));
        assert_eq!(hit.section_number(), Some("5"));
    }

    #[test]
    fn test_hit_page_has_no_heading() {
        let hit = Hit::Page(SearchResult {
            file_id: 1,
            file_path: "/tmp/a.pdf".to_string(),
            filename: "a.pdf".to_string(),
            page_number: 2,
            snippet: "text".to_string(),
            score: 0.5,
        });
        assert!(hit.heading().is_none());
        assert_eq!(hit.chunk_id(), None);
        assert_eq!(hit.page_end(), 2);
    }

    #[test]
    fn test_no_evidence_response() {
        let resp = QAResponse::no_evidence("Not found in the documents provided.");
        assert!(resp.no_evidence);
        assert!(resp.citations.is_empty());
    }

    #[test]
    fn test_qa_response_serializes() {
        let resp = QAResponse::no_evidence("nope");
        let json = serde_json::to_string(&resp).unwrap();
        assert!(json.contains("\"no_evidence\":true"));
    }
}
