//! Deterministic query classification.
//!
//! A rule engine over the lowercased question picks the response format
//! (comparison table, numbered procedure, quoted definition) and flags
//! queries that need exact numeric values.

use serde::{Deserialize, Serialize};

/// High-level query type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryType {
    /// Plain factual lookup.
    #[default]
    Factual,
    /// Cross-document comparison.
    Comparison,
    /// Step-by-step procedure.
    Procedural,
    /// Definition request.
    Definition,
}

impl QueryType {
    /// Diagnostic string form.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Factual => "factual",
            Self::Comparison => "comparison",
            Self::Procedural => "procedural",
            Self::Definition => "definition",
        }
    }
}

/// Expected answer length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExpectedLength {
    /// A few bullets.
    #[default]
    Short,
    /// Half a page.
    Medium,
    /// Detailed multi-step answer.
    Long,
}

/// Classification of one question.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct QueryClassification {
    /// Query type.
    pub query_type: QueryType,
    /// Expected answer length.
    pub expected_length: ExpectedLength,
    /// Whether evidence from multiple documents is needed.
    pub needs_multiple_docs: bool,
    /// Whether literal numeric values are required.
    pub needs_exact_match: bool,
}

const COMPARISON_INDICATORS: &[&str] = &["compare", "difference", "vs", "versus", "between", "differ"];
const PROCEDURAL_INDICATORS: &[&str] = &[
    "how to",
    "how do",
    "process",
    "procedure",
    "steps",
    "what happens",
    "file a",
];
const DEFINITION_INDICATORS: &[&str] = &[
    "what is",
    "define",
    "meaning of",
    "definition",
    "what does",
    "what are",
];
const VALUE_INDICATORS: &[&str] = &[
    "how much",
    "how many",
    "rate",
    "amount",
    "percentage",
    "days",
    "hours",
    "salary",
    "wage",
];

/// Classifies a question for adaptive prompting.
#[must_use]
pub fn classify_query(query: &str) -> QueryClassification {
    let lower = query.to_lowercase();
    let mut classification = QueryClassification::default();

    if COMPARISON_INDICATORS.iter().any(|ind| lower.contains(ind)) {
        classification.query_type = QueryType::Comparison;
        classification.needs_multiple_docs = true;
        classification.expected_length = ExpectedLength::Medium;
    }

    if PROCEDURAL_INDICATORS.iter().any(|ind| lower.contains(ind)) {
        classification.query_type = QueryType::Procedural;
        classification.expected_length = ExpectedLength::Long;
    }

    if DEFINITION_INDICATORS.iter().any(|ind| lower.contains(ind)) {
        classification.query_type = QueryType::Definition;
    }

    if VALUE_INDICATORS.iter().any(|ind| lower.contains(ind)) {
        classification.needs_exact_match = true;
    }

    classification
}
