//! Retrieval evaluation harness.
//!
//! Runs golden Q&A pairs (question + expected keywords) through the fused
//! retrieval pipeline and computes Recall@K and Mean Reciprocal Rank. Used
//! by the golden test suite and the CLI `eval` surface.

use serde::{Deserialize, Serialize};

use crate::engine::Engine;
use crate::retrieval::retrieve_with_fallback;

/// One golden evaluation pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoldenPair {
    /// The question to retrieve for.
    pub question: String,
    /// Keywords expected in a relevant hit.
    pub expected_keywords: Vec<String>,
    /// Topic label for reporting.
    pub expected_topic: String,
}

/// Per-question evaluation result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionResult {
    /// The evaluated question.
    pub question: String,
    /// Rank (1-based) of the first relevant hit; 0 when none.
    pub first_hit_rank: usize,
    /// Hits retrieved.
    pub hits: usize,
}

/// Aggregate evaluation metrics.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EvalSummary {
    /// Questions evaluated.
    pub questions: usize,
    /// Mean Recall@1.
    pub recall_at_1: f64,
    /// Mean Recall@3.
    pub recall_at_3: f64,
    /// Mean Recall@5.
    pub recall_at_5: f64,
    /// Mean reciprocal rank.
    pub mrr: f64,
    /// Per-question details.
    pub results: Vec<QuestionResult>,
}

/// Word-boundary-aware keyword containment. Multi-word keywords use a
/// plain substring check; single words must match on word boundaries so
/// "pay" does not match inside "payment".
#[must_use]
pub fn text_contains_keyword(text: &str, keyword: &str) -> bool {
    let text_lower = text.to_lowercase();
    let keyword_lower = keyword.to_lowercase();

    if keyword_lower.contains(' ') {
        return text_lower.contains(&keyword_lower);
    }

    regex::Regex::new(&format!(r"\b{}\b", regex::escape(&keyword_lower)))
        .map(|re| re.is_match(&text_lower))
        .unwrap_or(false)
}

fn hit_is_relevant(engine: &Engine, hit: &crate::models::SearchResult, keywords: &[String]) -> bool {
    // Snippets can clip the keyword; check the full page text when needed
    if keywords
        .iter()
        .any(|kw| text_contains_keyword(&hit.snippet, kw))
    {
        return true;
    }
    engine
        .store()
        .get_page_text(hit.file_id, hit.page_number)
        .ok()
        .flatten()
        .map_or(false, |text| {
            keywords.iter().any(|kw| text_contains_keyword(&text, kw))
        })
}

/// Evaluates the fused retrieval pipeline over golden pairs.
#[must_use]
pub fn evaluate_retrieval(engine: &Engine, pairs: &[GoldenPair], limit: usize) -> EvalSummary {
    let mut summary = EvalSummary {
        questions: pairs.len(),
        ..EvalSummary::default()
    };
    if pairs.is_empty() {
        return summary;
    }

    let mut recall_1 = 0.0;
    let mut recall_3 = 0.0;
    let mut recall_5 = 0.0;
    let mut rr_sum = 0.0;

    for pair in pairs {
        let outcome = retrieve_with_fallback(engine, &pair.question, limit);

        let first_hit_rank = outcome
            .hits
            .iter()
            .position(|hit| hit_is_relevant(engine, hit, &pair.expected_keywords))
            .map_or(0, |idx| idx + 1);

        if first_hit_rank >= 1 {
            rr_sum += 1.0 / first_hit_rank as f64;
            if first_hit_rank <= 1 {
                recall_1 += 1.0;
            }
            if first_hit_rank <= 3 {
                recall_3 += 1.0;
            }
            if first_hit_rank <= 5 {
                recall_5 += 1.0;
            }
        }

        summary.results.push(QuestionResult {
            question: pair.question.clone(),
            first_hit_rank,
            hits: outcome.hits.len(),
        });
    }

    let n = pairs.len() as f64;
    summary.recall_at_1 = recall_1 / n;
    summary.recall_at_3 = recall_3 / n;
    summary.recall_at_5 = recall_5 / n;
    summary.mrr = rr_sum / n;
    summary
}
