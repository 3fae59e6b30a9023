//! Question answering: retrieval, prompt assembly, the LLM call, and
//! post-hoc verification.

pub mod classify;
pub mod client;
pub mod context;
pub mod eval;
pub mod prompts;
pub mod verify;

pub use classify::{classify_query, ExpectedLength, QueryClassification, QueryType};
pub use client::{AnswerModel, AnthropicClient};
pub use context::{pack_context, truncate_at_sentence, PackedContext};
pub use prompts::{adaptive_system_prompt, build_user_message, BASE_SYSTEM_PROMPT};
pub use verify::{
    is_not_found_response, validate_response, verify_content_against_sources, FormatValidation,
};

use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::Regex;
use tracing::{info, warn};

use crate::engine::Engine;
use crate::error::LlmError;
use crate::models::{Diagnostics, QAResponse};
use crate::retrieval::retrieve_with_fallback;
use crate::search::page_has_heading_match;

/// Phrases whose presence marks an answer as evidence-free. Matching is
/// exact-phrase on these canonical English forms, case-folded.
const NO_EVIDENCE_PHRASES: &[&str] = &[
    "not found in the documents",
    "not found in documents",
    "no information available",
    "documents do not contain",
    "cannot find",
    "no relevant information",
    "not mentioned in",
    "does not contain",
];

fn citation_presence_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\[source\s*\d+\]").unwrap_or_else(|e| panic!("bad regex: {e}"))
    })
}

/// Decides whether the model's answer is a no-evidence response.
///
/// True when the answer starts with a canonical "not found" phrase, or is
/// short (<200 chars) and contains one, and carries no `[Source N]`
/// citation. Citation presence always wins: cited answers found evidence.
#[must_use]
pub fn is_no_evidence_answer(answer: &str) -> bool {
    let lower = answer.to_lowercase();
    let trimmed = lower.trim();

    let has_citations = citation_presence_re().is_match(&lower);
    if has_citations {
        return false;
    }

    let starts_with_phrase = NO_EVIDENCE_PHRASES
        .iter()
        .any(|phrase| trimmed.starts_with(phrase));
    let short_with_phrase = answer.chars().count() < 200
        && NO_EVIDENCE_PHRASES.iter().any(|phrase| lower.contains(phrase));

    starts_with_phrase || short_with_phrase
}

/// Answers a question over the indexed corpus.
///
/// The full pipeline: classify, retrieve (parallel hybrid with fallback),
/// pack context, call the model with an adaptive prompt, decide
/// no-evidence, extract cited sources, validate format and verify content.
/// LLM failures surface as explanatory responses, never as errors.
pub fn answer_question(engine: &Engine, question: &str) -> QAResponse {
    let classification = classify_query(question);

    // An unconfigured model short-circuits before retrieval
    let Some(model) = engine.model() else {
        return QAResponse::no_evidence(
            "API key not configured. Please set ANTHROPIC_API_KEY in your environment.",
        );
    };

    let limit = engine.settings().max_retrieval_results;
    let outcome = retrieve_with_fallback(engine, question, limit);

    let mut diagnostics = Diagnostics {
        method: outcome.method.clone(),
        results_count: outcome.hits.len(),
        chunk_results_count: outcome.context_hits.len(),
        query_type: Some(classification.query_type.as_str().to_string()),
        ..Diagnostics::default()
    };
    info!(
        method = %outcome.method,
        results = outcome.hits.len(),
        context = outcome.context_hits.len(),
        "retrieval complete"
    );

    if outcome.hits.is_empty() {
        return QAResponse {
            answer: "Not found in the documents provided. No relevant content was found in the \
                     indexed collective agreements. Make sure documents are indexed and try \
                     rephrasing your question."
                .to_string(),
            citations: Vec::new(),
            no_evidence: true,
            retrieval_method: Some(outcome.method),
            synonyms_used: None,
            diagnostics: Some(diagnostics),
            verification_warnings: Vec::new(),
        };
    }

    let packed = match pack_context(
        engine.store(),
        &outcome.hits,
        &outcome.context_hits,
        engine.settings().max_context_budget,
        engine.settings().max_context_per_source,
    ) {
        Ok(packed) => packed,
        Err(e) => {
            warn!(error = %e, "context packing failed");
            return QAResponse::no_evidence(
                "Not found in the documents provided. Could not retrieve page content.",
            );
        }
    };

    if packed.parts.is_empty() {
        return QAResponse::no_evidence(
            "Not found in the documents provided. Could not retrieve page content.",
        );
    }

    if packed.truncated {
        diagnostics.context_truncated = true;
        diagnostics.sources_used = Some(packed.parts.len());
        diagnostics.sources_available = Some(outcome.hits.len());
    }

    // Heading hint: chunk metadata first, then a probe of the top page hit
    let mut detected_heading = packed.detected_heading.clone();
    if detected_heading.is_none() {
        if let Some(top) = outcome.hits.first() {
            if let Ok((true, Some(heading))) =
                page_has_heading_match(engine.store(), top.file_id, top.page_number, question)
            {
                detected_heading = Some(heading);
            }
        }
    }

    let system_prompt = adaptive_system_prompt(&classification);
    let user_message = build_user_message(
        &packed.joined(),
        question,
        detected_heading.as_deref(),
        &outcome.method,
    );

    let answer_text = match model.complete(&system_prompt, &user_message) {
        Ok(text) => text,
        Err(LlmError::MissingApiKey) => {
            return QAResponse::no_evidence(
                "API key not configured. Please set ANTHROPIC_API_KEY in your environment.",
            );
        }
        Err(LlmError::Auth(_)) => {
            return QAResponse::no_evidence(
                "Authentication failed. Please check your ANTHROPIC_API_KEY.",
            );
        }
        Err(LlmError::RateLimit(_)) => {
            return QAResponse::no_evidence("Rate limit exceeded. Please try again in a moment.");
        }
        Err(e) => {
            return QAResponse::no_evidence(format!(
                "An error occurred while processing your question: {e}"
            ));
        }
    };

    let no_evidence = is_no_evidence_answer(&answer_text);

    // Extract which sources the answer actually cited
    let mut cited = Vec::new();
    for (i, citation) in packed.citations.iter().enumerate() {
        let source_number = i + 1;
        let explicit = answer_text.contains(&format!("[Source {source_number}]"))
            || answer_text.contains(&format!("Source {source_number}"))
            || answer_text.contains(&format!("source {source_number}"));

        let answer_lower = answer_text.to_lowercase();
        let filename_mentioned = answer_lower.contains(&citation.filename.to_lowercase());
        let page_mentioned = answer_lower.contains(&format!("page {}", citation.page_number));

        if explicit || (filename_mentioned && page_mentioned) {
            cited.push(citation.clone());
        }
    }
    if cited.is_empty() && !no_evidence {
        cited = packed.citations.iter().take(3).cloned().collect();
    }
    if no_evidence {
        cited.clear();
    }

    // Which synonym expansions were in play, for transparency
    let synonyms_used = if outcome.method.contains("synonym") {
        let mut used: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for word in question.to_lowercase().split_whitespace() {
            if let Ok(synonyms) = engine.synonyms().get_synonyms(engine.store(), word) {
                if synonyms.len() > 1 {
                    used.insert(
                        word.to_string(),
                        synonyms.into_iter().filter(|s| s != word).collect(),
                    );
                }
            }
        }
        if used.is_empty() {
            None
        } else {
            Some(used)
        }
    } else {
        None
    };

    // Non-fatal format validation, recorded in diagnostics
    let validation = validate_response(&answer_text, detected_heading.is_some());
    if !validation.valid {
        warn!(issues = ?validation.issues, "answer failed format validation");
        diagnostics.validation_issues = validation.issues;
    }

    // Content verification warnings never suppress the answer
    let verification_warnings = if no_evidence {
        Vec::new()
    } else {
        let warnings = verify_content_against_sources(&answer_text, &packed.parts);
        if !warnings.is_empty() {
            warn!(?warnings, "content verification warnings");
        }
        warnings
    };

    QAResponse {
        answer: answer_text,
        citations: cited,
        no_evidence,
        retrieval_method: Some(outcome.method),
        synonyms_used,
        diagnostics: Some(diagnostics),
        verification_warnings,
    }
}
