//! AI-backed comparison and search analysis.
//!
//! Three surfaces on top of the retrieval stack and the answer model:
//! free-form topic comparison across documents, a structured comparison
//! matrix (JSON-extracted, suitable for a sortable table), and AI analysis
//! of search results. All three gather per-document excerpts first, then
//! make grounded model calls; failures land in the result's `error` field,
//! never as panics or propagated errors.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::engine::Engine;
use crate::error::LlmError;
use crate::models::SemanticHit;
use crate::retrieval::VALUE_QUERY_TERMS;
use crate::search::{search_chunks, search_pages, SearchMode, SearchOptions};
use crate::semantic::search_semantic_with_rerank;

/// Excerpts retrieved per document for a comparison.
const EXCERPTS_PER_DOC: usize = 8;

/// Wage/rate pages appended for value topics, per document.
const MONEY_PAGE_LIMIT: usize = 3;

/// Documents per matrix extraction call.
const MATRIX_BATCH_SIZE: usize = 6;

/// Matrix cell value for provisions absent from a document's excerpts.
const NOT_SPECIFIED: &str = "Not specified";

/// System prompt for free-form document comparison.
pub const COMPARISON_SYSTEM_PROMPT: &str = r#"You are comparing collective agreements. Extract ONLY what is explicitly written.

## RULES
1. Extract specific values: dollar amounts, hours, rates, percentages
2. Use the EXACT wording from the documents - do not paraphrase numbers
3. If a provision exists but value isn't shown, write "Not in excerpts"
4. NEVER add qualifiers not in the source (like "after 8 hours" unless it says "8 hours")

## FORMAT

### Key Differences
- **[Provision]**: [Value from Doc A] vs [Value from Doc B] [citations]

Use exact wording. Examples of GOOD vs BAD:
- GOOD: "two (2) times the regular hourly rate" (exact quote)
- BAD: "2x after 8 hours" (added "after 8 hours" - hallucination)
- GOOD: "$130,845.26 annual" (exact from document)
- BAD: "$60/hr" (calculated, not stated)

### Comparison Table
| Provision | [Doc A Short Name] | [Doc B Short Name] |
|-----------|-------|-------|

Table cells should contain:
- Exact values as written in documents
- "Not in excerpts" if not found

### Notable Quotes
Include 1-2 direct quotes per document showing key contract language.

## DO NOT
- Add time thresholds (8 hours, etc.) unless explicitly stated
- Calculate hourly from annual or vice versa
- Use general knowledge about labor law
- Assume standard values"#;

/// System prompt for structured matrix extraction.
pub const MATRIX_SYSTEM_PROMPT: &str = r#"You are a document analysis assistant that extracts structured comparison data.

## RULES
1. Extract ONLY values explicitly stated in the provided text.
2. Use the EXACT wording or numbers from the documents - do not paraphrase.
3. If a value is not found in a document's excerpts, use exactly "Not specified".
4. NEVER calculate derived values (e.g., do not compute hourly from annual salary).
5. NEVER add qualifiers, context, or assumptions not present in the source text.
6. Identify the most relevant comparison aspects for the given topic.

## OUTPUT FORMAT
You MUST respond with valid JSON only. No markdown fencing, no explanation, just the JSON object.

{
  "topic": "<the comparison topic>",
  "aspects": ["<aspect1>", "<aspect2>", ...],
  "documents": {
    "<document_name>": {
      "<aspect1>": "<exact value or Not specified>",
      "<aspect2>": "<exact value or Not specified>"
    }
  }
}

## GUIDELINES FOR ASPECTS
- Choose 5-15 aspects that are most relevant to the topic across the documents.
- Use clear, concise aspect names (e.g., "Overtime Rate", "Vacation Days After 5 Years").
- Prefer aspects where at least one document has a concrete value.
- Order aspects from most to least important for the topic.

## DO NOT
- Add time thresholds unless explicitly stated
- Calculate hourly from annual or vice versa
- Use general knowledge about labor law or industry standards
- Assume standard values or fill in from external knowledge
- Include markdown formatting in the JSON output"#;

/// System prompt for AI search analysis.
pub const SEARCH_ANALYSIS_SYSTEM_PROMPT: &str = r#"You are analyzing collective agreements to answer questions. Extract ONLY what is explicitly written.

## RULES
1. Extract specific values: dollar amounts, hours, rates, percentages, dates
2. Use the EXACT wording from the documents - do not paraphrase numbers
3. If information isn't in the excerpts, write "Not found in excerpts"
4. NEVER add qualifiers not in the source text
5. Quote the actual contract language when possible

## FORMAT

### Summary
Provide a clear, direct answer to the query based on the document excerpts.

### Key Details
- **[Provision/Item]**: [Exact value or quote from document] [citation]

### Relevant Quotes
Include 2-3 direct quotes from the documents showing key contract language.

## DO NOT
- Add time thresholds (8 hours, etc.) unless explicitly stated
- Calculate hourly from annual or vice versa
- Use general knowledge about labor law
- Assume standard values
- Make up information not in the excerpts"#;

/// One retrieved excerpt feeding a model call.
#[derive(Debug, Clone)]
pub struct DocExcerpt {
    /// Source filename.
    pub filename: String,
    /// Page number.
    pub page_number: u32,
    /// Excerpt text, capped at the per-source context limit.
    pub text: String,
    /// Section heading, when known.
    pub heading: Option<String>,
}

/// A source that contributed to an AI result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompareSource {
    /// Source file id.
    pub file_id: i64,
    /// Source filename.
    pub filename: String,
    /// Page number.
    pub page_number: u32,
}

/// Result of a free-form AI comparison.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AiCompareResult {
    /// The model's comparison text; empty on error.
    pub analysis: String,
    /// Sources fed to the model.
    pub sources: Vec<CompareSource>,
    /// Filenames compared.
    pub documents: Vec<String>,
    /// The comparison topic.
    pub topic: String,
    /// Set when the comparison could not run.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AiCompareResult {
    fn failed(topic: &str, documents: Vec<String>, error: impl Into<String>) -> Self {
        Self {
            topic: topic.to_string(),
            documents,
            error: Some(error.into()),
            ..Self::default()
        }
    }
}

/// One document's column in a comparison matrix.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatrixDocument {
    /// Document name.
    pub name: String,
    /// File id.
    pub file_id: i64,
    /// Aspect -> extracted value (or "Not specified").
    pub values: BTreeMap<String, String>,
}

/// Result of a structured matrix comparison.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MatrixResult {
    /// The comparison topic.
    pub topic: String,
    /// Comparison aspects, most important first.
    pub aspects: Vec<String>,
    /// One column per document.
    pub documents: Vec<MatrixDocument>,
    /// Sources fed to the model.
    pub sources: Vec<CompareSource>,
    /// Set when the extraction could not run.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl MatrixResult {
    fn failed(topic: &str, error: impl Into<String>) -> Self {
        Self {
            topic: topic.to_string(),
            error: Some(error.into()),
            ..Self::default()
        }
    }
}

/// Result of an AI search analysis.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchAnalysis {
    /// The model's analysis text; empty on error.
    pub analysis: String,
    /// Sources fed to the model.
    pub sources: Vec<CompareSource>,
    /// The analyzed query.
    pub query: String,
    /// Set when the analysis could not run.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// True when the topic asks about monetary or rate values, so pages with
/// actual numbers should be pulled in alongside the topical excerpts.
fn needs_numbers(topic: &str) -> bool {
    let lower = topic.to_lowercase();
    VALUE_QUERY_TERMS.iter().any(|term| lower.contains(term))
}

fn cap_chars(text: &str, limit: usize) -> String {
    text.chars().take(limit).collect()
}

fn excerpt_from_semantic(engine: &Engine, hit: &SemanticHit, cap: usize) -> DocExcerpt {
    // Stored documents are truncated; short ones get the full page instead
    let mut text = hit.text.clone();
    if text.chars().count() < 500 {
        if let Ok(Some(page_text)) = engine.store().get_page_text(hit.file_id, hit.page_number) {
            text = page_text;
        }
    }
    DocExcerpt {
        filename: hit.filename.clone(),
        page_number: hit.page_number,
        text: cap_chars(&text, cap),
        heading: hit.heading.clone(),
    }
}

/// Appends wage/rate pages for a file, preferring structured tables over
/// the LIKE heuristic, skipping pages already present.
fn append_money_pages(engine: &Engine, file_id: i64, excerpts: &mut Vec<DocExcerpt>, cap: usize) {
    let existing: std::collections::HashSet<u32> =
        excerpts.iter().map(|e| e.page_number).collect();
    let mut added = 0usize;

    if let Ok(tables) = engine.store().wage_tables(Some(file_id), MONEY_PAGE_LIMIT * 2) {
        for table in tables {
            if existing.contains(&table.page_number) {
                continue;
            }
            excerpts.push(DocExcerpt {
                filename: table.filename,
                page_number: table.page_number,
                text: cap_chars(&table.markdown_text, cap),
                heading: Some(
                    table
                        .context_heading
                        .unwrap_or_else(|| "Wage/Rate Schedule".to_string()),
                ),
            });
            added += 1;
            if added >= MONEY_PAGE_LIMIT {
                return;
            }
        }
    }

    if added < MONEY_PAGE_LIMIT {
        if let Ok(pages) = engine.store().money_pages(Some(file_id), MONEY_PAGE_LIMIT) {
            for page in pages {
                if existing.contains(&page.page_number)
                    || excerpts.iter().any(|e| e.page_number == page.page_number)
                {
                    continue;
                }
                let text = engine
                    .store()
                    .get_page_text(file_id, page.page_number)
                    .ok()
                    .flatten()
                    .unwrap_or(page.snippet);
                excerpts.push(DocExcerpt {
                    filename: page.filename,
                    page_number: page.page_number,
                    text: cap_chars(&text, cap),
                    heading: Some("Wage/Rate Schedule".to_string()),
                });
                added += 1;
                if added >= MONEY_PAGE_LIMIT {
                    return;
                }
            }
        }
    }
}

/// Retrieves the most relevant excerpts about a topic from one file:
/// semantic with re-ranking first, then chunk FTS, then page FTS. Value
/// topics additionally pull in wage/rate pages. Never raises; a file with
/// nothing relevant yields an empty list.
fn relevant_content_for_file(engine: &Engine, file_id: i64, topic: &str, limit: usize) -> Vec<DocExcerpt> {
    let cap = engine.settings().max_context_per_source;
    let mut excerpts: Vec<DocExcerpt> = Vec::new();

    match search_semantic_with_rerank(
        engine.store(),
        engine.embedder(),
        topic,
        limit,
        Some(file_id),
        limit * 3,
    ) {
        Ok(hits) => {
            for hit in &hits {
                excerpts.push(excerpt_from_semantic(engine, hit, cap));
            }
        }
        Err(e) => warn!(file_id, error = %e, "semantic retrieval failed for comparison"),
    }

    if excerpts.is_empty() {
        let opts = SearchOptions {
            limit,
            mode: SearchMode::Or,
            file_id: Some(file_id),
            fallback_to_or: true,
        };
        if let Ok(chunks) = search_chunks(engine.store(), topic, &opts) {
            for chunk in chunks {
                let mut text = chunk.snippet.clone();
                if text.chars().count() < 500 {
                    if let Ok(Some(page_text)) =
                        engine.store().get_page_text(chunk.file_id, chunk.page_start)
                    {
                        text = page_text;
                    }
                }
                excerpts.push(DocExcerpt {
                    filename: chunk.filename,
                    page_number: chunk.page_start,
                    text: cap_chars(&text, cap),
                    heading: chunk.heading,
                });
            }
        }
    }

    if excerpts.is_empty() {
        let opts = SearchOptions {
            limit,
            mode: SearchMode::Or,
            file_id: Some(file_id),
            fallback_to_or: true,
        };
        if let Ok(pages) = search_pages(engine.store(), topic, &opts) {
            for page in pages {
                let text = engine
                    .store()
                    .get_page_text(page.file_id, page.page_number)
                    .ok()
                    .flatten()
                    .unwrap_or(page.snippet);
                excerpts.push(DocExcerpt {
                    filename: page.filename,
                    page_number: page.page_number,
                    text: cap_chars(&text, cap),
                    heading: None,
                });
            }
        }
    }

    if needs_numbers(topic) {
        append_money_pages(engine, file_id, &mut excerpts, cap);
    }

    excerpts
}

/// Gathers relevant content about a topic from multiple documents.
pub fn get_relevant_content(
    engine: &Engine,
    file_ids: &[i64],
    topic: &str,
    limit_per_doc: usize,
) -> BTreeMap<i64, Vec<DocExcerpt>> {
    file_ids
        .iter()
        .map(|&file_id| {
            (
                file_id,
                relevant_content_for_file(engine, file_id, topic, limit_per_doc),
            )
        })
        .collect()
}

/// Builds the labeled context string and source list for a set of
/// documents, in the given order.
fn build_context(
    content_by_doc: &BTreeMap<i64, Vec<DocExcerpt>>,
    ordered: &[(i64, String)],
) -> (String, Vec<CompareSource>) {
    let mut context = String::new();
    let mut sources = Vec::new();

    for (file_id, filename) in ordered {
        context.push_str(&format!("=== DOCUMENT: {filename} ===\n"));

        let excerpts = content_by_doc.get(file_id).map_or(&[][..], Vec::as_slice);
        if excerpts.is_empty() {
            context.push_str("No relevant content found for this topic.\n\n");
        } else {
            for excerpt in excerpts {
                let heading_line = excerpt
                    .heading
                    .as_ref()
                    .map_or(String::new(), |h| format!(" (Section: {h})"));
                context.push_str(&format!(
                    "[{filename}, Page {}]{heading_line}:\n{}\n\n",
                    excerpt.page_number, excerpt.text
                ));
                sources.push(CompareSource {
                    file_id: *file_id,
                    filename: filename.clone(),
                    page_number: excerpt.page_number,
                });
            }
        }
        context.push('\n');
    }

    (context, sources)
}

fn llm_error_message(e: &LlmError, what: &str) -> String {
    match e {
        LlmError::MissingApiKey => {
            "API key not configured. Please set ANTHROPIC_API_KEY in your environment.".to_string()
        }
        LlmError::Auth(_) => "Authentication failed. Please check your ANTHROPIC_API_KEY.".to_string(),
        LlmError::RateLimit(_) => "Rate limit exceeded. Please try again in a moment.".to_string(),
        other => format!("An error occurred while processing the {what}: {other}"),
    }
}

/// Compares documents on a topic using AI analysis.
///
/// Retrieves relevant excerpts from every selected document, then asks the
/// model to compare them with strict extract-only rules. Problems surface
/// in `error`; this never raises.
pub fn ai_compare_documents(engine: &Engine, file_ids: &[i64], topic: Option<&str>) -> AiCompareResult {
    let topic = topic.map(str::trim).unwrap_or_default();

    let Some(model) = engine.model() else {
        return AiCompareResult::failed(
            topic,
            Vec::new(),
            "API key not configured. Please set ANTHROPIC_API_KEY in your environment.",
        );
    };

    if file_ids.len() < 2 {
        return AiCompareResult::failed(
            topic,
            Vec::new(),
            "At least two documents are required for comparison.",
        );
    }
    if topic.is_empty() {
        return AiCompareResult::failed(
            topic,
            Vec::new(),
            "Please enter a topic to compare across the documents.",
        );
    }

    let mut ordered: Vec<(i64, String)> = Vec::new();
    for &file_id in file_ids {
        match engine.store().get_file(file_id) {
            Ok(Some(file)) => ordered.push((file_id, file.filename)),
            Ok(None) => {}
            Err(e) => warn!(file_id, error = %e, "file lookup failed for comparison"),
        }
    }
    let document_names: Vec<String> = ordered.iter().map(|(_, name)| name.clone()).collect();
    if ordered.len() < 2 {
        return AiCompareResult::failed(
            topic,
            document_names,
            "Could not find enough valid documents for comparison.",
        );
    }

    let ids: Vec<i64> = ordered.iter().map(|(id, _)| *id).collect();
    let content_by_doc = get_relevant_content(engine, &ids, topic, EXCERPTS_PER_DOC);

    let total_results: usize = content_by_doc.values().map(Vec::len).sum();
    if total_results == 0 {
        return AiCompareResult::failed(
            topic,
            document_names,
            format!(
                "No relevant content found for topic '{topic}' in the selected documents. \
                 Try a different search term or ensure documents are properly indexed."
            ),
        );
    }

    let (context, sources) = build_context(&content_by_doc, &ordered);

    let user_message = format!(
        r#"Compare these documents on: "{topic}"

IMPORTANT:
- Extract values EXACTLY as written in the text
- Do NOT add qualifiers not in the source (e.g., don't add "after 8 hours" unless the text says "8 hours")
- If information isn't in the excerpts, write "Not in excerpts"
- Quote the actual contract language when possible

Document excerpts:

{context}

Create your comparison using ONLY information from the text above. Do not add anything from general knowledge."#
    );

    match model.complete(COMPARISON_SYSTEM_PROMPT, &user_message) {
        Ok(analysis) => AiCompareResult {
            analysis,
            sources,
            documents: document_names,
            topic: topic.to_string(),
            error: None,
        },
        Err(e) => {
            let mut failed =
                AiCompareResult::failed(topic, document_names, llm_error_message(&e, "comparison"));
            failed.sources = sources;
            failed
        }
    }
}

/// The model's JSON shape for one matrix batch.
#[derive(Debug, Deserialize)]
struct RawMatrix {
    #[serde(default)]
    aspects: Vec<String>,
    #[serde(default)]
    documents: BTreeMap<String, BTreeMap<String, String>>,
}

/// Strips markdown code fences when the model wraps its JSON anyway.
fn strip_code_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let body = rest.split_once('\n').map_or("", |(_, body)| body);
    let body = body.trim_end();
    body.strip_suffix("```").unwrap_or(body).trim()
}

/// Compares multiple documents on a topic, returning structured matrix
/// data suitable for rendering as a sortable comparison table.
///
/// Documents are batched into model calls; batch results merge into one
/// matrix with missing cells filled as "Not specified". Problems surface
/// in `error`; this never raises.
pub fn compare_matrix(engine: &Engine, topic: &str, file_ids: &[i64]) -> MatrixResult {
    let topic = topic.trim();

    let Some(model) = engine.model() else {
        return MatrixResult::failed(
            topic,
            "API key not configured. Please set ANTHROPIC_API_KEY in your environment.",
        );
    };

    if file_ids.len() < 2 {
        return MatrixResult::failed(
            topic,
            "At least two documents are required for matrix comparison.",
        );
    }
    if topic.is_empty() {
        return MatrixResult::failed(topic, "Please enter a topic for the comparison matrix.");
    }

    let mut ordered: Vec<(i64, String)> = Vec::new();
    for &file_id in file_ids {
        if let Ok(Some(file)) = engine.store().get_file(file_id) {
            ordered.push((file_id, file.filename));
        }
    }
    if ordered.len() < 2 {
        return MatrixResult::failed(
            topic,
            "Could not find enough valid documents for matrix comparison.",
        );
    }

    let ids: Vec<i64> = ordered.iter().map(|(id, _)| *id).collect();
    let content_by_doc = get_relevant_content(engine, &ids, topic, EXCERPTS_PER_DOC);
    let total_results: usize = content_by_doc.values().map(Vec::len).sum();
    if total_results == 0 {
        return MatrixResult::failed(
            topic,
            format!("No relevant content found for topic '{topic}' in the selected documents."),
        );
    }

    let mut merged_aspects: Vec<String> = Vec::new();
    let mut merged_values: BTreeMap<String, BTreeMap<String, String>> = BTreeMap::new();
    let mut all_sources: Vec<CompareSource> = Vec::new();

    for batch in ordered.chunks(MATRIX_BATCH_SIZE) {
        let (context, sources) = build_context(&content_by_doc, batch);
        all_sources.extend(sources);

        let batch_names = batch
            .iter()
            .map(|(_, name)| format!("\"{name}\""))
            .collect::<Vec<_>>()
            .join(", ");

        let user_message = format!(
            r#"Extract a structured comparison matrix for the topic: "{topic}"

Documents to compare: {batch_names}

IMPORTANT:
- Extract values EXACTLY as written in the text
- Use "Not specified" for any aspect not found in a document's excerpts
- Do NOT calculate or derive values
- Do NOT add qualifiers not present in the source text
- Respond with valid JSON only

Document excerpts:

{context}

Respond with the JSON matrix only."#
        );

        let raw_text = match model.complete(MATRIX_SYSTEM_PROMPT, &user_message) {
            Ok(text) => text,
            Err(e) => {
                let mut failed = MatrixResult::failed(topic, llm_error_message(&e, "comparison matrix"));
                failed.sources = all_sources;
                return failed;
            }
        };

        let parsed: RawMatrix = match serde_json::from_str(strip_code_fences(&raw_text)) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!(error = %e, "matrix response was not valid JSON");
                let mut failed = MatrixResult::failed(
                    topic,
                    format!("The model returned an invalid comparison matrix: {e}"),
                );
                failed.sources = all_sources;
                return failed;
            }
        };

        for aspect in parsed.aspects {
            if !merged_aspects.contains(&aspect) {
                merged_aspects.push(aspect);
            }
        }
        for (doc_name, values) in parsed.documents {
            merged_values.entry(doc_name).or_default().extend(values);
        }
    }

    // Every document gets every aspect, missing cells filled explicitly
    let documents: Vec<MatrixDocument> = ordered
        .into_iter()
        .map(|(file_id, name)| {
            let mut values = merged_values.remove(&name).unwrap_or_default();
            for aspect in &merged_aspects {
                values
                    .entry(aspect.clone())
                    .or_insert_with(|| NOT_SPECIFIED.to_string());
            }
            MatrixDocument {
                name,
                file_id,
                values,
            }
        })
        .collect();

    MatrixResult {
        topic: topic.to_string(),
        aspects: merged_aspects,
        documents,
        sources: all_sources,
        error: None,
    }
}

/// Analyzes search results for a query with the model.
///
/// Gathers the best excerpts for the query (optionally scoped to one
/// file), then asks for an extract-only analysis with quotes. Problems
/// surface in `error`; this never raises.
pub fn analyze_search_results(engine: &Engine, query: &str, file_id: Option<i64>) -> SearchAnalysis {
    let query = query.trim();

    let failed = |error: String| SearchAnalysis {
        query: query.to_string(),
        error: Some(error),
        ..SearchAnalysis::default()
    };

    let Some(model) = engine.model() else {
        return failed(
            "API key not configured. Please set ANTHROPIC_API_KEY in your environment.".to_string(),
        );
    };
    if query.is_empty() {
        return failed("Please enter a query to analyze.".to_string());
    }

    // Scoped analysis reuses the per-file gatherer; global analysis walks
    // every indexed file until the excerpt budget is filled
    let mut ordered: Vec<(i64, String)> = Vec::new();
    let mut content_by_doc: BTreeMap<i64, Vec<DocExcerpt>> = BTreeMap::new();

    match file_id {
        Some(file_id) => {
            if let Ok(Some(file)) = engine.store().get_file(file_id) {
                ordered.push((file_id, file.filename));
                content_by_doc.insert(
                    file_id,
                    relevant_content_for_file(engine, file_id, query, EXCERPTS_PER_DOC),
                );
            }
        }
        None => {
            let files = engine
                .store()
                .list_files_with_status(crate::models::FileStatus::Indexed)
                .unwrap_or_default();
            for file in files {
                let excerpts = relevant_content_for_file(engine, file.id, query, 3);
                if !excerpts.is_empty() {
                    ordered.push((file.id, file.filename));
                    content_by_doc.insert(file.id, excerpts);
                }
                if content_by_doc.values().map(Vec::len).sum::<usize>() >= EXCERPTS_PER_DOC * 2 {
                    break;
                }
            }
        }
    }

    let total_results: usize = content_by_doc.values().map(Vec::len).sum();
    if total_results == 0 {
        return failed(format!(
            "No relevant content found for '{query}'. Try a different search term or ensure \
             documents are properly indexed."
        ));
    }

    let (context, sources) = build_context(&content_by_doc, &ordered);

    let user_message = format!(
        r#"Analyze these collective agreement excerpts to answer: "{query}"

IMPORTANT:
- Extract values EXACTLY as written in the text
- If information isn't in the excerpts, write "Not found in excerpts"
- Quote the actual contract language when possible

Document excerpts:

{context}

Provide your analysis using ONLY information from the text above. Do not add anything from general knowledge."#
    );

    match model.complete(SEARCH_ANALYSIS_SYSTEM_PROMPT, &user_message) {
        Ok(analysis) => SearchAnalysis {
            analysis,
            sources,
            query: query.to_string(),
            error: None,
        },
        Err(e) => {
            let mut result = failed(llm_error_message(&e, "search analysis"));
            result.sources = sources;
            result
        }
    }
}
