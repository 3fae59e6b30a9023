//! Lexical search over the FTS5 indexes.
//!
//! Query parsing (quoted phrases vs. bare words with stopword removal),
//! FTS query building, page and chunk search with AND->OR retry, and a
//! phrase/proximity re-ranker that prioritizes heading matches.

mod rrf;

pub use rrf::{weighted_rrf_fusion, DEFAULT_RRF_K};

use std::collections::HashSet;
use std::sync::OnceLock;

use regex::Regex;

use crate::error::Result;
use crate::models::{ChunkHit, SearchResult};
use crate::storage::Store;

/// English stopwords stripped from bare query words (never from phrases).
pub const STOPWORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "by", "for", "from", "has", "he", "in", "is", "it",
    "its", "of", "on", "or", "that", "the", "to", "was", "were", "will", "with", "what", "when",
    "where", "which", "who", "why", "how", "can", "could", "would", "should", "do", "does", "did",
    "have", "had", "this", "these", "those", "i", "you", "we", "they", "my", "your", "our",
    "their",
];

fn stopword_set() -> &'static HashSet<&'static str> {
    static SET: OnceLock<HashSet<&'static str>> = OnceLock::new();
    SET.get_or_init(|| STOPWORDS.iter().copied().collect())
}

/// Term combination mode for FTS queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SearchMode {
    /// All terms must match.
    #[default]
    And,
    /// Any term may match.
    Or,
}

impl SearchMode {
    /// Parses "and"/"or"; anything else defaults to AND.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        if s.eq_ignore_ascii_case("or") {
            Self::Or
        } else {
            Self::And
        }
    }

    fn joiner(self) -> &'static str {
        match self {
            Self::And => " AND ",
            Self::Or => " OR ",
        }
    }
}

/// Options for page and chunk search.
#[derive(Debug, Clone)]
pub struct SearchOptions {
    /// Maximum results.
    pub limit: usize,
    /// Term combination mode.
    pub mode: SearchMode,
    /// Restrict to one file.
    pub file_id: Option<i64>,
    /// Retry with OR when AND finds nothing.
    pub fallback_to_or: bool,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            limit: 10,
            mode: SearchMode::And,
            file_id: None,
            fallback_to_or: true,
        }
    }
}

fn phrase_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#""([^"]+)""#).unwrap_or_else(|e| panic!("bad regex: {e}")))
}

fn non_word_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[^\w\s\-']").unwrap_or_else(|e| panic!("bad regex: {e}")))
}

fn phrase_clean_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[^\w\s]").unwrap_or_else(|e| panic!("bad regex: {e}")))
}

/// Parses a query into quoted phrases and bare words.
///
/// Stopwords and words shorter than 2 characters are dropped from the bare
/// words but never from phrases.
#[must_use]
pub fn parse_query(query: &str) -> (Vec<String>, Vec<String>) {
    let mut phrases = Vec::new();
    for caps in phrase_re().captures_iter(query) {
        let phrase = caps[1].trim();
        if !phrase.is_empty() {
            phrases.push(phrase.to_string());
        }
    }

    let remaining = phrase_re().replace_all(query, " ");
    let remaining = non_word_re().replace_all(&remaining, " ");

    let mut words = Vec::new();
    for word in remaining.split_whitespace() {
        let word = word.trim().to_lowercase();
        if word.chars().count() > 1 && !stopword_set().contains(word.as_str()) {
            words.push(word);
        }
    }

    (phrases, words)
}

/// Builds an FTS5 query from a raw user query.
///
/// Phrases become `"exact phrase"`, bare words become prefix terms
/// (`word*`, never `"word"*` which FTS5 rejects). Terms are joined with
/// AND or OR per the mode. Returns an empty string when nothing survives
/// parsing.
#[must_use]
pub fn build_fts_query(query: &str, mode: SearchMode) -> String {
    let (phrases, words) = parse_query(query);
    if phrases.is_empty() && words.is_empty() {
        return String::new();
    }

    let mut parts = Vec::with_capacity(phrases.len() + words.len());

    for phrase in &phrases {
        let clean = phrase_clean_re().replace_all(phrase, " ");
        let clean = clean.split_whitespace().collect::<Vec<_>>().join(" ");
        if !clean.is_empty() {
            parts.push(format!("\"{clean}\""));
        }
    }

    for word in &words {
        parts.push(format!("{word}*"));
    }

    if parts.is_empty() {
        return String::new();
    }
    parts.join(mode.joiner())
}

/// Searches indexed pages via FTS5.
///
/// Never raises on a bad query: returns an empty list instead. With AND
/// mode and `fallback_to_or`, a miss automatically retries with OR.
pub fn search_pages(store: &Store, query: &str, opts: &SearchOptions) -> Result<Vec<SearchResult>> {
    let fts_query = build_fts_query(query, opts.mode);
    if fts_query.is_empty() {
        return Ok(Vec::new());
    }

    let results = store.search_page_fts(&fts_query, opts.limit, opts.file_id)?;
    if !results.is_empty() || opts.mode != SearchMode::And || !opts.fallback_to_or {
        return Ok(results);
    }

    let or_query = build_fts_query(query, SearchMode::Or);
    if or_query.is_empty() || or_query == fts_query {
        return Ok(results);
    }
    store.search_page_fts(&or_query, opts.limit, opts.file_id)
}

/// Searches semantic chunks via FTS5, returning hits with heading context.
pub fn search_chunks(store: &Store, query: &str, opts: &SearchOptions) -> Result<Vec<ChunkHit>> {
    let fts_query = build_fts_query(query, opts.mode);
    if fts_query.is_empty() {
        return Ok(Vec::new());
    }

    let results = store.search_chunk_fts(&fts_query, opts.limit, opts.file_id)?;
    if !results.is_empty() || opts.mode != SearchMode::And || !opts.fallback_to_or {
        return Ok(results);
    }

    let or_query = build_fts_query(query, SearchMode::Or);
    if or_query.is_empty() || or_query == fts_query {
        return Ok(results);
    }
    store.search_chunk_fts(&or_query, opts.limit, opts.file_id)
}

/// Extracts meaningful keywords from a question for fallback search:
/// lowercased, stopwords removed, words longer than 2 characters.
#[must_use]
pub fn extract_keywords(question: &str) -> Vec<String> {
    let cleaned = non_word_re().replace_all(question, " ");
    cleaned
        .split_whitespace()
        .map(str::to_lowercase)
        .filter(|w| w.chars().count() > 2 && !stopword_set().contains(w.as_str()))
        .collect()
}

/// Composite ranking key: heading match is decisive, then exact phrase
/// occurrences, then term proximity, with the original BM25 score as the
/// final ascending tiebreaker.
fn score_result(
    store: &Store,
    result: &SearchResult,
    query: &str,
    phrases: &[String],
    words: &[String],
) -> (i32, i32, i32, f64) {
    let heading_match = page_has_heading_match(store, result.file_id, result.page_number, query)
        .map(|(matched, _)| matched)
        .unwrap_or(false);
    let heading_score = if heading_match { 100 } else { 0 };

    let snippet_lower = result.snippet.to_lowercase();

    let mut phrase_score = 0;
    for phrase in phrases {
        if snippet_lower.contains(&phrase.to_lowercase()) {
            phrase_score += 10;
        }
    }

    let mut proximity_score = 0;
    if words.len() >= 2 {
        let mut positions: Vec<usize> = words
            .iter()
            .filter_map(|w| snippet_lower.find(w.as_str()))
            .collect();
        if positions.len() >= 2 {
            positions.sort_unstable();
            for pair in positions.windows(2) {
                let gap = pair[1] - pair[0];
                if gap < 50 {
                    proximity_score += 5;
                } else if gap < 100 {
                    proximity_score += 2;
                }
            }
        }
    }

    (heading_score, phrase_score, proximity_score, result.score)
}

/// Re-ranks results to prioritize heading matches, exact phrases and term
/// proximity. Stable for hits with identical composite keys.
#[must_use]
pub fn rank_results_by_phrase_proximity(
    store: &Store,
    results: Vec<SearchResult>,
    query: &str,
) -> Vec<SearchResult> {
    if results.is_empty() {
        return results;
    }

    let (phrases, words) = parse_query(query);

    let mut scored: Vec<((i32, i32, i32, f64), SearchResult)> = results
        .into_iter()
        .map(|r| (score_result(store, &r, query, &phrases, &words), r))
        .collect();

    scored.sort_by(|(a, _), (b, _)| {
        b.0.cmp(&a.0)
            .then_with(|| b.1.cmp(&a.1))
            .then_with(|| b.2.cmp(&a.2))
            .then_with(|| a.3.partial_cmp(&b.3).unwrap_or(std::cmp::Ordering::Equal))
    });

    scored.into_iter().map(|(_, r)| r).collect()
}

fn heading_char_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[\d\-—:]").unwrap_or_else(|e| panic!("bad regex: {e}")))
}

/// Heuristic check whether a page line looks like a heading.
fn is_heading_line(line: &str, line_index: usize) -> bool {
    let line = line.trim();
    if line.is_empty() {
        return false;
    }

    let lower = line.to_lowercase();
    if lower.starts_with("article") || lower.starts_with("section") {
        return true;
    }

    // Mostly uppercase lines (>= 60% of alphabetic chars)
    let alpha: Vec<char> = line.chars().filter(|c| c.is_alphabetic()).collect();
    if !alpha.is_empty() {
        let upper = alpha.iter().filter(|c| c.is_uppercase()).count();
        if upper * 10 >= alpha.len() * 6 {
            return true;
        }
    }

    // Short lines near the top of the page with structural punctuation
    if line_index < 10 && line.chars().count() < 120 && heading_char_re().is_match(line) {
        return true;
    }

    false
}

/// Extracts candidate heading lines from page text.
#[must_use]
pub fn get_heading_lines(text: &str) -> Vec<String> {
    text.split('\n')
        .enumerate()
        .filter(|(i, line)| is_heading_line(line, *i))
        .map(|(_, line)| line.trim().to_string())
        .collect()
}

/// Checks whether the query matches a heading line on the given page.
///
/// A match is (a) the full query as a substring of the heading, (b) any
/// quoted phrase in the heading, or (c) at least half the non-stopword
/// keywords appearing in the heading.
pub fn page_has_heading_match(
    store: &Store,
    file_id: i64,
    page_number: u32,
    query: &str,
) -> Result<(bool, Option<String>)> {
    let Some(text) = store.get_page_text(file_id, page_number)? else {
        return Ok((false, None));
    };

    let headings = get_heading_lines(&text);
    if headings.is_empty() {
        return Ok((false, None));
    }

    let (phrases, words) = parse_query(query);
    let query_lower = query.to_lowercase();

    for heading in headings {
        let heading_lower = heading.to_lowercase();

        if heading_lower.contains(&query_lower) {
            return Ok((true, Some(heading)));
        }

        if phrases
            .iter()
            .any(|p| heading_lower.contains(&p.to_lowercase()))
        {
            return Ok((true, Some(heading)));
        }

        if !words.is_empty() {
            let matches = words.iter().filter(|w| heading_lower.contains(w.as_str())).count();
            if matches * 2 >= words.len() {
                return Ok((true, Some(heading)));
            }
        }
    }

    Ok((false, None))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::PageText;
    use test_case::test_case;

    fn seeded_store() -> (Store, i64) {
        let store = Store::in_memory().unwrap();
        store.init().unwrap();
        let id = store
            .insert_file("/tmp/contract.pdf", "contract.pdf", "hash", 0.0, 1)
            .unwrap();
        let pages = vec![
            PageText {
                page_number: 1,
                text: "ARTICLE 5 — SICK LEAVE\nEmployees are entitled to sick leave of 5 days per year.".to_string(),
                raw_text: String::new(),
            },
            PageText {
                page_number: 2,
                text: "Overtime is paid at one and one half times the regular rate.".to_string(),
                raw_text: String::new(),
            },
        ];
        store.replace_file_content(id, &pages, &[], &[]).unwrap();
        store.set_file_indexed(id, 2).unwrap();
        (store, id)
    }

    #[test]
    fn test_parse_query_phrases_and_words() {
        let (phrases, words) = parse_query("\"sick leave\" overtime policy");
        assert_eq!(phrases, vec!["sick leave"]);
        assert_eq!(words, vec!["overtime", "policy"]);
    }

    #[test]
    fn test_parse_query_strips_stopwords() {
        let (_, words) = parse_query("what is the overtime rate");
        assert_eq!(words, vec!["overtime", "rate"]);
    }

    #[test]
    fn test_parse_query_keeps_stopwords_in_phrases() {
        let (phrases, _) = parse_query("\"leave of absence\"");
        assert_eq!(phrases, vec!["leave of absence"]);
    }

    #[test]
    fn test_parse_query_drops_short_words() {
        let (_, words) = parse_query("x pay");
        assert_eq!(words, vec!["pay"]);
    }

    #[test_case("sick leave", SearchMode::And, "sick* AND leave*")]
    #[test_case("sick leave", SearchMode::Or, "sick* OR leave*")]
    #[test_case("\"sick leave\" pay", SearchMode::And, "\"sick leave\" AND pay*")]
    #[test_case("", SearchMode::And, "")]
    #[test_case("the of is", SearchMode::Or, ""; "only stopwords")]
    fn test_build_fts_query(query: &str, mode: SearchMode, expected: &str) {
        assert_eq!(build_fts_query(query, mode), expected);
    }

    #[test]
    fn test_bare_prefix_terms_never_quoted() {
        let q = build_fts_query("overtime", SearchMode::And);
        assert_eq!(q, "overtime*");
        assert!(!q.contains('"'));
    }

    #[test]
    fn test_search_pages_basic() {
        let (store, _) = seeded_store();
        let hits = search_pages(&store, "sick leave", &SearchOptions::default()).unwrap();
        assert!(!hits.is_empty());
        assert_eq!(hits[0].page_number, 1);
    }

    #[test]
    fn test_search_pages_empty_query() {
        let (store, _) = seeded_store();
        let hits = search_pages(&store, "", &SearchOptions::default()).unwrap();
        assert!(hits.is_empty());
    }

    #[test]
    fn test_search_pages_stopword_only_query() {
        let (store, _) = seeded_store();
        let hits = search_pages(&store, "the of and", &SearchOptions::default()).unwrap();
        assert!(hits.is_empty());
    }

    #[test]
    fn test_and_falls_back_to_or() {
        let (store, _) = seeded_store();
        // "sick" and "overtime" never co-occur on a page; OR retry finds both
        let hits = search_pages(&store, "sick overtime", &SearchOptions::default()).unwrap();
        assert_eq!(hits.len(), 2);

        let no_fallback = SearchOptions {
            fallback_to_or: false,
            ..SearchOptions::default()
        };
        let hits = search_pages(&store, "sick overtime", &no_fallback).unwrap();
        assert!(hits.is_empty());
    }

    #[test]
    fn test_search_scoped_to_file() {
        let (store, id) = seeded_store();
        let scoped = SearchOptions {
            file_id: Some(id + 100),
            ..SearchOptions::default()
        };
        let hits = search_pages(&store, "sick", &scoped).unwrap();
        assert!(hits.is_empty());
    }

    #[test]
    fn test_extract_keywords() {
        let kw = extract_keywords("What is the sick leave policy?");
        assert_eq!(kw, vec!["sick", "leave", "policy"]);
    }

    #[test]
    fn test_heading_lines() {
        let text = "ARTICLE 5 — SICK LEAVE\nplain sentence follows here with lowercase words that run long enough to not be short\nSection 2 Hours";
        let headings = get_heading_lines(text);
        assert!(headings.contains(&"ARTICLE 5 — SICK LEAVE".to_string()));
        assert!(headings.contains(&"Section 2 Hours".to_string()));
    }

    #[test]
    fn test_page_has_heading_match() {
        let (store, id) = seeded_store();
        let (matched, heading) =
            page_has_heading_match(&store, id, 1, "sick leave").unwrap();
        assert!(matched);
        assert_eq!(heading.as_deref(), Some("ARTICLE 5 — SICK LEAVE"));
    }

    #[test]
    fn test_page_has_heading_match_miss() {
        let (store, id) = seeded_store();
        let (matched, _) =
            page_has_heading_match(&store, id, 2, "pension contributions").unwrap();
        assert!(!matched);
    }

    #[test]
    fn test_page_heading_match_missing_page() {
        let (store, id) = seeded_store();
        let (matched, heading) = page_has_heading_match(&store, id, 99, "sick").unwrap();
        assert!(!matched);
        assert!(heading.is_none());
    }

    #[test]
    fn test_rerank_prioritizes_heading_match() {
        let (store, id) = seeded_store();

        let plain = SearchResult {
            file_id: id,
            file_path: "/tmp/contract.pdf".to_string(),
            filename: "contract.pdf".to_string(),
            page_number: 2,
            snippet: "overtime pay rules".to_string(),
            score: 0.1,
        };
        let heading_page = SearchResult {
            file_id: id,
            file_path: "/tmp/contract.pdf".to_string(),
            filename: "contract.pdf".to_string(),
            page_number: 1,
            snippet: "entitled to benefits".to_string(),
            score: 5.0,
        };

        let ranked =
            rank_results_by_phrase_proximity(&store, vec![plain, heading_page], "sick leave");
        assert_eq!(ranked[0].page_number, 1);
    }

    #[test]
    fn test_rerank_phrase_beats_scatter() {
        let (store, id) = seeded_store();
        let phrase_hit = SearchResult {
            file_id: id,
            file_path: String::new(),
            filename: String::new(),
            page_number: 7,
            snippet: "the bereavement leave clause".to_string(),
            score: 9.0,
        };
        let scatter_hit = SearchResult {
            file_id: id,
            file_path: String::new(),
            filename: String::new(),
            page_number: 8,
            snippet: "bereavement mentioned, and later leave".to_string(),
            score: 0.5,
        };
        let ranked = rank_results_by_phrase_proximity(
            &store,
            vec![scatter_hit, phrase_hit],
            "\"bereavement leave\"",
        );
        assert_eq!(ranked[0].page_number, 7);
    }

    #[test]
    fn test_rerank_empty() {
        let (store, _) = seeded_store();
        assert!(rank_results_by_phrase_proximity(&store, Vec::new(), "q").is_empty());
    }
}
