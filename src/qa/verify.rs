//! Answer verification.
//!
//! Two independent checks: format validation (bold heading, bullet
//! character, per-bullet citations, bullet cap) and content verification
//! (every dollar amount, percentage, duration and long-form date in the
//! answer must appear in the packed source text). Verification warnings
//! are attached to the response; they never alter the answer.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Result of format validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FormatValidation {
    /// True when no issues were found.
    pub valid: bool,
    /// Human-readable issues.
    pub issues: Vec<String>,
}

/// Canonical "not found" phrases; responses containing one bypass all
/// format checks. Matching is exact-phrase on these English forms,
/// case-folded.
pub const NOT_FOUND_PHRASES: &[&str] = &[
    "not found in the documents",
    "not found in documents",
    "no information available",
];

fn citation_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\[Source\s*\d+(?:\s*,\s*Source\s*\d+)*\]")
            .unwrap_or_else(|e| panic!("bad regex: {e}"))
    })
}

fn heading_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\*\*[^*]+\*\*").unwrap_or_else(|e| panic!("bad regex: {e}")))
}

/// True when the response is a canonical "not found" answer.
#[must_use]
pub fn is_not_found_response(answer: &str) -> bool {
    let lower = answer.to_lowercase();
    NOT_FOUND_PHRASES.iter().any(|phrase| lower.contains(phrase))
}

/// Validates that a response follows the required citation and formatting
/// rules. "Not found" responses bypass all checks.
#[must_use]
pub fn validate_response(answer: &str, heading_expected: bool) -> FormatValidation {
    if is_not_found_response(answer) {
        return FormatValidation {
            valid: true,
            issues: Vec::new(),
        };
    }

    let mut issues = Vec::new();

    // Check 1: bold heading at the start, when expected
    if heading_expected && !heading_re().is_match(answer.trim()) {
        issues.push(
            "Missing heading: Response should start with bold heading (e.g., **Article Title**)"
                .to_string(),
        );
    }

    // Check 2: at least one [Source N] citation
    let has_citations = citation_re().is_match(answer);
    if !has_citations {
        issues.push("Missing citations: No [Source X] citations found in response".to_string());
    }

    // Check 3: the bullet character appears
    let bullet_count = answer.matches('•').count();
    if bullet_count == 0 {
        issues.push(
            "Missing bullet points: Response should use bullet points with the bullet character"
                .to_string(),
        );
    }

    // Check 4: every bullet's first line carries a citation
    if bullet_count > 0 {
        let bullet_parts: Vec<&str> = answer
            .split('•')
            .skip(1) // text before the first bullet is heading/intro
            .collect();
        let mut uncited = Vec::new();
        for (i, bullet) in bullet_parts.iter().enumerate() {
            let first_line = bullet.split('\n').next().unwrap_or("").trim();
            if first_line.is_empty() || first_line.to_lowercase().starts_with("source") {
                continue;
            }
            if !citation_re().is_match(bullet) {
                uncited.push(i + 1);
            }
        }
        if !uncited.is_empty() {
            issues.push(format!(
                "Uncited bullets: Bullet(s) {uncited:?} missing [Source X] citation"
            ));
        }
    }

    // Check 5: bullet cap
    if bullet_count > 6 {
        issues.push(format!(
            "Too many bullets: Found {bullet_count} bullets, maximum is 6"
        ));
    }

    FormatValidation {
        valid: issues.is_empty(),
        issues,
    }
}

fn dollar_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\$[\d,]+(?:\.\d{1,2})?").unwrap_or_else(|e| panic!("bad regex: {e}"))
    })
}

fn percent_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\d+(?:\.\d+)?%").unwrap_or_else(|e| panic!("bad regex: {e}")))
}

fn duration_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)(\d+)\s+(days?|hours?|weeks?|months?|years?|shifts?)")
            .unwrap_or_else(|e| panic!("bad regex: {e}"))
    })
}

fn date_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)(?:January|February|March|April|May|June|July|August|September|October|November|December)\s+\d{1,2},?\s+\d{4}")
            .unwrap_or_else(|e| panic!("bad regex: {e}"))
    })
}

/// Verifies that specific values in the answer appear in the source text.
///
/// Extracts dollar amounts, percentages, durations and long-form dates
/// from the answer and searches the concatenated source text for each
/// (case-insensitive, with comma-stripped and unit-adjacent variants).
/// Returns one warning per value not found.
#[must_use]
pub fn verify_content_against_sources(answer: &str, context_parts: &[String]) -> Vec<String> {
    let mut warnings = Vec::new();
    let source_text = context_parts.join(" ").to_lowercase();

    for m in dollar_re().find_iter(answer) {
        let amount = m.as_str();
        let normalized = amount.replace(',', "").to_lowercase();
        let bare_number = normalized.trim_start_matches('$').to_string();
        let found = source_text.contains(&normalized)
            || source_text.contains(&amount.to_lowercase())
            || source_text.contains(&bare_number);
        if !found {
            warnings.push(format!("Unverified dollar amount: {amount}"));
        }
    }

    for m in percent_re().find_iter(answer) {
        let pct = m.as_str();
        if !source_text.contains(&pct.to_lowercase()) {
            warnings.push(format!("Unverified percentage: {pct}"));
        }
    }

    for caps in duration_re().captures_iter(answer) {
        let number = &caps[1];
        let unit = caps[2].to_lowercase();
        let variants = [
            format!("{number} {unit}"),
            format!("({number}) {unit}"),
            format!("{number}{unit}"),
        ];
        if !variants.iter().any(|v| source_text.contains(v)) {
            warnings.push(format!("Unverified duration: {number} {}", &caps[2]));
        }
    }

    for m in date_re().find_iter(answer) {
        let date = m.as_str();
        if !source_text.contains(&date.to_lowercase()) {
            warnings.push(format!("Unverified date: {date}"));
        }
    }

    warnings
}
