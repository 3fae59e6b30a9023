//! Heading detection for collective agreement documents.
//!
//! An ordered pattern table classifies lines into heading levels:
//! Articles/Schedules (level 1), Sections and numbered clauses (level 2),
//! lettered and Roman subsections (level 3). The first matching pattern
//! wins.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Classification of how a heading was recognized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HeadingKind {
    /// `ARTICLE 5`, `Art. IV`.
    Article,
    /// `SECTION 3.1`.
    Section,
    /// Decimal-numbered clause, e.g. `7.01 Overtime`.
    Numbered,
    /// Roman enumerator, e.g. `IV. Grievances`.
    Roman,
    /// Lettered subsection, e.g. `(a) ...`.
    Lettered,
    /// Roman subsection, e.g. `(ii) ...`.
    RomanSub,
    /// `SCHEDULE A`, `APPENDIX 2`, `EXHIBIT B`.
    Appendix,
    /// `LETTER OF UNDERSTANDING`.
    Letter,
    /// ALL-CAPS short line.
    Caps,
    /// Matched a known ALL-CAPS keyword (PREAMBLE, GRIEVANCE, ...).
    Keyword,
}

/// A detected heading with its position in the document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Heading {
    /// 1 = Article, 2 = Section, 3 = Subsection.
    pub level: u8,
    /// The full heading line.
    pub text: String,
    /// Page the heading appears on (1-indexed).
    pub page_number: u32,
    /// Line index within the page (1-indexed).
    pub line_number: u32,
    /// How the heading was recognized.
    pub kind: HeadingKind,
}

struct Pattern {
    re: Regex,
    level: u8,
    kind: HeadingKind,
}

fn compile(pattern: &str) -> Regex {
    Regex::new(pattern).unwrap_or_else(|e| panic!("invalid heading pattern {pattern:?}: {e}"))
}

/// Ordered heading pattern table. ALL-CAPS rules are case-sensitive, the
/// rest are case-insensitive.
fn patterns() -> &'static [Pattern] {
    static PATTERNS: OnceLock<Vec<Pattern>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        vec![
            // ARTICLE patterns (level 1)
            Pattern {
                re: compile(r"(?i)^ARTICLE\s+([IVXLCDM]+|\d+)[:\s]*[-–—]?\s*(.*)$"),
                level: 1,
                kind: HeadingKind::Article,
            },
            Pattern {
                re: compile(r"(?i)^ART\.?\s*([IVXLCDM]+|\d+)[:\s]*[-–—]?\s*(.*)$"),
                level: 1,
                kind: HeadingKind::Article,
            },
            // SECTION patterns (level 2), including decimal notation
            Pattern {
                re: compile(r"(?i)^SECTION\s+(\d+(?:\.\d+)?)[:\s]*[-–—]?\s*(.*)$"),
                level: 2,
                kind: HeadingKind::Section,
            },
            Pattern {
                re: compile(r"(?i)^Sec\.?\s*(\d+(?:\.\d+)?)[:\s]*[-–—]?\s*(.*)$"),
                level: 2,
                kind: HeadingKind::Section,
            },
            // Decimal numbered clauses common in contracts: 7.01, 12.03, 15.1.2
            Pattern {
                re: compile(r"^(\d+\.\d{2})\s+(.+)$"),
                level: 2,
                kind: HeadingKind::Numbered,
            },
            Pattern {
                re: compile(r"^(\d+\.\d+(?:\.\d+)?)\s+(.+)$"),
                level: 2,
                kind: HeadingKind::Numbered,
            },
            // Roman numeral sections (level 2)
            Pattern {
                re: compile(r"(?i)^([IVXLCDM]+)\.\s+(.+)$"),
                level: 2,
                kind: HeadingKind::Roman,
            },
            // Lettered subsections with content: (a) ..., A. ..., a) ...
            Pattern {
                re: compile(r"(?i)^\(([a-z])\)\s+(.{10,})$"),
                level: 3,
                kind: HeadingKind::Lettered,
            },
            Pattern {
                re: compile(r"(?i)^([a-z])\.\s+(.{10,})$"),
                level: 3,
                kind: HeadingKind::Lettered,
            },
            Pattern {
                re: compile(r"(?i)^([a-z])\)\s+(.{10,})$"),
                level: 3,
                kind: HeadingKind::Lettered,
            },
            // Roman numeral subsections: (i), (ii), (iii)
            Pattern {
                re: compile(r"(?i)^\(([ivxlcdm]+)\)\s+(.+)$"),
                level: 3,
                kind: HeadingKind::RomanSub,
            },
            // SCHEDULE/APPENDIX patterns (level 1)
            Pattern {
                re: compile(r"(?i)^(SCHEDULE|APPENDIX|EXHIBIT)\s+([A-Z]|\d+)[:\s]*[-–—]?\s*(.*)$"),
                level: 1,
                kind: HeadingKind::Appendix,
            },
            // LETTER OF UNDERSTANDING (level 1)
            Pattern {
                re: compile(r"(?i)^LETTER\s+OF\s+(UNDERSTANDING|AGREEMENT)[:\s]*(.*)$"),
                level: 1,
                kind: HeadingKind::Letter,
            },
            // ALL CAPS headings (case-sensitive by construction)
            Pattern {
                re: compile(r"^([A-Z][A-Z\s]{4,50})$"),
                level: 2,
                kind: HeadingKind::Caps,
            },
        ]
    })
}

/// Phrases that indicate a heading even without numbering.
const HEADING_KEYWORDS: &[&str] = &[
    "PREAMBLE",
    "DEFINITIONS",
    "RECOGNITION",
    "MANAGEMENT RIGHTS",
    "UNION SECURITY",
    "GRIEVANCE",
    "ARBITRATION",
    "DISCIPLINE",
    "SENIORITY",
    "LAYOFF",
    "RECALL",
    "HOURS OF WORK",
    "OVERTIME",
    "HOLIDAYS",
    "VACATION",
    "SICK LEAVE",
    "LEAVE OF ABSENCE",
    "BENEFITS",
    "INSURANCE",
    "PENSION",
    "WAGES",
    "SALARIES",
    "CLASSIFICATIONS",
    "PROBATION",
    "TRAINING",
    "SAFETY",
    "HEALTH",
    "DURATION",
    "TERMINATION",
    "GENERAL PROVISIONS",
    "APPENDIX",
    "SCHEDULE",
    "LETTER OF UNDERSTANDING",
    "MEMORANDUM",
];

/// Detects whether a line is a heading and determines its level.
///
/// Lines shorter than 3 or longer than 100 characters are never headings.
#[must_use]
pub fn detect_heading(line: &str, line_number: u32, page_number: u32) -> Option<Heading> {
    let line = line.trim();
    let char_count = line.chars().count();
    if char_count < 3 || char_count > 100 {
        return None;
    }

    for pattern in patterns() {
        if pattern.re.is_match(line) {
            return Some(Heading {
                level: pattern.level,
                text: line.to_string(),
                page_number,
                line_number,
                kind: pattern.kind,
            });
        }
    }

    // Keyword-based headings (ALL CAPS keyword set)
    let upper_line = line.to_uppercase();
    for keyword in HEADING_KEYWORDS {
        if upper_line == *keyword || upper_line.starts_with(&format!("{keyword} ")) {
            let level = if matches!(*keyword, "PREAMBLE" | "DEFINITIONS") {
                1
            } else {
                2
            };
            return Some(Heading {
                level,
                text: line.to_string(),
                page_number,
                line_number,
                kind: HeadingKind::Keyword,
            });
        }
    }

    None
}

fn section_number_patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        vec![
            compile(r"(?i)ARTICLE\s+([IVXLCDM]+|\d+)"),
            compile(r"(?i)SECTION\s+(\d+(?:\.\d+)?)"),
            compile(r"^(\d+\.\d+(?:\.\d+)?)"),
        ]
    })
}

/// Extracts the section/article number from a heading line, if present.
#[must_use]
pub fn extract_section_number(heading_text: &str) -> Option<String> {
    for pattern in section_number_patterns() {
        if let Some(caps) = pattern.captures(heading_text) {
            if let Some(m) = caps.get(1) {
                return Some(m.as_str().to_string());
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test]
    fn test_article_heading_level_one() {
        let h = detect_heading("ARTICLE 5 — Sick Time", 1, 1).unwrap();
        assert_eq!(h.level, 1);
        assert_eq!(h.kind, HeadingKind::Article);
    }

    #[test]
    fn test_decimal_heading_level_two() {
        let h = detect_heading("7.01 Overtime", 3, 2).unwrap();
        assert_eq!(h.level, 2);
        assert_eq!(h.kind, HeadingKind::Numbered);
        assert_eq!(h.page_number, 2);
        assert_eq!(h.line_number, 3);
    }

    #[test_case("Article IV: Grievances", 1; "roman article")]
    #[test_case("ART. 3 Wages", 1; "abbreviated article")]
    #[test_case("SECTION 4.2 - Hours", 2; "section")]
    #[test_case("IV.  General Conditions", 2; "roman enumerator")]
    #[test_case("SCHEDULE A — Wage Rates", 1; "schedule")]
    #[test_case("LETTER OF UNDERSTANDING", 1; "letter of understanding")]
    #[test_case("(a) Employees shall be notified in writing", 3; "lettered")]
    #[test_case("(ii) the second condition applies", 3; "roman sub")]
    fn test_heading_levels(line: &str, level: u8) {
        let h = detect_heading(line, 1, 1).unwrap();
        assert_eq!(h.level, level, "line {line:?}");
    }

    #[test]
    fn test_all_caps_heading() {
        let h = detect_heading("HOURS OF WORK", 1, 1).unwrap();
        assert_eq!(h.level, 2);
    }

    #[test]
    fn test_keyword_heading_mixed_case() {
        // Not ALL CAPS, so the caps pattern misses; the keyword set catches it
        let h = detect_heading("Grievance Procedure", 1, 1);
        assert!(h.is_some());
    }

    #[test]
    fn test_preamble_is_level_one() {
        let h = detect_heading("PREAMBLE", 1, 1).unwrap();
        assert_eq!(h.level, 1);
    }

    #[test]
    fn test_long_line_not_heading() {
        let long = "ARTICLE 5 ".repeat(15);
        assert!(detect_heading(&long, 1, 1).is_none());
    }

    #[test]
    fn test_short_line_not_heading() {
        assert!(detect_heading("ab", 1, 1).is_none());
        assert!(detect_heading("", 1, 1).is_none());
    }

    #[test]
    fn test_body_text_not_heading() {
        assert!(detect_heading("the employee shall receive pay", 1, 1).is_none());
    }

    #[test]
    fn test_lettered_requires_content() {
        // Fewer than 10 trailing chars is an enumerator fragment, not a heading
        assert!(detect_heading("(a) short", 1, 1).is_none());
    }

    #[test_case("ARTICLE 5 — Sick Time", Some("5"))]
    #[test_case("Article IV Grievances", Some("IV"))]
    #[test_case("Section 3.2 Hours", Some("3.2"))]
    #[test_case("7.01 Overtime", Some("7.01"))]
    #[test_case("HOURS OF WORK", None)]
    fn test_extract_section_number(text: &str, expected: Option<&str>) {
        assert_eq!(extract_section_number(text).as_deref(), expected);
    }
}
