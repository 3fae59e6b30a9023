//! Table detection and rendering.
//!
//! Grids are recovered from whitespace-aligned rows of the raw page text
//! (2+ space or tab column separators over consecutive lines). Each grid is
//! rendered to a padded markdown table and flagged when its content looks
//! like wage/rate data.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// An extracted table from a PDF page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableData {
    /// Page number (1-indexed).
    pub page_number: u32,
    /// Table index within the page (0-indexed).
    pub table_index: u32,
    /// Column headers (first grid row).
    pub headers: Vec<String>,
    /// Data rows.
    pub rows: Vec<Vec<String>>,
    /// Markdown-formatted rendering.
    pub markdown_text: String,
    /// Heading above the table, when one was found on the page.
    pub context_heading: Option<String>,
    /// Whether the table looks like wage/rate data.
    pub is_wage_table: bool,
}

fn decimal_amount_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\d+\.\d{2}").unwrap_or_else(|e| panic!("bad regex: {e}")))
}

fn column_split_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\t| {2,}").unwrap_or_else(|e| panic!("bad regex: {e}")))
}

/// Header tokens that flag a table as wage data. Kept in one place so
/// corpora with other currency conventions can extend the set.
pub const WAGE_HEADER_TOKENS: &[&str] = &[
    "$", "rate", "salary", "wage", "pay", "step", "hour", "annual",
];

/// Heuristic to detect whether a table contains wage/rate data.
///
/// Looks for currency and rate keywords in the headers, then for dollar
/// amounts or percentages in the first five rows.
#[must_use]
pub fn detect_wage_table(headers: &[String], rows: &[Vec<String>]) -> bool {
    let header_text = headers
        .iter()
        .filter(|h| !h.is_empty())
        .map(|h| h.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ");
    if WAGE_HEADER_TOKENS.iter().any(|kw| header_text.contains(kw)) {
        return true;
    }

    let checked = rows.len().min(5);
    let mut money_count = 0usize;
    for row in &rows[..checked] {
        let row_text = row
            .iter()
            .filter(|c| !c.is_empty())
            .cloned()
            .collect::<Vec<_>>()
            .join(" ");
        if row_text.contains('$') || decimal_amount_re().is_match(&row_text) {
            money_count += 1;
        }
        if row_text.contains('%') {
            money_count += 1;
        }
    }

    money_count >= checked.min(2) && checked > 0
}

fn clean_cell(value: &str) -> String {
    value.trim().replace('|', "/").replace('\n', " ")
}

fn pad(cell: &str, width: usize) -> String {
    let len = cell.chars().count();
    if len >= width {
        cell.to_string()
    } else {
        let mut out = String::with_capacity(width);
        out.push_str(cell);
        for _ in len..width {
            out.push(' ');
        }
        out
    }
}

/// Formats table data as a markdown table string with left-aligned padded
/// columns. `|` inside cells is escaped as `/`.
#[must_use]
pub fn format_table_as_markdown(headers: &[String], rows: &[Vec<String>]) -> String {
    if headers.is_empty() && rows.is_empty() {
        return String::new();
    }

    let num_cols = headers
        .len()
        .max(rows.iter().map(Vec::len).max().unwrap_or(0));
    if num_cols == 0 {
        return String::new();
    }

    let mut clean_headers: Vec<String> = headers.iter().map(|h| clean_cell(h)).collect();
    clean_headers.resize(num_cols, String::new());

    let clean_rows: Vec<Vec<String>> = rows
        .iter()
        .map(|row| {
            let mut cells: Vec<String> = row.iter().map(|c| clean_cell(c)).collect();
            cells.resize(num_cols, String::new());
            cells
        })
        .collect();

    let mut col_widths: Vec<usize> = clean_headers
        .iter()
        .map(|h| h.chars().count().max(3))
        .collect();
    for row in &clean_rows {
        for (i, cell) in row.iter().enumerate() {
            col_widths[i] = col_widths[i].max(cell.chars().count());
        }
    }

    let mut lines = Vec::with_capacity(clean_rows.len() + 2);

    let header_line = format!(
        "| {} |",
        clean_headers
            .iter()
            .enumerate()
            .map(|(i, h)| pad(h, col_widths[i]))
            .collect::<Vec<_>>()
            .join(" | ")
    );
    lines.push(header_line);

    let sep_line = format!(
        "| {} |",
        col_widths
            .iter()
            .map(|w| "-".repeat(*w))
            .collect::<Vec<_>>()
            .join(" | ")
    );
    lines.push(sep_line);

    for row in &clean_rows {
        let row_line = format!(
            "| {} |",
            row.iter()
                .enumerate()
                .map(|(i, c)| pad(c, col_widths[i]))
                .collect::<Vec<_>>()
                .join(" | ")
        );
        lines.push(row_line);
    }

    lines.join("\n")
}

/// Finds the most likely heading from page text that provides context for
/// tables on the page. Checks the first 10 lines for Article/Section-style
/// lines or short ALL-CAPS lines.
#[must_use]
pub fn find_context_heading(page_text: &str) -> Option<String> {
    if page_text.is_empty() {
        return None;
    }

    for line in page_text.trim().split('\n').take(10) {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if is_structural_prefix(line) {
            return Some(line.to_string());
        }
        let len = line.chars().count();
        if len > 5
            && len < 80
            && line == line.to_uppercase()
            && line.chars().next().is_some_and(char::is_alphabetic)
        {
            return Some(line.to_string());
        }
    }

    None
}

fn is_structural_prefix(line: &str) -> bool {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(ARTICLE|Article|SECTION|Section|SCHEDULE|Schedule|APPENDIX|Appendix)")
            .unwrap_or_else(|e| panic!("bad regex: {e}"))
    })
    .is_match(line)
}

/// A raw table grid recovered from page text.
#[derive(Debug, Clone)]
pub struct TableGrid {
    /// All grid rows, header row first.
    pub rows: Vec<Vec<String>>,
}

/// Recovers table grids from raw page text.
///
/// A grid is a run of 2 or more consecutive lines that each split into 2 or
/// more cells on tab or 2+-space boundaries. Runs shorter than 2 rows are
/// not tables.
#[must_use]
pub fn detect_table_grids(raw_text: &str) -> Vec<TableGrid> {
    let mut grids = Vec::new();
    let mut current: Vec<Vec<String>> = Vec::new();

    for line in raw_text.split('\n') {
        let cells: Vec<String> = column_split_re()
            .split(line.trim_end())
            .map(|c| c.trim().to_string())
            .collect();
        let non_empty = cells.iter().filter(|c| !c.is_empty()).count();

        if cells.len() >= 2 && non_empty >= 2 {
            current.push(cells);
        } else {
            if current.len() >= 2 {
                grids.push(TableGrid {
                    rows: std::mem::take(&mut current),
                });
            }
            current.clear();
        }
    }
    if current.len() >= 2 {
        grids.push(TableGrid { rows: current });
    }

    grids
}

/// Extracts tables from one page of raw text.
///
/// Grids with fewer than 2 rows or only empty cells are rejected. The
/// cleaned page text supplies the context heading.
#[must_use]
pub fn extract_tables_from_page(
    raw_text: &str,
    cleaned_text: &str,
    page_number: u32,
) -> Vec<TableData> {
    let grids = detect_table_grids(raw_text);
    if grids.is_empty() {
        return Vec::new();
    }

    let context_heading = find_context_heading(cleaned_text);
    let mut tables = Vec::new();

    for (idx, grid) in grids.into_iter().enumerate() {
        if grid.rows.len() < 2 {
            continue;
        }

        let headers: Vec<String> = grid.rows[0].iter().map(|c| c.trim().to_string()).collect();
        let rows: Vec<Vec<String>> = grid.rows[1..]
            .iter()
            .map(|row| row.iter().map(|c| c.trim().to_string()).collect())
            .collect();

        // Skip grids that are all empty
        let any_content = headers.iter().any(|c| !c.is_empty())
            || rows.iter().flatten().any(|c| !c.is_empty());
        if !any_content {
            continue;
        }

        let is_wage = detect_wage_table(&headers, &rows);
        let markdown = format_table_as_markdown(&headers, &rows);
        if markdown.is_empty() {
            continue;
        }

        tables.push(TableData {
            page_number,
            table_index: idx as u32,
            headers,
            rows,
            markdown_text: markdown,
            context_heading: context_heading.clone(),
            is_wage_table: is_wage,
        });
    }

    tables
}
