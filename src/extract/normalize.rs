//! Text normalization for extracted PDF pages.
//!
//! PDF renderers break words across lines and scatter spurious spaces
//! mid-word. The passes here repair those artifacts deterministically:
//! dehyphenation, spurious-split rejoining, whitespace normalization and
//! repeated header/footer stripping.

use std::collections::{HashMap, HashSet};
use std::sync::OnceLock;

use regex::Regex;

/// Common 2-3 letter English words that must NOT be joined to the following
/// word by the spurious-split fixer.
const COMMON_SHORT_WORDS: &[&str] = &[
    // 2-letter
    "ad", "ah", "am", "an", "as", "at", "ax", "be", "by", "do", "go", "ha", "he", "hi", "ho", "if",
    "in", "is", "it", "ma", "me", "mr", "ms", "my", "no", "of", "oh", "ok", "on", "or", "ow", "ox",
    "so", "to", "up", "us", "we",
    // 3-letter
    "abs", "ace", "act", "add", "age", "ago", "aid", "aim", "air", "all", "and", "any", "apt",
    "arc", "are", "ark", "arm", "art", "ask", "ate", "bad", "bag", "ban", "bar", "bat", "bay",
    "bed", "bet", "bid", "big", "bit", "bow", "box", "boy", "bud", "bug", "bun", "bus", "but",
    "buy", "cab", "can", "cap", "car", "cat", "cop", "cow", "cry", "cup", "cut", "dad", "dam",
    "day", "did", "die", "dig", "dim", "dip", "dog", "dot", "dry", "dub", "due", "dug", "dye",
    "ear", "eat", "egg", "ego", "end", "era", "eve", "eye", "fan", "far", "fat", "fax", "fed",
    "fee", "few", "fig", "fin", "fit", "fix", "fly", "fog", "for", "fox", "fry", "fun", "fur",
    "gap", "gas", "get", "god", "got", "gum", "gun", "gut", "guy", "gym", "had", "ham", "has",
    "hat", "hay", "hen", "her", "hid", "him", "hip", "his", "hit", "hog", "hop", "hot", "how",
    "hub", "hug", "hut", "ice", "icy", "ill", "ink", "inn", "ion", "its", "ivy", "jam", "jar",
    "jaw", "jay", "jet", "job", "jog", "joy", "jug", "key", "kid", "kin", "kit", "lab", "lad",
    "lag", "lap", "law", "lay", "led", "leg", "let", "lid", "lie", "lip", "lit", "log", "lot",
    "low", "mad", "man", "map", "mat", "max", "may", "men", "met", "mid", "mix", "mob", "mod",
    "mom", "mop", "mud", "mug", "nap", "net", "new", "nil", "nod", "nor", "not", "now", "nun",
    "nut", "oak", "oar", "oat", "odd", "off", "oft", "oil", "old", "one", "opt", "ore", "our",
    "out", "owe", "owl", "own", "pad", "pal", "pan", "par", "pat", "paw", "pay", "pea", "peg",
    "pen", "per", "pet", "pie", "pig", "pin", "pit", "ply", "pod", "pop", "pot", "pro", "pry",
    "pub", "pun", "pup", "put", "rag", "ram", "ran", "rap", "rat", "raw", "ray", "red", "ref",
    "rib", "rid", "rig", "rim", "rip", "rob", "rod", "rot", "row", "rub", "rug", "rum", "run",
    "rut", "rye", "sad", "sag", "sap", "sat", "saw", "say", "sea", "set", "sew", "she", "shy",
    "sin", "sip", "sir", "sis", "sit", "six", "ski", "sky", "sly", "sob", "sod", "son", "sow",
    "soy", "spa", "spy", "sub", "sue", "sum", "sun", "tab", "tag", "tan", "tap", "tar", "tax",
    "tea", "ten", "the", "thy", "tie", "tin", "tip", "toe", "ton", "too", "top", "tot", "tow",
    "toy", "try", "tub", "tug", "two", "urn", "use", "van", "vat", "vet", "via", "vow", "wad",
    "wag", "war", "was", "wax", "way", "web", "wed", "wet", "who", "why", "wig", "win", "wit",
    "woe", "wok", "won", "woo", "wow", "yam", "yap", "yaw", "yea", "yes", "yet", "yew", "you",
    "zap", "zen", "zip", "zoo",
];

fn short_word_set() -> &'static HashSet<&'static str> {
    static SET: OnceLock<HashSet<&'static str>> = OnceLock::new();
    SET.get_or_init(|| COMMON_SHORT_WORDS.iter().copied().collect())
}

fn hyphen_break_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(\w+)-\n(\w+)").unwrap_or_else(|e| panic!("bad regex: {e}")))
}

/// Fixes line-break hyphenation where words are split across lines.
///
/// Joins `"bene-\nfits"` into `"benefits"` only when the continuation starts
/// with a lowercase letter; compound words that happen to sit at a line
/// break (`"pre-\nApproved"`) keep their hyphen.
#[must_use]
pub fn dehyphenate(text: &str) -> String {
    hyphen_break_re()
        .replace_all(text, |caps: &regex::Captures<'_>| {
            let first = &caps[1];
            let second = &caps[2];
            if second.chars().next().is_some_and(char::is_lowercase) {
                format!("{first}{second}")
            } else {
                format!("{first}-{second}")
            }
        })
        .into_owned()
}

/// A whitespace-delimited token split into its word core and trailing
/// punctuation, used by the spurious-split passes.
struct Token<'a> {
    core: &'a str,
    suffix: &'a str,
}

fn split_token(token: &str) -> Token<'_> {
    let end = token
        .char_indices()
        .rev()
        .take_while(|(_, c)| matches!(c, '.' | ',' | ';' | ':' | '!' | '?' | ')'))
        .last()
        .map_or(token.len(), |(i, _)| i);
    Token {
        core: &token[..end],
        suffix: &token[end..],
    }
}

/// True for a single lowercase letter that is not a word on its own
/// ('a' and 'i' are real words and are left alone).
fn is_orphan_letter(core: &str) -> bool {
    let mut chars = core.chars();
    matches!(
        (chars.next(), chars.next()),
        (Some(c), None) if c.is_ascii_lowercase() && c != 'a' && c != 'i'
    )
}

fn is_all_lowercase(core: &str) -> bool {
    !core.is_empty() && core.chars().all(|c| c.is_ascii_lowercase())
}

fn ends_with_word_chars(core: &str, min: usize) -> bool {
    core.chars().count() >= min
        && core
            .chars()
            .rev()
            .take(min)
            .all(|c| c.is_alphanumeric() || c == '_')
}

/// Rejoins spurious splits caused by PDF text extraction, one line at a
/// time. Passes run in a fixed order so that letter pairs like `"o f"` are
/// merged before the trailing/leading-letter passes consume them.
fn repair_spurious_splits(line: &str) -> String {
    let mut tokens: Vec<String> = line.split_whitespace().map(str::to_string).collect();

    // Pass 1: two adjacent orphan letters - "o f" -> "of"
    tokens = join_adjacent(&tokens, |a, b| {
        is_orphan_letter(a.core) && a.suffix.is_empty() && is_orphan_letter(b.core)
    });

    // Pass 2: trailing orphan letter after a word - "member s" -> "members"
    tokens = join_adjacent(&tokens, |a, b| {
        ends_with_word_chars(a.core, 2) && a.suffix.is_empty() && is_orphan_letter(b.core)
    });

    // Pass 3: leading orphan letter before a continuation - "e mployee" -> "employee"
    tokens = join_adjacent(&tokens, |a, b| {
        is_orphan_letter(a.core)
            && a.suffix.is_empty()
            && is_all_lowercase(b.core)
            && b.core.chars().count() >= 2
    });

    // Pass 4: short fragment before a longer continuation - "pe rform" -> "perform",
    // gated by the common-word denylist so "to day" stays split.
    tokens = join_adjacent(&tokens, |a, b| {
        let len = a.core.chars().count();
        (2..=3).contains(&len)
            && is_all_lowercase(a.core)
            && a.suffix.is_empty()
            && !short_word_set().contains(a.core)
            && is_all_lowercase(b.core)
            && b.core.chars().count() >= 3
    });

    tokens.join(" ")
}

/// Joins each adjacent token pair for which `should_join` holds. A joined
/// token is not re-joined with the following one in the same pass.
fn join_adjacent(tokens: &[String], should_join: impl Fn(&Token<'_>, &Token<'_>) -> bool) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(tokens.len());
    let mut i = 0;
    while i < tokens.len() {
        if i + 1 < tokens.len() {
            let a = split_token(&tokens[i]);
            let b = split_token(&tokens[i + 1]);
            if should_join(&a, &b) {
                out.push(format!("{}{}{}", a.core, b.core, b.suffix));
                i += 2;
                continue;
            }
        }
        out.push(tokens[i].clone());
        i += 1;
    }
    out
}

/// Normalizes text for consistent indexing.
///
/// - Dehyphenates line-break splits
/// - Rejoins spurious single-letter and short-fragment splits
/// - Normalizes whitespace (CRLF -> LF, collapses runs per line)
/// - Drops empty lines
#[must_use]
pub fn normalize_text(text: &str) -> String {
    let text = dehyphenate(text);
    let text = text.replace("\r\n", "\n").replace('\r', "\n");

    let mut lines = Vec::new();
    for line in text.split('\n') {
        let repaired = repair_spurious_splits(line);
        if !repaired.is_empty() {
            lines.push(repaired);
        }
    }
    lines.join("\n")
}

fn article_line_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)^(article|section)\s+").unwrap_or_else(|e| panic!("bad regex: {e}"))
    })
}

/// Detects lines that appear on many pages (likely headers/footers).
///
/// Requires at least 3 pages; returns lines present on >= `threshold` of
/// pages. Article/Section heading lines are never treated as repeated.
#[must_use]
pub fn detect_repeated_lines(pages: &[String], threshold: f64) -> HashSet<String> {
    if pages.len() < 3 {
        return HashSet::new();
    }

    let mut line_counts: HashMap<&str, usize> = HashMap::new();
    for page_text in pages {
        // Unique lines per page so in-page duplicates count once
        let mut page_lines: HashSet<&str> = HashSet::new();
        for line in page_text.split('\n') {
            let normalized = line.trim();
            if normalized.chars().count() > 2 {
                page_lines.insert(normalized);
            }
        }
        for line in page_lines {
            *line_counts.entry(line).or_insert(0) += 1;
        }
    }

    let min_occurrences = (pages.len() as f64 * threshold) as usize;
    line_counts
        .into_iter()
        .filter(|&(line, count)| count >= min_occurrences && !article_line_re().is_match(line))
        .map(|(line, _)| line.to_string())
        .collect()
}

/// Removes repeated header/footer lines from page text.
#[must_use]
pub fn remove_repeated_lines(text: &str, repeated_lines: &HashSet<String>) -> String {
    if repeated_lines.is_empty() {
        return text.to_string();
    }
    text.split('\n')
        .filter(|line| !repeated_lines.contains(line.trim()))
        .collect::<Vec<_>>()
        .join("\n")
}
