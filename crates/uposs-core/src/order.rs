//! Order Extractor: candidate order identifiers from file names, and the
//! operator-supplied order filter used by bounded runs.

use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;

/// Parenthesised text, ASCII or full-width.
static PARENS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\([^)]*\)|（[^）]*）").expect("static regex"));

/// Token separators: ASCII comma, full-width comma, hyphen.
static SEPARATOR_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[,，\-]").expect("static regex"));

static TOKEN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9]{3,}$").expect("static regex"));

/// Extract candidate order identifiers from `file_name`, left to right.
///
/// The extension is dropped, parenthesised substrings are removed, the rest
/// is split on commas and hyphens, and only alphanumeric tokens of at least
/// three characters survive. An empty result means the name is unusable.
pub fn extract_order_candidates(file_name: &str) -> Vec<String> {
    let stem = Path::new(file_name)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let stripped = PARENS_RE.replace_all(&stem, "");

    SEPARATOR_RE
        .split(&stripped)
        .map(str::trim)
        .filter(|token| TOKEN_RE.is_match(token))
        .map(str::to_string)
        .collect()
}

/// Split an operator-entered order list on ASCII or full-width commas.
pub fn parse_order_filter(input: &str) -> Vec<String> {
    input
        .split([',', '，'])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Whether `file_name` contains any filter token (case-sensitive).
/// An empty filter accepts everything.
pub fn matches_order_filter(file_name: &str, filter: &[String]) -> bool {
    filter.is_empty() || filter.iter().any(|token| file_name.contains(token.as_str()))
}
