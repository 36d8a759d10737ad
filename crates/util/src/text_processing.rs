//! # Text Processing Utilities
//!
//! Secret redaction for log lines and the whitespace/case folding used when
//! matching marker tokens inside spreadsheet cells.

use once_cell::sync::Lazy;
use regex::Regex;

/// Redacts values that look like secrets in a string.
///
/// Query parameters such as `KEY=...`, `NAME_TOKEN: ...` style assignments and
/// `Authorization` headers keep their key names while the value is replaced
/// with `[REDACTED]`.
///
/// # Example
/// ```rust
/// use assembly_util::redact_sensitive;
///
/// let url = "https://open.assembly.go.kr/portal/openapi/abc?KEY=0123abcd&Type=json";
/// assert_eq!(
///     redact_sensitive(url),
///     "https://open.assembly.go.kr/portal/openapi/abc?KEY=[REDACTED]&Type=json"
/// );
/// ```
pub fn redact_sensitive(input: &str) -> String {
    redact_sensitive_with(input, "[REDACTED]")
}

/// Redacts sensitive-looking values, using a custom replacement token.
pub fn redact_sensitive_with(input: &str, replacement: &str) -> String {
    let mut redacted = input.to_string();
    for pattern in REDACT_PATTERNS.iter() {
        redacted = pattern
            .replace_all(&redacted, |captures: &regex::Captures| {
                let prefix = captures.get(1).map(|m| m.as_str()).unwrap_or("");
                format!("{prefix}{replacement}")
            })
            .to_string();
    }
    redacted
}

static REDACT_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?i)(authorization:\s*)((?:bearer\s+|basic\s+)?\S+)",
        r#"(?i)(\b[a-z0-9_]*(?:key|token|secret|password)\s*[=:]\s*)([^\s&"',]+)"#,
    ]
    .iter()
    .filter_map(|pattern| Regex::new(pattern).ok())
    .collect()
});

/// Normalize a raw cell value: non-breaking and ideographic spaces become
/// ASCII spaces, whitespace runs collapse to one space, and the result is trimmed.
pub fn normalize_cell_text(raw: &str) -> String {
    raw.split(|ch: char| ch.is_whitespace() || ch == '\u{a0}' || ch == '\u{3000}')
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Case-insensitive substring match that ignores all whitespace on both sides.
///
/// Spec documents pad marker cells differently across years (`요청주소`,
/// `요청 주소`, `[ 요청주소 ]`), so matching never relies on equality.
pub fn contains_marker(haystack: &str, marker: &str) -> bool {
    let needle = squash(marker);
    if needle.is_empty() {
        return false;
    }
    squash(haystack).contains(&needle)
}

/// Returns `true` when any of `markers` occurs in `haystack` (see [`contains_marker`]).
pub fn contains_any_marker<S: AsRef<str>>(haystack: &str, markers: &[S]) -> bool {
    markers.iter().any(|marker| contains_marker(haystack, marker.as_ref()))
}

fn squash(value: &str) -> String {
    value
        .chars()
        .filter(|ch| !ch.is_whitespace() && *ch != '\u{a0}' && *ch != '\u{3000}')
        .flat_map(char::to_lowercase)
        .collect()
}
