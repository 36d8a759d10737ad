//! # HTTP Utilities
//!
//! Helpers for interpreting upstream HTTP responses: status hints, strict
//! JSON parsing with a body preview, and markup sniffing for XML bodies.

use serde_json::Value;
use thiserror::Error;

/// Return a user-friendly error message for common HTTP status codes.
///
/// # Example
/// ```rust
/// use assembly_util::http::status_error_message;
///
/// let error_401 = status_error_message(401).unwrap();
/// assert!(error_401.contains("ASSEMBLY_API_KEY"));
///
/// assert!(status_error_message(404).unwrap().contains("Not Found"));
/// assert!(status_error_message(418).is_none());
/// ```
pub fn status_error_message(status_code: u16) -> Option<String> {
    match status_code {
        401 => Some("Unauthorized (401). Hint: set ASSEMBLY_API_KEY=...".into()),
        403 => Some("Forbidden (403). Hint: the service may restrict access to its data or spec document".into()),
        404 => Some("Not Found (404). Hint: the endpoint path may have changed; invalidate the cached spec".into()),
        429 => Some("Too Many Requests (429). Hint: the daily traffic limit for this key may be exhausted".into()),
        _ => None,
    }
}

/// Parse HTTP response text into JSON, providing detailed errors on failure.
///
/// Any parsing error is decorated with the originating HTTP status code and a
/// truncated, whitespace-collapsed preview of the body.
pub fn parse_response_json_strict(text: &str, status: Option<u16>) -> Result<Value, JsonParseError> {
    serde_json::from_str::<Value>(text).map_err(|error| {
        let status_note = status
            .map(|code| format!("status {code}"))
            .unwrap_or_else(|| "unknown status".to_string());
        let preview = truncate_response_preview(text, 200);

        JsonParseError::new(status_note, error, preview)
    })
}

/// Returns `true` when the body plausibly holds XML markup.
pub fn looks_like_markup(text: &str) -> bool {
    text.trim_start_matches('\u{feff}').trim_start().starts_with('<')
}

/// Collapse whitespace and cap a response body at roughly `limit` characters.
pub fn truncate_response_preview(text: &str, limit: usize) -> String {
    if text.trim().is_empty() {
        return "<empty>".to_string();
    }

    let mut preview = String::new();
    for ch in text.chars() {
        if preview.len() >= limit {
            preview.push_str("...");
            break;
        }
        match ch {
            '\n' | '\r' | '\t' => {
                if !preview.ends_with(' ') {
                    preview.push(' ');
                }
            }
            _ => preview.push(ch),
        }
    }

    preview.trim().to_string()
}

/// Error returned when strict JSON parsing of an HTTP response fails.
#[derive(Debug, Error)]
#[error("failed to parse JSON response ({status_note}): {source}. body preview: {body_preview}")]
pub struct JsonParseError {
    status_note: String,
    #[source]
    source: serde_json::Error,
    body_preview: String,
}

impl JsonParseError {
    pub fn new(status_note: String, source: serde_json::Error, body_preview: String) -> Self {
        Self {
            status_note,
            source,
            body_preview,
        }
    }

    /// Access the truncated response preview captured during parsing.
    pub fn body_preview(&self) -> &str {
        &self.body_preview
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strict_parse_reports_status_and_preview() {
        let error = parse_response_json_strict("<html>\n<body>maintenance</body>", Some(200)).unwrap_err();
        let message = error.to_string();
        assert!(message.contains("status 200"));
        assert_eq!(error.body_preview(), "<html> <body>maintenance</body>");
    }

    #[test]
    fn strict_parse_accepts_json() {
        let value = parse_response_json_strict(r#"{"RESULT":{"CODE":"INFO-000"}}"#, None).unwrap();
        assert_eq!(value["RESULT"]["CODE"], "INFO-000");
    }

    #[test]
    fn preview_truncates_long_bodies() {
        let body = "x".repeat(500);
        let preview = truncate_response_preview(&body, 10);
        assert!(preview.ends_with("..."));
        assert!(preview.len() <= 13);
        assert_eq!(truncate_response_preview("  ", 10), "<empty>");
    }

    #[test]
    fn markup_sniffing_skips_bom_and_whitespace() {
        assert!(looks_like_markup("\u{feff}  <?xml version=\"1.0\"?><RESULT/>"));
        assert!(!looks_like_markup("{\"a\":1}"));
    }
}
