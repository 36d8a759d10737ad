//! Turning one HTTP exchange into a [`RequestOutcome`].
//!
//! The upstream reports many application errors inside an HTTP 200 body, so
//! the status line alone says little. JSON bodies carry the status either at
//! the top level (`{"RESULT": {"CODE": .., "MESSAGE": ..}}`) or in the head
//! block of the endpoint-keyed envelope; XML bodies carry a `<RESULT>` element.

use assembly_api::{TransportError, TransportResponse};
use assembly_types::{EmbeddedStatus, OutputFormat, RequestFailure, RequestOutcome};
use assembly_util::http::{looks_like_markup, parse_response_json_strict, status_error_message, truncate_response_preview};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

static XML_CODE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)<CODE>\s*(?:<!\[CDATA\[)?(.*?)(?:\]\]>)?\s*</CODE>").expect("xml code regex should compile")
});
static XML_MESSAGE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)<MESSAGE>\s*(?:<!\[CDATA\[)?(.*?)(?:\]\]>)?\s*</MESSAGE>").expect("xml message regex should compile")
});

/// Failure below the status line. Timeouts and connection failures are transient.
pub fn classify_transport_error(error: &TransportError) -> RequestFailure {
    if error.is_transient() {
        RequestFailure::transient(error.to_string(), None)
    } else {
        RequestFailure::permanent(error.to_string(), None)
    }
}

/// Classify a response for `endpoint_path` requested in `format`.
pub fn classify_response(endpoint_path: &str, format: OutputFormat, response: &TransportResponse) -> RequestOutcome {
    let status = response.status;
    let text = response.text();

    if !response.is_success() {
        let message = status_error_message(status)
            .unwrap_or_else(|| format!("HTTP {status}: {}", truncate_response_preview(&text, 200)));
        let failure = match status {
            408 | 429 | 500..=599 => RequestFailure::transient(message, Some(status)),
            _ => RequestFailure::permanent(message, Some(status)),
        };
        return RequestOutcome::Failure(failure);
    }

    let embedded = match format {
        OutputFormat::Json => match parse_response_json_strict(&text, Some(status)) {
            Ok(value) => embedded_status_json(&value, endpoint_path),
            Err(error) => return RequestOutcome::Failure(RequestFailure::permanent(error.to_string(), Some(status))),
        },
        OutputFormat::Xml => {
            if !looks_like_markup(&text) {
                let preview = truncate_response_preview(&text, 200);
                return RequestOutcome::Failure(RequestFailure::permanent(
                    format!("expected an XML body; got: {preview}"),
                    Some(status),
                ));
            }
            embedded_status_xml(&text)
        }
    };

    match embedded {
        None => RequestOutcome::Success {
            payload: text,
            format,
            embedded: None,
        },
        Some(embedded) if embedded.is_success() => RequestOutcome::Success {
            payload: text,
            format,
            embedded: Some(embedded),
        },
        Some(embedded) if embedded.is_no_data() => RequestOutcome::Success {
            payload: String::new(),
            format,
            embedded: Some(embedded),
        },
        Some(embedded) => RequestOutcome::Failure(RequestFailure::embedded(embedded, status)),
    }
}

/// Embedded status of a JSON body, if it carries one.
pub fn embedded_status_json(value: &Value, endpoint_path: &str) -> Option<EmbeddedStatus> {
    if let Some(result) = value.get("RESULT") {
        return status_from_result(result);
    }
    let envelope = value.get(endpoint_path).or_else(|| {
        value
            .as_object()?
            .values()
            .find(|candidate| head_items(candidate).is_some())
    })?;
    head_items(envelope)?
        .iter()
        .find_map(|item| item.get("RESULT"))
        .and_then(status_from_result)
}

/// Items of the `head` block in `[{"head": [...]}, {"row": [...]}]`.
fn head_items(envelope: &Value) -> Option<&Vec<Value>> {
    envelope
        .as_array()?
        .iter()
        .find_map(|block| block.get("head"))?
        .as_array()
}

fn status_from_result(result: &Value) -> Option<EmbeddedStatus> {
    let code = result.get("CODE")?.as_str()?.trim();
    if code.is_empty() {
        return None;
    }
    let message = result.get("MESSAGE").and_then(Value::as_str).unwrap_or_default();
    Some(EmbeddedStatus::new(code, message))
}

/// Embedded status of an XML body: the first `<CODE>` and `<MESSAGE>` elements.
pub fn embedded_status_xml(text: &str) -> Option<EmbeddedStatus> {
    let code = XML_CODE.captures(text)?.get(1)?.as_str().trim();
    if code.is_empty() {
        return None;
    }
    let message = XML_MESSAGE
        .captures(text)
        .and_then(|captures| captures.get(1))
        .map(|message| message.as_str())
        .unwrap_or_default();
    Some(EmbeddedStatus::new(code, message))
}

/// `row` array of a JSON page for `endpoint_path`, empty when absent.
pub fn rows_in_page(value: &Value, endpoint_path: &str) -> Vec<Value> {
    value
        .get(endpoint_path)
        .and_then(Value::as_array)
        .and_then(|blocks| blocks.iter().find_map(|block| block.get("row")))
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default()
}

/// `list_total_count` from the head block of a JSON page.
pub fn total_count(value: &Value, endpoint_path: &str) -> Option<u64> {
    head_items(value.get(endpoint_path)?)?
        .iter()
        .find_map(|item| item.get("list_total_count")?.as_u64())
}
