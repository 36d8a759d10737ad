//! Marker vocabulary used to locate sections inside a spec sheet.

use assembly_types::Requirement;
use assembly_util::{contains_any_marker, normalize_cell_text};

/// Tokens recognized in spec documents. Matching is case-insensitive and
/// ignores whitespace, so `요청 주소` and `Request Address` both hit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetMarkers {
    pub request_address: Vec<String>,
    pub basic_arguments: Vec<String>,
    pub request_arguments: Vec<String>,
    /// Any of these ends parameter collection.
    pub output_values: Vec<String>,
    pub required: Vec<String>,
    pub optional: Vec<String>,
    /// Type-column captions of table header rows (`타입`, `Type`).
    pub header_type_labels: Vec<String>,
}

impl Default for SheetMarkers {
    fn default() -> Self {
        Self {
            request_address: owned(&["요청주소", "request address", "request url"]),
            basic_arguments: owned(&["기본인자", "basic arguments", "basic parameters"]),
            request_arguments: owned(&["요청인자", "request arguments", "request parameters"]),
            output_values: owned(&["출력값", "출력명", "output values", "output fields"]),
            required: owned(&["필수", "required"]),
            optional: owned(&["선택", "optional"]),
            header_type_labels: owned(&["타입", "type", "유형"]),
        }
    }
}

impl SheetMarkers {
    pub fn is_request_address(&self, cell: &str) -> bool {
        contains_any_marker(cell, &self.request_address)
    }

    pub fn is_basic_arguments(&self, cell: &str) -> bool {
        contains_any_marker(cell, &self.basic_arguments)
    }

    pub fn is_request_arguments(&self, cell: &str) -> bool {
        contains_any_marker(cell, &self.request_arguments)
    }

    pub fn is_output_values(&self, cell: &str) -> bool {
        contains_any_marker(cell, &self.output_values)
    }

    /// Rows whose type cell is exactly a caption like `타입` are table headers.
    pub fn is_column_header(&self, type_label: &str) -> bool {
        let label = normalize_cell_text(type_label).to_lowercase();
        self.header_type_labels
            .iter()
            .any(|caption| normalize_cell_text(caption).to_lowercase() == label)
    }

    /// `Required` when the label carries a required token, otherwise `Optional`.
    pub fn requirement_for(&self, type_label: &str) -> Requirement {
        if contains_any_marker(type_label, &self.required) {
            Requirement::Required
        } else {
            Requirement::Optional
        }
    }

    /// Whether the label names its requirement explicitly either way.
    pub fn declares_requirement(&self, type_label: &str) -> bool {
        contains_any_marker(type_label, &self.required) || contains_any_marker(type_label, &self.optional)
    }
}

fn owned(tokens: &[&str]) -> Vec<String> {
    tokens.iter().map(|token| token.to_string()).collect()
}
