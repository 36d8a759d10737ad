//! Spec document parser.
//!
//! Spec sheets are loosely laid out: a `요청주소` marker row followed by the
//! endpoint URL, a `기본인자` section with the shared parameters, a `요청인자`
//! section with the service-specific ones, and finally the `출력값` output
//! table. The parser locates those sections by marker text rather than by
//! fixed coordinates so minor layout drift between documents does not break
//! resolution.

use std::collections::HashSet;

use assembly_types::{ParameterDescriptor, ResolvedSpec, ServiceId, SpecInvariantError};
use assembly_util::config::DEFAULT_API_BASE;
use tracing::{debug, warn};
use url::Url;

use crate::error::{ParseError, SheetSection};
use crate::markers::SheetMarkers;
use crate::sheet::{SheetRows, decode_sheet, leading_cell};

/// Rows searched for the request-address marker.
pub const DEFAULT_SCAN_WINDOW: usize = 30;

/// Turns spec document bytes into a [`ResolvedSpec`].
#[derive(Debug, Clone)]
pub struct SpecParser {
    base_url: String,
    /// Path component of `base_url` without a trailing slash.
    base_path: String,
    markers: SheetMarkers,
    scan_window: usize,
}

impl Default for SpecParser {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_API_BASE.to_string(),
            base_path: "/portal/openapi".to_string(),
            markers: SheetMarkers::default(),
            scan_window: DEFAULT_SCAN_WINDOW,
        }
    }
}

impl SpecParser {
    /// Parser producing endpoint URLs under `base_url`.
    pub fn new(base_url: &str) -> Result<Self, ParseError> {
        let parsed = Url::parse(base_url).map_err(|error| ParseError::malformed_url(base_url, error.to_string()))?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            base_path: parsed.path().trim_end_matches('/').to_string(),
            ..Self::default()
        })
    }

    pub fn with_markers(mut self, markers: SheetMarkers) -> Self {
        self.markers = markers;
        self
    }

    pub fn with_scan_window(mut self, rows: usize) -> Self {
        self.scan_window = rows.max(1);
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Decode and parse a spec document.
    pub fn parse(&self, service_id: &ServiceId, document: &[u8]) -> Result<ResolvedSpec, ParseError> {
        let rows = decode_sheet(document)?;
        self.parse_rows(service_id, &rows)
    }

    /// Parse an already decoded worksheet.
    pub fn parse_rows(&self, service_id: &ServiceId, rows: &SheetRows) -> Result<ResolvedSpec, ParseError> {
        let raw_url = self.locate_endpoint_url(rows)?;
        let endpoint_path = self.endpoint_path(service_id, &raw_url)?;
        let (basic_parameters, request_parameters) = self.collect_parameters(service_id, rows)?;

        let spec = ResolvedSpec {
            service_id: service_id.clone(),
            endpoint_url: format!("{}/{}", self.base_url, endpoint_path),
            endpoint_path,
            basic_parameters,
            request_parameters,
        };
        spec.validate().map_err(|error| match error {
            SpecInvariantError::EmptyEndpoint | SpecInvariantError::UnresolvedEndpoint(_) => {
                ParseError::malformed_url(raw_url.clone(), error.to_string())
            }
            SpecInvariantError::DuplicateParameter(_) => ParseError::no_parameters(SheetSection::Request, error.to_string()),
        })?;

        debug!(
            service_id = %service_id,
            endpoint = %spec.endpoint_path,
            basic = spec.basic_parameters.len(),
            request = spec.request_parameters.len(),
            "parsed spec document"
        );
        Ok(spec)
    }

    /// Text of the URL cell on the row after the request-address marker.
    fn locate_endpoint_url(&self, rows: &SheetRows) -> Result<String, ParseError> {
        let window = rows.rows().iter().take(self.scan_window);
        let marker_row = window
            .enumerate()
            .find(|(_, row)| row.iter().any(|cell| self.markers.is_request_address(cell)))
            .map(|(index, _)| index)
            .ok_or_else(|| {
                ParseError::structure_not_found(format!(
                    "request address marker not found in the first {} rows",
                    self.scan_window
                ))
            })?;

        let url_row = rows
            .rows()
            .get(marker_row + 1)
            .ok_or_else(|| ParseError::malformed_url("", "request address marker is on the last row"))?;

        url_row
            .iter()
            .find_map(|cell| extract_url(cell))
            .ok_or_else(|| ParseError::malformed_url(url_row.join(" | "), "row after the request address holds no URL"))
    }

    /// Path of `raw_url` relative to the base URL path. The host is ignored.
    fn endpoint_path(&self, service_id: &ServiceId, raw_url: &str) -> Result<String, ParseError> {
        let url = Url::parse(raw_url).map_err(|error| ParseError::malformed_url(raw_url, error.to_string()))?;
        let remainder = url
            .path()
            .strip_prefix(self.base_path.as_str())
            .filter(|rest| rest.is_empty() || rest.starts_with('/'))
            .ok_or_else(|| {
                ParseError::malformed_url(raw_url, format!("path is not under the API base path '{}'", self.base_path))
            })?;

        let endpoint = remainder.trim_matches('/');
        if endpoint.is_empty() {
            return Err(ParseError::malformed_url(raw_url, "URL has no endpoint segment after the base path"));
        }
        if endpoint == service_id.as_str() {
            return Err(ParseError::malformed_url(raw_url, "endpoint segment equals the service identifier"));
        }
        Ok(endpoint.to_string())
    }

    fn collect_parameters(
        &self,
        service_id: &ServiceId,
        rows: &SheetRows,
    ) -> Result<(Vec<ParameterDescriptor>, Vec<ParameterDescriptor>), ParseError> {
        let mut section: Option<SheetSection> = None;
        let mut basic_seen = false;
        let mut request_seen = false;
        let mut basic = Vec::new();
        let mut request: Vec<ParameterDescriptor> = Vec::new();

        for row in rows.rows() {
            let Some((lead_index, lead)) = leading_cell(row) else {
                continue;
            };

            if self.markers.is_basic_arguments(lead) {
                if request_seen {
                    return Err(ParseError::no_parameters(
                        SheetSection::Basic,
                        "basic arguments header appears after the request arguments header",
                    ));
                }
                basic_seen = true;
                section = Some(SheetSection::Basic);
                continue;
            }
            if self.markers.is_request_arguments(lead) {
                if !basic_seen {
                    return Err(ParseError::no_parameters(
                        SheetSection::Basic,
                        "request arguments header appears before any basic arguments header",
                    ));
                }
                request_seen = true;
                section = Some(SheetSection::Request);
                continue;
            }
            if self.markers.is_output_values(lead) {
                break;
            }

            let Some(current) = section else {
                continue;
            };
            let Some(parameter) = self.parameter_from_row(&row[lead_index..]) else {
                continue;
            };
            match current {
                SheetSection::Basic => basic.push(parameter),
                SheetSection::Request => request.push(parameter),
            }
        }

        if !basic_seen {
            return Err(ParseError::no_parameters(SheetSection::Basic, "basic arguments header not found"));
        }
        if !request_seen {
            return Err(ParseError::no_parameters(SheetSection::Request, "request arguments header not found"));
        }

        Ok((basic, dedupe_parameters(service_id, request)))
    }

    /// `cells` starts at the name column; type and description follow.
    fn parameter_from_row(&self, cells: &[String]) -> Option<ParameterDescriptor> {
        let name = cells.first().filter(|name| !name.is_empty())?;
        let type_label = cells.get(1).filter(|label| !label.is_empty())?;
        if self.markers.is_column_header(type_label) {
            return None;
        }
        if !self.markers.declares_requirement(type_label) {
            debug!(parameter = %name, type_label = %type_label, "type label names no requirement; treating as optional");
        }
        let description = cells.get(2).cloned().unwrap_or_default();
        Some(ParameterDescriptor::new(
            name.clone(),
            self.markers.requirement_for(type_label),
            type_label.clone(),
            description,
        ))
    }
}

fn dedupe_parameters(service_id: &ServiceId, parameters: Vec<ParameterDescriptor>) -> Vec<ParameterDescriptor> {
    let mut seen = HashSet::new();
    parameters
        .into_iter()
        .filter(|parameter| {
            let first = seen.insert(parameter.name.clone());
            if !first {
                warn!(service_id = %service_id, parameter = %parameter.name, "duplicate request parameter ignored");
            }
            first
        })
        .collect()
}

/// The first `http(s)://` token in `cell`, ignoring bullets and trailing text.
fn extract_url(cell: &str) -> Option<String> {
    let lower = cell.to_ascii_lowercase();
    let start = lower.find("https://").or_else(|| lower.find("http://"))?;
    let url: String = cell[start..].chars().take_while(|ch| !ch.is_whitespace()).collect();
    Some(url.trim_end_matches([',', ';', ')']).to_string())
}
