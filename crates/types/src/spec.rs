use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ServiceId;

/// Whether an upstream parameter must be supplied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Requirement {
    Required,
    Optional,
}

/// One parameter row recovered from a spec document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterDescriptor {
    /// Query parameter name exactly as the upstream expects it (e.g. `AGE`).
    pub name: String,
    pub requirement: Requirement,
    /// Free-text type label from the document, e.g. `STRING(필수)`.
    pub raw_type_label: String,
    #[serde(default)]
    pub description: String,
}

impl ParameterDescriptor {
    pub fn new(
        name: impl Into<String>,
        requirement: Requirement,
        raw_type_label: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            requirement,
            raw_type_label: raw_type_label.into(),
            description: description.into(),
        }
    }

    pub fn is_required(&self) -> bool {
        self.requirement == Requirement::Required
    }
}

/// Resolved endpoint and parameter contract for one service identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedSpec {
    pub service_id: ServiceId,
    /// Path segment appended to the API base URL (e.g. `nzmimeepazxkubdpn`).
    pub endpoint_path: String,
    /// Base URL joined with `endpoint_path`.
    pub endpoint_url: String,
    /// Shared contract: authentication key, output format, page index, page size.
    pub basic_parameters: Vec<ParameterDescriptor>,
    /// Service-specific parameters, unique by name, in document order.
    pub request_parameters: Vec<ParameterDescriptor>,
}

/// Violations of the [`ResolvedSpec`] invariants.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SpecInvariantError {
    #[error("endpoint path is empty")]
    EmptyEndpoint,
    #[error("endpoint path '{0}' equals the service identifier; resolution did not occur")]
    UnresolvedEndpoint(String),
    #[error("request parameter '{0}' is declared more than once")]
    DuplicateParameter(String),
}

impl ResolvedSpec {
    /// Check the structural invariants every resolved spec must satisfy.
    pub fn validate(&self) -> Result<(), SpecInvariantError> {
        let endpoint = self.endpoint_path.trim();
        if endpoint.is_empty() {
            return Err(SpecInvariantError::EmptyEndpoint);
        }
        if endpoint == self.service_id.as_str() {
            return Err(SpecInvariantError::UnresolvedEndpoint(endpoint.to_string()));
        }
        let mut seen = HashSet::new();
        for parameter in &self.request_parameters {
            if !seen.insert(parameter.name.as_str()) {
                return Err(SpecInvariantError::DuplicateParameter(parameter.name.clone()));
            }
        }
        Ok(())
    }

    pub fn request_parameter(&self, name: &str) -> Option<&ParameterDescriptor> {
        self.request_parameters.iter().find(|parameter| parameter.name == name)
    }

    /// Required service-specific parameters in document order.
    pub fn required_request_parameters(&self) -> impl Iterator<Item = &ParameterDescriptor> {
        self.request_parameters.iter().filter(|parameter| parameter.is_required())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(endpoint: &str, params: Vec<ParameterDescriptor>) -> ResolvedSpec {
        ResolvedSpec {
            service_id: ServiceId::parse("OK7XM1000938DS17215").unwrap(),
            endpoint_path: endpoint.to_string(),
            endpoint_url: format!("https://open.example.org/portal/openapi/{endpoint}"),
            basic_parameters: Vec::new(),
            request_parameters: params,
        }
    }

    #[test]
    fn validate_accepts_resolved_spec() {
        let spec = spec(
            "nzmimeepazxkubdpn",
            vec![
                ParameterDescriptor::new("AGE", Requirement::Required, "STRING(필수)", "대수"),
                ParameterDescriptor::new("BILL_NO", Requirement::Optional, "STRING(선택)", "의안번호"),
            ],
        );
        assert_eq!(spec.validate(), Ok(()));
        let required: Vec<_> = spec.required_request_parameters().map(|p| p.name.as_str()).collect();
        assert_eq!(required, vec!["AGE"]);
        assert!(spec.request_parameter("BILL_NO").is_some());
    }

    #[test]
    fn validate_rejects_pass_through_and_duplicates() {
        assert_eq!(spec("  ", Vec::new()).validate(), Err(SpecInvariantError::EmptyEndpoint));
        assert!(matches!(
            spec("OK7XM1000938DS17215", Vec::new()).validate(),
            Err(SpecInvariantError::UnresolvedEndpoint(_))
        ));
        let duplicated = spec(
            "nzmimeepazxkubdpn",
            vec![
                ParameterDescriptor::new("AGE", Requirement::Required, "STRING(필수)", ""),
                ParameterDescriptor::new("AGE", Requirement::Optional, "STRING(선택)", ""),
            ],
        );
        assert_eq!(duplicated.validate(), Err(SpecInvariantError::DuplicateParameter("AGE".into())));
    }
}
