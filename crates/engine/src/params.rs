//! Caller-supplied request parameters and their validation against a spec.

use assembly_types::{ResolvedSpec, ServiceId};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Authentication key query parameter.
pub const KEY_PARAM: &str = "KEY";
/// Output format query parameter (`json` or `xml`).
pub const TYPE_PARAM: &str = "Type";
/// One-based page index query parameter.
pub const PAGE_INDEX_PARAM: &str = "pIndex";
/// Page size query parameter.
pub const PAGE_SIZE_PARAM: &str = "pSize";

/// Ordered `name -> value` map of service parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestParams {
    values: IndexMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("expected NAME=VALUE, got '{0}'")]
pub struct ParamParseError(pub String);

impl RequestParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        let mut params = Self::new();
        for (name, value) in pairs {
            params.insert(name, value);
        }
        params
    }

    /// Split `NAME=VALUE` at the first `=`. The name is trimmed and must not be empty.
    pub fn parse_pair(raw: &str) -> Result<(String, String), ParamParseError> {
        let (name, value) = raw.split_once('=').ok_or_else(|| ParamParseError(raw.to_string()))?;
        let name = name.trim();
        if name.is_empty() {
            return Err(ParamParseError(raw.to_string()));
        }
        Ok((name.to_string(), value.to_string()))
    }

    /// Insert or replace a value, returning the previous one.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.values.insert(name.into(), value.into())
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    /// Present with a non-blank value.
    pub fn has_value(&self, name: &str) -> bool {
        self.get(name).is_some_and(|value| !value.trim().is_empty())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(name, value)| (name.as_str(), value.as_str()))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for RequestParams {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self::from_pairs(iter)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("missing required parameter(s) for {service_id}: {}", .names.join(", "))]
    MissingRequired { service_id: ServiceId, names: Vec<String> },
}

impl ValidationError {
    pub fn missing_names(&self) -> &[String] {
        match self {
            Self::MissingRequired { names, .. } => names,
        }
    }
}

/// Every required request parameter must be supplied with a non-blank value.
/// Missing names are reported in document order.
pub fn validate(spec: &ResolvedSpec, params: &RequestParams) -> Result<(), ValidationError> {
    let names: Vec<String> = spec
        .required_request_parameters()
        .filter(|parameter| !params.has_value(&parameter.name))
        .map(|parameter| parameter.name.clone())
        .collect();
    if names.is_empty() {
        Ok(())
    } else {
        Err(ValidationError::MissingRequired {
            service_id: spec.service_id.clone(),
            names,
        })
    }
}
