//! Error taxonomy for spec resolution.
//!
//! Fetch and parse errors are local causes; the resolver wraps them in
//! [`ResolutionError`] so callers can tell "the spec source is unreachable"
//! apart from "the document layout changed". All three are `Clone` because a
//! single in-flight resolution hands the same outcome to every waiter.

use std::fmt;

use assembly_types::ServiceId;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("spec document for {service_id} not found (404)")]
    NotFound { service_id: String },
    #[error("spec document for {service_id} is restricted (HTTP {status})")]
    Forbidden { service_id: String, status: u16 },
    #[error("transient failure downloading spec for {service_id}: {message}")]
    Transient { service_id: String, message: String },
    #[error("malformed spec document for {service_id}: {message}")]
    Malformed { service_id: String, message: String },
}

impl FetchError {
    pub fn not_found(service_id: &ServiceId) -> Self {
        Self::NotFound {
            service_id: service_id.to_string(),
        }
    }

    pub fn forbidden(service_id: &ServiceId, status: u16) -> Self {
        Self::Forbidden {
            service_id: service_id.to_string(),
            status,
        }
    }

    pub fn transient(service_id: &ServiceId, message: impl Into<String>) -> Self {
        Self::Transient {
            service_id: service_id.to_string(),
            message: message.into(),
        }
    }

    pub fn malformed(service_id: &ServiceId, message: impl Into<String>) -> Self {
        Self::Malformed {
            service_id: service_id.to_string(),
            message: message.into(),
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }
}

/// Parameter sections of a spec document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SheetSection {
    Basic,
    Request,
}

impl fmt::Display for SheetSection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Basic => f.write_str("basic arguments"),
            Self::Request => f.write_str("request arguments"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("spec document structure not found: {message}")]
    StructureNotFound { message: String },
    #[error("malformed endpoint URL '{value}': {reason}")]
    MalformedUrl { value: String, reason: String },
    #[error("{section} section unusable: {reason}")]
    NoParameters { section: SheetSection, reason: String },
}

impl ParseError {
    pub fn structure_not_found(message: impl Into<String>) -> Self {
        Self::StructureNotFound { message: message.into() }
    }

    pub fn malformed_url(value: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedUrl {
            value: value.into(),
            reason: reason.into(),
        }
    }

    pub fn no_parameters(section: SheetSection, reason: impl Into<String>) -> Self {
        Self::NoParameters {
            section,
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolutionError {
    #[error("could not fetch spec for {service_id}: {source}")]
    FetchFailed {
        service_id: ServiceId,
        #[source]
        source: FetchError,
    },
    #[error("could not parse spec for {service_id}: {source}")]
    ParseFailed {
        service_id: ServiceId,
        #[source]
        source: ParseError,
    },
}

impl ResolutionError {
    pub fn service_id(&self) -> &ServiceId {
        match self {
            Self::FetchFailed { service_id, .. } | Self::ParseFailed { service_id, .. } => service_id,
        }
    }

    /// The spec source could not be reached or returned an unusable download; retry later.
    pub fn is_fetch_failure(&self) -> bool {
        matches!(self, Self::FetchFailed { .. })
    }

    /// The document was downloaded but its layout was not understood; the parser needs updating.
    pub fn is_parse_failure(&self) -> bool {
        matches!(self, Self::ParseFailed { .. })
    }
}

/// Errors raised by spec cache backends.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("spec cache I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("spec cache serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("service identifier '{0}' cannot be used as a cache key")]
    InvalidKey(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolution_error_exposes_cause_category() {
        let id = ServiceId::parse("OK7XM1000938DS17215").unwrap();
        let fetch = ResolutionError::FetchFailed {
            service_id: id.clone(),
            source: FetchError::forbidden(&id, 403),
        };
        let parse = ResolutionError::ParseFailed {
            service_id: id.clone(),
            source: ParseError::structure_not_found("request address marker missing"),
        };
        assert!(fetch.is_fetch_failure() && !fetch.is_parse_failure());
        assert!(parse.is_parse_failure() && !parse.is_fetch_failure());
        assert_eq!(parse.service_id(), &id);
        assert!(fetch.to_string().contains("restricted (HTTP 403)"));
    }
}
