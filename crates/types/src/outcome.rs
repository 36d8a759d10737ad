use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Upstream response format selected with the `Type` query parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Json,
    Xml,
}

impl OutputFormat {
    /// Value sent as the `Type` query parameter.
    pub fn as_query_value(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Xml => "xml",
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_query_value())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unsupported output format '{0}' (expected json or xml)")]
pub struct ParseOutputFormatError(pub String);

impl FromStr for OutputFormat {
    type Err = ParseOutputFormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "xml" => Ok(Self::Xml),
            _ => Err(ParseOutputFormatError(s.to_string())),
        }
    }
}

/// Application-level status carried inside an HTTP 200 body
/// (`RESULT.CODE` / `RESULT.MESSAGE`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbeddedStatus {
    pub code: String,
    pub message: String,
}

impl EmbeddedStatus {
    pub const SUCCESS_CODE: &'static str = "INFO-000";
    pub const NO_DATA_CODE: &'static str = "INFO-200";

    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.code == Self::SUCCESS_CODE
    }

    pub fn is_no_data(&self) -> bool {
        self.code == Self::NO_DATA_CODE
    }
}

/// Classification of a failed data request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Timeouts, connection resets, 5xx and rate limiting; retried before surfacing.
    Transient,
    /// Client errors and malformed bodies; surfaced immediately.
    Permanent,
    /// A non-success `RESULT.CODE` inside an otherwise successful response.
    EmbeddedApplicationError,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Transient => "transient",
            Self::Permanent => "permanent",
            Self::EmbeddedApplicationError => "embedded application error",
        };
        f.write_str(label)
    }
}

/// Normalized failure of one logical data request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("{kind} failure after {attempts} attempt(s): {message}")]
pub struct RequestFailure {
    pub kind: FailureKind,
    /// Human-readable message. For embedded errors this is the upstream message verbatim.
    pub message: String,
    pub http_status: Option<u16>,
    /// Embedded `RESULT.CODE` when the failure came from the response body.
    pub embedded_code: Option<String>,
    pub attempts: u32,
}

impl RequestFailure {
    pub fn transient(message: impl Into<String>, http_status: Option<u16>) -> Self {
        Self {
            kind: FailureKind::Transient,
            message: message.into(),
            http_status,
            embedded_code: None,
            attempts: 1,
        }
    }

    pub fn permanent(message: impl Into<String>, http_status: Option<u16>) -> Self {
        Self {
            kind: FailureKind::Permanent,
            message: message.into(),
            http_status,
            embedded_code: None,
            attempts: 1,
        }
    }

    pub fn embedded(status: EmbeddedStatus, http_status: u16) -> Self {
        Self {
            kind: FailureKind::EmbeddedApplicationError,
            message: status.message,
            http_status: Some(http_status),
            embedded_code: Some(status.code),
            attempts: 1,
        }
    }

    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts;
        self
    }

    pub fn is_transient(&self) -> bool {
        self.kind == FailureKind::Transient
    }
}

/// Result of executing a data request: exactly one of success or failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RequestOutcome {
    Success {
        /// Raw response body. Empty when the upstream reported "no data".
        payload: String,
        format: OutputFormat,
        /// Embedded status code, when the body carried one.
        embedded: Option<EmbeddedStatus>,
    },
    Failure(RequestFailure),
}

impl RequestOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// Payload of a successful outcome.
    pub fn payload(&self) -> Option<&str> {
        match self {
            Self::Success { payload, .. } => Some(payload),
            Self::Failure(_) => None,
        }
    }

    pub fn failure(&self) -> Option<&RequestFailure> {
        match self {
            Self::Success { .. } => None,
            Self::Failure(failure) => Some(failure),
        }
    }

    /// Convert into a `Result`, keeping only the payload on success.
    pub fn into_result(self) -> Result<String, RequestFailure> {
        match self {
            Self::Success { payload, .. } => Ok(payload),
            Self::Failure(failure) => Err(failure),
        }
    }
}
