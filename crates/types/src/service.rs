use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// Opaque identifier naming one upstream data service (e.g. `OK7XM1000938DS17215`).
///
/// The identifier is not a network address. It is only meaningful as the key
/// used to download the service's spreadsheet document and to address cached
/// specs. Cloning is cheap.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ServiceId {
    inner: Arc<str>,
}

/// Error returned when a service identifier is blank or contains characters
/// that cannot be used as a cache file stem.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid service identifier '{value}': {reason}")]
pub struct InvalidServiceId {
    pub value: String,
    pub reason: &'static str,
}

impl ServiceId {
    /// Parse and validate an identifier. Surrounding whitespace is trimmed.
    pub fn parse(value: &str) -> Result<Self, InvalidServiceId> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(InvalidServiceId {
                value: value.to_string(),
                reason: "identifier is empty",
            });
        }
        if !trimmed.chars().all(|ch| ch.is_ascii_alphanumeric() || ch == '_' || ch == '-') {
            return Err(InvalidServiceId {
                value: value.to_string(),
                reason: "identifier may only contain ASCII letters, digits, '_' or '-'",
            });
        }
        Ok(Self { inner: Arc::from(trimmed) })
    }

    pub fn as_str(&self) -> &str {
        &self.inner
    }
}

impl fmt::Display for ServiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.inner)
    }
}

impl fmt::Debug for ServiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ServiceId({})", self.inner)
    }
}

impl FromStr for ServiceId {
    type Err = InvalidServiceId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl AsRef<str> for ServiceId {
    fn as_ref(&self) -> &str {
        &self.inner
    }
}

impl Serialize for ServiceId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.inner)
    }
}

impl<'de> Deserialize<'de> for ServiceId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        ServiceId::parse(&raw).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_trims_and_accepts_upstream_identifiers() {
        let id = ServiceId::parse("  OK7XM1000938DS17215 ").unwrap();
        assert_eq!(id.as_str(), "OK7XM1000938DS17215");
        assert_eq!(id.to_string(), "OK7XM1000938DS17215");
    }

    #[test]
    fn parse_rejects_blank_and_path_like_values() {
        assert!(ServiceId::parse("   ").is_err());
        let err = ServiceId::parse("../etc/passwd").unwrap_err();
        assert!(err.to_string().contains("../etc/passwd"));
    }

    #[test]
    fn serde_uses_plain_string_form() {
        let id = ServiceId::parse("OWSSC6001134T516707").unwrap();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"OWSSC6001134T516707\"");
        let back: ServiceId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
        assert!(serde_json::from_str::<ServiceId>("\"\"").is_err());
    }
}
