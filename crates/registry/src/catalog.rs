//! Service catalog: the master list of open-data services.
//!
//! The upstream publishes its service list through the `OPENSRVAPI` endpoint.
//! Each row names a service identifier, a title, a category and the URL of
//! its spec document. The catalog is optional: resolution works without it,
//! but it supplies the document sequence number and lets `sync` prefetch
//! every known service.

use std::fs;
use std::path::Path;

use assembly_types::ServiceId;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

/// Endpoint path of the master service list.
pub const MASTER_LIST_ENDPOINT: &str = "OPENSRVAPI";

/// Document sequence used when the catalog does not name one.
pub const DEFAULT_SPEC_SEQUENCE: u32 = 2;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    #[serde(rename = "INF_ID")]
    pub service_id: ServiceId,
    #[serde(rename = "INF_NM", default)]
    pub name: String,
    #[serde(rename = "CATE_NM", default)]
    pub category: String,
    #[serde(rename = "DDC_URL", default)]
    pub document_url: Option<String>,
}

impl CatalogEntry {
    /// `infSeq` query value of the spec document URL, when present.
    pub fn spec_sequence(&self) -> Option<u32> {
        let url = Url::parse(self.document_url.as_deref()?).ok()?;
        url.query_pairs()
            .find(|(key, _)| key == "infSeq")
            .and_then(|(_, value)| value.parse().ok())
    }
}

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("catalog I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("catalog JSON error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("catalog payload holds no OPENSRVAPI row list")]
    MissingRows,
}

/// Known services keyed by identifier, in listing order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServiceCatalog {
    entries: IndexMap<ServiceId, CatalogEntry>,
}

impl ServiceCatalog {
    pub fn from_entries(entries: impl IntoIterator<Item = CatalogEntry>) -> Self {
        let mut catalog = Self::default();
        catalog.extend(entries);
        catalog
    }

    /// Read a catalog file: either a JSON array of entries or a raw master
    /// list response page.
    pub fn load(path: &Path) -> Result<Self, CatalogError> {
        let content = fs::read_to_string(path)?;
        let value: Value = serde_json::from_str(&content)?;
        let catalog = match value {
            Value::Array(_) => Self::from_entries(serde_json::from_value::<Vec<CatalogEntry>>(value)?),
            other => Self::from_entries(rows_from_master_list(&other)?),
        };
        debug!(path = %path.display(), services = catalog.len(), "loaded service catalog");
        Ok(catalog)
    }

    pub fn save(&self, path: &Path) -> Result<(), CatalogError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let entries: Vec<&CatalogEntry> = self.entries.values().collect();
        fs::write(path, serde_json::to_vec_pretty(&entries)?)?;
        Ok(())
    }

    /// Later entries for the same identifier replace earlier ones.
    pub fn extend(&mut self, entries: impl IntoIterator<Item = CatalogEntry>) {
        for entry in entries {
            self.entries.insert(entry.service_id.clone(), entry);
        }
    }

    pub fn get(&self, service_id: &ServiceId) -> Option<&CatalogEntry> {
        self.entries.get(service_id)
    }

    pub fn contains(&self, service_id: &ServiceId) -> bool {
        self.entries.contains_key(service_id)
    }

    /// Document sequence for `service_id`, falling back to [`DEFAULT_SPEC_SEQUENCE`].
    pub fn spec_sequence(&self, service_id: &ServiceId) -> u32 {
        self.get(service_id)
            .and_then(CatalogEntry::spec_sequence)
            .unwrap_or(DEFAULT_SPEC_SEQUENCE)
    }

    pub fn service_ids(&self) -> impl Iterator<Item = &ServiceId> {
        self.entries.keys()
    }

    pub fn entries(&self) -> impl Iterator<Item = &CatalogEntry> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Rows of one master list response page:
/// `{"OPENSRVAPI": [{"head": [...]}, {"row": [...]}]}`.
///
/// Rows without a usable `INF_ID` are skipped.
pub fn rows_from_master_list(payload: &Value) -> Result<Vec<CatalogEntry>, CatalogError> {
    let rows = payload
        .get(MASTER_LIST_ENDPOINT)
        .and_then(Value::as_array)
        .and_then(|blocks| blocks.iter().find_map(|block| block.get("row")))
        .and_then(Value::as_array)
        .ok_or(CatalogError::MissingRows)?;

    let entries = rows
        .iter()
        .filter_map(|row| match serde_json::from_value::<CatalogEntry>(row.clone()) {
            Ok(entry) => Some(entry),
            Err(error) => {
                warn!(%error, "skipping unusable catalog row");
                None
            }
        })
        .collect();
    Ok(entries)
}

/// `list_total_count` of a master list response page, if present.
pub fn master_list_total(payload: &Value) -> Option<u64> {
    payload
        .get(MASTER_LIST_ENDPOINT)?
        .as_array()?
        .iter()
        .filter_map(|block| block.get("head")?.as_array())
        .flatten()
        .find_map(|item| item.get("list_total_count")?.as_u64())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn master_page() -> Value {
        json!({
            "OPENSRVAPI": [
                {"head": [{"list_total_count": 3}, {"RESULT": {"CODE": "INFO-000", "MESSAGE": "정상 처리되었습니다."}}]},
                {"row": [
                    {"INF_ID": "OK7XM1000938DS17215", "INF_NM": "국회의원 인적사항", "CATE_NM": "국회의원",
                     "DDC_URL": "https://open.assembly.go.kr/portal/data/openapi/downloadOpenApiSpec.do?infId=OK7XM1000938DS17215&infSeq=1"},
                    {"INF_ID": "OOWY4R001216HX11439", "INF_NM": "본회의 일정", "CATE_NM": "의사일정", "DDC_URL": null},
                    {"INF_NM": "identifier missing"}
                ]}
            ]
        })
    }

    #[test]
    fn master_list_rows_become_entries() {
        let entries = rows_from_master_list(&master_page()).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(master_list_total(&master_page()), Some(3));

        let catalog = ServiceCatalog::from_entries(entries);
        let first = ServiceId::parse("OK7XM1000938DS17215").unwrap();
        let second = ServiceId::parse("OOWY4R001216HX11439").unwrap();
        assert_eq!(catalog.spec_sequence(&first), 1);
        assert_eq!(catalog.spec_sequence(&second), DEFAULT_SPEC_SEQUENCE);
        assert_eq!(catalog.service_ids().next(), Some(&first));
    }

    #[test]
    fn payload_without_rows_is_rejected() {
        let error = rows_from_master_list(&json!({"RESULT": {"CODE": "INFO-300"}})).unwrap_err();
        assert!(matches!(error, CatalogError::MissingRows));
    }

    #[test]
    fn save_and_load_round_trip_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catalog.json");
        let catalog = ServiceCatalog::from_entries(rows_from_master_list(&master_page()).unwrap());
        catalog.save(&path).unwrap();
        assert_eq!(ServiceCatalog::load(&path).unwrap(), catalog);

        let raw = dir.path().join("raw.json");
        std::fs::write(&raw, master_page().to_string()).unwrap();
        assert_eq!(ServiceCatalog::load(&raw).unwrap().len(), 2);
    }
}
