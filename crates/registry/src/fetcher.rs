//! Spec document download.

use std::sync::Arc;
use std::time::Duration;

use assembly_api::{HttpTransport, ReqwestTransport, TransportError, TransportRequest, TransportResponse};
use assembly_types::ServiceId;
use assembly_util::GatewayConfig;
use async_trait::async_trait;
use tracing::{debug, warn};

use crate::catalog::{DEFAULT_SPEC_SEQUENCE, ServiceCatalog};
use crate::error::FetchError;

/// Anything shorter is an error page, not a workbook.
pub const MIN_DOCUMENT_BYTES: usize = 100;

/// The download endpoint rejects requests without a browser-like User-Agent.
pub const DOWNLOAD_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";

const SPREADSHEET_SIGNATURES: [&[u8]; 3] = [b"PK\x03\x04", b"PK\x05\x06", b"PK\x07\x08"];

const DEFAULT_ATTEMPTS: u32 = 2;
const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(500);

/// Source of raw spec documents.
#[async_trait]
pub trait SpecDocumentFetcher: Send + Sync {
    async fn fetch(&self, service_id: &ServiceId) -> Result<Vec<u8>, FetchError>;
}

/// Downloads spec documents from the portal's download endpoint.
pub struct HttpDocumentFetcher {
    transport: Arc<dyn HttpTransport>,
    download_url: String,
    timeout: Duration,
    max_attempts: u32,
    retry_delay: Duration,
    catalog: Option<Arc<ServiceCatalog>>,
}

impl HttpDocumentFetcher {
    pub fn new(transport: Arc<dyn HttpTransport>, download_url: impl Into<String>) -> Self {
        Self {
            transport,
            download_url: download_url.into(),
            timeout: Duration::from_secs(assembly_util::config::DEFAULT_TIMEOUT_SECS),
            max_attempts: DEFAULT_ATTEMPTS,
            retry_delay: DEFAULT_RETRY_DELAY,
            catalog: None,
        }
    }

    /// Fetcher using a reqwest transport with the download User-Agent.
    pub fn from_config(config: &GatewayConfig) -> Result<Self, TransportError> {
        let transport = ReqwestTransport::new(DOWNLOAD_USER_AGENT, config.timeout())?;
        Ok(Self::new(Arc::new(transport), config.spec_download_url.clone()).with_timeout(config.timeout()))
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Total attempts for transient failures; at least one.
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Catalog consulted for each service's document sequence number.
    pub fn with_catalog(mut self, catalog: Arc<ServiceCatalog>) -> Self {
        self.catalog = Some(catalog);
        self
    }

    fn spec_sequence(&self, service_id: &ServiceId) -> u32 {
        self.catalog
            .as_ref()
            .map(|catalog| catalog.spec_sequence(service_id))
            .unwrap_or(DEFAULT_SPEC_SEQUENCE)
    }

    async fn fetch_once(&self, service_id: &ServiceId) -> Result<Vec<u8>, FetchError> {
        let request = TransportRequest::get(&self.download_url, self.timeout)
            .query("infId", service_id.as_str())
            .query("infSeq", self.spec_sequence(service_id).to_string())
            .header("User-Agent", DOWNLOAD_USER_AGENT);

        let response = match tokio::time::timeout(self.timeout, self.transport.get(request)).await {
            Ok(Ok(response)) => response,
            Ok(Err(error)) if error.is_transient() => return Err(FetchError::transient(service_id, error.to_string())),
            Ok(Err(error)) => return Err(FetchError::malformed(service_id, error.to_string())),
            Err(_) => {
                let error = TransportError::timeout(self.timeout);
                return Err(FetchError::transient(service_id, error.to_string()));
            }
        };
        check_document(service_id, response)
    }
}

#[async_trait]
impl SpecDocumentFetcher for HttpDocumentFetcher {
    async fn fetch(&self, service_id: &ServiceId) -> Result<Vec<u8>, FetchError> {
        let mut attempt = 1;
        loop {
            match self.fetch_once(service_id).await {
                Ok(document) => {
                    debug!(service_id = %service_id, bytes = document.len(), attempt, "downloaded spec document");
                    return Ok(document);
                }
                Err(error) if error.is_transient() && attempt < self.max_attempts => {
                    warn!(service_id = %service_id, attempt, %error, "spec download failed; retrying");
                    tokio::time::sleep(self.retry_delay).await;
                    attempt += 1;
                }
                Err(error) => return Err(error),
            }
        }
    }
}

/// Classify a download response and sanity-check the body.
pub fn check_document(service_id: &ServiceId, response: TransportResponse) -> Result<Vec<u8>, FetchError> {
    match response.status {
        200..=299 => {}
        404 => return Err(FetchError::not_found(service_id)),
        401 | 403 => return Err(FetchError::forbidden(service_id, response.status)),
        408 | 429 | 500..=599 => {
            return Err(FetchError::transient(service_id, format!("HTTP {}", response.status)));
        }
        status => return Err(FetchError::malformed(service_id, format!("unexpected HTTP {status}"))),
    }

    let body = response.body;
    if body.len() < MIN_DOCUMENT_BYTES {
        return Err(FetchError::malformed(
            service_id,
            format!("document is only {} bytes; expected at least {MIN_DOCUMENT_BYTES}", body.len()),
        ));
    }
    if !SPREADSHEET_SIGNATURES.iter().any(|signature| body.starts_with(signature)) {
        return Err(FetchError::malformed(service_id, "document does not carry a spreadsheet signature"));
    }
    Ok(body)
}
