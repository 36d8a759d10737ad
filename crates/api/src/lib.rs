//! Assembly open API client utilities.
//!
//! This module provides a lightweight client description for the National
//! Assembly open-data API. It focuses on:
//!
//! - Validating the configured API base URL for safety
//! - Discovering the API key from configuration or `ASSEMBLY_API_KEY`
//! - Building the shared [`HttpTransport`] with a consistent User-Agent
//!
//! The primary entry point is [`AssemblyClient`]. Create an instance via
//! [`AssemblyClient::from_config`], then hand it to the request executor.
//!
//! # Example
//!
//! ```ignore
//! use assembly_api::AssemblyClient;
//! use assembly_util::GatewayConfig;
//!
//! let config = GatewayConfig::load()?;
//! let client = AssemblyClient::from_config(&config)?;
//! println!("{}", client.endpoint_url("nzmimeepazxkubdpn"));
//! ```

mod transport;

use std::env;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use assembly_util::{ConfigError, GatewayConfig};
use thiserror::Error;
use tracing::debug;
use url::Url;

pub use transport::{
    HttpTransport, ReqwestTransport, TransportError, TransportErrorKind, TransportRequest, TransportResponse,
};

/// Hostnames allowed for local development regardless of scheme.
const LOCALHOST_DOMAINS: &[&str] = &["localhost", "127.0.0.1"];

/// Errors raised while constructing an [`AssemblyClient`].
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("invalid API base URL '{value}': {reason}")]
    InvalidBaseUrl { value: String, reason: String },
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Connection details shared by every data request: validated base URL,
/// API key, transport, and the per-attempt timeout.
#[derive(Clone)]
pub struct AssemblyClient {
    base_url: String,
    api_key: String,
    transport: Arc<dyn HttpTransport>,
    timeout: Duration,
}

impl AssemblyClient {
    /// Construct a client from configuration, building a reqwest-backed transport.
    pub fn from_config(config: &GatewayConfig) -> Result<Self, ClientError> {
        let api_key = config.require_api_key()?.to_string();
        let transport = ReqwestTransport::new(&default_user_agent(), config.timeout())?;
        Ok(Self::new(&config.api_base, api_key, Arc::new(transport))?.with_timeout(config.timeout()))
    }

    /// Construct a client around an explicit transport.
    pub fn new(
        base_url: &str,
        api_key: impl Into<String>,
        transport: Arc<dyn HttpTransport>,
    ) -> Result<Self, ClientError> {
        validate_base_url(base_url)?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            transport,
            timeout: Duration::from_secs(assembly_util::config::DEFAULT_TIMEOUT_SECS),
        })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    pub fn transport(&self) -> Arc<dyn HttpTransport> {
        Arc::clone(&self.transport)
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Join an endpoint path onto the base URL.
    pub fn endpoint_url(&self, endpoint_path: &str) -> String {
        let url = format!("{}/{}", self.base_url, endpoint_path.trim_start_matches('/'));
        debug!(%url, "resolved endpoint url");
        url
    }
}

impl fmt::Debug for AssemblyClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AssemblyClient")
            .field("base_url", &self.base_url)
            .field("api_key", &"[REDACTED]")
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// User-Agent sent with data requests.
pub fn default_user_agent() -> String {
    format!("assembly-gateway/{}; {}", env!("CARGO_PKG_VERSION"), env::consts::OS)
}

/// Validate that a base URL is acceptable for use by the client.
///
/// Rules:
/// - `localhost` or `127.0.0.1`: any scheme is allowed
/// - otherwise: scheme must be HTTPS
pub fn validate_base_url(base: &str) -> Result<(), ClientError> {
    let invalid = |reason: String| ClientError::InvalidBaseUrl {
        value: base.to_string(),
        reason,
    };
    let parsed_base_url = Url::parse(base).map_err(|e| invalid(e.to_string()))?;

    let host_name = parsed_base_url
        .host_str()
        .ok_or_else(|| invalid("URL must include a host".into()))?;

    if LOCALHOST_DOMAINS
        .iter()
        .any(|&allowed| host_name.eq_ignore_ascii_case(allowed))
    {
        return Ok(());
    }

    if parsed_base_url.scheme() != "https" {
        return Err(invalid(format!(
            "non-localhost hosts must use https; got '{}://'",
            parsed_base_url.scheme()
        )));
    }

    Ok(())
}
