//! Gateway configuration.
//!
//! Settings come from an optional JSON file (`~/.config/assembly/config.json`
//! on most platforms, overridable with `ASSEMBLY_CONFIG_PATH`) with
//! environment variables layered on top. A missing file yields defaults; a
//! file that cannot be parsed is logged and ignored.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use dirs_next::{cache_dir, config_dir};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::expand_tilde;

pub const CONFIG_PATH_ENV: &str = "ASSEMBLY_CONFIG_PATH";
pub const API_KEY_ENV: &str = "ASSEMBLY_API_KEY";
pub const API_BASE_ENV: &str = "ASSEMBLY_API_BASE";
pub const SPEC_DOWNLOAD_URL_ENV: &str = "ASSEMBLY_SPEC_DOWNLOAD_URL";
pub const SPEC_CACHE_DIR_ENV: &str = "ASSEMBLY_SPEC_CACHE_DIR";
pub const TIMEOUT_SECS_ENV: &str = "ASSEMBLY_TIMEOUT_SECS";
pub const CATALOG_PATH_ENV: &str = "ASSEMBLY_CATALOG_PATH";

pub const DEFAULT_API_BASE: &str = "https://open.assembly.go.kr/portal/openapi";
pub const DEFAULT_SPEC_DOWNLOAD_URL: &str = "https://open.assembly.go.kr/portal/data/openapi/downloadOpenApiSpec.do";
pub const DEFAULT_TIMEOUT_SECS: u64 = 8;
pub const DEFAULT_PAGE_SIZE: u32 = 100;

/// Errors surfaced while loading or interpreting configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("config serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("invalid value '{value}' for {name}")]
    InvalidEnvValue { name: &'static str, value: String },
    #[error("ASSEMBLY_API_KEY is not set; export it or add \"api_key\" to the config file")]
    MissingApiKey,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub api_key: Option<String>,
    pub api_base: String,
    pub spec_download_url: String,
    pub spec_cache_dir: Option<String>,
    pub timeout_secs: u64,
    pub default_page_size: u32,
    /// Master service list location; defaults to `<cache_dir>/assembly/catalog.json`.
    pub catalog_path: Option<String>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_base: DEFAULT_API_BASE.to_string(),
            spec_download_url: DEFAULT_SPEC_DOWNLOAD_URL.to_string(),
            spec_cache_dir: None,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            default_page_size: DEFAULT_PAGE_SIZE,
            catalog_path: None,
        }
    }
}

impl GatewayConfig {
    /// Load the config file from its default location and apply environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::load_file(&default_config_path())?;
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Read a config file; missing or unparsable files produce defaults.
    pub fn load_file(path: &Path) -> Result<Self, ConfigError> {
        match fs::read_to_string(path) {
            Ok(content) => match serde_json::from_str(&content) {
                Ok(config) => Ok(config),
                Err(error) => {
                    warn!(path = %path.display(), error = %error, "Failed to parse config file; using defaults");
                    Ok(Self::default())
                }
            },
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(error) => Err(ConfigError::Io(error)),
        }
    }

    /// Overlay values from `ASSEMBLY_*` environment variables.
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(api_key) = non_empty_env(API_KEY_ENV) {
            self.api_key = Some(api_key);
        }
        if let Some(api_base) = non_empty_env(API_BASE_ENV) {
            self.api_base = api_base;
        }
        if let Some(download_url) = non_empty_env(SPEC_DOWNLOAD_URL_ENV) {
            self.spec_download_url = download_url;
        }
        if let Some(cache_dir) = non_empty_env(SPEC_CACHE_DIR_ENV) {
            self.spec_cache_dir = Some(cache_dir);
        }
        if let Some(catalog_path) = non_empty_env(CATALOG_PATH_ENV) {
            self.catalog_path = Some(catalog_path);
        }
        if let Some(raw_timeout) = non_empty_env(TIMEOUT_SECS_ENV) {
            self.timeout_secs = raw_timeout
                .parse::<u64>()
                .ok()
                .filter(|secs| *secs > 0)
                .ok_or(ConfigError::InvalidEnvValue {
                    name: TIMEOUT_SECS_ENV,
                    value: raw_timeout,
                })?;
        }
        Ok(())
    }

    pub fn require_api_key(&self) -> Result<&str, ConfigError> {
        self.api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
            .ok_or(ConfigError::MissingApiKey)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }

    /// Directory holding one cached spec record per service identifier.
    pub fn spec_cache_dir(&self) -> PathBuf {
        match self.spec_cache_dir.as_deref() {
            Some(dir) if !dir.trim().is_empty() => expand_tilde(dir),
            _ => default_cache_root().join("specs"),
        }
    }

    pub fn catalog_path(&self) -> PathBuf {
        match self.catalog_path.as_deref() {
            Some(path) if !path.trim().is_empty() => expand_tilde(path),
            _ => default_cache_root().join("catalog.json"),
        }
    }
}

/// Get the default path for the gateway configuration file.
pub fn default_config_path() -> PathBuf {
    if let Some(path) = non_empty_env(CONFIG_PATH_ENV) {
        return expand_tilde(&path);
    }

    config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("assembly")
        .join("config.json")
}

fn default_cache_root() -> PathBuf {
    cache_dir().unwrap_or_else(|| PathBuf::from(".")).join("assembly")
}

fn non_empty_env(name: &str) -> Option<String> {
    env::var(name).ok().map(|value| value.trim().to_string()).filter(|value| !value.is_empty())
}
