//! Cross-cutting helpers shared by the gateway crates: configuration loading,
//! secret redaction, response inspection and cell-text normalization.

pub mod config;
pub mod http;
pub mod path_processing;
pub mod text_processing;

pub use config::{ConfigError, GatewayConfig};
pub use path_processing::{expand_tilde, is_safe_file_stem};
pub use text_processing::{contains_any_marker, contains_marker, normalize_cell_text, redact_sensitive};
