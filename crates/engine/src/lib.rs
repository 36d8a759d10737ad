//! # Assembly Engine
//!
//! Executes data requests against resolved service specs.
//!
//! ## Key Features
//!
//! - **Validation**: required request parameters are checked before any network call
//! - **Retries**: transient failures are retried with jittered exponential backoff
//! - **Embedded status**: application codes carried inside HTTP 200 bodies are
//!   surfaced as success, empty success ("no data"), or failure
//! - **Pagination**: `collect_rows` walks `pIndex` until the data runs out
//!
//! ## Usage
//!
//! ```ignore
//! use assembly_engine::{Gateway, RequestExecutor, RequestParams};
//! use assembly_types::{OutputFormat, ServiceId};
//!
//! let gateway = Gateway::new(resolver, RequestExecutor::from_config(&config)?);
//! let params = RequestParams::new().with("AGE", "22");
//! let outcome = gateway
//!     .call(&ServiceId::parse("OK7XM1000938DS17215")?, &params, OutputFormat::Json)
//!     .await?;
//! ```

pub mod executor;
pub mod gateway;
pub mod params;

pub use executor::{CollectError, RequestExecutor, RetryPolicy, Sleeper, TokioSleeper};
pub use gateway::{Gateway, GatewayError};
pub use params::{ParamParseError, RequestParams, ValidationError, validate};
