//! Request execution: validation, query construction, retries, and response
//! classification.
//!
//! - `params::validate` runs before any network call
//! - `classify` maps each HTTP exchange to a [`RequestOutcome`]
//! - `retry::RetryPolicy` spaces out retries of transient failures; the
//!   [`Sleeper`] seam keeps tests instant
//!
//! Execution never mutates local state. Dropping the returned future cancels
//! the in-progress attempt and any pending backoff.

pub mod classify;
pub mod retry;

use std::sync::Arc;

use assembly_api::{AssemblyClient, ClientError, TransportError, TransportRequest};
use assembly_types::{OutputFormat, RequestFailure, RequestOutcome, ResolvedSpec};
use assembly_util::GatewayConfig;
use assembly_util::config::DEFAULT_PAGE_SIZE;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::params::{KEY_PARAM, PAGE_INDEX_PARAM, PAGE_SIZE_PARAM, RequestParams, TYPE_PARAM, ValidationError, validate};

pub use classify::{classify_response, classify_transport_error, embedded_status_json, embedded_status_xml};
pub use retry::{RetryPolicy, Sleeper, TokioSleeper};

/// Errors from multi-page collection.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CollectError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Request(#[from] RequestFailure),
}

/// Issues data requests for resolved specs.
#[derive(Clone)]
pub struct RequestExecutor {
    client: AssemblyClient,
    retry: RetryPolicy,
    sleeper: Arc<dyn Sleeper>,
    page_size: u32,
}

impl RequestExecutor {
    pub fn new(client: AssemblyClient) -> Self {
        Self {
            client,
            retry: RetryPolicy::default(),
            sleeper: Arc::new(TokioSleeper),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    /// Executor with a reqwest transport, configured timeout and page size.
    pub fn from_config(config: &GatewayConfig) -> Result<Self, ClientError> {
        Ok(Self::new(AssemblyClient::from_config(config)?).with_page_size(config.default_page_size))
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn client(&self) -> &AssemblyClient {
        &self.client
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Query pairs in wire order: `KEY`, `Type`, `pIndex`, `pSize`, then the
    /// remaining supplied parameters in insertion order. Supplied `pIndex` and
    /// `pSize` replace the defaults; supplied `KEY` and `Type` are ignored.
    pub fn build_query(&self, params: &RequestParams, format: OutputFormat) -> Vec<(String, String)> {
        let page_index = params.get(PAGE_INDEX_PARAM).unwrap_or("1").to_string();
        let page_size = params
            .get(PAGE_SIZE_PARAM)
            .map(str::to_string)
            .unwrap_or_else(|| self.page_size.to_string());

        let mut query = vec![
            (KEY_PARAM.to_string(), self.client.api_key().to_string()),
            (TYPE_PARAM.to_string(), format.as_query_value().to_string()),
            (PAGE_INDEX_PARAM.to_string(), page_index),
            (PAGE_SIZE_PARAM.to_string(), page_size),
        ];
        for (name, value) in params.iter() {
            match name {
                KEY_PARAM | TYPE_PARAM => {
                    warn!(parameter = name, "ignoring caller-supplied reserved parameter");
                }
                PAGE_INDEX_PARAM | PAGE_SIZE_PARAM => {}
                _ => query.push((name.to_string(), value.to_string())),
            }
        }
        query
    }

    /// Validate `params` against `spec`, then request `spec.endpoint_url`.
    ///
    /// Validation failures return before any network call. Every other
    /// failure is reported inside the [`RequestOutcome`].
    pub async fn execute(
        &self,
        spec: &ResolvedSpec,
        params: &RequestParams,
        format: OutputFormat,
    ) -> Result<RequestOutcome, ValidationError> {
        validate(spec, params)?;
        Ok(self.request(&spec.endpoint_path, &spec.endpoint_url, params, format).await)
    }

    /// Request an endpoint path under the client's base URL, without validation.
    pub async fn execute_endpoint(&self, endpoint_path: &str, params: &RequestParams, format: OutputFormat) -> RequestOutcome {
        let url = self.client.endpoint_url(endpoint_path);
        self.request(endpoint_path, &url, params, format).await
    }

    async fn request(&self, endpoint_path: &str, url: &str, params: &RequestParams, format: OutputFormat) -> RequestOutcome {
        let query = self.build_query(params, format);
        let max_attempts = self.retry.max_attempts.max(1);

        let mut attempt = 1;
        loop {
            let outcome = self.attempt(endpoint_path, url, &query, format).await;
            match outcome {
                RequestOutcome::Failure(failure) if failure.is_transient() && attempt < max_attempts => {
                    let delay = self.retry.delay_for(attempt);
                    warn!(
                        endpoint = endpoint_path,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %failure.message,
                        "transient failure; retrying"
                    );
                    self.sleeper.sleep(delay).await;
                    attempt += 1;
                }
                RequestOutcome::Failure(failure) => {
                    warn!(endpoint = endpoint_path, attempt, kind = %failure.kind, error = %failure.message, "request failed");
                    return RequestOutcome::Failure(failure.with_attempts(attempt));
                }
                success => {
                    debug!(endpoint = endpoint_path, attempt, "request succeeded");
                    return success;
                }
            }
        }
    }

    async fn attempt(&self, endpoint_path: &str, url: &str, query: &[(String, String)], format: OutputFormat) -> RequestOutcome {
        let timeout = self.client.timeout();
        let mut request = TransportRequest::get(url, timeout);
        request.query = query.to_vec();

        match tokio::time::timeout(timeout, self.client.transport().get(request)).await {
            Ok(Ok(response)) => classify_response(endpoint_path, format, &response),
            Ok(Err(error)) => RequestOutcome::Failure(classify_transport_error(&error)),
            Err(_) => RequestOutcome::Failure(classify_transport_error(&TransportError::timeout(timeout))),
        }
    }

    /// Gather `row` arrays across pages of a spec's endpoint in JSON mode.
    pub async fn collect_rows(
        &self,
        spec: &ResolvedSpec,
        params: &RequestParams,
        max_pages: u32,
    ) -> Result<Vec<Value>, CollectError> {
        validate(spec, params)?;
        Ok(self
            .collect_pages(&spec.endpoint_path, &spec.endpoint_url, params, max_pages)
            .await?)
    }

    /// Page through `endpoint_path` from `pIndex=1`, stopping at a short page,
    /// a no-data response, the reported total, or `max_pages`.
    pub async fn collect_endpoint_rows(
        &self,
        endpoint_path: &str,
        params: &RequestParams,
        max_pages: u32,
    ) -> Result<Vec<Value>, RequestFailure> {
        let url = self.client.endpoint_url(endpoint_path);
        self.collect_pages(endpoint_path, &url, params, max_pages).await
    }

    async fn collect_pages(
        &self,
        endpoint_path: &str,
        url: &str,
        params: &RequestParams,
        max_pages: u32,
    ) -> Result<Vec<Value>, RequestFailure> {
        let page_size = params
            .get(PAGE_SIZE_PARAM)
            .and_then(|value| value.trim().parse::<u32>().ok())
            .filter(|size| *size > 0)
            .unwrap_or(self.page_size);

        let mut rows = Vec::new();
        for page in 1..=max_pages.max(1) {
            let page_params = params
                .clone()
                .with(PAGE_INDEX_PARAM, page.to_string())
                .with(PAGE_SIZE_PARAM, page_size.to_string());
            let payload = self
                .request(endpoint_path, url, &page_params, OutputFormat::Json)
                .await
                .into_result()?;
            if payload.is_empty() {
                break;
            }

            let value: Value = serde_json::from_str(&payload)
                .map_err(|error| RequestFailure::permanent(format!("page {page} is not valid JSON: {error}"), None))?;
            let page_rows = classify::rows_in_page(&value, endpoint_path);
            let fetched = page_rows.len();
            rows.extend(page_rows);
            debug!(endpoint = endpoint_path, page, fetched, total = rows.len(), "collected page");

            let reached_total = classify::total_count(&value, endpoint_path).is_some_and(|total| rows.len() as u64 >= total);
            if fetched < page_size as usize || reached_total {
                break;
            }
        }
        info!(endpoint = endpoint_path, rows = rows.len(), "collected rows");
        Ok(rows)
    }
}
