//! Resolve-then-execute facade used by callers that only know a service identifier.

use std::sync::Arc;

use assembly_registry::{ResolutionError, SpecResolver};
use assembly_types::{OutputFormat, RequestFailure, RequestOutcome, ResolvedSpec, ServiceId};
use serde_json::Value;
use thiserror::Error;

use crate::executor::{CollectError, RequestExecutor};
use crate::params::{RequestParams, ValidationError};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    #[error(transparent)]
    Resolution(#[from] ResolutionError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Request(#[from] RequestFailure),
}

impl From<CollectError> for GatewayError {
    fn from(error: CollectError) -> Self {
        match error {
            CollectError::Validation(error) => Self::Validation(error),
            CollectError::Request(failure) => Self::Request(failure),
        }
    }
}

/// Pairs a [`SpecResolver`] with a [`RequestExecutor`].
#[derive(Clone)]
pub struct Gateway {
    resolver: SpecResolver,
    executor: RequestExecutor,
}

impl Gateway {
    pub fn new(resolver: SpecResolver, executor: RequestExecutor) -> Self {
        Self { resolver, executor }
    }

    pub fn resolver(&self) -> &SpecResolver {
        &self.resolver
    }

    pub fn executor(&self) -> &RequestExecutor {
        &self.executor
    }

    pub async fn resolve(&self, service_id: &ServiceId) -> Result<Arc<ResolvedSpec>, ResolutionError> {
        self.resolver.resolve(service_id).await
    }

    /// Resolve `service_id` and execute one request against its endpoint.
    pub async fn call(
        &self,
        service_id: &ServiceId,
        params: &RequestParams,
        format: OutputFormat,
    ) -> Result<RequestOutcome, GatewayError> {
        let spec = self.resolver.resolve(service_id).await?;
        Ok(self.executor.execute(&spec, params, format).await?)
    }

    /// Resolve `service_id` and gather rows across up to `max_pages` pages.
    pub async fn collect_rows(
        &self,
        service_id: &ServiceId,
        params: &RequestParams,
        max_pages: u32,
    ) -> Result<Vec<Value>, GatewayError> {
        let spec = self.resolver.resolve(service_id).await?;
        Ok(self.executor.collect_rows(&spec, params, max_pages).await?)
    }
}
