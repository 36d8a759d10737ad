//! Spec resolution with caching and single-flight deduplication.
//!
//! [`SpecResolver::resolve`] answers from the cache when it can. On a miss it
//! fetches and parses the spec document exactly once per service identifier,
//! however many tasks ask at the same time: the first caller installs a
//! shared future in the in-flight map and later callers await that same
//! future. The future stores its result in the cache before it removes
//! itself from the map, so a caller that finds no in-flight entry is
//! guaranteed to see the cached spec if one was just produced.
//!
//! The map owns the shared futures and each future only holds a weak
//! reference back to the map, so dropping every resolver handle releases
//! resolutions whose waiters were all cancelled.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::{Duration, Instant};

use assembly_types::{ResolvedSpec, ServiceId};
use futures_util::future::{BoxFuture, FutureExt, Shared};
use futures_util::stream::{self, StreamExt};
use tracing::{debug, info, warn};

use crate::cache::SpecCache;
use crate::catalog::ServiceCatalog;
use crate::error::{CacheError, ResolutionError};
use crate::fetcher::SpecDocumentFetcher;
use crate::parser::SpecParser;

type SharedResolution = Shared<BoxFuture<'static, Result<Arc<ResolvedSpec>, ResolutionError>>>;
type InFlight = Mutex<HashMap<ServiceId, SharedResolution>>;

/// How failed resolutions are remembered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FailurePolicy {
    /// Replay a failure for this long instead of fetching again. `None`
    /// means every call after a failure fetches anew.
    pub negative_ttl: Option<Duration>,
}

impl FailurePolicy {
    pub fn remember_failures_for(ttl: Duration) -> Self {
        Self { negative_ttl: Some(ttl) }
    }
}

/// Resolves service identifiers into [`ResolvedSpec`]s. Cheap to clone.
#[derive(Clone)]
pub struct SpecResolver {
    inner: Arc<ResolverInner>,
    in_flight: Arc<InFlight>,
}

struct ResolverInner {
    fetcher: Arc<dyn SpecDocumentFetcher>,
    cache: Arc<dyn SpecCache>,
    parser: SpecParser,
    catalog: Option<Arc<ServiceCatalog>>,
    failure_policy: FailurePolicy,
    recent_failures: Mutex<HashMap<ServiceId, (Instant, ResolutionError)>>,
}

pub struct SpecResolverBuilder {
    fetcher: Arc<dyn SpecDocumentFetcher>,
    cache: Arc<dyn SpecCache>,
    parser: SpecParser,
    catalog: Option<Arc<ServiceCatalog>>,
    failure_policy: FailurePolicy,
}

impl SpecResolverBuilder {
    pub fn parser(mut self, parser: SpecParser) -> Self {
        self.parser = parser;
        self
    }

    pub fn catalog(mut self, catalog: Arc<ServiceCatalog>) -> Self {
        self.catalog = Some(catalog);
        self
    }

    pub fn failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    pub fn build(self) -> SpecResolver {
        SpecResolver {
            inner: Arc::new(ResolverInner {
                fetcher: self.fetcher,
                cache: self.cache,
                parser: self.parser,
                catalog: self.catalog,
                failure_policy: self.failure_policy,
                recent_failures: Mutex::new(HashMap::new()),
            }),
            in_flight: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl SpecResolver {
    pub fn builder(fetcher: Arc<dyn SpecDocumentFetcher>, cache: Arc<dyn SpecCache>) -> SpecResolverBuilder {
        SpecResolverBuilder {
            fetcher,
            cache,
            parser: SpecParser::default(),
            catalog: None,
            failure_policy: FailurePolicy::default(),
        }
    }

    pub fn new(fetcher: Arc<dyn SpecDocumentFetcher>, cache: Arc<dyn SpecCache>) -> Self {
        Self::builder(fetcher, cache).build()
    }

    pub fn catalog(&self) -> Option<&Arc<ServiceCatalog>> {
        self.inner.catalog.as_ref()
    }

    /// Resolve `service_id`, fetching and parsing its document on a cache miss.
    ///
    /// Concurrent calls for the same identifier share one fetch and observe
    /// the same result. Failures are never cached; see [`FailurePolicy`] for
    /// the optional short-lived replay of recent failures.
    pub async fn resolve(&self, service_id: &ServiceId) -> Result<Arc<ResolvedSpec>, ResolutionError> {
        if let Some(spec) = self.inner.cached(service_id) {
            debug!(service_id = %service_id, "spec cache hit");
            return Ok(spec);
        }
        if let Some(error) = self.inner.recent_failure(service_id) {
            debug!(service_id = %service_id, "replaying recent resolution failure");
            return Err(error);
        }

        let resolution = {
            let mut in_flight = lock(&self.in_flight);
            match in_flight.get(service_id) {
                Some(existing) => {
                    debug!(service_id = %service_id, "joining in-flight resolution");
                    existing.clone()
                }
                None => {
                    // A resolution may have finished between the cache check and taking the lock.
                    if let Some(spec) = self.inner.cached(service_id) {
                        return Ok(spec);
                    }
                    let resolution = ResolverInner::resolution(
                        Arc::clone(&self.inner),
                        Arc::downgrade(&self.in_flight),
                        service_id.clone(),
                    )
                    .boxed()
                    .shared();
                    in_flight.insert(service_id.clone(), resolution.clone());
                    resolution
                }
            }
        };
        resolution.await
    }

    /// Drop the cached spec (and any remembered failure) for `service_id`.
    pub fn invalidate(&self, service_id: &ServiceId) -> Result<(), CacheError> {
        lock(&self.inner.recent_failures).remove(service_id);
        self.inner.cache.invalidate(Some(service_id))?;
        info!(service_id = %service_id, "invalidated cached spec");
        Ok(())
    }

    pub fn invalidate_all(&self) -> Result<(), CacheError> {
        lock(&self.inner.recent_failures).clear();
        self.inner.cache.invalidate(None)?;
        info!("invalidated every cached spec");
        Ok(())
    }

    /// Invalidate, then resolve again from the document.
    pub async fn refresh(&self, service_id: &ServiceId) -> Result<Arc<ResolvedSpec>, ResolutionError> {
        if let Err(error) = self.invalidate(service_id) {
            warn!(service_id = %service_id, %error, "could not invalidate cached spec before refresh");
        }
        self.resolve(service_id).await
    }

    /// Resolve many identifiers with at most `concurrency` resolutions running.
    /// Results come back in completion order.
    pub async fn prefetch(
        &self,
        service_ids: impl IntoIterator<Item = ServiceId>,
        concurrency: usize,
    ) -> Vec<(ServiceId, Result<Arc<ResolvedSpec>, ResolutionError>)> {
        stream::iter(service_ids)
            .map(|service_id| async move {
                let result = self.resolve(&service_id).await;
                (service_id, result)
            })
            .buffer_unordered(concurrency.max(1))
            .collect()
            .await
    }
}

impl ResolverInner {
    fn cached(&self, service_id: &ServiceId) -> Option<Arc<ResolvedSpec>> {
        match self.cache.get(service_id) {
            Ok(spec) => spec,
            Err(error) => {
                warn!(service_id = %service_id, %error, "spec cache read failed; treating as a miss");
                None
            }
        }
    }

    fn recent_failure(&self, service_id: &ServiceId) -> Option<ResolutionError> {
        let ttl = self.failure_policy.negative_ttl?;
        let mut failures = lock(&self.recent_failures);
        match failures.get(service_id) {
            Some((at, error)) if at.elapsed() < ttl => Some(error.clone()),
            Some(_) => {
                failures.remove(service_id);
                None
            }
            None => None,
        }
    }

    async fn resolution(
        self: Arc<Self>,
        in_flight: Weak<InFlight>,
        service_id: ServiceId,
    ) -> Result<Arc<ResolvedSpec>, ResolutionError> {
        if let Some(catalog) = &self.catalog
            && !catalog.contains(&service_id)
        {
            warn!(service_id = %service_id, "service identifier is not in the catalog");
        }

        let result = self.fetch_and_parse(&service_id).await;
        match &result {
            Ok(spec) => {
                if let Err(error) = self.cache.put(Arc::clone(spec)) {
                    warn!(service_id = %service_id, %error, "could not cache resolved spec");
                }
            }
            Err(error) => {
                warn!(service_id = %service_id, %error, "spec resolution failed");
                if self.failure_policy.negative_ttl.is_some() {
                    lock(&self.recent_failures).insert(service_id.clone(), (Instant::now(), error.clone()));
                }
            }
        }
        if let Some(in_flight) = in_flight.upgrade() {
            lock(&in_flight).remove(&service_id);
        }
        result
    }

    async fn fetch_and_parse(&self, service_id: &ServiceId) -> Result<Arc<ResolvedSpec>, ResolutionError> {
        let document = self
            .fetcher
            .fetch(service_id)
            .await
            .map_err(|source| ResolutionError::FetchFailed {
                service_id: service_id.clone(),
                source,
            })?;
        let spec = self
            .parser
            .parse(service_id, &document)
            .map_err(|source| ResolutionError::ParseFailed {
                service_id: service_id.clone(),
                source,
            })?;
        info!(
            service_id = %service_id,
            endpoint = %spec.endpoint_path,
            request_parameters = spec.request_parameters.len(),
            "resolved spec"
        );
        Ok(Arc::new(spec))
    }
}
