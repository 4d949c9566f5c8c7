use std::sync::Arc;

use quarry_core::platform::Platform;
use quarry_core::rate_limit::RateLimiter;
use quarry_core::retry::RetryPolicy;
use quarry_core::source::{SourceAdapter, SourceRegistry};
use quarry_core::traits::Fetcher;

use crate::config::SourceEndpoints;
use crate::platforms::{Glassdoor, GoogleJobs, HttpSource, Indeed, LinkedIn, ZipRecruiter};

/// Register an HTTP adapter for every platform that has an endpoint.
///
/// All adapters share `limiter`, so concurrent searches stay within each
/// platform's budget.
pub fn build_registry<F: Fetcher + 'static>(
    fetcher: F,
    endpoints: &SourceEndpoints,
    limiter: Arc<RateLimiter>,
    policy: &RetryPolicy,
) -> SourceRegistry {
    let mut registry = SourceRegistry::new();
    for platform in Platform::ALL {
        let Some(base) = endpoints.base(platform) else {
            tracing::debug!(%platform, "No endpoint configured, skipping");
            continue;
        };
        let fetcher = fetcher.clone();
        let limiter = Arc::clone(&limiter);
        let policy = policy.clone();
        let adapter: Arc<dyn SourceAdapter> = match platform {
            Platform::Indeed => Arc::new(HttpSource::new(Indeed::new(base), fetcher, limiter, policy)),
            Platform::LinkedIn => Arc::new(HttpSource::new(LinkedIn::new(base), fetcher, limiter, policy)),
            Platform::ZipRecruiter => Arc::new(HttpSource::new(ZipRecruiter::new(base), fetcher, limiter, policy)),
            Platform::Glassdoor => Arc::new(HttpSource::new(Glassdoor::new(base), fetcher, limiter, policy)),
            Platform::Google => Arc::new(HttpSource::new(GoogleJobs::new(base), fetcher, limiter, policy)),
        };
        registry = registry.register(adapter);
    }
    registry
}
