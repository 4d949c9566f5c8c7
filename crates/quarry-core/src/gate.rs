//! Per-platform gate combining the rate limiter with the retry executor.
//!
//! Each attempt inside the retry loop acquires its own permit before running,
//! so a source that is backing off still counts against its platform budget.

use std::future::Future;
use std::sync::Arc;

use tokio::time::Instant;

use crate::error::AppError;
use crate::platform::Platform;
use crate::rate_limit::RateLimiter;
use crate::retry::RetryExecutor;

/// Rate-limited, retried access to one platform. Adapters issue all remote
/// calls through their gate.
#[derive(Clone)]
pub struct SourceGate {
    platform: Platform,
    limiter: Arc<RateLimiter>,
    retry: RetryExecutor,
}

impl SourceGate {
    pub fn new(platform: Platform, limiter: Arc<RateLimiter>, retry: RetryExecutor) -> Self {
        Self {
            platform,
            limiter,
            retry,
        }
    }

    pub fn platform(&self) -> Platform {
        self.platform
    }

    /// Run `operation` under the platform's rate limit and retry policy.
    pub async fn call<T, F, Fut>(&self, deadline: Option<Instant>, mut operation: F) -> Result<T, AppError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, AppError>>,
    {
        self.retry
            .run_until(deadline, || {
                let attempt = operation();
                async move {
                    self.limiter.acquire(self.platform, deadline).await?;
                    attempt.await
                }
            })
            .await
    }
}
