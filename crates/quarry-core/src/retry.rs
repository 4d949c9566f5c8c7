//! Exponential-backoff retry around fallible async operations.
//!
//! The delay before retry `n` (0-indexed) is
//! `min(initial_delay * exponential_base^n, max_delay)`. With jitter on, the
//! actual sleep is drawn uniformly from `[delay / 2, delay]`, so it never
//! exceeds `max_delay`.
//!
//! Errors the classifier deems permanent are returned immediately. Once
//! `max_retries` retries have failed transiently, the last error is wrapped
//! in [`AppError::RetriesExhausted`]. When a deadline cuts the schedule short
//! first, the result is [`AppError::DeadlineExceeded`] instead.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::time::Instant;

use crate::error::AppError;

/// Backoff parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub exponential_base: f64,
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            exponential_base: 2.0,
            jitter: true,
        }
    }
}

impl RetryPolicy {
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Un-jittered delay before retry `attempt` (0-indexed).
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let factor = self.exponential_base.powi(attempt.min(i32::MAX as u32) as i32);
        let secs = self.initial_delay.as_secs_f64() * factor;
        if !secs.is_finite() || secs >= self.max_delay.as_secs_f64() {
            return self.max_delay;
        }
        Duration::from_secs_f64(secs)
    }

    /// Delay actually slept before retry `attempt`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let delay = self.base_delay(attempt);
        if !self.jitter || delay.is_zero() {
            return delay;
        }
        let half = delay / 2;
        half + Duration::from_secs_f64(rand::thread_rng().gen_range(0.0..=(delay - half).as_secs_f64()))
    }
}

/// Decides whether an error is worth another attempt.
pub type RetryClassifier = Arc<dyn Fn(&AppError) -> bool + Send + Sync>;

/// Runs an operation under a [`RetryPolicy`].
#[derive(Clone)]
pub struct RetryExecutor {
    policy: RetryPolicy,
    classifier: RetryClassifier,
}

impl fmt::Debug for RetryExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryExecutor")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl Default for RetryExecutor {
    fn default() -> Self {
        Self::new(RetryPolicy::default())
    }
}

impl RetryExecutor {
    /// Executor that retries whatever [`AppError::is_retryable`] accepts.
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            classifier: Arc::new(AppError::is_retryable),
        }
    }

    pub fn with_classifier<C>(mut self, classifier: C) -> Self
    where
        C: Fn(&AppError) -> bool + Send + Sync + 'static,
    {
        self.classifier = Arc::new(classifier);
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Run `operation` until it succeeds, fails permanently, or the retry
    /// budget runs out.
    pub async fn run<T, F, Fut>(&self, operation: F) -> Result<T, AppError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, AppError>>,
    {
        self.run_until(None, operation).await
    }

    /// Like [`run`](Self::run), but gives up with
    /// [`AppError::DeadlineExceeded`] when the next backoff would end past
    /// `deadline`.
    pub async fn run_until<T, F, Fut>(
        &self,
        deadline: Option<Instant>,
        mut operation: F,
    ) -> Result<T, AppError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, AppError>>,
    {
        let started = Instant::now();
        let mut attempt = 0u32;
        loop {
            let err = match operation().await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            if !(self.classifier)(&err) {
                return Err(err);
            }
            if attempt >= self.policy.max_retries {
                return Err(exhausted(attempt + 1, err));
            }

            let delay = self.policy.delay_for_attempt(attempt);
            if let Some(deadline) = deadline
                && Instant::now() + delay > deadline
            {
                tracing::debug!(
                    attempt = attempt + 1,
                    delay_ms = %delay.as_millis(),
                    error = %err,
                    "Backoff would overrun deadline, giving up"
                );
                return Err(AppError::DeadlineExceeded {
                    elapsed_ms: started.elapsed().as_millis() as u64,
                });
            }

            tracing::warn!(
                attempt = attempt + 1,
                max_retries = self.policy.max_retries,
                delay_ms = %delay.as_millis(),
                error = %err,
                "Transient failure, retrying"
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}

fn exhausted(attempts: u32, last: AppError) -> AppError {
    AppError::RetriesExhausted {
        attempts,
        last: Box::new(last),
    }
}
