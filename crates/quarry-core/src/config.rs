use std::str::FromStr;
use std::time::Duration;

use crate::error::AppError;
use crate::retry::RetryPolicy;

/// Settings for [`FetchOrchestrator`](crate::orchestrator::FetchOrchestrator).
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Overall deadline for one search, unless the request sets its own.
    pub search_timeout: Duration,
    /// Pause between consecutive batches in `batch_search`.
    pub batch_delay: Duration,
    pub retry: RetryPolicy,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            search_timeout: Duration::from_secs(120),
            batch_delay: Duration::from_millis(2000),
            retry: RetryPolicy::default(),
        }
    }
}

impl OrchestratorConfig {
    /// Read configuration from environment variables.
    ///
    /// - `QUARRY_SEARCH_TIMEOUT_SECS` (optional, defaults to 120)
    /// - `QUARRY_MAX_RETRIES` (optional, defaults to 3)
    /// - `QUARRY_BATCH_DELAY_MS` (optional, defaults to 2000)
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an explicit variable source.
    pub fn from_lookup<L>(lookup: L) -> Result<Self, AppError>
    where
        L: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let timeout_secs: u64 = parse_var(&lookup, "QUARRY_SEARCH_TIMEOUT_SECS", 120)?;
        if timeout_secs == 0 {
            return Err(AppError::ConfigError(
                "QUARRY_SEARCH_TIMEOUT_SECS must be at least 1".into(),
            ));
        }
        let max_retries: u32 = parse_var(&lookup, "QUARRY_MAX_RETRIES", defaults.retry.max_retries)?;
        let batch_delay_ms: u64 = parse_var(&lookup, "QUARRY_BATCH_DELAY_MS", 2000)?;

        Ok(Self {
            search_timeout: Duration::from_secs(timeout_secs),
            batch_delay: Duration::from_millis(batch_delay_ms),
            retry: defaults.retry.with_max_retries(max_retries),
        })
    }
}

/// Parse an optional variable, falling back to `default` when unset.
pub fn parse_var<T, L>(lookup: &L, key: &str, default: T) -> Result<T, AppError>
where
    T: FromStr,
    L: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|_| {
            AppError::ConfigError(format!(
                "Invalid {key} '{raw}': must be a non-negative integer"
            ))
        }),
    }
}
