//! Per-platform request rate limiting.
//!
//! Every platform gets three simultaneous constraints: requests per rolling
//! minute, requests per rolling hour, and a minimum spacing between
//! consecutive requests. [`RateLimiter::acquire`] computes the earliest
//! instant at which a new request violates none of them and waits until
//! then, or fails fast when that instant lies beyond the caller's deadline.
//!
//! Windows are pruned lazily on each `acquire`; there is no background
//! sweep. State lives for the life of the limiter and is never persisted.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use quarry_core::platform::Platform;
//! use quarry_core::rate_limit::{RateLimitConfig, RateLimiter};
//!
//! # async fn run() -> Result<(), quarry_core::AppError> {
//! let limiter = RateLimiter::with_defaults()
//!     .with_config(Platform::Indeed, RateLimitConfig::new(2, 100, Duration::ZERO));
//! limiter.acquire(Platform::Indeed, None).await?;
//! # Ok(())
//! # }
//! ```

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use rand::Rng;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::error::AppError;
use crate::platform::Platform;

const MINUTE: Duration = Duration::from_secs(60);
const HOUR: Duration = Duration::from_secs(3600);

/// Request budget for a single platform.
#[derive(Debug, Clone, PartialEq)]
pub struct RateLimitConfig {
    pub requests_per_minute: u32,
    pub requests_per_hour: u32,
    /// Minimum delay between consecutive requests.
    pub min_delay: Duration,
    /// Maximum random jitter added on top of `min_delay` (uniform [0, jitter]).
    ///
    /// Set to `Duration::ZERO` to disable.
    pub jitter: Duration,
}

impl RateLimitConfig {
    pub fn new(requests_per_minute: u32, requests_per_hour: u32, min_delay: Duration) -> Self {
        Self {
            requests_per_minute,
            requests_per_hour,
            min_delay,
            jitter: Duration::ZERO,
        }
    }

    pub fn with_jitter(mut self, jitter: Duration) -> Self {
        self.jitter = jitter;
        self
    }

    /// Published budgets for each supported platform.
    pub fn for_platform(platform: Platform) -> Self {
        let (rpm, rph, delay_ms) = match platform {
            Platform::Indeed => (10, 100, 2000),
            Platform::LinkedIn => (5, 50, 3000),
            Platform::ZipRecruiter => (8, 80, 2000),
            Platform::Glassdoor => (6, 60, 2500),
            Platform::Google => (10, 100, 1500),
        };
        Self::new(rpm, rph, Duration::from_millis(delay_ms)).with_jitter(Duration::from_millis(500))
    }

    /// Spacing for the next request (min delay + random jitter).
    fn spacing(&self) -> Duration {
        if self.jitter.is_zero() {
            return self.min_delay;
        }
        let max_ms = self.jitter.as_millis() as u64;
        self.min_delay + Duration::from_millis(rand::thread_rng().gen_range(0..=max_ms))
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self::new(10, 100, Duration::from_secs(1))
    }
}

/// Sliding-window accounting for one platform.
#[derive(Debug, Default)]
struct WindowState {
    minute: VecDeque<Instant>,
    hour: VecDeque<Instant>,
    last_request: Option<Instant>,
}

impl WindowState {
    fn prune(&mut self, now: Instant) {
        while self.minute.front().is_some_and(|&t| t + MINUTE <= now) {
            self.minute.pop_front();
        }
        while self.hour.front().is_some_and(|&t| t + HOUR <= now) {
            self.hour.pop_front();
        }
    }

    /// Earliest instant a new request satisfies every constraint.
    fn earliest_permit(&self, config: &RateLimitConfig, now: Instant, spacing: Duration) -> Instant {
        let mut earliest = now;
        if let Some(last) = self.last_request {
            earliest = earliest.max(last + spacing);
        }
        if let Some(t) = window_release(&self.minute, config.requests_per_minute) {
            earliest = earliest.max(t + MINUTE);
        }
        if let Some(t) = window_release(&self.hour, config.requests_per_hour) {
            earliest = earliest.max(t + HOUR);
        }
        earliest
    }

    fn record(&mut self, at: Instant) {
        self.minute.push_back(at);
        self.hour.push_back(at);
        self.last_request = Some(at);
    }
}

/// The entry whose expiry frees a slot, if the window is full.
fn window_release(window: &VecDeque<Instant>, limit: u32) -> Option<Instant> {
    let limit = limit.max(1) as usize;
    if window.len() < limit {
        return None;
    }
    window.get(window.len() - limit).copied()
}

/// Process-wide rate limiter keyed by platform.
///
/// Callers for the same platform are served strictly in arrival order: the
/// per-platform lock is fair and is held across the wait, so a later caller
/// can never overtake an earlier one. Platforms never block each other.
pub struct RateLimiter {
    configs: HashMap<Platform, RateLimitConfig>,
    states: HashMap<Platform, Mutex<WindowState>>,
}

impl RateLimiter {
    /// Build a limiter from explicit configs; platforms left out get
    /// [`RateLimitConfig::default`].
    pub fn new(configs: HashMap<Platform, RateLimitConfig>) -> Self {
        let states = Platform::ALL
            .iter()
            .map(|&p| (p, Mutex::new(WindowState::default())))
            .collect();
        Self { configs, states }
    }

    /// Limiter using each platform's published budget.
    pub fn with_defaults() -> Self {
        Self::new(
            Platform::ALL
                .iter()
                .map(|&p| (p, RateLimitConfig::for_platform(p)))
                .collect(),
        )
    }

    pub fn with_config(mut self, platform: Platform, config: RateLimitConfig) -> Self {
        self.configs.insert(platform, config);
        self
    }

    pub fn config(&self, platform: Platform) -> RateLimitConfig {
        self.configs.get(&platform).cloned().unwrap_or_default()
    }

    /// Wait for a permit to call `platform`.
    ///
    /// With a `deadline`, fails with [`AppError::RateLimitExceeded`] instead
    /// of waiting past it. Without one, waits as long as needed.
    pub async fn acquire(&self, platform: Platform, deadline: Option<Instant>) -> Result<(), AppError> {
        let config = self.config(platform);
        let state = self
            .states
            .get(&platform)
            .ok_or_else(|| AppError::ConfigError(format!("No rate-limit state for {platform}")))?;

        let mut window = match deadline {
            Some(deadline) => tokio::time::timeout_at(deadline, state.lock())
                .await
                .map_err(|_| AppError::RateLimitExceeded {
                    platform,
                    retry_after_ms: 0,
                })?,
            None => state.lock().await,
        };

        let now = Instant::now();
        window.prune(now);
        let earliest = window.earliest_permit(&config, now, config.spacing());

        if let Some(deadline) = deadline
            && earliest > deadline
        {
            let retry_after = earliest - now;
            tracing::debug!(
                %platform,
                retry_after_ms = %retry_after.as_millis(),
                "Rate-limit permit would overrun deadline"
            );
            return Err(AppError::RateLimitExceeded {
                platform,
                retry_after_ms: retry_after.as_millis() as u64,
            });
        }

        if earliest > now {
            tracing::debug!(
                %platform,
                wait_ms = %(earliest - now).as_millis(),
                "Rate limit reached, waiting"
            );
            tokio::time::sleep_until(earliest).await;
        }

        window.record(Instant::now());
        Ok(())
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::with_defaults()
    }
}
