use std::path::PathBuf;
use std::time::Duration;

use quarry_core::AppError;
use quarry_core::config::parse_var;

/// Configuration for the SQLite connection pool.
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub path: PathBuf,
    pub pool_size: usize,
    /// How long `acquire` waits for a free handle before `PoolExhausted`.
    pub acquire_timeout: Duration,
    /// How long SQLite waits on a locked database before failing a statement.
    pub busy_timeout: Duration,
}

impl DatabaseConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            pool_size: 5,
            acquire_timeout: Duration::from_secs(10),
            busy_timeout: Duration::from_secs(30),
        }
    }

    pub fn with_pool_size(mut self, pool_size: usize) -> Self {
        self.pool_size = pool_size;
        self
    }

    pub fn with_acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    /// Read configuration from environment variables.
    ///
    /// - `DATABASE_PATH` (optional, defaults to `data/quarry.db`)
    /// - `DATABASE_POOL_SIZE` (optional, defaults to 5)
    /// - `DATABASE_ACQUIRE_TIMEOUT_SECS` (optional, defaults to 10)
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<L>(lookup: L) -> Result<Self, AppError>
    where
        L: Fn(&str) -> Option<String>,
    {
        let path = lookup("DATABASE_PATH")
            .filter(|p| !p.trim().is_empty())
            .unwrap_or_else(|| "data/quarry.db".to_string());

        let pool_size: usize = parse_var(&lookup, "DATABASE_POOL_SIZE", 5)?;
        if pool_size == 0 {
            return Err(AppError::ConfigError(
                "DATABASE_POOL_SIZE must be at least 1".into(),
            ));
        }
        let acquire_secs: u64 = parse_var(&lookup, "DATABASE_ACQUIRE_TIMEOUT_SECS", 10)?;

        Ok(Self::new(path)
            .with_pool_size(pool_size)
            .with_acquire_timeout(Duration::from_secs(acquire_secs)))
    }
}
