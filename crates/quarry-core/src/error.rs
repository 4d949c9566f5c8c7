use serde::Serialize;
use thiserror::Error;

use crate::platform::Platform;

/// Application-wide error types for Quarry.
#[derive(Error, Debug)]
pub enum AppError {
    /// The platform answered with a non-success HTTP status.
    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    /// Network/connection error (reset, refused, DNS).
    #[error("Network error: {0}")]
    NetworkError(String),

    /// Request timed out.
    #[error("Request timed out after {0} seconds")]
    Timeout(u64),

    /// The query could not be translated for the platform.
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    /// The platform rejected our credentials.
    #[error("Authentication failed: {0}")]
    AuthError(String),

    /// The platform response could not be normalized.
    #[error("Parse error: {0}")]
    ParseError(String),

    /// JSON serialization/deserialization failed.
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// No rate-limit permit could be granted before the caller's deadline.
    #[error("Rate limit exceeded for {platform}: next permit in {retry_after_ms}ms")]
    RateLimitExceeded {
        platform: Platform,
        retry_after_ms: u64,
    },

    /// Every retry failed with a transient error.
    #[error("Retries exhausted after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: Box<AppError> },

    /// The overall search deadline elapsed before the source settled.
    #[error("Search deadline exceeded after {elapsed_ms}ms")]
    DeadlineExceeded { elapsed_ms: u64 },

    /// The caller cancelled the operation.
    #[error("Operation cancelled")]
    Cancelled,

    /// No pooled connection became free within the acquire timeout.
    #[error("Connection pool exhausted after waiting {waited_ms}ms")]
    PoolExhausted { waited_ms: u64 },

    /// The pool has been shut down.
    #[error("Connection pool is closed")]
    PoolClosed,

    /// Database operation failed.
    #[error("Database error: {0}")]
    DatabaseError(String),

    /// A uniqueness constraint was violated outside the fingerprint path.
    #[error("Integrity error: {0}")]
    IntegrityError(String),

    /// The referenced record does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Caller-supplied data is out of range.
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Configuration error (missing or invalid settings).
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl AppError {
    /// Returns true if this error is transient and worth retrying.
    pub fn is_retryable(&self) -> bool {
        match self {
            AppError::NetworkError(_)
            | AppError::Timeout(_)
            | AppError::PoolExhausted { .. } => true,
            AppError::Http { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }

    /// Classify this error for per-source reporting.
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            AppError::RateLimitExceeded { .. } => FailureKind::RateLimited,
            AppError::RetriesExhausted { .. } => FailureKind::RetriesExhausted,
            AppError::DeadlineExceeded { .. } => FailureKind::Timeout,
            AppError::Cancelled => FailureKind::Cancelled,
            e if e.is_retryable() => FailureKind::Transient,
            _ => FailureKind::Permanent,
        }
    }
}

/// Coarse failure classification surfaced to callers of a search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Retry-worthy error that was not retried (or could not be).
    Transient,
    /// The same input will always fail.
    Permanent,
    /// The rate-limit deadline elapsed before a permit was granted.
    RateLimited,
    /// Transient failures used up the retry budget.
    RetriesExhausted,
    /// The search deadline cancelled the source.
    Timeout,
    /// The caller cancelled the search.
    Cancelled,
}
