pub mod config;
pub mod error;
pub mod gate;
pub mod models;
pub mod orchestrator;
pub mod platform;
pub mod rate_limit;
pub mod retry;
pub mod source;
pub mod traits;

#[cfg(any(test, feature = "testutil"))]
pub mod testutil;

pub use config::OrchestratorConfig;
pub use error::{AppError, FailureKind};
pub use gate::SourceGate;
pub use models::{JobPosting, PostingCandidate, UpsertSummary, compute_hash};
pub use orchestrator::{
    FetchOrchestrator, PersistOutcome, SearchRequest, SearchResult, SourceOutcome, SourceReport,
};
pub use platform::Platform;
pub use rate_limit::{RateLimitConfig, RateLimiter};
pub use retry::{RetryExecutor, RetryPolicy};
pub use source::{SearchQuery, SourceAdapter, SourceBatch, SourceRegistry};
pub use traits::{Fetcher, NullStore, PostingStore};
