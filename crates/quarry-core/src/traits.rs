use std::future::Future;

use crate::error::AppError;
use crate::models::{PostingCandidate, UpsertSummary};

/// Fetches a raw response body from a URL.
pub trait Fetcher: Send + Sync + Clone {
    fn fetch(&self, url: &str) -> impl Future<Output = Result<String, AppError>> + Send;
}

/// Persists normalized postings.
pub trait PostingStore: Send + Sync + Clone {
    /// Insert new postings and refresh already-seen ones, keyed by fingerprint.
    fn upsert_postings(
        &self,
        postings: &[PostingCandidate],
    ) -> impl Future<Output = Result<UpsertSummary, AppError>> + Send;
}

/// A no-op PostingStore for use when persistence is not needed.
#[derive(Debug, Clone)]
pub struct NullStore;

impl PostingStore for NullStore {
    async fn upsert_postings(&self, _postings: &[PostingCandidate]) -> Result<UpsertSummary, AppError> {
        Ok(UpsertSummary::default())
    }
}
