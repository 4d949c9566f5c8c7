//! The per-platform search capability and the table that holds it.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeDelta, Utc};
use tokio::time::Instant;

use crate::error::AppError;
use crate::models::PostingCandidate;
use crate::platform::Platform;

/// What a single adapter is asked to find.
#[derive(Debug, Clone)]
pub struct SearchQuery {
    pub term: String,
    pub location: Option<String>,
    pub max_results: usize,
    /// Postings older than this are dropped.
    pub max_age: Option<Duration>,
    /// Absolute deadline of the enclosing search.
    pub deadline: Option<Instant>,
}

impl SearchQuery {
    pub fn new(term: impl Into<String>) -> Self {
        Self {
            term: term.into(),
            location: None,
            max_results: 50,
            max_age: None,
            deadline: None,
        }
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    pub fn with_max_results(mut self, max_results: usize) -> Self {
        self.max_results = max_results;
        self
    }

    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = Some(max_age);
        self
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// `max_age` rounded up to whole days, for platforms that filter by day.
    pub fn max_age_days(&self) -> Option<u64> {
        self.max_age.map(|age| age.as_secs().div_ceil(86_400).max(1))
    }

    /// Whether a candidate is recent enough. Undated postings are kept.
    pub fn accepts(&self, candidate: &PostingCandidate) -> bool {
        let (Some(max_age), Some(posted)) = (self.max_age, candidate.posted_date) else {
            return true;
        };
        let Some(cutoff) = TimeDelta::from_std(max_age)
            .ok()
            .and_then(|age| Utc::now().checked_sub_signed(age))
        else {
            return true;
        };
        posted >= cutoff.date_naive()
    }
}

/// What an adapter found, plus the error that stopped it early, if any.
///
/// A batch with both postings and an error is a partial result: the source
/// failed mid-pagination and the postings parsed so far are still usable.
#[derive(Debug, Default)]
pub struct SourceBatch {
    pub postings: Vec<PostingCandidate>,
    pub error: Option<AppError>,
}

impl SourceBatch {
    pub fn complete(postings: Vec<PostingCandidate>) -> Self {
        Self {
            postings,
            error: None,
        }
    }

    pub fn partial(postings: Vec<PostingCandidate>, error: AppError) -> Self {
        Self {
            postings,
            error: Some(error),
        }
    }

    pub fn failed(error: AppError) -> Self {
        Self::partial(Vec::new(), error)
    }
}

/// One job platform's search capability.
///
/// Implementations keep no state between calls and must issue every remote
/// call, retries included, through their platform's rate limiter.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    fn platform(&self) -> Platform;

    async fn search(&self, query: &SearchQuery) -> SourceBatch;
}

/// Static table of adapters keyed by platform.
#[derive(Clone, Default)]
pub struct SourceRegistry {
    adapters: HashMap<Platform, Arc<dyn SourceAdapter>>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an adapter, replacing any earlier one for the same platform.
    pub fn register(mut self, adapter: Arc<dyn SourceAdapter>) -> Self {
        self.adapters.insert(adapter.platform(), adapter);
        self
    }

    pub fn get(&self, platform: Platform) -> Option<Arc<dyn SourceAdapter>> {
        self.adapters.get(&platform).cloned()
    }

    /// Registered platforms in canonical order.
    pub fn platforms(&self) -> Vec<Platform> {
        Platform::ALL
            .into_iter()
            .filter(|p| self.adapters.contains_key(p))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}
