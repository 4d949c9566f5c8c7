//! Test utilities: mock implementations of the core traits.
//!
//! Handwritten mocks for dependency injection in unit tests.
//! All mocks use `Arc<Mutex<_>>` for interior mutability, allowing
//! test assertions on recorded calls.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::error::AppError;
use crate::models::{PostingCandidate, UpsertSummary};
use crate::orchestrator::{SearchEvent, SearchReporter};
use crate::platform::Platform;
use crate::source::{SearchQuery, SourceAdapter, SourceBatch};
use crate::traits::{Fetcher, PostingStore};

// ---------------------------------------------------------------------------
// MockFetcher
// ---------------------------------------------------------------------------

/// Mock fetcher that replays a queue of responses.
#[derive(Clone)]
pub struct MockFetcher {
    /// Each call pops the first element. If empty, returns `{}`.
    responses: Arc<Mutex<Vec<Result<String, AppError>>>>,
    requested: Arc<Mutex<Vec<String>>>,
}

impl MockFetcher {
    pub fn new(body: &str) -> Self {
        Self::with_responses(vec![Ok(body.to_string())])
    }

    pub fn with_error(error: AppError) -> Self {
        Self::with_responses(vec![Err(error)])
    }

    pub fn with_responses(responses: Vec<Result<String, AppError>>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(responses)),
            requested: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// URLs fetched so far, in call order.
    pub fn requested_urls(&self) -> Vec<String> {
        self.requested.lock().unwrap().clone()
    }
}

impl Fetcher for MockFetcher {
    async fn fetch(&self, url: &str) -> Result<String, AppError> {
        self.requested.lock().unwrap().push(url.to_string());
        let mut responses = self.responses.lock().unwrap();
        if responses.is_empty() {
            Ok("{}".to_string())
        } else {
            responses.remove(0)
        }
    }
}

// ---------------------------------------------------------------------------
// MockSource
// ---------------------------------------------------------------------------

type ErrorFactory = Arc<dyn Fn() -> AppError + Send + Sync>;

/// Mock adapter returning a fixed batch, optionally after a delay.
#[derive(Clone)]
pub struct MockSource {
    platform: Platform,
    postings: Vec<PostingCandidate>,
    error: Option<ErrorFactory>,
    delay: Option<Duration>,
    panics: bool,
    queries: Arc<Mutex<Vec<SearchQuery>>>,
}

impl MockSource {
    /// A source that finds nothing.
    pub fn new(platform: Platform) -> Self {
        Self {
            platform,
            postings: Vec::new(),
            error: None,
            delay: None,
            panics: false,
            queries: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_postings(mut self, postings: Vec<PostingCandidate>) -> Self {
        self.postings = postings;
        self
    }

    /// Attach an error to every batch (postings, if any, become partial).
    pub fn failing_with<E>(mut self, error: E) -> Self
    where
        E: Fn() -> AppError + Send + Sync + 'static,
    {
        self.error = Some(Arc::new(error));
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn panicking(mut self) -> Self {
        self.panics = true;
        self
    }

    pub fn calls(&self) -> usize {
        self.queries.lock().unwrap().len()
    }

    pub fn last_query(&self) -> Option<SearchQuery> {
        self.queries.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl SourceAdapter for MockSource {
    fn platform(&self) -> Platform {
        self.platform
    }

    async fn search(&self, query: &SearchQuery) -> SourceBatch {
        self.queries.lock().unwrap().push(query.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.panics {
            panic!("mock source {} panicked", self.platform);
        }
        match &self.error {
            Some(error) => SourceBatch::partial(self.postings.clone(), error()),
            None => SourceBatch::complete(self.postings.clone()),
        }
    }
}

// ---------------------------------------------------------------------------
// MockStore
// ---------------------------------------------------------------------------

/// Mock store that records every upsert batch.
#[derive(Clone, Default)]
pub struct MockStore {
    upserts: Arc<Mutex<Vec<Vec<PostingCandidate>>>>,
    error: Arc<Mutex<Option<AppError>>>,
}

impl MockStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The next upsert fails with `error`; later ones succeed.
    pub fn with_error(error: AppError) -> Self {
        Self {
            upserts: Arc::new(Mutex::new(Vec::new())),
            error: Arc::new(Mutex::new(Some(error))),
        }
    }

    pub fn upserted(&self) -> Vec<Vec<PostingCandidate>> {
        self.upserts.lock().unwrap().clone()
    }
}

impl PostingStore for MockStore {
    async fn upsert_postings(&self, postings: &[PostingCandidate]) -> Result<UpsertSummary, AppError> {
        if let Some(err) = self.error.lock().unwrap().take() {
            return Err(err);
        }
        self.upserts.lock().unwrap().push(postings.to_vec());
        Ok(UpsertSummary {
            inserted: postings.len(),
            ..UpsertSummary::default()
        })
    }
}

// ---------------------------------------------------------------------------
// MockReporter
// ---------------------------------------------------------------------------

/// Reporter that records a short name for every event.
#[derive(Default)]
pub struct MockReporter {
    events: Mutex<Vec<String>>,
}

impl MockReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }
}

impl SearchReporter for MockReporter {
    fn report(&self, event: SearchEvent<'_>) {
        let name = match event {
            SearchEvent::Started { .. } => "started".to_string(),
            SearchEvent::SourceStarted { platform, .. } => format!("source_started:{platform}"),
            SearchEvent::SourceFinished { report, .. } => {
                format!("source_finished:{}", report.platform)
            }
            SearchEvent::SourceTimedOut { platform, .. } => format!("source_timed_out:{platform}"),
            SearchEvent::Persisted { .. } => "persisted".to_string(),
            SearchEvent::PersistFailed { .. } => "persist_failed".to_string(),
            SearchEvent::Finished { .. } => "finished".to_string(),
        };
        self.events.lock().unwrap().push(name);
    }
}
