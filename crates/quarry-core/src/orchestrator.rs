//! Fan a search out across job platforms and persist what comes back.
//!
//! Each requested platform runs in its own task. A source that fails, panics,
//! or misses the search deadline is reported on its own; it never takes the
//! other sources' results down with it.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use serde::Serialize;
use tokio::task::JoinError;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tokio_util::task::AbortOnDropHandle;
use uuid::Uuid;

use crate::config::OrchestratorConfig;
use crate::error::{AppError, FailureKind};
use crate::models::{PostingCandidate, UpsertSummary};
use crate::platform::Platform;
use crate::source::{SearchQuery, SourceBatch, SourceRegistry};
use crate::traits::PostingStore;

/// A search across one or more platforms.
#[derive(Debug, Clone)]
pub struct SearchRequest {
    pub term: String,
    pub location: Option<String>,
    /// Platforms to query, in priority order. Empty means every registered one.
    pub platforms: Vec<Platform>,
    pub max_results: usize,
    pub max_age: Option<Duration>,
    /// Overrides the orchestrator's default search timeout.
    pub timeout: Option<Duration>,
}

impl SearchRequest {
    pub fn new(term: impl Into<String>) -> Self {
        Self {
            term: term.into(),
            location: None,
            platforms: Vec::new(),
            max_results: 50,
            max_age: None,
            timeout: None,
        }
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    pub fn with_platforms(mut self, platforms: impl IntoIterator<Item = Platform>) -> Self {
        self.platforms = platforms.into_iter().collect();
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

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    fn query(&self, deadline: Option<Instant>) -> SearchQuery {
        SearchQuery {
            term: self.term.clone(),
            location: self.location.clone(),
            max_results: self.max_results,
            max_age: self.max_age,
            deadline,
        }
    }
}

/// Why a source produced no (or incomplete) results.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl From<&AppError> for SourceFailure {
    fn from(err: &AppError) -> Self {
        Self {
            kind: err.failure_kind(),
            message: err.to_string(),
        }
    }
}

/// Tagged per-source outcome; an empty result is never a failure.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SourceOutcome {
    Found,
    Empty,
    Failed(SourceFailure),
}

/// Everything one platform contributed to a search.
#[derive(Debug, Clone, Serialize)]
pub struct SourceReport {
    pub platform: Platform,
    /// Normalized postings, including those parsed before a failure.
    pub postings: Vec<PostingCandidate>,
    pub outcome: SourceOutcome,
}

impl SourceReport {
    fn failed(platform: Platform, err: &AppError) -> Self {
        Self {
            platform,
            postings: Vec::new(),
            outcome: SourceOutcome::Failed(err.into()),
        }
    }

    pub fn failure(&self) -> Option<&SourceFailure> {
        match &self.outcome {
            SourceOutcome::Failed(failure) => Some(failure),
            _ => None,
        }
    }
}

/// What happened to the deduplicated postings.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PersistOutcome {
    Stored(UpsertSummary),
    /// Nothing to store.
    Skipped,
    Failed(SourceFailure),
}

/// Aggregated result of one search.
#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
    pub search_id: Uuid,
    pub reports: BTreeMap<Platform, SourceReport>,
    /// Postings that survived cross-source deduplication.
    pub postings: Vec<PostingCandidate>,
    pub duplicates_dropped: usize,
    pub persisted: PersistOutcome,
    pub elapsed_ms: u64,
}

impl SearchResult {
    pub fn failed_platforms(&self) -> Vec<Platform> {
        self.reports
            .values()
            .filter(|r| r.failure().is_some())
            .map(|r| r.platform)
            .collect()
    }
}

/// Events emitted during a search for monitoring/logging.
#[derive(Debug, Clone)]
pub enum SearchEvent<'a> {
    Started {
        search_id: Uuid,
        term: &'a str,
        platforms: &'a [Platform],
    },
    SourceStarted {
        search_id: Uuid,
        platform: Platform,
    },
    SourceFinished {
        search_id: Uuid,
        report: &'a SourceReport,
    },
    SourceTimedOut {
        search_id: Uuid,
        platform: Platform,
        elapsed_ms: u64,
    },
    Persisted {
        search_id: Uuid,
        summary: &'a UpsertSummary,
    },
    PersistFailed {
        search_id: Uuid,
        error: &'a str,
    },
    Finished {
        search_id: Uuid,
        postings: usize,
        duplicates_dropped: usize,
        elapsed_ms: u64,
    },
}

/// Trait for receiving search events (decoupled logging).
pub trait SearchReporter: Send + Sync {
    fn report(&self, event: SearchEvent<'_>) {
        let _ = event;
    }
}

/// Reporter that uses the `tracing` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSearchReporter;

impl SearchReporter for TracingSearchReporter {
    fn report(&self, event: SearchEvent<'_>) {
        match event {
            SearchEvent::Started {
                search_id,
                term,
                platforms,
            } => {
                tracing::info!(%search_id, %term, ?platforms, "Search started");
            }
            SearchEvent::SourceStarted {
                search_id,
                platform,
            } => {
                tracing::debug!(%search_id, %platform, "Source started");
            }
            SearchEvent::SourceFinished { search_id, report } => match &report.outcome {
                SourceOutcome::Failed(failure) => {
                    tracing::warn!(
                        %search_id,
                        platform = %report.platform,
                        kind = ?failure.kind,
                        error = %failure.message,
                        partial = report.postings.len(),
                        "Source failed"
                    );
                }
                _ => {
                    tracing::info!(
                        %search_id,
                        platform = %report.platform,
                        postings = report.postings.len(),
                        "Source finished"
                    );
                }
            },
            SearchEvent::SourceTimedOut {
                search_id,
                platform,
                elapsed_ms,
            } => {
                tracing::warn!(%search_id, %platform, %elapsed_ms, "Source timed out");
            }
            SearchEvent::Persisted { search_id, summary } => {
                tracing::info!(
                    %search_id,
                    inserted = summary.inserted,
                    updated = summary.updated,
                    skipped = summary.skipped,
                    "Postings persisted"
                );
            }
            SearchEvent::PersistFailed { search_id, error } => {
                tracing::error!(%search_id, %error, "Failed to persist postings");
            }
            SearchEvent::Finished {
                search_id,
                postings,
                duplicates_dropped,
                elapsed_ms,
            } => {
                tracing::info!(
                    %search_id,
                    %postings,
                    %duplicates_dropped,
                    %elapsed_ms,
                    "Search finished"
                );
            }
        }
    }
}

/// How a source task ended.
enum SourceRun {
    Settled(SourceBatch),
    TimedOut,
    Cancelled,
}

/// Concurrent multi-platform search with persistence.
pub struct FetchOrchestrator<S: PostingStore> {
    registry: SourceRegistry,
    store: S,
    config: OrchestratorConfig,
    reporter: Arc<dyn SearchReporter>,
}

impl<S: PostingStore> FetchOrchestrator<S> {
    pub fn new(registry: SourceRegistry, store: S) -> Self {
        Self {
            registry,
            store,
            config: OrchestratorConfig::default(),
            reporter: Arc::new(TracingSearchReporter),
        }
    }

    pub fn with_config(mut self, config: OrchestratorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn SearchReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn registry(&self) -> &SourceRegistry {
        &self.registry
    }

    /// Search every requested platform and persist the deduplicated union.
    pub async fn search(&self, request: &SearchRequest) -> SearchResult {
        self.search_with_cancel(request, CancellationToken::new()).await
    }

    /// Like [`search`](Self::search), but stops every unfinished source when
    /// `cancel_token` fires.
    pub async fn search_with_cancel(
        &self,
        request: &SearchRequest,
        cancel_token: CancellationToken,
    ) -> SearchResult {
        let search_id = Uuid::new_v4();
        let started = Instant::now();
        let timeout = request.timeout.unwrap_or(self.config.search_timeout);
        let deadline = started + timeout;
        let platforms = self.requested_platforms(request);

        self.reporter.report(SearchEvent::Started {
            search_id,
            term: &request.term,
            platforms: &platforms,
        });

        let mut reports = BTreeMap::new();
        let mut tasks = Vec::with_capacity(platforms.len());
        for &platform in &platforms {
            let Some(adapter) = self.registry.get(platform) else {
                let err = AppError::InvalidQuery(format!("No adapter registered for {platform}"));
                let report = SourceReport::failed(platform, &err);
                self.reporter.report(SearchEvent::SourceFinished {
                    search_id,
                    report: &report,
                });
                reports.insert(platform, report);
                continue;
            };

            self.reporter.report(SearchEvent::SourceStarted {
                search_id,
                platform,
            });
            let query = request.query(Some(deadline));
            let token = cancel_token.clone();
            // Dropping the handle aborts the task, so an abandoned search
            // leaves nothing running behind it.
            let handle = AbortOnDropHandle::new(tokio::spawn(async move {
                tokio::select! {
                    batch = adapter.search(&query) => SourceRun::Settled(batch),
                    _ = tokio::time::sleep_until(deadline) => SourceRun::TimedOut,
                    _ = token.cancelled() => SourceRun::Cancelled,
                }
            }));
            tasks.push((platform, handle));
        }

        let (task_platforms, handles): (Vec<_>, Vec<_>) = tasks.into_iter().unzip();
        let settled = join_all(handles).await;

        for (platform, run) in task_platforms.into_iter().zip(settled) {
            let report = self.settle(search_id, platform, run, request, timeout);
            reports.insert(platform, report);
        }

        let (postings, duplicates_dropped) = deduplicate(&platforms, &reports);
        let persisted = self.persist(search_id, &postings).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        self.reporter.report(SearchEvent::Finished {
            search_id,
            postings: postings.len(),
            duplicates_dropped,
            elapsed_ms,
        });

        SearchResult {
            search_id,
            reports,
            postings,
            duplicates_dropped,
            persisted,
            elapsed_ms,
        }
    }

    /// Run `requests` in concurrent batches of `batch_size`, pausing
    /// `batch_delay` between batches. Results keep request order.
    pub async fn batch_search(&self, requests: &[SearchRequest], batch_size: usize) -> Vec<SearchResult> {
        let mut results = Vec::with_capacity(requests.len());
        for (index, batch) in requests.chunks(batch_size.max(1)).enumerate() {
            if index > 0 && !self.config.batch_delay.is_zero() {
                tracing::debug!(
                    batch = index + 1,
                    delay_ms = %self.config.batch_delay.as_millis(),
                    "Pausing between batches"
                );
                tokio::time::sleep(self.config.batch_delay).await;
            }
            results.extend(join_all(batch.iter().map(|request| self.search(request))).await);
        }
        results
    }

    fn requested_platforms(&self, request: &SearchRequest) -> Vec<Platform> {
        if request.platforms.is_empty() {
            return self.registry.platforms();
        }
        let mut seen = HashSet::new();
        request
            .platforms
            .iter()
            .copied()
            .filter(|p| seen.insert(*p))
            .collect()
    }

    fn settle(
        &self,
        search_id: Uuid,
        platform: Platform,
        run: Result<SourceRun, JoinError>,
        request: &SearchRequest,
        timeout: Duration,
    ) -> SourceReport {
        let report = match run {
            Ok(SourceRun::Settled(batch)) => settle_batch(platform, batch, request),
            Ok(SourceRun::TimedOut) => {
                let elapsed_ms = timeout.as_millis() as u64;
                self.reporter.report(SearchEvent::SourceTimedOut {
                    search_id,
                    platform,
                    elapsed_ms,
                });
                return SourceReport::failed(platform, &AppError::DeadlineExceeded { elapsed_ms });
            }
            Ok(SourceRun::Cancelled) => SourceReport::failed(platform, &AppError::Cancelled),
            Err(join_err) => SourceReport {
                platform,
                postings: Vec::new(),
                outcome: SourceOutcome::Failed(SourceFailure {
                    kind: FailureKind::Permanent,
                    message: format!("Source task failed: {join_err}"),
                }),
            },
        };
        self.reporter.report(SearchEvent::SourceFinished {
            search_id,
            report: &report,
        });
        report
    }

    async fn persist(&self, search_id: Uuid, postings: &[PostingCandidate]) -> PersistOutcome {
        if postings.is_empty() {
            return PersistOutcome::Skipped;
        }
        match self.store.upsert_postings(postings).await {
            Ok(summary) => {
                self.reporter.report(SearchEvent::Persisted {
                    search_id,
                    summary: &summary,
                });
                PersistOutcome::Stored(summary)
            }
            Err(err) => {
                let message = err.to_string();
                self.reporter.report(SearchEvent::PersistFailed {
                    search_id,
                    error: &message,
                });
                PersistOutcome::Failed((&err).into())
            }
        }
    }
}

/// Normalize a settled batch and tag it with its outcome.
fn settle_batch(platform: Platform, batch: SourceBatch, request: &SearchRequest) -> SourceReport {
    let query = request.query(None);
    let postings: Vec<PostingCandidate> = batch
        .postings
        .into_iter()
        .map(PostingCandidate::normalize)
        .filter(|p| {
            let valid = !p.title.is_empty() && !p.company.is_empty();
            if !valid {
                tracing::debug!(%platform, "Dropping posting without title or company");
            }
            valid && query.accepts(p)
        })
        .take(request.max_results)
        .collect();

    let outcome = match &batch.error {
        Some(err) => SourceOutcome::Failed(err.into()),
        None if postings.is_empty() => SourceOutcome::Empty,
        None => SourceOutcome::Found,
    };
    SourceReport {
        platform,
        postings,
        outcome,
    }
}

/// First-writer-wins in request order.
///
/// A fingerprint seen twice is dropped wherever it repeats. A dedup key
/// (company, title, location) is only treated as a duplicate when a
/// different platform already claimed it.
fn deduplicate(
    order: &[Platform],
    reports: &BTreeMap<Platform, SourceReport>,
) -> (Vec<PostingCandidate>, usize) {
    let mut fingerprints = HashSet::new();
    let mut claimed: HashMap<String, Platform> = HashMap::new();
    let mut unique = Vec::new();
    let mut dropped = 0;

    for report in order.iter().filter_map(|p| reports.get(p)) {
        for posting in &report.postings {
            let key = posting.dedup_key();
            let cross_platform = claimed
                .get(&key)
                .is_some_and(|&owner| owner != posting.platform);
            if cross_platform || !fingerprints.insert(posting.fingerprint()) {
                dropped += 1;
                continue;
            }
            claimed.entry(key).or_insert(posting.platform);
            unique.push(posting.clone());
        }
    }
    (unique, dropped)
}
