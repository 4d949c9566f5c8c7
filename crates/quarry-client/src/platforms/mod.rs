//! Per-platform search APIs and the generic paginating adapter that drives them.
//!
//! Each platform module only knows how to build a page URL and how to turn a
//! response body into candidates. [`HttpSource`] owns everything else:
//! pagination, rate limiting, retries and partial-result handling.

mod glassdoor;
mod google;
mod indeed;
mod linkedin;
mod zip_recruiter;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{NaiveDate, TimeDelta, Utc};
use quarry_core::error::AppError;
use quarry_core::gate::SourceGate;
use quarry_core::models::PostingCandidate;
use quarry_core::platform::Platform;
use quarry_core::rate_limit::RateLimiter;
use quarry_core::retry::{RetryExecutor, RetryPolicy};
use quarry_core::source::{SearchQuery, SourceAdapter, SourceBatch};
use quarry_core::traits::Fetcher;
use serde::de::DeserializeOwned;
use url::Url;

pub use glassdoor::Glassdoor;
pub use google::GoogleJobs;
pub use indeed::Indeed;
pub use linkedin::LinkedIn;
pub use zip_recruiter::ZipRecruiter;

/// Upper bound on pages fetched for a single query.
const DEFAULT_MAX_PAGES: usize = 10;

/// One parsed page of search results.
#[derive(Debug, Default)]
pub struct Page {
    pub postings: Vec<PostingCandidate>,
    pub has_more: bool,
}

/// Request building and response parsing for a single platform.
pub trait PlatformApi: Send + Sync + 'static {
    fn platform(&self) -> Platform;

    /// Results requested per page.
    fn page_size(&self) -> usize {
        25
    }

    /// URL for the zero-based `page` of `query`.
    fn page_url(&self, query: &SearchQuery, page: usize) -> Result<Url, AppError>;

    fn parse_page(&self, body: &str, page: usize) -> Result<Page, AppError>;

    /// Whether a failed request is worth retrying.
    fn is_transient(&self, error: &AppError) -> bool {
        error.is_retryable()
    }
}

/// [`SourceAdapter`] that paginates a [`PlatformApi`] over HTTP.
pub struct HttpSource<A, F> {
    api: Arc<A>,
    fetcher: F,
    gate: SourceGate,
    max_pages: usize,
}

impl<A: PlatformApi, F: Fetcher + 'static> HttpSource<A, F> {
    pub fn new(api: A, fetcher: F, limiter: Arc<RateLimiter>, policy: RetryPolicy) -> Self {
        let api = Arc::new(api);
        let classifier = Arc::clone(&api);
        let retry = RetryExecutor::new(policy).with_classifier(move |e| classifier.is_transient(e));
        let gate = SourceGate::new(api.platform(), limiter, retry);
        Self {
            api,
            fetcher,
            gate,
            max_pages: DEFAULT_MAX_PAGES,
        }
    }

    pub fn with_max_pages(mut self, max_pages: usize) -> Self {
        self.max_pages = max_pages.max(1);
        self
    }

    /// Fetch and parse one page. Parsing runs inside the retried operation,
    /// since some platforms report throttling in a successful response body.
    async fn fetch_page(&self, query: &SearchQuery, page: usize) -> Result<Page, AppError> {
        let url = self.api.page_url(query, page)?;
        let (fetcher, api, url) = (&self.fetcher, &self.api, url.as_str());
        self.gate
            .call(query.deadline, || async move {
                let body = fetcher.fetch(url).await?;
                api.parse_page(&body, page)
            })
            .await
    }
}

#[async_trait]
impl<A: PlatformApi, F: Fetcher + 'static> SourceAdapter for HttpSource<A, F> {
    fn platform(&self) -> Platform {
        self.gate.platform()
    }

    async fn search(&self, query: &SearchQuery) -> SourceBatch {
        let platform = self.gate.platform();
        if query.term.trim().is_empty() {
            return SourceBatch::failed(AppError::InvalidQuery("Search term is empty".into()));
        }

        let mut postings = Vec::new();
        for page in 0..self.max_pages {
            let parsed = match self.fetch_page(query, page).await {
                Ok(parsed) => parsed,
                Err(e) if postings.is_empty() => return SourceBatch::failed(e),
                Err(e) => {
                    tracing::warn!(%platform, page, kept = postings.len(), error = %e, "Pagination stopped early");
                    return SourceBatch::partial(postings, e);
                }
            };

            let count = parsed.postings.len();
            postings.extend(parsed.postings.into_iter().filter(|p| query.accepts(p)));
            tracing::debug!(%platform, page, count, total = postings.len(), "Fetched page");

            if count == 0 || !parsed.has_more || postings.len() >= query.max_results {
                break;
            }
        }

        postings.truncate(query.max_results);
        SourceBatch::complete(postings)
    }
}

// -- Shared parsing helpers --

pub(crate) fn parse_json<T: DeserializeOwned>(platform: Platform, body: &str) -> Result<T, AppError> {
    serde_json::from_str(body).map_err(|e| AppError::ParseError(format!("{platform} response: {e}")))
}

pub(crate) fn days_ago(days: i64) -> Option<NaiveDate> {
    Utc::now()
        .date_naive()
        .checked_sub_signed(TimeDelta::try_days(days)?)
}

/// Parse phrases like "3 days ago", "an hour ago" or "2 weeks ago".
pub(crate) fn parse_relative_date(text: &str) -> Option<NaiveDate> {
    let text = text.trim().to_lowercase();
    let mut words = text.split_whitespace();
    let amount = match words.next()? {
        "a" | "an" => 1,
        "just" | "today" => return days_ago(0),
        "yesterday" => return days_ago(1),
        n => n.trim_end_matches('+').parse::<i64>().ok()?,
    };
    let unit = words.next()?.trim_end_matches('s');
    let days = match unit {
        "minute" | "min" | "hour" => 0,
        "day" => amount,
        "week" => amount * 7,
        "month" => amount * 30,
        _ => return None,
    };
    days_ago(days)
}

pub(crate) fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::time::Duration;

    use quarry_core::rate_limit::RateLimitConfig;
    use quarry_core::testutil::MockFetcher;
    use serde::Deserialize;

    use super::*;

    /// Minimal API: `{"items": ["title", ...], "more": bool}`.
    struct StubApi;

    #[derive(Deserialize)]
    struct StubPage {
        items: Vec<String>,
        #[serde(default)]
        more: bool,
    }

    impl PlatformApi for StubApi {
        fn platform(&self) -> Platform {
            Platform::Indeed
        }

        fn page_size(&self) -> usize {
            2
        }

        fn page_url(&self, query: &SearchQuery, page: usize) -> Result<Url, AppError> {
            let mut url = Url::parse("https://stub.test/jobs").map_err(|e| AppError::InvalidQuery(e.to_string()))?;
            url.query_pairs_mut()
                .append_pair("q", &query.term)
                .append_pair("page", &page.to_string());
            Ok(url)
        }

        fn parse_page(&self, body: &str, _page: usize) -> Result<Page, AppError> {
            let page: StubPage = parse_json(Platform::Indeed, body)?;
            Ok(Page {
                postings: page
                    .items
                    .into_iter()
                    .map(|t| PostingCandidate::new(Platform::Indeed, t.clone(), "Stub Co").with_source_id(t))
                    .collect(),
                has_more: page.more,
            })
        }
    }

    fn limiter(platform: Platform) -> Arc<RateLimiter> {
        Arc::new(
            RateLimiter::new(HashMap::new()).with_config(platform, RateLimitConfig::new(600, 6000, Duration::ZERO)),
        )
    }

    fn policy() -> RetryPolicy {
        RetryPolicy::default()
            .with_max_retries(2)
            .with_initial_delay(Duration::from_millis(10))
            .with_jitter(false)
    }

    fn source(fetcher: MockFetcher) -> HttpSource<StubApi, MockFetcher> {
        HttpSource::new(StubApi, fetcher, limiter(Platform::Indeed), policy())
    }

    fn unavailable() -> Result<String, AppError> {
        Err(AppError::Http {
            status: 503,
            message: "unavailable".into(),
        })
    }

    fn page(items: &[&str], more: bool) -> Result<String, AppError> {
        Ok(serde_json::json!({ "items": items, "more": more }).to_string())
    }

    #[tokio::test(start_paused = true)]
    async fn test_paginates_until_has_more_is_false() {
        let fetcher = MockFetcher::with_responses(vec![page(&["a", "b"], true), page(&["c"], false)]);
        let batch = source(fetcher.clone()).search(&SearchQuery::new("rust")).await;

        assert!(batch.error.is_none());
        assert_eq!(batch.postings.len(), 3);
        let urls = fetcher.requested_urls();
        assert_eq!(urls.len(), 2);
        assert!(urls[1].contains("page=1"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stops_at_max_results() {
        let fetcher = MockFetcher::with_responses(vec![page(&["a", "b"], true), page(&["c", "d"], true)]);
        let batch = source(fetcher.clone())
            .search(&SearchQuery::new("rust").with_max_results(3))
            .await;

        assert_eq!(batch.postings.len(), 3);
        assert_eq!(fetcher.requested_urls().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failure_is_retried() {
        let fetcher = MockFetcher::with_responses(vec![unavailable(), page(&["a"], false)]);
        let batch = source(fetcher.clone()).search(&SearchQuery::new("rust")).await;

        assert!(batch.error.is_none());
        assert_eq!(batch.postings.len(), 1);
        assert_eq!(fetcher.requested_urls().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_mid_pagination_failure_keeps_earlier_pages() {
        let fetcher = MockFetcher::with_responses(vec![
            page(&["a", "b"], true),
            Err(AppError::AuthError("key revoked".into())),
        ]);
        let batch = source(fetcher.clone()).search(&SearchQuery::new("rust")).await;

        assert_eq!(batch.postings.len(), 2);
        assert!(matches!(batch.error, Some(AppError::AuthError(_))));
        // Permanent errors are not retried.
        assert_eq!(fetcher.requested_urls().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_page_failure_fails_batch() {
        let fetcher = MockFetcher::with_responses(vec![Ok("<html>".into())]);
        let batch = source(fetcher).search(&SearchQuery::new("rust")).await;

        assert!(batch.postings.is_empty());
        assert!(matches!(batch.error, Some(AppError::ParseError(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_permanent_first_page_error_is_not_retried() {
        let fetcher = MockFetcher::with_error(AppError::AuthError("bad key".into()));
        let batch = source(fetcher.clone()).search(&SearchQuery::new("rust")).await;

        assert!(matches!(batch.error, Some(AppError::AuthError(_))));
        assert_eq!(fetcher.requested_urls().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_max_pages_caps_pagination() {
        let fetcher = MockFetcher::with_responses(vec![
            page(&["a", "b"], true),
            page(&["c", "d"], true),
            page(&["e", "f"], true),
        ]);
        let batch = source(fetcher.clone())
            .with_max_pages(2)
            .search(&SearchQuery::new("rust"))
            .await;

        assert!(batch.error.is_none());
        assert_eq!(batch.postings.len(), 4);
        assert_eq!(fetcher.requested_urls().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_past_deadline_fails_as_timeout() {
        // 10ms backoff fits before the deadline, the following 20ms one does not.
        let fetcher = MockFetcher::with_responses(vec![unavailable(), unavailable(), page(&["a"], false)]);
        let query = SearchQuery::new("rust").with_deadline(tokio::time::Instant::now() + Duration::from_millis(25));
        let batch = source(fetcher.clone()).search(&query).await;

        assert!(batch.postings.is_empty());
        let err = batch.error.expect("batch should fail");
        assert!(matches!(err, AppError::DeadlineExceeded { .. }));
        assert_eq!(err.failure_kind(), quarry_core::error::FailureKind::Timeout);
        assert_eq!(fetcher.requested_urls().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_throttle_reported_in_body_is_retried() {
        let throttled = r#"{"success": false, "status": "Too-Many-Requests"}"#;
        let good = r#"{
            "success": true,
            "response": {
                "currentPageNumber": 1,
                "totalNumberOfPages": 1,
                "jobListings": [{"listingId": 77, "jobTitle": "Site Reliability Engineer", "employer": {"name": "Hooli"}}]
            }
        }"#;
        let fetcher = MockFetcher::with_responses(vec![Ok(throttled.into()), Ok(good.into())]);
        let api = Glassdoor::new(Url::parse("https://glassdoor.test/api/api.htm").unwrap());
        let source = HttpSource::new(api, fetcher.clone(), limiter(Platform::Glassdoor), policy());

        let batch = source.search(&SearchQuery::new("sre")).await;

        assert!(batch.error.is_none(), "unexpected error: {:?}", batch.error);
        assert_eq!(batch.postings.len(), 1);
        assert_eq!(batch.postings[0].source_id.as_deref(), Some("77"));
        let urls = fetcher.requested_urls();
        assert_eq!(urls.len(), 2);
        assert_eq!(urls[0], urls[1]);
    }

    #[tokio::test]
    async fn test_empty_term_is_rejected_without_requests() {
        let fetcher = MockFetcher::with_responses(vec![]);
        let batch = source(fetcher.clone()).search(&SearchQuery::new("  ")).await;

        assert!(matches!(batch.error, Some(AppError::InvalidQuery(_))));
        assert!(fetcher.requested_urls().is_empty());
    }

    #[test]
    fn test_relative_dates() {
        let today = Utc::now().date_naive();
        assert_eq!(parse_relative_date("5 hours ago"), Some(today));
        assert_eq!(parse_relative_date("a day ago"), days_ago(1));
        assert_eq!(parse_relative_date("3 days ago"), days_ago(3));
        assert_eq!(parse_relative_date("2 weeks ago"), days_ago(14));
        assert_eq!(parse_relative_date("30+ days ago"), days_ago(30));
        assert_eq!(parse_relative_date("Just posted"), Some(today));
        assert_eq!(parse_relative_date("sometime"), None);
    }
}
