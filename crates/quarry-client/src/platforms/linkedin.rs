use chrono::DateTime;
use quarry_core::error::AppError;
use quarry_core::models::PostingCandidate;
use quarry_core::platform::Platform;
use quarry_core::source::SearchQuery;
use serde::Deserialize;
use url::Url;

use super::{Page, PlatformApi, non_empty, parse_json};

/// LinkedIn job search.
///
/// LinkedIn throttles aggressively and answers an exhausted quota with 999 or
/// 429; both are treated as transient.
pub struct LinkedIn {
    base: Url,
}

impl LinkedIn {
    pub fn new(base: Url) -> Self {
        Self { base }
    }
}

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    elements: Vec<LinkedInJob>,
    paging: Option<Paging>,
}

#[derive(Deserialize)]
struct Paging {
    start: usize,
    count: usize,
    total: Option<usize>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LinkedInJob {
    /// `urn:li:jobPosting:<id>`
    entity_urn: String,
    title: String,
    #[serde(default)]
    company_name: String,
    formatted_location: Option<String>,
    /// Epoch milliseconds.
    listed_at: Option<i64>,
    job_posting_url: Option<String>,
    description: Option<Description>,
    employment_type: Option<String>,
}

#[derive(Deserialize)]
struct Description {
    text: Option<String>,
}

impl From<LinkedInJob> for PostingCandidate {
    fn from(job: LinkedInJob) -> Self {
        let id = job
            .entity_urn
            .rsplit(':')
            .next()
            .unwrap_or(&job.entity_urn)
            .to_string();
        let mut candidate = PostingCandidate::new(Platform::LinkedIn, job.title, job.company_name).with_source_id(id);
        candidate.url = non_empty(job.job_posting_url);
        candidate.location = non_empty(job.formatted_location);
        candidate.description = non_empty(job.description.and_then(|d| d.text));
        candidate.job_type = non_empty(job.employment_type);
        candidate.posted_date = job
            .listed_at
            .and_then(DateTime::from_timestamp_millis)
            .map(|d| d.date_naive());
        candidate
    }
}

impl PlatformApi for LinkedIn {
    fn platform(&self) -> Platform {
        Platform::LinkedIn
    }

    fn page_url(&self, query: &SearchQuery, page: usize) -> Result<Url, AppError> {
        let mut url = self.base.clone();
        {
            let mut pairs = url.query_pairs_mut();
            pairs
                .append_pair("keywords", &query.term)
                .append_pair("start", &(page * self.page_size()).to_string())
                .append_pair("count", &self.page_size().to_string());
            if let Some(location) = &query.location {
                pairs.append_pair("location", location);
            }
            if let Some(max_age) = query.max_age {
                // "time posted range" in seconds: r86400 is the last 24 hours.
                pairs.append_pair("f_TPR", &format!("r{}", max_age.as_secs()));
            }
        }
        Ok(url)
    }

    fn parse_page(&self, body: &str, _page: usize) -> Result<Page, AppError> {
        let response: SearchResponse = parse_json(Platform::LinkedIn, body)?;
        let has_more = match response.paging {
            Some(Paging {
                start,
                count,
                total: Some(total),
            }) => start + count < total,
            _ => response.elements.len() >= self.page_size(),
        };
        Ok(Page {
            postings: response.elements.into_iter().map(Into::into).collect(),
            has_more,
        })
    }

    fn is_transient(&self, error: &AppError) -> bool {
        matches!(error, AppError::Http { status: 999, .. }) || error.is_retryable()
    }
}
