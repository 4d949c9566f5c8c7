use chrono::DateTime;
use quarry_core::error::AppError;
use quarry_core::models::PostingCandidate;
use quarry_core::platform::Platform;
use quarry_core::source::SearchQuery;
use serde::Deserialize;
use url::Url;

use super::{Page, PlatformApi, non_empty, parse_json};

/// ZipRecruiter jobs API. Pages are one-based.
pub struct ZipRecruiter {
    base: Url,
}

impl ZipRecruiter {
    pub fn new(base: Url) -> Self {
        Self { base }
    }
}

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    jobs: Vec<ZipJob>,
    #[serde(default)]
    num_paginable_jobs: usize,
}

#[derive(Deserialize)]
struct ZipJob {
    id: String,
    name: String,
    hiring_company: Option<HiringCompany>,
    location: Option<String>,
    url: Option<String>,
    posted_time: Option<String>,
    snippet: Option<String>,
    employment_type: Option<String>,
    salary_min_annual: Option<f64>,
    salary_max_annual: Option<f64>,
}

#[derive(Deserialize)]
struct HiringCompany {
    name: String,
}

impl From<ZipJob> for PostingCandidate {
    fn from(job: ZipJob) -> Self {
        let company = job.hiring_company.map(|c| c.name).unwrap_or_default();
        let mut candidate = PostingCandidate::new(Platform::ZipRecruiter, job.name, company)
            .with_source_id(job.id);
        if job.salary_min_annual.is_some() || job.salary_max_annual.is_some() {
            candidate = candidate.with_salary(job.salary_min_annual, job.salary_max_annual, Some("USD"));
        }
        candidate.url = non_empty(job.url);
        candidate.location = non_empty(job.location);
        candidate.description = non_empty(job.snippet);
        candidate.job_type = non_empty(job.employment_type);
        candidate.posted_date = job
            .posted_time
            .as_deref()
            .and_then(|t| DateTime::parse_from_rfc3339(t).ok())
            .map(|d| d.date_naive());
        candidate
    }
}

impl PlatformApi for ZipRecruiter {
    fn platform(&self) -> Platform {
        Platform::ZipRecruiter
    }

    fn page_size(&self) -> usize {
        20
    }

    fn page_url(&self, query: &SearchQuery, page: usize) -> Result<Url, AppError> {
        let mut url = self.base.clone();
        {
            let mut pairs = url.query_pairs_mut();
            pairs
                .append_pair("search", &query.term)
                .append_pair("page", &(page + 1).to_string())
                .append_pair("jobs_per_page", &self.page_size().to_string());
            if let Some(location) = &query.location {
                pairs.append_pair("location", location);
            }
            if let Some(days) = query.max_age_days() {
                pairs.append_pair("days_ago", &days.to_string());
            }
        }
        Ok(url)
    }

    fn parse_page(&self, body: &str, page: usize) -> Result<Page, AppError> {
        let response: SearchResponse = parse_json(Platform::ZipRecruiter, body)?;
        Ok(Page {
            has_more: (page + 1) * self.page_size() < response.num_paginable_jobs,
            postings: response.jobs.into_iter().map(Into::into).collect(),
        })
    }
}
