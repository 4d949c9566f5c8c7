use quarry_core::error::AppError;
use quarry_core::models::PostingCandidate;
use quarry_core::platform::Platform;
use quarry_core::source::SearchQuery;
use serde::Deserialize;
use url::Url;

use super::{Page, PlatformApi, non_empty, parse_json, parse_relative_date};

const NO_RESULTS: &str = "hasn't returned any results";

/// Google Jobs through a SERP API proxy.
pub struct GoogleJobs {
    base: Url,
}

impl GoogleJobs {
    pub fn new(base: Url) -> Self {
        Self { base }
    }
}

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    jobs_results: Vec<GoogleJob>,
    error: Option<String>,
}

#[derive(Deserialize)]
struct GoogleJob {
    job_id: String,
    title: String,
    #[serde(default)]
    company_name: String,
    location: Option<String>,
    description: Option<String>,
    share_link: Option<String>,
    #[serde(default)]
    apply_options: Vec<ApplyOption>,
    detected_extensions: Option<Extensions>,
}

#[derive(Deserialize)]
struct ApplyOption {
    link: String,
}

#[derive(Deserialize)]
struct Extensions {
    posted_at: Option<String>,
    schedule_type: Option<String>,
}

impl From<GoogleJob> for PostingCandidate {
    fn from(job: GoogleJob) -> Self {
        let mut candidate = PostingCandidate::new(Platform::Google, job.title, job.company_name).with_source_id(job.job_id);
        // Prefer the employer's apply link over Google's share link.
        candidate.url = job
            .apply_options
            .into_iter()
            .map(|o| o.link)
            .find(|l| !l.is_empty())
            .or_else(|| non_empty(job.share_link));
        candidate.location = non_empty(job.location);
        candidate.description = non_empty(job.description);
        if let Some(ext) = job.detected_extensions {
            candidate.job_type = non_empty(ext.schedule_type);
            candidate.posted_date = ext.posted_at.as_deref().and_then(parse_relative_date);
        }
        candidate
    }
}

impl PlatformApi for GoogleJobs {
    fn platform(&self) -> Platform {
        Platform::Google
    }

    fn page_size(&self) -> usize {
        10
    }

    fn page_url(&self, query: &SearchQuery, page: usize) -> Result<Url, AppError> {
        let mut url = self.base.clone();
        {
            let mut pairs = url.query_pairs_mut();
            pairs
                .append_pair("engine", "google_jobs")
                .append_pair("q", &query.term)
                .append_pair("start", &(page * self.page_size()).to_string());
            if let Some(location) = &query.location {
                pairs.append_pair("location", location);
            }
            if let Some(days) = query.max_age_days() {
                let chip = match days {
                    1 => "date_posted:today",
                    2..=3 => "date_posted:3days",
                    4..=7 => "date_posted:week",
                    _ => "date_posted:month",
                };
                pairs.append_pair("chips", chip);
            }
        }
        Ok(url)
    }

    fn parse_page(&self, body: &str, _page: usize) -> Result<Page, AppError> {
        let response: SearchResponse = parse_json(Platform::Google, body)?;
        if let Some(error) = response.error {
            if error.contains(NO_RESULTS) {
                return Ok(Page::default());
            }
            if error.to_lowercase().contains("api key") {
                return Err(AppError::AuthError(format!("google: {error}")));
            }
            return Err(AppError::ParseError(format!("google: {error}")));
        }
        Ok(Page {
            has_more: response.jobs_results.len() >= self.page_size(),
            postings: response.jobs_results.into_iter().map(Into::into).collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::super::days_ago;
    use super::*;

    fn api() -> GoogleJobs {
        GoogleJobs::new(Url::parse("https://serp.test/search").unwrap())
    }

    #[test]
    fn test_parse_page() {
        let body = r#"{
            "jobs_results": [{
                "job_id": "eyJqb2JfdGl0bGUiOiJSdXN0In0=",
                "title": "Rust Engineer",
                "company_name": "Stark Industries",
                "location": "  New York, NY ",
                "description": "Systems work.",
                "share_link": "https://www.google.com/search?ibp=htl;jobs#abc",
                "apply_options": [{"title": "Stark Careers", "link": "https://careers.stark.example/123"}],
                "detected_extensions": {"posted_at": "3 days ago", "schedule_type": "Full-time"}
            }]
        }"#;
        let page = api().parse_page(body, 0).unwrap();
        assert!(!page.has_more);

        let job = &page.postings[0];
        assert_eq!(job.url.as_deref(), Some("https://careers.stark.example/123"));
        assert_eq!(job.posted_date, days_ago(3));
        assert_eq!(job.job_type.as_deref(), Some("Full-time"));
    }

    #[test]
    fn test_no_results_is_empty_page() {
        let body = r#"{"error": "Google hasn't returned any results for this query."}"#;
        let page = api().parse_page(body, 0).unwrap();
        assert!(page.postings.is_empty());
    }

    #[test]
    fn test_invalid_key_is_auth_error() {
        let body = r#"{"error": "Invalid API key. Your API key should be here: https://serpapi.com/manage-api-key"}"#;
        assert!(matches!(api().parse_page(body, 0), Err(AppError::AuthError(_))));
    }

    #[test]
    fn test_max_age_chip() {
        let query = SearchQuery::new("rust").with_max_age(std::time::Duration::from_secs(5 * 86_400));
        let url = api().page_url(&query, 0).unwrap();
        assert!(url.query_pairs().any(|(k, v)| k == "chips" && v == "date_posted:week"));
    }
}
