use chrono::DateTime;
use quarry_core::error::AppError;
use quarry_core::models::PostingCandidate;
use quarry_core::platform::Platform;
use quarry_core::source::SearchQuery;
use serde::Deserialize;
use url::Url;

use super::{Page, PlatformApi, non_empty, parse_json};

/// Indeed publisher search API.
pub struct Indeed {
    base: Url,
}

impl Indeed {
    pub fn new(base: Url) -> Self {
        Self { base }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchResponse {
    #[serde(default)]
    results: Vec<IndeedJob>,
    #[serde(default)]
    total_results: usize,
    #[serde(default)]
    start: usize,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct IndeedJob {
    jobkey: String,
    jobtitle: String,
    #[serde(default)]
    company: String,
    formatted_location: Option<String>,
    url: Option<String>,
    /// RFC 2822, e.g. `Mon, 03 Mar 2025 14:02:11 GMT`.
    date: Option<String>,
    snippet: Option<String>,
    job_type: Option<String>,
    salary: Option<IndeedSalary>,
}

#[derive(Deserialize)]
struct IndeedSalary {
    min: Option<f64>,
    max: Option<f64>,
    currency: Option<String>,
}

impl From<IndeedJob> for PostingCandidate {
    fn from(job: IndeedJob) -> Self {
        let mut candidate = PostingCandidate::new(Platform::Indeed, job.jobtitle, job.company).with_source_id(job.jobkey);
        candidate.url = non_empty(job.url);
        candidate.location = non_empty(job.formatted_location);
        candidate.description = non_empty(job.snippet);
        candidate.job_type = non_empty(job.job_type);
        candidate.posted_date = job
            .date
            .as_deref()
            .and_then(|d| DateTime::parse_from_rfc2822(d).ok())
            .map(|d| d.date_naive());
        if let Some(salary) = job.salary {
            candidate = candidate.with_salary(salary.min, salary.max, salary.currency.as_deref());
        }
        candidate
    }
}

impl PlatformApi for Indeed {
    fn platform(&self) -> Platform {
        Platform::Indeed
    }

    fn page_url(&self, query: &SearchQuery, page: usize) -> Result<Url, AppError> {
        let mut url = self.base.clone();
        {
            let mut pairs = url.query_pairs_mut();
            pairs
                .append_pair("format", "json")
                .append_pair("q", &query.term)
                .append_pair("start", &(page * self.page_size()).to_string())
                .append_pair("limit", &self.page_size().to_string());
            if let Some(location) = &query.location {
                pairs.append_pair("l", location);
            }
            if let Some(days) = query.max_age_days() {
                pairs.append_pair("fromage", &days.to_string());
            }
        }
        Ok(url)
    }

    fn parse_page(&self, body: &str, _page: usize) -> Result<Page, AppError> {
        let response: SearchResponse = parse_json(Platform::Indeed, body)?;
        let seen = response.start + response.results.len();
        Ok(Page {
            has_more: seen < response.total_results,
            postings: response.results.into_iter().map(Into::into).collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;

    fn api() -> Indeed {
        Indeed::new(Url::parse("https://indeed.test/ads/apisearch").unwrap())
    }

    const FIXTURE: &str = r#"{
        "start": 0,
        "totalResults": 40,
        "results": [
            {
                "jobkey": "a1b2c3",
                "jobtitle": "Backend Engineer",
                "company": "Acme",
                "formattedLocation": "Austin, TX",
                "url": "https://www.indeed.com/viewjob?jk=a1b2c3",
                "date": "Mon, 03 Mar 2025 14:02:11 GMT",
                "snippet": "Build services in Rust.",
                "jobType": "fulltime",
                "salary": {"min": 120000, "max": 150000, "currency": "USD"}
            },
            {
                "jobkey": "d4e5f6",
                "jobtitle": "SRE",
                "company": "Initech",
                "url": ""
            }
        ]
    }"#;

    #[test]
    fn test_parse_page() {
        let page = api().parse_page(FIXTURE, 0).unwrap();
        assert!(page.has_more);
        assert_eq!(page.postings.len(), 2);

        let first = &page.postings[0];
        assert_eq!(first.source_id.as_deref(), Some("a1b2c3"));
        assert_eq!(first.location.as_deref(), Some("Austin, TX"));
        assert_eq!(first.posted_date, NaiveDate::from_ymd_opt(2025, 3, 3));
        assert_eq!(first.salary_max, Some(150000.0));
        assert_eq!(first.currency.as_deref(), Some("USD"));

        assert_eq!(page.postings[1].url, None);
        assert_eq!(page.postings[1].posted_date, None);
    }

    #[test]
    fn test_last_page_has_no_more() {
        let body = r#"{"start": 25, "totalResults": 26, "results": [{"jobkey": "z", "jobtitle": "Dev"}]}"#;
        assert!(!api().parse_page(body, 1).unwrap().has_more);
    }

    #[test]
    fn test_page_url() {
        let query = SearchQuery::new("rust developer")
            .with_location("Remote")
            .with_max_age(std::time::Duration::from_secs(3 * 86_400));
        let url = api().page_url(&query, 2).unwrap();
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert!(pairs.contains(&("q".into(), "rust developer".into())));
        assert!(pairs.contains(&("start".into(), "50".into())));
        assert!(pairs.contains(&("l".into(), "Remote".into())));
        assert!(pairs.contains(&("fromage".into(), "3".into())));
    }

    #[test]
    fn test_malformed_body() {
        assert!(matches!(api().parse_page("<html>", 0), Err(AppError::ParseError(_))));
    }
}
