use quarry_core::error::AppError;
use quarry_core::models::PostingCandidate;
use quarry_core::platform::Platform;
use quarry_core::source::SearchQuery;
use serde::Deserialize;
use url::Url;

use super::{Page, PlatformApi, days_ago, non_empty, parse_json};

/// Glassdoor partner API.
///
/// Errors arrive as HTTP 200 with `success: false`, so the envelope is checked
/// before the listings.
pub struct Glassdoor {
    base: Url,
}

impl Glassdoor {
    pub fn new(base: Url) -> Self {
        Self { base }
    }
}

#[derive(Deserialize)]
struct Envelope {
    success: bool,
    #[serde(default)]
    status: String,
    response: Option<SearchResponse>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchResponse {
    #[serde(default)]
    job_listings: Vec<Listing>,
    current_page_number: usize,
    total_number_of_pages: usize,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Listing {
    listing_id: u64,
    job_title: String,
    employer: Option<Employer>,
    location: Option<String>,
    job_view_url: Option<String>,
    age_in_days: Option<i64>,
    description_fragment: Option<String>,
    pay_period_adjusted_pay: Option<Pay>,
    pay_currency: Option<String>,
}

#[derive(Deserialize)]
struct Employer {
    name: String,
}

#[derive(Deserialize)]
struct Pay {
    p10: Option<f64>,
    p90: Option<f64>,
}

impl From<Listing> for PostingCandidate {
    fn from(listing: Listing) -> Self {
        let company = listing.employer.map(|e| e.name).unwrap_or_default();
        let mut candidate = PostingCandidate::new(Platform::Glassdoor, listing.job_title, company)
            .with_source_id(listing.listing_id.to_string());
        candidate.url = non_empty(listing.job_view_url);
        candidate.location = non_empty(listing.location);
        candidate.description = non_empty(listing.description_fragment);
        candidate.posted_date = listing.age_in_days.and_then(days_ago);
        if let Some(pay) = listing.pay_period_adjusted_pay {
            candidate = candidate.with_salary(pay.p10, pay.p90, listing.pay_currency.as_deref());
        }
        candidate
    }
}

impl PlatformApi for Glassdoor {
    fn platform(&self) -> Platform {
        Platform::Glassdoor
    }

    fn page_url(&self, query: &SearchQuery, page: usize) -> Result<Url, AppError> {
        let mut url = self.base.clone();
        {
            let mut pairs = url.query_pairs_mut();
            pairs
                .append_pair("action", "jobs")
                .append_pair("q", &query.term)
                .append_pair("pn", &(page + 1).to_string())
                .append_pair("ps", &self.page_size().to_string());
            if let Some(location) = &query.location {
                pairs.append_pair("l", location);
            }
            if let Some(days) = query.max_age_days() {
                pairs.append_pair("fromAge", &days.to_string());
            }
        }
        Ok(url)
    }

    fn parse_page(&self, body: &str, _page: usize) -> Result<Page, AppError> {
        let envelope: Envelope = parse_json(Platform::Glassdoor, body)?;
        if !envelope.success {
            return Err(match envelope.status.as_str() {
                "Access-Denied" | "Unauthorized" => AppError::AuthError(format!("glassdoor: {}", envelope.status)),
                "Too-Many-Requests" => AppError::Http {
                    status: 429,
                    message: "glassdoor: quota exceeded".into(),
                },
                other => AppError::ParseError(format!("glassdoor: request failed with status '{other}'")),
            });
        }
        let Some(response) = envelope.response else {
            return Ok(Page::default());
        };
        Ok(Page {
            has_more: response.current_page_number < response.total_number_of_pages,
            postings: response.job_listings.into_iter().map(Into::into).collect(),
        })
    }
}
