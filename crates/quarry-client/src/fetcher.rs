use std::time::Duration;

use quarry_core::error::AppError;
use quarry_core::traits::Fetcher;
use reqwest::{Client, StatusCode};

/// HTTP fetcher using reqwest.
///
/// Maps transport failures and HTTP statuses onto [`AppError`] so the retry
/// layer can tell transient failures (timeouts, resets, 429, 5xx) from
/// permanent ones (401/403, other 4xx).
#[derive(Clone)]
pub struct ReqwestFetcher {
    client: Client,
    timeout_secs: u64,
}

impl ReqwestFetcher {
    pub fn new() -> Result<Self, AppError> {
        Self::with_timeout(Duration::from_secs(30))
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self, AppError> {
        let client = Client::builder()
            .user_agent("Quarry/0.1 (job search aggregator)")
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::ConfigError(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            timeout_secs: timeout.as_secs(),
        })
    }
}

impl Fetcher for ReqwestFetcher {
    async fn fetch(&self, url: &str) -> Result<String, AppError> {
        let response = self
            .client
            .get(url)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AppError::Timeout(self.timeout_secs)
                } else if e.is_connect() {
                    AppError::NetworkError(format!("Connection failed: {e}"))
                } else if e.is_builder() {
                    AppError::InvalidQuery(format!("Invalid request URL: {e}"))
                } else {
                    AppError::NetworkError(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(status_error(status, url));
        }

        response.text().await.map_err(|e| {
            if e.is_timeout() {
                AppError::Timeout(self.timeout_secs)
            } else {
                AppError::NetworkError(format!("Failed to read response body: {e}"))
            }
        })
    }
}

fn status_error(status: StatusCode, url: &str) -> AppError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            AppError::AuthError(format!("HTTP {} for {url}", status.as_u16()))
        }
        _ => AppError::Http {
            status: status.as_u16(),
            message: format!("{} for {url}", status.canonical_reason().unwrap_or("Unexpected status")),
        },
    }
}
