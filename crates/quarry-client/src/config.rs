use std::collections::HashMap;
use std::time::Duration;

use quarry_core::config::parse_var;
use quarry_core::error::AppError;
use quarry_core::platform::Platform;
use url::Url;

/// Base URLs for each platform's search endpoint plus HTTP settings.
#[derive(Debug, Clone)]
pub struct SourceEndpoints {
    bases: HashMap<Platform, Url>,
    pub http_timeout: Duration,
}

fn default_base(platform: Platform) -> &'static str {
    match platform {
        Platform::Indeed => "https://api.indeed.com/ads/apisearch",
        Platform::LinkedIn => "https://api.linkedin.com/v2/jobSearch",
        Platform::ZipRecruiter => "https://api.ziprecruiter.com/jobs/v1",
        Platform::Glassdoor => "https://api.glassdoor.com/api/api.htm",
        Platform::Google => "https://serpapi.com/search",
    }
}

fn env_key(platform: Platform) -> String {
    format!("QUARRY_{}_URL", platform.as_str().to_uppercase())
}

impl SourceEndpoints {
    /// Read configuration from environment variables.
    ///
    /// - `QUARRY_<PLATFORM>_URL` (optional), e.g. `QUARRY_ZIP_RECRUITER_URL`
    /// - `QUARRY_HTTP_TIMEOUT_SECS` (optional, defaults to 30)
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<L>(lookup: L) -> Result<Self, AppError>
    where
        L: Fn(&str) -> Option<String>,
    {
        let mut bases = HashMap::new();
        for platform in Platform::ALL {
            let key = env_key(platform);
            let raw = lookup(&key).unwrap_or_else(|| default_base(platform).to_string());
            let url = Url::parse(raw.trim())
                .map_err(|e| AppError::ConfigError(format!("Invalid {key} '{raw}': {e}")))?;
            bases.insert(platform, url);
        }

        let timeout_secs: u64 = parse_var(&lookup, "QUARRY_HTTP_TIMEOUT_SECS", 30)?;
        if timeout_secs == 0 {
            return Err(AppError::ConfigError(
                "QUARRY_HTTP_TIMEOUT_SECS must be at least 1".into(),
            ));
        }

        Ok(Self {
            bases,
            http_timeout: Duration::from_secs(timeout_secs),
        })
    }

    /// Base search URL for `platform`.
    pub fn base(&self, platform: Platform) -> Option<Url> {
        self.bases.get(&platform).cloned()
    }

    pub fn with_base(mut self, platform: Platform, url: Url) -> Self {
        self.bases.insert(platform, url);
        self
    }
}

impl Default for SourceEndpoints {
    fn default() -> Self {
        let bases = Platform::ALL
            .into_iter()
            .filter_map(|p| Url::parse(default_base(p)).ok().map(|u| (p, u)))
            .collect();
        Self {
            bases,
            http_timeout: Duration::from_secs(30),
        }
    }
}
