use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::AppError;
use crate::platform::Platform;

/// A normalized posting as produced by a source adapter, before persistence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostingCandidate {
    pub platform: Platform,
    /// Platform-native identifier, when the platform exposes one.
    pub source_id: Option<String>,
    pub url: Option<String>,
    pub title: String,
    pub company: String,
    pub location: Option<String>,
    pub job_type: Option<String>,
    pub posted_date: Option<NaiveDate>,
    pub description: Option<String>,
    pub salary_min: Option<f64>,
    pub salary_max: Option<f64>,
    pub currency: Option<String>,
}

impl PostingCandidate {
    pub fn new(platform: Platform, title: impl Into<String>, company: impl Into<String>) -> Self {
        Self {
            platform,
            source_id: None,
            url: None,
            title: title.into(),
            company: company.into(),
            location: None,
            job_type: None,
            posted_date: None,
            description: None,
            salary_min: None,
            salary_max: None,
            currency: None,
        }
    }

    pub fn with_source_id(mut self, id: impl Into<String>) -> Self {
        self.source_id = Some(id.into());
        self
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    pub fn with_job_type(mut self, job_type: impl Into<String>) -> Self {
        self.job_type = Some(job_type.into());
        self
    }

    pub fn with_posted_date(mut self, date: NaiveDate) -> Self {
        self.posted_date = Some(date);
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_salary(mut self, min: Option<f64>, max: Option<f64>, currency: Option<&str>) -> Self {
        self.salary_min = min;
        self.salary_max = max;
        self.currency = currency.map(str::to_string);
        self
    }

    /// Trim every text field and turn blank optionals into `None`.
    pub fn normalize(mut self) -> Self {
        self.title = self.title.trim().to_string();
        self.company = self.company.trim().to_string();
        for field in [
            &mut self.source_id,
            &mut self.url,
            &mut self.location,
            &mut self.job_type,
            &mut self.description,
            &mut self.currency,
        ] {
            *field = field
                .take()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty());
        }
        if let (Some(min), Some(max)) = (self.salary_min, self.salary_max)
            && min > max
        {
            self.salary_min = Some(max);
            self.salary_max = Some(min);
        }
        self
    }

    /// Stable identity derived from the platform and its native ID (or URL).
    ///
    /// Falls back to company/title/location when the platform gave neither.
    pub fn fingerprint(&self) -> String {
        let identity = match (&self.source_id, &self.url) {
            (Some(id), _) => id.clone(),
            (None, Some(url)) => url.clone(),
            (None, None) => self.dedup_key(),
        };
        compute_hash(&format!("{}:{}", self.platform, identity))
    }

    /// Platform-independent key used to spot the same job on two platforms.
    pub fn dedup_key(&self) -> String {
        let location = self.location.as_deref().unwrap_or("");
        [self.company.as_str(), self.title.as_str(), location]
            .iter()
            .map(|part| collapse_whitespace(part).to_lowercase())
            .collect::<Vec<_>>()
            .join("|")
    }
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// A persisted job posting.
#[derive(Debug, Clone, Serialize)]
pub struct JobPosting {
    pub id: i64,
    pub fingerprint: String,
    pub platform: Platform,
    pub source_id: Option<String>,
    pub url: Option<String>,
    pub title: String,
    pub company: String,
    pub location: Option<String>,
    pub job_type: Option<String>,
    pub posted_date: Option<NaiveDate>,
    pub description: Option<String>,
    pub salary_min: Option<f64>,
    pub salary_max: Option<f64>,
    pub currency: Option<String>,
    pub first_seen_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
    /// Number of ingests that reported this posting.
    pub times_seen: i64,
}

/// Filter for listing stored postings. Empty filter matches everything.
#[derive(Debug, Clone)]
pub struct PostingFilter {
    pub fingerprint: Option<String>,
    pub platform: Option<Platform>,
    /// Case-insensitive substring match.
    pub company: Option<String>,
    /// Case-insensitive substring match.
    pub location: Option<String>,
    pub posted_since: Option<NaiveDate>,
    pub limit: usize,
    pub offset: usize,
}

impl Default for PostingFilter {
    fn default() -> Self {
        Self {
            fingerprint: None,
            platform: None,
            company: None,
            location: None,
            posted_since: None,
            limit: 50,
            offset: 0,
        }
    }
}

impl PostingFilter {
    pub fn by_fingerprint(fingerprint: impl Into<String>) -> Self {
        Self {
            fingerprint: Some(fingerprint.into()),
            ..Default::default()
        }
    }
}

/// Outcome of a batch upsert.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct UpsertSummary {
    pub inserted: usize,
    pub updated: usize,
    /// Postings dropped on an integrity error.
    pub skipped: usize,
}

/// Status of a job application. Transitions are not restricted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApplicationStatus {
    Pending,
    Applied,
    Interviewing,
    Rejected,
    Accepted,
}

impl ApplicationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApplicationStatus::Pending => "pending",
            ApplicationStatus::Applied => "applied",
            ApplicationStatus::Interviewing => "interviewing",
            ApplicationStatus::Rejected => "rejected",
            ApplicationStatus::Accepted => "accepted",
        }
    }
}

impl fmt::Display for ApplicationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ApplicationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(ApplicationStatus::Pending),
            "applied" => Ok(ApplicationStatus::Applied),
            "interviewing" => Ok(ApplicationStatus::Interviewing),
            "rejected" => Ok(ApplicationStatus::Rejected),
            "accepted" => Ok(ApplicationStatus::Accepted),
            _ => Err(format!("Unknown application status: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Application {
    pub id: i64,
    pub job_id: i64,
    pub resume_id: Option<i64>,
    pub status: ApplicationStatus,
    pub applied_at: DateTime<Utc>,
    pub match_score: Option<f64>,
    pub notes: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// Application joined with the posting it refers to.
#[derive(Debug, Clone, Serialize)]
pub struct ApplicationView {
    #[serde(flatten)]
    pub application: Application,
    pub job_title: String,
    pub company: String,
    pub location: Option<String>,
}

/// Request to create a new application.
#[derive(Debug, Clone)]
pub struct NewApplication {
    pub job_id: i64,
    pub resume_id: Option<i64>,
    pub status: ApplicationStatus,
    pub match_score: Option<f64>,
    pub notes: Option<String>,
}

impl NewApplication {
    pub fn new(job_id: i64) -> Self {
        Self {
            job_id,
            resume_id: None,
            status: ApplicationStatus::Pending,
            match_score: None,
            notes: None,
        }
    }

    pub fn with_resume(mut self, resume_id: i64) -> Self {
        self.resume_id = Some(resume_id);
        self
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    pub fn with_match_score(mut self, score: f64) -> Self {
        self.match_score = Some(score);
        self
    }

    pub fn validate(&self) -> Result<(), AppError> {
        validate_match_score(self.match_score)
    }
}

/// Partial update of an application. `None` fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct ApplicationUpdate {
    pub status: Option<ApplicationStatus>,
    pub notes: Option<String>,
    pub match_score: Option<f64>,
}

impl ApplicationUpdate {
    pub fn status(status: ApplicationStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.status.is_none() && self.notes.is_none() && self.match_score.is_none()
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.is_empty() {
            return Err(AppError::ValidationError("No fields to update".into()));
        }
        validate_match_score(self.match_score)
    }
}

fn validate_match_score(score: Option<f64>) -> Result<(), AppError> {
    match score {
        Some(s) if !(0.0..=100.0).contains(&s) => Err(AppError::ValidationError(format!(
            "match_score must be between 0 and 100, got {s}"
        ))),
        _ => Ok(()),
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Resume {
    pub id: i64,
    pub filename: String,
    pub file_path: String,
    pub file_type: String,
    pub uploaded_at: DateTime<Utc>,
}

/// Metadata for a resume whose file is stored elsewhere.
#[derive(Debug, Clone)]
pub struct NewResume {
    pub filename: String,
    pub file_path: String,
    pub file_type: String,
    pub content: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSkill {
    pub skill: String,
    pub importance: Option<String>,
}

/// Aggregate counts over the store.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Stats {
    pub total_jobs: i64,
    pub total_applications: i64,
    pub total_resumes: i64,
    pub applications_by_status: BTreeMap<String, i64>,
    pub jobs_by_platform: BTreeMap<String, i64>,
}

/// Compute a SHA-256 hash of a string, returned as 64-char hex.
pub fn compute_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}
