use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Supported job search platforms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    Indeed,
    #[serde(rename = "linkedin")]
    LinkedIn,
    ZipRecruiter,
    Glassdoor,
    Google,
}

impl Platform {
    pub const ALL: [Platform; 5] = [
        Platform::Indeed,
        Platform::LinkedIn,
        Platform::ZipRecruiter,
        Platform::Glassdoor,
        Platform::Google,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Indeed => "indeed",
            Platform::LinkedIn => "linkedin",
            Platform::ZipRecruiter => "zip_recruiter",
            Platform::Glassdoor => "glassdoor",
            Platform::Google => "google",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "indeed" => Ok(Platform::Indeed),
            "linkedin" => Ok(Platform::LinkedIn),
            "zip_recruiter" | "ziprecruiter" => Ok(Platform::ZipRecruiter),
            "glassdoor" => Ok(Platform::Glassdoor),
            "google" => Ok(Platform::Google),
            _ => Err(format!(
                "Unknown platform: {s}. Allowed: indeed, linkedin, zip_recruiter, glassdoor, google"
            )),
        }
    }
}
