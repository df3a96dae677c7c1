use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use url::Url;

/// Outcome of the one fetch attempt a URL gets per run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VisitStatus {
    /// Fetched, extracted and judged
    Success,
    /// Fetch or extraction failed; never retried within the run
    Failed,
    /// Fetched but not processed (e.g. redirected off the allow-list)
    Skipped,
}

impl VisitStatus {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "success" => Some(Self::Success),
            "failed" => Some(Self::Failed),
            "skipped" => Some(Self::Skipped),
            _ => None,
        }
    }
}

impl fmt::Display for VisitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}

/// The single record a normalized URL gets once it has been dequeued and attempted
///
/// Its presence is what keeps a URL from ever entering the frontier again.
#[derive(Debug, Clone, PartialEq)]
pub struct VisitedRecord {
    pub url: Url,
    pub status: VisitStatus,
    pub depth: u32,
    pub fetched_at: DateTime<Utc>,
    /// Failure or skip reason, if any
    pub error: Option<String>,
}

impl VisitedRecord {
    pub fn success(url: Url, depth: u32) -> Self {
        Self {
            url,
            status: VisitStatus::Success,
            depth,
            fetched_at: Utc::now(),
            error: None,
        }
    }

    pub fn failed(url: Url, depth: u32, error: impl Into<String>) -> Self {
        Self {
            url,
            status: VisitStatus::Failed,
            depth,
            fetched_at: Utc::now(),
            error: Some(error.into()),
        }
    }

    pub fn skipped(url: Url, depth: u32, reason: impl Into<String>) -> Self {
        Self {
            url,
            status: VisitStatus::Skipped,
            depth,
            fetched_at: Utc::now(),
            error: Some(reason.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip_db_string() {
        for status in [VisitStatus::Success, VisitStatus::Failed, VisitStatus::Skipped] {
            assert_eq!(VisitStatus::from_db_string(status.to_db_string()), Some(status));
        }
        assert_eq!(VisitStatus::from_db_string("pending"), None);
    }

    #[test]
    fn test_constructors() {
        let url = Url::parse("https://example.edu/").unwrap();
        let ok = VisitedRecord::success(url.clone(), 0);
        assert_eq!(ok.status, VisitStatus::Success);
        assert!(ok.error.is_none());

        let failed = VisitedRecord::failed(url, 1, "timeout");
        assert_eq!(failed.status, VisitStatus::Failed);
        assert_eq!(failed.error.as_deref(), Some("timeout"));
        assert_eq!(failed.depth, 1);
    }

    #[test]
    fn test_serde_lowercase() {
        assert_eq!(serde_json::to_string(&VisitStatus::Skipped).unwrap(), "\"skipped\"");
    }
}
