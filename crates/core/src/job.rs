//! Job status state set.

use core::str::FromStr;
use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// Lifecycle status of a service job, as exchanged with the platform API and
/// persisted in local caches.
///
/// Wire encoding is SCREAMING_SNAKE_CASE (`"EN_ROUTE"`), matching the status
/// strings the dispatch board and the mobile client agree on.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Scheduled,
    EnRoute,
    InProgress,
    Completed,
    Cancelled,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Scheduled => "SCHEDULED",
            JobStatus::EnRoute => "EN_ROUTE",
            JobStatus::InProgress => "IN_PROGRESS",
            JobStatus::Completed => "COMPLETED",
            JobStatus::Cancelled => "CANCELLED",
        }
    }

    /// True once the job needs no further technician action.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Cancelled)
    }
}

impl core::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SCHEDULED" => Ok(JobStatus::Scheduled),
            "EN_ROUTE" => Ok(JobStatus::EnRoute),
            "IN_PROGRESS" => Ok(JobStatus::InProgress),
            "COMPLETED" => Ok(JobStatus::Completed),
            "CANCELLED" => Ok(JobStatus::Cancelled),
            other => Err(DomainError::validation(format!(
                "unknown job status: {other}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_string_round_trip() {
        for status in [
            JobStatus::Scheduled,
            JobStatus::EnRoute,
            JobStatus::InProgress,
            JobStatus::Completed,
            JobStatus::Cancelled,
        ] {
            assert_eq!(status.as_str().parse::<JobStatus>().unwrap(), status);
        }
    }

    #[test]
    fn wire_encoding_matches_column_encoding() {
        let json = serde_json::to_value(JobStatus::EnRoute).unwrap();
        assert_eq!(json, serde_json::json!("EN_ROUTE"));
    }

    #[test]
    fn unknown_status_is_rejected() {
        assert!("PAUSED".parse::<JobStatus>().is_err());
    }
}
