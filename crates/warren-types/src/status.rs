//! Job lifecycle status.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Lifecycle status of a download job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Metadata known, waiting to be started.
    Queued,
    /// Waiting for metadata to be resolved from peers.
    Analysing,
    /// Actively transferring.
    Running,
    /// Paused by the user or by a failed re-admission.
    Stopped,
    /// All data present and verified.
    Completed,
}

impl JobStatus {
    /// All statuses in declaration order.
    pub const ALL: [Self; 5] = [
        Self::Queued,
        Self::Analysing,
        Self::Running,
        Self::Stopped,
        Self::Completed,
    ];

    /// Returns the display name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "Queued",
            Self::Analysing => "Analysing",
            Self::Running => "Running",
            Self::Stopped => "Stopped",
            Self::Completed => "Completed",
        }
    }

    /// Returns true if records in this status are written to the log.
    #[must_use]
    pub const fn is_persistable(&self) -> bool {
        !matches!(self, Self::Analysing)
    }

    /// Returns true if no further transitions are possible.
    #[must_use]
    pub const fn is_finished(&self) -> bool {
        matches!(self, Self::Completed)
    }

    /// Returns true if progress is reported for jobs in this status.
    #[must_use]
    pub const fn reports_progress(&self) -> bool {
        matches!(self, Self::Running | Self::Completed)
    }

    /// Returns true if moving from `self` to `next` is a legal transition.
    #[must_use]
    pub const fn can_transition_to(&self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Analysing, Self::Queued)
                | (Self::Queued | Self::Stopped, Self::Running)
                | (Self::Running, Self::Stopped | Self::Completed)
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a status name is not recognised.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Unknown job status: {0}")]
pub struct StatusParseError(pub String);

impl FromStr for JobStatus {
    type Err = StatusParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| StatusParseError(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_names() {
        let names: Vec<_> = JobStatus::ALL.iter().map(JobStatus::to_string).collect();
        assert_eq!(
            names,
            ["Queued", "Analysing", "Running", "Stopped", "Completed"]
        );
    }

    #[test]
    fn test_parse_case_insensitive() {
        assert_eq!("running".parse::<JobStatus>().unwrap(), JobStatus::Running);
        assert_eq!("STOPPED".parse::<JobStatus>().unwrap(), JobStatus::Stopped);
        assert!("paused".parse::<JobStatus>().is_err());
    }

    #[test]
    fn test_transitions() {
        use JobStatus::*;

        assert!(Analysing.can_transition_to(Queued));
        assert!(Queued.can_transition_to(Running));
        assert!(Stopped.can_transition_to(Running));
        assert!(Running.can_transition_to(Stopped));
        assert!(Running.can_transition_to(Completed));

        assert!(!Completed.can_transition_to(Running));
        assert!(!Queued.can_transition_to(Completed));
        assert!(!Analysing.can_transition_to(Running));
        assert!(!Stopped.can_transition_to(Completed));
    }

    #[test]
    fn test_only_analysing_is_transient() {
        for status in JobStatus::ALL {
            assert_eq!(status.is_persistable(), status != JobStatus::Analysing);
        }
    }

    #[test]
    fn test_serde_lowercase() {
        let json = serde_json::to_string(&JobStatus::Completed).unwrap();
        assert_eq!(json, "\"completed\"");
    }
}
