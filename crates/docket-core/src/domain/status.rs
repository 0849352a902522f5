//! Stage and job status vocabularies.

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Status of one stage of a document workflow.
///
/// Serialized as SCREAMING_SNAKE_CASE (`NOT_STARTED`, `RUNNING`, ...), which is the
/// shape both the stage array and the stageData mirror use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StageStatus {
    #[default]
    NotStarted,
    Running,
    Completed,
    Failed,
}

impl StageStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            StageStatus::NotStarted => "NOT_STARTED",
            StageStatus::Running => "RUNNING",
            StageStatus::Completed => "COMPLETED",
            StageStatus::Failed => "FAILED",
        }
    }

    /// Lenient parse used for the shadow status inside stage payloads.
    ///
    /// Payloads are written by forms and older builds, so anything unrecognized is `None`
    /// rather than an error.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().replace(['-', ' '], "_").as_str() {
            "NOT_STARTED" | "NOTSTARTED" | "PENDING" => Some(StageStatus::NotStarted),
            "RUNNING" | "IN_PROGRESS" => Some(StageStatus::Running),
            "COMPLETED" | "COMPLETE" | "DONE" => Some(StageStatus::Completed),
            "FAILED" | "ERROR" => Some(StageStatus::Failed),
            _ => None,
        }
    }
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status of an asynchronous job as recorded in the job session store.
///
/// Deserialization accepts the historical aliases (`SUCCESS`, `in_progress`, `canceled`,
/// ...) so records written by older clients keep their meaning. Serialization always
/// emits the canonical name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
    #[default]
    Unknown,
}

impl JobStatus {
    pub const ALL: [JobStatus; 6] = [
        JobStatus::Pending,
        JobStatus::Running,
        JobStatus::Completed,
        JobStatus::Failed,
        JobStatus::Cancelled,
        JobStatus::Unknown,
    ];

    /// Map any alias onto the canonical status. Never fails; unknown text is `Unknown`.
    pub fn from_alias(s: &str) -> Self {
        match s.trim().to_ascii_uppercase().replace(['-', ' '], "_").as_str() {
            "PENDING" | "QUEUED" | "SUBMITTED" | "WAITING" => JobStatus::Pending,
            "RUNNING" | "IN_PROGRESS" | "PROCESSING" | "STARTED" | "ACTIVE" => JobStatus::Running,
            "COMPLETED" | "COMPLETE" | "SUCCESS" | "SUCCEEDED" | "DONE" => JobStatus::Completed,
            "FAILED" | "FAILURE" | "ERROR" | "ERRORED" => JobStatus::Failed,
            "CANCELLED" | "CANCELED" | "ABORTED" => JobStatus::Cancelled,
            _ => JobStatus::Unknown,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Pending => "PENDING",
            JobStatus::Running => "RUNNING",
            JobStatus::Completed => "COMPLETED",
            JobStatus::Failed => "FAILED",
            JobStatus::Cancelled => "CANCELLED",
            JobStatus::Unknown => "UNKNOWN",
        }
    }

    /// Is this a terminal state (no further transitions expected)?
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }
}

impl<'de> Deserialize<'de> for JobStatus {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Ok(JobStatus::from_alias(&raw))
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Display-only status of a whole document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AggregateStatus {
    NotStarted,
    InProgress,
    Running,
    Completed,
    CompletedWithIssues,
    Failed,
}

impl AggregateStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            AggregateStatus::NotStarted => "NOT_STARTED",
            AggregateStatus::InProgress => "IN_PROGRESS",
            AggregateStatus::Running => "RUNNING",
            AggregateStatus::Completed => "COMPLETED",
            AggregateStatus::CompletedWithIssues => "COMPLETED_WITH_ISSUES",
            AggregateStatus::Failed => "FAILED",
        }
    }
}

impl fmt::Display for AggregateStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one processed item inside a job (e.g. one answered question).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ItemStatus {
    Succeeded,
    Failed,
    Skipped,
}
