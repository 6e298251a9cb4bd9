//! Job state and the status record returned to callers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle state of a copy job.
///
/// `Pending → InProgress ⇄ Paused → Success | Failed | Cancelled`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobState {
    Pending,
    InProgress,
    Paused,
    Success,
    Failed,
    Cancelled,
}

impl JobState {
    /// Returns true if the job can no longer change state.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobState::Success | JobState::Failed | JobState::Cancelled
        )
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobState::Pending => write!(f, "PENDING"),
            JobState::InProgress => write!(f, "IN_PROGRESS"),
            JobState::Paused => write!(f, "PAUSED"),
            JobState::Success => write!(f, "SUCCESS"),
            JobState::Failed => write!(f, "FAILED"),
            JobState::Cancelled => write!(f, "CANCELLED"),
        }
    }
}

/// Status of a copy job.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct JobStatus {
    /// Unique job identifier.
    pub job_id: String,
    /// Collection currently being copied.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub collection: Option<String>,
    /// Source document count taken when the current collection started.
    pub total_docs: u64,
    /// Documents of the current collection written to the target.
    pub copied_docs: u64,
    /// Documents written to the target over the whole job.
    pub total_copied_docs: u64,
    /// Collections fully copied so far.
    pub collections_completed: u32,
    pub state: JobState,
    pub pause_requested: bool,
    #[serde(default)]
    pub cancel_requested: bool,
    /// Failure cause, set only when `state` is `FAILED`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl JobStatus {
    /// Creates the record of a job that has not started copying yet.
    pub fn pending(job_id: &str) -> Self {
        Self {
            job_id: job_id.to_string(),
            collection: None,
            total_docs: 0,
            copied_docs: 0,
            total_copied_docs: 0,
            collections_completed: 0,
            state: JobState::Pending,
            pause_requested: false,
            cancel_requested: false,
            error_message: None,
            started_at: Utc::now(),
            completed_at: None,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.state.is_terminal()
    }
}
