//! Copy progress broadcaster for real-time job status streaming.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::job::status::{JobState, JobStatus};

/// What happened to a job.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CopyEventKind {
    Queued,
    CollectionStarted,
    BatchWritten,
    Paused,
    Resumed,
    CollectionCompleted,
    Completed,
    Failed,
    Cancelled,
}

impl CopyEventKind {
    /// Returns true for the last event a job emits.
    pub fn is_final(&self) -> bool {
        matches!(
            self,
            CopyEventKind::Completed | CopyEventKind::Failed | CopyEventKind::Cancelled
        )
    }
}

/// Progress event for a job.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CopyProgressEvent {
    pub job_id: String,
    pub kind: CopyEventKind,
    pub state: JobState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub collection: Option<String>,
    pub copied_docs: u64,
    pub total_docs: u64,
    pub total_copied_docs: u64,
    /// Human-readable description of the event.
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl CopyProgressEvent {
    /// Builds an event from the current status of the job.
    pub fn from_status(kind: CopyEventKind, status: &JobStatus, message: &str) -> Self {
        Self {
            job_id: status.job_id.clone(),
            kind,
            state: status.state,
            collection: status.collection.clone(),
            copied_docs: status.copied_docs,
            total_docs: status.total_docs,
            total_copied_docs: status.total_copied_docs,
            message: message.to_string(),
            timestamp: Utc::now(),
        }
    }
}

/// Broadcasts copy progress events to any number of subscribers.
#[derive(Clone)]
pub struct CopyProgressBroadcaster {
    sender: Arc<broadcast::Sender<CopyProgressEvent>>,
}

impl CopyProgressBroadcaster {
    /// Creates a new broadcaster with the specified channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Sends an event to all subscribers.
    pub fn send(&self, event: CopyProgressEvent) {
        // No active receivers is fine
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CopyProgressEvent> {
        self.sender.subscribe()
    }

    /// Creates a tracker bound to one job.
    pub fn tracker(&self, job_id: &str) -> CopyProgressTracker {
        CopyProgressTracker::new(job_id, Arc::clone(&self.sender))
    }
}

impl Default for CopyProgressBroadcaster {
    fn default() -> Self {
        Self::new(100)
    }
}

/// Publishes events for a single job.
#[derive(Clone)]
pub struct CopyProgressTracker {
    job_id: String,
    sender: Arc<broadcast::Sender<CopyProgressEvent>>,
}

impl CopyProgressTracker {
    pub fn new(job_id: &str, sender: Arc<broadcast::Sender<CopyProgressEvent>>) -> Self {
        Self {
            job_id: job_id.to_string(),
            sender,
        }
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    /// Publishes `kind` with the job's current status.
    pub fn emit(&self, kind: CopyEventKind, status: &JobStatus, message: &str) {
        let _ = self
            .sender
            .send(CopyProgressEvent::from_status(kind, status, message));
    }
}
