//! Job registry: the process-wide map from job id to job record.
//!
//! A [`JobRecord`] is shared between the engine thread running the job
//! and any number of callers. The engine owns progress and state
//! transitions; callers only raise or clear the pause flag and raise the
//! cancel flag. Every field lives behind one per-record lock, so a
//! snapshot is never torn and writes are visible to other threads as
//! soon as the lock is released.

use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::Utc;

use crate::error::ControlError;
use crate::job::status::{JobState, JobStatus};

/// What the engine should do at a poll point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Proceed,
    Pause,
    Cancel,
}

/// Shared, mutable status of one job.
pub struct JobRecord {
    status: RwLock<JobStatus>,
}

impl JobRecord {
    /// Creates a `PENDING` record.
    pub fn new(job_id: &str) -> Self {
        Self {
            status: RwLock::new(JobStatus::pending(job_id)),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, JobStatus> {
        match self.status.read() {
            Ok(g) => g,
            Err(poisoned) => {
                log::warn!("Job record lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, JobStatus> {
        match self.status.write() {
            Ok(g) => g,
            Err(poisoned) => {
                log::warn!("Job record lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    /// Consistent copy of every field.
    pub fn snapshot(&self) -> JobStatus {
        self.read().clone()
    }

    pub fn state(&self) -> JobState {
        self.read().state
    }

    pub fn pause_requested(&self) -> bool {
        self.read().pause_requested
    }

    pub fn cancel_requested(&self) -> bool {
        self.read().cancel_requested
    }

    // ─── Caller side ────────────────────────────────────────────────────

    /// Asks a running job to pause.
    pub fn request_pause(&self) -> Result<(), ControlError> {
        let mut status = self.write();
        if status.state != JobState::InProgress {
            return Err(ControlError::NotRunning(status.job_id.clone()));
        }
        status.pause_requested = true;
        Ok(())
    }

    /// Lets a paused job continue.
    pub fn request_resume(&self) -> Result<(), ControlError> {
        let mut status = self.write();
        if status.state != JobState::Paused {
            return Err(ControlError::NotPaused(status.job_id.clone()));
        }
        status.pause_requested = false;
        status.state = JobState::InProgress;
        Ok(())
    }

    /// Asks a job that has not finished yet to stop at its next poll point.
    pub fn request_cancel(&self) -> Result<(), ControlError> {
        let mut status = self.write();
        if status.state.is_terminal() {
            return Err(ControlError::AlreadyFinished(status.job_id.clone()));
        }
        status.cancel_requested = true;
        Ok(())
    }

    // ─── Engine side ────────────────────────────────────────────────────

    /// Reads the flags the engine acts on at a poll point. Cancel wins
    /// over pause.
    pub fn signal(&self) -> Signal {
        let status = self.read();
        if status.cancel_requested {
            Signal::Cancel
        } else if status.pause_requested {
            Signal::Pause
        } else {
            Signal::Proceed
        }
    }

    /// Starts progress accounting for a new collection.
    pub fn begin_collection(&self, collection: &str, total_docs: u64) {
        let mut status = self.write();
        if status.state.is_terminal() {
            return;
        }
        status.collection = Some(collection.to_string());
        status.total_docs = total_docs;
        status.copied_docs = 0;
        status.state = JobState::InProgress;
    }

    /// Counts documents that were just written to the target.
    pub fn add_copied(&self, count: u64) {
        let mut status = self.write();
        status.copied_docs += count;
        status.total_copied_docs += count;
    }

    pub fn complete_collection(&self) {
        self.write().collections_completed += 1;
    }

    /// Moves a running job to `PAUSED` if a pause is still requested.
    /// Returns whether the transition happened.
    pub fn enter_pause(&self) -> bool {
        let mut status = self.write();
        if status.pause_requested && status.state == JobState::InProgress {
            status.state = JobState::Paused;
            return true;
        }
        false
    }

    /// Moves a paused job back to `IN_PROGRESS`. A resume request has
    /// usually done this already.
    pub fn leave_pause(&self) {
        let mut status = self.write();
        if status.state == JobState::Paused {
            status.state = JobState::InProgress;
        }
    }

    pub fn succeed(&self) {
        self.finish(JobState::Success, None);
    }

    pub fn fail(&self, message: &str) {
        self.finish(JobState::Failed, Some(message.to_string()));
    }

    pub fn cancelled(&self) {
        self.finish(JobState::Cancelled, None);
    }

    fn finish(&self, state: JobState, error_message: Option<String>) {
        let mut status = self.write();
        if status.state.is_terminal() {
            log::warn!(
                "Job {} already finished as {}, ignoring transition to {}",
                status.job_id,
                status.state,
                state
            );
            return;
        }
        status.state = state;
        status.error_message = error_message;
        status.completed_at = Some(Utc::now());
    }
}

/// Concurrent map of job records.
///
/// Entries are never removed; the registry lives as long as the
/// controller that owns it.
pub struct JobRegistry {
    jobs: RwLock<HashMap<String, Arc<JobRecord>>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self {
            jobs: RwLock::new(HashMap::new()),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, Arc<JobRecord>>> {
        match self.jobs.read() {
            Ok(g) => g,
            Err(poisoned) => {
                log::warn!("Job registry lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    /// Inserts or replaces the record for `job_id`.
    pub fn put(&self, job_id: &str, record: Arc<JobRecord>) {
        let mut jobs = match self.jobs.write() {
            Ok(g) => g,
            Err(poisoned) => {
                log::warn!("Job registry lock was poisoned, recovering");
                poisoned.into_inner()
            }
        };
        jobs.insert(job_id.to_string(), record);
    }

    pub fn get(&self, job_id: &str) -> Option<Arc<JobRecord>> {
        self.read().get(job_id).cloned()
    }

    /// Snapshot of a job's status, or `None` for an unknown id.
    pub fn status(&self, job_id: &str) -> Option<JobStatus> {
        self.get(job_id).map(|record| record.snapshot())
    }

    /// Snapshots of every job, oldest first.
    pub fn list(&self) -> Vec<JobStatus> {
        let mut jobs: Vec<JobStatus> = self.read().values().map(|r| r.snapshot()).collect();
        jobs.sort_by(|a, b| a.started_at.cmp(&b.started_at));
        jobs
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }
}

impl Default for JobRegistry {
    fn default() -> Self {
        Self::new()
    }
}
