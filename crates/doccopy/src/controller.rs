//! Job controller: the façade a transport calls to run and steer copy jobs.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};

use log::{debug, error, info, warn};
use tokio::sync::broadcast;

use crate::config::CopyConfig;
use crate::engine::{self, CopyOutcome};
use crate::error::{ControlError, DoccopyError, Result};
use crate::job::progress::{CopyEventKind, CopyProgressBroadcaster, CopyProgressEvent};
use crate::job::registry::{JobRecord, JobRegistry};
use crate::job::request::CopyRequest;
use crate::job::status::JobStatus;
use crate::store::Connector;

/// Starts copy jobs on dedicated threads and serves control requests.
///
/// Every started job gets its own thread; there is no pool and no limit
/// on concurrently running jobs. Two jobs writing the same target
/// collection race, and the result is undefined.
pub struct JobController {
    connector: Arc<dyn Connector>,
    registry: Arc<JobRegistry>,
    broadcaster: CopyProgressBroadcaster,
    config: CopyConfig,
    workers: Mutex<HashMap<String, JoinHandle<CopyOutcome>>>,
}

impl JobController {
    pub fn new(connector: Arc<dyn Connector>, config: CopyConfig) -> Self {
        Self::with_registry(connector, config, Arc::new(JobRegistry::new()))
    }

    /// Creates a controller that records its jobs in `registry`.
    pub fn with_registry(
        connector: Arc<dyn Connector>,
        config: CopyConfig,
        registry: Arc<JobRegistry>,
    ) -> Self {
        let broadcaster = CopyProgressBroadcaster::new(config.progress_capacity.max(1));
        Self {
            connector,
            registry,
            broadcaster,
            config,
            workers: Mutex::new(HashMap::new()),
        }
    }

    pub fn registry(&self) -> &Arc<JobRegistry> {
        &self.registry
    }

    /// Subscribes to progress events of every job.
    pub fn subscribe(&self) -> broadcast::Receiver<CopyProgressEvent> {
        self.broadcaster.subscribe()
    }

    fn workers(&self) -> MutexGuard<'_, HashMap<String, JoinHandle<CopyOutcome>>> {
        match self.workers.lock() {
            Ok(g) => g,
            Err(poisoned) => {
                warn!("Worker map lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    /// Joins the threads of jobs that have already finished.
    fn reap_finished(&self) {
        let finished: Vec<(String, JoinHandle<CopyOutcome>)> = {
            let mut workers = self.workers();
            let ids: Vec<String> = workers
                .iter()
                .filter(|(_, handle)| handle.is_finished())
                .map(|(job_id, _)| job_id.clone())
                .collect();
            ids.into_iter()
                .filter_map(|job_id| workers.remove(&job_id).map(|h| (job_id, h)))
                .collect()
        };

        for (job_id, handle) in finished {
            let outcome = self.join_worker(&job_id, handle);
            debug!("Reaped job {} thread: {:?}", job_id, outcome);
        }
    }

    fn join_worker(&self, job_id: &str, handle: JoinHandle<CopyOutcome>) -> CopyOutcome {
        match handle.join() {
            Ok(outcome) => outcome,
            Err(_) => {
                let message = "worker thread panicked";
                error!("Job {}: {}", job_id, message);
                if let Some(record) = self.registry.get(job_id) {
                    record.fail(message);
                }
                CopyOutcome::Failed(message.to_string())
            }
        }
    }

    /// Number of job threads not yet joined, after joining finished ones.
    pub fn active_workers(&self) -> usize {
        self.reap_finished();
        self.workers().len()
    }

    /// Registers a new job and starts copying in the background.
    ///
    /// Returns the job id immediately; progress is observed through
    /// [`get_status`](Self::get_status) or [`subscribe`](Self::subscribe).
    pub fn start_copy(&self, request: CopyRequest) -> Result<String> {
        self.reap_finished();

        let job_id = uuid::Uuid::new_v4().to_string();
        let record = Arc::new(JobRecord::new(&job_id));
        self.registry.put(&job_id, Arc::clone(&record));

        let tracker = self.broadcaster.tracker(&job_id);
        tracker.emit(CopyEventKind::Queued, &record.snapshot(), "Job queued");

        let connector = Arc::clone(&self.connector);
        let config = self.config.clone();
        let worker_record = Arc::clone(&record);

        let spawned = thread::Builder::new()
            .name(format!("copy-job-{}", &job_id[..8]))
            .spawn(move || engine::run_job(connector.as_ref(), &request, worker_record, tracker, &config));

        match spawned {
            Ok(handle) => {
                self.workers().insert(job_id.clone(), handle);
                info!("Started copy job {}", job_id);
                Ok(job_id)
            }
            Err(e) => {
                let message = format!("failed to spawn worker thread: {}", e);
                error!("Job {}: {}", job_id, message);
                record.fail(&message);
                Err(DoccopyError::SpawnFailed(e.to_string()))
            }
        }
    }

    fn record(&self, job_id: &str) -> std::result::Result<Arc<JobRecord>, ControlError> {
        self.registry
            .get(job_id)
            .ok_or_else(|| ControlError::NotFound(job_id.to_string()))
    }

    /// Requests a running job to pause.
    pub fn pause(&self, job_id: &str) -> std::result::Result<(), ControlError> {
        let result = self.record(job_id).and_then(|r| r.request_pause());
        match &result {
            Ok(()) => info!("Pause requested for job {}", job_id),
            Err(e) => warn!("Rejected pause: {}", e),
        }
        result
    }

    /// Resumes a paused job.
    pub fn resume(&self, job_id: &str) -> std::result::Result<(), ControlError> {
        let result = self.record(job_id).and_then(|r| r.request_resume());
        match &result {
            Ok(()) => info!("Resume requested for job {}", job_id),
            Err(e) => warn!("Rejected resume: {}", e),
        }
        result
    }

    /// Requests a job that has not finished to stop. The job ends as
    /// `CANCELLED`; documents of a partially filled batch are not written.
    pub fn cancel(&self, job_id: &str) -> std::result::Result<(), ControlError> {
        let result = self.record(job_id).and_then(|r| r.request_cancel());
        match &result {
            Ok(()) => info!("Cancel requested for job {}", job_id),
            Err(e) => warn!("Rejected cancel: {}", e),
        }
        result
    }

    /// Current status, or `None` if the id was never issued.
    pub fn get_status(&self, job_id: &str) -> Option<JobStatus> {
        self.registry.status(job_id)
    }

    pub fn list_jobs(&self) -> Vec<JobStatus> {
        self.registry.list()
    }

    /// Blocks until the job's thread finishes.
    ///
    /// Returns `None` if the thread was already joined, either by an
    /// earlier `wait` or because it finished before a later `start_copy`.
    pub fn wait(&self, job_id: &str) -> std::result::Result<Option<CopyOutcome>, ControlError> {
        self.record(job_id)?;
        // Take the handle out so the lock is not held while joining.
        let handle = self.workers().remove(job_id);

        Ok(handle.map(|handle| self.join_worker(job_id, handle)))
    }

    /// Cancels every unfinished job and waits for all job threads.
    pub fn shutdown(&self) {
        info!("Shutting down job controller...");

        for status in self.registry.list() {
            if status.is_finished() {
                continue;
            }
            if let Some(record) = self.registry.get(&status.job_id) {
                // A job may finish between the listing and the request.
                let _ = record.request_cancel();
            }
        }

        let handles: Vec<(String, JoinHandle<CopyOutcome>)> = self.workers().drain().collect();
        for (job_id, handle) in handles {
            let outcome = self.join_worker(&job_id, handle);
            debug!("Job {} stopped: {:?}", job_id, outcome);
        }

        info!("All copy jobs have stopped");
    }
}
