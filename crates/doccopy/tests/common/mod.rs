//! Shared test utilities for doccopy integration tests.
//!
//! `TestHarness` wires a `JobController` to an isolated in-memory
//! connector with one source and one target database.

#![allow(dead_code)]

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use doccopy::{
    CopyConfig, CopyRequest, Document, JobController, JobState, JobStatus, MemoryConnector,
    MemoryDatabase,
};
use serde_json::json;

pub const SOURCE: &str = "mem://source";
pub const TARGET: &str = "mem://target";
pub const DATABASE: &str = "app";

/// Upper bound for any wait in these tests.
pub const TIMEOUT: Duration = Duration::from_secs(10);

/// Builds a document with a sequential `_id`.
pub fn doc(n: usize) -> Document {
    let mut map = Document::new();
    map.insert("_id".to_string(), json!(n));
    map.insert("name".to_string(), json!(format!("user-{}", n)));
    map
}

pub fn ids(documents: &[Document]) -> Vec<u64> {
    documents
        .iter()
        .map(|d| d["_id"].as_u64().expect("numeric _id"))
        .collect()
}

pub struct TestHarness {
    pub connector: Arc<MemoryConnector>,
    pub source: MemoryDatabase,
    pub target: MemoryDatabase,
    pub controller: JobController,
}

impl TestHarness {
    /// Harness with the default batch size and a short poll interval.
    pub fn new() -> Self {
        Self::with_batch_size(1000)
    }

    pub fn with_batch_size(batch_size: usize) -> Self {
        let connector = Arc::new(MemoryConnector::new());
        let source = connector.database(SOURCE, DATABASE);
        let target = connector.database(TARGET, DATABASE);

        let config = CopyConfig::default()
            .with_batch_size(batch_size)
            .with_poll_interval(Duration::from_millis(5));
        let controller = JobController::new(connector.clone(), config);

        Self {
            connector,
            source,
            target,
            controller,
        }
    }

    pub fn request(&self) -> CopyRequest {
        CopyRequest::new(SOURCE, DATABASE, TARGET, DATABASE)
    }

    pub fn start(&self, request: CopyRequest) -> String {
        self.controller
            .start_copy(request)
            .expect("failed to start copy job")
    }

    pub fn status(&self, job_id: &str) -> JobStatus {
        self.controller
            .get_status(job_id)
            .expect("job should be registered")
    }

    /// Polls the job until `predicate` holds, panicking after `TIMEOUT`.
    pub fn wait_until<F>(&self, job_id: &str, predicate: F) -> JobStatus
    where
        F: Fn(&JobStatus) -> bool,
    {
        let deadline = Instant::now() + TIMEOUT;
        loop {
            let status = self.status(job_id);
            if predicate(&status) {
                return status;
            }
            assert!(
                Instant::now() < deadline,
                "timed out waiting for job {}, last status: {:?}",
                job_id,
                status
            );
            thread::sleep(Duration::from_millis(1));
        }
    }

    pub fn wait_for_state(&self, job_id: &str, state: JobState) -> JobStatus {
        self.wait_until(job_id, |s| s.state == state)
    }

    /// Joins the job thread and returns the final status.
    pub fn finish(&self, job_id: &str) -> JobStatus {
        self.controller.wait(job_id).expect("job should exist");
        self.status(job_id)
    }
}
