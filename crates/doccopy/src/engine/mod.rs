//! The copy engine and the job boundary around it.

pub mod copier;

pub use copier::{CopyEngine, CopyOutcome};

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use tracing::{error, info, info_span};

use crate::config::CopyConfig;
use crate::job::progress::{CopyEventKind, CopyProgressTracker};
use crate::job::registry::JobRecord;
use crate::job::request::CopyRequest;
use crate::store::Connector;

/// Runs one job to completion on the calling thread.
///
/// Connection failures and panics are recorded as `FAILED` on the job
/// record; nothing escapes this function.
pub fn run_job(
    connector: &dyn Connector,
    request: &CopyRequest,
    record: Arc<JobRecord>,
    tracker: CopyProgressTracker,
    config: &CopyConfig,
) -> CopyOutcome {
    let _job_span = info_span!("copy_job", job_id = %tracker.job_id()).entered();

    info!(
        "Starting copy job {}: {}/{} -> {}/{}{}",
        tracker.job_id(),
        request.source_location,
        request.source_database,
        request.target_location,
        request.target_database,
        request
            .single_collection()
            .map(|c| format!(" (collection '{}')", c))
            .unwrap_or_default()
    );

    let result = panic::catch_unwind(AssertUnwindSafe(|| {
        match CopyEngine::connect(
            connector,
            request,
            Arc::clone(&record),
            tracker.clone(),
            config,
        ) {
            Ok(engine) => engine.run(request.single_collection()),
            Err(e) => fail_job(&record, &tracker, &e.to_string()),
        }
    }));

    match result {
        Ok(outcome) => outcome,
        Err(payload) => {
            let message = match payload.downcast_ref::<&str>() {
                Some(s) => format!("copy job panicked: {}", s),
                None => match payload.downcast_ref::<String>() {
                    Some(s) => format!("copy job panicked: {}", s),
                    None => "copy job panicked".to_string(),
                },
            };
            fail_job(&record, &tracker, &message)
        }
    }
}

fn fail_job(record: &JobRecord, tracker: &CopyProgressTracker, message: &str) -> CopyOutcome {
    error!("Job {} failed: {}", tracker.job_id(), message);
    record.fail(message);
    tracker.emit(CopyEventKind::Failed, &record.snapshot(), message);
    CopyOutcome::Failed(message.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use crate::job::progress::CopyProgressBroadcaster;
    use crate::job::status::JobState;
    use crate::store::{Cursor, DocumentSource, DocumentTarget, MemoryConnector};

    #[test]
    fn test_connection_failure_is_recorded() {
        let connector = MemoryConnector::new();
        connector.database("mem://target", "db");

        let record = Arc::new(JobRecord::new("job-1"));
        let broadcaster = CopyProgressBroadcaster::new(16);
        let mut rx = broadcaster.subscribe();
        let request = CopyRequest::new("mem://missing", "db", "mem://target", "db");

        let outcome = run_job(
            &connector,
            &request,
            Arc::clone(&record),
            broadcaster.tracker("job-1"),
            &CopyConfig::default(),
        );

        assert!(matches!(outcome, CopyOutcome::Failed(_)));
        let status = record.snapshot();
        assert_eq!(status.state, JobState::Failed);
        assert!(status.collection.is_none());
        assert!(status.error_message.unwrap().contains("mem://missing"));

        let event = rx.try_recv().unwrap();
        assert_eq!(event.kind, CopyEventKind::Failed);
    }

    struct PanickingConnector;

    struct PanickingSource;

    impl DocumentSource for PanickingSource {
        fn list_collections(&self) -> Result<Vec<String>, StoreError> {
            panic!("backend bug")
        }

        fn count(&self, _collection: &str) -> Result<u64, StoreError> {
            Ok(0)
        }

        fn open_cursor(&self, _collection: &str) -> Result<Cursor, StoreError> {
            Ok(Box::new(std::iter::empty::<Result<crate::store::Document, StoreError>>()))
        }
    }

    impl Connector for PanickingConnector {
        fn source(&self, _: &str, _: &str) -> Result<Box<dyn DocumentSource>, StoreError> {
            Ok(Box::new(PanickingSource))
        }

        fn target(&self, _: &str, _: &str) -> Result<Box<dyn DocumentTarget>, StoreError> {
            Ok(Box::new(crate::store::MemoryDatabase::new()))
        }
    }

    #[test]
    fn test_panic_is_recorded_as_failure() {
        let record = Arc::new(JobRecord::new("job-2"));
        let request = CopyRequest::new("a", "db", "b", "db");

        let outcome = run_job(
            &PanickingConnector,
            &request,
            Arc::clone(&record),
            CopyProgressBroadcaster::default().tracker("job-2"),
            &CopyConfig::default(),
        );

        assert!(matches!(outcome, CopyOutcome::Failed(_)));
        let status = record.snapshot();
        assert_eq!(status.state, JobState::Failed);
        assert!(status.error_message.unwrap().contains("backend bug"));
    }
}
