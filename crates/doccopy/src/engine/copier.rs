use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, info_span};

use crate::config::CopyConfig;
use crate::error::StoreError;
use crate::job::progress::{CopyEventKind, CopyProgressTracker};
use crate::job::registry::{JobRecord, Signal};
use crate::job::request::CopyRequest;
use crate::store::{Connector, Document, DocumentSource, DocumentTarget};

/// Shortest sleep between checks of a paused job's flags.
const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// How a job ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CopyOutcome {
    Completed,
    Failed(String),
    Cancelled,
}

/// Whether the copy should keep going after a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Stop,
}

/// Copies collections from a source to a target for one job.
///
/// The engine is the only writer of the job's progress and state. It
/// checks the record's flags before consuming each document, so a pause
/// takes effect after at most one document plus one poll interval.
pub struct CopyEngine {
    source: Box<dyn DocumentSource>,
    target: Box<dyn DocumentTarget>,
    record: Arc<JobRecord>,
    tracker: CopyProgressTracker,
    batch_size: usize,
    poll_interval: Duration,
}

impl CopyEngine {
    pub fn new(
        source: Box<dyn DocumentSource>,
        target: Box<dyn DocumentTarget>,
        record: Arc<JobRecord>,
        tracker: CopyProgressTracker,
        config: &CopyConfig,
    ) -> Self {
        Self {
            source,
            target,
            record,
            tracker,
            batch_size: config.batch_size.max(1),
            poll_interval: config.poll_interval().max(MIN_POLL_INTERVAL),
        }
    }

    /// Resolves the request's source and target through `connector`.
    pub fn connect(
        connector: &dyn Connector,
        request: &CopyRequest,
        record: Arc<JobRecord>,
        tracker: CopyProgressTracker,
        config: &CopyConfig,
    ) -> Result<Self, StoreError> {
        let source = connector.source(&request.source_location, &request.source_database)?;
        let target = connector.target(&request.target_location, &request.target_database)?;
        Ok(Self::new(source, target, record, tracker, config))
    }

    /// Copies `collection`, or every source collection when `None`, and
    /// records the terminal state.
    pub fn run(&self, collection: Option<&str>) -> CopyOutcome {
        match self.copy(collection) {
            Ok(Flow::Continue) => {
                self.record.succeed();
                let status = self.record.snapshot();
                info!(
                    "Job {} completed: {} documents in {} collection(s)",
                    status.job_id, status.total_copied_docs, status.collections_completed
                );
                self.tracker
                    .emit(CopyEventKind::Completed, &status, "Copy completed successfully");
                CopyOutcome::Completed
            }
            Ok(Flow::Stop) => {
                self.record.cancelled();
                let status = self.record.snapshot();
                info!("Job {} cancelled", status.job_id);
                self.tracker
                    .emit(CopyEventKind::Cancelled, &status, "Copy cancelled");
                CopyOutcome::Cancelled
            }
            Err(e) => {
                let message = e.to_string();
                self.record.fail(&message);
                let status = self.record.snapshot();
                error!("Job {} failed: {}", status.job_id, message);
                self.tracker.emit(CopyEventKind::Failed, &status, &message);
                CopyOutcome::Failed(message)
            }
        }
    }

    fn copy(&self, collection: Option<&str>) -> Result<Flow, StoreError> {
        let collections = match collection {
            Some(name) => vec![name.to_string()],
            None => self.source.list_collections()?,
        };

        debug!(
            "Job {}: {} collection(s) to copy",
            self.tracker.job_id(),
            collections.len()
        );

        for name in &collections {
            // Nothing has been dropped yet for this collection, so stop here
            // rather than leave it empty on the target.
            if self.record.cancel_requested() {
                return Ok(Flow::Stop);
            }
            if self.copy_collection(name)? == Flow::Stop {
                return Ok(Flow::Stop);
            }
        }
        Ok(Flow::Continue)
    }

    fn copy_collection(&self, name: &str) -> Result<Flow, StoreError> {
        let _span = info_span!("copy_collection", collection = %name).entered();

        self.target.drop_collection(name)?;
        let total = self.source.count(name)?;
        self.record.begin_collection(name, total);
        self.emit(
            CopyEventKind::CollectionStarted,
            &format!("Copying collection '{}' ({} documents)", name, total),
        );

        let mut cursor = self.source.open_cursor(name)?;
        let mut batch: Vec<Document> = Vec::with_capacity(self.batch_size.min(4096));

        loop {
            if self.checkpoint() == Flow::Stop {
                return Ok(Flow::Stop);
            }

            let document = match cursor.next() {
                Some(document) => document?,
                None => break,
            };
            batch.push(document);

            if batch.len() >= self.batch_size {
                self.flush(name, &mut batch)?;
            }
        }

        if !batch.is_empty() {
            self.flush(name, &mut batch)?;
        }

        self.record.complete_collection();
        self.emit(
            CopyEventKind::CollectionCompleted,
            &format!("Collection '{}' copied", name),
        );
        Ok(Flow::Continue)
    }

    /// Writes the batch, then counts it. A failed write leaves the
    /// counters untouched.
    fn flush(&self, name: &str, batch: &mut Vec<Document>) -> Result<(), StoreError> {
        self.target.insert_batch(name, batch)?;
        let written = batch.len() as u64;
        batch.clear();

        self.record.add_copied(written);
        debug!("Wrote {} documents to '{}'", written, name);
        self.emit(
            CopyEventKind::BatchWritten,
            &format!("Wrote {} documents to '{}'", written, name),
        );
        Ok(())
    }

    /// Poll point, reached before each document is consumed.
    ///
    /// Blocks while a pause is requested; the cursor stays open, so the
    /// copy resumes exactly where it stopped.
    fn checkpoint(&self) -> Flow {
        let mut paused = false;

        loop {
            match self.record.signal() {
                Signal::Proceed => {
                    if paused {
                        self.record.leave_pause();
                        info!("Job {} resumed", self.tracker.job_id());
                        self.emit(CopyEventKind::Resumed, "Copy resumed");
                    }
                    return Flow::Continue;
                }
                Signal::Cancel => return Flow::Stop,
                Signal::Pause => {
                    // Re-entered on every poll: a resume immediately followed
                    // by another pause must still be reported as PAUSED.
                    if self.record.enter_pause() {
                        info!("Job {} paused", self.tracker.job_id());
                        self.emit(CopyEventKind::Paused, "Copy paused");
                    }
                    paused = true;
                    std::thread::sleep(self.poll_interval);
                }
            }
        }
    }

    fn emit(&self, kind: CopyEventKind, message: &str) {
        self.tracker.emit(kind, &self.record.snapshot(), message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::progress::CopyProgressBroadcaster;
    use crate::job::status::JobState;
    use crate::store::MemoryDatabase;
    use serde_json::json;

    fn doc(n: usize) -> Document {
        let mut map = Document::new();
        map.insert("_id".to_string(), json!(n));
        map
    }

    fn engine(
        source: &MemoryDatabase,
        target: &MemoryDatabase,
        batch_size: usize,
    ) -> (CopyEngine, Arc<JobRecord>) {
        let record = Arc::new(JobRecord::new("job-test"));
        let broadcaster = CopyProgressBroadcaster::new(64);
        let config = CopyConfig::default()
            .with_batch_size(batch_size)
            .with_poll_interval(Duration::from_millis(5));
        let engine = CopyEngine::new(
            Box::new(source.clone()),
            Box::new(target.clone()),
            Arc::clone(&record),
            broadcaster.tracker("job-test"),
            &config,
        );
        (engine, record)
    }

    #[test]
    fn test_zero_poll_interval_is_clamped() {
        let mut config = CopyConfig::default();
        config.poll_interval_ms = 0;
        let broadcaster = CopyProgressBroadcaster::new(4);
        let engine = CopyEngine::new(
            Box::new(MemoryDatabase::new()),
            Box::new(MemoryDatabase::new()),
            Arc::new(JobRecord::new("job-poll")),
            broadcaster.tracker("job-poll"),
            &config,
        );

        assert_eq!(engine.poll_interval, MIN_POLL_INTERVAL);
    }

    #[test]
    fn test_batches_of_fixed_size_with_remainder() {
        let source = MemoryDatabase::new();
        source.seed("users", (0..2500).map(doc));
        let target = MemoryDatabase::new();

        let (engine, record) = engine(&source, &target, 1000);
        assert_eq!(engine.run(Some("users")), CopyOutcome::Completed);

        let sizes: Vec<usize> = target.insert_log().iter().map(|(_, n)| *n).collect();
        assert_eq!(sizes, vec![1000, 1000, 500]);

        let status = record.snapshot();
        assert_eq!(status.state, JobState::Success);
        assert_eq!(status.copied_docs, 2500);
        assert_eq!(status.total_docs, 2500);
        assert_eq!(target.documents("users"), source.documents("users"));
    }

    #[test]
    fn test_exact_multiple_has_no_partial_batch() {
        let source = MemoryDatabase::new();
        source.seed("c", (0..20).map(doc));
        let target = MemoryDatabase::new();

        let (engine, record) = engine(&source, &target, 10);
        engine.run(None);

        assert_eq!(target.insert_log().len(), 2);
        assert_eq!(record.snapshot().copied_docs, 20);
    }

    #[test]
    fn test_target_is_replaced_not_merged() {
        let source = MemoryDatabase::new();
        source.seed("c", (0..3).map(doc));
        let target = MemoryDatabase::new();
        target.seed("c", (100..110).map(doc));

        let (engine, _record) = engine(&source, &target, 10);
        engine.run(Some("c"));

        assert_eq!(target.documents("c"), source.documents("c"));
        assert_eq!(target.drop_log(), vec!["c".to_string()]);
    }

    #[test]
    fn test_empty_collection_succeeds_without_inserts() {
        let source = MemoryDatabase::new();
        source.create_collection("empty");
        let target = MemoryDatabase::new();

        let (engine, record) = engine(&source, &target, 10);
        assert_eq!(engine.run(None), CopyOutcome::Completed);

        assert!(target.insert_log().is_empty());
        let status = record.snapshot();
        assert_eq!(status.collection.as_deref(), Some("empty"));
        assert_eq!(status.copied_docs, 0);
        assert_eq!(status.collections_completed, 1);
    }

    #[test]
    fn test_insert_failure_counts_only_written_batches() {
        let source = MemoryDatabase::new();
        source.seed("users", (0..2500).map(doc));
        let target = MemoryDatabase::new();
        target.fail_insert_call(2);

        let (engine, record) = engine(&source, &target, 1000);
        let outcome = engine.run(Some("users"));
        assert!(matches!(outcome, CopyOutcome::Failed(_)));

        let status = record.snapshot();
        assert_eq!(status.state, JobState::Failed);
        assert_eq!(status.copied_docs, 1000);
        assert!(status.error_message.unwrap().contains("insert #2"));
    }

    #[test]
    fn test_cursor_failure_aborts_remaining_collections() {
        let source = MemoryDatabase::new();
        source.seed("a", (0..5).map(doc));
        source.seed("b", (0..5).map(doc));
        source.fail_reads_after(3);
        let target = MemoryDatabase::new();

        let (engine, record) = engine(&source, &target, 2);
        assert!(matches!(engine.run(None), CopyOutcome::Failed(_)));

        let status = record.snapshot();
        assert_eq!(status.collection.as_deref(), Some("a"));
        assert_eq!(status.copied_docs, 2);
        // "b" was never started
        assert_eq!(target.drop_log(), vec!["a".to_string()]);
    }

    #[test]
    fn test_cancel_before_start_leaves_target_alone() {
        let source = MemoryDatabase::new();
        source.seed("a", (0..5).map(doc));
        let target = MemoryDatabase::new();
        target.seed("a", (0..2).map(doc));

        let (engine, record) = engine(&source, &target, 2);
        record.request_cancel().unwrap();

        assert_eq!(engine.run(None), CopyOutcome::Cancelled);
        assert_eq!(record.state(), JobState::Cancelled);
        assert!(target.drop_log().is_empty());
        assert_eq!(target.documents("a").len(), 2);
    }

    #[test]
    fn test_checkpoint_blocks_until_resumed() {
        let source = MemoryDatabase::new();
        source.seed("a", (0..10).map(doc));
        let target = MemoryDatabase::new();

        let (engine, record) = engine(&source, &target, 3);
        record.begin_collection("a", 10);
        record.request_pause().unwrap();

        let handle = {
            let record = Arc::clone(&record);
            std::thread::spawn(move || {
                while record.state() != JobState::Paused {
                    std::thread::sleep(Duration::from_millis(1));
                }
                record.request_resume().unwrap();
            })
        };

        assert_eq!(engine.checkpoint(), Flow::Continue);
        handle.join().unwrap();
        assert_eq!(record.state(), JobState::InProgress);
    }
}
