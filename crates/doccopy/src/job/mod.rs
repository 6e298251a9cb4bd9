//! Copy jobs: status model, shared registry and progress events.

pub mod progress;
pub mod registry;
pub mod request;
pub mod status;

pub use progress::{CopyEventKind, CopyProgressBroadcaster, CopyProgressEvent, CopyProgressTracker};
pub use registry::{JobRecord, JobRegistry, Signal};
pub use request::{CopyRequest, StartResponse};
pub use status::{JobState, JobStatus};
