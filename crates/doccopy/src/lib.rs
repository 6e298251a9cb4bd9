pub mod config;
pub mod controller;
pub mod engine;
pub mod error;
pub mod job;
pub mod logging;
pub mod store;

pub use config::{load_config, load_config_from_str, CopyConfig};
pub use controller::JobController;
pub use engine::{CopyEngine, CopyOutcome};
pub use error::{ConfigError, ControlError, DoccopyError, Result, StoreError};
pub use job::{
    CopyEventKind, CopyProgressBroadcaster, CopyProgressEvent, CopyRequest, JobRecord,
    JobRegistry, JobState, JobStatus, StartResponse,
};
pub use store::{
    Connector, Cursor, Document, DocumentSource, DocumentTarget, JsonlConnector, MemoryConnector,
    MemoryDatabase,
};
