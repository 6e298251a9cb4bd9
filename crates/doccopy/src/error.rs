use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DoccopyError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Job control error: {0}")]
    Control(#[from] ControlError),

    #[error("Invalid copy request '{path}': {reason}")]
    Request { path: PathBuf, reason: String },

    #[error("Failed to spawn copy job: {0}")]
    SpawnFailed(String),

    #[error("Logging setup failed: {0}")]
    Logging(String),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config JSON: {0}")]
    ParseJson(#[from] serde_json::Error),

    #[error("Config validation failed: {message}")]
    Validation { message: String },
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Cannot connect to '{location}': {reason}")]
    Connection { location: String, reason: String },

    #[error("Failed to read from collection '{collection}': {reason}")]
    Read { collection: String, reason: String },

    #[error("Failed to write to collection '{collection}': {reason}")]
    Write { collection: String, reason: String },

    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid document in '{path}' at line {line}: {source}")]
    Parse {
        path: PathBuf,
        line: usize,
        #[source]
        source: serde_json::Error,
    },
}

/// Rejections of caller-issued control requests.
///
/// These never touch the job record: a rejected request leaves the job
/// exactly as it was.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ControlError {
    #[error("Job not found: {0}")]
    NotFound(String),

    #[error("Cannot pause - job {0} not in progress")]
    NotRunning(String),

    #[error("Cannot resume - job {0} not paused")]
    NotPaused(String),

    #[error("Job {0} has already finished")]
    AlreadyFinished(String),
}

pub type Result<T> = std::result::Result<T, DoccopyError>;
