//! Runs one copy job between two directory-backed databases.
//!
//! Usage: `doccopy <request.json> [config.json]`
//!
//! The request file holds a `CopyRequest`; locations are base directories.
//! Ctrl-C cancels the job.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use log::{error, info, warn};
use tokio::sync::broadcast::error::RecvError;

use doccopy::logging::{init_logging, LogFormat};
use doccopy::{
    load_config, CopyConfig, CopyEventKind, CopyRequest, DoccopyError, JobController, JobState,
    JsonlConnector, StartResponse,
};

fn read_request(path: &Path) -> Result<CopyRequest, DoccopyError> {
    let invalid = |reason: String| DoccopyError::Request {
        path: path.to_path_buf(),
        reason,
    };
    let content = std::fs::read_to_string(path).map_err(|e| invalid(e.to_string()))?;
    serde_json::from_str(&content).map_err(|e| invalid(e.to_string()))
}

fn run(request_path: PathBuf, config_path: Option<PathBuf>) -> Result<JobState, DoccopyError> {
    let config = match config_path {
        Some(path) => load_config(path)?,
        None => CopyConfig::default(),
    };

    init_logging(&config.log_level, LogFormat::Text)?;
    info!("Starting doccopy v{}", env!("CARGO_PKG_VERSION"));

    let request = read_request(&request_path)?;

    let controller = Arc::new(JobController::new(Arc::new(JsonlConnector::new()), config));
    let mut events = controller.subscribe();
    let job_id = controller.start_copy(request)?;

    match serde_json::to_string(&StartResponse {
        job_id: job_id.clone(),
    }) {
        Ok(json) => println!("{}", json),
        Err(e) => warn!("Failed to serialize start response: {}", e),
    }

    {
        let controller = Arc::clone(&controller);
        let job_id = job_id.clone();
        if let Err(e) = ctrlc::set_handler(move || {
            info!("Interrupt received, cancelling job {}", job_id);
            if let Err(e) = controller.cancel(&job_id) {
                warn!("Cancel failed: {}", e);
            }
        }) {
            warn!("Failed to install Ctrl-C handler: {}", e);
        }
    }

    loop {
        match events.blocking_recv() {
            Ok(event) if event.job_id == job_id => {
                match event.kind {
                    CopyEventKind::BatchWritten => info!(
                        "[{}] {}/{} documents",
                        event.collection.as_deref().unwrap_or("-"),
                        event.copied_docs,
                        event.total_docs
                    ),
                    _ => info!("{}", event.message),
                }
                if event.kind.is_final() {
                    break;
                }
            }
            Ok(_) => {}
            Err(RecvError::Lagged(skipped)) => {
                warn!("Progress stream lagged, skipped {} events", skipped);
                if controller
                    .get_status(&job_id)
                    .map_or(true, |status| status.is_finished())
                {
                    break;
                }
            }
            Err(RecvError::Closed) => break,
        }
    }

    controller.wait(&job_id)?;

    let status = controller
        .get_status(&job_id)
        .ok_or_else(|| doccopy::ControlError::NotFound(job_id.clone()))?;
    match serde_json::to_string_pretty(&status) {
        Ok(json) => println!("{}", json),
        Err(e) => warn!("Failed to serialize job status: {}", e),
    }
    Ok(status.state)
}

fn main() -> ExitCode {
    let mut args = std::env::args_os().skip(1);
    let Some(request_path) = args.next().map(PathBuf::from) else {
        eprintln!("Usage: doccopy <request.json> [config.json]");
        return ExitCode::from(2);
    };
    let config_path = args.next().map(PathBuf::from);

    match run(request_path, config_path) {
        Ok(JobState::Success) => ExitCode::SUCCESS,
        Ok(state) => {
            error!("Copy finished as {}", state);
            ExitCode::FAILURE
        }
        Err(e) => {
            eprintln!("doccopy: {}", e);
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_read_request() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"sourceLocation":"/a","sourceDatabase":"shop","targetLocation":"/b","targetDatabase":"shop"}}"#
        )
        .unwrap();

        let request = read_request(file.path()).unwrap();
        assert_eq!(request.source_database, "shop");
        assert_eq!(request.target_location, "/b");
    }

    #[test]
    fn test_bad_request_file_is_request_error() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();

        let err = read_request(file.path()).unwrap_err();
        assert!(matches!(err, DoccopyError::Request { .. }));
        assert!(err.to_string().starts_with("Invalid copy request"));

        let missing = read_request(Path::new("/nonexistent/request.json")).unwrap_err();
        assert!(matches!(missing, DoccopyError::Request { .. }));
    }
}
