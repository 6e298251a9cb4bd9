//! Process-wide logging setup.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{fmt, EnvFilter, Registry};

use crate::error::DoccopyError;

/// Output format of the log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

/// Builds the filter: `RUST_LOG` wins over `default_level`.
pub fn env_filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}

/// Installs the global subscriber and routes `log` records into it.
///
/// Can only succeed once per process.
pub fn init_logging(default_level: &str, format: LogFormat) -> Result<(), DoccopyError> {
    let filter = env_filter(default_level);

    let result = match format {
        LogFormat::Text => tracing::subscriber::set_global_default(
            Registry::default()
                .with(filter)
                .with(fmt::layer().with_target(true).with_thread_names(true)),
        ),
        LogFormat::Json => tracing::subscriber::set_global_default(
            Registry::default()
                .with(filter)
                .with(fmt::layer().json().with_thread_names(true)),
        ),
    };
    result.map_err(|e| DoccopyError::Logging(e.to_string()))?;

    tracing_log::LogTracer::init().map_err(|e| DoccopyError::Logging(e.to_string()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_init_logging_only_once() {
        // The first call may lose to another test binary's subscriber, the
        // second one never succeeds.
        let _ = init_logging("debug", LogFormat::Text);
        assert!(matches!(
            init_logging("debug", LogFormat::Json),
            Err(DoccopyError::Logging(_))
        ));
        log::info!("log records are bridged into tracing");
    }

    #[test]
    #[serial]
    fn test_env_filter_fallback() {
        let filter = env_filter("warn");
        assert!(!filter.to_string().is_empty());
    }
}
