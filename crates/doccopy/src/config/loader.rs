use std::path::Path;

use crate::config::schema::CopyConfig;
use crate::error::ConfigError;

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<CopyConfig, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    load_config_from_str(&content)
}

pub fn load_config_from_str(content: &str) -> Result<CopyConfig, ConfigError> {
    let config: CopyConfig = serde_json::from_str(content)?;

    validate_config(&config)?;

    Ok(config)
}

fn validate_config(config: &CopyConfig) -> Result<(), ConfigError> {
    if config.batch_size == 0 {
        return Err(ConfigError::Validation {
            message: "batchSize must be greater than 0".to_string(),
        });
    }

    if config.poll_interval_ms == 0 {
        return Err(ConfigError::Validation {
            message: "pollIntervalMs must be greater than 0".to_string(),
        });
    }

    // tokio's broadcast channel panics on a zero capacity
    if config.progress_capacity == 0 {
        return Err(ConfigError::Validation {
            message: "progressCapacity must be greater than 0".to_string(),
        });
    }

    if config.log_level.trim().is_empty() {
        return Err(ConfigError::Validation {
            message: "logLevel must not be empty".to_string(),
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_load_empty_object_uses_defaults() {
        let config = load_config_from_str("{}").unwrap();
        assert_eq!(config.batch_size, 1000);
        assert_eq!(config.poll_interval_ms, 500);
    }

    #[test]
    fn test_load_overrides() {
        let config_json = r#"
        {
            "batchSize": 250,
            "pollIntervalMs": 20,
            "progressCapacity": 16,
            "logLevel": "debug"
        }
        "#;

        let config = load_config_from_str(config_json).unwrap();
        assert_eq!(config.batch_size, 250);
        assert_eq!(config.poll_interval_ms, 20);
        assert_eq!(config.progress_capacity, 16);
        assert_eq!(config.log_level, "debug");
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        let result = load_config_from_str(r#"{ "batchSize": 0 }"#);
        assert!(matches!(result, Err(ConfigError::Validation { .. })));
    }

    #[test]
    fn test_zero_poll_interval_rejected() {
        let result = load_config_from_str(r#"{ "pollIntervalMs": 0 }"#);
        assert!(matches!(result, Err(ConfigError::Validation { .. })));
    }

    #[test]
    fn test_invalid_json() {
        let result = load_config_from_str("{ not json");
        assert!(matches!(result, Err(ConfigError::ParseJson(_))));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, r#"{{ "batchSize": 42 }}"#).unwrap();

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.batch_size, 42);
    }

    #[test]
    fn test_missing_file() {
        let result = load_config("/nonexistent/doccopy.json");
        assert!(matches!(result, Err(ConfigError::ReadFile { .. })));
    }
}
