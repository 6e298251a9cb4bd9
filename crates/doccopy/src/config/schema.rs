use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Number of documents written to the target in a single insert.
pub const DEFAULT_BATCH_SIZE: usize = 1000;

/// How long a paused job sleeps between checks of its pause flag.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 500;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CopyConfig {
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Capacity of the progress broadcast channel.
    #[serde(default = "default_progress_capacity")]
    pub progress_capacity: usize,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

fn default_poll_interval_ms() -> u64 {
    DEFAULT_POLL_INTERVAL_MS
}

fn default_progress_capacity() -> usize {
    100
}

fn default_log_level() -> String {
    "info".to_string()
}

impl CopyConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Returns a copy with a different batch size.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Returns a copy with a different poll interval, rounded down to whole
    /// milliseconds and never below one.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval_ms = u64::try_from(interval.as_millis())
            .unwrap_or(u64::MAX)
            .max(1);
        self
    }
}

impl Default for CopyConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            poll_interval_ms: default_poll_interval_ms(),
            progress_capacity: default_progress_capacity(),
            log_level: default_log_level(),
        }
    }
}
