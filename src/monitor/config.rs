//! Configuration for the group monitor.

use std::time::Duration;

use crate::error::ConfigError;

/// Configuration for a [`GroupMonitor`](super::GroupMonitor).
#[derive(Debug, Clone)]
pub struct GroupMonitorConfig {
    /// Name of the stream to watch.
    pub stream: String,
    /// Consumer group created on startup; every group of the stream is scanned.
    pub group: String,
    /// A consumer owning more pending entries than this is overloaded.
    /// Usually equal to the consumers' batch size.
    pub batch_size: u64,
    /// Entries younger than this are never reassigned, since their owner may
    /// still be working on them.
    pub min_wait_time: Duration,
    /// A consumer idle for longer than this is considered stalled. Should
    /// exceed the consumers' `max_wait_time` plus their processing time.
    pub idle_warning_threshold: Duration,
}

impl Default for GroupMonitorConfig {
    fn default() -> Self {
        Self {
            stream: "stream".to_string(),
            group: "group".to_string(),
            batch_size: 2,
            min_wait_time: Duration::from_secs(1),
            idle_warning_threshold: Duration::from_secs(30),
        }
    }
}

impl GroupMonitorConfig {
    /// Creates a configuration for the given stream and group.
    pub fn new(stream: impl Into<String>, group: impl Into<String>) -> Self {
        Self {
            stream: stream.into(),
            group: group.into(),
            ..Default::default()
        }
    }

    /// Sets the pending-count threshold.
    pub fn with_batch_size(mut self, batch_size: u64) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Sets the minimum idle time of reassigned entries.
    pub fn with_min_wait_time(mut self, min_wait_time: Duration) -> Self {
        self.min_wait_time = min_wait_time;
        self
    }

    /// Sets the idle threshold.
    pub fn with_idle_warning_threshold(mut self, threshold: Duration) -> Self {
        self.idle_warning_threshold = threshold;
        self
    }

    /// Validates the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationFailed` if any values are invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.stream.is_empty() {
            return Err(ConfigError::ValidationFailed(
                "stream cannot be empty".to_string(),
            ));
        }

        if self.group.is_empty() {
            return Err(ConfigError::ValidationFailed(
                "group cannot be empty".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = GroupMonitorConfig::default();
        assert_eq!(config.batch_size, 2);
        assert_eq!(config.min_wait_time, Duration::from_secs(1));
        assert_eq!(config.idle_warning_threshold, Duration::from_secs(30));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder_and_validation() {
        let config = GroupMonitorConfig::new("orders", "billing")
            .with_batch_size(10)
            .with_min_wait_time(Duration::from_millis(250))
            .with_idle_warning_threshold(Duration::from_secs(5));

        assert_eq!(config.batch_size, 10);
        assert_eq!(config.min_wait_time, Duration::from_millis(250));
        assert_eq!(config.idle_warning_threshold, Duration::from_secs(5));

        assert!(GroupMonitorConfig::new("", "billing").validate().is_err());
        assert!(GroupMonitorConfig::new("orders", "").validate().is_err());
    }
}
