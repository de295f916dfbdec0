//! Configuration for the batch consumer.

use std::time::Duration;

use uuid::Uuid;

use crate::error::ConfigError;

/// Configuration for a [`BatchConsumer`](super::BatchConsumer).
#[derive(Debug, Clone)]
pub struct BatchConsumerConfig {
    /// Name of the stream to consume.
    pub stream: String,
    /// Name of the consumer group.
    pub group: String,
    /// Identity of this consumer within the group.
    pub consumer_id: String,
    /// Number of entries a batch aims for.
    pub batch_size: usize,
    /// Wall-clock budget for assembling one batch. Zero means a single read
    /// attempt per batch.
    pub max_wait_time: Duration,
    /// Block budget of each individual read.
    pub poll_time: Duration,
    /// Whether `shutdown` removes this consumer from the group.
    pub cleanup_on_exit: bool,
}

/// Builds a consumer id unique to this process and instance.
pub fn default_consumer_id() -> String {
    format!("{}-{}", std::process::id(), Uuid::new_v4().simple())
}

impl Default for BatchConsumerConfig {
    fn default() -> Self {
        Self {
            stream: "stream".to_string(),
            group: "group".to_string(),
            consumer_id: default_consumer_id(),
            batch_size: 2,
            max_wait_time: Duration::from_secs(10),
            poll_time: Duration::from_secs(1),
            cleanup_on_exit: true,
        }
    }
}

impl BatchConsumerConfig {
    /// Creates a configuration for the given stream and group.
    pub fn new(stream: impl Into<String>, group: impl Into<String>) -> Self {
        Self {
            stream: stream.into(),
            group: group.into(),
            ..Default::default()
        }
    }

    /// Sets the consumer id.
    pub fn with_consumer_id(mut self, consumer_id: impl Into<String>) -> Self {
        self.consumer_id = consumer_id.into();
        self
    }

    /// Sets the batch size.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Sets the maximum time spent assembling a batch.
    pub fn with_max_wait_time(mut self, max_wait_time: Duration) -> Self {
        self.max_wait_time = max_wait_time;
        self
    }

    /// Sets the block budget of each read.
    pub fn with_poll_time(mut self, poll_time: Duration) -> Self {
        self.poll_time = poll_time;
        self
    }

    /// Sets whether the consumer deregisters itself on shutdown.
    pub fn with_cleanup_on_exit(mut self, cleanup_on_exit: bool) -> Self {
        self.cleanup_on_exit = cleanup_on_exit;
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

        if self.consumer_id.is_empty() {
            return Err(ConfigError::ValidationFailed(
                "consumer_id cannot be empty".to_string(),
            ));
        }

        if self.batch_size == 0 {
            return Err(ConfigError::ValidationFailed(
                "batch_size must be at least 1".to_string(),
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
        let config = BatchConsumerConfig::default();

        assert_eq!(config.batch_size, 2);
        assert_eq!(config.max_wait_time, Duration::from_secs(10));
        assert_eq!(config.poll_time, Duration::from_secs(1));
        assert!(config.cleanup_on_exit);
        assert!(config
            .consumer_id
            .starts_with(&format!("{}-", std::process::id())));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_default_consumer_ids_are_unique() {
        assert_ne!(default_consumer_id(), default_consumer_id());
    }

    #[test]
    fn test_config_builder() {
        let config = BatchConsumerConfig::new("orders", "billing")
            .with_consumer_id("worker-1")
            .with_batch_size(25)
            .with_max_wait_time(Duration::from_millis(500))
            .with_poll_time(Duration::from_millis(50))
            .with_cleanup_on_exit(false);

        assert_eq!(config.stream, "orders");
        assert_eq!(config.group, "billing");
        assert_eq!(config.consumer_id, "worker-1");
        assert_eq!(config.batch_size, 25);
        assert_eq!(config.max_wait_time, Duration::from_millis(500));
        assert_eq!(config.poll_time, Duration::from_millis(50));
        assert!(!config.cleanup_on_exit);
    }

    #[test]
    fn test_validation_rejects_zero_batch() {
        let config = BatchConsumerConfig::new("orders", "billing").with_batch_size(0);
        let err = config.validate().expect_err("zero batch is invalid");
        assert!(err.to_string().contains("batch_size"));
    }

    #[test]
    fn test_validation_rejects_empty_names() {
        assert!(BatchConsumerConfig::new("", "billing").validate().is_err());
        assert!(BatchConsumerConfig::new("orders", "").validate().is_err());
        assert!(BatchConsumerConfig::new("orders", "billing")
            .with_consumer_id("")
            .validate()
            .is_err());
    }
}
