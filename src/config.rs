//! Fleet-wide configuration.
//!
//! One `FleetConfig` carries everything a producer, consumer, monitor or
//! scaling advisor needs to talk to the same stream and group. It is built
//! from defaults, overridden by environment variables, then by CLI flags.
//!
//! | Variable                    | Default                  |
//! |-----------------------------|--------------------------|
//! | `REDIS_URL`                 | `redis://127.0.0.1:6379` |
//! | `STREAM_NAME`               | `BatchStream`            |
//! | `CONSUMER_GROUP`            | `BatchGroup`             |
//! | `BATCH_SIZE`                | `2`                      |
//! | `MAX_WAIT_TIME_MS`          | `10000`                  |
//! | `POLL_TIME_MS`              | `1000`                   |
//! | `CLEANUP_ON_EXIT`           | `true`                   |
//! | `MIN_WAIT_TIME_MS`          | `1000`                   |
//! | `IDLE_WARNING_THRESHOLD_MS` | `30000`                  |
//! | `SCALE_OUT_RATE`            | `50`                     |
//! | `SCALE_IN_RATE`             | `10`                     |

use std::time::Duration;

use crate::consumer::BatchConsumerConfig;
use crate::error::ConfigError;
use crate::monitor::GroupMonitorConfig;
use crate::scaling::ScaleThresholds;

/// Configuration shared by every component of a fleet.
#[derive(Debug, Clone)]
pub struct FleetConfig {
    // Broker settings
    /// Redis connection URL.
    pub redis_url: String,
    /// Stream to produce to and consume from.
    pub stream: String,
    /// Consumer group name.
    pub group: String,

    // Consumer settings
    /// Target number of entries per batch; also the monitor's pending threshold.
    pub batch_size: usize,
    /// Wall-clock budget for assembling one batch.
    pub max_wait_time: Duration,
    /// Block budget of each read.
    pub poll_time: Duration,
    /// Whether consumers deregister themselves on shutdown.
    pub cleanup_on_exit: bool,

    // Monitor settings
    /// Minimum idle time of entries moved between consumers.
    pub min_wait_time: Duration,
    /// Idle time after which a consumer is reported as stalled.
    pub idle_warning_threshold: Duration,

    // Scaling settings
    pub scale_out_rate: f64,
    pub scale_in_rate: f64,
}

impl Default for FleetConfig {
    fn default() -> Self {
        let thresholds = ScaleThresholds::default();
        Self {
            redis_url: "redis://127.0.0.1:6379".to_string(),
            stream: "BatchStream".to_string(),
            group: "BatchGroup".to_string(),
            batch_size: 2,
            max_wait_time: Duration::from_secs(10),
            poll_time: Duration::from_secs(1),
            cleanup_on_exit: true,
            min_wait_time: Duration::from_secs(1),
            idle_warning_threshold: Duration::from_secs(30),
            scale_out_rate: thresholds.scale_out_rate,
            scale_in_rate: thresholds.scale_in_rate,
        }
    }
}

impl FleetConfig {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from environment variables.
    ///
    /// Unset variables keep their default value.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if a variable cannot be parsed.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if a value cannot be parsed.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        // Broker settings
        if let Some(val) = lookup("REDIS_URL") {
            config.redis_url = val;
        }

        if let Some(val) = lookup("STREAM_NAME") {
            config.stream = val;
        }

        if let Some(val) = lookup("CONSUMER_GROUP") {
            config.group = val;
        }

        // Consumer settings
        if let Some(val) = lookup("BATCH_SIZE") {
            config.batch_size = parse_env_value(&val, "BATCH_SIZE")?;
        }

        if let Some(val) = lookup("MAX_WAIT_TIME_MS") {
            config.max_wait_time = parse_env_millis(&val, "MAX_WAIT_TIME_MS")?;
        }

        if let Some(val) = lookup("POLL_TIME_MS") {
            config.poll_time = parse_env_millis(&val, "POLL_TIME_MS")?;
        }

        if let Some(val) = lookup("CLEANUP_ON_EXIT") {
            config.cleanup_on_exit = parse_env_bool(&val, "CLEANUP_ON_EXIT")?;
        }

        // Monitor settings
        if let Some(val) = lookup("MIN_WAIT_TIME_MS") {
            config.min_wait_time = parse_env_millis(&val, "MIN_WAIT_TIME_MS")?;
        }

        if let Some(val) = lookup("IDLE_WARNING_THRESHOLD_MS") {
            config.idle_warning_threshold = parse_env_millis(&val, "IDLE_WARNING_THRESHOLD_MS")?;
        }

        // Scaling settings
        if let Some(val) = lookup("SCALE_OUT_RATE") {
            config.scale_out_rate = parse_env_value(&val, "SCALE_OUT_RATE")?;
        }

        if let Some(val) = lookup("SCALE_IN_RATE") {
            config.scale_in_rate = parse_env_value(&val, "SCALE_IN_RATE")?;
        }

        Ok(config)
    }

    /// Set the Redis URL.
    pub fn with_redis_url(mut self, redis_url: impl Into<String>) -> Self {
        self.redis_url = redis_url.into();
        self
    }

    /// Set the stream name.
    pub fn with_stream(mut self, stream: impl Into<String>) -> Self {
        self.stream = stream.into();
        self
    }

    /// Set the consumer group name.
    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.group = group.into();
        self
    }

    /// Set the batch size.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Set the batch assembly budget.
    pub fn with_max_wait_time(mut self, max_wait_time: Duration) -> Self {
        self.max_wait_time = max_wait_time;
        self
    }

    /// Set the per-read block budget.
    pub fn with_poll_time(mut self, poll_time: Duration) -> Self {
        self.poll_time = poll_time;
        self
    }

    /// Set whether consumers deregister on shutdown.
    pub fn with_cleanup_on_exit(mut self, cleanup_on_exit: bool) -> Self {
        self.cleanup_on_exit = cleanup_on_exit;
        self
    }

    /// Set the minimum idle time of reassigned entries.
    pub fn with_min_wait_time(mut self, min_wait_time: Duration) -> Self {
        self.min_wait_time = min_wait_time;
        self
    }

    /// Set the consumer idle threshold.
    pub fn with_idle_warning_threshold(mut self, threshold: Duration) -> Self {
        self.idle_warning_threshold = threshold;
        self
    }

    /// Set the scaling thresholds.
    pub fn with_scale_rates(mut self, scale_out_rate: f64, scale_in_rate: f64) -> Self {
        self.scale_out_rate = scale_out_rate;
        self.scale_in_rate = scale_in_rate;
        self
    }

    /// Validate the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationFailed` for invalid broker or consumer
    /// settings and `ConfigError::InvalidThreshold` for invalid scaling rates.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.redis_url.is_empty() {
            return Err(ConfigError::ValidationFailed(
                "redis_url cannot be empty".to_string(),
            ));
        }

        self.consumer_config().validate()?;
        self.monitor_config().validate()?;
        self.thresholds().validate()
    }

    /// Consumer configuration with a fresh consumer id.
    pub fn consumer_config(&self) -> BatchConsumerConfig {
        BatchConsumerConfig::new(&self.stream, &self.group)
            .with_batch_size(self.batch_size)
            .with_max_wait_time(self.max_wait_time)
            .with_poll_time(self.poll_time)
            .with_cleanup_on_exit(self.cleanup_on_exit)
    }

    /// Monitor configuration; the pending threshold is the batch size.
    pub fn monitor_config(&self) -> GroupMonitorConfig {
        GroupMonitorConfig::new(&self.stream, &self.group)
            .with_batch_size(self.batch_size as u64)
            .with_min_wait_time(self.min_wait_time)
            .with_idle_warning_threshold(self.idle_warning_threshold)
    }

    /// Scaling thresholds.
    pub fn thresholds(&self) -> ScaleThresholds {
        ScaleThresholds::new(self.scale_out_rate, self.scale_in_rate)
    }
}

/// Parse an environment variable value into the target type.
fn parse_env_value<T: std::str::FromStr>(value: &str, key: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        message: format!("could not parse '{}'", value),
    })
}

/// Parse an environment variable holding milliseconds.
fn parse_env_millis(value: &str, key: &str) -> Result<Duration, ConfigError> {
    parse_env_value(value, key).map(Duration::from_millis)
}

/// Parse an environment variable as a boolean.
fn parse_env_bool(value: &str, key: &str) -> Result<bool, ConfigError> {
    match value.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("expected boolean value, got '{}'", value),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = FleetConfig::default();
        assert_eq!(config.stream, "BatchStream");
        assert_eq!(config.group, "BatchGroup");
        assert_eq!(config.batch_size, 2);
        assert_eq!(config.max_wait_time, Duration::from_secs(10));
        assert_eq!(config.poll_time, Duration::from_secs(1));
        assert_eq!(config.min_wait_time, Duration::from_secs(1));
        assert_eq!(config.idle_warning_threshold, Duration::from_secs(30));
        assert!((config.scale_out_rate - 50.0).abs() < f64::EPSILON);
        assert!((config.scale_in_rate - 10.0).abs() < f64::EPSILON);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_lookup() {
        let config = FleetConfig::from_lookup(lookup(&[
            ("REDIS_URL", "redis://cache:6380/2"),
            ("STREAM_NAME", "orders"),
            ("CONSUMER_GROUP", "billing"),
            ("BATCH_SIZE", "25"),
            ("MAX_WAIT_TIME_MS", "500"),
            ("POLL_TIME_MS", "50"),
            ("CLEANUP_ON_EXIT", "no"),
            ("MIN_WAIT_TIME_MS", "2000"),
            ("IDLE_WARNING_THRESHOLD_MS", "60000"),
            ("SCALE_OUT_RATE", "60"),
            ("SCALE_IN_RATE", "20.5"),
        ]))
        .expect("valid environment");

        assert_eq!(config.redis_url, "redis://cache:6380/2");
        assert_eq!(config.stream, "orders");
        assert_eq!(config.group, "billing");
        assert_eq!(config.batch_size, 25);
        assert_eq!(config.max_wait_time, Duration::from_millis(500));
        assert_eq!(config.poll_time, Duration::from_millis(50));
        assert!(!config.cleanup_on_exit);
        assert_eq!(config.min_wait_time, Duration::from_secs(2));
        assert_eq!(config.idle_warning_threshold, Duration::from_secs(60));
        assert!((config.scale_out_rate - 60.0).abs() < f64::EPSILON);
        assert!((config.scale_in_rate - 20.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_from_lookup_rejects_garbage() {
        let err = FleetConfig::from_lookup(lookup(&[("BATCH_SIZE", "many")]))
            .expect_err("unparsable batch size");
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "BATCH_SIZE"));
    }

    #[test]
    fn test_validate() {
        assert!(FleetConfig::new().with_batch_size(0).validate().is_err());
        assert!(FleetConfig::new().with_stream("").validate().is_err());
        assert!(FleetConfig::new().with_redis_url("").validate().is_err());
        assert!(matches!(
            FleetConfig::new().with_scale_rates(10.0, 20.0).validate(),
            Err(ConfigError::InvalidThreshold(_))
        ));
    }

    #[test]
    fn test_component_configs() {
        let config = FleetConfig::new()
            .with_stream("orders")
            .with_group("billing")
            .with_batch_size(5)
            .with_poll_time(Duration::from_millis(20))
            .with_idle_warning_threshold(Duration::from_secs(5));

        let consumer = config.consumer_config();
        assert_eq!(consumer.stream, "orders");
        assert_eq!(consumer.batch_size, 5);
        assert_eq!(consumer.poll_time, Duration::from_millis(20));

        let monitor = config.monitor_config();
        assert_eq!(monitor.group, "billing");
        assert_eq!(monitor.batch_size, 5);
        assert_eq!(monitor.idle_warning_threshold, Duration::from_secs(5));
    }

    #[test]
    fn test_parse_env_bool() {
        assert!(parse_env_bool("true", "test").expect("bool"));
        assert!(parse_env_bool("1", "test").expect("bool"));
        assert!(parse_env_bool("YES", "test").expect("bool"));
        assert!(!parse_env_bool("off", "test").expect("bool"));
        assert!(parse_env_bool("invalid", "test").is_err());
    }
}
