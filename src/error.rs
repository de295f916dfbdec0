//! Error types for stream-fleet operations.
//!
//! Defines error types for each subsystem:
//! - Broker gateway calls (transient failures, malformed replies)
//! - Configuration loading and threshold validation
//! - Batch consumption and acknowledgment
//! - Group monitoring and cleanup
//! - Scaling decisions

use thiserror::Error;

use crate::stream::{ParseStreamIdError, StreamId};

/// Errors raised by a broker gateway.
///
/// The consumer poll loop treats every variant as transient and retries
/// within its deadline; other callers decide for themselves.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Broker connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Redis operation failed: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Unexpected broker reply: {0}")]
    InvalidReply(String),

    #[error("Invalid stream id in broker reply: {0}")]
    InvalidId(#[from] ParseStreamIdError),

    #[error("Consumer group '{group}' does not exist on stream '{stream}'")]
    GroupNotFound { stream: String, group: String },

    #[error("Stream '{0}' does not exist")]
    StreamNotFound(String),
}

/// Errors that can occur while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),

    #[error("Invalid scaling threshold: {0}")]
    InvalidThreshold(String),
}

/// Errors surfaced by the batch consumer.
///
/// Read failures never appear here: they are absorbed by the poll loop.
#[derive(Debug, Error)]
pub enum ConsumerError {
    #[error("Invalid consumer configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Broker error: {0}")]
    Gateway(#[from] GatewayError),

    #[error("Failed to acknowledge entry {id}: {source}")]
    Ack {
        id: StreamId,
        #[source]
        source: GatewayError,
    },
}

/// Errors surfaced by the group monitor.
#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("Invalid monitor configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Broker error: {0}")]
    Gateway(#[from] GatewayError),

    #[error("Failed to write monitoring output: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to serialize monitoring output: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors surfaced by the scaling advisor.
#[derive(Debug, Error)]
pub enum ScalingError {
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(#[from] ConfigError),

    #[error("Broker error: {0}")]
    Gateway(#[from] GatewayError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = GatewayError::GroupNotFound {
            stream: "orders".to_string(),
            group: "billing".to_string(),
        };
        assert!(err.to_string().contains("billing"));
        assert!(err.to_string().contains("orders"));

        let err = ConsumerError::Ack {
            id: StreamId::new(12, 1),
            source: GatewayError::ConnectionFailed("reset by peer".to_string()),
        };
        assert!(err.to_string().contains("12-1"));
        assert!(err.to_string().contains("reset by peer"));

        let err = ScalingError::from(ConfigError::InvalidThreshold("too big".to_string()));
        assert!(matches!(
            err,
            ScalingError::InvalidConfiguration(ConfigError::InvalidThreshold(_))
        ));
    }
}
