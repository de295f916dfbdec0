//! stream-fleet: batch consumption, health monitoring and scaling advice for
//! consumer groups on an append-only stream.
//!
//! The crate is built around three engines sharing one data model:
//!
//! - [`consumer::BatchConsumer`] assembles bounded batches for one consumer
//! - [`monitor::GroupMonitor`] detects stalled or overloaded consumers and
//!   moves their unacknowledged work to a healthy one
//! - [`scaling::ScalingAdvisor`] turns backlog and pending counts into
//!   scale-out / scale-in recommendations
//!
//! All of them talk to the broker through [`gateway::BrokerGateway`], with a
//! Redis Streams implementation and an in-memory one for tests.

pub mod cli;
pub mod config;
pub mod consumer;
pub mod error;
pub mod gateway;
pub mod metrics;
pub mod monitor;
pub mod scaling;
pub mod stream;

// Re-export commonly used types
pub use config::FleetConfig;
pub use consumer::{BatchConsumer, BatchConsumerConfig, BatchResult, BatchState};
pub use error::{ConfigError, ConsumerError, GatewayError, MonitorError, ScalingError};
pub use gateway::{BrokerGateway, MemoryGateway, RedisGateway};
pub use monitor::{CleanupReport, ConsumerSnapshot, GroupMonitor, GroupMonitorConfig, HealthStatus};
pub use scaling::{ScaleDecision, ScaleThresholds, ScalingAdvisor, ScalingMetrics};
pub use stream::{PendingEntry, ReadSelector, StreamEntry, StreamId};
