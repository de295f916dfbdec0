//! Prometheus-based metrics for the consumer fleet.
//!
//! Covers batch assembly, acknowledgments, consumer health as seen by the
//! monitor, cleanup outcomes (including data loss), and scaling signals.
//!
//! # Example
//!
//! ```ignore
//! use stream_fleet::metrics::{export_metrics, init_metrics, MetricsCollector};
//!
//! init_metrics().expect("Failed to initialize metrics");
//!
//! let collector = MetricsCollector::new();
//! collector.record_scaling("events", "workers", 1, 2, 50.0, "OUT");
//!
//! let metrics_text = export_metrics();
//! ```

pub mod collectors;
pub mod prometheus;

pub use collectors::MetricsCollector;
pub use prometheus::{export_metrics, init_metrics};

pub use prometheus::{
    ACKS_TOTAL, BATCHES_TOTAL, BATCH_DURATION, BATCH_ENTRIES, CONSUMERS_REMOVED_TOTAL,
    CONSUMER_IDLE_SECONDS, CONSUMER_PENDING, CONSUMER_UNHEALTHY, ENTRIES_CLAIMED_TOTAL,
    ENTRIES_LOST_TOTAL, GROUP_PENDING, READ_ERRORS_TOTAL, REGISTRY, SCALING_DECISIONS_TOTAL,
    STREAM_BACKLOG, UTILIZATION_RATE,
};
