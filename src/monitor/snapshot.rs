//! Point-in-time views of consumer health.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Health of one consumer, derived from its pending count and idle time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HealthStatus {
    /// Within both thresholds.
    #[serde(rename = "OK")]
    Ok,
    /// Owns more pending entries than the configured batch size.
    #[serde(rename = "WARNING - too many pending items")]
    PendingOverflow,
    /// Has not read or claimed anything for longer than the idle threshold.
    #[serde(rename = "WARNING - idle for long time")]
    IdleTimeout,
}

impl HealthStatus {
    /// Classifies a consumer. Overflow takes precedence over idleness.
    pub fn classify(
        pending: u64,
        idle_ms: u64,
        batch_size: u64,
        idle_warning_threshold: Duration,
    ) -> Self {
        if pending > batch_size {
            HealthStatus::PendingOverflow
        } else if u128::from(idle_ms) > idle_warning_threshold.as_millis() {
            HealthStatus::IdleTimeout
        } else {
            HealthStatus::Ok
        }
    }

    /// Human-readable label used in reports.
    pub fn label(&self) -> &'static str {
        match self {
            HealthStatus::Ok => "OK",
            HealthStatus::PendingOverflow => "WARNING - too many pending items",
            HealthStatus::IdleTimeout => "WARNING - idle for long time",
        }
    }

    pub fn is_healthy(&self) -> bool {
        matches!(self, HealthStatus::Ok)
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One consumer as seen by a monitor pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsumerSnapshot {
    pub group: String,
    pub consumer_id: String,
    pub idle_ms: u64,
    pub pending: u64,
    pub status: HealthStatus,
}

/// Outcome of a cleanup pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanupReport {
    /// Unhealthy consumers whose registration was deleted.
    pub consumers_removed: u64,
    /// Entries moved onto a healthy consumer.
    pub entries_claimed: u64,
    /// Entries dropped because their owner was deleted while still holding them.
    pub entries_lost: u64,
}

impl CleanupReport {
    pub(crate) fn merge(&mut self, other: CleanupReport) {
        self.consumers_removed += other.consumers_removed;
        self.entries_claimed += other.entries_claimed;
        self.entries_lost += other.entries_lost;
    }
}
