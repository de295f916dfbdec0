//! Utilization rate and the scaling decision table.
//!
//! Everything here is pure so the policy can be tested without a broker.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Recommended change to the number of consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScaleDecision {
    #[serde(rename = "OUT")]
    Out,
    #[serde(rename = "IN")]
    In,
    #[serde(rename = "NO_SCALE")]
    NoScale,
}

impl ScaleDecision {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScaleDecision::Out => "OUT",
            ScaleDecision::In => "IN",
            ScaleDecision::NoScale => "NO_SCALE",
        }
    }
}

impl fmt::Display for ScaleDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Group and stream figures a decision is based on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScalingMetrics {
    /// Entries appended after the group's last delivered entry.
    pub backlog: u64,
    /// Entries delivered to the group and not yet acknowledged.
    pub pending: u64,
    /// Consumers registered in the group.
    pub consumers: u64,
}

/// Scale-out and scale-in thresholds, in percent.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScaleThresholds {
    pub scale_out_rate: f64,
    pub scale_in_rate: f64,
}

impl Default for ScaleThresholds {
    fn default() -> Self {
        Self {
            scale_out_rate: 50.0,
            scale_in_rate: 10.0,
        }
    }
}

impl ScaleThresholds {
    pub fn new(scale_out_rate: f64, scale_in_rate: f64) -> Self {
        Self {
            scale_out_rate,
            scale_in_rate,
        }
    }

    /// Checks that both rates lie in `[0, 100]` and scale-in does not exceed
    /// scale-out.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidThreshold` otherwise.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=100.0).contains(&self.scale_in_rate) {
            return Err(ConfigError::InvalidThreshold(format!(
                "scale in rate must be within 0 and 100, got {}",
                self.scale_in_rate
            )));
        }
        if !(0.0..=100.0).contains(&self.scale_out_rate) {
            return Err(ConfigError::InvalidThreshold(format!(
                "scale out rate must be within 0 and 100, got {}",
                self.scale_out_rate
            )));
        }
        if self.scale_in_rate > self.scale_out_rate {
            return Err(ConfigError::InvalidThreshold(format!(
                "scale out rate ({}) must not be lower than scale in rate ({})",
                self.scale_out_rate, self.scale_in_rate
            )));
        }
        Ok(())
    }
}

/// Backlog relative to pending work, in percent.
///
/// Clamped to `[1, 100]` and rounded to four decimals; zero when nothing is
/// pending.
pub fn utilization_rate(backlog: u64, pending: u64) -> f64 {
    if pending == 0 {
        return 0.0;
    }
    let rate = (backlog as f64 / pending as f64 * 100.0).clamp(1.0, 100.0);
    (rate * 10_000.0).round() / 10_000.0
}

/// Applies the decision table to a rate and the metrics it came from.
///
/// Rules are checked in order:
///
/// 1. no rate and no backlog: nothing to do
/// 2. no rate but a backlog: work is waiting with nobody consuming
/// 3. rate under the scale-in threshold with more than one consumer
/// 4. rate at or over the scale-out threshold
pub fn decide(
    rate: f64,
    metrics: &ScalingMetrics,
    thresholds: &ScaleThresholds,
) -> ScaleDecision {
    if rate == 0.0 && metrics.backlog == 0 {
        ScaleDecision::NoScale
    } else if rate == 0.0 {
        ScaleDecision::Out
    } else if rate < thresholds.scale_in_rate && metrics.consumers > 1 {
        ScaleDecision::In
    } else if rate >= thresholds.scale_out_rate {
        ScaleDecision::Out
    } else {
        ScaleDecision::NoScale
    }
}
