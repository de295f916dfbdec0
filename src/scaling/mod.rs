//! Scale-out and scale-in recommendations for a consumer group.
//!
//! The utilization rate compares the backlog waiting behind a group with the
//! work already pending in it:
//!
//! ```text
//! rate = clamp(backlog / pending * 100, 1, 100)    (0 when pending == 0)
//! ```
//!
//! [`ScalingAdvisor`] samples both figures from the broker; [`decide`] maps a
//! rate to a [`ScaleDecision`] against caller-supplied thresholds.

pub mod advisor;
pub mod decision;

pub use advisor::ScalingAdvisor;
pub use decision::{decide, utilization_rate, ScaleDecision, ScaleThresholds, ScalingMetrics};
