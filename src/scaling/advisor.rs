//! Samples a group's backlog and pending work and turns them into a
//! scaling recommendation.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, info};

use super::decision::{decide, utilization_rate, ScaleDecision, ScaleThresholds, ScalingMetrics};
use crate::error::ScalingError;
use crate::gateway::BrokerGateway;
use crate::metrics::MetricsCollector;
use crate::stream::StreamId;

/// Recommends scaling actions for one consumer group. Never mutates group
/// state beyond creating the group on startup.
pub struct ScalingAdvisor {
    gateway: Arc<dyn BrokerGateway>,
    stream: String,
    group: String,
    last: Option<ScalingMetrics>,
    collector: MetricsCollector,
}

impl ScalingAdvisor {
    /// Creates an advisor, making sure the group exists.
    ///
    /// # Errors
    ///
    /// Returns `ScalingError::Gateway` if the group cannot be created.
    pub async fn new(
        gateway: Arc<dyn BrokerGateway>,
        stream: impl Into<String>,
        group: impl Into<String>,
    ) -> Result<Self, ScalingError> {
        let stream = stream.into();
        let group = group.into();

        gateway
            .ensure_group(&stream, &group, StreamId::ZERO, true)
            .await?;

        Ok(Self {
            gateway,
            stream,
            group,
            last: None,
            collector: MetricsCollector::new(),
        })
    }

    /// Metrics from the most recent collection, if any.
    pub fn last_metrics(&self) -> Option<ScalingMetrics> {
        self.last
    }

    /// Samples the group's pending count and the stream backlog behind it.
    ///
    /// The backlog is the number of entries appended after the group's last
    /// delivered entry: the full stream length if the group never delivered
    /// anything, zero if it delivered the newest entry.
    ///
    /// # Errors
    ///
    /// Returns `ScalingError::Gateway` if the broker cannot be queried.
    pub async fn collect_metrics(&mut self) -> Result<ScalingMetrics, ScalingError> {
        let group = self
            .gateway
            .list_groups(&self.stream)
            .await?
            .into_iter()
            .find(|g| g.name == self.group);

        let (pending, consumers, last_delivered) = match &group {
            Some(g) => (g.pending, g.consumers, g.last_delivered_id),
            None => (0, 0, StreamId::ZERO),
        };

        let info = self.gateway.stream_info(&self.stream).await?;
        let backlog = if last_delivered.is_zero() {
            self.gateway.stream_len(&self.stream).await?
        } else if last_delivered == info.last_generated_id {
            0
        } else {
            let entries = self
                .gateway
                .range(&self.stream, last_delivered, info.last_generated_id)
                .await?;
            // the scan starts at the already delivered entry when it still exists
            let delivered = entries.first().map_or(false, |e| e.id == last_delivered);
            (entries.len() as u64).saturating_sub(u64::from(delivered))
        };

        let metrics = ScalingMetrics {
            backlog,
            pending,
            consumers,
        };
        debug!(
            stream = %self.stream,
            group = %self.group,
            backlog = metrics.backlog,
            pending = metrics.pending,
            consumers = metrics.consumers,
            "Collected scaling metrics"
        );
        self.last = Some(metrics);
        Ok(metrics)
    }

    /// Returns the utilization rate and the recommended action.
    ///
    /// Thresholds are checked before anything else. Metrics are refreshed
    /// when none were collected yet or when either sampled value is zero.
    ///
    /// # Errors
    ///
    /// Returns `ScalingError::InvalidConfiguration` for thresholds outside
    /// `[0, 100]` or a scale-in rate above the scale-out rate, and
    /// `ScalingError::Gateway` if refreshing the metrics fails.
    pub async fn get_scale_decision(
        &mut self,
        scale_out_rate: f64,
        scale_in_rate: f64,
    ) -> Result<(f64, ScaleDecision), ScalingError> {
        let thresholds = ScaleThresholds::new(scale_out_rate, scale_in_rate);
        thresholds.validate()?;

        let metrics = match self.last {
            Some(m) if m.backlog > 0 && m.pending > 0 => m,
            _ => self.collect_metrics().await?,
        };

        let rate = utilization_rate(metrics.backlog, metrics.pending);
        let decision = decide(rate, &metrics, &thresholds);

        info!(
            stream = %self.stream,
            group = %self.group,
            backlog = metrics.backlog,
            pending = metrics.pending,
            consumers = metrics.consumers,
            rate = rate,
            decision = %decision,
            "Scaling decision"
        );
        self.collector.record_scaling(
            &self.stream,
            &self.group,
            metrics.backlog,
            metrics.pending,
            rate,
            decision.as_str(),
        );

        Ok((rate, decision))
    }
}

impl fmt::Debug for ScalingAdvisor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScalingAdvisor")
            .field("stream", &self.stream)
            .field("group", &self.group)
            .field("last", &self.last)
            .finish()
    }
}
