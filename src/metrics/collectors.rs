//! High-level recording interface over the raw Prometheus metrics.
//!
//! Components hold a `MetricsCollector` and call its `record_*` methods; when
//! `init_metrics()` has not run every call is a no-op, so library users that
//! do not export metrics pay nothing.

use super::prometheus::{
    ACKS_TOTAL, BATCHES_TOTAL, BATCH_DURATION, BATCH_ENTRIES, CONSUMERS_REMOVED_TOTAL,
    CONSUMER_IDLE_SECONDS, CONSUMER_PENDING, CONSUMER_UNHEALTHY, ENTRIES_CLAIMED_TOTAL,
    ENTRIES_LOST_TOTAL, GROUP_PENDING, READ_ERRORS_TOTAL, SCALING_DECISIONS_TOTAL,
    STREAM_BACKLOG, UTILIZATION_RATE,
};

/// Metrics collector for recording fleet operational metrics.
///
/// # Example
///
/// ```ignore
/// use stream_fleet::metrics::{init_metrics, MetricsCollector};
///
/// init_metrics().expect("Failed to init metrics");
/// let collector = MetricsCollector::new();
///
/// collector.record_batch(2, "satisfied", 0.015);
/// collector.record_ack(true);
/// ```
#[derive(Debug, Clone, Default)]
pub struct MetricsCollector;

impl MetricsCollector {
    /// Create a new MetricsCollector instance.
    pub fn new() -> Self {
        Self
    }

    /// Record one assembled batch.
    ///
    /// # Arguments
    ///
    /// * `entries` - Number of entries handed to the caller
    /// * `state` - State that ended accumulation (e.g., "satisfied")
    /// * `duration_secs` - Time spent assembling the batch
    pub fn record_batch(&self, entries: usize, state: &str, duration_secs: f64) {
        if let Some(batches_total) = BATCHES_TOTAL.get() {
            batches_total.with_label_values(&[state]).inc();
        }

        if let Some(batch_entries) = BATCH_ENTRIES.get() {
            batch_entries.observe(entries as f64);
        }

        if let Some(batch_duration) = BATCH_DURATION.get() {
            batch_duration.observe(duration_secs);
        }

        tracing::trace!(
            entries = entries,
            state = state,
            duration_secs = duration_secs,
            "Recorded batch metric"
        );
    }

    /// Record a broker read that failed and was absorbed.
    pub fn record_read_error(&self) {
        if let Some(read_errors) = READ_ERRORS_TOTAL.get() {
            read_errors.inc();
        }
    }

    /// Record an acknowledgment attempt.
    pub fn record_ack(&self, success: bool) {
        let status = if success { "success" } else { "failure" };
        if let Some(acks_total) = ACKS_TOTAL.get() {
            acks_total.with_label_values(&[status]).inc();
        }
    }

    /// Record what the monitor observed for one consumer.
    pub fn record_consumer_status(
        &self,
        group: &str,
        consumer: &str,
        pending: u64,
        idle_ms: u64,
        healthy: bool,
    ) {
        if let Some(consumer_pending) = CONSUMER_PENDING.get() {
            consumer_pending
                .with_label_values(&[group, consumer])
                .set(pending as f64);
        }

        if let Some(consumer_idle) = CONSUMER_IDLE_SECONDS.get() {
            consumer_idle
                .with_label_values(&[group, consumer])
                .set(idle_ms as f64 / 1000.0);
        }

        if let Some(unhealthy) = CONSUMER_UNHEALTHY.get() {
            unhealthy
                .with_label_values(&[group, consumer])
                .set(if healthy { 0.0 } else { 1.0 });
        }
    }

    /// Record the outcome of a cleanup pass on one group.
    pub fn record_cleanup(&self, group: &str, consumers_removed: u64, entries_claimed: u64) {
        if let Some(removed) = CONSUMERS_REMOVED_TOTAL.get() {
            removed
                .with_label_values(&[group])
                .inc_by(consumers_removed as f64);
        }

        if let Some(claimed) = ENTRIES_CLAIMED_TOTAL.get() {
            claimed
                .with_label_values(&[group])
                .inc_by(entries_claimed as f64);
        }

        tracing::trace!(
            group = group,
            consumers_removed = consumers_removed,
            entries_claimed = entries_claimed,
            "Recorded cleanup metric"
        );
    }

    /// Record entries lost when a consumer that still owned them was deleted.
    pub fn record_data_loss(&self, group: &str, lost: u64) {
        if let Some(entries_lost) = ENTRIES_LOST_TOTAL.get() {
            entries_lost.with_label_values(&[group]).inc_by(lost as f64);
        }
    }

    /// Record one scaling evaluation.
    pub fn record_scaling(
        &self,
        stream: &str,
        group: &str,
        backlog: u64,
        pending: u64,
        rate: f64,
        decision: &str,
    ) {
        if let Some(stream_backlog) = STREAM_BACKLOG.get() {
            stream_backlog
                .with_label_values(&[stream, group])
                .set(backlog as f64);
        }

        if let Some(group_pending) = GROUP_PENDING.get() {
            group_pending
                .with_label_values(&[stream, group])
                .set(pending as f64);
        }

        if let Some(utilization) = UTILIZATION_RATE.get() {
            utilization.with_label_values(&[stream, group]).set(rate);
        }

        if let Some(decisions) = SCALING_DECISIONS_TOTAL.get() {
            decisions.with_label_values(&[decision]).inc();
        }

        tracing::trace!(
            stream = stream,
            group = group,
            backlog = backlog,
            pending = pending,
            rate = rate,
            decision = decision,
            "Recorded scaling metric"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::{export_metrics, init_metrics};

    fn ensure_metrics_init() {
        // Ignore errors if already initialized
        let _ = init_metrics();
    }

    #[test]
    fn test_record_batch() {
        ensure_metrics_init();
        let collector = MetricsCollector::new();

        collector.record_batch(2, "satisfied", 0.01);
        collector.record_batch(0, "deadline_exceeded", 10.0);

        assert!(export_metrics().contains("stream_fleet_batches_total"));
    }

    #[test]
    fn test_record_consumer_status() {
        ensure_metrics_init();
        let collector = MetricsCollector::new();

        collector.record_consumer_status("group", "worker-1", 3, 45_000, false);
        collector.record_consumer_status("group", "worker-2", 0, 10, true);

        let exported = export_metrics();
        assert!(exported.contains("stream_fleet_consumer_pending"));
        assert!(exported.contains("worker-1"));
    }

    #[test]
    fn test_record_cleanup_and_loss() {
        ensure_metrics_init();
        let collector = MetricsCollector::new();

        collector.record_cleanup("group", 1, 4);
        collector.record_data_loss("group", 2);
        collector.record_read_error();
        collector.record_ack(true);
        collector.record_ack(false);

        assert!(export_metrics().contains("stream_fleet_entries_lost_total"));
    }

    #[test]
    fn test_record_scaling() {
        ensure_metrics_init();
        let collector = MetricsCollector::new();

        collector.record_scaling("stream", "group", 1, 2, 50.0, "OUT");

        assert!(export_metrics().contains("stream_fleet_scaling_decisions_total"));
    }
}
