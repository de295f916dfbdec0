//! Prometheus metrics registration and export.
//!
//! This module defines all Prometheus metrics used by stream_fleet and provides
//! functions for initializing, registering, and exporting metrics.

use prometheus::{
    Counter, CounterVec, Encoder, GaugeVec, Histogram, HistogramOpts, Opts, Registry, TextEncoder,
};
use std::sync::OnceLock;

/// Global Prometheus registry for all stream_fleet metrics.
pub static REGISTRY: OnceLock<Registry> = OnceLock::new();

/// Total batches assembled, labeled by the state that ended accumulation.
pub static BATCHES_TOTAL: OnceLock<CounterVec> = OnceLock::new();

/// Number of entries returned per batch.
pub static BATCH_ENTRIES: OnceLock<Histogram> = OnceLock::new();

/// Time spent assembling a batch, in seconds.
pub static BATCH_DURATION: OnceLock<Histogram> = OnceLock::new();

/// Broker reads that failed and were absorbed by the poll loop.
pub static READ_ERRORS_TOTAL: OnceLock<Counter> = OnceLock::new();

/// Acknowledgments, labeled by status.
pub static ACKS_TOTAL: OnceLock<CounterVec> = OnceLock::new();

/// Pending entries per consumer, as last observed by the monitor.
pub static CONSUMER_PENDING: OnceLock<GaugeVec> = OnceLock::new();

/// Idle time per consumer in seconds, as last observed by the monitor.
pub static CONSUMER_IDLE_SECONDS: OnceLock<GaugeVec> = OnceLock::new();

/// 1 when the monitor last saw the consumer unhealthy, 0 otherwise.
pub static CONSUMER_UNHEALTHY: OnceLock<GaugeVec> = OnceLock::new();

/// Consumers removed by monitor cleanup, labeled by group.
pub static CONSUMERS_REMOVED_TOTAL: OnceLock<CounterVec> = OnceLock::new();

/// Entries reassigned by monitor cleanup, labeled by group.
pub static ENTRIES_CLAIMED_TOTAL: OnceLock<CounterVec> = OnceLock::new();

/// Entries dropped from a PEL when their owner was deleted, labeled by group.
pub static ENTRIES_LOST_TOTAL: OnceLock<CounterVec> = OnceLock::new();

/// Stream backlog relative to a group, labeled by stream and group.
pub static STREAM_BACKLOG: OnceLock<GaugeVec> = OnceLock::new();

/// Pending entries of a group, labeled by stream and group.
pub static GROUP_PENDING: OnceLock<GaugeVec> = OnceLock::new();

/// Last computed utilization rate, labeled by stream and group.
pub static UTILIZATION_RATE: OnceLock<GaugeVec> = OnceLock::new();

/// Scaling recommendations, labeled by decision.
pub static SCALING_DECISIONS_TOTAL: OnceLock<CounterVec> = OnceLock::new();

/// Initialize all metrics and register them with the registry.
///
/// Call once at startup. Recording methods are no-ops until this has run.
///
/// # Errors
///
/// Returns a `prometheus::Error` if metric registration fails, typically due to
/// duplicate metric names or invalid metric configurations.
pub fn init_metrics() -> Result<(), prometheus::Error> {
    let registry = Registry::new();

    // Consumer metrics
    let batches_total = CounterVec::new(
        Opts::new("stream_fleet_batches_total", "Total batches assembled"),
        &["state"],
    )?;

    let batch_entries = Histogram::with_opts(
        HistogramOpts::new(
            "stream_fleet_batch_entries",
            "Number of entries returned per batch",
        )
        .buckets(vec![0.0, 1.0, 2.0, 5.0, 10.0, 25.0, 50.0, 100.0, 500.0]),
    )?;

    let batch_duration = Histogram::with_opts(
        HistogramOpts::new(
            "stream_fleet_batch_duration_seconds",
            "Time spent assembling a batch in seconds",
        )
        .buckets(vec![0.01, 0.05, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0]),
    )?;

    let read_errors_total = Counter::new(
        "stream_fleet_read_errors_total",
        "Broker reads that failed inside the poll loop",
    )?;

    let acks_total = CounterVec::new(
        Opts::new("stream_fleet_acks_total", "Total acknowledgments"),
        &["status"],
    )?;

    // Monitor metrics
    let consumer_pending = GaugeVec::new(
        Opts::new(
            "stream_fleet_consumer_pending",
            "Pending entries per consumer",
        ),
        &["group", "consumer"],
    )?;

    let consumer_idle_seconds = GaugeVec::new(
        Opts::new(
            "stream_fleet_consumer_idle_seconds",
            "Idle time per consumer in seconds",
        ),
        &["group", "consumer"],
    )?;

    let consumer_unhealthy = GaugeVec::new(
        Opts::new(
            "stream_fleet_consumer_unhealthy",
            "Whether the consumer was last seen unhealthy",
        ),
        &["group", "consumer"],
    )?;

    let consumers_removed_total = CounterVec::new(
        Opts::new(
            "stream_fleet_consumers_removed_total",
            "Consumers removed by cleanup",
        ),
        &["group"],
    )?;

    let entries_claimed_total = CounterVec::new(
        Opts::new(
            "stream_fleet_entries_claimed_total",
            "Entries reassigned by cleanup",
        ),
        &["group"],
    )?;

    let entries_lost_total = CounterVec::new(
        Opts::new(
            "stream_fleet_entries_lost_total",
            "Pending entries dropped when their consumer was deleted",
        ),
        &["group"],
    )?;

    // Scaling metrics
    let stream_backlog = GaugeVec::new(
        Opts::new(
            "stream_fleet_stream_backlog",
            "Entries not yet delivered to the group",
        ),
        &["stream", "group"],
    )?;

    let group_pending = GaugeVec::new(
        Opts::new("stream_fleet_group_pending", "Pending entries of the group"),
        &["stream", "group"],
    )?;

    let utilization_rate = GaugeVec::new(
        Opts::new(
            "stream_fleet_utilization_rate",
            "Last computed utilization rate",
        ),
        &["stream", "group"],
    )?;

    let scaling_decisions_total = CounterVec::new(
        Opts::new(
            "stream_fleet_scaling_decisions_total",
            "Scaling recommendations issued",
        ),
        &["decision"],
    )?;

    registry.register(Box::new(batches_total.clone()))?;
    registry.register(Box::new(batch_entries.clone()))?;
    registry.register(Box::new(batch_duration.clone()))?;
    registry.register(Box::new(read_errors_total.clone()))?;
    registry.register(Box::new(acks_total.clone()))?;
    registry.register(Box::new(consumer_pending.clone()))?;
    registry.register(Box::new(consumer_idle_seconds.clone()))?;
    registry.register(Box::new(consumer_unhealthy.clone()))?;
    registry.register(Box::new(consumers_removed_total.clone()))?;
    registry.register(Box::new(entries_claimed_total.clone()))?;
    registry.register(Box::new(entries_lost_total.clone()))?;
    registry.register(Box::new(stream_backlog.clone()))?;
    registry.register(Box::new(group_pending.clone()))?;
    registry.register(Box::new(utilization_rate.clone()))?;
    registry.register(Box::new(scaling_decisions_total.clone()))?;

    // If any of these fail, metrics were already initialized (idempotent)
    let _ = REGISTRY.set(registry);
    let _ = BATCHES_TOTAL.set(batches_total);
    let _ = BATCH_ENTRIES.set(batch_entries);
    let _ = BATCH_DURATION.set(batch_duration);
    let _ = READ_ERRORS_TOTAL.set(read_errors_total);
    let _ = ACKS_TOTAL.set(acks_total);
    let _ = CONSUMER_PENDING.set(consumer_pending);
    let _ = CONSUMER_IDLE_SECONDS.set(consumer_idle_seconds);
    let _ = CONSUMER_UNHEALTHY.set(consumer_unhealthy);
    let _ = CONSUMERS_REMOVED_TOTAL.set(consumers_removed_total);
    let _ = ENTRIES_CLAIMED_TOTAL.set(entries_claimed_total);
    let _ = ENTRIES_LOST_TOTAL.set(entries_lost_total);
    let _ = STREAM_BACKLOG.set(stream_backlog);
    let _ = GROUP_PENDING.set(group_pending);
    let _ = UTILIZATION_RATE.set(utilization_rate);
    let _ = SCALING_DECISIONS_TOTAL.set(scaling_decisions_total);

    tracing::info!("Prometheus metrics initialized successfully");

    Ok(())
}

/// Export all registered metrics in Prometheus text format.
///
/// Returns an explanatory comment line instead when the registry is not
/// initialized or encoding fails.
pub fn export_metrics() -> String {
    let Some(registry) = REGISTRY.get() else {
        return "# Metrics not initialized. Call init_metrics() first.\n".to_string();
    };

    let encoder = TextEncoder::new();
    let metric_families = registry.gather();

    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        return format!("# Error encoding metrics: {}\n", e);
    }

    String::from_utf8(buffer)
        .unwrap_or_else(|e| format!("# Error converting metrics to UTF-8: {}\n", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_metrics() {
        // Global state: a second registration in the same process is tolerated.
        let result = init_metrics();
        assert!(result.is_ok() || REGISTRY.get().is_some());
    }

    #[test]
    fn test_metrics_after_init() {
        let _ = init_metrics();

        let metrics = export_metrics();
        assert!(!metrics.is_empty());
        if REGISTRY.get().is_some() {
            assert!(!metrics.starts_with("# Error"));
        }
    }
}
