//! Consumer health scanning and reassignment of stalled work.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use super::config::GroupMonitorConfig;
use super::snapshot::{CleanupReport, ConsumerSnapshot, HealthStatus};
use crate::error::MonitorError;
use crate::gateway::BrokerGateway;
use crate::metrics::MetricsCollector;
use crate::stream::StreamId;

/// Healthy consumer with the fewest pending entries seen so far in a group.
#[derive(Debug, Clone, PartialEq, Eq)]
struct ReassignTarget {
    consumer_id: String,
    pending: u64,
}

/// An unhealthy consumer and the pending count observed when it was scanned.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Unhealthy {
    consumer_id: String,
    pending: u64,
}

/// Unhealthy consumers and the reassignment target of one group.
#[derive(Debug, Clone, Default)]
struct GroupScan {
    unhealthy: Vec<Unhealthy>,
    target: Option<ReassignTarget>,
}

impl GroupScan {
    /// Offers a healthy consumer as reassignment target. The first consumer
    /// with the lowest pending count wins; later equal counts do not replace it.
    fn offer(&mut self, consumer_id: &str, pending: u64) {
        let better = match &self.target {
            None => true,
            Some(current) => pending < current.pending,
        };
        if better {
            self.target = Some(ReassignTarget {
                consumer_id: consumer_id.to_string(),
                pending,
            });
        }
    }
}

/// Watches every consumer group of a stream.
///
/// Each [`collect`](Self::collect) pass recomputes the health of every
/// registered consumer. With cleanup enabled, entries owned by unhealthy
/// consumers are claimed onto the least loaded healthy consumer of the same
/// group and the unhealthy registrations are removed.
pub struct GroupMonitor {
    gateway: Arc<dyn BrokerGateway>,
    config: GroupMonitorConfig,
    metrics: MetricsCollector,
    snapshots: Vec<ConsumerSnapshot>,
    scans: Vec<(String, GroupScan)>,
}

impl GroupMonitor {
    /// Creates a monitor, making sure the configured group exists.
    ///
    /// # Errors
    ///
    /// Returns `MonitorError::Config` if the configuration is invalid, or
    /// `MonitorError::Gateway` if the group cannot be created.
    pub async fn new(
        gateway: Arc<dyn BrokerGateway>,
        config: GroupMonitorConfig,
    ) -> Result<Self, MonitorError> {
        config.validate()?;

        gateway
            .ensure_group(&config.stream, &config.group, StreamId::ZERO, true)
            .await?;

        info!(
            stream = %config.stream,
            group = %config.group,
            batch_size = config.batch_size,
            min_wait_ms = config.min_wait_time.as_millis() as u64,
            idle_threshold_ms = config.idle_warning_threshold.as_millis() as u64,
            "Group monitor ready"
        );

        Ok(Self {
            gateway,
            config,
            metrics: MetricsCollector::new(),
            snapshots: Vec::new(),
            scans: Vec::new(),
        })
    }

    /// Returns the monitor configuration.
    pub fn config(&self) -> &GroupMonitorConfig {
        &self.config
    }

    /// Snapshots taken by the last `collect` pass.
    pub fn snapshots(&self) -> &[ConsumerSnapshot] {
        &self.snapshots
    }

    /// Scans every group with registered consumers and returns one snapshot
    /// per consumer, in broker order.
    ///
    /// With `auto_cleanup` false the pass only reads broker state and can be
    /// repeated freely. With `auto_cleanup` true, unhealthy consumers are
    /// cleaned up afterwards in every group that has a healthy consumer to
    /// take over their entries.
    ///
    /// # Errors
    ///
    /// Returns `MonitorError::Gateway` if the broker cannot be queried.
    pub async fn collect(
        &mut self,
        auto_cleanup: bool,
    ) -> Result<Vec<ConsumerSnapshot>, MonitorError> {
        let mut snapshots = Vec::new();
        let mut scans = Vec::new();

        for group in self.gateway.list_groups(&self.config.stream).await? {
            if group.consumers == 0 {
                continue;
            }

            let mut scan = GroupScan::default();
            for consumer in self
                .gateway
                .list_consumers(&self.config.stream, &group.name)
                .await?
            {
                let status = HealthStatus::classify(
                    consumer.pending,
                    consumer.idle_ms,
                    self.config.batch_size,
                    self.config.idle_warning_threshold,
                );

                if status.is_healthy() {
                    scan.offer(&consumer.name, consumer.pending);
                } else {
                    debug!(
                        group = %group.name,
                        consumer_id = %consumer.name,
                        pending = consumer.pending,
                        idle_ms = consumer.idle_ms,
                        status = %status,
                        "Unhealthy consumer"
                    );
                    scan.unhealthy.push(Unhealthy {
                        consumer_id: consumer.name.clone(),
                        pending: consumer.pending,
                    });
                }

                self.metrics.record_consumer_status(
                    &group.name,
                    &consumer.name,
                    consumer.pending,
                    consumer.idle_ms,
                    status.is_healthy(),
                );

                snapshots.push(ConsumerSnapshot {
                    group: group.name.clone(),
                    consumer_id: consumer.name,
                    idle_ms: consumer.idle_ms,
                    pending: consumer.pending,
                    status,
                });
            }
            scans.push((group.name, scan));
        }

        self.snapshots = snapshots;
        self.scans = scans;

        if auto_cleanup {
            self.cleanup().await?;
        } else {
            debug!(stream = %self.config.stream, "Auto cleanup disabled");
        }

        Ok(self.snapshots.clone())
    }

    /// Reassigns the work of the unhealthy consumers found by the last
    /// `collect` pass and removes them from their groups.
    ///
    /// Groups without unhealthy consumers, or without a healthy consumer to
    /// take over, are left untouched.
    ///
    /// # Errors
    ///
    /// Returns `MonitorError::Gateway` if a broker call fails. Consumers
    /// handled before the failure stay cleaned up.
    pub async fn cleanup(&self) -> Result<CleanupReport, MonitorError> {
        let mut report = CleanupReport::default();

        for (group, scan) in &self.scans {
            if scan.unhealthy.is_empty() {
                debug!(group = %group, "No cleanup, as no unhealthy consumers");
                continue;
            }
            let Some(target) = &scan.target else {
                debug!(group = %group, "No cleanup, as no healthy consumer to assign");
                continue;
            };

            let mut group_report = CleanupReport::default();
            for unhealthy in &scan.unhealthy {
                let outcome = self
                    .cleanup_consumer(group, &unhealthy.consumer_id, unhealthy.pending, target)
                    .await?;
                group_report.merge(outcome);
            }

            self.metrics.record_cleanup(
                group,
                group_report.consumers_removed,
                group_report.entries_claimed,
            );
            report.merge(group_report);
        }

        if report.consumers_removed > 0 || report.entries_claimed > 0 {
            info!(
                stream = %self.config.stream,
                consumers_removed = report.consumers_removed,
                entries_claimed = report.entries_claimed,
                entries_lost = report.entries_lost,
                "Cleanup finished"
            );
        }

        Ok(report)
    }

    /// Moves one consumer's pending entries onto `target`, then deletes it.
    ///
    /// Entries younger than `min_wait_time` are not claimed. The registration
    /// is deleted regardless, and whatever it still owned is reported lost.
    async fn cleanup_consumer(
        &self,
        group: &str,
        consumer_id: &str,
        pending: u64,
        target: &ReassignTarget,
    ) -> Result<CleanupReport, MonitorError> {
        let stream = &self.config.stream;
        let mut report = CleanupReport::default();

        let pending_entries = if pending > 0 {
            self.gateway
                .list_pending(
                    stream,
                    group,
                    None,
                    None,
                    pending as usize,
                    Some(consumer_id),
                )
                .await?
        } else {
            Vec::new()
        };

        if !pending_entries.is_empty() {
            let ids: Vec<StreamId> = pending_entries.iter().map(|p| p.id).collect();
            debug!(
                group = %group,
                from = %consumer_id,
                to = %target.consumer_id,
                entries = ids.len(),
                "Moving pending entries"
            );
            let claimed = self
                .gateway
                .claim(
                    stream,
                    group,
                    &target.consumer_id,
                    &ids,
                    self.config.min_wait_time,
                )
                .await?;
            report.entries_claimed = claimed.len() as u64;

            if claimed.len() < ids.len() {
                warn!(
                    group = %group,
                    consumer_id = %consumer_id,
                    claimed = claimed.len(),
                    listed = ids.len(),
                    "Some entries are too recent to move"
                );
            }
        }

        let lost = self
            .gateway
            .delete_consumer(stream, group, consumer_id)
            .await?;
        report.consumers_removed = 1;
        report.entries_lost = lost;

        if lost > 0 {
            error!(
                stream = %stream,
                group = %group,
                consumer_id = %consumer_id,
                lost = lost,
                "Consumer deleted while still owning entries, entries lost"
            );
            self.metrics.record_data_loss(group, lost);
        } else {
            debug!(group = %group, consumer_id = %consumer_id, "Consumer removed");
        }

        Ok(report)
    }

    /// Name of the reassignment target chosen for `group` by the last pass.
    pub fn reassignment_target(&self, group: &str) -> Option<&str> {
        self.scans
            .iter()
            .find(|(name, _)| name == group)
            .and_then(|(_, scan)| scan.target.as_ref())
            .map(|target| target.consumer_id.as_str())
    }

    /// Whether the last pass found any unhealthy consumer.
    pub fn has_unhealthy(&self) -> bool {
        self.scans.iter().any(|(_, scan)| !scan.unhealthy.is_empty())
    }
}

impl fmt::Debug for GroupMonitor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GroupMonitor")
            .field("config", &self.config)
            .field("snapshots", &self.snapshots.len())
            .finish()
    }
}

/// Per-status consumer counts of a snapshot list.
pub fn status_counts(snapshots: &[ConsumerSnapshot]) -> HashMap<HealthStatus, usize> {
    let mut counts = HashMap::new();
    for snapshot in snapshots {
        *counts.entry(snapshot.status).or_insert(0) += 1;
    }
    counts
}
