//! Consumer health monitoring.
//!
//! A [`GroupMonitor`] scans every consumer group of a stream and classifies
//! each consumer:
//!
//! - `PendingOverflow` when it owns more entries than the batch size
//! - `IdleTimeout` when it has not read for longer than the idle threshold
//! - `Ok` otherwise
//!
//! When cleanup is enabled the pending entries of unhealthy consumers are
//! claimed onto the least loaded healthy consumer of the same group and the
//! unhealthy consumers are removed.
//!
//! # Example
//!
//! ```ignore
//! use std::io;
//! use stream_fleet::monitor::{export_table, GroupMonitor, GroupMonitorConfig};
//!
//! let mut monitor = GroupMonitor::new(gateway, GroupMonitorConfig::new("events", "workers")).await?;
//! let snapshots = monitor.collect(false).await?;
//! export_table(&snapshots, &mut io::stdout())?;
//! ```

pub mod config;
pub mod export;
pub mod group_monitor;
pub mod snapshot;

pub use config::GroupMonitorConfig;
pub use export::{export_json, export_table, render_table};
pub use group_monitor::{status_counts, GroupMonitor};
pub use snapshot::{CleanupReport, ConsumerSnapshot, HealthStatus};
