//! CLI command definitions for stream-fleet.
//!
//! Every command works on one stream and consumer group, taken from the
//! environment (see [`FleetConfig`]) and overridden by flags.

use std::collections::BTreeMap;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use clap::Parser;
use rand::RngExt;
use tracing::{info, warn};

use crate::config::FleetConfig;
use crate::consumer::BatchConsumer;
use crate::gateway::{BrokerGateway, RedisGateway};
use crate::metrics::{export_metrics, init_metrics};
use crate::monitor::{export_json, export_table, GroupMonitor};
use crate::scaling::ScalingAdvisor;

/// Batch consumption, health monitoring and scaling advice for Redis Streams
/// consumer groups.
#[derive(Parser)]
#[command(name = "stream-fleet")]
#[command(about = "Operate a fleet of batch consumers on a Redis stream")]
#[command(version)]
#[command(
    long_about = "stream-fleet runs batch consumers on a Redis Streams consumer group, watches their health, moves work away from stalled consumers and recommends scaling actions.\n\nConnection and group settings come from REDIS_URL, STREAM_NAME and CONSUMER_GROUP unless given as flags.\n\nExample usage:\n  stream-fleet produce --count 100\n  stream-fleet consume --batch-size 10\n  stream-fleet monitor --auto-cleanup"
)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,
}

/// Available CLI subcommands.
#[derive(clap::Subcommand)]
pub enum Commands {
    /// Append sample entries to the stream at a random pace.
    Produce(ProduceArgs),

    /// Consume the stream in batches, acknowledging every entry.
    Consume(ConsumeArgs),

    /// Report consumer health, optionally moving work off unhealthy consumers.
    Monitor(MonitorArgs),

    /// Report the utilization rate and the recommended scaling action.
    Scale(ScaleArgs),

    /// Run one monitor and scaling pass and print Prometheus metrics.
    Metrics(MetricsArgs),
}

/// Connection and group flags shared by every command.
#[derive(clap::Args, Debug, Clone, Default)]
pub struct BrokerArgs {
    /// Redis connection URL (overrides REDIS_URL).
    #[arg(long)]
    pub redis_url: Option<String>,

    /// Stream name (overrides STREAM_NAME).
    #[arg(short = 's', long)]
    pub stream: Option<String>,

    /// Consumer group (overrides CONSUMER_GROUP).
    #[arg(short = 'g', long)]
    pub group: Option<String>,
}

/// Arguments for `stream-fleet produce`.
#[derive(Parser, Debug)]
pub struct ProduceArgs {
    #[command(flatten)]
    pub broker: BrokerArgs,

    /// Number of entries to append (0 = until interrupted).
    #[arg(short = 'n', long, default_value = "0")]
    pub count: u64,

    /// Minimum pause between entries in milliseconds.
    #[arg(long, default_value = "100")]
    pub min_interval_ms: u64,

    /// Maximum pause between entries in milliseconds.
    #[arg(long, default_value = "500")]
    pub max_interval_ms: u64,
}

/// Arguments for `stream-fleet consume`.
#[derive(Parser, Debug)]
pub struct ConsumeArgs {
    #[command(flatten)]
    pub broker: BrokerArgs,

    /// Consumer id (default: process id plus a random suffix).
    #[arg(short = 'c', long)]
    pub consumer_id: Option<String>,

    /// Target batch size (overrides BATCH_SIZE).
    #[arg(short = 'b', long)]
    pub batch_size: Option<usize>,

    /// Batch assembly budget in milliseconds (overrides MAX_WAIT_TIME_MS).
    #[arg(long)]
    pub max_wait_ms: Option<u64>,

    /// Per-read block budget in milliseconds (overrides POLL_TIME_MS).
    #[arg(long)]
    pub poll_ms: Option<u64>,

    /// Number of batches to process (0 = until interrupted).
    #[arg(long, default_value = "0")]
    pub batches: u64,

    /// Minimum simulated processing time per entry in milliseconds.
    #[arg(long, default_value = "0")]
    pub process_min_ms: u64,

    /// Maximum simulated processing time per entry in milliseconds.
    #[arg(long, default_value = "0")]
    pub process_max_ms: u64,

    /// Stay registered in the group on exit.
    #[arg(long)]
    pub keep_registration: bool,
}

/// Arguments for `stream-fleet monitor`.
#[derive(Parser, Debug)]
pub struct MonitorArgs {
    #[command(flatten)]
    pub broker: BrokerArgs,

    /// Pending-count threshold (overrides BATCH_SIZE).
    #[arg(short = 'b', long)]
    pub batch_size: Option<u64>,

    /// Minimum idle time of reassigned entries in milliseconds (overrides MIN_WAIT_TIME_MS).
    #[arg(long)]
    pub min_wait_ms: Option<u64>,

    /// Idle threshold in milliseconds (overrides IDLE_WARNING_THRESHOLD_MS).
    #[arg(long)]
    pub idle_threshold_ms: Option<u64>,

    /// Move work off unhealthy consumers and remove them.
    #[arg(long)]
    pub auto_cleanup: bool,

    /// Run a single pass and exit.
    #[arg(long)]
    pub once: bool,

    /// Print one JSON object per consumer instead of a table.
    #[arg(long)]
    pub json: bool,

    /// Seconds between passes.
    #[arg(long, default_value = "2")]
    pub interval_secs: u64,
}

/// Arguments for `stream-fleet scale`.
#[derive(Parser, Debug)]
pub struct ScaleArgs {
    #[command(flatten)]
    pub broker: BrokerArgs,

    /// Scale-out threshold in percent (overrides SCALE_OUT_RATE).
    #[arg(long, allow_negative_numbers = true)]
    pub scale_out_rate: Option<f64>,

    /// Scale-in threshold in percent (overrides SCALE_IN_RATE).
    #[arg(long, allow_negative_numbers = true)]
    pub scale_in_rate: Option<f64>,

    /// Run a single pass and exit.
    #[arg(long)]
    pub once: bool,

    /// Seconds between passes.
    #[arg(long, default_value = "2")]
    pub interval_secs: u64,
}

/// Arguments for `stream-fleet metrics`.
#[derive(Parser, Debug)]
pub struct MetricsArgs {
    #[command(flatten)]
    pub broker: BrokerArgs,
}

/// Parse CLI arguments without running any command.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Parse CLI arguments and execute the command.
pub async fn run() -> anyhow::Result<()> {
    run_with_cli(parse_cli()).await
}

/// Run the CLI with the parsed arguments.
pub async fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Produce(args) => run_produce_command(args).await,
        Commands::Consume(args) => run_consume_command(args).await,
        Commands::Monitor(args) => run_monitor_command(args).await,
        Commands::Scale(args) => run_scale_command(args).await,
        Commands::Metrics(args) => run_metrics_command(args).await,
    }
}

/// Loads the environment configuration and applies the broker flags.
fn fleet_config(broker: &BrokerArgs) -> anyhow::Result<FleetConfig> {
    let mut config = FleetConfig::from_env()?;
    if let Some(redis_url) = &broker.redis_url {
        config.redis_url = redis_url.clone();
    }
    if let Some(stream) = &broker.stream {
        config.stream = stream.clone();
    }
    if let Some(group) = &broker.group {
        config.group = group.clone();
    }
    Ok(config)
}

async fn connect(config: &FleetConfig) -> anyhow::Result<Arc<dyn BrokerGateway>> {
    let gateway = RedisGateway::connect(&config.redis_url).await?;
    info!(redis_url = %config.redis_url, "Connected to Redis");
    Ok(Arc::new(gateway))
}

/// Random pause in `[min_ms, max_ms]`.
fn jitter(min_ms: u64, max_ms: u64) -> Duration {
    if max_ms <= min_ms {
        return Duration::from_millis(min_ms);
    }
    let mut rng = rand::rng();
    Duration::from_millis(rng.random_range(min_ms..=max_ms))
}

/// Sleeps for `pause`, returning false if interrupted first.
async fn pause_or_interrupt(pause: Duration) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(pause) => true,
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted");
            false
        }
    }
}

// ============================================================================
// Produce
// ============================================================================

async fn run_produce_command(args: ProduceArgs) -> anyhow::Result<()> {
    let config = fleet_config(&args.broker)?;
    config.validate()?;
    let gateway = connect(&config).await?;

    let mut iteration: u64 = 1;
    loop {
        let mut fields = BTreeMap::new();
        fields.insert("iteration".to_string(), iteration.to_string());
        fields.insert("message".to_string(), config.group.clone());
        fields.insert("produced_at".to_string(), Utc::now().to_rfc3339());

        let id = gateway.append(&config.stream, &fields).await?;
        println!("{iteration}. Added entry {id} to {}", config.stream);

        if args.count > 0 && iteration >= args.count {
            break;
        }
        iteration += 1;

        if !pause_or_interrupt(jitter(args.min_interval_ms, args.max_interval_ms)).await {
            break;
        }
    }

    Ok(())
}

// ============================================================================
// Consume
// ============================================================================

async fn run_consume_command(args: ConsumeArgs) -> anyhow::Result<()> {
    let mut config = fleet_config(&args.broker)?;
    if let Some(batch_size) = args.batch_size {
        config.batch_size = batch_size;
    }
    if let Some(ms) = args.max_wait_ms {
        config.max_wait_time = Duration::from_millis(ms);
    }
    if let Some(ms) = args.poll_ms {
        config.poll_time = Duration::from_millis(ms);
    }
    if args.keep_registration {
        config.cleanup_on_exit = false;
    }
    config.validate()?;

    let mut consumer_config = config.consumer_config();
    if let Some(consumer_id) = args.consumer_id {
        consumer_config = consumer_config.with_consumer_id(consumer_id);
    }

    let gateway = connect(&config).await?;
    let consumer = BatchConsumer::new(gateway, consumer_config).await?;
    info!(consumer_id = %consumer.consumer_id(), "Consuming");

    let mut processed_batches: u64 = 0;
    'batches: loop {
        let batch = tokio::select! {
            batch = consumer.get_items() => batch,
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break 'batches;
            }
        };

        for (i, entry) in batch.iter().enumerate() {
            println!(
                "{processed_batches}. Processing {}/{} {entry}",
                i + 1,
                batch.len()
            );
            let pause = jitter(args.process_min_ms, args.process_max_ms);
            if !pause.is_zero() && !pause_or_interrupt(pause).await {
                break 'batches;
            }
            if let Err(e) = consumer.remove_item_from_stream(entry.id).await {
                warn!(
                    entry_id = %entry.id,
                    error = %e,
                    "Acknowledge failed, entry will be redelivered"
                );
            }
        }

        processed_batches += 1;
        if args.batches > 0 && processed_batches >= args.batches {
            break;
        }
    }

    let lost = consumer.shutdown().await?;
    if lost > 0 {
        println!("Consumer left the group with {lost} unacknowledged entries");
    }
    Ok(())
}

// ============================================================================
// Monitor
// ============================================================================

async fn run_monitor_command(args: MonitorArgs) -> anyhow::Result<()> {
    let config = fleet_config(&args.broker)?;
    config.validate()?;

    let mut monitor_config = config.monitor_config();
    if let Some(batch_size) = args.batch_size {
        monitor_config = monitor_config.with_batch_size(batch_size);
    }
    if let Some(ms) = args.min_wait_ms {
        monitor_config = monitor_config.with_min_wait_time(Duration::from_millis(ms));
    }
    if let Some(ms) = args.idle_threshold_ms {
        monitor_config = monitor_config.with_idle_warning_threshold(Duration::from_millis(ms));
    }

    let gateway = connect(&config).await?;
    let mut monitor = GroupMonitor::new(gateway, monitor_config).await?;

    loop {
        let snapshots = monitor.collect(args.auto_cleanup).await?;
        if args.json {
            print!("{}", export_json(&snapshots)?);
        } else {
            export_table(&snapshots, &mut io::stdout())?;
        }

        if args.once || !pause_or_interrupt(Duration::from_secs(args.interval_secs)).await {
            break;
        }
    }

    Ok(())
}

// ============================================================================
// Scale
// ============================================================================

async fn run_scale_command(args: ScaleArgs) -> anyhow::Result<()> {
    let mut config = fleet_config(&args.broker)?;
    if let Some(rate) = args.scale_out_rate {
        config.scale_out_rate = rate;
    }
    if let Some(rate) = args.scale_in_rate {
        config.scale_in_rate = rate;
    }
    config.validate()?;

    let gateway = connect(&config).await?;
    let mut advisor = ScalingAdvisor::new(gateway, &config.stream, &config.group).await?;

    loop {
        advisor.collect_metrics().await?;
        let (rate, decision) = advisor
            .get_scale_decision(config.scale_out_rate, config.scale_in_rate)
            .await?;
        let metrics = advisor.last_metrics().unwrap_or_default();
        println!(
            "Consumers should be {decision} as backlog ({}) / pending ({}) rate is {rate}% with {} consumers",
            metrics.backlog, metrics.pending, metrics.consumers
        );

        if args.once || !pause_or_interrupt(Duration::from_secs(args.interval_secs)).await {
            break;
        }
    }

    Ok(())
}

// ============================================================================
// Metrics
// ============================================================================

async fn run_metrics_command(args: MetricsArgs) -> anyhow::Result<()> {
    let config = fleet_config(&args.broker)?;
    config.validate()?;
    init_metrics()?;

    let gateway = connect(&config).await?;

    let mut monitor = GroupMonitor::new(gateway.clone(), config.monitor_config()).await?;
    monitor.collect(false).await?;

    let mut advisor = ScalingAdvisor::new(gateway, &config.stream, &config.group).await?;
    advisor
        .get_scale_decision(config.scale_out_rate, config.scale_in_rate)
        .await?;

    print!("{}", export_metrics());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_parses() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_produce_defaults() {
        let cli = Cli::try_parse_from(["stream-fleet", "produce"]).expect("should parse");

        match cli.command {
            Commands::Produce(args) => {
                assert_eq!(args.count, 0);
                assert_eq!(args.min_interval_ms, 100);
                assert_eq!(args.max_interval_ms, 500);
                assert!(args.broker.stream.is_none());
            }
            _ => panic!("Expected Produce command"),
        }
        assert_eq!(cli.log_level, "info");
    }

    #[test]
    fn test_consume_with_options() {
        let cli = Cli::try_parse_from([
            "stream-fleet",
            "consume",
            "--stream",
            "orders",
            "-g",
            "billing",
            "-b",
            "10",
            "--max-wait-ms",
            "500",
            "--consumer-id",
            "worker-1",
            "--keep-registration",
            "--log-level",
            "debug",
        ])
        .expect("should parse");

        assert_eq!(cli.log_level, "debug");
        match cli.command {
            Commands::Consume(args) => {
                assert_eq!(args.broker.stream.as_deref(), Some("orders"));
                assert_eq!(args.broker.group.as_deref(), Some("billing"));
                assert_eq!(args.batch_size, Some(10));
                assert_eq!(args.max_wait_ms, Some(500));
                assert_eq!(args.consumer_id.as_deref(), Some("worker-1"));
                assert!(args.keep_registration);
                assert_eq!(args.batches, 0);
            }
            _ => panic!("Expected Consume command"),
        }
    }

    #[test]
    fn test_monitor_flags() {
        let cli = Cli::try_parse_from([
            "stream-fleet",
            "monitor",
            "--auto-cleanup",
            "--once",
            "--json",
            "--idle-threshold-ms",
            "5000",
        ])
        .expect("should parse");

        match cli.command {
            Commands::Monitor(args) => {
                assert!(args.auto_cleanup);
                assert!(args.once);
                assert!(args.json);
                assert_eq!(args.idle_threshold_ms, Some(5000));
                assert_eq!(args.interval_secs, 2);
            }
            _ => panic!("Expected Monitor command"),
        }
    }

    #[test]
    fn test_scale_accepts_negative_rates() {
        let cli = Cli::try_parse_from([
            "stream-fleet",
            "scale",
            "--scale-out-rate",
            "60",
            "--scale-in-rate",
            "-1",
            "--once",
        ])
        .expect("should parse");

        match cli.command {
            Commands::Scale(args) => {
                assert_eq!(args.scale_out_rate, Some(60.0));
                assert_eq!(args.scale_in_rate, Some(-1.0));
                assert!(args.once);
            }
            _ => panic!("Expected Scale command"),
        }
    }

    #[test]
    fn test_jitter_bounds() {
        assert_eq!(jitter(0, 0), Duration::ZERO);
        assert_eq!(jitter(50, 10), Duration::from_millis(50));
        for _ in 0..20 {
            let pause = jitter(100, 200);
            assert!(pause >= Duration::from_millis(100));
            assert!(pause <= Duration::from_millis(200));
        }
    }
}
