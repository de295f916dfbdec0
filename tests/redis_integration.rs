//! Integration tests against a live Redis server.
//!
//! Each test works on its own uniquely named stream and deletes it afterwards.
//! Run with: REDIS_URL=redis://localhost:6379 cargo test --test redis_integration -- --ignored

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use stream_fleet::consumer::{BatchConsumer, BatchConsumerConfig, BatchState};
use stream_fleet::gateway::{BrokerGateway, RedisGateway};
use stream_fleet::monitor::{GroupMonitor, GroupMonitorConfig, HealthStatus};
use stream_fleet::scaling::{ScaleDecision, ScalingAdvisor};
use stream_fleet::stream::{ReadSelector, StreamId};
use stream_fleet::GatewayError;

fn get_redis_url() -> String {
    std::env::var("REDIS_URL")
        .expect("REDIS_URL environment variable must be set for integration tests")
}

fn unique_stream() -> String {
    format!("stream-fleet-test-{}", uuid::Uuid::new_v4())
}

async fn create_gateway() -> Arc<RedisGateway> {
    Arc::new(
        RedisGateway::connect(&get_redis_url())
            .await
            .expect("Should connect to Redis"),
    )
}

async fn drop_stream(stream: &str) {
    let client = redis::Client::open(get_redis_url()).expect("Should parse REDIS_URL");
    let mut conn = client
        .get_multiplexed_async_connection()
        .await
        .expect("Should connect to Redis");
    let _: i64 = redis::cmd("DEL")
        .arg(stream)
        .query_async(&mut conn)
        .await
        .expect("DEL should succeed");
}

async fn seed(gateway: &RedisGateway, stream: &str, count: usize) -> Vec<StreamId> {
    let mut ids = Vec::with_capacity(count);
    for i in 0..count {
        let mut fields = BTreeMap::new();
        fields.insert("test".to_string(), format!("data{}", i + 1));
        ids.push(gateway.append(stream, &fields).await.expect("XADD should succeed"));
    }
    ids
}

#[tokio::test]
#[ignore] // Run with: cargo test --test redis_integration -- --ignored
async fn test_batch_roundtrip() {
    let gateway = create_gateway().await;
    let stream = unique_stream();
    let ids = seed(&gateway, &stream, 2).await;

    let consumer = BatchConsumer::new(
        gateway.clone(),
        BatchConsumerConfig::new(stream.as_str(), "test_group")
            .with_consumer_id("consumer-a")
            .with_batch_size(2)
            .with_max_wait_time(Duration::from_secs(2))
            .with_poll_time(Duration::from_millis(200)),
    )
    .await
    .expect("Should create consumer");

    let batch = consumer.get_items().await;
    assert_eq!(batch.state(), BatchState::Satisfied);
    let got: Vec<StreamId> = batch.iter().map(|e| e.id).collect();
    assert_eq!(got, ids);
    assert_eq!(batch.entries()[0].field("test"), Some("data1"));

    for id in &ids {
        consumer
            .remove_item_from_stream(*id)
            .await
            .expect("XACK should succeed");
    }

    let pending = gateway
        .list_pending(&stream, "test_group", None, None, 10, None)
        .await
        .expect("XPENDING should succeed");
    assert!(pending.is_empty(), "Acknowledged entries should leave the PEL");

    assert_eq!(consumer.shutdown().await.expect("Should shut down"), 0);
    drop_stream(&stream).await;
}

#[tokio::test]
#[ignore]
async fn test_blocking_read_waits_for_deadline() {
    let gateway = create_gateway().await;
    let stream = unique_stream();
    seed(&gateway, &stream, 1).await;

    let consumer = BatchConsumer::new(
        gateway.clone(),
        BatchConsumerConfig::new(stream.as_str(), "test_group")
            .with_batch_size(3)
            .with_max_wait_time(Duration::from_millis(500))
            .with_poll_time(Duration::from_millis(100)),
    )
    .await
    .expect("Should create consumer");

    let started = std::time::Instant::now();
    let batch = consumer.get_items().await;

    assert_eq!(batch.len(), 1);
    assert_eq!(batch.state(), BatchState::DeadlineExceeded);
    assert!(started.elapsed() >= Duration::from_millis(500));

    consumer
        .remove_item_from_stream(batch.entries()[0].id)
        .await
        .expect("XACK should succeed");
    consumer.shutdown().await.expect("Should shut down");
    drop_stream(&stream).await;
}

#[tokio::test]
#[ignore]
async fn test_missing_group_is_reported() {
    let gateway = create_gateway().await;
    let stream = unique_stream();
    seed(&gateway, &stream, 1).await;

    let result = gateway
        .read_group(
            &stream,
            "no_such_group",
            "consumer",
            ReadSelector::New,
            1,
            Duration::ZERO,
        )
        .await;
    assert!(
        matches!(result, Err(GatewayError::GroupNotFound { .. })),
        "Expected GroupNotFound, got {:?}",
        result
    );

    drop_stream(&stream).await;
}

#[tokio::test]
#[ignore]
async fn test_monitor_and_advisor() {
    let gateway = create_gateway().await;
    let stream = unique_stream();
    seed(&gateway, &stream, 3).await;

    let consumer = BatchConsumer::new(
        gateway.clone(),
        BatchConsumerConfig::new(stream.as_str(), "test_group")
            .with_consumer_id("slow")
            .with_batch_size(2)
            .with_max_wait_time(Duration::from_secs(1))
            .with_cleanup_on_exit(false),
    )
    .await
    .expect("Should create consumer");
    assert_eq!(consumer.get_items().await.len(), 2);

    let mut monitor = GroupMonitor::new(
        gateway.clone(),
        GroupMonitorConfig::new(stream.as_str(), "test_group").with_batch_size(1),
    )
    .await
    .expect("Should create monitor");
    let snapshots = monitor.collect(false).await.expect("Should collect");
    let slow = snapshots
        .iter()
        .find(|s| s.consumer_id == "slow")
        .expect("slow consumer should be listed");
    assert_eq!(slow.pending, 2);
    assert_eq!(slow.status, HealthStatus::PendingOverflow);

    let mut advisor = ScalingAdvisor::new(gateway.clone(), stream.as_str(), "test_group")
        .await
        .expect("Should create advisor");
    let metrics = advisor.collect_metrics().await.expect("Should collect metrics");
    assert_eq!((metrics.backlog, metrics.pending), (1, 2));
    let (rate, decision) = advisor
        .get_scale_decision(50.0, 10.0)
        .await
        .expect("Should decide");
    assert_eq!(rate, 50.0);
    assert_eq!(decision, ScaleDecision::Out);

    gateway
        .delete_group(&stream, "test_group")
        .await
        .expect("XGROUP DESTROY should succeed");
    drop_stream(&stream).await;
}
