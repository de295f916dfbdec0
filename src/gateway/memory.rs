//! In-process broker with Redis Streams consumer-group semantics.
//!
//! `MemoryGateway` keeps streams, groups and pending entry lists in memory.
//! It mirrors the behaviour the rest of the crate relies on:
//!
//! - new reads hand out entries after the group's last delivered id and add
//!   them to the reader's PEL
//! - reads with the pending selector return the reader's own PEL
//! - claims honour the minimum idle time and reset idle time
//! - deleting a consumer drops whatever it still owned and reports the count
//! - blocking reads wake up as soon as an entry is appended
//!
//! Consumer and group listings come back in name order, as Redis does.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use tokio::sync::Notify;
use tokio::time::Instant;

use super::BrokerGateway;
use crate::error::GatewayError;
use crate::stream::{
    ConsumerInfo, GroupInfo, PendingEntry, ReadSelector, StreamEntry, StreamId, StreamInfo,
};

#[derive(Debug, Default)]
struct MemoryStream {
    entries: BTreeMap<StreamId, BTreeMap<String, String>>,
    last_generated: StreamId,
    groups: BTreeMap<String, MemoryGroup>,
}

#[derive(Debug)]
struct MemoryGroup {
    last_delivered: StreamId,
    pel: BTreeMap<StreamId, PelRecord>,
    consumers: BTreeMap<String, Instant>,
}

#[derive(Debug)]
struct PelRecord {
    consumer: String,
    delivered_at: Instant,
    delivery_count: u64,
}

impl MemoryGroup {
    fn new(last_delivered: StreamId) -> Self {
        Self {
            last_delivered,
            pel: BTreeMap::new(),
            consumers: BTreeMap::new(),
        }
    }

    /// Registers the consumer if needed and marks it as seen now.
    fn touch(&mut self, consumer: &str, now: Instant) {
        self.consumers.insert(consumer.to_string(), now);
    }

    fn pending_of(&self, consumer: &str) -> u64 {
        self.pel.values().filter(|r| r.consumer == consumer).count() as u64
    }
}

/// In-memory [`BrokerGateway`] used by tests and local experiments.
#[derive(Debug, Default)]
pub struct MemoryGateway {
    streams: Mutex<HashMap<String, MemoryStream>>,
    appended: Notify,
}

impl MemoryGateway {
    /// Creates an empty broker.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, MemoryStream>> {
        self.streams.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn group_mut<'a>(
        streams: &'a mut HashMap<String, MemoryStream>,
        stream: &str,
        group: &str,
    ) -> Result<&'a mut MemoryGroup, GatewayError> {
        streams
            .get_mut(stream)
            .and_then(|s| s.groups.get_mut(group))
            .ok_or_else(|| GatewayError::GroupNotFound {
                stream: stream.to_string(),
                group: group.to_string(),
            })
    }

    fn deliver_new(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        max_count: usize,
    ) -> Result<Vec<StreamEntry>, GatewayError> {
        let now = Instant::now();
        let mut streams = self.lock();
        let stream_state = streams
            .get_mut(stream)
            .ok_or_else(|| GatewayError::GroupNotFound {
                stream: stream.to_string(),
                group: group.to_string(),
            })?;
        let group_state =
            stream_state
                .groups
                .get_mut(group)
                .ok_or_else(|| GatewayError::GroupNotFound {
                    stream: stream.to_string(),
                    group: group.to_string(),
                })?;

        group_state.touch(consumer, now);

        let start = group_state.last_delivered.next();
        let batch: Vec<StreamEntry> = stream_state
            .entries
            .range(start..)
            .take(max_count.max(1))
            .map(|(id, fields)| StreamEntry::new(*id, fields.clone()))
            .collect();

        for entry in &batch {
            group_state.pel.insert(
                entry.id,
                PelRecord {
                    consumer: consumer.to_string(),
                    delivered_at: now,
                    delivery_count: 1,
                },
            );
        }
        if let Some(last) = batch.last() {
            group_state.last_delivered = last.id;
        }

        Ok(batch)
    }

    fn deliver_pending(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        max_count: usize,
    ) -> Result<Vec<StreamEntry>, GatewayError> {
        let now = Instant::now();
        let mut streams = self.lock();
        let stream_state = streams
            .get_mut(stream)
            .ok_or_else(|| GatewayError::GroupNotFound {
                stream: stream.to_string(),
                group: group.to_string(),
            })?;
        let entries = &stream_state.entries;
        let group_state =
            stream_state
                .groups
                .get_mut(group)
                .ok_or_else(|| GatewayError::GroupNotFound {
                    stream: stream.to_string(),
                    group: group.to_string(),
                })?;

        group_state.touch(consumer, now);

        Ok(group_state
            .pel
            .iter()
            .filter(|(_, record)| record.consumer == consumer)
            .take(max_count.max(1))
            .map(|(id, _)| {
                // entries deleted from the stream come back without fields
                let fields = entries.get(id).cloned().unwrap_or_default();
                StreamEntry::new(*id, fields)
            })
            .collect())
    }
}

fn next_id(last: StreamId) -> StreamId {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default();
    if millis > last.millis {
        StreamId::new(millis, 0)
    } else {
        last.next()
    }
}

fn elapsed_ms(since: Instant, now: Instant) -> u64 {
    now.saturating_duration_since(since).as_millis() as u64
}

#[async_trait]
impl BrokerGateway for MemoryGateway {
    async fn append(
        &self,
        stream: &str,
        fields: &BTreeMap<String, String>,
    ) -> Result<StreamId, GatewayError> {
        let id = {
            let mut streams = self.lock();
            let state = streams.entry(stream.to_string()).or_default();
            let id = next_id(state.last_generated);
            state.entries.insert(id, fields.clone());
            state.last_generated = id;
            id
        };
        self.appended.notify_waiters();
        Ok(id)
    }

    async fn ensure_group(
        &self,
        stream: &str,
        group: &str,
        start_id: StreamId,
        create_stream_if_missing: bool,
    ) -> Result<(), GatewayError> {
        let mut streams = self.lock();
        if !streams.contains_key(stream) {
            if !create_stream_if_missing {
                return Err(GatewayError::StreamNotFound(stream.to_string()));
            }
            streams.insert(stream.to_string(), MemoryStream::default());
        }
        if let Some(state) = streams.get_mut(stream) {
            state
                .groups
                .entry(group.to_string())
                .or_insert_with(|| MemoryGroup::new(start_id));
        }
        Ok(())
    }

    async fn read_group(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        selector: ReadSelector,
        max_count: usize,
        block: Duration,
    ) -> Result<Vec<StreamEntry>, GatewayError> {
        if selector == ReadSelector::Pending {
            return self.deliver_pending(stream, group, consumer, max_count);
        }

        let deadline = Instant::now() + block;
        loop {
            // Register for wake-ups before looking so an append racing with
            // the check is not missed.
            let appended = self.appended.notified();
            let batch = self.deliver_new(stream, group, consumer, max_count)?;
            if !batch.is_empty() || block.is_zero() {
                return Ok(batch);
            }

            let now = Instant::now();
            if now >= deadline {
                return Ok(batch);
            }
            if tokio::time::timeout(deadline - now, appended).await.is_err() {
                return Ok(Vec::new());
            }
        }
    }

    async fn ack(&self, stream: &str, group: &str, id: StreamId) -> Result<u64, GatewayError> {
        let mut streams = self.lock();
        let group_state = Self::group_mut(&mut streams, stream, group)?;
        Ok(u64::from(group_state.pel.remove(&id).is_some()))
    }

    async fn list_pending(
        &self,
        stream: &str,
        group: &str,
        min_id: Option<StreamId>,
        max_id: Option<StreamId>,
        max_count: usize,
        consumer: Option<&str>,
    ) -> Result<Vec<PendingEntry>, GatewayError> {
        let now = Instant::now();
        let mut streams = self.lock();
        let group_state = Self::group_mut(&mut streams, stream, group)?;
        let min_id = min_id.unwrap_or(StreamId::ZERO);
        let max_id = max_id.unwrap_or(StreamId::new(u64::MAX, u64::MAX));
        if min_id > max_id {
            return Ok(Vec::new());
        }

        Ok(group_state
            .pel
            .range(min_id..=max_id)
            .filter(|(_, record)| consumer.map_or(true, |c| record.consumer == c))
            .take(max_count)
            .map(|(id, record)| PendingEntry {
                id: *id,
                consumer: record.consumer.clone(),
                idle_ms: elapsed_ms(record.delivered_at, now),
                delivery_count: record.delivery_count,
            })
            .collect())
    }

    async fn claim(
        &self,
        stream: &str,
        group: &str,
        target: &str,
        ids: &[StreamId],
        min_idle: Duration,
    ) -> Result<Vec<StreamEntry>, GatewayError> {
        let now = Instant::now();
        let mut streams = self.lock();
        let stream_state = streams
            .get_mut(stream)
            .ok_or_else(|| GatewayError::GroupNotFound {
                stream: stream.to_string(),
                group: group.to_string(),
            })?;
        let entries = &stream_state.entries;
        let group_state =
            stream_state
                .groups
                .get_mut(group)
                .ok_or_else(|| GatewayError::GroupNotFound {
                    stream: stream.to_string(),
                    group: group.to_string(),
                })?;

        group_state
            .consumers
            .entry(target.to_string())
            .or_insert(now);

        let mut claimed = Vec::new();
        for id in ids {
            let Some(record) = group_state.pel.get_mut(id) else {
                continue;
            };
            if now.saturating_duration_since(record.delivered_at) < min_idle {
                continue;
            }
            record.consumer = target.to_string();
            record.delivered_at = now;
            record.delivery_count += 1;
            if let Some(fields) = entries.get(id) {
                claimed.push(StreamEntry::new(*id, fields.clone()));
            }
        }
        Ok(claimed)
    }

    async fn delete_consumer(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
    ) -> Result<u64, GatewayError> {
        let mut streams = self.lock();
        let group_state = Self::group_mut(&mut streams, stream, group)?;
        if group_state.consumers.remove(consumer).is_none() {
            return Ok(0);
        }
        let before = group_state.pel.len();
        group_state.pel.retain(|_, record| record.consumer != consumer);
        Ok((before - group_state.pel.len()) as u64)
    }

    async fn delete_group(&self, stream: &str, group: &str) -> Result<bool, GatewayError> {
        let mut streams = self.lock();
        Ok(streams
            .get_mut(stream)
            .map(|state| state.groups.remove(group).is_some())
            .unwrap_or(false))
    }

    async fn list_groups(&self, stream: &str) -> Result<Vec<GroupInfo>, GatewayError> {
        let streams = self.lock();
        let Some(state) = streams.get(stream) else {
            return Ok(Vec::new());
        };
        Ok(state
            .groups
            .iter()
            .map(|(name, group)| GroupInfo {
                name: name.clone(),
                consumers: group.consumers.len() as u64,
                pending: group.pel.len() as u64,
                last_delivered_id: group.last_delivered,
            })
            .collect())
    }

    async fn list_consumers(
        &self,
        stream: &str,
        group: &str,
    ) -> Result<Vec<ConsumerInfo>, GatewayError> {
        let now = Instant::now();
        let mut streams = self.lock();
        let group_state = Self::group_mut(&mut streams, stream, group)?;
        Ok(group_state
            .consumers
            .iter()
            .map(|(name, seen_at)| ConsumerInfo {
                name: name.clone(),
                pending: group_state.pending_of(name),
                idle_ms: elapsed_ms(*seen_at, now),
            })
            .collect())
    }

    async fn stream_info(&self, stream: &str) -> Result<StreamInfo, GatewayError> {
        let streams = self.lock();
        Ok(streams
            .get(stream)
            .map(|state| StreamInfo {
                length: state.entries.len() as u64,
                last_generated_id: state.last_generated,
            })
            .unwrap_or_default())
    }

    async fn stream_len(&self, stream: &str) -> Result<u64, GatewayError> {
        let streams = self.lock();
        Ok(streams
            .get(stream)
            .map(|state| state.entries.len() as u64)
            .unwrap_or(0))
    }

    async fn range(
        &self,
        stream: &str,
        min_id: StreamId,
        max_id: StreamId,
    ) -> Result<Vec<StreamEntry>, GatewayError> {
        if min_id > max_id {
            return Ok(Vec::new());
        }
        let streams = self.lock();
        Ok(streams
            .get(stream)
            .map(|state| {
                state
                    .entries
                    .range(min_id..=max_id)
                    .map(|(id, fields)| StreamEntry::new(*id, fields.clone()))
                    .collect()
            })
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const STREAM: &str = "memory_stream";
    const GROUP: &str = "memory_group";

    fn fields(value: &str) -> BTreeMap<String, String> {
        let mut fields = BTreeMap::new();
        fields.insert("test".to_string(), value.to_string());
        fields
    }

    async fn seeded(count: usize) -> MemoryGateway {
        let gateway = MemoryGateway::new();
        gateway
            .ensure_group(STREAM, GROUP, StreamId::ZERO, true)
            .await
            .expect("group created");
        for i in 0..count {
            gateway
                .append(STREAM, &fields(&format!("data{}", i + 1)))
                .await
                .expect("append");
        }
        gateway
    }

    #[tokio::test]
    async fn test_append_ids_strictly_increase() {
        let gateway = seeded(0).await;
        let mut last = StreamId::ZERO;
        for _ in 0..50 {
            let id = gateway.append(STREAM, &fields("x")).await.expect("append");
            assert!(id > last);
            last = id;
        }
        let info = gateway.stream_info(STREAM).await.expect("info");
        assert_eq!(info.length, 50);
        assert_eq!(info.last_generated_id, last);
    }

    #[tokio::test]
    async fn test_new_reads_are_competing() {
        let gateway = seeded(3).await;
        let a = gateway
            .read_group(STREAM, GROUP, "a", ReadSelector::New, 2, Duration::ZERO)
            .await
            .expect("read");
        let b = gateway
            .read_group(STREAM, GROUP, "b", ReadSelector::New, 2, Duration::ZERO)
            .await
            .expect("read");

        assert_eq!(a.len(), 2);
        assert_eq!(b.len(), 1);
        assert!(a.iter().all(|e| e.id < b[0].id));

        let groups = gateway.list_groups(STREAM).await.expect("groups");
        assert_eq!(groups[0].pending, 3);
        assert_eq!(groups[0].consumers, 2);
        assert_eq!(groups[0].last_delivered_id, b[0].id);
    }

    #[tokio::test]
    async fn test_pending_read_returns_own_pel() {
        let gateway = seeded(2).await;
        gateway
            .read_group(STREAM, GROUP, "a", ReadSelector::New, 1, Duration::ZERO)
            .await
            .expect("read");
        let own = gateway
            .read_group(STREAM, GROUP, "a", ReadSelector::Pending, 10, Duration::ZERO)
            .await
            .expect("read");
        let other = gateway
            .read_group(STREAM, GROUP, "b", ReadSelector::Pending, 10, Duration::ZERO)
            .await
            .expect("read");

        assert_eq!(own.len(), 1);
        assert_eq!(own[0].field("test"), Some("data1"));
        assert!(other.is_empty());
    }

    #[tokio::test]
    async fn test_ack_is_idempotent() {
        let gateway = seeded(1).await;
        let batch = gateway
            .read_group(STREAM, GROUP, "a", ReadSelector::New, 1, Duration::ZERO)
            .await
            .expect("read");
        let id = batch[0].id;

        assert_eq!(gateway.ack(STREAM, GROUP, id).await.expect("ack"), 1);
        assert_eq!(gateway.ack(STREAM, GROUP, id).await.expect("ack"), 0);
        assert_eq!(
            gateway
                .ack(STREAM, GROUP, StreamId::new(1, 1))
                .await
                .expect("ack"),
            0
        );
    }

    #[tokio::test]
    async fn test_claim_respects_min_idle() {
        let gateway = seeded(1).await;
        let batch = gateway
            .read_group(STREAM, GROUP, "a", ReadSelector::New, 1, Duration::ZERO)
            .await
            .expect("read");
        let ids = [batch[0].id];

        let claimed = gateway
            .claim(STREAM, GROUP, "b", &ids, Duration::from_secs(60))
            .await
            .expect("claim");
        assert!(claimed.is_empty());

        tokio::time::sleep(Duration::from_millis(20)).await;
        let claimed = gateway
            .claim(STREAM, GROUP, "b", &ids, Duration::from_millis(10))
            .await
            .expect("claim");
        assert_eq!(claimed.len(), 1);

        let pending = gateway
            .list_pending(STREAM, GROUP, None, None, 10, None)
            .await
            .expect("pending");
        assert_eq!(pending[0].consumer, "b");
        assert_eq!(pending[0].delivery_count, 2);
    }

    #[tokio::test]
    async fn test_delete_consumer_reports_lost_entries() {
        let gateway = seeded(2).await;
        gateway
            .read_group(STREAM, GROUP, "a", ReadSelector::New, 2, Duration::ZERO)
            .await
            .expect("read");

        let lost = gateway
            .delete_consumer(STREAM, GROUP, "a")
            .await
            .expect("delete");
        assert_eq!(lost, 2);
        assert!(gateway
            .list_consumers(STREAM, GROUP)
            .await
            .expect("consumers")
            .is_empty());
        assert_eq!(
            gateway
                .delete_consumer(STREAM, GROUP, "a")
                .await
                .expect("delete"),
            0
        );
    }

    #[tokio::test]
    async fn test_blocking_read_wakes_on_append() {
        let gateway = std::sync::Arc::new(seeded(0).await);
        let reader = {
            let gateway = gateway.clone();
            tokio::spawn(async move {
                gateway
                    .read_group(
                        STREAM,
                        GROUP,
                        "a",
                        ReadSelector::New,
                        1,
                        Duration::from_secs(5),
                    )
                    .await
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        gateway.append(STREAM, &fields("late")).await.expect("append");

        let batch = reader.await.expect("join").expect("read");
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].field("test"), Some("late"));
    }

    #[tokio::test]
    async fn test_blocking_read_times_out() {
        let gateway = seeded(0).await;
        let started = Instant::now();
        let batch = gateway
            .read_group(
                STREAM,
                GROUP,
                "a",
                ReadSelector::New,
                1,
                Duration::from_millis(30),
            )
            .await
            .expect("read");
        assert!(batch.is_empty());
        assert!(started.elapsed() >= Duration::from_millis(30));
    }

    #[tokio::test]
    async fn test_missing_group_is_reported() {
        let gateway = MemoryGateway::new();
        let err = gateway
            .read_group(STREAM, GROUP, "a", ReadSelector::New, 1, Duration::ZERO)
            .await
            .expect_err("group missing");
        assert!(matches!(err, GatewayError::GroupNotFound { .. }));
        assert!(gateway.list_groups(STREAM).await.expect("groups").is_empty());
        assert_eq!(
            gateway.stream_info(STREAM).await.expect("info"),
            StreamInfo::default()
        );
    }

    #[tokio::test]
    async fn test_range_is_inclusive() {
        let gateway = seeded(3).await;
        let all = gateway
            .range(STREAM, StreamId::ZERO, StreamId::new(u64::MAX, u64::MAX))
            .await
            .expect("range");
        assert_eq!(all.len(), 3);

        let tail = gateway
            .range(STREAM, all[1].id, all[2].id)
            .await
            .expect("range");
        assert_eq!(tail.len(), 2);
    }
}
