//! Redis Streams implementation of [`BrokerGateway`].
//!
//! Uses a `ConnectionManager` so a dropped connection is re-established
//! transparently on the next command. Each call clones the manager, which
//! is cheap and lets concurrent tasks share one gateway.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::streams::{
    StreamClaimReply, StreamId as RedisStreamId, StreamInfoConsumersReply,
    StreamInfoGroupsReply, StreamRangeReply, StreamReadOptions, StreamReadReply,
};
use redis::{AsyncCommands, RedisError};
use tracing::debug;

use super::BrokerGateway;
use crate::error::GatewayError;
use crate::stream::{
    ConsumerInfo, GroupInfo, PendingEntry, ReadSelector, StreamEntry, StreamId, StreamInfo,
};

/// Gateway speaking the Redis Streams commands.
#[derive(Clone)]
pub struct RedisGateway {
    /// Redis connection manager (handles reconnection automatically).
    redis: ConnectionManager,
}

impl RedisGateway {
    /// Connects to Redis.
    ///
    /// # Arguments
    ///
    /// * `redis_url` - Redis connection URL (e.g., "redis://localhost:6379")
    ///
    /// # Errors
    ///
    /// Returns `GatewayError::ConnectionFailed` if the connection fails.
    pub async fn connect(redis_url: &str) -> Result<Self, GatewayError> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| GatewayError::ConnectionFailed(e.to_string()))?;

        let redis = ConnectionManager::new(client)
            .await
            .map_err(|e| GatewayError::ConnectionFailed(e.to_string()))?;

        Ok(Self { redis })
    }

    /// Creates a gateway from an existing ConnectionManager.
    ///
    /// Useful when sharing a connection across multiple components.
    pub fn from_connection(redis: ConnectionManager) -> Self {
        Self { redis }
    }
}

/// Returns whether the error is Redis complaining about a missing key.
fn is_missing_key(err: &RedisError) -> bool {
    err.to_string().contains("no such key")
}

/// Returns whether the error is Redis complaining about a missing group.
fn is_missing_group(err: &RedisError) -> bool {
    err.code() == Some("NOGROUP")
}

fn convert_entry(raw: &RedisStreamId) -> Result<StreamEntry, GatewayError> {
    let id: StreamId = raw.id.parse()?;
    let mut fields = BTreeMap::new();
    for (key, value) in &raw.map {
        let value: String = redis::from_redis_value(value)?;
        fields.insert(key.clone(), value);
    }
    Ok(StreamEntry::new(id, fields))
}

fn bound(id: Option<StreamId>, open: &str) -> String {
    id.map(|id| id.to_string()).unwrap_or_else(|| open.to_string())
}

#[async_trait]
impl BrokerGateway for RedisGateway {
    async fn append(
        &self,
        stream: &str,
        fields: &BTreeMap<String, String>,
    ) -> Result<StreamId, GatewayError> {
        let mut conn = self.redis.clone();
        let items: Vec<(&str, &str)> = fields
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        let id: String = conn.xadd(stream, "*", items.as_slice()).await?;
        Ok(id.parse()?)
    }

    async fn ensure_group(
        &self,
        stream: &str,
        group: &str,
        start_id: StreamId,
        create_stream_if_missing: bool,
    ) -> Result<(), GatewayError> {
        let mut conn = self.redis.clone();
        let mut cmd = redis::cmd("XGROUP");
        cmd.arg("CREATE")
            .arg(stream)
            .arg(group)
            .arg(start_id.to_string());
        if create_stream_if_missing {
            cmd.arg("MKSTREAM");
        }

        match cmd.query_async::<_, ()>(&mut conn).await {
            Ok(()) => {
                debug!(stream = %stream, group = %group, "Consumer group created");
                Ok(())
            }
            Err(e) if e.code() == Some("BUSYGROUP") => {
                debug!(stream = %stream, group = %group, "Consumer group already exists");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
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
        let mut conn = self.redis.clone();

        let mut options = StreamReadOptions::default()
            .group(group, consumer)
            .count(max_count.max(1));
        // BLOCK 0 would wait forever, so a zero budget omits the option.
        if selector == ReadSelector::New && !block.is_zero() {
            options = options.block(block.as_millis().max(1) as usize);
        }

        let reply: Option<StreamReadReply> = conn
            .xread_options(&[stream], &[selector.as_token()], &options)
            .await
            .map_err(|e| {
                if is_missing_group(&e) {
                    GatewayError::GroupNotFound {
                        stream: stream.to_string(),
                        group: group.to_string(),
                    }
                } else {
                    e.into()
                }
            })?;

        let Some(reply) = reply else {
            return Ok(Vec::new());
        };

        reply
            .keys
            .iter()
            .filter(|key| key.key == stream)
            .flat_map(|key| key.ids.iter())
            .map(convert_entry)
            .collect()
    }

    async fn ack(&self, stream: &str, group: &str, id: StreamId) -> Result<u64, GatewayError> {
        let mut conn = self.redis.clone();
        let acked: u64 = conn.xack(stream, group, &[id.to_string()]).await?;
        Ok(acked)
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
        let mut conn = self.redis.clone();
        let mut cmd = redis::cmd("XPENDING");
        cmd.arg(stream)
            .arg(group)
            .arg(bound(min_id, "-"))
            .arg(bound(max_id, "+"))
            .arg(max_count);
        if let Some(consumer) = consumer {
            cmd.arg(consumer);
        }

        let rows: Vec<(String, String, u64, u64)> = cmd.query_async(&mut conn).await?;
        rows.into_iter()
            .map(|(id, consumer, idle_ms, delivery_count)| -> Result<_, GatewayError> {
                Ok(PendingEntry {
                    id: id.parse()?,
                    consumer,
                    idle_ms,
                    delivery_count,
                })
            })
            .collect()
    }

    async fn claim(
        &self,
        stream: &str,
        group: &str,
        target: &str,
        ids: &[StreamId],
        min_idle: Duration,
    ) -> Result<Vec<StreamEntry>, GatewayError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut conn = self.redis.clone();
        let ids: Vec<String> = ids.iter().map(StreamId::to_string).collect();
        let min_idle_ms = min_idle.as_millis() as u64;

        let reply: StreamClaimReply = conn
            .xclaim(stream, group, target, min_idle_ms, ids.as_slice())
            .await?;
        reply.ids.iter().map(convert_entry).collect()
    }

    async fn delete_consumer(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
    ) -> Result<u64, GatewayError> {
        let mut conn = self.redis.clone();
        let lost: u64 = conn.xgroup_delconsumer(stream, group, consumer).await?;
        Ok(lost)
    }

    async fn delete_group(&self, stream: &str, group: &str) -> Result<bool, GatewayError> {
        let mut conn = self.redis.clone();
        let destroyed: u64 = conn.xgroup_destroy(stream, group).await?;
        Ok(destroyed > 0)
    }

    async fn list_groups(&self, stream: &str) -> Result<Vec<GroupInfo>, GatewayError> {
        let mut conn = self.redis.clone();
        let reply: StreamInfoGroupsReply = match conn.xinfo_groups(stream).await {
            Ok(reply) => reply,
            Err(e) if is_missing_key(&e) => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        reply
            .groups
            .into_iter()
            .map(|group| -> Result<_, GatewayError> {
                Ok(GroupInfo {
                    name: group.name,
                    consumers: group.consumers as u64,
                    pending: group.pending as u64,
                    last_delivered_id: group.last_delivered_id.parse()?,
                })
            })
            .collect()
    }

    async fn list_consumers(
        &self,
        stream: &str,
        group: &str,
    ) -> Result<Vec<ConsumerInfo>, GatewayError> {
        let mut conn = self.redis.clone();
        let reply: StreamInfoConsumersReply =
            conn.xinfo_consumers(stream, group).await.map_err(|e| {
                if is_missing_group(&e) || is_missing_key(&e) {
                    GatewayError::GroupNotFound {
                        stream: stream.to_string(),
                        group: group.to_string(),
                    }
                } else {
                    e.into()
                }
            })?;

        Ok(reply
            .consumers
            .into_iter()
            .map(|consumer| ConsumerInfo {
                name: consumer.name,
                pending: consumer.pending as u64,
                idle_ms: consumer.idle as u64,
            })
            .collect())
    }

    async fn stream_info(&self, stream: &str) -> Result<StreamInfo, GatewayError> {
        let mut conn = self.redis.clone();
        // XINFO STREAM is parsed field by field: first-entry/last-entry are
        // nil on an empty stream, which the typed reply does not accept.
        let reply: HashMap<String, redis::Value> = match redis::cmd("XINFO")
            .arg("STREAM")
            .arg(stream)
            .query_async(&mut conn)
            .await
        {
            Ok(reply) => reply,
            Err(e) if is_missing_key(&e) => return Ok(StreamInfo::default()),
            Err(e) => return Err(e.into()),
        };

        let length: u64 = match reply.get("length") {
            Some(value) => redis::from_redis_value(value)?,
            None => return Err(GatewayError::InvalidReply("XINFO STREAM without length".into())),
        };
        let last_generated_id: String = match reply.get("last-generated-id") {
            Some(value) => redis::from_redis_value(value)?,
            None => {
                return Err(GatewayError::InvalidReply(
                    "XINFO STREAM without last-generated-id".into(),
                ))
            }
        };

        Ok(StreamInfo {
            length,
            last_generated_id: last_generated_id.parse()?,
        })
    }

    async fn stream_len(&self, stream: &str) -> Result<u64, GatewayError> {
        let mut conn = self.redis.clone();
        let len: u64 = conn.xlen(stream).await?;
        Ok(len)
    }

    async fn range(
        &self,
        stream: &str,
        min_id: StreamId,
        max_id: StreamId,
    ) -> Result<Vec<StreamEntry>, GatewayError> {
        let mut conn = self.redis.clone();
        let reply: StreamRangeReply = conn
            .xrange(stream, min_id.to_string(), max_id.to_string())
            .await?;
        reply.ids.iter().map(convert_entry).collect()
    }
}
