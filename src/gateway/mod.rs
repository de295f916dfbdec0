//! Broker gateway abstraction.
//!
//! The consumer, monitor and scaling advisor never talk to a broker client
//! directly; they go through [`BrokerGateway`], which exposes the primitive
//! consumer-group operations of an append-only stream:
//!
//! | Operation          | Redis command                |
//! |--------------------|------------------------------|
//! | `append`           | `XADD`                       |
//! | `ensure_group`     | `XGROUP CREATE ... MKSTREAM` |
//! | `read_group`       | `XREADGROUP`                 |
//! | `ack`              | `XACK`                       |
//! | `list_pending`     | `XPENDING` (extended form)   |
//! | `claim`            | `XCLAIM`                     |
//! | `delete_consumer`  | `XGROUP DELCONSUMER`         |
//! | `delete_group`     | `XGROUP DESTROY`             |
//! | `list_groups`      | `XINFO GROUPS`               |
//! | `list_consumers`   | `XINFO CONSUMERS`            |
//! | `stream_info`      | `XINFO STREAM`               |
//! | `stream_len`       | `XLEN`                       |
//! | `range`            | `XRANGE`                     |
//!
//! Two implementations ship with the crate: [`RedisGateway`] for real
//! deployments and [`MemoryGateway`], an in-process broker with the same
//! competing-consumer semantics used by the test suites.

pub mod memory;
pub mod redis;

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::GatewayError;
use crate::stream::{
    ConsumerInfo, GroupInfo, PendingEntry, ReadSelector, StreamEntry, StreamId, StreamInfo,
};

pub use self::memory::MemoryGateway;
pub use self::redis::RedisGateway;

/// Primitive consumer-group operations offered by a stream broker.
///
/// Every call is bounded: `read_group` blocks for at most `block`, all other
/// operations return as soon as the broker answers.
#[async_trait]
pub trait BrokerGateway: Send + Sync {
    /// Appends an entry and returns the id assigned by the broker.
    async fn append(
        &self,
        stream: &str,
        fields: &BTreeMap<String, String>,
    ) -> Result<StreamId, GatewayError>;

    /// Creates `group` on `stream` starting after `start_id`.
    ///
    /// An already existing group is not an error.
    async fn ensure_group(
        &self,
        stream: &str,
        group: &str,
        start_id: StreamId,
        create_stream_if_missing: bool,
    ) -> Result<(), GatewayError>;

    /// Reads entries for `consumer` as a member of `group`.
    ///
    /// With [`ReadSelector::New`] the broker hands out never-delivered
    /// entries, adding them to the consumer's PEL, and may wait up to `block`
    /// for some to arrive. A zero `block` never waits. With
    /// [`ReadSelector::Pending`] the consumer's own PEL is returned and
    /// `block` is ignored.
    async fn read_group(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        selector: ReadSelector,
        max_count: usize,
        block: Duration,
    ) -> Result<Vec<StreamEntry>, GatewayError>;

    /// Acknowledges an entry. Returns how many entries left the PEL (0 when
    /// the id was unknown or already acknowledged).
    async fn ack(&self, stream: &str, group: &str, id: StreamId) -> Result<u64, GatewayError>;

    /// Lists pending entries of `group` in id order, optionally restricted to
    /// an id range and to a single consumer. `None` bounds are open.
    async fn list_pending(
        &self,
        stream: &str,
        group: &str,
        min_id: Option<StreamId>,
        max_id: Option<StreamId>,
        max_count: usize,
        consumer: Option<&str>,
    ) -> Result<Vec<PendingEntry>, GatewayError>;

    /// Transfers ownership of pending entries idle for at least `min_idle`
    /// to `target`, resetting their idle time. Returns the claimed entries.
    async fn claim(
        &self,
        stream: &str,
        group: &str,
        target: &str,
        ids: &[StreamId],
        min_idle: Duration,
    ) -> Result<Vec<StreamEntry>, GatewayError>;

    /// Removes a consumer from its group. Returns the number of pending
    /// entries it still owned, which are dropped from the PEL.
    async fn delete_consumer(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
    ) -> Result<u64, GatewayError>;

    /// Destroys a consumer group. Returns whether the group existed.
    async fn delete_group(&self, stream: &str, group: &str) -> Result<bool, GatewayError>;

    /// Lists the consumer groups of a stream. A missing stream has none.
    async fn list_groups(&self, stream: &str) -> Result<Vec<GroupInfo>, GatewayError>;

    /// Lists the consumers registered in a group.
    async fn list_consumers(
        &self,
        stream: &str,
        group: &str,
    ) -> Result<Vec<ConsumerInfo>, GatewayError>;

    /// Returns stream metadata. A missing stream reports as empty.
    async fn stream_info(&self, stream: &str) -> Result<StreamInfo, GatewayError>;

    /// Returns the number of entries stored in the stream.
    async fn stream_len(&self, stream: &str) -> Result<u64, GatewayError>;

    /// Returns the entries with ids in `[min_id, max_id]`.
    async fn range(
        &self,
        stream: &str,
        min_id: StreamId,
        max_id: StreamId,
    ) -> Result<Vec<StreamEntry>, GatewayError>;
}
