//! The batch consumer.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::config::BatchConsumerConfig;
use super::state::{BatchProgress, BatchState};
use crate::error::{ConsumerError, GatewayError};
use crate::gateway::BrokerGateway;
use crate::metrics::MetricsCollector;
use crate::stream::{ReadSelector, StreamEntry, StreamId};

/// Pause after an empty non-blocking read, so a zero `poll_time` does not
/// spin on the broker until the deadline.
const EMPTY_READ_PAUSE: Duration = Duration::from_millis(10);

/// Entries handed to the caller by one `get_items` call.
///
/// This is a transient view: nothing here is persisted, the entries stay in
/// the consumer's PEL until acknowledged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchResult {
    entries: Vec<StreamEntry>,
    state: BatchState,
    new_entries: usize,
}

impl BatchResult {
    /// Returns the entries in id order.
    pub fn entries(&self) -> &[StreamEntry] {
        &self.entries
    }

    /// Consumes the result, returning the entries.
    pub fn into_entries(self) -> Vec<StreamEntry> {
        self.entries
    }

    /// Returns an iterator over the entries.
    pub fn iter(&self) -> std::slice::Iter<'_, StreamEntry> {
        self.entries.iter()
    }

    /// Returns the number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns whether the batch is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// How the accumulation loop ended.
    pub fn state(&self) -> BatchState {
        self.state
    }

    /// Number of never-delivered entries obtained during this call.
    pub fn new_entries(&self) -> usize {
        self.new_entries
    }
}

impl IntoIterator for BatchResult {
    type Item = StreamEntry;
    type IntoIter = std::vec::IntoIter<StreamEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl<'a> IntoIterator for &'a BatchResult {
    type Item = &'a StreamEntry;
    type IntoIter = std::slice::Iter<'a, StreamEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

/// Consumes a stream in batches as one member of a consumer group.
///
/// One instance serves one logical worker. Two instances sharing a
/// `consumer_id` race on assignment counting; distinct ids may run fully in
/// parallel.
pub struct BatchConsumer {
    gateway: Arc<dyn BrokerGateway>,
    config: BatchConsumerConfig,
    metrics: MetricsCollector,
}

impl BatchConsumer {
    /// Creates a consumer, validating the configuration and making sure the
    /// group exists.
    ///
    /// # Errors
    ///
    /// Returns `ConsumerError::Config` before any broker call if the
    /// configuration is invalid, or `ConsumerError::Gateway` if the group
    /// cannot be created.
    pub async fn new(
        gateway: Arc<dyn BrokerGateway>,
        config: BatchConsumerConfig,
    ) -> Result<Self, ConsumerError> {
        config.validate()?;

        gateway
            .ensure_group(&config.stream, &config.group, StreamId::ZERO, true)
            .await?;

        info!(
            stream = %config.stream,
            group = %config.group,
            consumer_id = %config.consumer_id,
            batch_size = config.batch_size,
            max_wait_ms = config.max_wait_time.as_millis() as u64,
            poll_ms = config.poll_time.as_millis() as u64,
            "Batch consumer ready"
        );

        Ok(Self {
            gateway,
            config,
            metrics: MetricsCollector::new(),
        })
    }

    /// Returns this consumer's identity within the group.
    pub fn consumer_id(&self) -> &str {
        &self.config.consumer_id
    }

    /// Returns the consumer configuration.
    pub fn config(&self) -> &BatchConsumerConfig {
        &self.config
    }

    /// Assembles and returns the next batch.
    ///
    /// Entries still pending from earlier calls count toward the batch.
    /// New entries are read until the batch is full or `max_wait_time`
    /// has elapsed, and the consumer's PEL is then read back and returned,
    /// so nothing obtained along the way can be dropped. At most
    /// `batch_size` entries are returned; any further pending entries come
    /// with later calls.
    ///
    /// Broker failures never escape: a failed read counts as zero entries
    /// and is retried until the deadline.
    pub async fn get_items(&self) -> BatchResult {
        let started = Instant::now();
        let already_assigned = self.already_assigned().await;
        let mut progress = BatchProgress::start(
            self.config.batch_size,
            already_assigned,
            started,
            self.config.max_wait_time,
        );
        let mut new_entries = 0;

        let state = loop {
            let state = progress.state_at(Instant::now());
            debug!(
                consumer_id = %self.config.consumer_id,
                state = %state,
                assigned = progress.assigned(),
                batch_size = progress.batch_size(),
                "Batch progress"
            );
            if state.is_terminal() {
                break state;
            }

            match self.read_new(progress.requested()).await {
                Ok(received) => {
                    progress.record_read(received);
                    new_entries += received;
                    if received == 0 {
                        let pause = if self.config.poll_time.is_zero() {
                            EMPTY_READ_PAUSE.min(progress.remaining(Instant::now()))
                        } else {
                            Duration::ZERO
                        };
                        if pause.is_zero() {
                            tokio::task::yield_now().await;
                        } else {
                            tokio::time::sleep(pause).await;
                        }
                    }
                }
                Err(e) => {
                    warn!(
                        stream = %self.config.stream,
                        group = %self.config.group,
                        consumer_id = %self.config.consumer_id,
                        error = %e,
                        "Failed to read new entries, retrying within deadline"
                    );
                    self.metrics.record_read_error();
                    progress.record_read(0);

                    // Wait before retrying on error
                    let pause = self
                        .config
                        .poll_time
                        .min(progress.remaining(Instant::now()));
                    if pause.is_zero() {
                        tokio::task::yield_now().await;
                    } else {
                        tokio::time::sleep(pause).await;
                    }
                }
            }
        };

        let entries = self.owned_entries().await;
        let elapsed = started.elapsed();

        debug!(
            consumer_id = %self.config.consumer_id,
            state = %state,
            entries = entries.len(),
            new_entries = new_entries,
            reads = progress.reads(),
            elapsed_ms = elapsed.as_millis() as u64,
            "Batch assembled"
        );
        self.metrics
            .record_batch(entries.len(), &state.to_string(), elapsed.as_secs_f64());

        BatchResult {
            entries,
            state,
            new_entries,
        }
    }

    /// Acknowledges an entry, removing it from this consumer's PEL.
    ///
    /// Acknowledging an unknown or already acknowledged id is a no-op.
    ///
    /// # Errors
    ///
    /// Returns `ConsumerError::Ack` if the broker call fails. The entry then
    /// stays pending and will be delivered again.
    pub async fn remove_item_from_stream(&self, id: StreamId) -> Result<(), ConsumerError> {
        match self
            .gateway
            .ack(&self.config.stream, &self.config.group, id)
            .await
        {
            Ok(acked) => {
                if acked == 0 {
                    debug!(
                        consumer_id = %self.config.consumer_id,
                        entry_id = %id,
                        "Entry was not pending, nothing to acknowledge"
                    );
                }
                self.metrics.record_ack(true);
                Ok(())
            }
            Err(source) => {
                self.metrics.record_ack(false);
                Err(ConsumerError::Ack { id, source })
            }
        }
    }

    /// Shuts the consumer down.
    ///
    /// With `cleanup_on_exit` the consumer removes its own registration from
    /// the group and returns the number of entries it still owned; those
    /// entries are gone from the PEL and are reported as lost.
    ///
    /// # Errors
    ///
    /// Returns `ConsumerError::Gateway` if the registration cannot be removed.
    pub async fn shutdown(self) -> Result<u64, ConsumerError> {
        if !self.config.cleanup_on_exit {
            debug!(consumer_id = %self.config.consumer_id, "Leaving consumer registered");
            return Ok(0);
        }

        let lost = self
            .gateway
            .delete_consumer(
                &self.config.stream,
                &self.config.group,
                &self.config.consumer_id,
            )
            .await?;

        if lost > 0 {
            warn!(
                stream = %self.config.stream,
                group = %self.config.group,
                consumer_id = %self.config.consumer_id,
                lost = lost,
                "Consumer removed while still owning entries, entries lost"
            );
            self.metrics.record_data_loss(&self.config.group, lost);
        } else {
            info!(consumer_id = %self.config.consumer_id, "Consumer removed from group");
        }

        Ok(lost)
    }

    /// Counts entries this consumer already owns, capped at the batch size.
    async fn already_assigned(&self) -> usize {
        match self
            .gateway
            .list_pending(
                &self.config.stream,
                &self.config.group,
                None,
                None,
                self.config.batch_size,
                Some(&self.config.consumer_id),
            )
            .await
        {
            Ok(pending) => {
                debug!(
                    consumer_id = %self.config.consumer_id,
                    already_assigned = pending.len(),
                    "Entries already assigned to this consumer"
                );
                pending.len()
            }
            Err(e) => {
                warn!(
                    consumer_id = %self.config.consumer_id,
                    error = %e,
                    "Failed to list pending entries, assuming none"
                );
                self.metrics.record_read_error();
                0
            }
        }
    }

    /// Reads never-delivered entries and returns how many arrived.
    async fn read_new(&self, requested: usize) -> Result<usize, GatewayError> {
        let entries = self
            .gateway
            .read_group(
                &self.config.stream,
                &self.config.group,
                &self.config.consumer_id,
                ReadSelector::New,
                requested,
                self.config.poll_time,
            )
            .await?;
        debug!(
            consumer_id = %self.config.consumer_id,
            requested = requested,
            received = entries.len(),
            "Received new entries from stream"
        );
        Ok(entries.len())
    }

    /// Reads back the entries this consumer owns.
    async fn owned_entries(&self) -> Vec<StreamEntry> {
        match self
            .gateway
            .read_group(
                &self.config.stream,
                &self.config.group,
                &self.config.consumer_id,
                ReadSelector::Pending,
                self.config.batch_size,
                self.config.poll_time,
            )
            .await
        {
            Ok(entries) => entries,
            Err(e) => {
                // the entries stay pending and are returned by the next call
                warn!(
                    consumer_id = %self.config.consumer_id,
                    error = %e,
                    "Failed to read pending entries, returning an empty batch"
                );
                self.metrics.record_read_error();
                Vec::new()
            }
        }
    }
}

impl fmt::Debug for BatchConsumer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchConsumer")
            .field("stream", &self.config.stream)
            .field("group", &self.config.group)
            .field("consumer_id", &self.config.consumer_id)
            .field("batch_size", &self.config.batch_size)
            .field("max_wait_time", &self.config.max_wait_time)
            .field("poll_time", &self.config.poll_time)
            .finish()
    }
}
