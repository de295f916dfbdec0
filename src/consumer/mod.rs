//! Bounded-batch consumption from a consumer group.
//!
//! A [`BatchConsumer`] accumulates entries for one consumer identity until
//! either the batch is full or its wall-clock budget runs out, then returns
//! everything the consumer owns so the caller can process and acknowledge it.
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use stream_fleet::consumer::{BatchConsumer, BatchConsumerConfig};
//! use stream_fleet::gateway::RedisGateway;
//!
//! let gateway = Arc::new(RedisGateway::connect("redis://localhost:6379").await?);
//! let config = BatchConsumerConfig::new("orders", "billing").with_batch_size(10);
//! let consumer = BatchConsumer::new(gateway, config).await?;
//!
//! loop {
//!     let batch = consumer.get_items().await;
//!     for entry in batch.iter() {
//!         process(entry);
//!         consumer.remove_item_from_stream(entry.id).await?;
//!     }
//! }
//! ```

pub mod batch;
pub mod config;
pub mod state;

pub use batch::{BatchConsumer, BatchResult};
pub use config::BatchConsumerConfig;
pub use state::{BatchProgress, BatchState};
