//! Data model shared by the consumer, monitor and scaling advisor.
//!
//! A stream is an append-only log of [`StreamEntry`] values ordered by
//! [`StreamId`]. Consumer groups hand entries to their consumers and keep a
//! pending entry list (PEL) of everything delivered but not yet acknowledged.

pub mod entry;
pub mod id;

pub use entry::{ConsumerInfo, GroupInfo, PendingEntry, ReadSelector, StreamEntry, StreamInfo};
pub use id::{ParseStreamIdError, StreamId};
