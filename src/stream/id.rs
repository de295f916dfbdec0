//! Stream entry identifiers.
//!
//! Brokers encode entry ids as `"<millis>-<seq>"`. The string form is only a
//! wire encoding; ordering and range arithmetic are done on the two integers.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error returned when a string is not a valid stream id.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid stream id '{0}': expected '<millis>-<seq>'")]
pub struct ParseStreamIdError(pub String);

/// Totally ordered identifier of a stream entry.
///
/// Ordering is by `millis` first and `seq` second, matching the order in
/// which the broker appends entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct StreamId {
    /// Millisecond timestamp part.
    pub millis: u64,
    /// Sequence number within the millisecond.
    pub seq: u64,
}

impl StreamId {
    /// The `0-0` id. A group whose last delivered id is `ZERO` has never
    /// delivered anything.
    pub const ZERO: StreamId = StreamId { millis: 0, seq: 0 };

    /// Creates a new id from its two parts.
    pub const fn new(millis: u64, seq: u64) -> Self {
        Self { millis, seq }
    }

    /// Returns whether this is the `0-0` id.
    pub fn is_zero(&self) -> bool {
        *self == Self::ZERO
    }

    /// Returns the smallest id strictly greater than this one.
    pub fn next(&self) -> Self {
        match self.seq.checked_add(1) {
            Some(seq) => Self::new(self.millis, seq),
            None => Self::new(self.millis.saturating_add(1), 0),
        }
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.millis, self.seq)
    }
}

impl FromStr for StreamId {
    type Err = ParseStreamIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ParseStreamIdError(s.to_string());
        let (millis, seq) = match s.split_once('-') {
            Some((millis, seq)) => (millis, seq),
            None => (s, "0"),
        };
        let millis = millis.trim().parse().map_err(|_| invalid())?;
        let seq = seq.trim().parse().map_err(|_| invalid())?;
        Ok(Self::new(millis, seq))
    }
}

impl From<StreamId> for String {
    fn from(id: StreamId) -> Self {
        id.to_string()
    }
}

impl TryFrom<String> for StreamId {
    type Error = ParseStreamIdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}
