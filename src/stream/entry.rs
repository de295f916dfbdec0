//! Entries, pending entries and the introspection records reported by the broker.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::id::StreamId;

/// A single entry of a stream.
///
/// Entries are immutable once appended. `fields` keeps a deterministic key
/// order so entries compare and print the same way everywhere.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamEntry {
    /// Id assigned by the broker on append.
    pub id: StreamId,
    /// Field/value pairs of the entry.
    pub fields: BTreeMap<String, String>,
}

impl StreamEntry {
    /// Creates a new entry.
    pub fn new(id: StreamId, fields: BTreeMap<String, String>) -> Self {
        Self { id, fields }
    }

    /// Returns the value of a field, if present.
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }
}

impl fmt::Display for StreamEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "id: {}, content: {{", self.id)?;
        for (i, (key, value)) in self.fields.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}: {}", key, value)?;
        }
        write!(f, "}}")
    }
}

/// An entry that was delivered to a consumer and not acknowledged yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingEntry {
    /// Id of the delivered entry.
    pub id: StreamId,
    /// Consumer currently owning the entry.
    pub consumer: String,
    /// Milliseconds since the entry was last delivered or claimed.
    pub idle_ms: u64,
    /// Number of times the entry has been delivered.
    pub delivery_count: u64,
}

/// Per-consumer state as reported by group introspection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsumerInfo {
    /// Consumer name, unique within its group.
    pub name: String,
    /// Number of entries in the consumer's PEL.
    pub pending: u64,
    /// Milliseconds since the consumer last interacted with the group.
    pub idle_ms: u64,
}

/// Per-group state as reported by stream introspection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupInfo {
    /// Group name.
    pub name: String,
    /// Number of registered consumers.
    pub consumers: u64,
    /// Total number of pending entries across all consumers.
    pub pending: u64,
    /// Id of the last entry handed out to any consumer; `0-0` if none yet.
    pub last_delivered_id: StreamId,
}

/// Stream-level metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StreamInfo {
    /// Number of entries currently stored.
    pub length: u64,
    /// Id of the most recently appended entry; `0-0` for a stream that never
    /// received an entry.
    pub last_generated_id: StreamId,
}

/// Which entries a group read should return.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReadSelector {
    /// Entries never delivered to any consumer of the group.
    New,
    /// Entries already delivered to the reading consumer and still pending.
    Pending,
}

impl ReadSelector {
    /// Returns the broker selector token for this read.
    pub fn as_token(&self) -> &'static str {
        match self {
            ReadSelector::New => ">",
            ReadSelector::Pending => "0",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_display_is_ordered() {
        let mut fields = BTreeMap::new();
        fields.insert("b".to_string(), "2".to_string());
        fields.insert("a".to_string(), "1".to_string());
        let entry = StreamEntry::new(StreamId::new(3, 0), fields);

        assert_eq!(entry.to_string(), "id: 3-0, content: {a: 1, b: 2}");
        assert_eq!(entry.field("a"), Some("1"));
        assert_eq!(entry.field("missing"), None);
    }

    #[test]
    fn test_selector_tokens() {
        assert_eq!(ReadSelector::New.as_token(), ">");
        assert_eq!(ReadSelector::Pending.as_token(), "0");
    }
}
