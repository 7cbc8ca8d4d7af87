//! Identity and ordering types for FlowChat.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::WireError;

/// Server-assigned message identifier.
///
/// Opaque to the client. Ids are globally unique, so their ordering is used
/// to break ties between messages that share a timestamp.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(String);

impl MessageId {
    /// Wrap a server-provided id without validation.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Parse an id supplied by a user.
    ///
    /// Ids end up in URL paths (`/api/messages/{id}`), so empty ids and ids
    /// containing `/`, `?`, `#` or whitespace are rejected.
    pub fn parse(id: &str) -> Result<Self, WireError> {
        let id = id.trim();
        if id.is_empty() {
            return Err(WireError::EmptyId);
        }
        if id
            .chars()
            .any(|c| c == '/' || c == '?' || c == '#' || c.is_whitespace())
        {
            return Err(WireError::InvalidId(id.to_string()));
        }
        Ok(Self(id.to_string()))
    }

    /// Get the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MessageId({})", self.0)
    }
}

/// Server clock timestamp in ISO-8601 form.
///
/// The server emits timestamps that sort the same way lexicographically and
/// chronologically, so comparison is plain string comparison and no parsing
/// is needed to advance a cursor.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(String);

impl Timestamp {
    /// Wrap a server-provided timestamp without validation.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Parse a timestamp supplied by a user.
    ///
    /// Requires at least a `YYYY-MM-DD` date prefix.
    pub fn parse(value: &str) -> Result<Self, WireError> {
        let value = value.trim();
        let bytes = value.as_bytes();
        let date_ok = bytes.len() >= 10
            && bytes[..10].iter().enumerate().all(|(i, b)| match i {
                4 | 7 => *b == b'-',
                _ => b.is_ascii_digit(),
            });
        if !date_ok || value.chars().any(char::is_whitespace) {
            return Err(WireError::InvalidTimestamp(value.to_string()));
        }
        Ok(Self(value.to_string()))
    }

    /// Get the timestamp as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Timestamp({})", self.0)
    }
}
