//! Sync cursor for FlowChat.
//!
//! The cursor is the high-water timestamp of everything merged so far. Polls
//! ask the server only for messages newer than the cursor.
//!
//! The cursor never moves backwards: empty batches, duplicate-only batches
//! and batches containing older messages (overlapping poll windows) leave it
//! where it is.

use flowchat_types::{ChatMessage, Timestamp};

/// Monotonic high-water mark over merged message timestamps.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncCursor {
    /// Highest timestamp seen. `None` until the first non-empty batch.
    high_water: Option<Timestamp>,
}

impl SyncCursor {
    /// Create a cursor that has seen nothing.
    ///
    /// Polling with an empty cursor fetches the full history.
    pub fn new() -> Self {
        Self { high_water: None }
    }

    /// Create a cursor resuming from a known timestamp.
    pub fn with_cursor(timestamp: Timestamp) -> Self {
        Self {
            high_water: Some(timestamp),
        }
    }

    /// The timestamp to poll `since`, if any.
    pub fn current(&self) -> Option<&Timestamp> {
        self.high_water.as_ref()
    }

    /// Record a single timestamp.
    ///
    /// Returns `true` if the cursor advanced.
    pub fn observe(&mut self, timestamp: &Timestamp) -> bool {
        match &self.high_water {
            Some(current) if current >= timestamp => false,
            _ => {
                self.high_water = Some(timestamp.clone());
                true
            }
        }
    }

    /// Advance to the maximum timestamp in `batch`.
    ///
    /// The batch does not need to be sorted. Returns `true` if the cursor
    /// advanced.
    pub fn advance(&mut self, batch: &[ChatMessage]) -> bool {
        match batch.iter().map(|m| &m.timestamp).max() {
            Some(max) => self.observe(max),
            None => false,
        }
    }

    /// Forget everything (session ended).
    pub fn reset(&mut self) {
        self.high_water = None;
    }
}
