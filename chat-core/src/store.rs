//! Ordered, deduplicated message store for FlowChat.
//!
//! The store is the only owner of the local message collection. It keeps
//! messages sorted by `(timestamp, id)` and never holds two entries with the
//! same id, no matter how often or in which order batches arrive.
//!
//! Every mutation takes `&mut self` and runs to completion, so a reader can
//! only ever see the store before or after a whole batch, never halfway.

use std::collections::HashSet;

use flowchat_types::{ChatMessage, MessageId};
use thiserror::Error;

/// Errors from store mutations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// Edit target is missing or was written by someone else.
    #[error("not authorized to edit message {id}")]
    Unauthorized {
        /// The rejected edit target.
        id: MessageId,
    },
}

/// Sorted message collection with id-based deduplication.
#[derive(Debug, Clone, Default)]
pub struct MessageStore {
    /// Messages sorted by `(timestamp, id)`.
    entries: Vec<ChatMessage>,
    /// Ids of everything in `entries`.
    ids: HashSet<MessageId>,
}

impl MessageStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert every message whose id is not already present.
    ///
    /// Duplicates, both against the store and within `batch`, are ignored;
    /// the first occurrence in the batch wins. The batch may arrive in any
    /// order. Returns the ids that were inserted, in store order.
    pub fn merge(&mut self, batch: &[ChatMessage]) -> Vec<MessageId> {
        let mut fresh: Vec<&ChatMessage> = Vec::with_capacity(batch.len());
        let mut seen: HashSet<&MessageId> = HashSet::with_capacity(batch.len());
        for msg in batch {
            if !self.ids.contains(&msg.id) && seen.insert(&msg.id) {
                fresh.push(msg);
            }
        }
        fresh.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));

        let mut inserted = Vec::with_capacity(fresh.len());
        for msg in fresh {
            let key = msg.sort_key();
            let pos = self.entries.partition_point(|e| e.sort_key() < key);
            self.entries.insert(pos, msg.clone());
            self.ids.insert(msg.id.clone());
            inserted.push(msg.id.clone());
        }
        inserted
    }

    /// Remove a message. No-op if it is not present.
    pub fn delete(&mut self, id: &MessageId) -> Option<ChatMessage> {
        if !self.ids.remove(id) {
            return None;
        }
        let pos = self.entries.iter().position(|m| &m.id == id)?;
        Some(self.entries.remove(pos))
    }

    /// Replace the content of a message written by `identity`.
    ///
    /// Sets the edited flag. Position is unchanged because the sort key does
    /// not involve content.
    pub fn edit(
        &mut self,
        id: &MessageId,
        content: &str,
        identity: &str,
    ) -> Result<&ChatMessage, StoreError> {
        match self.entries.iter_mut().find(|m| &m.id == id) {
            Some(msg) if msg.is_authored_by(identity) => {
                msg.content = content.to_string();
                msg.edited = true;
                Ok(&*msg)
            }
            _ => Err(StoreError::Unauthorized { id: id.clone() }),
        }
    }

    /// Messages whose content or author contains `needle`, ignoring case.
    ///
    /// Results are in store order. An empty needle matches everything.
    pub fn query(&self, needle: &str) -> Vec<&ChatMessage> {
        let needle = needle.to_lowercase();
        self.entries
            .iter()
            .filter(|m| {
                m.content.to_lowercase().contains(&needle)
                    || m.username.to_lowercase().contains(&needle)
            })
            .collect()
    }

    /// Look up a message by id.
    pub fn get(&self, id: &MessageId) -> Option<&ChatMessage> {
        if !self.ids.contains(id) {
            return None;
        }
        self.entries.iter().find(|m| &m.id == id)
    }

    /// Check whether a message id is present.
    pub fn contains(&self, id: &MessageId) -> bool {
        self.ids.contains(id)
    }

    /// The newest message.
    pub fn latest(&self) -> Option<&ChatMessage> {
        self.entries.last()
    }

    /// Messages in order.
    pub fn iter(&self) -> impl Iterator<Item = &ChatMessage> {
        self.entries.iter()
    }

    /// Number of messages.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop all messages (session ended).
    pub fn clear(&mut self) {
        self.entries.clear();
        self.ids.clear();
    }
}
