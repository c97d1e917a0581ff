//! Per-resource FIFO of waiting clients.
//!
//! Entries are keyed by their join sequence, so ordering is defined by the
//! sequence alone and removal from the middle of the line is `O(log n)`.

use crate::types::{ClientId, QueueEntry, ResourceId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Ordered waiting line for one resource.
///
/// Invariants:
/// - a client appears at most once
/// - sequences are strictly increasing and never reused, even after removals
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "QueueStoreRecord", into = "QueueStoreRecord")]
pub struct QueueStore {
    entries: BTreeMap<u64, QueueEntry>,
    index: HashMap<ClientId, u64>,
    next_sequence: u64,
}

/// Serialized form: the index is rebuilt on load
#[derive(Clone, Debug, Serialize, Deserialize)]
struct QueueStoreRecord {
    entries: Vec<QueueEntry>,
    next_sequence: u64,
}

impl From<QueueStoreRecord> for QueueStore {
    fn from(record: QueueStoreRecord) -> Self {
        let mut store = Self::new();
        for entry in record.entries {
            store.index.insert(entry.client_id, entry.sequence);
            store.next_sequence = store.next_sequence.max(entry.sequence + 1);
            store.entries.insert(entry.sequence, entry);
        }
        store.next_sequence = store.next_sequence.max(record.next_sequence);
        store
    }
}

impl From<QueueStore> for QueueStoreRecord {
    fn from(store: QueueStore) -> Self {
        Self {
            entries: store.entries.into_values().collect(),
            next_sequence: store.next_sequence,
        }
    }
}

impl QueueStore {
    /// Creates an empty queue
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `client_id` to the back of the line.
    ///
    /// Returns `false` (and changes nothing) if the client is already waiting.
    pub fn enqueue(
        &mut self,
        resource_id: ResourceId,
        client_id: ClientId,
        joined_at: DateTime<Utc>,
    ) -> bool {
        if self.index.contains_key(&client_id) {
            return false;
        }

        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.index.insert(client_id, sequence);
        self.entries.insert(
            sequence,
            QueueEntry {
                resource_id,
                client_id,
                joined_at,
                sequence,
            },
        );
        true
    }

    /// Remove a client wherever it stands. Removing an absent client is a no-op.
    pub fn remove(&mut self, client_id: &ClientId) -> Option<QueueEntry> {
        let sequence = self.index.remove(client_id)?;
        self.entries.remove(&sequence)
    }

    /// Take the client at the front of the line
    pub fn pop_front(&mut self) -> Option<QueueEntry> {
        let (_, entry) = self.entries.pop_first()?;
        self.index.remove(&entry.client_id);
        Some(entry)
    }

    /// The client at the front of the line
    #[must_use]
    pub fn front(&self) -> Option<&QueueEntry> {
        self.entries.values().next()
    }

    /// 1-indexed position of `client_id`, if waiting
    #[must_use]
    pub fn position(&self, client_id: &ClientId) -> Option<usize> {
        let sequence = self.index.get(client_id)?;
        Some(self.entries.range(..sequence).count() + 1)
    }

    /// Whether `client_id` is waiting
    #[must_use]
    pub fn contains(&self, client_id: &ClientId) -> bool {
        self.index.contains_key(client_id)
    }

    /// Number of waiting clients
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nobody is waiting
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in FIFO order
    pub fn iter(&self) -> impl Iterator<Item = &QueueEntry> {
        self.entries.values()
    }

    /// Entries strictly behind `sequence`, in FIFO order
    pub fn behind(&self, sequence: u64) -> impl Iterator<Item = &QueueEntry> {
        self.entries
            .range(sequence.saturating_add(1)..)
            .map(|(_, entry)| entry)
    }

    /// Remove every entry, returning them in FIFO order
    pub fn drain(&mut self) -> Vec<QueueEntry> {
        self.index.clear();
        std::mem::take(&mut self.entries).into_values().collect()
    }

    /// Sequence the next joiner will receive
    #[must_use]
    pub const fn next_sequence(&self) -> u64 {
        self.next_sequence
    }
}
