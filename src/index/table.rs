//! Record index implementation
//!
//! BTreeMap keyed by (page id, record key) so listings come out ordered.

use std::collections::btree_map::{self, BTreeMap};

use super::{IndexEntry, Location};
use crate::layout::RecordKey;

/// Key → newest live copy
#[derive(Debug, Default)]
pub struct RecordIndex {
    entries: BTreeMap<RecordKey, IndexEntry>,
}

impl RecordIndex {
    /// Create an empty index
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up the live copy of `key`
    pub fn get(&self, key: &RecordKey) -> Option<&IndexEntry> {
        self.entries.get(key)
    }

    pub fn contains(&self, key: &RecordKey) -> bool {
        self.entries.contains_key(key)
    }

    /// Point `key` at a freshly written copy, returning the superseded one
    pub fn insert(&mut self, key: RecordKey, entry: IndexEntry) -> Option<IndexEntry> {
        self.entries.insert(key, entry)
    }

    /// Offer a copy found on flash, keeping whichever is newer
    ///
    /// Returns the losing copy, if any. On equal sequence numbers the copy
    /// already indexed wins: both are the same write, duplicated by an
    /// interrupted relocation.
    pub fn offer(&mut self, key: RecordKey, entry: IndexEntry) -> Option<IndexEntry> {
        match self.entries.entry(key) {
            btree_map::Entry::Vacant(slot) => {
                slot.insert(entry);
                None
            }
            btree_map::Entry::Occupied(mut slot) => {
                if entry.sequence > slot.get().sequence {
                    Some(slot.insert(entry))
                } else {
                    Some(entry)
                }
            }
        }
    }

    /// Drop `key`, returning its last live copy
    pub fn remove(&mut self, key: &RecordKey) -> Option<IndexEntry> {
        self.entries.remove(key)
    }

    /// Repoint `key` from `from` to `to`; no-op if it no longer lives at `from`
    pub fn relocate(&mut self, key: &RecordKey, from: Location, to: Location) -> bool {
        match self.entries.get_mut(key) {
            Some(entry) if entry.location == from => {
                entry.location = to;
                true
            }
            _ => false,
        }
    }

    /// Number of live records
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Live keys in ascending order
    pub fn keys(&self) -> impl Iterator<Item = &RecordKey> {
        self.entries.keys()
    }

    /// Live entries in ascending key order
    pub fn iter(&self) -> impl Iterator<Item = (&RecordKey, &IndexEntry)> {
        self.entries.iter()
    }
}
