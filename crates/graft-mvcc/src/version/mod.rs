//! Version chain storage and management.
//!
//! Each row key owns a chain of versions stamped with commit timestamps.
//! A version is visible at `ts` when `start_ts <= ts < stop_ts`; writing a
//! new version closes the previous one at the new commit timestamp.
//!
//! # Version Chain Structure
//!
//! ```text
//! Record Key: "1"
//! ┌─────────────────────────────────────────────────────┐
//! │ Version 3 (latest)                                   │
//! │ start_ts: 50, stop_ts: MAX                           │
//! │ value: <tombstone>                                   │
//! │                     ↓                                │
//! │ Version 2                                            │
//! │ start_ts: 30, stop_ts: 50                            │
//! │ value: "A2"                                          │
//! │                     ↓                                │
//! │ Version 1 (oldest)                                   │
//! │ start_ts: 10, stop_ts: 30                            │
//! │ value: "A"                                           │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! Chains are persisted whole: a checkpoint writes every version of every
//! key, so history written before a checkpoint (or in another instance,
//! for imported tables) stays readable at its original timestamps.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;

use bytes::Bytes;
use dashmap::DashMap;
use parking_lot::RwLock;

use graft_common::types::Timestamp;
use graft_storage::page::{LeafEntry, VersionRecord, MAX_VERSIONS_PER_ENTRY};

use crate::error::{MvccError, MvccResult};

/// A single version of a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Version {
    /// Commit timestamp at which this version became visible.
    pub start_ts: Timestamp,
    /// Commit timestamp at which it was superseded. `MAX` means current.
    pub stop_ts: Timestamp,
    /// The row value, `None` for a deletion.
    pub value: Option<Bytes>,
}

impl Version {
    /// Creates a current version.
    pub fn new(start_ts: Timestamp, value: Option<Bytes>) -> Self {
        Self {
            start_ts,
            stop_ts: Timestamp::MAX,
            value,
        }
    }

    /// Checks if this version is visible at the given timestamp.
    ///
    /// Reading at `Timestamp::MAX` sees the current version.
    pub fn is_visible_at(&self, ts: Timestamp) -> bool {
        self.start_ts <= ts && (self.stop_ts.is_max() || ts < self.stop_ts)
    }

    /// Returns true if this version deletes the row.
    pub fn is_tombstone(&self) -> bool {
        self.value.is_none()
    }

    /// Returns the size of this version in bytes.
    pub fn size(&self) -> usize {
        std::mem::size_of::<Self>() + self.value.as_ref().map_or(0, Bytes::len)
    }
}

impl From<VersionRecord> for Version {
    fn from(record: VersionRecord) -> Self {
        Self {
            start_ts: record.start_ts,
            stop_ts: record.stop_ts,
            value: record.value,
        }
    }
}

impl From<&Version> for VersionRecord {
    fn from(version: &Version) -> Self {
        Self {
            start_ts: version.start_ts,
            stop_ts: version.stop_ts,
            value: version.value.clone(),
        }
    }
}

/// A chain of versions for a single record.
#[derive(Debug)]
pub struct VersionChain {
    /// The key for this chain.
    key: Bytes,
    /// All versions, newest first.
    versions: RwLock<VecDeque<Version>>,
}

impl VersionChain {
    /// Creates a new empty version chain.
    pub fn new(key: Bytes) -> Self {
        Self {
            key,
            versions: RwLock::new(VecDeque::new()),
        }
    }

    /// Rebuilds a chain from on-disk records (stored oldest first).
    pub fn from_records(key: Bytes, records: Vec<VersionRecord>) -> Self {
        let versions: VecDeque<Version> = records.into_iter().rev().map(Version::from).collect();
        Self {
            key,
            versions: RwLock::new(versions),
        }
    }

    /// Returns the key for this chain.
    pub fn key(&self) -> &Bytes {
        &self.key
    }

    /// Returns the number of versions in the chain.
    pub fn len(&self) -> usize {
        self.versions.read().len()
    }

    /// Returns true if the chain is empty.
    pub fn is_empty(&self) -> bool {
        self.versions.read().is_empty()
    }

    /// Start timestamp of the newest version.
    pub fn newest_ts(&self) -> Option<Timestamp> {
        self.versions.read().front().map(|v| v.start_ts)
    }

    /// Installs a new version committed at `commit_ts`.
    ///
    /// The previous current version is closed at `commit_ts`. A second write
    /// at the newest version's own timestamp replaces that version. A chain
    /// never grows past what one data file entry can hold.
    pub fn install(&self, commit_ts: Timestamp, value: Option<Bytes>) -> MvccResult<()> {
        let mut versions = self.versions.write();
        if let Some(newest) = versions.front_mut() {
            if commit_ts < newest.start_ts {
                return Err(MvccError::TimestampOutOfOrder {
                    key: self.key.clone(),
                    commit_ts,
                    newest_ts: newest.start_ts,
                });
            }
            if commit_ts == newest.start_ts {
                newest.value = value;
                return Ok(());
            }
        }
        if versions.len() >= MAX_VERSIONS_PER_ENTRY {
            return Err(MvccError::HistoryFull {
                key: self.key.clone(),
                limit: MAX_VERSIONS_PER_ENTRY,
            });
        }
        if let Some(newest) = versions.front_mut() {
            newest.stop_ts = commit_ts;
        }
        versions.push_front(Version::new(commit_ts, value));
        Ok(())
    }

    /// Returns the value visible at `read_ts`, if any.
    pub fn read_at(&self, read_ts: Timestamp) -> Option<Bytes> {
        let versions = self.versions.read();
        versions
            .iter()
            .find(|v| v.is_visible_at(read_ts))
            .and_then(|v| v.value.clone())
    }

    /// Returns the current value, if the row is not deleted.
    pub fn latest(&self) -> Option<Bytes> {
        self.read_at(Timestamp::MAX)
    }

    /// Returns all versions, newest first.
    pub fn all_versions(&self) -> Vec<Version> {
        self.versions.read().iter().cloned().collect()
    }

    /// Converts the chain to its on-disk form (oldest first).
    pub fn to_leaf_entry(&self) -> LeafEntry {
        let versions = self.versions.read();
        LeafEntry {
            key: self.key.clone(),
            versions: versions.iter().rev().map(VersionRecord::from).collect(),
        }
    }
}

/// A store for managing version chains.
#[derive(Debug, Default)]
pub struct VersionStore {
    /// All version chains, indexed by key.
    chains: DashMap<Bytes, Arc<VersionChain>>,
    /// Newest commit timestamp written or loaded.
    newest_ts: AtomicU64,
}

impl VersionStore {
    /// Creates a new empty version store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store holding the given on-disk entries.
    pub fn from_entries(entries: Vec<LeafEntry>) -> Self {
        let store = Self::new();
        for entry in entries {
            store
                .newest_ts
                .fetch_max(entry.newest_timestamp().as_u64(), AtomicOrdering::AcqRel);
            let chain = VersionChain::from_records(entry.key.clone(), entry.versions);
            store.chains.insert(entry.key, Arc::new(chain));
        }
        store
    }

    /// Returns the number of keys in the store.
    pub fn key_count(&self) -> usize {
        self.chains.len()
    }

    /// Newest commit timestamp seen by the store.
    pub fn newest_timestamp(&self) -> Timestamp {
        Timestamp::new(self.newest_ts.load(AtomicOrdering::Acquire))
    }

    /// Gets or creates a version chain for a key.
    pub fn get_or_create_chain(&self, key: Bytes) -> Arc<VersionChain> {
        self.chains
            .entry(key.clone())
            .or_insert_with(|| Arc::new(VersionChain::new(key)))
            .clone()
    }

    /// Gets a version chain if it exists.
    pub fn get_chain(&self, key: &[u8]) -> Option<Arc<VersionChain>> {
        self.chains.get(key).map(|r| r.clone())
    }

    /// Writes `value` for `key` at `commit_ts`.
    pub fn put(&self, key: Bytes, value: Bytes, commit_ts: Timestamp) -> MvccResult<()> {
        self.get_or_create_chain(key).install(commit_ts, Some(value))?;
        self.newest_ts
            .fetch_max(commit_ts.as_u64(), AtomicOrdering::AcqRel);
        Ok(())
    }

    /// Deletes `key` at `commit_ts`.
    ///
    /// Returns false (and writes nothing) if the row has no current value.
    pub fn delete(&self, key: &[u8], commit_ts: Timestamp) -> MvccResult<bool> {
        let Some(chain) = self.get_chain(key) else {
            return Ok(false);
        };
        if chain.latest().is_none() {
            return Ok(false);
        }
        chain.install(commit_ts, None)?;
        self.newest_ts
            .fetch_max(commit_ts.as_u64(), AtomicOrdering::AcqRel);
        Ok(true)
    }

    /// Reads the value of `key` visible at `read_ts`.
    pub fn get(&self, key: &[u8], read_ts: Timestamp) -> Option<Bytes> {
        self.get_chain(key).and_then(|chain| chain.read_at(read_ts))
    }

    /// Returns every row visible at `read_ts`, in key order.
    pub fn scan(&self, read_ts: Timestamp) -> Vec<(Bytes, Bytes)> {
        let mut rows: Vec<(Bytes, Bytes)> = self
            .chains
            .iter()
            .filter_map(|entry| {
                entry
                    .value()
                    .read_at(read_ts)
                    .map(|value| (entry.key().clone(), value))
            })
            .collect();
        rows.sort_by(|a, b| a.0.cmp(&b.0));
        rows
    }

    /// Snapshots every chain into on-disk entries, in key order.
    ///
    /// Chains with no versions are skipped.
    pub fn to_leaf_entries(&self) -> Vec<LeafEntry> {
        let mut chains: Vec<Arc<VersionChain>> =
            self.chains.iter().map(|entry| entry.value().clone()).collect();
        chains.sort_by(|a, b| a.key().cmp(b.key()));
        chains
            .iter()
            .map(|chain| chain.to_leaf_entry())
            .filter(|entry| !entry.versions.is_empty())
            .collect()
    }
}
