//! Sharded, concurrency-safe storage for window entries.
//!
//! This is the only shared mutable state in the engine. Keys are spread over
//! independently locked shards, so unrelated identifiers never contend, and
//! every per-key read-modify-write runs under its shard's write lock.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use super::category::Category;
use super::entry::WindowEntry;
use super::key::ThrottleKey;

/// Concurrent map from (category, identifier) to its window entry.
pub struct CounterStore {
    entries: DashMap<ThrottleKey, WindowEntry>,
    reaped: AtomicU64,
}

impl CounterStore {
    /// Create a store split into `shard_amount` partitions.
    ///
    /// `shard_amount` must be a power of two greater than one; the engine
    /// configuration validates this before construction.
    pub fn new(shard_amount: usize) -> Self {
        Self {
            entries: DashMap::with_capacity_and_shard_amount(0, shard_amount),
            reaped: AtomicU64::new(0),
        }
    }

    /// Atomically create or update the entry for `key`.
    ///
    /// `create` runs when no entry exists and returns the new entry along with
    /// the result; `mutate` runs against the existing entry otherwise. Either
    /// closure runs while the key's shard is write-locked.
    pub fn upsert<T>(
        &self,
        key: ThrottleKey,
        create: impl FnOnce() -> (WindowEntry, T),
        mutate: impl FnOnce(&mut WindowEntry) -> T,
    ) -> T {
        match self.entries.entry(key) {
            Entry::Occupied(mut occupied) => mutate(occupied.get_mut()),
            Entry::Vacant(vacant) => {
                let (entry, result) = create();
                vacant.insert(entry);
                result
            }
        }
    }

    /// Atomically update an existing entry. Returns `None` when absent.
    pub fn modify<T>(&self, key: &ThrottleKey, mutate: impl FnOnce(&mut WindowEntry) -> T) -> Option<T> {
        self.entries.get_mut(key).map(|mut entry| mutate(entry.value_mut()))
    }

    /// Get a copy of the entry for `key`.
    pub fn get(&self, key: &ThrottleKey) -> Option<WindowEntry> {
        self.entries.get(key).map(|entry| entry.value().clone())
    }

    /// Remove the entry for `key`. Returns whether one existed.
    pub fn remove(&self, key: &ThrottleKey) -> bool {
        self.entries.remove(key).is_some()
    }

    /// Remove the entries for `identifier` in every category.
    pub fn remove_identifier(&self, identifier: &str) -> usize {
        Category::ALL
            .into_iter()
            .filter(|category| self.remove(&ThrottleKey::new(*category, identifier)))
            .count()
    }

    /// Remove the entry for `key` if `predicate` holds under the shard lock.
    ///
    /// Removals made this way count towards [`reaped_total`](Self::reaped_total).
    pub fn reap_if(&self, key: &ThrottleKey, predicate: impl FnOnce(&WindowEntry) -> bool) -> bool {
        let removed = self
            .entries
            .remove_if(key, |_, entry| predicate(entry))
            .is_some();
        if removed {
            self.reaped.fetch_add(1, Ordering::Relaxed);
        }
        removed
    }

    /// Snapshot the current keys.
    ///
    /// Locks one shard at a time; keys inserted or removed concurrently may
    /// or may not be included.
    pub fn keys(&self) -> Vec<ThrottleKey> {
        self.entries.iter().map(|entry| entry.key().clone()).collect()
    }

    /// Visit every entry without mutating it.
    pub fn for_each(&self, mut visit: impl FnMut(&ThrottleKey, &WindowEntry)) {
        for entry in self.entries.iter() {
            visit(entry.key(), entry.value());
        }
    }

    /// Number of tracked entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total number of entries removed by reaping since creation.
    pub fn reaped_total(&self) -> u64 {
        self.reaped.load(Ordering::Relaxed)
    }
}
