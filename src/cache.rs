//! # TTL Cache
//!
//! A bounded cache with per-entry time-to-live and least-recently-used
//! eviction. Used by the cached classifier to memoize async lookups.

use std::collections::HashMap;
use std::hash::Hash;
use std::time::{Duration, Instant};

/// A bounded LRU cache with per-entry TTL and O(n) eviction.
///
/// For our use case (a few hundred product names max), the linear scan
/// for eviction is acceptable and simpler than maintaining a linked list.
#[derive(Debug)]
pub struct TtlCache<K, V> {
    capacity: usize,
    ttl: Duration,
    entries: HashMap<K, CacheEntry<V>>,
    access_counter: u64,
}

#[derive(Debug)]
struct CacheEntry<V> {
    value: V,
    last_access: u64,
    inserted_at: Instant,
}

impl<K: Eq + Hash + Clone, V: Clone> TtlCache<K, V> {
    /// Create a new cache with the given capacity and time-to-live.
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            capacity,
            ttl,
            entries: HashMap::with_capacity(capacity),
            access_counter: 0,
        }
    }

    /// Get a value from the cache, updating its access time.
    ///
    /// Expired entries are removed on access and reported as absent.
    pub fn get(&mut self, key: &K) -> Option<&V> {
        let expired = self
            .entries
            .get(key)
            .map(|e| e.inserted_at.elapsed() > self.ttl)?;
        if expired {
            self.entries.remove(key);
            return None;
        }
        self.access_counter += 1;
        let counter = self.access_counter;
        let entry = self.entries.get_mut(key)?;
        entry.last_access = counter;
        Some(&entry.value)
    }

    /// Get a cloned value from the cache (useful when you can't hold a reference).
    pub fn get_cloned(&mut self, key: &K) -> Option<V> {
        self.get(key).cloned()
    }

    /// Insert a value, evicting the least recently used entry if at capacity.
    pub fn insert(&mut self, key: K, value: V) {
        self.access_counter += 1;
        if let Some(entry) = self.entries.get_mut(&key) {
            entry.value = value;
            entry.last_access = self.access_counter;
            entry.inserted_at = Instant::now();
            return;
        }

        if self.entries.len() >= self.capacity {
            self.evict_oldest();
        }

        self.entries.insert(
            key,
            CacheEntry {
                value,
                last_access: self.access_counter,
                inserted_at: Instant::now(),
            },
        );
    }

    /// Remove a specific key from the cache.
    pub fn invalidate(&mut self, key: &K) {
        self.entries.remove(key);
    }

    /// Clear all entries from the cache.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.access_counter = 0;
    }

    /// Get the number of entries in the cache (including not-yet-swept expired ones).
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Check if the cache holds a live (non-expired) entry for a key.
    pub fn contains(&self, key: &K) -> bool {
        self.entries
            .get(key)
            .map(|e| e.inserted_at.elapsed() <= self.ttl)
            .unwrap_or(false)
    }

    /// Evict the least recently used entry.
    fn evict_oldest(&mut self) {
        if self.entries.is_empty() {
            return;
        }

        let oldest_key = self
            .entries
            .iter()
            .min_by_key(|(_, entry)| entry.last_access)
            .map(|(k, _)| k.clone());

        if let Some(key) = oldest_key {
            self.entries.remove(&key);
        }
    }
}
