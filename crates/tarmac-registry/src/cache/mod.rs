//! Metadata caching with TTL and byte-capacity bounds.
//!
//! Values are stored as serialized JSON strings so the capacity bound can
//! account for actual byte size. Negative lookups are cached as an empty
//! string sentinel with a short TTL.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, SystemTime};

use dashmap::DashMap;

/// Default capacity: 40 MiB of cached metadata
pub const DEFAULT_CAPACITY: usize = 40 * 1024 * 1024;

/// Cache entry with insertion time and per-key TTL
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// Serialized value; empty string marks a cached negative lookup
    pub value: String,
    /// When the entry was stored
    pub stored_at: SystemTime,
    /// Time-to-live duration
    pub ttl: Duration,
}

impl CacheEntry {
    pub fn new(value: String, ttl: Duration) -> Self {
        Self {
            value,
            stored_at: SystemTime::now(),
            ttl,
        }
    }

    /// Check if the entry is still fresh
    pub fn is_fresh(&self) -> bool {
        match self.stored_at.elapsed() {
            Ok(elapsed) => elapsed < self.ttl,
            Err(_) => false, // Clock went backwards, consider stale
        }
    }
}

/// Concurrent key-value cache bounded by TTL and total byte size.
///
/// Shared by version-list and package-config lookups; tolerates
/// last-writer-wins races on concurrent misses for the same key.
#[derive(Debug)]
pub struct MetadataCache {
    entries: DashMap<String, CacheEntry>,
    capacity: usize,
    used: AtomicUsize,
}

impl MetadataCache {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Create a cache bounded to roughly `capacity` bytes of values
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: DashMap::new(),
            capacity,
            used: AtomicUsize::new(0),
        }
    }

    /// Get a cached value if it is still fresh.
    ///
    /// Stale entries are removed on access.
    pub fn get(&self, key: &str) -> Option<String> {
        let fresh = {
            let entry = self.entries.get(key)?;
            if entry.is_fresh() {
                Some(entry.value.clone())
            } else {
                None
            }
        };

        if fresh.is_none() {
            self.remove(key);
        }
        fresh
    }

    /// Store a value with the given TTL, evicting as needed to stay
    /// within capacity.
    pub fn insert(&self, key: String, value: String, ttl: Duration) {
        let size = entry_size(&key, &value);
        if let Some(old) = self.entries.insert(key.clone(), CacheEntry::new(value, ttl)) {
            self.used
                .fetch_sub(entry_size(&key, &old.value), Ordering::Relaxed);
        }
        self.used.fetch_add(size, Ordering::Relaxed);

        if self.used.load(Ordering::Relaxed) > self.capacity {
            self.evict();
        }
    }

    fn remove(&self, key: &str) {
        if let Some((key, entry)) = self.entries.remove(key) {
            self.used
                .fetch_sub(entry_size(&key, &entry.value), Ordering::Relaxed);
        }
    }

    /// Drop expired entries, then the oldest ones until within capacity
    fn evict(&self) {
        self.cleanup();

        while self.used.load(Ordering::Relaxed) > self.capacity {
            let oldest = self
                .entries
                .iter()
                .min_by_key(|entry| entry.stored_at)
                .map(|entry| entry.key().clone());

            match oldest {
                Some(key) => self.remove(&key),
                None => break,
            }
        }
    }

    /// Remove all stale entries, returning how many were dropped
    pub fn cleanup(&self) -> usize {
        let mut removed = 0;
        let mut freed = 0;
        self.entries.retain(|key, entry| {
            if entry.is_fresh() {
                true
            } else {
                removed += 1;
                freed += entry_size(key, &entry.value);
                false
            }
        });
        self.used.fetch_sub(freed, Ordering::Relaxed);
        removed
    }

    /// Get cache statistics
    pub fn stats(&self) -> CacheStats {
        let mut fresh_count = 0;
        let mut stale_count = 0;

        for entry in self.entries.iter() {
            if entry.is_fresh() {
                fresh_count += 1;
            } else {
                stale_count += 1;
            }
        }

        CacheStats {
            total_entries: self.entries.len(),
            fresh_entries: fresh_count,
            stale_entries: stale_count,
            used_bytes: self.used.load(Ordering::Relaxed),
        }
    }

    /// Clear all cached entries
    pub fn clear(&self) {
        self.entries.clear();
        self.used.store(0, Ordering::Relaxed);
    }
}

impl Default for MetadataCache {
    fn default() -> Self {
        Self::new()
    }
}

fn entry_size(key: &str, value: &str) -> usize {
    key.len() + value.len()
}

/// Cache statistics
#[derive(Debug, Clone)]
pub struct CacheStats {
    pub total_entries: usize,
    pub fresh_entries: usize,
    pub stale_entries: usize,
    pub used_bytes: usize,
}
