// SPDX-License-Identifier: MIT OR Apache-2.0
//! TTL cache for embedding vectors, keyed by canonical text.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

struct CacheEntry {
    vector: Vec<f32>,
    inserted_at: Instant,
}

/// A key→vector cache with per-entry insertion timestamps.
///
/// Reads evict entries older than the TTL; writes unconditionally upsert
/// and refresh the timestamp. The cache is unbounded — eviction is purely
/// age-driven.
pub struct TtlCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
    ttl: Duration,
}

impl TtlCache {
    /// A cache whose entries expire `ttl` after insertion.
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    /// Look up a vector; a stale entry is evicted and reported as a miss.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<Vec<f32>> {
        let mut entries = self.entries.lock().expect("cache lock poisoned");
        match entries.get(key) {
            Some(entry) if entry.inserted_at.elapsed() <= self.ttl => Some(entry.vector.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    /// Upsert a vector, refreshing its insertion timestamp.
    pub fn insert(&self, key: impl Into<String>, vector: Vec<f32>) {
        let mut entries = self.entries.lock().expect("cache lock poisoned");
        entries.insert(
            key.into(),
            CacheEntry {
                vector,
                inserted_at: Instant::now(),
            },
        );
    }

    /// Number of resident entries, stale ones included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().expect("cache lock poisoned").len()
    }

    /// Whether the cache holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every stale entry; returns how many were evicted.
    pub fn purge_expired(&self) -> usize {
        let mut entries = self.entries.lock().expect("cache lock poisoned");
        let before = entries.len();
        entries.retain(|_, entry| entry.inserted_at.elapsed() <= self.ttl);
        before - entries.len()
    }

    /// Drop everything.
    pub fn clear(&self) {
        self.entries.lock().expect("cache lock poisoned").clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_after_write_within_ttl_returns_exact_vector() {
        let cache = TtlCache::new(Duration::from_secs(60));
        cache.insert("k", vec![0.25, -0.5]);
        assert_eq!(cache.get("k"), Some(vec![0.25, -0.5]));
    }

    #[test]
    fn read_after_ttl_is_a_miss_and_evicts() {
        let cache = TtlCache::new(Duration::from_millis(10));
        cache.insert("k", vec![1.0]);
        std::thread::sleep(Duration::from_millis(25));
        assert_eq!(cache.get("k"), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn upsert_refreshes_the_timestamp() {
        let cache = TtlCache::new(Duration::from_millis(40));
        cache.insert("k", vec![1.0]);
        std::thread::sleep(Duration::from_millis(25));
        cache.insert("k", vec![2.0]);
        std::thread::sleep(Duration::from_millis(25));
        // 50 ms after the first insert but only 25 ms after the refresh.
        assert_eq!(cache.get("k"), Some(vec![2.0]));
    }

    #[test]
    fn purge_expired_reports_eviction_count() {
        let cache = TtlCache::new(Duration::from_millis(10));
        cache.insert("a", vec![1.0]);
        cache.insert("b", vec![2.0]);
        std::thread::sleep(Duration::from_millis(25));
        cache.insert("c", vec![3.0]);
        assert_eq!(cache.purge_expired(), 2);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn missing_key_is_a_miss() {
        let cache = TtlCache::new(Duration::from_secs(1));
        assert_eq!(cache.get("absent"), None);
    }

    #[test]
    fn clear_empties_the_cache() {
        let cache = TtlCache::new(Duration::from_secs(1));
        cache.insert("a", vec![1.0]);
        cache.clear();
        assert!(cache.is_empty());
    }
}
