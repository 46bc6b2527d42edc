//! Two-tier TTL cache with LRU trimming.
//!
//! Entries are fresh up to `fresh_ttl`, stale up to `stale_ttl`, and
//! gone after that. With both TTLs equal this degenerates into the
//! plain TTL+LRU cache used for profiles and user languages.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// How long a search cache entry counts as fresh.
pub const FRESH_TTL: Duration = Duration::from_secs(120);

/// How long a stale entry keeps being served while a refresh runs.
pub const STALE_TTL: Duration = Duration::from_secs(1200);

/// Cached value with its bookkeeping timestamps.
struct CacheEntry<T> {
    data: T,
    updated_at: Instant,
    last_access_at: Instant,
}

/// Age-derived state of a cache entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    Fresh,
    Stale,
}

pub struct TieredCache<K, T> {
    entries: Mutex<HashMap<K, CacheEntry<T>>>,
    fresh_ttl: Duration,
    stale_ttl: Duration,
    cap: usize,
}

impl<K: Eq + Hash + Clone, T: Clone> TieredCache<K, T> {
    pub fn new(fresh_ttl: Duration, stale_ttl: Duration, cap: usize) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            fresh_ttl,
            stale_ttl: stale_ttl.max(fresh_ttl),
            cap: cap.max(1),
        }
    }

    /// Single-TTL variant: entries are fresh until they expire.
    pub fn with_ttl(ttl: Duration, cap: usize) -> Self {
        Self::new(ttl, ttl, cap)
    }

    /// Look up a key, updating its access time. Expired entries are
    /// removed on the way out.
    pub fn get(&self, key: &K) -> Option<(T, Freshness)> {
        let mut entries = self.entries.lock().unwrap();
        let age = match entries.get(key) {
            Some(entry) => entry.updated_at.elapsed(),
            None => return None,
        };

        if age > self.stale_ttl {
            entries.remove(key);
            return None;
        }

        let entry = entries.get_mut(key)?;
        entry.last_access_at = Instant::now();
        let freshness = if age <= self.fresh_ttl {
            Freshness::Fresh
        } else {
            Freshness::Stale
        };
        Some((entry.data.clone(), freshness))
    }

    pub fn put(&self, key: K, data: T) {
        self.put_with_age(key, data, Duration::ZERO);
    }

    /// Insert an entry that is already `age` old. Used to seed caches in
    /// tests and by refresh paths that know the fetch time.
    pub fn put_with_age(&self, key: K, data: T, age: Duration) {
        let now = Instant::now();
        let mut entries = self.entries.lock().unwrap();
        entries.insert(
            key,
            CacheEntry {
                data,
                updated_at: now.checked_sub(age).unwrap_or(now),
                last_access_at: now,
            },
        );

        while entries.len() > self.cap {
            let oldest = entries
                .iter()
                .min_by_key(|(_, e)| e.last_access_at)
                .map(|(k, _)| k.clone());
            match oldest {
                Some(k) => {
                    entries.remove(&k);
                }
                None => break,
            }
        }
    }

    pub fn remove(&self, key: &K) {
        self.entries.lock().unwrap().remove(key);
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache() -> TieredCache<String, u32> {
        TieredCache::new(Duration::from_secs(120), Duration::from_secs(1200), 16)
    }

    #[test]
    fn test_fresh_entry_roundtrip() {
        let cache = cache();
        cache.put("k".to_string(), 7);
        assert_eq!(cache.get(&"k".to_string()), Some((7, Freshness::Fresh)));
    }

    #[test]
    fn test_stale_entry_detected_by_age() {
        let cache = cache();
        cache.put_with_age("k".to_string(), 7, Duration::from_secs(600));
        assert_eq!(cache.get(&"k".to_string()), Some((7, Freshness::Stale)));
    }

    #[test]
    fn test_expired_entry_removed() {
        let cache = cache();
        cache.put_with_age("k".to_string(), 7, Duration::from_secs(2000));
        assert_eq!(cache.get(&"k".to_string()), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_lru_trim_evicts_least_recently_accessed() {
        let cache: TieredCache<String, u32> =
            TieredCache::new(Duration::from_secs(120), Duration::from_secs(1200), 2);
        cache.put("a".to_string(), 1);
        cache.put("b".to_string(), 2);
        cache.get(&"a".to_string());
        cache.put("c".to_string(), 3);

        assert_eq!(cache.len(), 2);
        assert!(cache.get(&"b".to_string()).is_none());
        assert!(cache.get(&"a".to_string()).is_some());
        assert!(cache.get(&"c".to_string()).is_some());
    }

    #[test]
    fn test_overwrite_refreshes_entry() {
        let cache = cache();
        cache.put_with_age("k".to_string(), 7, Duration::from_secs(600));
        cache.put("k".to_string(), 8);
        assert_eq!(cache.get(&"k".to_string()), Some((8, Freshness::Fresh)));
    }
}
