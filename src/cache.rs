//! Bounded TTL cache with an injected clock

use crate::clock::SharedClock;
use chrono::{DateTime, Duration, Utc};
use lru::LruCache;
use parking_lot::Mutex;
use std::hash::Hash;
use std::num::NonZeroUsize;

struct Entry<V> {
    value: V,
    stored_at: DateTime<Utc>,
}

/// LRU-bounded cache whose entries expire `ttl` after insertion.
///
/// Expiry is judged against the injected clock, so tests can move time
/// instead of sleeping. Expired entries are dropped lazily on lookup.
pub struct TtlCache<K: Hash + Eq, V> {
    entries: Mutex<LruCache<K, Entry<V>>>,
    ttl: Duration,
    clock: SharedClock,
}

impl<K: Hash + Eq, V: Clone> TtlCache<K, V> {
    pub fn new(capacity: usize, ttl: std::time::Duration, clock: SharedClock) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            ttl: Duration::from_std(ttl).unwrap_or_else(|_| Duration::days(36_500)),
            clock,
        }
    }

    /// Fresh value for `key`, if any
    pub fn get(&self, key: &K) -> Option<V> {
        let now = self.clock.now();
        let mut entries = self.entries.lock();
        let expired = match entries.get(key) {
            Some(entry) if now - entry.stored_at < self.ttl => return Some(entry.value.clone()),
            Some(_) => true,
            None => false,
        };
        if expired {
            entries.pop(key);
        }
        None
    }

    pub fn insert(&self, key: K, value: V) {
        let stored_at = self.clock.now();
        self.entries.lock().put(key, Entry { value, stored_at });
    }

    pub fn invalidate(&self, key: &K) {
        self.entries.lock().pop(key);
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<K: Hash + Eq, V> std::fmt::Debug for TtlCache<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TtlCache")
            .field("len", &self.entries.lock().len())
            .field("ttl_secs", &self.ttl.num_seconds())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use std::sync::Arc;

    fn cache(clock: &ManualClock, capacity: usize) -> TtlCache<String, u32> {
        TtlCache::new(capacity, std::time::Duration::from_secs(300), Arc::new(clock.clone()))
    }

    #[test]
    fn test_entries_expire_by_clock() {
        let clock = ManualClock::default();
        let cache = cache(&clock, 8);

        cache.insert("a".to_string(), 1);
        clock.advance(Duration::seconds(299));
        assert_eq!(cache.get(&"a".to_string()), Some(1));

        clock.advance(Duration::seconds(1));
        assert_eq!(cache.get(&"a".to_string()), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_capacity_evicts_least_recent() {
        let clock = ManualClock::default();
        let cache = cache(&clock, 2);

        cache.insert("a".to_string(), 1);
        cache.insert("b".to_string(), 2);
        assert_eq!(cache.get(&"a".to_string()), Some(1));
        cache.insert("c".to_string(), 3);

        assert_eq!(cache.get(&"b".to_string()), None);
        assert_eq!(cache.get(&"a".to_string()), Some(1));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_invalidate_and_zero_capacity() {
        let clock = ManualClock::default();
        let cache = cache(&clock, 0);
        cache.insert("a".to_string(), 1);
        assert_eq!(cache.len(), 1);
        cache.invalidate(&"a".to_string());
        assert!(cache.get(&"a".to_string()).is_none());
    }
}
