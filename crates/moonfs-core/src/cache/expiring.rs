//! TTL cache with lazy expiry.
//!
//! Entries are stamped with a deadline at insertion and never swept: expiry
//! is only ever observed through [`ExpiringCache::contains`]. A deliberate
//! consequence is that [`ExpiringCache::get`] returns whatever is physically
//! present, expired or not. Callers gate on `contains` when they need
//! freshness and go straight to `get` when a stale answer is acceptable
//! (e.g. deciding whether a directory entry is a file or a subdirectory).

use std::hash::Hash;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use thiserror::Error;

/// Lookup failure: the key has no physically present entry.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("cache miss")]
pub struct CacheMiss;

struct Entry<V> {
    value: V,
    expires_at: Instant,
}

/// A concurrent map whose entries carry a time-to-live.
pub struct ExpiringCache<K, V> {
    entries: DashMap<K, Entry<V>>,
    ttl: Duration,
}

impl<K, V> ExpiringCache<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    /// Insert or replace under the cache's default TTL, restarting the
    /// clock for this key.
    pub fn set(&self, key: K, value: V) {
        self.set_with_ttl(key, value, self.ttl);
    }

    /// Insert or replace with an explicit TTL.
    pub fn set_with_ttl(&self, key: K, value: V, ttl: Duration) {
        self.entries.insert(
            key,
            Entry {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
    }

    /// True only for a present, unexpired entry. This is the sole place
    /// where expiry is evaluated.
    pub fn contains(&self, key: &K) -> bool {
        self.entries
            .get(key)
            .is_some_and(|e| e.expires_at > Instant::now())
    }

    /// Return the stored value regardless of its age.
    ///
    /// An expired entry still succeeds here; stale reads are intentional
    /// and freshness is the caller's concern, gated through [`contains`].
    /// Note that re-inserting over an expired key restarts its clock, so
    /// updates can resurrect a record `contains` had already rejected.
    ///
    /// [`contains`]: ExpiringCache::contains
    pub fn get(&self, key: &K) -> Result<V, CacheMiss> {
        self.entries
            .get(key)
            .map(|e| e.value.clone())
            .ok_or(CacheMiss)
    }

    /// Drop a single entry.
    pub fn invalidate(&self, key: &K) {
        self.entries.remove(key);
    }

    /// Drop everything.
    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;

    #[test]
    fn fresh_entry_is_visible() {
        let cache: ExpiringCache<String, u64> = ExpiringCache::new(Duration::from_secs(60));
        cache.set("a".into(), 1);
        assert!(cache.contains(&"a".into()));
        assert_eq!(cache.get(&"a".into()), Ok(1));
    }

    #[test]
    fn expired_entry_fails_contains_but_still_gets() {
        let cache: ExpiringCache<String, u64> = ExpiringCache::new(Duration::from_millis(10));
        cache.set("a".into(), 1);
        sleep(Duration::from_millis(25));
        assert!(!cache.contains(&"a".into()));
        // Lazy expiry: the value is still physically present.
        assert_eq!(cache.get(&"a".into()), Ok(1));
    }

    #[test]
    fn per_entry_ttl_overrides_the_default() {
        let cache: ExpiringCache<String, u64> = ExpiringCache::new(Duration::from_millis(10));
        cache.set_with_ttl("long".into(), 1, Duration::from_secs(60));
        std::thread::sleep(Duration::from_millis(25));
        assert!(cache.contains(&"long".into()));
    }

    #[test]
    fn reinsert_restarts_the_clock() {
        let cache: ExpiringCache<String, u64> = ExpiringCache::new(Duration::from_millis(40));
        cache.set("a".into(), 1);
        sleep(Duration::from_millis(25));
        cache.set("a".into(), 2);
        sleep(Duration::from_millis(25));
        // 50ms since first insert but only 25ms since the refresh.
        assert!(cache.contains(&"a".into()));
        assert_eq!(cache.get(&"a".into()), Ok(2));
    }

    #[test]
    fn invalidate_removes_physically() {
        let cache: ExpiringCache<String, u64> = ExpiringCache::new(Duration::from_secs(60));
        cache.set("a".into(), 1);
        cache.invalidate(&"a".into());
        assert!(!cache.contains(&"a".into()));
        assert_eq!(cache.get(&"a".into()), Err(CacheMiss));
    }

    #[test]
    fn clear_empties_the_cache() {
        let cache: ExpiringCache<String, u64> = ExpiringCache::new(Duration::from_secs(60));
        cache.set("a".into(), 1);
        cache.set("b".into(), 2);
        cache.clear();
        assert!(cache.is_empty());
    }
}
