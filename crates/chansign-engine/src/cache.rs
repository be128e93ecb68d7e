//! Idempotency cache for retried requests.
//!
//! A retried request (same client, endpoint and declared timestamp) gets the
//! response computed the first time instead of being signed again. Entries
//! carry a fingerprint of the request body, so a different request reusing
//! the same key is caught rather than answered with someone else's result.
//!
//! Eviction only means a late retry is processed normally, where replay
//! protection rejects it.

use std::num::NonZeroUsize;
use std::sync::{Mutex, MutexGuard};

use chansign_types::Endpoint;
use lru::LruCache;

/// Identity of a request for caching.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub client_public_key: Vec<u8>,
    pub endpoint: Endpoint,
    /// Declared timestamp in seconds.
    pub timestamp: u64,
}

#[derive(Clone, Debug)]
struct CachedResponse {
    fingerprint: [u8; 32],
    body: serde_json::Value,
}

/// Result of a cache lookup.
#[derive(Clone, Debug, PartialEq)]
pub enum CacheLookup {
    Miss,
    /// The stored response for an identical request.
    Hit(serde_json::Value),
    /// The key is cached for a request with a different body.
    Conflict,
}

/// Bounded LRU of successful responses.
pub struct RequestCache {
    entries: Mutex<LruCache<CacheKey, CachedResponse>>,
}

impl RequestCache {
    /// A cache holding at most `capacity` responses (at least one).
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, LruCache<CacheKey, CachedResponse>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn lookup(&self, key: &CacheKey, fingerprint: &[u8; 32]) -> CacheLookup {
        match self.lock().get(key) {
            None => CacheLookup::Miss,
            Some(cached) if &cached.fingerprint == fingerprint => CacheLookup::Hit(cached.body.clone()),
            Some(_) => CacheLookup::Conflict,
        }
    }

    pub fn store(&self, key: CacheKey, fingerprint: [u8; 32], body: serde_json::Value) {
        self.lock().put(key, CachedResponse { fingerprint, body });
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn key(timestamp: u64) -> CacheKey {
        CacheKey {
            client_public_key: vec![2; 33],
            endpoint: Endpoint::Sign,
            timestamp,
        }
    }

    #[test]
    fn test_hit_and_conflict() {
        let cache = RequestCache::new(4);
        assert_eq!(cache.lookup(&key(1), &[1; 32]), CacheLookup::Miss);

        cache.store(key(1), [1; 32], json!({"complete": false}));
        assert_eq!(
            cache.lookup(&key(1), &[1; 32]),
            CacheLookup::Hit(json!({"complete": false}))
        );
        assert_eq!(cache.lookup(&key(1), &[2; 32]), CacheLookup::Conflict);
    }

    #[test]
    fn test_endpoint_is_part_of_key() {
        let cache = RequestCache::new(4);
        cache.store(key(1), [1; 32], json!(1));
        let other = CacheKey {
            endpoint: Endpoint::Refund,
            ..key(1)
        };
        assert_eq!(cache.lookup(&other, &[1; 32]), CacheLookup::Miss);
    }

    #[test]
    fn test_lru_eviction() {
        let cache = RequestCache::new(2);
        cache.store(key(1), [1; 32], json!(1));
        cache.store(key(2), [1; 32], json!(2));
        // Touch 1 so 2 becomes least recently used
        let _ = cache.lookup(&key(1), &[1; 32]);
        cache.store(key(3), [1; 32], json!(3));

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.lookup(&key(2), &[1; 32]), CacheLookup::Miss);
        assert_eq!(cache.lookup(&key(1), &[1; 32]), CacheLookup::Hit(json!(1)));
    }

    #[test]
    fn test_zero_capacity_holds_one() {
        let cache = RequestCache::new(0);
        assert!(cache.is_empty());
        cache.store(key(1), [1; 32], json!(1));
        cache.store(key(2), [1; 32], json!(2));
        assert_eq!(cache.len(), 1);
    }
}
