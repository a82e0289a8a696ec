//! Time-boxed key/value cache.
//!
//! Each entry carries its own expiry; expired entries are swept lazily on
//! insert and filtered on read. The cache has its own lock, so the identity
//! resolver and the socket task can touch it from different threads.

use std::collections::HashMap;
use std::hash::Hash;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

struct Entry<V> {
    expires_at: Instant,
    value: V,
}

/// A generic store with per-entry time-to-live.
pub struct TtlCache<K, V> {
    entries: Mutex<HashMap<K, Entry<V>>>,
    ttl: Duration,
}

impl<K: Eq + Hash, V: Clone> TtlCache<K, V> {
    /// Create a cache whose entries live for `ttl` by default.
    pub fn new(ttl: Duration) -> Self {
        TtlCache {
            entries: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    /// Insert with the default TTL, sweeping expired entries first.
    pub fn insert(&self, key: K, value: V) {
        self.insert_with_ttl(key, value, self.ttl);
    }

    /// Insert with an explicit TTL, sweeping expired entries first.
    pub fn insert_with_ttl(&self, key: K, value: V, ttl: Duration) {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        entries.retain(|_, e| e.expires_at > now);
        entries.insert(
            key,
            Entry {
                expires_at: now + ttl,
                value,
            },
        );
    }

    /// Fetch a live entry; expired entries read as absent and are dropped.
    pub fn get(&self, key: &K) -> Option<V> {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        match entries.get(key) {
            Some(e) if e.expires_at > now => Some(e.value.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    /// True if a live entry exists for `key`.
    pub fn contains(&self, key: &K) -> bool {
        self.get(key).is_some()
    }

    /// Explicitly evict `key`.
    pub fn remove(&self, key: &K) -> Option<V> {
        self.entries.lock().remove(key).map(|e| e.value)
    }

    /// Number of entries currently stored (live or not yet swept).
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// True when no entries are stored.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}
