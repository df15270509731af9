//! Read-through expiring cache.
//!
//! A small in-memory TTL cache used to avoid re-reading repo and
//! collection listings from the store on every request. Entries expire
//! and may be evicted at any time; no code path may depend on a hit for
//! correctness. This is an optimization layer only, never the system of
//! record.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// A cached value with its expiry deadline.
struct CacheEntry {
    value: Vec<u8>,
    expires_at: Instant,
}

/// An in-memory key/value cache with a fixed TTL per entry.
pub struct ExpiringCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
    ttl: Duration,
}

impl ExpiringCache {
    /// Create a cache whose entries expire `ttl` after insertion.
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    /// Get a value if present and not expired. Expired entries are
    /// removed on access.
    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        let mut entries = self.entries.lock().unwrap();
        match entries.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => Some(entry.value.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    /// Insert a value, overwriting any previous entry for the key.
    pub fn put(&self, key: &str, value: Vec<u8>) {
        let mut entries = self.entries.lock().unwrap();
        entries.insert(
            key.to_string(),
            CacheEntry {
                value,
                expires_at: Instant::now() + self.ttl,
            },
        );
    }

    /// Remove a single entry.
    pub fn invalidate(&self, key: &str) {
        let mut entries = self.entries.lock().unwrap();
        entries.remove(key);
    }

    /// Remove every entry.
    pub fn flush(&self) {
        let mut entries = self.entries.lock().unwrap();
        entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hit_and_invalidate() {
        let cache = ExpiringCache::new(Duration::from_secs(60));

        assert_eq!(cache.get("k"), None);
        cache.put("k", b"v".to_vec());
        assert_eq!(cache.get("k"), Some(b"v".to_vec()));

        cache.invalidate("k");
        assert_eq!(cache.get("k"), None);
    }

    #[test]
    fn test_expiry() {
        let cache = ExpiringCache::new(Duration::from_millis(0));
        cache.put("k", b"v".to_vec());
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(cache.get("k"), None);
    }

    #[test]
    fn test_flush() {
        let cache = ExpiringCache::new(Duration::from_secs(60));
        cache.put("a", b"1".to_vec());
        cache.put("b", b"2".to_vec());
        cache.flush();
        assert_eq!(cache.get("a"), None);
        assert_eq!(cache.get("b"), None);
    }
}
