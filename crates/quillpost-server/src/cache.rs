//! Response cache for idempotent reads.
//!
//! Entries expire passively: a lookup that finds an expired entry removes it
//! and reports a miss. Writes never invalidate anything, so a listing may be
//! stale for up to the TTL after the underlying posts change.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use axum::body::Bytes;
use axum::http::StatusCode;
use dashmap::DashMap;
use quillpost_core::{AccountId, PageRequest};

use crate::config::CacheConfig;

/// A response body and status captured for replay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedResponse {
    pub status: StatusCode,
    pub body: Bytes,
}

/// A cached response with TTL support.
#[derive(Clone, Debug)]
pub struct CachedEntry {
    pub response: Arc<CachedResponse>,
    pub cached_at: Instant,
    pub ttl: Duration,
}

impl CachedEntry {
    pub fn new(response: CachedResponse, ttl: Duration) -> Self {
        Self {
            response: Arc::new(response),
            cached_at: Instant::now(),
            ttl,
        }
    }

    /// Check if this entry has expired.
    pub fn is_expired(&self) -> bool {
        self.cached_at.elapsed() >= self.ttl
    }
}

/// Builds the key for a cached post listing.
///
/// The key holds everything the response depends on: the endpoint, the
/// caller, and the normalized page request.
pub fn list_posts_key(account: AccountId, page: PageRequest) -> String {
    format!(
        "list_posts:account={account}:page={}:per_page={}",
        page.page, page.per_page
    )
}

/// Bounded in-memory response cache.
#[derive(Debug)]
pub struct ResponseCache {
    entries: DashMap<String, CachedEntry>,
    ttl: Duration,
    max_entries: usize,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl ResponseCache {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            entries: DashMap::new(),
            ttl: config.ttl,
            max_entries: config.max_entries,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    /// Default time-to-live for new entries.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn get(&self, key: &str) -> Option<Arc<CachedResponse>> {
        if let Some(entry) = self.entries.get(key) {
            if !entry.is_expired() {
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Some(entry.response.clone());
            }
            // Entry expired, remove it
            drop(entry);
            self.entries.remove_if(key, |_, e| e.is_expired());
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    /// Stores a response for `ttl`.
    ///
    /// When the cache is full, expired entries are purged first; if it is
    /// still full the insertion is skipped.
    pub fn put(&self, key: impl Into<String>, response: CachedResponse, ttl: Duration) {
        let key = key.into();
        if self.entries.len() >= self.max_entries && !self.entries.contains_key(&key) {
            let removed = self.cleanup_expired();
            self.evictions.fetch_add(removed as u64, Ordering::Relaxed);

            if self.entries.len() >= self.max_entries {
                tracing::warn!(
                    max_entries = self.max_entries,
                    "Response cache at capacity, skipping insertion"
                );
                return;
            }
        }

        self.entries.insert(key, CachedEntry::new(response, ttl));
    }

    /// Removes expired entries, returning how many were dropped.
    pub fn cleanup_expired(&self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired());
        before.saturating_sub(self.entries.len())
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            size: self.entries.len(),
            max_size: self.max_entries,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }
}

/// Statistics for the response cache.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of entries currently in the cache.
    pub size: usize,
    /// Maximum allowed entries.
    pub max_size: usize,
    pub hits: u64,
    pub misses: u64,
    /// Number of entries purged to make room.
    pub evictions: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache(max_entries: usize) -> ResponseCache {
        ResponseCache::new(&CacheConfig {
            ttl: Duration::from_secs(60),
            max_entries,
        })
    }

    fn response(body: &'static str) -> CachedResponse {
        CachedResponse {
            status: StatusCode::OK,
            body: Bytes::from_static(body.as_bytes()),
        }
    }

    #[test]
    fn test_hit_and_miss() {
        let cache = cache(10);
        assert!(cache.get("k").is_none());

        cache.put("k", response("a"), cache.ttl());
        assert_eq!(cache.get("k").unwrap().body, Bytes::from_static(b"a"));

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.size, 1);
    }

    #[test]
    fn test_expired_entry_is_miss_and_removed() {
        let cache = cache(10);
        cache.put("k", response("a"), Duration::from_millis(20));
        std::thread::sleep(Duration::from_millis(40));

        assert!(cache.get("k").is_none());
        assert_eq!(cache.stats().size, 0);
    }

    #[test]
    fn test_full_cache_purges_expired_first() {
        let cache = cache(2);
        cache.put("old", response("a"), Duration::ZERO);
        cache.put("live", response("b"), Duration::from_secs(60));

        cache.put("new", response("c"), Duration::from_secs(60));
        assert!(cache.get("new").is_some());
        assert!(cache.get("live").is_some());
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn test_full_cache_skips_insertion() {
        let cache = cache(1);
        cache.put("a", response("a"), Duration::from_secs(60));
        cache.put("b", response("b"), Duration::from_secs(60));

        assert!(cache.get("a").is_some());
        assert!(cache.get("b").is_none());

        // Overwriting an existing key is always allowed.
        cache.put("a", response("z"), Duration::from_secs(60));
        assert_eq!(cache.get("a").unwrap().body, Bytes::from_static(b"z"));
    }

    #[test]
    fn test_list_key_distinguishes_callers_and_pages() {
        let page = PageRequest { page: 1, per_page: 10 };
        let a = list_posts_key(AccountId::new(1), page);
        let b = list_posts_key(AccountId::new(2), page);
        let c = list_posts_key(AccountId::new(1), PageRequest { page: 2, per_page: 10 });
        assert_ne!(a, b);
        assert_ne!(a, c);
        assert_eq!(a, list_posts_key(AccountId::new(1), PageRequest::resolve(None, None, 10, 100)));
    }
}
