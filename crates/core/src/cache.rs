//! Read-through cache for extracted content.
//!
//! A plain TTL map keyed by the raw request URL. Entries are evicted by a
//! deferred task spawned at insert time, with an expiry check on read as
//! the backstop. Concurrent requests for the same URL before the first
//! completes are NOT deduplicated — each proceeds independently; writes
//! are idempotent so last-writer-wins is acceptable.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::content::ExtractedContent;

struct CacheEntry {
    data: ExtractedContent,
    expires_at: Instant,
}

/// TTL map of URL → extracted content.
#[derive(Clone)]
pub struct ContentCache {
    entries: Arc<Mutex<HashMap<String, CacheEntry>>>,
    ttl: Duration,
}

impl ContentCache {
    /// A cache with the given entry lifetime.
    pub fn new(ttl: Duration) -> Self {
        Self { entries: Arc::new(Mutex::new(HashMap::new())), ttl }
    }

    /// The configured 24-hour production cache.
    pub fn with_default_ttl() -> Self {
        Self::new(Duration::from_secs(crate::config::cache_ttl_secs()))
    }

    /// Returns a clone of the cached content when present and fresh.
    pub async fn get(&self, url: &str) -> Option<ExtractedContent> {
        let mut entries = self.entries.lock().await;
        match entries.get(url) {
            Some(entry) if entry.expires_at > Instant::now() => Some(entry.data.clone()),
            Some(_) => {
                entries.remove(url);
                None
            }
            None => None,
        }
    }

    /// Stores content and schedules its eviction.
    pub async fn insert(&self, url: String, data: ExtractedContent) {
        let expires_at = Instant::now() + self.ttl;
        {
            let mut entries = self.entries.lock().await;
            entries.insert(url.clone(), CacheEntry { data, expires_at });
        }

        let entries = Arc::clone(&self.entries);
        let ttl = self.ttl;
        tokio::spawn(async move {
            tokio::time::sleep(ttl).await;
            let mut entries = entries.lock().await;
            // A later insert may have refreshed the entry; only evict
            // entries that are actually stale.
            if let Some(entry) = entries.get(&url)
                && entry.expires_at <= Instant::now()
            {
                entries.remove(&url);
            }
        });
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }
}
