//! Cache storage.
//!
//! [`CacheStore`] is the contract the decision engine consumes;
//! [`MemoryCacheStore`] is the bundled in-process implementation.

use std::sync::RwLock;

use async_trait::async_trait;
use lru::LruCache;
use metrics::counter;
use time::OffsetDateTime;
use tracing::debug;

use super::config::CacheConfig;
use super::entry::{CacheEntry, EntryKey};
use super::error::StoreError;
use super::lock::{rw_read, rw_write};
use super::metrics::METRIC_EVICT_TOTAL;
use super::registry::TagRegistry;
use super::tags::TagSet;

const SOURCE: &str = "cache::store";

/// Persistence backend for page cache entries.
///
/// Implementations must make a completed `set` visible to every later
/// `get` for the same key, and must never hand out a partially written
/// entry.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Look up the live entry for `(uri, method)`.
    ///
    /// A miss, including an expired entry, is `StoreError::NoSuchCacheEntry`.
    async fn get(&self, uri: &str, method: &str) -> Result<CacheEntry, StoreError>;

    /// Write `entry`, superseding any entry with the same key, and index it
    /// under `tags`.
    async fn set(&self, entry: CacheEntry, tags: TagSet) -> Result<(), StoreError>;

    /// Remove every entry carrying `tag`, returning how many were removed.
    async fn invalidate_by_tag(&self, tag: &str) -> Result<usize, StoreError>;

    async fn invalidate_by_tags(&self, tags: &[String]) -> Result<usize, StoreError> {
        let mut removed = 0;
        for tag in tags {
            removed += self.invalidate_by_tag(tag).await?;
        }
        Ok(removed)
    }
}

struct Inner {
    entries: LruCache<EntryKey, CacheEntry>,
    registry: TagRegistry,
}

impl Inner {
    fn remove(&mut self, key: &EntryKey) -> bool {
        self.registry.unregister(key);
        self.entries.pop(key).is_some()
    }
}

/// LRU-bounded in-memory store with a tag index.
///
/// Entries and their tag associations share one lock, so a reader never
/// sees an entry whose tags are still being written.
pub struct MemoryCacheStore {
    inner: RwLock<Inner>,
}

impl MemoryCacheStore {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            inner: RwLock::new(Inner {
                entries: LruCache::new(config.memory_entry_limit_non_zero()),
                registry: TagRegistry::new(),
            }),
        }
    }

    /// Lookup against an explicit clock.
    pub fn get_at(
        &self,
        uri: &str,
        method: &str,
        now: OffsetDateTime,
    ) -> Result<CacheEntry, StoreError> {
        let key = EntryKey::new(method, uri);
        let mut inner = rw_write(&self.inner, SOURCE, "get");

        match inner.entries.get(&key) {
            None => return Err(StoreError::not_found(method, uri)),
            Some(entry) if !entry.is_expired(now) => return Ok(entry.clone()),
            Some(_) => {}
        }

        inner.remove(&key);
        debug!(cache = "page", key = %key, "Dropped expired entry on read");
        Err(StoreError::not_found(method, uri))
    }

    /// Drop every entry expired at `now`, returning how many were removed.
    pub fn purge_expired(&self, now: OffsetDateTime) -> usize {
        let mut inner = rw_write(&self.inner, SOURCE, "purge_expired");
        let expired: Vec<EntryKey> = inner
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_expired(now))
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired {
            inner.remove(key);
        }
        expired.len()
    }

    pub fn clear(&self) {
        let mut inner = rw_write(&self.inner, SOURCE, "clear");
        inner.entries.clear();
        inner.registry.clear();
    }

    pub fn keys_for_tag(&self, tag: &str) -> Vec<EntryKey> {
        let mut keys: Vec<EntryKey> = rw_read(&self.inner, SOURCE, "keys_for_tag")
            .registry
            .keys_for_tag(tag)
            .into_iter()
            .collect();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        rw_read(&self.inner, SOURCE, "len").entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn tag_count(&self) -> usize {
        rw_read(&self.inner, SOURCE, "tag_count").registry.tag_count()
    }

    /// Tags `key` is indexed under, sorted.
    pub fn tags_for_key(&self, key: &EntryKey) -> Vec<String> {
        let mut tags: Vec<String> = rw_read(&self.inner, SOURCE, "tags_for_key")
            .registry
            .tags_for_key(key)
            .into_iter()
            .collect();
        tags.sort();
        tags
    }

    /// Entries reachable from at least one tag.
    pub fn tagged_entry_count(&self) -> usize {
        rw_read(&self.inner, SOURCE, "tagged_entry_count")
            .registry
            .key_count()
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn get(&self, uri: &str, method: &str) -> Result<CacheEntry, StoreError> {
        self.get_at(uri, method, OffsetDateTime::now_utc())
    }

    async fn set(&self, entry: CacheEntry, tags: TagSet) -> Result<(), StoreError> {
        let key = entry.key();
        let mut inner = rw_write(&self.inner, SOURCE, "set");

        inner.registry.unregister(&key);
        if let Some((evicted, _)) = inner.entries.push(key.clone(), entry)
            && evicted != key
        {
            inner.registry.unregister(&evicted);
            counter!(METRIC_EVICT_TOTAL).increment(1);
            debug!(cache = "page", key = %evicted, "Evicted entry at capacity");
        }
        inner.registry.register(key, tags);
        Ok(())
    }

    async fn invalidate_by_tag(&self, tag: &str) -> Result<usize, StoreError> {
        let mut inner = rw_write(&self.inner, SOURCE, "invalidate_by_tag");
        let keys = inner.registry.take_tag(tag);

        let mut removed = 0;
        for key in &keys {
            if inner.entries.pop(key).is_some() {
                removed += 1;
            }
        }
        Ok(removed)
    }
}
