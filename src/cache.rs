//! Bounded TTL caches for fetched part text and parsed part content
//!
//! Both caches are keyed by (book id, part index), evict least recently used
//! entries over capacity and expire entries lazily on access.

use crate::reader::ParsedPart;
use lru::LruCache;
use std::hash::Hash;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::OnceCell;
use tokio::time::Instant;

pub const MAX_PART_CACHE_ENTRIES: usize = 24;
pub const PART_CACHE_TTL: Duration = Duration::from_secs(30 * 60);
pub const MAX_PARSED_CACHE_ENTRIES: usize = 10;
pub const PARSED_CACHE_TTL: Duration = Duration::from_secs(20 * 60);

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PartKey {
    pub book_id: String,
    pub part_index: usize,
}

impl PartKey {
    pub fn new(book_id: &str, part_index: usize) -> Self {
        Self {
            book_id: book_id.trim().to_string(),
            part_index,
        }
    }
}

struct CacheEntry<V> {
    value: V,
    created_at: Instant,
}

/// LRU map whose entries also expire `ttl` after they were stored.
pub struct TtlLruCache<K: Hash + Eq, V> {
    entries: LruCache<K, CacheEntry<V>>,
    ttl: Duration,
}

impl<K: Hash + Eq + Clone, V: Clone> TtlLruCache<K, V> {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: LruCache::new(capacity),
            ttl,
        }
    }

    fn is_expired(&self, entry: &CacheEntry<V>) -> bool {
        entry.created_at.elapsed() > self.ttl
    }

    /// Fresh value for `key`, marking it most recently used. Expired entries
    /// are dropped on the way.
    pub fn get(&mut self, key: &K) -> Option<V> {
        let expired = self.is_expired(self.entries.peek(key)?);
        if expired {
            self.entries.pop(key);
            return None;
        }
        self.entries.get(key).map(|entry| entry.value.clone())
    }

    /// Store a new entry, replacing any previous one for `key`.
    pub fn put(&mut self, key: K, value: V) {
        self.prune_expired();
        self.entries.put(
            key,
            CacheEntry {
                value,
                created_at: Instant::now(),
            },
        );
    }

    pub fn remove(&mut self, key: &K) -> Option<V> {
        self.entries.pop(key).map(|entry| entry.value)
    }

    /// Remove every entry whose key matches `predicate`.
    pub fn remove_where(&mut self, predicate: impl Fn(&K) -> bool) -> usize {
        let doomed: Vec<K> = self
            .entries
            .iter()
            .filter(|(key, _)| predicate(key))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &doomed {
            self.entries.pop(key);
        }
        doomed.len()
    }

    pub fn prune_expired(&mut self) -> usize {
        let ttl = self.ttl;
        let expired: Vec<K> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.created_at.elapsed() > ttl)
            .map(|(key, _)| key.clone())
            .collect();
        for key in &expired {
            self.entries.pop(key);
        }
        if !expired.is_empty() {
            tracing::trace!(count = expired.len(), "pruned expired cache entries");
        }
        expired.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.entries.cap().get()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

/// Shared cell for one part fetch. Concurrent readers of the same part wait
/// on the same cell instead of fetching twice.
pub type PartSlot = Arc<OnceCell<Option<Arc<str>>>>;

/// Raw part text, including fetches still in flight.
pub struct PartTextCache {
    inner: Mutex<TtlLruCache<PartKey, PartSlot>>,
}

impl PartTextCache {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            inner: Mutex::new(TtlLruCache::new(capacity, ttl)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, TtlLruCache<PartKey, PartSlot>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Existing slot for `key`, or a new empty one registered in its place.
    /// With `force` any existing slot is replaced.
    pub fn slot(&self, key: &PartKey, force: bool) -> PartSlot {
        let mut cache = self.lock();
        if !force {
            if let Some(slot) = cache.get(key) {
                return slot;
            }
        }
        let slot: PartSlot = Arc::new(OnceCell::new());
        cache.put(key.clone(), Arc::clone(&slot));
        slot
    }

    /// Drop `slot` for `key` if it is still the registered one.
    pub fn invalidate(&self, key: &PartKey, slot: &PartSlot) {
        let mut cache = self.lock();
        if let Some(current) = cache.get(key) {
            if Arc::ptr_eq(&current, slot) {
                cache.remove(key);
            }
        }
    }

    pub fn clear_book(&self, book_id: &str) -> usize {
        let book_id = book_id.trim();
        self.lock().remove_where(|key| key.book_id == book_id)
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn stats(&self) -> (usize, usize) {
        let cache = self.lock();
        (cache.len(), cache.capacity())
    }
}

impl Default for PartTextCache {
    fn default() -> Self {
        Self::new(MAX_PART_CACHE_ENTRIES, PART_CACHE_TTL)
    }
}

/// Parsed part content with its book search engine.
pub struct ParsedContentCache {
    inner: Mutex<TtlLruCache<PartKey, Arc<ParsedPart>>>,
}

impl ParsedContentCache {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            inner: Mutex::new(TtlLruCache::new(capacity, ttl)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, TtlLruCache<PartKey, Arc<ParsedPart>>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn get(&self, key: &PartKey) -> Option<Arc<ParsedPart>> {
        self.lock().get(key)
    }

    pub fn put(&self, key: PartKey, parsed: Arc<ParsedPart>) {
        self.lock().put(key, parsed);
    }

    pub fn clear_book(&self, book_id: &str) -> usize {
        let book_id = book_id.trim();
        self.lock().remove_where(|key| key.book_id == book_id)
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn stats(&self) -> (usize, usize) {
        let cache = self.lock();
        (cache.len(), cache.capacity())
    }
}

impl Default for ParsedContentCache {
    fn default() -> Self {
        Self::new(MAX_PARSED_CACHE_ENTRIES, PARSED_CACHE_TTL)
    }
}
