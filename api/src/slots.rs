//! Global search slots, one per client session

use chrono::Utc;
use lru::LruCache;
use maktaba_lib::{GlobalSearch, SearchConfig, SearchGeneration};
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::Mutex as AsyncMutex;

pub const MAX_SEARCH_SLOTS: usize = 64;

pub struct SearchSlot {
    /// Shared with the slot's `GlobalSearch`. Bump it before waiting on
    /// `search` so a scan in progress gives the lock back.
    pub generation: SearchGeneration,
    pub search: AsyncMutex<GlobalSearch>,
}

impl SearchSlot {
    fn new(config: SearchConfig) -> Self {
        let generation = SearchGeneration::new();
        Self {
            search: AsyncMutex::new(GlobalSearch::with_generation(config, generation.clone())),
            generation,
        }
    }
}

pub struct SearchSlots {
    slots: Mutex<LruCache<String, Arc<SearchSlot>>>,
    config: SearchConfig,
    next_id: AtomicU64,
}

impl SearchSlots {
    pub fn new(capacity: usize, config: SearchConfig) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            slots: Mutex::new(LruCache::new(capacity)),
            config,
            next_id: AtomicU64::new(0),
        }
    }

    pub fn get(&self, id: &str) -> Option<Arc<SearchSlot>> {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots.get(id).cloned()
    }

    /// Slot for `id`, or a new slot under a fresh id.
    pub fn get_or_create(&self, id: Option<&str>) -> (String, Arc<SearchSlot>) {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(id) = id.map(str::trim).filter(|id| !id.is_empty()) {
            if let Some(slot) = slots.get(id) {
                return (id.to_string(), Arc::clone(slot));
            }
        }

        let id = self.fresh_id();
        let slot = Arc::new(SearchSlot::new(self.config.clone()));
        if let Some((evicted_id, evicted)) = slots.push(id.clone(), Arc::clone(&slot)) {
            evicted.generation.cancel();
            tracing::debug!(session = %evicted_id, "evicted search slot");
        }
        (id, slot)
    }

    pub fn len(&self) -> usize {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    fn fresh_id(&self) -> String {
        let seq = self.next_id.fetch_add(1, Ordering::Relaxed);
        format!("{:x}-{:x}", Utc::now().timestamp_millis(), seq)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reuses_known_ids() {
        let slots = SearchSlots::new(4, SearchConfig::default());
        let (id, first) = slots.get_or_create(None);
        let (same_id, again) = slots.get_or_create(Some(&id));
        assert_eq!(id, same_id);
        assert!(Arc::ptr_eq(&first, &again));

        let (other, _) = slots.get_or_create(Some("unknown"));
        assert_ne!(other, "unknown");
        assert_eq!(slots.len(), 2);
    }

    #[test]
    fn test_eviction_cancels_the_slot() {
        let slots = SearchSlots::new(1, SearchConfig::default());
        let (id, first) = slots.get_or_create(None);
        let token = first.generation.begin();
        slots.get_or_create(None);

        assert!(slots.get(&id).is_none());
        assert!(!token.is_active());
    }
}
