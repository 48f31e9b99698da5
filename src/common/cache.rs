//! Bounded LRU map with an eviction hook.

use std::fmt::{self, Debug, Formatter};
use std::hash::Hash;
use std::num::NonZeroUsize;

use lru::LruCache;

type EvictionHook<K, V> = Box<dyn FnMut(&K, &V) + Send>;

/// Bounded map evicting the least recently used entry when full.
///
/// Values are cloned out on reads, the cache keeps sole ownership of what it
/// stores. The eviction hook runs before an evicted entry is dropped, but not
/// for [BoundedCache::remove] or [BoundedCache::flush].
pub struct BoundedCache<K: Hash + Eq, V> {
    entries: LruCache<K, V>,
    on_evict: Option<EvictionHook<K, V>>,
}

impl<K: Hash + Eq, V: Clone> BoundedCache<K, V> {
    pub fn new(capacity: NonZeroUsize) -> Self {
        BoundedCache {
            entries: LruCache::new(capacity),
            on_evict: None,
        }
    }

    pub fn with_eviction_hook(
        capacity: NonZeroUsize,
        hook: impl FnMut(&K, &V) + Send + 'static,
    ) -> Self {
        BoundedCache {
            entries: LruCache::new(capacity),
            on_evict: Some(Box::new(hook)),
        }
    }

    // === Getters ===

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.entries.cap().get()
    }

    pub fn contains(&self, key: &K) -> bool {
        self.entries.contains(key)
    }

    /// Read without touching the recency order.
    pub fn peek(&self, key: &K) -> Option<V> {
        self.entries.peek(key).cloned()
    }

    // === Public Methods ===

    /// Read and mark as most recently used.
    pub fn get(&mut self, key: &K) -> Option<V> {
        self.entries.get(key).cloned()
    }

    /// Insert or replace, marking `key` as most recently used.
    pub fn insert(&mut self, key: K, value: V) {
        if !self.entries.contains(&key) && self.entries.len() >= self.capacity() {
            if let Some((evicted_key, evicted_value)) = self.entries.pop_lru() {
                if let Some(hook) = self.on_evict.as_mut() {
                    hook(&evicted_key, &evicted_value);
                }
            }
        }

        self.entries.put(key, value);
    }

    pub fn remove(&mut self, key: &K) -> Option<V> {
        self.entries.pop(key)
    }

    /// Drop every entry without calling the eviction hook.
    pub fn flush(&mut self) {
        self.entries.clear();
    }

    /// Remove every entry for which `predicate` is false, without calling the hook.
    pub fn retain(&mut self, mut predicate: impl FnMut(&K, &V) -> bool)
    where
        K: Clone,
    {
        let stale = self
            .entries
            .iter()
            .filter(|(key, value)| !predicate(key, value))
            .map(|(key, _)| key.clone())
            .collect::<Vec<_>>();

        for key in stale {
            self.entries.pop(&key);
        }
    }
}

impl<K: Hash + Eq, V> Debug for BoundedCache<K, V> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundedCache")
            .field("len", &self.entries.len())
            .field("capacity", &self.entries.cap())
            .field("on_evict", &self.on_evict.is_some())
            .finish()
    }
}

#[cfg(test)]
mod test {
    use std::sync::{Arc, Mutex};

    use super::*;

    fn capacity(n: usize) -> NonZeroUsize {
        NonZeroUsize::new(n).unwrap()
    }

    #[test]
    fn evicts_least_recently_used() {
        let evicted = Arc::new(Mutex::new(Vec::new()));
        let log = evicted.clone();

        let mut cache = BoundedCache::with_eviction_hook(capacity(2), move |k: &u8, v: &String| {
            log.lock().unwrap().push((*k, v.clone()));
        });

        cache.insert(1, "one".to_string());
        cache.insert(2, "two".to_string());
        assert_eq!(cache.get(&1), Some("one".to_string()));

        cache.insert(3, "three".to_string());

        assert_eq!(cache.len(), 2);
        assert!(!cache.contains(&2));
        assert_eq!(*evicted.lock().unwrap(), vec![(2, "two".to_string())]);
    }

    #[test]
    fn insert_replaces_without_evicting() {
        let evictions = Arc::new(Mutex::new(0));
        let count = evictions.clone();

        let mut cache = BoundedCache::with_eviction_hook(capacity(2), move |_: &u8, _: &u8| {
            *count.lock().unwrap() += 1;
        });

        cache.insert(1, 10);
        cache.insert(2, 20);
        cache.insert(1, 11);
        cache.insert(3, 30);

        assert_eq!(cache.peek(&1), Some(11));
        assert!(!cache.contains(&2));
        assert_eq!(*evictions.lock().unwrap(), 1);
    }

    #[test]
    fn flush_and_remove_skip_the_hook() {
        let evictions = Arc::new(Mutex::new(0));
        let count = evictions.clone();

        let mut cache = BoundedCache::with_eviction_hook(capacity(4), move |_: &u8, _: &u8| {
            *count.lock().unwrap() += 1;
        });

        cache.insert(1, 1);
        cache.insert(2, 2);
        cache.insert(3, 3);

        assert_eq!(cache.remove(&1), Some(1));
        cache.retain(|k, _| *k != 2);
        assert_eq!(cache.len(), 1);

        cache.flush();
        assert!(cache.is_empty());
        assert_eq!(*evictions.lock().unwrap(), 0);
    }
}
