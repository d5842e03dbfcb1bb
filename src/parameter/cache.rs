//! Bounded memo table with oldest-first eviction.

use lru::LruCache;
use std::fmt;
use std::hash::Hash;
use std::num::NonZeroUsize;

/// Insertion-ordered cache holding at most `capacity` entries.
///
/// Once full, inserting a new key evicts the entry that was inserted first.
/// Reads and overwrites do not refresh an entry's position. A capacity of
/// zero disables the cache entirely.
pub struct BoundedCache<K, V> {
    capacity: usize,
    inner: Option<LruCache<K, V>>,
}

impl<K: Eq + Hash + Clone, V: Clone> BoundedCache<K, V> {
    /// Empty cache.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            inner: NonZeroUsize::new(capacity).map(LruCache::new),
        }
    }

    /// Maximum number of entries.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Cached value for `key`.
    pub fn get(&self, key: &K) -> Option<V> {
        self.inner.as_ref()?.peek(key).cloned()
    }

    /// Store `value`, evicting the oldest entry when full.
    pub fn insert(&mut self, key: K, value: V) {
        let Some(inner) = self.inner.as_mut() else {
            return;
        };
        if let Some(slot) = inner.peek_mut(&key) {
            *slot = value;
            return;
        }
        inner.put(key, value);
    }

    /// Drop every entry for which `keep` returns false.
    pub fn retain(&mut self, mut keep: impl FnMut(&K) -> bool) {
        let Some(inner) = self.inner.as_mut() else {
            return;
        };
        let doomed: Vec<K> = inner
            .iter()
            .filter(|(k, _)| !keep(*k))
            .map(|(k, _)| k.clone())
            .collect();
        for key in doomed {
            inner.pop(&key);
        }
    }

    /// Drop everything.
    pub fn clear(&mut self) {
        if let Some(inner) = self.inner.as_mut() {
            inner.clear();
        }
    }

    /// Number of cached entries.
    pub fn len(&self) -> usize {
        self.inner.as_ref().map_or(0, LruCache::len)
    }

    /// True when nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<K: Eq + Hash + Clone, V: Clone> Clone for BoundedCache<K, V> {
    fn clone(&self) -> Self {
        let mut out = Self::new(self.capacity);
        if let (Some(from), Some(to)) = (self.inner.as_ref(), out.inner.as_mut()) {
            // oldest first, so eviction order carries over
            for (k, v) in from.iter().rev() {
                to.put(k.clone(), v.clone());
            }
        }
        out
    }
}

impl<K: Eq + Hash, V> fmt::Debug for BoundedCache<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundedCache")
            .field("capacity", &self.capacity)
            .field("len", &self.inner.as_ref().map_or(0, LruCache::len))
            .finish()
    }
}
