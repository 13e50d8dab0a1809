use lru::LruCache;
use std::hash::Hash;
use std::num::NonZeroUsize;

/// Memoizes values per key until [`RenderCache::clear`] is called.
///
/// `compute` runs at most once per distinct key between two clears. Bounded caches evict the
/// least recently used entry once full; evicted keys are recomputed on their next access.
///
/// Values are returned by clone, so `V` should be cheap to clone (handles, `Arc`s).
pub struct RenderCache<K: Hash + Eq, V> {
    entries: LruCache<K, V>,
}

impl<K: Hash + Eq, V: Clone> RenderCache<K, V> {
    pub fn unbounded() -> Self {
        Self {
            entries: LruCache::unbounded(),
        }
    }

    /// Creates a cache holding at most `capacity` entries (minimum 1).
    pub fn bounded(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: LruCache::new(capacity),
        }
    }

    pub fn get(&mut self, key: &K) -> Option<V> {
        self.entries.get(key).cloned()
    }

    pub fn contains(&self, key: &K) -> bool {
        self.entries.contains(key)
    }

    pub fn insert(&mut self, key: K, value: V) {
        self.entries.put(key, value);
    }

    pub fn remove(&mut self, key: &K) -> Option<V> {
        self.entries.pop(key)
    }

    pub fn get_or_insert_with(&mut self, key: K, compute: impl FnOnce(&K) -> V) -> V {
        if let Some(value) = self.entries.get(&key) {
            return value.clone();
        }
        let value = compute(&key);
        self.entries.put(key, value.clone());
        value
    }

    /// Like [`Self::get_or_insert_with`], but errors are returned to the caller and not cached.
    pub fn try_get_or_insert_with<E>(
        &mut self,
        key: K,
        compute: impl FnOnce(&K) -> Result<V, E>,
    ) -> Result<V, E> {
        if let Some(value) = self.entries.get(&key) {
            return Ok(value.clone());
        }
        let value = compute(&key)?;
        self.entries.put(key, value.clone());
        Ok(value)
    }

    /// Drops every entry. The next access per key recomputes.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Removes and returns every entry (used to dispose host objects on reconfiguration).
    pub fn drain(&mut self) -> Vec<(K, V)> {
        let mut out = Vec::with_capacity(self.entries.len());
        while let Some(entry) = self.entries.pop_lru() {
            out.push(entry);
        }
        out
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: Hash + Eq, V: Clone> Default for RenderCache<K, V> {
    fn default() -> Self {
        Self::unbounded()
    }
}

impl<K: Hash + Eq, V> std::fmt::Debug for RenderCache<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderCache")
            .field("len", &self.entries.len())
            .field("cap", &self.entries.cap())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn computes_once_per_key() {
        let calls = Cell::new(0);
        let mut cache: RenderCache<u32, String> = RenderCache::unbounded();
        for _ in 0..3 {
            let v = cache.get_or_insert_with(7, |k| {
                calls.set(calls.get() + 1);
                format!("v{k}")
            });
            assert_eq!(v, "v7");
        }
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn clear_forces_recompute() {
        let calls = Cell::new(0);
        let mut cache: RenderCache<&'static str, u32> = RenderCache::unbounded();
        let fetch = |cache: &mut RenderCache<&'static str, u32>| {
            cache.get_or_insert_with("k", |_| {
                calls.set(calls.get() + 1);
                calls.get()
            })
        };
        assert_eq!(fetch(&mut cache), 1);
        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(fetch(&mut cache), 2);
    }

    #[test]
    fn bounded_cache_evicts_least_recently_used() {
        let mut cache: RenderCache<u32, u32> = RenderCache::bounded(2);
        cache.insert(1, 10);
        cache.insert(2, 20);
        assert_eq!(cache.get(&1), Some(10));
        cache.insert(3, 30);
        assert!(cache.contains(&1));
        assert!(!cache.contains(&2));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn zero_capacity_is_treated_as_one() {
        let mut cache: RenderCache<u32, u32> = RenderCache::bounded(0);
        cache.insert(1, 1);
        cache.insert(2, 2);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn failed_computations_are_not_cached() {
        let mut cache: RenderCache<u32, u32> = RenderCache::unbounded();
        let err: Result<u32, &str> = cache.try_get_or_insert_with(1, |_| Err("boom"));
        assert!(err.is_err());
        assert!(!cache.contains(&1));
        assert_eq!(cache.try_get_or_insert_with(1, |_| Ok::<_, &str>(5)), Ok(5));
    }

    #[test]
    fn removed_keys_recompute() {
        let mut cache: RenderCache<u32, u32> = RenderCache::unbounded();
        cache.insert(1, 10);
        assert_eq!(cache.remove(&1), Some(10));
        assert_eq!(cache.remove(&1), None);
        assert_eq!(cache.get_or_insert_with(1, |_| 11), 11);
    }

    #[test]
    fn drain_empties_the_cache() {
        let mut cache: RenderCache<u32, u32> = RenderCache::unbounded();
        cache.insert(1, 1);
        cache.insert(2, 2);
        let mut drained = cache.drain();
        drained.sort();
        assert_eq!(drained, vec![(1, 1), (2, 2)]);
        assert!(cache.is_empty());
    }
}
