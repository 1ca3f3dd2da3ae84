use std::borrow::Borrow;
use std::collections::{BTreeMap, HashMap};
use std::hash::Hash;
use std::sync::{Mutex, MutexGuard};

/// Number of package id -> app name entries kept by the detector
pub const DEFAULT_APP_NAME_CACHE_SIZE: usize = 100;

struct Entry<V> {
    value: V,
    tick: u64,
}

struct Inner<K, V> {
    entries: HashMap<K, Entry<V>>,
    /// tick -> key, oldest first
    order: BTreeMap<u64, K>,
    tick: u64,
}

impl<K: Eq + Hash + Clone, V> Inner<K, V> {
    fn next_tick(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }

    fn evict_oldest(&mut self) -> Option<(K, V)> {
        let (_, key) = self.order.pop_first()?;
        let entry = self.entries.remove(&key)?;
        Some((key, entry.value))
    }
}

/// A fixed capacity map that evicts the least recently used entry when full.
///
/// All bookkeeping happens under a single lock, so it can be shared between
/// threads and every `get`/`put` is atomic with respect to eviction.
pub struct LruCache<K, V> {
    capacity: usize,
    inner: Mutex<Inner<K, V>>,
}

impl<K: Eq + Hash + Clone, V: Clone> LruCache<K, V> {
    /// Create a cache holding at most `capacity` entries. A capacity of zero
    /// is treated as one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            inner: Mutex::new(Inner {
                entries: HashMap::with_capacity(capacity),
                order: BTreeMap::new(),
                tick: 0,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner<K, V>> {
        // The maps are never left half updated, a poisoned lock is still usable
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns a copy of the cached value and marks it as most recently used
    pub fn get<Q: ?Sized>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Eq + Hash,
    {
        let mut guard = self.lock();
        let inner = &mut *guard;
        let tick = inner.tick + 1;
        let entry = inner.entries.get_mut(key)?;
        let owned = inner.order.remove(&entry.tick)?;
        entry.tick = tick;
        let value = entry.value.clone();
        inner.order.insert(tick, owned);
        inner.tick = tick;
        Some(value)
    }

    /// Same as [LruCache::get] but doesn't touch the recency order
    pub fn peek<Q: ?Sized>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Eq + Hash,
    {
        self.lock().entries.get(key).map(|e| e.value.clone())
    }

    pub fn contains<Q: ?Sized>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Eq + Hash,
    {
        self.lock().entries.contains_key(key)
    }

    /// Insert or update `key`, making it the most recently used entry.
    ///
    /// Returns the evicted entry if inserting a new key pushed the cache
    /// over capacity. Updating an existing key never evicts.
    pub fn put(&self, key: K, value: V) -> Option<(K, V)> {
        let mut guard = self.lock();
        let inner = &mut *guard;
        let tick = inner.next_tick();

        if let Some(entry) = inner.entries.get_mut(&key) {
            inner.order.remove(&entry.tick);
            entry.tick = tick;
            entry.value = value;
            inner.order.insert(tick, key);
            return None;
        }

        let evicted = if inner.entries.len() >= self.capacity {
            inner.evict_oldest()
        } else {
            None
        };

        inner.order.insert(tick, key.clone());
        inner.entries.insert(key, Entry { value, tick });
        evicted
    }

    pub fn remove<Q: ?Sized>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Eq + Hash,
    {
        let mut guard = self.lock();
        let entry = guard.entries.remove(key)?;
        guard.order.remove(&entry.tick);
        Some(entry.value)
    }

    pub fn clear(&self) {
        let mut guard = self.lock();
        guard.entries.clear();
        guard.order.clear();
    }
}
