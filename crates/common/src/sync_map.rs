//! Coarse-grained thread-safe map.
//!
//! [`SyncMap`] wraps a `HashMap` in one `std::sync::Mutex` per instance. Every
//! read and write takes the same lock, which keeps compound operations such
//! as [`SyncMap::insert_or_update`] atomic. Suitable for configuration and
//! lookup tables; not meant for hot-path state.

use std::{
    borrow::Borrow,
    collections::HashMap,
    fmt,
    hash::Hash,
    sync::{Mutex, MutexGuard},
};

pub struct SyncMap<K, V> {
    inner: Mutex<HashMap<K, V>>,
}

impl<K, V> SyncMap<K, V>
where
    K: Eq + Hash,
{
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(HashMap::with_capacity(capacity)),
        }
    }

    // A poisoned lock only means another thread panicked mid-operation;
    // HashMap stays structurally valid, so keep serving.
    fn lock(&self) -> MutexGuard<'_, HashMap<K, V>> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.lock().contains_key(key)
    }

    /// Insert a value, returning the one it replaced.
    pub fn insert(&self, key: K, value: V) -> Option<V> {
        self.lock().insert(key, value)
    }

    /// Insert only if the key is absent. Returns the rejected value otherwise.
    pub fn try_insert(&self, key: K, value: V) -> Result<(), V> {
        let mut map = self.lock();
        if map.contains_key(&key) {
            return Err(value);
        }
        map.insert(key, value);
        Ok(())
    }

    pub fn remove<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.lock().remove(key)
    }

    /// Remove the entry only when `predicate` accepts its current value.
    pub fn remove_if<Q, F>(&self, key: &Q, predicate: F) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
        F: FnOnce(&V) -> bool,
    {
        let mut map = self.lock();
        if map.get(key).is_some_and(predicate) {
            map.remove(key)
        } else {
            None
        }
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Run `f` against the current value without cloning it.
    pub fn with<Q, R, F>(&self, key: &Q, f: F) -> Option<R>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
        F: FnOnce(&V) -> R,
    {
        self.lock().get(key).map(f)
    }
}

impl<K, V> SyncMap<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn get<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.lock().get(key).cloned()
    }

    /// Return the existing value, or store and return `value`.
    pub fn get_or_insert(&self, key: K, value: V) -> V {
        self.lock().entry(key).or_insert(value).clone()
    }

    /// Return the existing value, or store and return `factory(&key)`.
    ///
    /// The factory runs without the lock held, so it may read this map. When
    /// two callers race on a missing key both factories run and the first
    /// stored value wins.
    pub fn get_or_insert_with<F>(&self, key: K, factory: F) -> V
    where
        F: FnOnce(&K) -> V,
    {
        if let Some(value) = self.lock().get(&key) {
            return value.clone();
        }
        let value = factory(&key);
        self.lock().entry(key).or_insert(value).clone()
    }

    /// Store `add` for a new key, or replace an existing value with
    /// `update(&key, &old)`. Returns the stored value.
    pub fn insert_or_update<F>(&self, key: K, add: V, update: F) -> V
    where
        F: FnOnce(&K, &V) -> V,
    {
        self.insert_or_update_with(key, |_| add, update)
    }

    /// Like [`Self::insert_or_update`] with a lazily-built initial value.
    ///
    /// `add` and `update` run under the lock and must not touch this map.
    pub fn insert_or_update_with<A, U>(&self, key: K, add: A, update: U) -> V
    where
        A: FnOnce(&K) -> V,
        U: FnOnce(&K, &V) -> V,
    {
        let mut map = self.lock();
        let value = match map.get(&key) {
            Some(old) => update(&key, old),
            None => add(&key),
        };
        map.insert(key, value.clone());
        value
    }

    /// Copy of all keys, taken under the lock.
    pub fn keys(&self) -> Vec<K> {
        self.lock().keys().cloned().collect()
    }

    /// Copy of all values, taken under the lock.
    pub fn values(&self) -> Vec<V> {
        self.lock().values().cloned().collect()
    }

    /// Copy of the whole map, taken under the lock.
    pub fn snapshot(&self) -> HashMap<K, V> {
        self.lock().clone()
    }
}

impl<K: Eq + Hash, V> Default for SyncMap<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Eq + Hash, V> From<HashMap<K, V>> for SyncMap<K, V> {
    fn from(map: HashMap<K, V>) -> Self {
        Self {
            inner: Mutex::new(map),
        }
    }
}

impl<K: Eq + Hash, V> FromIterator<(K, V)> for SyncMap<K, V> {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self::from(iter.into_iter().collect::<HashMap<K, V>>())
    }
}

impl<K, V> fmt::Debug for SyncMap<K, V>
where
    K: Eq + Hash + fmt::Debug,
    V: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let map = self.lock();
        f.debug_map().entries(map.iter()).finish()
    }
}
