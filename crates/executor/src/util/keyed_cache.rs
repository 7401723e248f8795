//! Generic concurrency-safe keyed cache

use std::hash::Hash;
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

/// A cheaply clonable, sharded keyed map.
///
/// Clones share the same storage, so a clone can be handed to an event
/// handler while the owner keeps using the original. Closures passed to
/// [`KeyedCache::update`], [`KeyedCache::upsert`] and [`KeyedCache::retain`]
/// run under the shard lock of their entry and must not access the cache.
pub struct KeyedCache<K, V>
where
    K: Hash + Eq,
{
    entries: Arc<DashMap<K, V>>,
}

impl<K, V> KeyedCache<K, V>
where
    K: Hash + Eq + Clone,
{
    pub fn new() -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
        }
    }

    /// Insert or replace the value for `key`, returning the previous value.
    pub fn add(&self, key: K, value: V) -> Option<V> {
        self.entries.insert(key, value)
    }

    pub fn remove(&self, key: &K) -> Option<V> {
        self.entries.remove(key).map(|(_, v)| v)
    }

    pub fn exists(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    /// Apply `f` to the value for `key`, if present.
    pub fn update<R>(&self, key: &K, f: impl FnOnce(&mut V) -> R) -> Option<R> {
        self.entries.get_mut(key).map(|mut entry| f(entry.value_mut()))
    }

    /// Modify the existing value with `on_existing`, or insert the value built by `on_vacant`.
    pub fn upsert(&self, key: K, on_existing: impl FnOnce(&mut V), on_vacant: impl FnOnce() -> V) {
        match self.entries.entry(key) {
            Entry::Occupied(mut occupied) => on_existing(occupied.get_mut()),
            Entry::Vacant(vacant) => {
                vacant.insert(on_vacant());
            }
        }
    }

    pub fn keys(&self) -> Vec<K> {
        self.entries.iter().map(|entry| entry.key().clone()).collect()
    }

    pub fn retain(&self, mut f: impl FnMut(&K, &mut V) -> bool) {
        self.entries.retain(|k, v| f(k, v));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K, V> KeyedCache<K, V>
where
    K: Hash + Eq + Clone,
    V: Clone,
{
    pub fn get(&self, key: &K) -> Option<V> {
        self.entries.get(key).map(|entry| entry.value().clone())
    }

    /// Snapshot of every entry. Later changes are not reflected in the result.
    pub fn get_all(&self) -> Vec<(K, V)> {
        self.entries
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }
}

impl<K, V> Clone for KeyedCache<K, V>
where
    K: Hash + Eq,
{
    fn clone(&self) -> Self {
        Self {
            entries: Arc::clone(&self.entries),
        }
    }
}

impl<K, V> Default for KeyedCache<K, V>
where
    K: Hash + Eq + Clone,
{
    fn default() -> Self {
        Self::new()
    }
}
