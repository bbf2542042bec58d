//! Ordered map wrapper that never auto-creates entries.
//!
//! Lookups return `Option`; every write is an explicit call. Entries are
//! kept in key order so table dumps are deterministic.

use std::collections::BTreeMap;

/// What an [`SyncMap::upsert`] did to the map.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// The key was absent and has been added.
    Inserted,
    /// The key held identical content; nothing changed.
    Unchanged,
    /// The key held different content, which has been overwritten.
    Replaced,
}

/// An ordered map that never creates entries implicitly.
///
/// ```
/// use aft_common::{SyncMap, WriteOutcome};
///
/// let mut map: SyncMap<u64, &str> = SyncMap::new();
/// assert!(map.get(&1).is_none());
/// assert_eq!(map.upsert(1, "a"), WriteOutcome::Inserted);
/// assert_eq!(map.upsert(1, "a"), WriteOutcome::Unchanged);
/// assert_eq!(map.upsert(1, "b"), WriteOutcome::Replaced);
/// ```
#[derive(Debug, Clone)]
pub struct SyncMap<K, V> {
    inner: BTreeMap<K, V>,
}

impl<K: Ord, V> SyncMap<K, V> {
    pub fn new() -> Self {
        Self {
            inner: BTreeMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.inner.contains_key(key)
    }

    /// Returns the value for `key`. **This never creates entries.**
    pub fn get(&self, key: &K) -> Option<&V> {
        self.inner.get(key)
    }

    /// Returns the value for `key` mutably. **This never creates entries.**
    pub fn get_mut(&mut self, key: &K) -> Option<&mut V> {
        self.inner.get_mut(key)
    }

    /// Inserts unconditionally, returning the previous value.
    pub fn insert(&mut self, key: K, value: V) -> Option<V> {
        self.inner.insert(key, value)
    }

    /// Inserts `value` unless the current value is equivalent under `same`.
    pub fn upsert_with<F>(&mut self, key: K, value: V, same: F) -> WriteOutcome
    where
        F: FnOnce(&V, &V) -> bool,
    {
        match self.inner.get_mut(&key) {
            Some(existing) if same(existing, &value) => WriteOutcome::Unchanged,
            Some(existing) => {
                *existing = value;
                WriteOutcome::Replaced
            }
            None => {
                self.inner.insert(key, value);
                WriteOutcome::Inserted
            }
        }
    }

    pub fn remove(&mut self, key: &K) -> Option<V> {
        self.inner.remove(key)
    }

    /// Removes every entry matching `remove`, returning the removed keys in
    /// order.
    pub fn drain_where<F>(&mut self, mut remove: F) -> Vec<K>
    where
        K: Clone,
        F: FnMut(&K, &V) -> bool,
    {
        let doomed: Vec<K> = self
            .inner
            .iter()
            .filter(|(k, v)| remove(k, v))
            .map(|(k, _)| k.clone())
            .collect();
        for key in &doomed {
            self.inner.remove(key);
        }
        doomed
    }

    pub fn clear(&mut self) {
        self.inner.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        self.inner.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&K, &mut V)> {
        self.inner.iter_mut()
    }

    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.inner.keys()
    }

    pub fn values(&self) -> impl Iterator<Item = &V> {
        self.inner.values()
    }
}

impl<K: Ord, V: PartialEq> SyncMap<K, V> {
    /// Inserts `value`, reporting whether the key was new, unchanged or replaced.
    pub fn upsert(&mut self, key: K, value: V) -> WriteOutcome {
        self.upsert_with(key, value, |a, b| a == b)
    }
}

impl<K: Ord, V> Default for SyncMap<K, V> {
    fn default() -> Self {
        Self::new()
    }
}
