//! Keyed entry store.

use std::collections::HashMap;
use std::hash::Hash;

/// Mapping from identity key to live entry. Keys are unique; iteration
/// order is unspecified.
#[derive(Debug, Clone)]
pub struct KeyedStore<K, V> {
    entries: HashMap<K, V>,
}

impl<K: Eq + Hash, V> KeyedStore<K, V> {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Insert or overwrite.
    pub fn upsert(&mut self, key: K, value: V) {
        self.entries.insert(key, value);
    }

    /// Remove a key. Removing an absent key is a no-op.
    pub fn remove(&mut self, key: &K) -> Option<V> {
        self.entries.remove(key)
    }

    pub fn get(&self, key: &K) -> Option<&V> {
        self.entries.get(key)
    }

    pub fn get_mut(&mut self, key: &K) -> Option<&mut V> {
        self.entries.get_mut(key)
    }

    pub fn contains(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    /// Replace the whole content with `entries`.
    pub fn replace<I>(&mut self, entries: I)
    where
        I: IntoIterator<Item = (K, V)>,
    {
        self.entries.clear();
        self.entries.extend(entries);
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn values(&self) -> impl Iterator<Item = &V> {
        self.entries.values()
    }

    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.entries.keys()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: Eq + Hash, V> Default for KeyedStore<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upsert_overwrites() {
        let mut store = KeyedStore::new();
        store.upsert(1u64, "a");
        store.upsert(1u64, "b");
        assert_eq!(store.len(), 1);
        assert_eq!(store.get(&1), Some(&"b"));
    }

    #[test]
    fn test_remove_absent_is_noop() {
        let mut store: KeyedStore<u64, &str> = KeyedStore::new();
        store.upsert(1, "a");
        assert_eq!(store.remove(&2), None);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_replace() {
        let mut store = KeyedStore::new();
        store.upsert(1u64, "a");
        store.replace([(2u64, "b"), (3, "c")]);
        assert!(!store.contains(&1));
        assert_eq!(store.len(), 2);
    }
}
