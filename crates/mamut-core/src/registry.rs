//! Concurrent keyed registries.
//!
//! A [`Registry`] is a map guarded by its own read/write lock. The
//! orchestrator keeps one registry per component kind so that readers of one
//! kind never contend with writers of another.

use parking_lot::RwLock;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;

/// Concurrent map from identifiers to values.
///
/// Values are handed out as clones, so `V` is normally an `Arc` or a small
/// handle type.
pub struct Registry<K, V> {
    entries: RwLock<HashMap<K, V>>,
}

impl<K, V> Registry<K, V>
where
    K: Eq + Hash + Ord + Clone,
    V: Clone,
{
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Inserts or replaces the value under `key`.
    pub fn set(&self, key: K, value: V) {
        self.entries.write().insert(key, value);
    }

    /// Inserts `value` only if `key` is absent.
    ///
    /// Returns `true` when the value was stored. Under concurrent callers
    /// exactly one insertion for a given key succeeds.
    pub fn set_if_missing(&self, key: K, value: V) -> bool {
        match self.entries.write().entry(key) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(value);
                true
            }
        }
    }

    /// Returns a clone of the value under `key`.
    pub fn get(&self, key: &K) -> Option<V> {
        self.entries.read().get(key).cloned()
    }

    /// Returns true if `key` is present.
    pub fn has(&self, key: &K) -> bool {
        self.entries.read().contains_key(key)
    }

    /// Removes and returns the value under `key`.
    pub fn remove(&self, key: &K) -> Option<V> {
        self.entries.write().remove(key)
    }

    /// Returns the number of entries.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Returns true if the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Returns all keys in order.
    pub fn keys(&self) -> Vec<K> {
        let mut keys: Vec<K> = self.entries.read().keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Returns all values, ordered by key.
    pub fn values(&self) -> Vec<V> {
        self.snapshot().into_iter().map(|(_, v)| v).collect()
    }

    /// Returns a key-ordered copy of every entry.
    pub fn snapshot(&self) -> Vec<(K, V)> {
        let mut entries: Vec<(K, V)> = self
            .entries
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    }

    /// Visits every entry in key order until `visit` returns `false`.
    ///
    /// Iteration runs over a snapshot taken under the read lock; the lock is
    /// released before `visit` is first called, so the callback may freely
    /// read or write this registry.
    pub fn range<F>(&self, mut visit: F)
    where
        F: FnMut(&K, &V) -> bool,
    {
        for (key, value) in self.snapshot() {
            if !visit(&key, &value) {
                break;
            }
        }
    }
}

impl<K, V> Default for Registry<K, V>
where
    K: Eq + Hash + Ord + Clone,
    V: Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> fmt::Debug for Registry<K, V>
where
    K: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let entries = self.entries.read();
        f.debug_struct("Registry")
            .field("keys", &entries.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id::{ComponentId, L2CLNodeId};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_set_and_get() {
        let reg: Registry<String, u32> = Registry::new();
        assert!(reg.is_empty());
        reg.set("a".into(), 1);
        reg.set("a".into(), 2);
        assert_eq!(reg.get(&"a".to_string()), Some(2));
        assert!(reg.has(&"a".to_string()));
        assert!(!reg.has(&"b".to_string()));
        assert_eq!(reg.len(), 1);
        assert_eq!(reg.remove(&"a".to_string()), Some(2));
        assert!(reg.get(&"a".to_string()).is_none());
    }

    #[test]
    fn test_set_if_missing() {
        let reg: Registry<ComponentId, &str> = Registry::new();
        let id: ComponentId = L2CLNodeId::new("seq", 901u64).into();
        assert!(reg.set_if_missing(id.clone(), "first"));
        assert!(!reg.set_if_missing(id.clone(), "second"));
        assert_eq!(reg.get(&id), Some("first"));
    }

    #[test]
    fn test_set_if_missing_concurrent() {
        let reg = Arc::new(Registry::<u32, usize>::new());
        let winners = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..16)
            .map(|n| {
                let reg = Arc::clone(&reg);
                let winners = Arc::clone(&winners);
                std::thread::spawn(move || {
                    if reg.set_if_missing(7, n) {
                        winners.fetch_add(1, Ordering::SeqCst);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(winners.load(Ordering::SeqCst), 1);
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn test_ordered_views() {
        let reg: Registry<L2CLNodeId, u64> = Registry::new();
        reg.set(L2CLNodeId::new("b", 1u64), 3);
        reg.set(L2CLNodeId::new("a", 10u64), 2);
        reg.set(L2CLNodeId::new("a", 2u64), 1);

        assert_eq!(reg.values(), vec![1, 2, 3]);
        assert_eq!(reg.keys()[0].to_string(), "L2CLNode-a-2");
    }

    #[test]
    fn test_range_stops_and_allows_reentry() {
        let reg: Registry<u32, u32> = Registry::new();
        for n in 0..5 {
            reg.set(n, n * 10);
        }

        let mut seen = Vec::new();
        reg.range(|k, v| {
            seen.push(*v);
            // Writing from inside the callback must not deadlock.
            reg.set(k + 100, 0);
            *k < 2
        });
        assert_eq!(seen, vec![0, 10, 20]);
        assert_eq!(reg.len(), 8);
    }
}
