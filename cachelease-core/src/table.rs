use dashmap::DashMap;
use std::hash::Hash;
use std::sync::Arc;

use crate::value::detach;
use crate::{CachedValue, Handle};

/// Storage behind a [`Cache`](crate::Cache).
///
/// The table owns the entries and decides how they are laid out; the cache
/// only relies on the following guarantees:
///
/// - [`find`](Self::find) leases the value while it is still reachable, so a
///   concurrent removal can never free it under the reader,
/// - every method returning a value has already unlinked it,
/// - [`clear_tables`](Self::clear_tables) unlinks every entry without
///   waiting for outstanding leases.
pub trait CacheTable: Send + Sync {
    type Key;
    type Value;

    /// Looks up `key`, leasing the value if found.
    fn find(&self, key: &Self::Key) -> Handle<Self::Value>;

    /// Links `value` under `key`, returning the value it displaced.
    fn insert(
        &self,
        key: Self::Key,
        value: Arc<CachedValue<Self::Value>>,
    ) -> Option<Arc<CachedValue<Self::Value>>>;

    /// Unlinks the value stored under `key`.
    fn remove(&self, key: &Self::Key) -> Option<Arc<CachedValue<Self::Value>>>;

    /// Unlinks some value to make room, if any is left.
    fn evict_candidate(&self) -> Option<Arc<CachedValue<Self::Value>>>;

    /// Unlinks every entry. Values nobody leases are freed at once, the
    /// others by their last handle. Returns the number of entries unlinked.
    fn clear_tables(&self) -> usize;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A [`CacheTable`] backed by a sharded concurrent hash map.
///
/// Eviction victims are picked uniformly at random, which keeps eviction O(1)
/// in bookkeeping at the price of a linear scan to reach the chosen slot.
///
/// # Examples
///
/// ```
/// use cachelease_core::{CacheTable, CachedValue, ShardedTable};
/// use std::sync::Arc;
///
/// let table: ShardedTable<String, u32> = ShardedTable::new();
/// table.insert("a".to_string(), Arc::new(CachedValue::new(1)));
///
/// let handle = table.find(&"a".to_string());
/// assert_eq!(handle.get(), Some(&1));
/// assert!(!table.find(&"b".to_string()).found());
/// ```
#[derive(Debug)]
pub struct ShardedTable<K, V>
where
    K: Eq + Hash,
{
    map: DashMap<K, Arc<CachedValue<V>>>,
}

impl<K, V> ShardedTable<K, V>
where
    K: Eq + Hash + Clone,
{
    pub fn new() -> Self {
        Self {
            map: DashMap::new(),
        }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            map: DashMap::with_capacity(capacity),
        }
    }

    fn random_key(&self) -> Option<K> {
        let len = self.map.len();
        if len == 0 {
            return None;
        }
        let position = fastrand::usize(..len);
        // The map may shrink between `len` and the scan.
        let key = self
            .map
            .iter()
            .nth(position)
            .map(|entry| entry.key().clone());
        key.or_else(|| self.map.iter().next().map(|entry| entry.key().clone()))
    }
}

impl<K, V> Default for ShardedTable<K, V>
where
    K: Eq + Hash + Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> CacheTable for ShardedTable<K, V>
where
    K: Eq + Hash + Clone + Send + Sync,
    V: Send + Sync,
{
    type Key = K;
    type Value = V;

    fn find(&self, key: &K) -> Handle<V> {
        // The lease is taken while the shard guard is held.
        self.map
            .get(key)
            .map(|entry| Handle::new(Some(Arc::clone(entry.value()))))
            .unwrap_or_default()
    }

    fn insert(&self, key: K, value: Arc<CachedValue<V>>) -> Option<Arc<CachedValue<V>>> {
        self.map.insert(key, value)
    }

    fn remove(&self, key: &K) -> Option<Arc<CachedValue<V>>> {
        self.map.remove(key).map(|(_, value)| value)
    }

    fn evict_candidate(&self) -> Option<Arc<CachedValue<V>>> {
        loop {
            let key = self.random_key()?;
            if let Some((_, value)) = self.map.remove(&key) {
                return Some(value);
            }
        }
    }

    fn clear_tables(&self) -> usize {
        let keys: Vec<K> = self.map.iter().map(|entry| entry.key().clone()).collect();
        let mut freed = 0;
        for key in keys {
            if let Some((_, value)) = self.map.remove(&key) {
                detach(value);
                freed += 1;
            }
        }
        freed
    }

    fn len(&self) -> usize {
        self.map.len()
    }
}
