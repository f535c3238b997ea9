//! Hash map split into independently locked shards.

use std::borrow::Borrow;
use std::hash::{Hash, Hasher};

use rapidhash::RapidHashMap;

use crate::util::spinlock::SpinMutex;

/// Default number of shards. Must be a power of two.
pub const DEFAULT_SHARDS: usize = 64;

/// Concurrent hash map made of spinlock-guarded shards.
///
/// Every operation locks exactly one shard, so operations on a single key are
/// atomic with respect to each other.
pub struct ShardedMap<K, V> {
    shards: Box<[SpinMutex<RapidHashMap<K, V>>]>,
    mask: usize,
}

impl<K: Hash + Eq, V> Default for ShardedMap<K, V> {
    fn default() -> Self {
        Self::with_shards(DEFAULT_SHARDS)
    }
}

impl<K: Hash + Eq, V> ShardedMap<K, V> {
    /// Creates a map with `n_shards` shards, rounded up to a power of two.
    pub fn with_shards(n_shards: usize) -> Self {
        let n_shards = n_shards.max(1).next_power_of_two();
        let shards = (0..n_shards)
            .map(|_| SpinMutex::new(RapidHashMap::default()))
            .collect::<Vec<_>>()
            .into_boxed_slice();

        ShardedMap {
            shards,
            mask: n_shards - 1,
        }
    }

    #[inline]
    fn shard_for<Q>(&self, key: &Q) -> &SpinMutex<RapidHashMap<K, V>>
    where
        K: Borrow<Q>,
        Q: Hash + ?Sized,
    {
        let mut hasher = rapidhash::fast::RapidHasher::default();
        key.hash(&mut hasher);
        let index = (hasher.finish() as usize) & self.mask;
        &self.shards[index]
    }

    /// Inserts `value` only if `key` is absent.
    ///
    /// Returns `true` if this call inserted the entry. Concurrent callers with
    /// the same key observe exactly one `true`.
    pub fn insert_if_absent(&self, key: K, value: V) -> bool {
        let mut shard = self.shard_for(&key).lock();
        if shard.contains_key(&key) {
            return false;
        }
        shard.insert(key, value);
        true
    }

    /// Inserts or replaces the value for `key`.
    pub fn insert(&self, key: K, value: V) {
        self.shard_for(&key).lock().insert(key, value);
    }

    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.shard_for(key).lock().contains_key(key)
    }

    /// Returns a clone of the value stored for `key`.
    pub fn get_cloned<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
        V: Clone,
    {
        self.shard_for(key).lock().get(key).cloned()
    }

    pub fn len(&self) -> usize {
        self.shards.iter().map(|s| s.lock().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.shards.iter().all(|s| s.lock().is_empty())
    }

    /// Copies all entries out of the map. Shards are locked one at a time, so
    /// the snapshot is not atomic with respect to concurrent writers.
    pub fn snapshot(&self) -> Vec<(K, V)>
    where
        K: Clone,
        V: Clone,
    {
        let mut entries = Vec::with_capacity(self.len());
        for shard in self.shards.iter() {
            let shard = shard.lock();
            entries.extend(shard.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        entries
    }
}

impl<K: Hash + Eq, V> FromIterator<(K, V)> for ShardedMap<K, V> {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let map = ShardedMap::default();
        for (key, value) in iter {
            map.insert(key, value);
        }
        map
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    #[test]
    fn test_shard_count_rounded() {
        let map: ShardedMap<u32, u32> = ShardedMap::with_shards(5);
        assert_eq!(map.shards.len(), 8);
        let map: ShardedMap<u32, u32> = ShardedMap::with_shards(0);
        assert_eq!(map.shards.len(), 1);
    }

    #[test]
    fn test_insert_if_absent() {
        let map = ShardedMap::default();
        assert!(map.insert_if_absent("a".to_string(), 1));
        assert!(!map.insert_if_absent("a".to_string(), 2));
        assert_eq!(map.get_cloned("a"), Some(1));
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn test_insert_replaces() {
        let map = ShardedMap::default();
        map.insert(7u64, "x");
        map.insert(7u64, "y");
        assert_eq!(map.get_cloned(&7), Some("y"));
        assert!(!map.is_empty());
    }

    #[test]
    fn test_concurrent_claims_are_exclusive() {
        let map = Arc::new(ShardedMap::with_shards(4));
        let wins = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let map = Arc::clone(&map);
                let wins = Arc::clone(&wins);
                thread::spawn(move || {
                    for key in 0..1_000u32 {
                        if map.insert_if_absent(key, ()) {
                            wins.fetch_add(1, Ordering::Relaxed);
                        }
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(wins.load(Ordering::Relaxed), 1_000);
        assert_eq!(map.len(), 1_000);
    }

    #[test]
    fn test_snapshot() {
        let map: ShardedMap<u32, u32> = (0..10).map(|i| (i, i * i)).collect();
        let mut entries = map.snapshot();
        entries.sort();
        assert_eq!(entries.len(), 10);
        assert_eq!(entries[3], (3, 9));
    }
}
