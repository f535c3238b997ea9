//! Set of position keys already claimed for exploration.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::position_key::PositionKey;
use crate::util::sharded::ShardedMap;

/// Concurrency-safe claim-once set.
///
/// `claim` is an atomic insert-if-absent: among any number of concurrent
/// explorers reaching the same key, exactly one wins the claim.
#[derive(Default)]
pub struct VisitedSet {
    keys: ShardedMap<PositionKey, ()>,
    rejected: AtomicU64,
}

impl VisitedSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims `key` for exploration. Returns `false` if it was claimed before.
    pub fn claim(&self, key: &PositionKey) -> bool {
        let won = self.keys.insert_if_absent(key.clone(), ());
        if !won {
            self.rejected.fetch_add(1, Ordering::Relaxed);
        }
        won
    }

    /// Returns true if `key` has been claimed. Only a hint for callers: the
    /// answer may be stale by the time it is used.
    pub fn contains(&self, key: &PositionKey) -> bool {
        self.keys.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Number of claims that lost against an earlier claim.
    pub fn rejected_claims(&self) -> u64 {
        self.rejected.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_claim_once() {
        let visited = VisitedSet::new();
        let key = PositionKey::from("k");

        assert!(!visited.contains(&key));
        assert!(visited.claim(&key));
        assert!(visited.contains(&key));
        assert!(!visited.claim(&key));
        assert_eq!(visited.len(), 1);
        assert_eq!(visited.rejected_claims(), 1);
    }

    #[test]
    fn test_concurrent_claim_single_winner() {
        let visited = Arc::new(VisitedSet::new());
        let key = PositionKey::from("contended");

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let visited = Arc::clone(&visited);
                let key = key.clone();
                thread::spawn(move || visited.claim(&key))
            })
            .collect();

        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|&won| won)
            .count();

        assert_eq!(winners, 1);
        assert_eq!(visited.rejected_claims(), 15);
    }
}
