//! Pluggable eviction policy.
//!
//! A policy never touches the live map directly. Instead the eviction
//! worker freezes a snapshot value per candidate (decoupling the ordering
//! decision from concurrent mutation of the same holders) and asks the
//! policy to compare those frozen snapshots.

use std::cmp::Ordering as CmpOrdering;
use std::hash::Hash;
use std::sync::Arc;

use crate::cache::entry::EntryHolder;

/// One frozen snapshot taken for a single eviction candidate. Carries the
/// exact `Arc<EntryHolder<V>>` that was scored, so the eviction worker can
/// later check it's still the live holder before removing it (a `put()`
/// racing the snapshot may have replaced it).
pub struct Frozen<K, V> {
    pub key: K,
    pub holder: Arc<EntryHolder<V>>,
    pub score: i64,
    pub last_access_time: u64,
}

/// Contract a cache's eviction worker drives once per round.
pub trait EvictionPolicy<K, V>: Send + Sync
where
    K: Eq + Hash + Clone,
{
    /// Snapshot of the mutable attribute this policy sorts by.
    fn freeze_value(&self, key: &K, holder: &EntryHolder<V>) -> i64;

    /// Entries that sort first are evicted first.
    fn compare(&self, a: &Frozen<K, V>, b: &Frozen<K, V>) -> CmpOrdering;

    /// Hook run before a round starts; default no-op.
    fn before_round(&self) {}

    /// Hook run after a round completes; default no-op.
    fn after_round(&self) {}
}

/// Least-frequently-used: freezes `use_count`; smaller first. Ties broken by
/// older `last_access_time`.
pub struct Lfu;

impl<K, V> EvictionPolicy<K, V> for Lfu
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    fn freeze_value(&self, _key: &K, holder: &EntryHolder<V>) -> i64 {
        i64::from(holder.use_count())
    }

    fn compare(&self, a: &Frozen<K, V>, b: &Frozen<K, V>) -> CmpOrdering {
        a.score.cmp(&b.score).then_with(|| a.last_access_time.cmp(&b.last_access_time))
    }
}

/// Least-recently-used: freezes `last_access_time`; older first.
pub struct Lru;

impl<K, V> EvictionPolicy<K, V> for Lru
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    fn freeze_value(&self, _key: &K, holder: &EntryHolder<V>) -> i64 {
        // last_access_time is a ms offset from the epoch; it fits in an i64
        // for any date before the year 292 million.
        i64::try_from(holder.last_access_time()).unwrap_or(i64::MAX)
    }

    fn compare(&self, a: &Frozen<K, V>, b: &Frozen<K, V>) -> CmpOrdering {
        a.score.cmp(&b.score)
    }
}
