//! Weakly-consistent snapshot iterator.

use std::hash::Hash;
use std::sync::Arc;

use dashmap::DashMap;

use crate::cache::entry::EntryHolder;
use crate::cache::listener::{CacheEvent, ListenerRegistry};
use crate::cache::stats::CacheStatistics;

/// Iterates a point-in-time snapshot of keys taken when the iterator is
/// constructed; concurrent mutations after that point are not reflected,
/// mirroring the map's own weak consistency under concurrent writers.
pub struct CacheIter<K, V> {
    keys: std::vec::IntoIter<K>,
    map: Arc<DashMap<K, Arc<EntryHolder<V>>>>,
    listeners: Arc<ListenerRegistry<K, V>>,
    stats: Arc<CacheStatistics>,
    now_millis: u64,
    current_key: Option<K>,
}

impl<K, V> CacheIter<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + serde::de::DeserializeOwned + 'static,
{
    pub(crate) fn new(
        map: Arc<DashMap<K, Arc<EntryHolder<V>>>>,
        listeners: Arc<ListenerRegistry<K, V>>,
        stats: Arc<CacheStatistics>,
        now_millis: u64,
    ) -> Self {
        let keys: Vec<K> = map.iter().map(|entry| entry.key().clone()).collect();
        Self { keys: keys.into_iter(), map, listeners, stats, now_millis, current_key: None }
    }

    /// Removes the entry most recently yielded by [`Iterator::next`] from the
    /// cache, dispatching `Removed` and recording a remove statistic, the
    /// same as [`crate::cache::core::Cache::remove`] (but bypassing the
    /// writer, since the iterator has no way to express which of its
    /// per-item removals a writer should see as a batch). Returns whether an
    /// entry was actually removed. Calling this before any `next()`, or
    /// calling it twice in a row without an intervening `next()`, returns
    /// `false`.
    pub fn remove(&mut self) -> bool {
        let Some(key) = self.current_key.take() else { return false };
        let Some((key, holder)) = self.map.remove(&key) else { return false };
        let value = holder.peek();
        if holder.release() {
            if let Some(value) = value {
                self.stats.record_remove();
                self.listeners.notify(CacheEvent::Removed { key, value });
            }
            true
        } else {
            false
        }
    }
}

impl<K, V> Iterator for CacheIter<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + serde::de::DeserializeOwned + 'static,
{
    type Item = (K, V);

    fn next(&mut self) -> Option<Self::Item> {
        self.current_key = None;
        for key in self.keys.by_ref() {
            let Some(holder) = self.map.get(&key).map(|e| Arc::clone(e.value())) else {
                continue;
            };
            if holder.is_invalid(self.now_millis) {
                continue;
            }
            if let Some(value) = holder.peek() {
                self.current_key = Some(key.clone());
                return Some((key, value));
            }
        }
        None
    }
}
