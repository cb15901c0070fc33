//! The cache's public surface: a concurrent map of entry holders plus the
//! background sweeper and evictor that keep it within its configured bounds.

use std::collections::HashSet;
use std::hash::Hash;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::Instant;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use rand::Rng;

use crate::cache::config::{CacheConfig, JamPolicy};
use crate::cache::entry::EntryHolder;
use crate::cache::evictor::Evictor;
use crate::cache::iter::CacheIter;
use crate::cache::listener::{
    CacheEvent, CacheEventListener, DispatchMode, ListenerConfig, ListenerRegistration,
    ListenerRegistry,
};
use crate::cache::manager;
use crate::cache::processor::{EntryOp, MutableEntry};
use crate::cache::stats::{CacheStatistics, CacheStatisticsSnapshot};
use crate::cache::sweeper::Sweeper;
use crate::errors::{CacheError, CacheResult};
use crate::time::{self, CoarseClock};

type Map<K, V> = DashMap<K, Arc<EntryHolder<V>>>;

/// A thread-safe, in-memory key/value cache with expiration, pluggable
/// eviction, optional read-through/write-through, and event listeners.
pub struct Cache<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + serde::Serialize + serde::de::DeserializeOwned + 'static,
{
    id: String,
    map: Arc<Map<K, V>>,
    config: CacheConfig<K, V>,
    stats: Arc<CacheStatistics>,
    listeners: Arc<ListenerRegistry<K, V>>,
    clock: Arc<CoarseClock>,
    sweeper: Arc<Sweeper>,
    sweeper_handle: parking_lot::Mutex<Option<JoinHandle<()>>>,
    evictor: Option<Arc<Evictor>>,
    evictor_handle: parking_lot::Mutex<Option<JoinHandle<()>>>,
    closed: AtomicBool,
}

impl<K, V> Cache<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + serde::Serialize + serde::de::DeserializeOwned + 'static,
{
    pub(crate) fn from_config(config: CacheConfig<K, V>) -> Self {
        let map: Arc<Map<K, V>> =
            Arc::new(DashMap::with_capacity_and_shard_amount(
                config.expected_size,
                config.concurrency_level.next_power_of_two().max(1),
            ));
        let stats = Arc::new(CacheStatistics::default());
        stats.set_enabled(config.statistics);
        let listeners = ListenerRegistry::new(config.async_listener_queue_capacity);
        let clock = time::global();

        let (sweeper, sweeper_handle) = Sweeper::spawn(
            Arc::clone(&map),
            Arc::clone(&listeners),
            Arc::clone(&stats),
            Arc::clone(&clock),
            config.cleanup_interval_ms(),
        );

        let (evictor, evictor_handle) = match config.eviction_policy.policy() {
            Some(policy) => {
                let (evictor, handle) = Evictor::spawn(
                    Arc::clone(&map),
                    Arc::clone(&listeners),
                    Arc::clone(&stats),
                    policy,
                    config.expected_size,
                );
                (Some(evictor), Some(handle))
            }
            None => (None, None),
        };

        let id = config.id.clone();
        Self {
            id,
            map,
            config,
            stats,
            listeners,
            clock,
            sweeper,
            sweeper_handle: parking_lot::Mutex::new(Some(sweeper_handle)),
            evictor,
            evictor_handle: parking_lot::Mutex::new(evictor_handle),
            closed: AtomicBool::new(false),
        }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Registers this cache in the process-wide [`crate::cache::manager`]
    /// registry under its configured id, so other code can find it via
    /// [`crate::cache::manager::lookup`] without holding a reference.
    pub fn register(self: &Arc<Self>) {
        manager::register(&self.id, self);
    }

    fn ensure_open(&self) -> CacheResult<()> {
        if self.closed.load(Ordering::Acquire) { Err(CacheError::Closed) } else { Ok(()) }
    }

    fn maybe_signal_eviction(&self) {
        if let Some(evictor) = &self.evictor {
            if Evictor::is_over_capacity(&self.map, self.config.expected_size) {
                evictor.signal();
            }
        }
    }

    fn block_if_jammed(&self) -> CacheResult<()> {
        let Some(evictor) = &self.evictor else { return Ok(()) };
        if !Evictor::is_over_capacity(&self.map, self.config.expected_size) {
            return Ok(());
        }
        match self.config.jam_policy {
            JamPolicy::Wait => {
                evictor.signal();
                evictor.wait_for_round();
                Ok(())
            }
            JamPolicy::Drop => {
                // Signal a round even though this write is rejected, so
                // capacity recovers in the background instead of every
                // subsequent write being dropped forever.
                evictor.signal();
                self.stats.record_drop();
                Err(CacheError::NotStored)
            }
        }
    }

    fn weigh(&self, value: &V) -> i64 {
        self.config.weigher.as_ref().map_or(0, |w| w(value) as i64)
    }

    fn new_holder(&self, value: V) -> CacheResult<Arc<EntryHolder<V>>> {
        let holder = EntryHolder::new(value, self.config.write_mode)?;
        let now = self.clock.now_millis();
        holder.complete(
            now,
            self.config.max_idle_time_secs.saturating_mul(1000),
            self.spread_cache_time_ms(),
        );
        Ok(Arc::new(holder))
    }

    fn spread_cache_time_ms(&self) -> u64 {
        let base_ms = self.config.max_cache_time_secs.saturating_mul(1000);
        if self.config.max_cache_time_spread_secs == 0 {
            return base_ms;
        }
        let spread_ms = self.config.max_cache_time_spread_secs.saturating_mul(1000);
        let mut rng = rand::rng();
        base_ms.saturating_add(rng.random_range(0..=spread_ms))
    }

    /// Returns a clone of the value associated with `key`, loading it
    /// through the configured [`crate::cache::loader::CacheLoader`] on a
    /// miss if one is set.
    ///
    /// # Errors
    /// Propagates a configured loader's error, or [`CacheError::Closed`] if
    /// the cache has been closed.
    pub fn get(&self, key: &K) -> CacheResult<Option<V>> {
        self.ensure_open()?;
        let start = Instant::now();
        let now = self.clock.now_millis();
        let result = if let Some(holder) = self.map.get(key) {
            if holder.is_invalid(now) {
                drop(holder);
                self.remove_invalid(key);
                self.try_load(key)?
            } else {
                let value = holder.get(now);
                holder.increment_use_count();
                if value.is_some() {
                    self.stats.record_hit();
                } else {
                    self.stats.record_miss();
                }
                value
            }
        } else {
            self.try_load(key)?
        };
        self.stats.record_get_ns(start.elapsed().as_nanos() as u64);
        Ok(result)
    }

    fn try_load(&self, key: &K) -> CacheResult<Option<V>> {
        let Some(loader) = &self.config.loader else {
            self.stats.record_miss();
            return Ok(None);
        };
        match loader.load(key)? {
            Some(value) => {
                let holder = self.new_holder(value.clone())?;
                self.map.insert(key.clone(), holder);
                self.stats.record_miss();
                Ok(Some(value))
            }
            None => {
                self.stats.record_miss();
                Ok(None)
            }
        }
    }

    fn remove_invalid(&self, key: &K) {
        if let Some((_, holder)) = self.map.remove(key) {
            let value = holder.peek();
            if holder.release() {
                if let Some(value) = value {
                    self.listeners.notify(CacheEvent::Expired { key: key.clone(), value });
                }
            }
        }
    }

    /// Inserts or replaces the value for `key`, propagating the write
    /// through the configured [`crate::cache::writer::CacheWriter`] first.
    /// If the writer fails, the in-memory map is left unchanged.
    ///
    /// # Errors
    /// Propagates a configured writer's error, [`CacheError::NotStored`]
    /// under the `Drop` jam policy when the cache is over capacity, or
    /// [`CacheError::Closed`].
    pub fn put(&self, key: K, value: V) -> CacheResult<()> {
        self.ensure_open()?;
        self.block_if_jammed()?;

        if let Some(writer) = &self.config.writer {
            writer.write(&key, &value)?;
        }
        self.put_local(key, value)
    }

    /// The in-memory half of [`Self::put`], without the write-through call.
    /// Used directly by [`Self::put_all`], which runs the writer once over
    /// the whole batch via [`crate::cache::writer::CacheWriter::write_all`]
    /// rather than once per entry.
    fn put_local(&self, key: K, value: V) -> CacheResult<()> {
        let start = Instant::now();
        let size_delta = self.weigh(&value);
        let holder = self.new_holder(value.clone())?;
        let previous = self.map.insert(key.clone(), holder);
        self.stats.add_memory_bytes(size_delta);
        self.stats.record_put();

        match previous {
            Some(old) => {
                if let Some(old_value) = old.peek() {
                    old.release();
                    self.listeners.notify(CacheEvent::Updated {
                        key: key.clone(),
                        old_value,
                        new_value: value,
                    });
                }
            }
            None => {
                self.listeners.notify(CacheEvent::Created { key: key.clone(), value });
            }
        }

        self.stats.record_put_ns(start.elapsed().as_nanos() as u64);
        self.maybe_signal_eviction();
        Ok(())
    }

    /// Inserts `value` only if `key` is absent or expired, as a single
    /// atomic step under the key's shard lock so concurrent callers racing
    /// on the same key never both win. Returns whether the insert happened.
    ///
    /// # Errors
    /// Same as [`Self::put`].
    pub fn put_if_absent(&self, key: K, value: V) -> CacheResult<bool> {
        self.ensure_open()?;
        self.block_if_jammed()?;
        let now = self.clock.now_millis();

        let mut stale_holder: Option<Arc<EntryHolder<V>>> = None;
        let inserted = match self.map.entry(key.clone()) {
            Entry::Occupied(occ) if !occ.get().is_invalid(now) => false,
            Entry::Occupied(mut occ) => {
                if let Some(writer) = &self.config.writer {
                    writer.write(&key, &value)?;
                }
                let holder = self.new_holder(value.clone())?;
                stale_holder = Some(occ.insert(holder));
                true
            }
            Entry::Vacant(vac) => {
                if let Some(writer) = &self.config.writer {
                    writer.write(&key, &value)?;
                }
                let holder = self.new_holder(value.clone())?;
                vac.insert(holder);
                true
            }
        };

        if !inserted {
            return Ok(false);
        }
        if let Some(stale) = stale_holder {
            stale.release();
        }
        self.stats.add_memory_bytes(self.weigh(&value));
        self.stats.record_put();
        self.listeners.notify(CacheEvent::Created { key, value });
        self.maybe_signal_eviction();
        Ok(true)
    }

    /// Replaces the value for `key` only if it is currently present and
    /// valid. Returns whether the replace happened.
    ///
    /// # Errors
    /// Same as [`Self::put`].
    pub fn replace(&self, key: K, value: V) -> CacheResult<bool> {
        self.ensure_open()?;
        let now = self.clock.now_millis();
        let present = self.map.get(&key).is_some_and(|h| !h.is_invalid(now));
        if !present {
            return Ok(false);
        }
        self.put(key, value)?;
        Ok(true)
    }

    /// Replaces the value for `key` only if its current value equals
    /// `expected`. Returns whether the replace happened.
    ///
    /// # Errors
    /// Same as [`Self::put`].
    pub fn replace_if(&self, key: K, expected: &V, new_value: V) -> CacheResult<bool>
    where
        V: PartialEq,
    {
        self.ensure_open()?;
        let now = self.clock.now_millis();
        let matches = self
            .map
            .get(&key)
            .filter(|h| !h.is_invalid(now))
            .and_then(|h| h.peek())
            .is_some_and(|current| &current == expected);
        if !matches {
            return Ok(false);
        }
        self.put(key, new_value)?;
        Ok(true)
    }

    /// Replaces the value for `key` and returns the previous value, if any.
    ///
    /// # Errors
    /// Same as [`Self::put`].
    pub fn get_and_replace(&self, key: K, value: V) -> CacheResult<Option<V>> {
        self.ensure_open()?;
        let now = self.clock.now_millis();
        let previous = self.map.get(&key).filter(|h| !h.is_invalid(now)).and_then(|h| h.peek());
        self.put(key, value)?;
        Ok(previous)
    }

    /// Removes `key`, propagating the removal through the configured writer
    /// first. Returns the removed value, if any.
    ///
    /// # Errors
    /// Propagates a configured writer's `delete` error, or
    /// [`CacheError::Closed`].
    pub fn remove(&self, key: &K) -> CacheResult<Option<V>> {
        self.ensure_open()?;
        if let Some(writer) = &self.config.writer {
            writer.delete(key)?;
        }
        Ok(self.remove_local(key))
    }

    /// The in-memory half of [`Self::remove`], without the write-through
    /// call. Used directly by [`Self::remove_all`], which runs the writer
    /// once over the whole batch via
    /// [`crate::cache::writer::CacheWriter::delete_all`] rather than once
    /// per key.
    fn remove_local(&self, key: &K) -> Option<V> {
        let start = Instant::now();
        let result = match self.map.remove(key) {
            Some((_, holder)) => {
                let value = holder.peek();
                if holder.release() {
                    if let Some(value) = value.clone() {
                        self.stats.record_remove();
                        self.listeners
                            .notify(CacheEvent::Removed { key: key.clone(), value });
                    }
                }
                value
            }
            None => None,
        };
        self.stats.record_remove_ns(start.elapsed().as_nanos() as u64);
        result
    }

    /// Removes `key` only if its current value equals `expected`. Returns
    /// whether the removal happened.
    ///
    /// # Errors
    /// Same as [`Self::remove`].
    pub fn remove_if(&self, key: &K, expected: &V) -> CacheResult<bool>
    where
        V: PartialEq,
    {
        self.ensure_open()?;
        let matches =
            self.map.get(key).and_then(|h| h.peek()).is_some_and(|current| &current == expected);
        if !matches {
            return Ok(false);
        }
        self.remove(key).map(|v| v.is_some())
    }

    /// Removes every entry without invoking the writer or listeners.
    ///
    /// # Errors
    /// Returns [`CacheError::Closed`] if the cache has been closed.
    pub fn clear(&self) -> CacheResult<()> {
        self.ensure_open()?;
        for entry in self.map.iter() {
            entry.value().release();
        }
        self.map.clear();
        self.stats.add_memory_bytes(-(self.stats.snapshot().memory_bytes as i64));
        Ok(())
    }

    #[must_use]
    pub fn contains_key(&self, key: &K) -> bool {
        self.map.get(key).is_some_and(|h| !h.is_invalid(self.clock.now_millis()))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.map.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Returns a weakly-consistent iterator over a point-in-time snapshot of
    /// valid entries.
    pub fn iter(&self) -> CacheIter<K, V> {
        CacheIter::new(
            Arc::clone(&self.map),
            Arc::clone(&self.listeners),
            Arc::clone(&self.stats),
            self.clock.now_millis(),
        )
    }

    /// Batched [`Self::get`]. Misses are loaded in one call to the
    /// configured loader's
    /// [`crate::cache::loader::CacheLoader::load_all`] rather than one
    /// [`crate::cache::loader::CacheLoader::load`] call per miss.
    ///
    /// # Errors
    /// Propagates a configured loader's error, or [`CacheError::Closed`].
    pub fn get_all(&self, keys: &[K]) -> CacheResult<Vec<(K, Option<V>)>> {
        self.ensure_open()?;
        let now = self.clock.now_millis();

        let mut results: Vec<Option<V>> = vec![None; keys.len()];
        let mut miss_indices = Vec::new();
        let mut miss_keys = Vec::new();

        for (i, key) in keys.iter().enumerate() {
            if let Some(holder) = self.map.get(key) {
                if !holder.is_invalid(now) {
                    let value = holder.get(now);
                    holder.increment_use_count();
                    if value.is_some() {
                        self.stats.record_hit();
                    } else {
                        self.stats.record_miss();
                    }
                    results[i] = value;
                    continue;
                }
                drop(holder);
                self.remove_invalid(key);
            }
            miss_indices.push(i);
            miss_keys.push(key.clone());
        }

        if !miss_keys.is_empty() {
            match &self.config.loader {
                Some(loader) => {
                    let loaded = loader.load_all(&miss_keys)?;
                    for (idx, (key, value)) in miss_indices.into_iter().zip(loaded) {
                        self.stats.record_miss();
                        if let Some(value) = &value {
                            let holder = self.new_holder(value.clone())?;
                            self.map.insert(key, holder);
                        }
                        results[idx] = value;
                    }
                }
                None => {
                    for _ in miss_indices {
                        self.stats.record_miss();
                    }
                }
            }
        }

        Ok(keys.iter().cloned().zip(results).collect())
    }

    /// Forces a read-through load for any of `keys` that are currently
    /// missing or expired, the same trigger [`Self::get`]/[`Self::get_all`]
    /// use on a miss, without returning the loaded values.
    ///
    /// # Errors
    /// Propagates a configured loader's error, or [`CacheError::Closed`].
    pub fn load_all(&self, keys: &[K]) -> CacheResult<()> {
        self.get_all(keys)?;
        Ok(())
    }

    /// Batched [`Self::put`]. The configured writer (if any) is called once
    /// over the whole batch via
    /// [`crate::cache::writer::CacheWriter::write_all`]; entries it rejects
    /// are skipped locally and their keys are collected into a single
    /// [`CacheError::WriterBatch`] rather than stopping at the first
    /// failure, so callers can retry just the failed subset.
    ///
    /// # Errors
    /// Returns [`CacheError::WriterBatch`] listing keys whose writer call
    /// failed (as produced by `K`'s `Display`, via `ToString`), or
    /// propagates [`CacheError::Closed`] / [`CacheError::NotStored`].
    pub fn put_all(&self, entries: Vec<(K, V)>) -> CacheResult<()>
    where
        K: ToString,
    {
        self.ensure_open()?;
        self.block_if_jammed()?;

        let failed_keys: HashSet<String> = match &self.config.writer {
            Some(writer) => match writer.write_all(&entries) {
                Ok(()) => HashSet::new(),
                Err(CacheError::WriterBatch { failed_keys }) => failed_keys.into_iter().collect(),
                Err(err) => return Err(err),
            },
            None => HashSet::new(),
        };

        for (key, value) in entries {
            if failed_keys.contains(&key.to_string()) {
                continue;
            }
            self.put_local(key, value)?;
        }

        if failed_keys.is_empty() {
            Ok(())
        } else {
            Err(CacheError::WriterBatch { failed_keys: failed_keys.into_iter().collect() })
        }
    }

    /// Batched [`Self::remove`], calling the configured writer once over
    /// the whole batch via
    /// [`crate::cache::writer::CacheWriter::delete_all`], with the same
    /// failure-collection behavior as [`Self::put_all`].
    ///
    /// # Errors
    /// See [`Self::put_all`].
    pub fn remove_all(&self, keys: &[K]) -> CacheResult<()>
    where
        K: ToString,
    {
        self.ensure_open()?;

        let failed_keys: HashSet<String> = match &self.config.writer {
            Some(writer) => match writer.delete_all(keys) {
                Ok(()) => HashSet::new(),
                Err(CacheError::WriterBatch { failed_keys }) => failed_keys.into_iter().collect(),
                Err(err) => return Err(err),
            },
            None => HashSet::new(),
        };

        for key in keys {
            if failed_keys.contains(&key.to_string()) {
                continue;
            }
            self.remove_local(key);
        }

        if failed_keys.is_empty() {
            Ok(())
        } else {
            Err(CacheError::WriterBatch { failed_keys: failed_keys.into_iter().collect() })
        }
    }

    /// Runs `f` against a surrogate view of the entry for `key`, applying
    /// whatever mutation it requested as a single atomic step relative to
    /// other callers of `invoke`/`invoke_all` on the same key's shard.
    ///
    /// # Errors
    /// Returns [`CacheError::Processor`] if `f` panics, or propagates a
    /// configured writer's error if the processor removed the entry with
    /// write-through.
    pub fn invoke<R>(
        &self,
        key: K,
        f: impl FnOnce(&mut MutableEntry<'_, V>) -> R,
    ) -> CacheResult<R> {
        self.ensure_open()?;
        let now = self.clock.now_millis();

        match self.map.entry(key.clone()) {
            Entry::Occupied(mut occ) => {
                let current = if occ.get().is_invalid(now) { None } else { occ.get().peek() };
                let (op, result) = crate::cache::processor::invoke(&current, f)?;
                match op {
                    EntryOp::Nop => {}
                    EntryOp::Set(value) => {
                        if let Some(writer) = &self.config.writer {
                            writer.write(&key, &value)?;
                        }
                        let size_delta = self.weigh(&value);
                        let holder = self.new_holder(value.clone())?;
                        let old = occ.insert(holder);
                        old.release();
                        self.stats.add_memory_bytes(size_delta);
                        self.stats.record_put();
                        match current {
                            Some(old_value) => self.listeners.notify(CacheEvent::Updated {
                                key,
                                old_value,
                                new_value: value,
                            }),
                            None => self.listeners.notify(CacheEvent::Created { key, value }),
                        }
                        self.maybe_signal_eviction();
                    }
                    EntryOp::Remove => {
                        let (_, holder) = occ.remove_entry();
                        holder.release();
                    }
                    EntryOp::RemoveWriteThrough => {
                        if let Some(writer) = &self.config.writer {
                            writer.delete(&key)?;
                        }
                        let (_, holder) = occ.remove_entry();
                        let value = holder.peek();
                        if holder.release() {
                            if let Some(value) = value {
                                self.stats.record_remove();
                                self.listeners.notify(CacheEvent::Removed { key, value });
                            }
                        }
                    }
                }
                Ok(result)
            }
            Entry::Vacant(vac) => {
                let (op, result) = crate::cache::processor::invoke(&None, f)?;
                match op {
                    EntryOp::Nop | EntryOp::Remove => {}
                    EntryOp::RemoveWriteThrough => {
                        if let Some(writer) = &self.config.writer {
                            writer.delete(&key)?;
                        }
                    }
                    EntryOp::Set(value) => {
                        if let Some(writer) = &self.config.writer {
                            writer.write(&key, &value)?;
                        }
                        let size_delta = self.weigh(&value);
                        let holder = self.new_holder(value.clone())?;
                        vac.insert(holder);
                        self.stats.add_memory_bytes(size_delta);
                        self.stats.record_put();
                        self.listeners.notify(CacheEvent::Created { key, value });
                        self.maybe_signal_eviction();
                    }
                }
                Ok(result)
            }
        }
    }

    /// Batched [`Self::invoke`], applied in key order.
    ///
    /// # Errors
    /// Propagates the first failing per-key `invoke`.
    pub fn invoke_all<R>(
        &self,
        keys: Vec<K>,
        mut f: impl FnMut(&K, &mut MutableEntry<'_, V>) -> R,
    ) -> CacheResult<Vec<(K, R)>> {
        keys.into_iter()
            .map(|key| {
                let result = self.invoke(key.clone(), |entry| f(&key, entry))?;
                Ok((key, result))
            })
            .collect()
    }

    /// Registers an event listener.
    ///
    /// # Errors
    /// Returns [`CacheError::DuplicateListener`] if the same listener `Arc`
    /// is already registered under the same [`DispatchMode`].
    pub fn add_listener(
        &self,
        listener: Arc<dyn CacheEventListener<K, V>>,
        mode: DispatchMode,
    ) -> CacheResult<ListenerRegistration> {
        self.listeners.register(ListenerConfig { listener, mode })
    }

    #[must_use]
    pub fn remove_listener(&self, registration: ListenerRegistration) -> bool {
        self.listeners.deregister(registration)
    }

    #[must_use]
    pub fn statistics(&self) -> CacheStatisticsSnapshot {
        self.stats.snapshot()
    }

    pub fn set_statistics_enabled(&self, enabled: bool) {
        self.stats.set_enabled(enabled);
    }

    /// Schedules every entry to expire within `max_delay_ms` (jittered),
    /// without blocking on the removals themselves; the sweeper picks them
    /// up on its next round. Never extends an entry's existing lifetime.
    pub fn expire_all_within(&self, max_delay_ms: u64) {
        let mut rng = rand::rng();
        let now = self.clock.now_millis();
        for entry in self.map.iter() {
            entry.value().set_expire_until(now, max_delay_ms, &mut rng);
        }
        self.sweeper.wake();
    }

    /// Stops the background sweeper and evictor. Each worker gets a 100ms
    /// grace period to finish its current round before `close` gives up
    /// waiting on it; the thread itself still runs to completion in the
    /// background. Idempotent: a second call is a no-op.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        manager::deregister(&self.id);
        self.sweeper.stop();

        if let Some(evictor) = &self.evictor {
            evictor.stop();
        }
        let grace = std::time::Duration::from_millis(100);
        if let Some(handle) = self.sweeper_handle.lock().take() {
            join_with_timeout(handle, grace);
        }
        if let Some(handle) = self.evictor_handle.lock().take() {
            join_with_timeout(handle, grace);
        }
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

/// Joins `handle`, logging (rather than blocking indefinitely) if the
/// worker doesn't finish within `grace`. `JoinHandle` has no native
/// join-with-timeout, so this polls via `is_finished`.
fn join_with_timeout(handle: JoinHandle<()>, grace: std::time::Duration) {
    let deadline = Instant::now() + grace;
    while !handle.is_finished() && Instant::now() < deadline {
        std::thread::sleep(std::time::Duration::from_millis(5));
    }
    if handle.is_finished() {
        let _ = handle.join();
    } else {
        log::warn!("cache worker thread did not stop within the close() grace period");
    }
}

impl<K, V> Drop for Cache<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + serde::Serialize + serde::de::DeserializeOwned + 'static,
{
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::config::{CacheBuilder, EvictionStrategy};
    use std::sync::atomic::AtomicUsize;

    fn small_cache() -> Cache<String, i32> {
        CacheBuilder::new().expected_size(4).eviction_policy(EvictionStrategy::Lru).build().unwrap()
    }

    #[test]
    fn put_then_get_round_trips() {
        let cache = small_cache();
        cache.put("a".into(), 1).unwrap();
        assert_eq!(cache.get(&"a".to_string()).unwrap(), Some(1));
    }

    #[test]
    fn get_on_missing_key_is_none() {
        let cache = small_cache();
        assert_eq!(cache.get(&"missing".to_string()).unwrap(), None);
    }

    #[test]
    fn put_if_absent_does_not_overwrite() {
        let cache = small_cache();
        assert!(cache.put_if_absent("a".into(), 1).unwrap());
        assert!(!cache.put_if_absent("a".into(), 2).unwrap());
        assert_eq!(cache.get(&"a".to_string()).unwrap(), Some(1));
    }

    #[test]
    fn replace_if_matches_expected_value_only() {
        let cache = small_cache();
        cache.put("a".into(), 1).unwrap();
        assert!(!cache.replace_if("a".into(), &2, 3).unwrap());
        assert!(cache.replace_if("a".into(), &1, 3).unwrap());
        assert_eq!(cache.get(&"a".to_string()).unwrap(), Some(3));
    }

    #[test]
    fn remove_returns_previous_value() {
        let cache = small_cache();
        cache.put("a".into(), 1).unwrap();
        assert_eq!(cache.remove(&"a".to_string()).unwrap(), Some(1));
        assert_eq!(cache.get(&"a".to_string()).unwrap(), None);
    }

    #[test]
    fn clear_empties_the_cache() {
        let cache = small_cache();
        cache.put("a".into(), 1).unwrap();
        cache.put("b".into(), 2).unwrap();
        cache.clear().unwrap();
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn closed_cache_rejects_operations() {
        let cache = small_cache();
        cache.close();
        assert!(matches!(cache.get(&"a".to_string()), Err(CacheError::Closed)));
        assert!(matches!(cache.put("a".into(), 1), Err(CacheError::Closed)));
    }

    #[test]
    fn close_is_idempotent() {
        let cache = small_cache();
        cache.close();
        cache.close();
        assert!(cache.is_closed());
    }

    #[test]
    fn invoke_can_set_and_remove() {
        let cache = small_cache();
        cache.invoke("a".to_string(), |entry| entry.set_value(10)).unwrap();
        assert_eq!(cache.get(&"a".to_string()).unwrap(), Some(10));
        cache.invoke("a".to_string(), |entry| entry.remove()).unwrap();
        assert_eq!(cache.get(&"a".to_string()).unwrap(), None);
    }

    #[test]
    fn iter_reflects_point_in_time_snapshot() {
        let cache = small_cache();
        cache.put("a".into(), 1).unwrap();
        cache.put("b".into(), 2).unwrap();
        let collected: Vec<_> = cache.iter().collect();
        assert_eq!(collected.len(), 2);
    }

    #[test]
    fn listener_observes_created_event() {
        struct Probe(Arc<AtomicUsize>);
        impl CacheEventListener<String, i32> for Probe {
            fn on_event(&self, event: &CacheEvent<String, i32>) {
                if matches!(event, CacheEvent::Created { .. }) {
                    self.0.fetch_add(1, Ordering::Relaxed);
                }
            }
        }
        let cache = small_cache();
        let count = Arc::new(AtomicUsize::new(0));
        cache.add_listener(Arc::new(Probe(Arc::clone(&count))), DispatchMode::Sync).unwrap();
        cache.put("a".into(), 1).unwrap();
        assert_eq!(count.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn lru_eviction_keeps_cache_within_expected_size() {
        let cache = small_cache();
        for i in 0..50 {
            cache.put(format!("k{i}"), i).unwrap();
        }
        assert!(cache.len() <= 5, "len was {}", cache.len());
    }
}
