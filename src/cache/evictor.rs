//! Capacity-driven eviction worker.
//!
//! Runs a "freeze, sort, remove" round: snapshot a mutable scoring attribute
//! per entry (never locking the live map for the duration of the sort),
//! rank by the configured policy, then remove the lowest-ranked entries
//! until the map is back under its low-water mark.

use std::hash::Hash;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};
use dashmap::DashMap;
use parking_lot::{Condvar, Mutex};

use crate::cache::entry::EntryHolder;
use crate::cache::listener::{CacheEvent, ListenerRegistry};
use crate::cache::policy::{EvictionPolicy, Frozen};
use crate::cache::stats::CacheStatistics;

const STATE_IDLE: u8 = 0;
const STATE_SIGNALED: u8 = 1;
const STATE_RUNNING: u8 = 2;

/// Headroom above `expected_size` before writers start observing the jam
/// policy or a round is worth signaling.
const BLOCK_START_SPREAD: f64 = 0.15;
/// Fraction of `expected_size` a round tries to remove in one pass.
const EVICT_NORMALLY_FRACTION: f64 = 0.10;

/// Size at which foreground writers start observing the jam policy.
fn block_start_at(expected_size: usize) -> usize {
    expected_size + ((expected_size as f64 * BLOCK_START_SPREAD).max(0.0)) as usize
}

/// Number of entries a single round normally removes.
fn evict_normally(expected_size: usize) -> usize {
    ((expected_size as f64 * EVICT_NORMALLY_FRACTION) as usize).max(1)
}

/// Low-water mark a round tries to reach.
fn evict_until_at_least(expected_size: usize) -> usize {
    expected_size.saturating_sub(evict_normally(expected_size))
}

pub(crate) struct Evictor {
    state: AtomicU8,
    stop: AtomicBool,
    signal_tx: Sender<()>,
    done: Mutex<()>,
    done_condvar: Condvar,
}

impl Evictor {
    pub(crate) fn spawn<K, V>(
        map: Arc<DashMap<K, Arc<EntryHolder<V>>>>,
        listeners: Arc<ListenerRegistry<K, V>>,
        stats: Arc<CacheStatistics>,
        policy: Arc<dyn EvictionPolicy<K, V>>,
        expected_size: usize,
    ) -> (Arc<Self>, JoinHandle<()>)
    where
        K: Eq + Hash + Clone + Send + Sync + 'static,
        V: Clone + Send + Sync + serde::de::DeserializeOwned + 'static,
    {
        let (tx, rx): (Sender<()>, Receiver<()>) = bounded(2);
        let evictor = Arc::new(Self {
            state: AtomicU8::new(STATE_IDLE),
            stop: AtomicBool::new(false),
            signal_tx: tx,
            done: Mutex::new(()),
            done_condvar: Condvar::new(),
        });
        let worker_handle = Arc::clone(&evictor);
        let handle = thread::Builder::new()
            .name("tricache-evictor".into())
            .spawn(move || {
                while rx.recv().is_ok() {
                    if worker_handle.stop.load(Ordering::Relaxed) {
                        break;
                    }
                    worker_handle.state.store(STATE_RUNNING, Ordering::Release);
                    worker_handle.run_round(&map, &listeners, &stats, &policy, expected_size);
                    worker_handle.state.store(STATE_IDLE, Ordering::Release);
                    let _guard = worker_handle.done.lock();
                    worker_handle.done_condvar.notify_all();
                }
            })
            .expect("failed to spawn eviction worker thread");
        (evictor, handle)
    }

    /// Capacity marks: a round is worth running as soon as the map reaches
    /// `expected_size` (not `block_start_at`, which only gates when
    /// foreground writers start observing the jam policy); it targets
    /// `evict_until_at_least`, the low-water mark a round tries to reach.
    fn elements_to_remove(current: usize, expected_size: usize) -> usize {
        if current < expected_size {
            return 0;
        }
        current.saturating_sub(evict_until_at_least(expected_size))
    }

    fn run_round<K, V>(
        &self,
        map: &DashMap<K, Arc<EntryHolder<V>>>,
        listeners: &ListenerRegistry<K, V>,
        stats: &CacheStatistics,
        policy: &Arc<dyn EvictionPolicy<K, V>>,
        expected_size: usize,
    ) where
        K: Eq + Hash + Clone + Send + Sync + 'static,
        V: Clone + Send + Sync + serde::de::DeserializeOwned + 'static,
    {
        stats.record_eviction_round();
        policy.before_round();

        let current = map.len();
        let to_remove = Self::elements_to_remove(current, expected_size);
        if to_remove == 0 {
            policy.after_round();
            return;
        }

        let mut frozen: Vec<Frozen<K, V>> = map
            .iter()
            .map(|entry| {
                let holder = Arc::clone(entry.value());
                let score = policy.freeze_value(entry.key(), &holder);
                let last_access_time = holder.last_access_time();
                Frozen { key: entry.key().clone(), holder, score, last_access_time }
            })
            .collect();
        frozen.sort_by(|a, b| policy.compare(a, b));

        let mut evicted = 0_u64;
        for candidate in frozen.into_iter().take(to_remove) {
            // Only remove if the live entry is still the exact holder that was
            // scored; a `put()` racing the snapshot may have replaced it.
            let removed =
                map.remove_if(&candidate.key, |_, live| Arc::ptr_eq(live, &candidate.holder));
            if let Some((key, holder)) = removed {
                let value = holder.peek();
                if holder.release() {
                    if let Some(value) = value {
                        listeners.notify(CacheEvent::Removed { key, value });
                    }
                    evicted += 1;
                }
            }
        }
        stats.record_evictions(evicted);
        policy.after_round();
    }

    /// Signals a round, collapsing concurrent signals (the channel holds at
    /// most 2) so a burst of puts triggers one round, not N.
    pub(crate) fn signal(&self) {
        if self
            .state
            .compare_exchange(STATE_IDLE, STATE_SIGNALED, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }
        if let Err(TrySendError::Full(())) = self.signal_tx.try_send(()) {
            // Another signal is already queued; the pending round will
            // observe the latest map state anyway.
            self.state.store(STATE_IDLE, Ordering::Release);
        }
    }

    /// Signals the worker thread to exit after its current (or next) round.
    pub(crate) fn stop(&self) {
        self.stop.store(true, Ordering::Relaxed);
        let _ = self.signal_tx.try_send(());
    }

    /// Blocks the caller until the in-flight round (if any) completes.
    /// Used by the `Wait` jam policy.
    pub(crate) fn wait_for_round(&self) {
        let mut guard = self.done.lock();
        while self.state.load(Ordering::Acquire) != STATE_IDLE {
            self.done_condvar.wait(&mut guard);
        }
    }

    pub(crate) fn is_over_capacity<K, V>(
        map: &DashMap<K, Arc<EntryHolder<V>>>,
        expected_size: usize,
    ) -> bool
    where
        K: Eq + Hash + Clone,
    {
        map.len() >= block_start_at(expected_size)
    }
}
