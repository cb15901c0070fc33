//! Expiration sweeper: a background worker that periodically removes
//! invalid (idle-expired or aged-out) entries the read path hasn't already
//! caught.

use std::hash::Hash;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::{Condvar, Mutex};

use crate::cache::entry::EntryHolder;
use crate::cache::listener::{CacheEvent, ListenerRegistry};
use crate::cache::stats::CacheStatistics;
use crate::time::CoarseClock;

const CONSECUTIVE_NO_PROGRESS_HALT: u32 = 10;

/// Parking primitive the sweeper sleeps on between rounds; `notify_one` lets
/// a newly-populated cache wake it early instead of waiting a full interval.
pub(crate) struct SweeperParker {
    mutex: Mutex<()>,
    condvar: Condvar,
}

impl SweeperParker {
    pub(crate) fn new() -> Self {
        Self { mutex: Mutex::new(()), condvar: Condvar::new() }
    }

    fn wait_timeout(&self, interval: Duration) {
        let mut guard = self.mutex.lock();
        self.condvar.wait_for(&mut guard, interval);
    }

    pub(crate) fn notify(&self) {
        self.condvar.notify_one();
    }
}

pub(crate) struct Sweeper {
    stop: AtomicBool,
    halted: AtomicBool,
    consecutive_no_progress: AtomicU32,
    parker: SweeperParker,
}

impl Sweeper {
    pub(crate) fn spawn<K, V>(
        map: Arc<DashMap<K, Arc<EntryHolder<V>>>>,
        listeners: Arc<ListenerRegistry<K, V>>,
        stats: Arc<CacheStatistics>,
        clock: Arc<CoarseClock>,
        interval_ms: u64,
    ) -> (Arc<Self>, JoinHandle<()>)
    where
        K: Eq + Hash + Clone + Send + Sync + 'static,
        V: Clone + Send + Sync + serde::de::DeserializeOwned + 'static,
    {
        let sweeper = Arc::new(Self {
            stop: AtomicBool::new(false),
            halted: AtomicBool::new(false),
            consecutive_no_progress: AtomicU32::new(0),
            parker: SweeperParker::new(),
        });
        let worker_handle = Arc::clone(&sweeper);
        let interval = Duration::from_millis(interval_ms.max(1));
        let handle = thread::Builder::new()
            .name("tricache-sweeper".into())
            .spawn(move || {
                while !worker_handle.stop.load(Ordering::Relaxed) {
                    worker_handle.parker.wait_timeout(interval);
                    if worker_handle.stop.load(Ordering::Relaxed) {
                        break;
                    }
                    if map.is_empty() {
                        continue;
                    }
                    let result = panic::catch_unwind(AssertUnwindSafe(|| {
                        worker_handle.run_round(&map, &listeners, &stats, clock.now_millis())
                    }));
                    match result {
                        Ok(removed) => {
                            if removed == 0 {
                                let consecutive = worker_handle
                                    .consecutive_no_progress
                                    .fetch_add(1, Ordering::Relaxed)
                                    + 1;
                                if consecutive >= CONSECUTIVE_NO_PROGRESS_HALT {
                                    worker_handle.halted.store(true, Ordering::Relaxed);
                                    stats.record_eviction_halt();
                                    log::warn!(
                                        "expiration sweeper halting after {consecutive} rounds with no progress"
                                    );
                                }
                            } else {
                                worker_handle.consecutive_no_progress.store(0, Ordering::Relaxed);
                                worker_handle.halted.store(false, Ordering::Relaxed);
                            }
                        }
                        Err(_) => {
                            log::error!("expiration sweeper round panicked; restarting next tick");
                        }
                    }
                }
            })
            .expect("failed to spawn expiration sweeper thread");
        (sweeper, handle)
    }

    fn run_round<K, V>(
        &self,
        map: &DashMap<K, Arc<EntryHolder<V>>>,
        listeners: &ListenerRegistry<K, V>,
        stats: &CacheStatistics,
        now_millis: u64,
    ) -> u64
    where
        K: Eq + Hash + Clone + Send + Sync + 'static,
        V: Clone + Send + Sync + serde::de::DeserializeOwned + 'static,
    {
        let expired_keys: Vec<K> = map
            .iter()
            .filter(|entry| entry.value().is_invalid(now_millis))
            .map(|entry| entry.key().clone())
            .collect();

        let mut removed = 0_u64;
        for key in expired_keys {
            if let Some((_, holder)) = map.remove(&key) {
                let value = holder.peek();
                if holder.release() {
                    if let Some(value) = value {
                        listeners.notify(CacheEvent::Expired { key, value });
                    }
                    stats.record_remove();
                    removed += 1;
                }
            }
        }
        removed
    }

    pub(crate) fn wake(&self) {
        self.parker.notify();
    }

    pub(crate) fn stop(&self) {
        self.stop.store(true, Ordering::Relaxed);
        self.parker.notify();
    }

    #[cfg(test)]
    pub(crate) fn is_halted(&self) -> bool {
        self.halted.load(Ordering::Relaxed)
    }
}
