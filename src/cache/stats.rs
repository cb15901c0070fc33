//! Statistics recorder: monotonic counters plus a sliding-window eviction
//! rate and a periodically recomputed hit-ratio moving average.
//!
//! Grounded directly in the teacher's `cache::metrics::CacheMetrics`: one
//! atomic per counter, a `snapshot()` method returning a plain `Copy` struct.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

const WINDOW_BUCKETS: usize = 60;
const HIT_RATIO_SAMPLES: usize = 5;
const HIT_RATIO_RECOMPUTE_INTERVAL_SECS: u64 = 60;

/// 60 one-second buckets tracking eviction throughput.
struct SlidingWindow {
    buckets: Mutex<[u64; WINDOW_BUCKETS]>,
    current_bucket_secs: AtomicU64,
}

impl SlidingWindow {
    fn new() -> Self {
        Self { buckets: Mutex::new([0; WINDOW_BUCKETS]), current_bucket_secs: AtomicU64::new(0) }
    }

    fn record(&self, now_secs: u64, count: u64) {
        let mut buckets = self.buckets.lock();
        let last = self.current_bucket_secs.load(Ordering::Relaxed);
        let idx = (now_secs % WINDOW_BUCKETS as u64) as usize;
        if now_secs != last {
            let gap = now_secs.saturating_sub(last).min(WINDOW_BUCKETS as u64);
            for step in 1..=gap {
                let clear_idx = ((last + step) % WINDOW_BUCKETS as u64) as usize;
                buckets[clear_idx] = 0;
            }
            self.current_bucket_secs.store(now_secs, Ordering::Relaxed);
        }
        buckets[idx] += count;
    }

    fn rate_per_second(&self, now_secs: u64) -> f64 {
        let buckets = self.buckets.lock();
        let last = self.current_bucket_secs.load(Ordering::Relaxed);
        if now_secs.saturating_sub(last) >= WINDOW_BUCKETS as u64 {
            return 0.0;
        }
        let total: u64 = buckets.iter().sum();
        total as f64 / WINDOW_BUCKETS as f64
    }
}

struct HitRatioTracker {
    samples: Mutex<[f64; HIT_RATIO_SAMPLES]>,
    sample_idx: AtomicU64,
    last_recompute_secs: AtomicU64,
    last_hits: AtomicU64,
    last_misses: AtomicU64,
}

impl HitRatioTracker {
    fn new() -> Self {
        Self {
            samples: Mutex::new([0.0; HIT_RATIO_SAMPLES]),
            sample_idx: AtomicU64::new(0),
            last_recompute_secs: AtomicU64::new(0),
            last_hits: AtomicU64::new(0),
            last_misses: AtomicU64::new(0),
        }
    }

    fn maybe_recompute(&self, now_secs: u64, hits: u64, misses: u64) {
        let last = self.last_recompute_secs.load(Ordering::Relaxed);
        if now_secs.saturating_sub(last) < HIT_RATIO_RECOMPUTE_INTERVAL_SECS && last != 0 {
            return;
        }
        self.last_recompute_secs.store(now_secs, Ordering::Relaxed);
        let prev_hits = self.last_hits.swap(hits, Ordering::Relaxed);
        let prev_misses = self.last_misses.swap(misses, Ordering::Relaxed);
        let delta_hits = hits.saturating_sub(prev_hits);
        let delta_misses = misses.saturating_sub(prev_misses);
        let total = delta_hits + delta_misses;
        let ratio = if total == 0 { 0.0 } else { (delta_hits as f64 / total as f64) * 100.0 };
        let idx = self.sample_idx.fetch_add(1, Ordering::Relaxed) as usize % HIT_RATIO_SAMPLES;
        self.samples.lock()[idx] = ratio;
    }

    fn average(&self) -> f64 {
        let samples = self.samples.lock();
        let sum: f64 = samples.iter().sum();
        (sum / HIT_RATIO_SAMPLES as f64).clamp(0.0, 100.0)
    }
}

/// Counters a cache maintains for the lifetime of its operation.
pub struct CacheStatistics {
    enabled: AtomicBool,
    hits: AtomicU64,
    misses: AtomicU64,
    puts: AtomicU64,
    removes: AtomicU64,
    drops: AtomicU64,
    eviction_count: AtomicU64,
    eviction_rounds: AtomicU64,
    eviction_halts: AtomicU64,
    memory_bytes: AtomicU64,
    total_get_ns: AtomicU64,
    total_put_ns: AtomicU64,
    total_remove_ns: AtomicU64,
    eviction_window: SlidingWindow,
    hit_ratio: HitRatioTracker,
}

impl Default for CacheStatistics {
    fn default() -> Self {
        Self {
            enabled: AtomicBool::new(true),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            puts: AtomicU64::new(0),
            removes: AtomicU64::new(0),
            drops: AtomicU64::new(0),
            eviction_count: AtomicU64::new(0),
            eviction_rounds: AtomicU64::new(0),
            eviction_halts: AtomicU64::new(0),
            memory_bytes: AtomicU64::new(0),
            total_get_ns: AtomicU64::new(0),
            total_put_ns: AtomicU64::new(0),
            total_remove_ns: AtomicU64::new(0),
            eviction_window: SlidingWindow::new(),
            hit_ratio: HitRatioTracker::new(),
        }
    }
}

fn now_secs() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0)
}

impl CacheStatistics {
    pub(crate) fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
        if !enabled {
            self.hits.store(0, Ordering::Relaxed);
            self.misses.store(0, Ordering::Relaxed);
            self.puts.store(0, Ordering::Relaxed);
            self.removes.store(0, Ordering::Relaxed);
            self.drops.store(0, Ordering::Relaxed);
            self.eviction_count.store(0, Ordering::Relaxed);
            self.eviction_rounds.store(0, Ordering::Relaxed);
            self.eviction_halts.store(0, Ordering::Relaxed);
        }
    }

    fn enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    pub(crate) fn record_hit(&self) {
        if self.enabled() {
            self.hits.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn record_miss(&self) {
        if self.enabled() {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn record_put(&self) {
        if self.enabled() {
            self.puts.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn record_remove(&self) {
        if self.enabled() {
            self.removes.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn record_drop(&self) {
        if self.enabled() {
            self.drops.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn record_evictions(&self, count: u64) {
        if self.enabled() && count > 0 {
            self.eviction_count.fetch_add(count, Ordering::Relaxed);
            self.eviction_window.record(now_secs(), count);
        }
    }

    pub(crate) fn record_eviction_round(&self) {
        if self.enabled() {
            self.eviction_rounds.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn record_eviction_halt(&self) {
        if self.enabled() {
            self.eviction_halts.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn add_memory_bytes(&self, delta: i64) {
        if delta >= 0 {
            self.memory_bytes.fetch_add(delta as u64, Ordering::Relaxed);
        } else {
            self.memory_bytes.fetch_sub(delta.unsigned_abs(), Ordering::Relaxed);
        }
    }

    pub(crate) fn record_get_ns(&self, ns: u64) {
        self.total_get_ns.fetch_add(ns, Ordering::Relaxed);
    }

    pub(crate) fn record_put_ns(&self, ns: u64) {
        self.total_put_ns.fetch_add(ns, Ordering::Relaxed);
    }

    pub(crate) fn record_remove_ns(&self, ns: u64) {
        self.total_remove_ns.fetch_add(ns, Ordering::Relaxed);
    }

    /// Returns the eviction rate averaged over the last 60 one-second
    /// buckets, and the 5-sample moving average of hit ratio (recomputed at
    /// most once a minute).
    pub fn snapshot(&self) -> CacheStatisticsSnapshot {
        let now = now_secs();
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        self.hit_ratio.maybe_recompute(now, hits, misses);
        CacheStatisticsSnapshot {
            hits,
            misses,
            puts: self.puts.load(Ordering::Relaxed),
            removes: self.removes.load(Ordering::Relaxed),
            drops: self.drops.load(Ordering::Relaxed),
            eviction_count: self.eviction_count.load(Ordering::Relaxed),
            eviction_rounds: self.eviction_rounds.load(Ordering::Relaxed),
            eviction_halts: self.eviction_halts.load(Ordering::Relaxed),
            memory_bytes: self.memory_bytes.load(Ordering::Relaxed),
            total_get_ns: self.total_get_ns.load(Ordering::Relaxed),
            total_put_ns: self.total_put_ns.load(Ordering::Relaxed),
            total_remove_ns: self.total_remove_ns.load(Ordering::Relaxed),
            eviction_rate_per_sec: self.eviction_window.rate_per_second(now),
            hit_ratio_percent: self.hit_ratio.average(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CacheStatisticsSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub puts: u64,
    pub removes: u64,
    pub drops: u64,
    pub eviction_count: u64,
    pub eviction_rounds: u64,
    pub eviction_halts: u64,
    pub memory_bytes: u64,
    pub total_get_ns: u64,
    pub total_put_ns: u64,
    pub total_remove_ns: u64,
    pub eviction_rate_per_sec: f64,
    pub hit_ratio_percent: f64,
}
