//! Per-entry metadata + value holder.
//!
//! A holder is created incomplete, published with `complete`, and from then
//! on treated as immutable metadata wrapping a mutable value cell. Readers
//! may keep an `Arc<EntryHolder<V>>` after the holder has been released; the
//! released check on every read is what keeps that safe.

use parking_lot::RwLock;
use rand::Rng;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU32, AtomicU64, Ordering};

use crate::errors::CacheResult;

/// Selects whether a cache stores values directly or as serialized bytes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WriteMode {
    /// Values are stored and returned by clone.
    Identity,
    /// Values are serialized on `put` and deserialized on every read, so a
    /// caller mutating its own copy after `put` can never observe a change
    /// in the cached value ("as if by copy").
    Serialize,
}

#[derive(Clone, Debug)]
pub(crate) enum StoredValue<V> {
    Identity(V),
    Serialized(Vec<u8>),
}

/// A duration packed into a single `u64`: exact whole seconds are tagged and
/// stored as seconds, everything else (including 0, meaning "unbounded") is
/// stored as milliseconds. Conversion back to milliseconds is lossless
/// within each regime.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub(crate) struct CompactDuration(u64);

const SECONDS_TAG: u64 = 1 << 63;

impl CompactDuration {
    pub(crate) fn from_millis(ms: u64) -> Self {
        if ms != 0 && ms % 1000 == 0 && (ms / 1000) < SECONDS_TAG {
            Self(SECONDS_TAG | (ms / 1000))
        } else {
            Self(ms)
        }
    }

    pub(crate) fn as_millis(self) -> u64 {
        if self.0 & SECONDS_TAG != 0 { (self.0 & !SECONDS_TAG) * 1000 } else { self.0 }
    }

    pub(crate) fn is_unbounded(self) -> bool {
        self.0 == 0
    }

    fn to_raw(self) -> u64 {
        self.0
    }

    fn from_raw(raw: u64) -> Self {
        Self(raw)
    }
}

const STATE_INCOMPLETE: u8 = 0;
const STATE_COMPLETE: u8 = 1;

pub struct EntryHolder<V> {
    value: RwLock<Option<StoredValue<V>>>,
    write_mode: WriteMode,
    input_time: AtomicU64,
    last_access_time: AtomicU64,
    max_idle: AtomicU64,
    max_cache_time: AtomicU64,
    use_count: AtomicU32,
    state: AtomicU8,
    released: AtomicBool,
}

impl<V: Clone> EntryHolder<V> {
    /// Creates an incomplete holder. `complete` must be called before the
    /// holder is published into the map.
    pub(crate) fn new(value: V, write_mode: WriteMode) -> CacheResult<Self>
    where
        V: serde::Serialize,
    {
        let stored = match write_mode {
            WriteMode::Identity => StoredValue::Identity(value),
            WriteMode::Serialize => {
                let bytes = bincode::serde::encode_to_vec(&value, bincode::config::standard())?;
                StoredValue::Serialized(bytes)
            }
        };
        Ok(Self {
            value: RwLock::new(Some(stored)),
            write_mode,
            input_time: AtomicU64::new(0),
            last_access_time: AtomicU64::new(0),
            max_idle: AtomicU64::new(0),
            max_cache_time: AtomicU64::new(0),
            use_count: AtomicU32::new(0),
            state: AtomicU8::new(STATE_INCOMPLETE),
            released: AtomicBool::new(false),
        })
    }

    /// Finalizes expiry fields and publishes the holder as complete.
    pub(crate) fn complete(&self, now_millis: u64, max_idle_ms: u64, max_cache_ms: u64) {
        self.input_time.store(now_millis, Ordering::Relaxed);
        self.last_access_time.store(now_millis, Ordering::Relaxed);
        self.max_idle.store(CompactDuration::from_millis(max_idle_ms).to_raw(), Ordering::Relaxed);
        self.max_cache_time
            .store(CompactDuration::from_millis(max_cache_ms).to_raw(), Ordering::Relaxed);
        self.state.store(STATE_COMPLETE, Ordering::Release);
    }

    fn is_complete(&self) -> bool {
        self.state.load(Ordering::Acquire) == STATE_COMPLETE
    }

    fn decode(&self, stored: &StoredValue<V>) -> Option<V>
    where
        V: serde::de::DeserializeOwned,
    {
        match stored {
            StoredValue::Identity(v) => Some(v.clone()),
            StoredValue::Serialized(bytes) => {
                match bincode::serde::decode_from_slice::<V, _>(bytes, bincode::config::standard())
                {
                    Ok((v, _)) => Some(v),
                    Err(err) => {
                        log::warn!("failed to deserialize cached value: {err}");
                        None
                    }
                }
            }
        }
    }

    /// Reads the value without touching access time or use count.
    pub(crate) fn peek(&self) -> Option<V>
    where
        V: serde::de::DeserializeOwned,
    {
        if self.released.load(Ordering::Acquire) {
            return None;
        }
        let guard = self.value.read();
        guard.as_ref().and_then(|stored| self.decode(stored))
    }

    /// `peek` plus a bump of `last_access_time`.
    pub(crate) fn get(&self, now_millis: u64) -> Option<V>
    where
        V: serde::de::DeserializeOwned,
    {
        let value = self.peek();
        if value.is_some() {
            self.last_access_time.store(now_millis, Ordering::Relaxed);
        }
        value
    }

    /// Racy-by-design increment: lost updates are acceptable since the
    /// counter only feeds eviction scoring, and avoiding a stronger fence
    /// keeps the read path free of an extra barrier.
    pub(crate) fn increment_use_count(&self) {
        let current = self.use_count.load(Ordering::Relaxed);
        self.use_count.store(current.wrapping_add(1), Ordering::Relaxed);
    }

    pub(crate) fn use_count(&self) -> u32 {
        self.use_count.load(Ordering::Relaxed)
    }

    pub(crate) fn last_access_time(&self) -> u64 {
        self.last_access_time.load(Ordering::Relaxed)
    }

    pub(crate) fn input_time(&self) -> u64 {
        self.input_time.load(Ordering::Relaxed)
    }

    pub(crate) fn is_invalid(&self, now_millis: u64) -> bool {
        if self.released.load(Ordering::Acquire) || !self.is_complete() {
            return true;
        }
        let max_idle = CompactDuration::from_raw(self.max_idle.load(Ordering::Relaxed));
        if !max_idle.is_unbounded() {
            let idle = now_millis.saturating_sub(self.last_access_time());
            if idle > max_idle.as_millis() {
                return true;
            }
        }
        let max_cache = CompactDuration::from_raw(self.max_cache_time.load(Ordering::Relaxed));
        if !max_cache.is_unbounded() {
            let age = now_millis.saturating_sub(self.input_time());
            if age > max_cache.as_millis() {
                return true;
            }
        }
        false
    }

    /// Publishes `None`. Returns whether this call performed the release
    /// (at most one caller ever observes `true`).
    pub(crate) fn release(&self) -> bool {
        if self.released.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire).is_ok()
        {
            *self.value.write() = None;
            true
        } else {
            false
        }
    }

    /// Schedules a randomized earlier expiration; never extends the current
    /// lifetime. Used for mass-expiration scenarios (e.g. cache-wide
    /// invalidation with jitter to avoid a thundering herd of misses).
    /// `now_millis` must be the cache's real current time, not
    /// `last_access_time` — a stale, rarely-read entry has an old access
    /// time, and computing the age-so-far from it instead of from real time
    /// would cap `max_cache_time` far too low, causing the near-immediate
    /// expiry this jitter exists to prevent.
    pub(crate) fn set_expire_until(&self, now_millis: u64, max_delay_ms: u64, rng: &mut impl Rng) {
        if max_delay_ms == 0 {
            return;
        }
        let jitter = rng.random_range(0..=max_delay_ms);
        let current = CompactDuration::from_raw(self.max_cache_time.load(Ordering::Relaxed));
        let age_so_far = now_millis.saturating_sub(self.input_time());
        let proposed_absolute = age_so_far.saturating_add(jitter);
        let new_cap = if current.is_unbounded() {
            proposed_absolute
        } else {
            current.as_millis().min(proposed_absolute)
        };
        self.max_cache_time.store(CompactDuration::from_millis(new_cap).to_raw(), Ordering::Relaxed);
    }

    pub(crate) fn write_mode(&self) -> WriteMode {
        self.write_mode
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn holder(value: &str) -> EntryHolder<String> {
        EntryHolder::new(value.to_string(), WriteMode::Identity).unwrap()
    }

    #[test]
    fn incomplete_holder_is_invalid() {
        let h = holder("v");
        assert!(h.is_invalid(0));
    }

    #[test]
    fn completed_holder_is_visible_until_expiry() {
        let h = holder("v");
        h.complete(1_000, 0, 0);
        assert!(!h.is_invalid(1_000));
        assert_eq!(h.get(1_000), Some("v".to_string()));
    }

    #[test]
    fn max_idle_zero_never_expires_by_idleness() {
        let h = holder("v");
        h.complete(0, 0, 0);
        assert!(!h.is_invalid(1_000_000_000));
    }

    #[test]
    fn idle_expiry_trips_after_bound() {
        let h = holder("v");
        h.complete(0, 1_000, 0);
        assert!(!h.is_invalid(1_000));
        assert!(h.is_invalid(2_001));
    }

    #[test]
    fn age_expiry_trips_after_bound_even_if_recently_read() {
        let h = holder("v");
        h.complete(0, 0, 1_000);
        // simulate a read bumping last_access_time close to the age bound
        let _ = h.get(900);
        assert!(!h.is_invalid(1_000));
        assert!(h.is_invalid(1_001));
    }

    #[test]
    fn release_is_effective_exactly_once() {
        let h = holder("v");
        h.complete(0, 0, 0);
        assert!(h.release());
        assert!(!h.release());
        assert!(h.is_invalid(0));
        assert_eq!(h.peek(), None);
    }

    #[test]
    fn serialize_mode_round_trips_and_is_isolated_from_caller_mutation() {
        let mut original = vec![1_i32, 2, 3];
        let h: EntryHolder<Vec<i32>> =
            EntryHolder::new(original.clone(), WriteMode::Serialize).unwrap();
        h.complete(0, 0, 0);
        original.push(4);
        assert_eq!(h.peek(), Some(vec![1, 2, 3]));
    }

    #[test]
    fn compact_duration_round_trips_seconds_and_millis() {
        assert_eq!(CompactDuration::from_millis(0).as_millis(), 0);
        assert!(CompactDuration::from_millis(0).is_unbounded());
        assert_eq!(CompactDuration::from_millis(5_000).as_millis(), 5_000);
        assert_eq!(CompactDuration::from_millis(1_234).as_millis(), 1_234);
        assert_eq!(CompactDuration::from_millis(60_000).as_millis(), 60_000);
    }

    #[test]
    fn use_count_increments() {
        let h = holder("v");
        h.complete(0, 0, 0);
        assert_eq!(h.use_count(), 0);
        h.increment_use_count();
        h.increment_use_count();
        assert_eq!(h.use_count(), 2);
    }

    #[test]
    fn concurrent_release_calls_have_exactly_one_winner() {
        use std::sync::Arc;
        let h = Arc::new(holder("v"));
        h.complete(0, 0, 0);
        let winners: usize = (0..8)
            .map(|_| {
                let h = Arc::clone(&h);
                std::thread::spawn(move || h.release())
            })
            .collect::<Vec<_>>()
            .into_iter()
            .map(|handle| usize::from(handle.join().unwrap()))
            .sum();
        assert_eq!(winners, 1);
    }

    #[test]
    fn set_expire_until_never_extends_lifetime() {
        let h = holder("v");
        h.complete(0, 0, 10_000);
        let mut rng = rand::rng();
        h.set_expire_until(0, 1, &mut rng);
        // the new cap must be <= the original 10s bound
        let raw = h.max_cache_time.load(Ordering::Relaxed);
        assert!(CompactDuration::from_raw(raw).as_millis() <= 10_000);
    }

    #[test]
    fn set_expire_until_uses_real_now_not_last_access_time() {
        let h = holder("v");
        h.complete(0, 0, 0); // unbounded max_cache_time, input_time = 0
        let now_millis = 1_000_000;
        let mut rng = rand::rng();
        h.set_expire_until(now_millis, 1_000, &mut rng);

        // a stale entry's cap must be anchored to the real current time, not
        // to its (possibly ancient) last_access_time — otherwise the cap
        // would land somewhere in 0..=1_000 and the entry would already be
        // expired.
        assert!(!h.is_invalid(now_millis));
        assert!(h.is_invalid(now_millis + 1_001));
    }
}
