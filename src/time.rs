//! Low-overhead coarse wall clock.
//!
//! The cache touches the clock on every `get`/`put`; a syscall on that path
//! dominates. A single background ticker thread samples the wall clock and
//! publishes it to a shared atomic; readers pay only a relaxed load.

use once_cell::sync::Lazy;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

const TICK: Duration = Duration::from_millis(10);

pub struct CoarseClock {
    millis: AtomicU64,
}

impl CoarseClock {
    fn spawn() -> Arc<Self> {
        let clock = Arc::new(Self { millis: AtomicU64::new(Self::wall_millis()) });
        let bg = Arc::clone(&clock);
        let spawned = thread::Builder::new().name("tricache-clock".into()).spawn(move || {
            loop {
                thread::sleep(TICK);
                bg.millis.store(Self::wall_millis(), Ordering::Relaxed);
            }
        });
        if let Err(err) = spawned {
            log::error!("failed to spawn coarse clock ticker: {err}");
        }
        clock
    }

    fn wall_millis() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
            .unwrap_or(0)
    }

    /// Millisecond offset from the Unix epoch, accurate to within one tick.
    #[must_use]
    pub fn now_millis(&self) -> u64 {
        self.millis.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn now_secs(&self) -> u64 {
        self.now_millis() / 1000
    }
}

static CLOCK: Lazy<Arc<CoarseClock>> = Lazy::new(CoarseClock::spawn);

/// Returns the process-wide coarse clock, starting its ticker thread on first use.
///
/// All caches in a process share one ticker so opening many caches does not
/// spawn many clock threads.
#[must_use]
pub fn global() -> Arc<CoarseClock> {
    Arc::clone(&CLOCK)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn now_millis_is_roughly_wall_clock() {
        let clock = global();
        let before = CoarseClock::wall_millis();
        let sampled = clock.now_millis();
        // The ticker may not have run yet; allow generous slack either side.
        assert!(sampled <= before + 50, "sampled {sampled} vs wall {before}");
    }

    #[test]
    fn now_secs_is_now_millis_over_a_thousand() {
        let clock = global();
        assert_eq!(clock.now_secs(), clock.now_millis() / 1000);
    }
}
