#![forbid(unsafe_code)]

//! A thread-safe, in-process key/value cache with expiration, pluggable
//! eviction, read-through/write-through, entry processors, and event
//! listeners.
//!
//! ```
//! use tricache::{CacheBuilder, Cache};
//!
//! let cache: Cache<String, String> = CacheBuilder::new()
//!     .expected_size(1_000)
//!     .max_idle_time_secs(300)
//!     .build()
//!     .unwrap();
//!
//! cache.put("key".to_string(), "value".to_string()).unwrap();
//! assert_eq!(cache.get(&"key".to_string()).unwrap(), Some("value".to_string()));
//! ```

pub mod cache;
pub mod errors;
pub mod time;
pub mod utils;

pub use cache::{
    Cache, CacheBuilder, CacheConfig, CacheEvent, CacheEventListener, CacheIter, CacheLoader,
    CacheStatistics, CacheStatisticsSnapshot, CacheWriter, DispatchMode, EntryOp,
    EvictionPolicy, EvictionStrategy, JamPolicy, ListenerRegistration, Lfu, Lru, MutableEntry,
    WriteMode,
};
pub use errors::{CacheError, CacheResult};

/// Initializes logging for standalone binaries embedding this crate.
/// Libraries should generally leave logger setup to the application; this
/// exists for parity with the examples under `demos/`.
///
/// # Errors
/// Returns an error if the logger cannot be initialized.
pub fn init_logging() -> Result<(), Box<dyn std::error::Error>> {
    utils::logger::configure_from_env();
    Ok(())
}
