//! Cache configuration and its fluent builder.
//!
//! Grounded in the teacher's `cache::config::CacheConfig` (a plain `Default`
//! struct) generalized from a single hard-coded `EvictionMode` enum into a
//! pluggable `EvictionStrategy` carrying a boxed policy for the `Custom`
//! case, and paired with a `CacheBuilder` the way the teacher pairs
//! `CacheConfig::default()` with `Cache::new_with_config`'s runtime `set_*`
//! mutators — here validated once at construction instead.

use std::hash::Hash;
use std::sync::Arc;

use crate::cache::core::Cache;
use crate::cache::entry::WriteMode;
use crate::cache::loader::CacheLoader;
use crate::cache::policy::{EvictionPolicy, Lfu, Lru};
use crate::cache::writer::CacheWriter;
use crate::errors::{CacheError, CacheResult};

/// Behavior of a foreground writer when the cache is at/over the block
/// threshold.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JamPolicy {
    /// Block on the eviction-done condition until room is freed.
    Wait,
    /// Reject the write immediately, counting it as a drop.
    Drop,
}

/// Selects which eviction policy a bounded cache runs.
pub enum EvictionStrategy<K, V> {
    Lfu,
    Lru,
    Custom(Arc<dyn EvictionPolicy<K, V>>),
    /// No eviction: the cache is unbounded and only the expiration sweeper
    /// ever removes entries.
    None,
}

impl<K, V> Clone for EvictionStrategy<K, V> {
    fn clone(&self) -> Self {
        match self {
            Self::Lfu => Self::Lfu,
            Self::Lru => Self::Lru,
            Self::Custom(policy) => Self::Custom(Arc::clone(policy)),
            Self::None => Self::None,
        }
    }
}

impl<K, V> EvictionStrategy<K, V>
where
    K: Eq + Hash + Clone + 'static,
    V: Clone + 'static,
{
    pub(crate) fn policy(&self) -> Option<Arc<dyn EvictionPolicy<K, V>>> {
        match self {
            Self::Lfu => Some(Arc::new(Lfu)),
            Self::Lru => Some(Arc::new(Lru)),
            Self::Custom(policy) => Some(Arc::clone(policy)),
            Self::None => None,
        }
    }
}

pub struct CacheConfig<K, V> {
    pub id: String,
    pub max_idle_time_secs: u64,
    pub max_cache_time_secs: u64,
    pub max_cache_time_spread_secs: u64,
    pub expected_size: usize,
    pub concurrency_level: usize,
    pub eviction_policy: EvictionStrategy<K, V>,
    pub jam_policy: JamPolicy,
    pub statistics: bool,
    pub write_mode: WriteMode,
    pub loader: Option<Arc<dyn CacheLoader<K, V>>>,
    pub writer: Option<Arc<dyn CacheWriter<K, V>>>,
    pub cleanup_interval_ms: Option<u64>,
    pub async_listener_queue_capacity: usize,
    /// Optional per-value size estimator feeding the `memory_bytes` statistic.
    pub weigher: Option<Arc<dyn Fn(&V) -> usize + Send + Sync>>,
}

impl<K, V> Default for CacheConfig<K, V> {
    fn default() -> Self {
        Self {
            id: format!("cache-{}", uuid::Uuid::new_v4()),
            max_idle_time_secs: 1800,
            max_cache_time_secs: 3600,
            max_cache_time_spread_secs: 0,
            expected_size: 10_000,
            concurrency_level: 14,
            eviction_policy: EvictionStrategy::Lfu,
            jam_policy: JamPolicy::Wait,
            statistics: true,
            write_mode: WriteMode::Identity,
            loader: None,
            writer: None,
            cleanup_interval_ms: None,
            async_listener_queue_capacity: 256,
            weigher: None,
        }
    }
}

impl<K, V> CacheConfig<K, V> {
    pub(crate) fn cleanup_interval_ms(&self) -> u64 {
        self.cleanup_interval_ms
            .unwrap_or_else(|| (self.max_idle_time_secs.max(1) * 1000 / 10).max(100))
    }

    pub(crate) fn validate(&self) -> CacheResult<()> {
        if self.concurrency_level < 1 {
            return Err(CacheError::InvalidConfig("concurrency_level must be >= 1".into()));
        }
        if self.expected_size == 0 {
            return Err(CacheError::InvalidConfig("expected_size must be >= 1".into()));
        }
        if self.async_listener_queue_capacity == 0 {
            return Err(CacheError::InvalidConfig(
                "async_listener_queue_capacity must be >= 1".into(),
            ));
        }
        Ok(())
    }
}

/// Fluent builder for [`Cache`]. Validates the assembled configuration once,
/// at `build()`, rather than on every runtime mutator.
pub struct CacheBuilder<K, V> {
    config: CacheConfig<K, V>,
}

impl<K, V> Default for CacheBuilder<K, V> {
    fn default() -> Self {
        Self { config: CacheConfig::default() }
    }
}

impl<K, V> CacheBuilder<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + serde::Serialize + serde::de::DeserializeOwned + 'static,
{
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.config.id = id.into();
        self
    }

    #[must_use]
    pub fn max_idle_time_secs(mut self, secs: u64) -> Self {
        self.config.max_idle_time_secs = secs;
        self
    }

    #[must_use]
    pub fn max_cache_time_secs(mut self, secs: u64) -> Self {
        self.config.max_cache_time_secs = secs;
        self
    }

    #[must_use]
    pub fn max_cache_time_spread_secs(mut self, secs: u64) -> Self {
        self.config.max_cache_time_spread_secs = secs;
        self
    }

    #[must_use]
    pub fn expected_size(mut self, size: usize) -> Self {
        self.config.expected_size = size;
        self
    }

    #[must_use]
    pub fn concurrency_level(mut self, level: usize) -> Self {
        self.config.concurrency_level = level;
        self
    }

    #[must_use]
    pub fn eviction_policy(mut self, strategy: EvictionStrategy<K, V>) -> Self {
        self.config.eviction_policy = strategy;
        self
    }

    #[must_use]
    pub fn jam_policy(mut self, policy: JamPolicy) -> Self {
        self.config.jam_policy = policy;
        self
    }

    #[must_use]
    pub fn statistics(mut self, enabled: bool) -> Self {
        self.config.statistics = enabled;
        self
    }

    #[must_use]
    pub fn write_mode(mut self, mode: WriteMode) -> Self {
        self.config.write_mode = mode;
        self
    }

    #[must_use]
    pub fn loader(mut self, loader: Arc<dyn CacheLoader<K, V>>) -> Self {
        self.config.loader = Some(loader);
        self
    }

    #[must_use]
    pub fn writer(mut self, writer: Arc<dyn CacheWriter<K, V>>) -> Self {
        self.config.writer = Some(writer);
        self
    }

    #[must_use]
    pub fn cleanup_interval_ms(mut self, ms: u64) -> Self {
        self.config.cleanup_interval_ms = Some(ms);
        self
    }

    #[must_use]
    pub fn async_listener_queue_capacity(mut self, capacity: usize) -> Self {
        self.config.async_listener_queue_capacity = capacity;
        self
    }

    #[must_use]
    pub fn weigher(mut self, weigher: Arc<dyn Fn(&V) -> usize + Send + Sync>) -> Self {
        self.config.weigher = Some(weigher);
        self
    }

    /// Validates the configuration and constructs the cache, starting its
    /// background workers.
    ///
    /// # Errors
    /// Returns [`CacheError::InvalidConfig`] if `concurrency_level`,
    /// `expected_size`, or `async_listener_queue_capacity` are out of range.
    pub fn build(self) -> CacheResult<Cache<K, V>> {
        self.config.validate()?;
        Ok(Cache::from_config(self.config))
    }
}
