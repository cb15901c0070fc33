//! Read-through contract.

use std::hash::Hash;

use crate::errors::CacheResult;

/// Loads a value on a `get` miss. Errors surface to the caller as
/// [`crate::errors::CacheError::Loader`] and are not cached.
pub trait CacheLoader<K, V>: Send + Sync
where
    K: Eq + Hash + Clone,
{
    fn load(&self, key: &K) -> CacheResult<Option<V>>;

    /// Batch form; the default calls [`Self::load`] once per key.
    fn load_all(&self, keys: &[K]) -> CacheResult<Vec<(K, Option<V>)>> {
        keys.iter().map(|key| self.load(key).map(|v| (key.clone(), v))).collect()
    }
}
