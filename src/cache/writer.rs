//! Write-through contract.

use std::hash::Hash;

use crate::errors::CacheResult;

/// Propagates a `put`/`remove` to a backing store. A failing `write` or
/// `delete` surfaces to the caller and the in-memory mutation is rolled
/// back, keeping the cache and the store from diverging.
pub trait CacheWriter<K, V>: Send + Sync
where
    K: Eq + Hash + Clone,
{
    fn write(&self, key: &K, value: &V) -> CacheResult<()>;

    fn delete(&self, key: &K) -> CacheResult<()>;

    /// Batch write; the default calls [`Self::write`] per pair and collects
    /// the keys that failed into a single
    /// [`crate::errors::CacheError::WriterBatch`].
    fn write_all(&self, entries: &[(K, V)]) -> CacheResult<()>
    where
        K: ToString,
    {
        let failed: Vec<String> = entries
            .iter()
            .filter_map(|(k, v)| self.write(k, v).err().map(|_| k.to_string()))
            .collect();
        if failed.is_empty() {
            Ok(())
        } else {
            Err(crate::errors::CacheError::WriterBatch { failed_keys: failed })
        }
    }

    /// Batch delete; the default calls [`Self::delete`] per key.
    fn delete_all(&self, keys: &[K]) -> CacheResult<()>
    where
        K: ToString,
    {
        let failed: Vec<String> =
            keys.iter().filter_map(|k| self.delete(k).err().map(|_| k.to_string())).collect();
        if failed.is_empty() {
            Ok(())
        } else {
            Err(crate::errors::CacheError::WriterBatch { failed_keys: failed })
        }
    }
}
