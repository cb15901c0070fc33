//! In-place entry processor: read-modify-write a single entry under one
//! lock acquisition instead of a `get` + `put` race.

use std::panic::{self, AssertUnwindSafe};

use crate::errors::{CacheError, CacheResult};

/// What an entry processor decided to do with the entry it was invoked on.
pub enum EntryOp<V> {
    /// Leave the entry untouched.
    Nop,
    /// Replace (or create) the entry's value.
    Set(V),
    /// Remove the entry, skipping the writer (if any).
    Remove,
    /// Remove the entry and propagate the removal through the writer.
    RemoveWriteThrough,
}

/// The view an entry processor closure receives. `exists()`/`value()` reflect
/// the entry's state at invocation time; mutations are buffered into `op` and
/// applied by the caller after the closure returns.
pub struct MutableEntry<'a, V> {
    value: &'a Option<V>,
    op: EntryOp<V>,
}

impl<'a, V: Clone> MutableEntry<'a, V> {
    pub(crate) fn new(value: &'a Option<V>) -> Self {
        Self { value, op: EntryOp::Nop }
    }

    #[must_use]
    pub fn exists(&self) -> bool {
        self.value.is_some()
    }

    #[must_use]
    pub fn value(&self) -> Option<&V> {
        self.value.as_ref()
    }

    pub fn set_value(&mut self, value: V) {
        self.op = EntryOp::Set(value);
    }

    pub fn remove(&mut self) {
        self.op = EntryOp::Remove;
    }

    pub fn remove_write_through(&mut self) {
        self.op = EntryOp::RemoveWriteThrough;
    }

    pub(crate) fn into_op(self) -> EntryOp<V> {
        self.op
    }
}

/// Runs `f` over `entry`, catching any panic raised inside the closure and
/// turning it into [`CacheError::Processor`] so a single bad processor can
/// never poison the cache's internal locks.
pub(crate) fn invoke<V: Clone, R>(
    entry: &Option<V>,
    f: impl FnOnce(&mut MutableEntry<'_, V>) -> R,
) -> CacheResult<(EntryOp<V>, R)> {
    let mut mutable = MutableEntry::new(entry);
    let result = panic::catch_unwind(AssertUnwindSafe(|| f(&mut mutable)))
        .map_err(|_| CacheError::Processor("entry processor panicked".into()))?;
    Ok((mutable.into_op(), result))
}
