//! Process-wide named-cache registry, so unrelated parts of an application
//! can look a cache up by name instead of threading an `Arc<Cache<K, V>>`
//! through every layer that needs it.

use std::any::Any;
use std::sync::{Arc, OnceLock, Weak};

use dashmap::DashMap;

static REGISTRY: OnceLock<DashMap<String, Weak<dyn Any + Send + Sync>>> = OnceLock::new();

fn registry() -> &'static DashMap<String, Weak<dyn Any + Send + Sync>> {
    REGISTRY.get_or_init(DashMap::new)
}

/// Registers a cache under `id`, replacing any previous registration with
/// the same id. The registry holds only a weak reference, so a registered
/// cache is dropped as soon as its last strong reference is.
pub(crate) fn register<T: Any + Send + Sync>(id: &str, cache: &Arc<T>) {
    let weak: Weak<dyn Any + Send + Sync> = Arc::downgrade(cache) as Weak<dyn Any + Send + Sync>;
    registry().insert(id.to_string(), weak);
}

/// Looks up a previously registered cache by id and type. Returns `None` if
/// no cache is registered under that id, its last strong reference was
/// dropped, or it was registered with a different `K`/`V`.
#[must_use]
pub fn lookup<T: Any + Send + Sync>(id: &str) -> Option<Arc<T>> {
    let weak = registry().get(id)?.clone();
    weak.upgrade()?.downcast::<T>().ok()
}

/// Removes a cache's registration. Returns whether an entry was present.
pub(crate) fn deregister(id: &str) -> bool {
    registry().remove(id).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registered_cache_is_found_by_id_and_type() {
        let cache = Arc::new(42_i32);
        register("answer", &cache);
        let found: Option<Arc<i32>> = lookup("answer");
        assert_eq!(found.as_deref(), Some(&42));
        deregister("answer");
    }

    #[test]
    fn dropped_cache_is_no_longer_found() {
        {
            let cache = Arc::new(7_i32);
            register("temp", &cache);
        }
        let found: Option<Arc<i32>> = lookup("temp");
        assert!(found.is_none());
    }

    #[test]
    fn wrong_type_lookup_returns_none() {
        let cache = Arc::new(7_i32);
        register("typed", &cache);
        let found: Option<Arc<String>> = lookup("typed");
        assert!(found.is_none());
        deregister("typed");
    }
}
