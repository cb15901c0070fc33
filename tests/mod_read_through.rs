use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tricache::{CacheBuilder, CacheLoader};

struct CountingLoader {
    source: HashMap<String, i32>,
    loads: AtomicUsize,
    load_all_calls: AtomicUsize,
}

impl CountingLoader {
    fn new(source: HashMap<String, i32>) -> Self {
        Self { source, loads: AtomicUsize::new(0), load_all_calls: AtomicUsize::new(0) }
    }
}

impl CacheLoader<String, i32> for CountingLoader {
    fn load(&self, key: &String) -> tricache::CacheResult<Option<i32>> {
        self.loads.fetch_add(1, Ordering::Relaxed);
        Ok(self.source.get(key).copied())
    }

    fn load_all(
        &self,
        keys: &[String],
    ) -> tricache::CacheResult<Vec<(String, Option<i32>)>> {
        self.load_all_calls.fetch_add(1, Ordering::Relaxed);
        Ok(keys.iter().map(|k| (k.clone(), self.source.get(k).copied())).collect())
    }
}

#[test]
fn a_miss_loads_through_and_populates_the_cache() {
    let mut source = HashMap::new();
    source.insert("a".to_string(), 42);
    let loader = Arc::new(CountingLoader::new(source));
    let cache =
        CacheBuilder::<String, i32>::new().expected_size(10).loader(loader.clone()).build().unwrap();

    assert_eq!(cache.get(&"a".to_string()).unwrap(), Some(42));
    assert_eq!(loader.loads.load(Ordering::Relaxed), 1);

    // second get is served from the cache, not the loader
    assert_eq!(cache.get(&"a".to_string()).unwrap(), Some(42));
    assert_eq!(loader.loads.load(Ordering::Relaxed), 1);
}

#[test]
fn a_loader_miss_is_not_cached_and_retries_on_next_get() {
    let loader = Arc::new(CountingLoader::new(HashMap::new()));
    let cache =
        CacheBuilder::<String, i32>::new().expected_size(10).loader(loader.clone()).build().unwrap();

    assert_eq!(cache.get(&"missing".to_string()).unwrap(), None);
    assert_eq!(cache.get(&"missing".to_string()).unwrap(), None);
    assert_eq!(loader.loads.load(Ordering::Relaxed), 2);
}

#[test]
fn no_loader_configured_is_a_plain_miss() {
    let cache: tricache::Cache<String, i32> =
        CacheBuilder::new().expected_size(10).build().unwrap();
    assert_eq!(cache.get(&"anything".to_string()).unwrap(), None);
}

#[test]
fn get_all_batches_misses_into_a_single_load_all_call() {
    let mut source = HashMap::new();
    source.insert("a".to_string(), 1);
    source.insert("c".to_string(), 3);
    let loader = Arc::new(CountingLoader::new(source));
    let cache =
        CacheBuilder::<String, i32>::new().expected_size(10).loader(loader.clone()).build().unwrap();

    cache.put("b".into(), 2).unwrap();

    let keys = vec!["a".to_string(), "b".to_string(), "c".to_string(), "missing".to_string()];
    let results = cache.get_all(&keys).unwrap();

    assert_eq!(
        results,
        vec![
            ("a".to_string(), Some(1)),
            ("b".to_string(), Some(2)),
            ("c".to_string(), Some(3)),
            ("missing".to_string(), None),
        ]
    );
    // one load_all call covering both real misses ("a", "c") and the loader
    // miss ("missing"), not three separate `load` calls.
    assert_eq!(loader.load_all_calls.load(Ordering::Relaxed), 1);
    assert_eq!(loader.loads.load(Ordering::Relaxed), 0);

    // loaded values are now cached locally.
    assert_eq!(cache.get(&"a".to_string()).unwrap(), Some(1));
    assert_eq!(loader.load_all_calls.load(Ordering::Relaxed), 1);
}

#[test]
fn load_all_populates_the_cache_without_returning_values() {
    let mut source = HashMap::new();
    source.insert("a".to_string(), 1);
    let loader = Arc::new(CountingLoader::new(source));
    let cache =
        CacheBuilder::<String, i32>::new().expected_size(10).loader(loader.clone()).build().unwrap();

    cache.load_all(&["a".to_string(), "missing".to_string()]).unwrap();

    assert_eq!(loader.load_all_calls.load(Ordering::Relaxed), 1);
    assert_eq!(cache.get(&"a".to_string()).unwrap(), Some(1));
    // the already-loaded key is now served from the cache, not the loader.
    assert_eq!(loader.load_all_calls.load(Ordering::Relaxed), 1);
}
