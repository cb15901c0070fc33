use tricache::{CacheBuilder, EvictionStrategy};

#[test]
fn lru_evicts_least_recently_used_first() {
    let cache = CacheBuilder::<String, i32>::new()
        .expected_size(2)
        .eviction_policy(EvictionStrategy::Lru)
        .build()
        .unwrap();

    cache.put("a".into(), 1).unwrap();
    cache.put("b".into(), 2).unwrap();
    // touch "a" so it is more recently used than "b"
    assert_eq!(cache.get(&"a".to_string()).unwrap(), Some(1));
    cache.put("c".into(), 3).unwrap();

    // give the background evictor a moment to run its round
    std::thread::sleep(std::time::Duration::from_millis(50));

    assert!(cache.len() <= 3);
    assert!(cache.contains_key(&"a".to_string()), "recently used entry should survive");
}

#[test]
fn lfu_evicts_least_frequently_used_first() {
    let cache = CacheBuilder::<String, i32>::new()
        .expected_size(2)
        .eviction_policy(EvictionStrategy::Lfu)
        .build()
        .unwrap();

    cache.put("hot".into(), 1).unwrap();
    cache.put("cold".into(), 2).unwrap();
    for _ in 0..10 {
        let _ = cache.get(&"hot".to_string());
    }
    cache.put("new".into(), 3).unwrap();

    std::thread::sleep(std::time::Duration::from_millis(50));

    assert!(cache.len() <= 3);
    assert!(cache.contains_key(&"hot".to_string()), "frequently used entry should survive");
}

#[test]
fn unbounded_cache_never_evicts_on_capacity() {
    let cache = CacheBuilder::<String, i32>::new()
        .expected_size(1)
        .eviction_policy(EvictionStrategy::None)
        .build()
        .unwrap();

    for i in 0..200 {
        cache.put(format!("k{i}"), i).unwrap();
    }
    std::thread::sleep(std::time::Duration::from_millis(50));
    assert_eq!(cache.len(), 200);
}
