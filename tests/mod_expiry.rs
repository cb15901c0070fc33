use tricache::CacheBuilder;

#[test]
fn idle_entries_expire_and_disappear_after_sweep() {
    let cache = CacheBuilder::<String, i32>::new()
        .expected_size(100)
        .max_idle_time_secs(1)
        .cleanup_interval_ms(50)
        .build()
        .unwrap();

    cache.put("a".into(), 1).unwrap();
    assert_eq!(cache.get(&"a".to_string()).unwrap(), Some(1));

    std::thread::sleep(std::time::Duration::from_millis(1_300));

    assert_eq!(cache.get(&"a".to_string()).unwrap(), None);
    assert!(!cache.contains_key(&"a".to_string()));
}

#[test]
fn expire_all_within_forces_near_term_expiry() {
    let cache = CacheBuilder::<String, i32>::new()
        .expected_size(100)
        .max_idle_time_secs(3_600)
        .max_cache_time_secs(3_600)
        .cleanup_interval_ms(50)
        .build()
        .unwrap();

    cache.put("a".into(), 1).unwrap();
    cache.put("b".into(), 2).unwrap();
    cache.expire_all_within(10);

    std::thread::sleep(std::time::Duration::from_millis(300));

    assert!(cache.get(&"a".to_string()).unwrap().is_none());
    assert!(cache.get(&"b".to_string()).unwrap().is_none());
}

#[test]
fn an_unread_entry_still_expires_on_max_cache_time() {
    let cache = CacheBuilder::<String, i32>::new()
        .expected_size(100)
        .max_idle_time_secs(3_600)
        .max_cache_time_secs(1)
        .cleanup_interval_ms(50)
        .build()
        .unwrap();

    cache.put("a".into(), 1).unwrap();
    std::thread::sleep(std::time::Duration::from_millis(1_300));
    assert!(cache.get(&"a".to_string()).unwrap().is_none());
}
