use tricache::CacheBuilder;

#[test]
fn invoke_can_set_a_value_on_an_absent_key() {
    let cache: tricache::Cache<String, i32> =
        CacheBuilder::new().expected_size(10).build().unwrap();

    let result = cache.invoke("a".into(), |entry| {
        assert!(!entry.exists());
        entry.set_value(7);
        entry.value().copied()
    });
    assert_eq!(result.unwrap(), None);
    assert_eq!(cache.get(&"a".to_string()).unwrap(), Some(7));
}

#[test]
fn invoke_can_remove_an_existing_key() {
    let cache: tricache::Cache<String, i32> =
        CacheBuilder::new().expected_size(10).build().unwrap();
    cache.put("a".into(), 1).unwrap();

    cache.invoke("a".into(), |entry| entry.remove()).unwrap();
    assert!(!cache.contains_key(&"a".to_string()));
}

#[test]
fn invoke_that_panics_surfaces_as_processor_error() {
    let cache: tricache::Cache<String, i32> =
        CacheBuilder::new().expected_size(10).build().unwrap();
    cache.put("a".into(), 1).unwrap();

    let result: tricache::CacheResult<()> =
        cache.invoke("a".into(), |_entry| panic!("boom"));
    assert!(matches!(result, Err(tricache::CacheError::Processor(_))));
    // the entry is untouched by a panicking processor
    assert_eq!(cache.get(&"a".to_string()).unwrap(), Some(1));
}

#[test]
fn invoke_all_applies_the_same_closure_to_every_key() {
    let cache: tricache::Cache<String, i32> =
        CacheBuilder::new().expected_size(10).build().unwrap();
    cache.put("a".into(), 1).unwrap();
    cache.put("b".into(), 2).unwrap();

    let results = cache
        .invoke_all(vec!["a".into(), "b".into()], |_key, entry| {
            let current = entry.value().copied().unwrap_or(0);
            entry.set_value(current * 10);
            current
        })
        .unwrap();

    assert_eq!(results.len(), 2);
    assert_eq!(cache.get(&"a".to_string()).unwrap(), Some(10));
    assert_eq!(cache.get(&"b".to_string()).unwrap(), Some(20));
}
