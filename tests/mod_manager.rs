use std::sync::Arc;

use tricache::{Cache, CacheBuilder};

#[test]
fn a_registered_cache_is_discoverable_by_id() {
    let cache: Arc<Cache<String, i32>> =
        Arc::new(CacheBuilder::new().id("manager-lookup-a").expected_size(10).build().unwrap());
    cache.register();

    let found: Option<Arc<Cache<String, i32>>> = tricache::cache::manager::lookup("manager-lookup-a");
    assert!(found.is_some());
    found.unwrap().put("k".into(), 1).unwrap();
    assert_eq!(cache.get(&"k".to_string()).unwrap(), Some(1));
}

#[test]
fn an_unregistered_cache_is_not_discoverable() {
    let _cache: Cache<String, i32> =
        CacheBuilder::new().id("manager-lookup-b").expected_size(10).build().unwrap();
    let found: Option<Arc<Cache<String, i32>>> = tricache::cache::manager::lookup("manager-lookup-b");
    assert!(found.is_none());
}

#[test]
fn closing_a_registered_cache_removes_it_from_the_registry() {
    let cache: Arc<Cache<String, i32>> =
        Arc::new(CacheBuilder::new().id("manager-lookup-c").expected_size(10).build().unwrap());
    cache.register();
    assert!(tricache::cache::manager::lookup::<Cache<String, i32>>("manager-lookup-c").is_some());

    cache.close();
    assert!(tricache::cache::manager::lookup::<Cache<String, i32>>("manager-lookup-c").is_none());
}
