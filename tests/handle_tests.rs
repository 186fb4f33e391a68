/// Integration tests for leased lookups
mod common;

use cachelease::{Cache, CacheConfig, CachedValue, Handle, ShardedCache, ShardedTable};
use common::RecordingCoordinator;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

fn string_cache(name: &str) -> ShardedCache<u32, String> {
    Cache::new(
        Arc::new(RecordingCoordinator::new()),
        ShardedTable::new(),
        CacheConfig::new(name).with_initial_limit(1 << 20),
    )
    .unwrap()
}

fn ref_count(handle: &Handle<String>) -> u32 {
    handle.value().map(CachedValue::ref_count).unwrap_or(0)
}

#[test]
fn test_copy_leases_and_move_transfers() {
    let cache = string_cache("handle_copy_move");
    cache.insert(1, "one".to_string());

    let mut original = cache.find(&1);
    assert_eq!(ref_count(&original), 1);

    let copy = original.clone();
    assert_eq!(ref_count(&copy), 2);

    let moved = original.take();
    assert!(!original.found());
    assert_eq!(ref_count(&moved), 2);

    drop(copy);
    assert_eq!(ref_count(&moved), 1);
    drop(moved);
    assert!(cache.remove(&1));
}

#[test]
fn test_reset_and_reassign() {
    let cache = string_cache("handle_reset");
    cache.insert(1, "one".to_string());
    cache.insert(2, "two".to_string());

    let mut handle = cache.find(&1);
    let other = cache.find(&2);

    handle.reset(None);
    assert!(!handle.found());
    assert_eq!(ref_count(&cache.find(&1)), 1);

    // Assigning a copy releases nothing and leases the source's value
    handle = other.clone();
    assert_eq!(ref_count(&other), 2);
    assert_eq!(handle.get().map(String::as_str), Some("two"));

    handle = Handle::default();
    assert!(!handle.found());
    assert_eq!(ref_count(&other), 1);
}

#[test]
fn test_handle_keeps_value_readable_after_eviction() {
    let entry = std::mem::size_of::<CachedValue<u64>>() as u64;
    let cache: ShardedCache<u64, u64> = Cache::new(
        Arc::new(RecordingCoordinator::new()),
        ShardedTable::new(),
        CacheConfig::new("handle_eviction").with_initial_limit(entry),
    )
    .unwrap();
    let cache = Arc::new(cache);
    cache.insert(1, 100);
    let handle = cache.find(&1);

    let inserter = {
        let cache = Arc::clone(&cache);
        thread::spawn(move || cache.insert(2, 200))
    };

    // The eviction of key 1 waits for our lease
    thread::sleep(Duration::from_millis(50));
    assert!(!inserter.is_finished());
    assert_eq!(handle.get(), Some(&100));
    drop(handle);

    assert!(inserter.join().unwrap());
    assert!(!cache.find(&1).found());
    assert_eq!(cache.find(&2).get(), Some(&200));
}

#[test]
fn test_copy_value_out() {
    let cache = string_cache("handle_copy_out");
    cache.insert(5, "five".to_string());

    let value = cache.find(&5).copy();
    assert_eq!(value, Some("five".to_string()));
    assert_eq!(cache.find(&6).copy(), None);
}

#[test]
fn test_handles_across_threads() {
    let cache = Arc::new(string_cache("handle_threads"));
    cache.insert(1, "shared".to_string());

    let readers: Vec<_> = (0..8)
        .map(|_| {
            let cache = Arc::clone(&cache);
            thread::spawn(move || {
                for _ in 0..1000 {
                    let handle = cache.find(&1);
                    assert_eq!(handle.get().map(String::len), Some(6));
                }
            })
        })
        .collect();
    for reader in readers {
        reader.join().unwrap();
    }

    let handle = cache.find(&1);
    assert_eq!(ref_count(&handle), 1);
}
