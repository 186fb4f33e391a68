/// Integration tests for adaptive resize and migrate requests
mod common;

use cachelease::{
    BudgetConfig, BudgetCoordinator, Cache, CacheConfig, CachedValue, Coordinator, ShardedCache,
    ShardedTable,
};
use common::RecordingCoordinator;
use std::sync::Arc;
use std::time::Duration;

const ENTRY: u64 = std::mem::size_of::<CachedValue<u64>>() as u64;

fn single_entry_cache(coordinator: Arc<dyn Coordinator>, name: &str) -> ShardedCache<u64, u64> {
    Cache::new(
        coordinator,
        ShardedTable::new(),
        CacheConfig::new(name).with_initial_limit(ENTRY),
    )
    .unwrap()
}

#[test]
fn test_eviction_only_inserts_trigger_one_migrate() {
    let coordinator = Arc::new(RecordingCoordinator::new());
    let cache = single_entry_cache(coordinator.clone(), "adaptive_one_migrate");

    for key in 0..4095u64 {
        assert!(cache.insert(key, key));
    }
    assert!(coordinator.migrations().is_empty());

    assert!(cache.insert(4095, 4095));
    assert_eq!(coordinator.migrations(), vec![9]);
    assert_eq!(cache.metadata().unwrap().lock().log_size(), 9);
    assert!(cache.outcome_frequencies().is_empty());

    // The next check only happens 4096 inserts later
    for key in 4096..8000u64 {
        cache.insert(key, key);
    }
    assert_eq!(coordinator.migrations().len(), 1);
}

#[test]
fn test_hits_dilute_eviction_pressure() {
    let coordinator = Arc::new(RecordingCoordinator::new());
    let cache = single_entry_cache(coordinator.clone(), "adaptive_diluted");

    for key in 0..(4096u64 * 3) {
        cache.insert(key, key);
        assert!(cache.find(&key).found());
    }

    assert!(coordinator.migrations().is_empty());
    assert_eq!(cache.metadata().unwrap().lock().log_size(), 8);
}

#[test]
fn test_ratio_is_configurable() {
    let coordinator = Arc::new(RecordingCoordinator::new());
    let cache: ShardedCache<u64, u64> = Cache::new(
        coordinator.clone(),
        ShardedTable::new(),
        CacheConfig::new("adaptive_ratio")
            .with_initial_limit(ENTRY)
            .with_migrate_check_mask(0x3F)
            .with_sampler_capacity(32)
            .with_eviction_ratio(1),
    )
    .unwrap();

    // Three evictions per hit, with the initial insert long gone from the sample
    for key in 0..64u64 {
        cache.insert(key, key);
        if key % 3 == 0 {
            cache.find(&key);
        }
    }
    assert_eq!(
        cache.outcome_frequencies().len(),
        0,
        "sample is cleared by the accepted migration"
    );
    assert_eq!(coordinator.migrations(), vec![9]);
}

#[test]
fn test_request_resize_zero_doubles_hard_limit() {
    let coordinator = Arc::new(BudgetCoordinator::new(
        BudgetConfig::new(1 << 30).with_min_limit(0),
    )
    .unwrap());
    let cache = single_entry_cache(coordinator.clone(), "adaptive_double");
    let metadata = cache.metadata().unwrap();

    assert!(cache.request_resize(0, false));
    assert_eq!(metadata.lock().hard_limit(), 2 * ENTRY);
    assert!(cache.request_resize(0, false));
    assert_eq!(metadata.lock().hard_limit(), 4 * ENTRY);

    assert!(cache.request_resize(12345, false));
    assert_eq!(metadata.lock().hard_limit(), 12345);
    assert_eq!(cache.limit(), 12345);
}

#[test]
fn test_internal_resize_obeys_cooldown() {
    let coordinator = Arc::new(BudgetCoordinator::new(
        BudgetConfig::new(1 << 30)
            .with_min_limit(0)
            .with_cooldowns(Duration::from_secs(3600), Duration::from_secs(3600)),
    )
    .unwrap());
    let cache = single_entry_cache(coordinator.clone(), "adaptive_cooldown");

    assert!(cache.request_resize(0, true));
    assert_eq!(cache.limit(), 2 * ENTRY);

    // Skipped without reaching the coordinator
    assert!(!cache.request_resize(0, true));
    assert_eq!(cache.limit(), 2 * ENTRY);

    // External requests are never throttled
    assert!(cache.resize(0));
    assert_eq!(cache.limit(), 4 * ENTRY);
}

#[test]
fn test_oversized_insert_requests_growth() {
    let coordinator = Arc::new(RecordingCoordinator::new());
    let cache: ShardedCache<u64, String> = Cache::new(
        coordinator.clone(),
        ShardedTable::new(),
        CacheConfig::new("adaptive_grow").with_initial_limit(256),
    )
    .unwrap();

    assert!(!cache.insert(1, "x".repeat(1024)));
    assert_eq!(coordinator.resize_count(), 1);
    assert_eq!(cache.limit(), 512);
}

#[test]
fn test_growth_can_be_disabled() {
    let coordinator = Arc::new(RecordingCoordinator::new());
    let cache: ShardedCache<u64, String> = Cache::new(
        coordinator.clone(),
        ShardedTable::new(),
        CacheConfig::new("adaptive_frozen")
            .with_initial_limit(256)
            .with_allow_growth(false),
    )
    .unwrap();
    assert!(cache.insert(2, "y".to_string()));

    assert!(!cache.insert(1, "x".repeat(1024)));
    assert_eq!(coordinator.resize_count(), 0);
    // Nothing was evicted for a value that could never fit
    assert_eq!(cache.find(&2).copy(), Some("y".to_string()));
    assert!(cache.resize(4096));
    assert_eq!(cache.limit(), 4096);
}

#[test]
fn test_migrate_cooldown_from_coordinator() {
    let coordinator = Arc::new(RecordingCoordinator::new().with_cooldown(Duration::from_secs(3600)));
    let cache: ShardedCache<u64, u64> = Cache::new(
        coordinator.clone(),
        ShardedTable::new(),
        CacheConfig::new("adaptive_migrate_cooldown")
            .with_initial_limit(ENTRY)
            .with_migrate_check_mask(0xFF),
    )
    .unwrap();

    for key in 0..2048u64 {
        cache.insert(key, key);
    }
    assert_eq!(coordinator.migrations().len(), 1);
}
