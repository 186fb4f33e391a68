use once_cell::sync::Lazy;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

use crate::CacheStats;

/// Global registry for cache statistics.
///
/// Every [`Cache`](crate::Cache) publishes its statistics here under its
/// configured name when it is created, and withdraws them when it shuts down.
/// This allows querying statistics programmatically without holding on to
/// the cache itself.
///
/// Two live caches with the same name share one slot: the most recently
/// created one wins.
///
/// # Examples
///
/// ```
/// use cachelease_core::stats_registry;
///
/// if let Some(stats) = stats_registry::get("sessions") {
///     println!("Evictions: {}", stats.evictions());
/// }
///
/// for name in stats_registry::list() {
///     println!("Cache: {}", name);
/// }
/// ```
static STATS_REGISTRY: Lazy<RwLock<HashMap<String, Arc<CacheStats>>>> =
    Lazy::new(|| RwLock::new(HashMap::new()));

/// Registers a cache's statistics under `name`.
pub fn register(name: &str, stats: Arc<CacheStats>) {
    let mut registry = STATS_REGISTRY.write();
    registry.insert(name.to_string(), stats);
}

/// Removes `name` if it still refers to `stats`.
///
/// A newer cache that took over the name keeps its registration.
pub fn unregister(name: &str, stats: &Arc<CacheStats>) -> bool {
    let mut registry = STATS_REGISTRY.write();
    match registry.get(name) {
        Some(current) if Arc::ptr_eq(current, stats) => {
            registry.remove(name);
            true
        }
        _ => false,
    }
}

/// Returns a snapshot of the statistics registered under `name`.
pub fn get(name: &str) -> Option<CacheStats> {
    let registry = STATS_REGISTRY.read();
    registry.get(name).map(|stats| (**stats).clone())
}

/// Returns the live statistics registered under `name`.
pub fn get_arc(name: &str) -> Option<Arc<CacheStats>> {
    let registry = STATS_REGISTRY.read();
    registry.get(name).cloned()
}

/// Lists all registered cache names.
pub fn list() -> Vec<String> {
    let registry = STATS_REGISTRY.read();
    registry.keys().cloned().collect()
}

/// Clears all registrations. The statistics themselves are untouched.
pub fn clear() {
    let mut registry = STATS_REGISTRY.write();
    registry.clear();
}

/// Resets the counters registered under `name`.
///
/// Returns `false` if no cache is registered under that name.
pub fn reset(name: &str) -> bool {
    let registry = STATS_REGISTRY.read();
    if let Some(stats) = registry.get(name) {
        stats.reset();
        true
    } else {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_register_and_get() {
        let stats = Arc::new(CacheStats::new());
        register("registry_test_fn", Arc::clone(&stats));
        stats.record_hit();

        let snapshot = get("registry_test_fn").unwrap();
        assert_eq!(snapshot.hits(), 1);
        assert!(get_arc("registry_test_fn").is_some());
    }

    #[test]
    #[serial]
    fn test_unregister_only_matching_stats() {
        let old = Arc::new(CacheStats::new());
        let new = Arc::new(CacheStats::new());
        register("registry_shared", Arc::clone(&old));
        register("registry_shared", Arc::clone(&new));

        assert!(!unregister("registry_shared", &old));
        assert!(get_arc("registry_shared").is_some());
        assert!(unregister("registry_shared", &new));
        assert!(get_arc("registry_shared").is_none());
    }

    #[test]
    #[serial]
    fn test_list_and_clear() {
        clear();
        register("fn1", Arc::new(CacheStats::new()));
        register("fn2", Arc::new(CacheStats::new()));

        let names = list();
        assert!(names.contains(&"fn1".to_string()));
        assert!(names.contains(&"fn2".to_string()));

        clear();
        let names = list();
        assert!(!names.contains(&"fn1".to_string()));
        assert!(!names.contains(&"fn2".to_string()));
    }

    #[test]
    #[serial]
    fn test_reset() {
        let stats = Arc::new(CacheStats::new());
        register("registry_reset", Arc::clone(&stats));
        stats.record_hit();
        stats.record_hit();

        assert!(reset("registry_reset"));
        assert_eq!(stats.hits(), 0);
        assert!(!reset("nonexistent"));
    }
}
