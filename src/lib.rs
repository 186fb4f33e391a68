//! # Cachelease
//!
//! Lifecycle and concurrency control for in-process caches that share one
//! memory budget.
//!
//! ## Features
//!
//! - **Leased lookups**: values found in a cache stay alive while a
//!   [`Handle`] refers to them, even if they are evicted meanwhile
//! - **Shared budget**: caches register with a [`Coordinator`] that grants and
//!   adjusts their memory limits
//! - **Adaptive requests**: caches under eviction pressure ask for more room on
//!   their own, throttled by the cooldowns the coordinator hands back
//! - **Drained shutdown**: new work is rejected and in-flight operations finish
//!   before entries are freed
//!
//! ## Quick Start
//!
//! ```rust
//! use cachelease::{sharded_cache, CacheConfig};
//!
//! let cache = sharded_cache::<u64, String>(CacheConfig::new("quick_start")).unwrap();
//!
//! assert!(cache.insert(7, "seven".to_string()));
//! {
//!     let handle = cache.find(&7);
//!     assert_eq!(handle.get().map(String::as_str), Some("seven"));
//! }
//!
//! cache.shutdown();
//! assert!(!cache.find(&7).found());
//! assert_eq!(cache.limit(), 0);
//! ```
//!
//! ## Custom Coordinators
//!
//! Any type implementing [`Coordinator`] can arbitrate memory between caches:
//!
//! ```rust
//! use cachelease::{BudgetConfig, BudgetCoordinator, Cache, CacheConfig, ShardedTable};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let coordinator = Arc::new(BudgetCoordinator::new(
//!     BudgetConfig::new(64 * 1024 * 1024)
//!         .with_cooldowns(Duration::from_millis(10), Duration::from_millis(100)),
//! )
//! .unwrap());
//!
//! let users: Cache<ShardedTable<u64, String>> = Cache::new(
//!     coordinator.clone(),
//!     ShardedTable::new(),
//!     CacheConfig::new("users").with_initial_limit(1024 * 1024),
//! )
//! .unwrap();
//!
//! assert!(users.resize(2 * 1024 * 1024));
//! assert_eq!(users.limit(), 2 * 1024 * 1024);
//! assert_eq!(coordinator.allocated(), 2 * 1024 * 1024);
//! ```
//!
//! ## Handles
//!
//! A [`Handle`] behaves like a shared lease: cloning it leases again, dropping
//! it releases, and [`Handle::take`] moves the lease out:
//!
//! ```rust
//! use cachelease::{sharded_cache, CacheConfig};
//!
//! let cache = sharded_cache::<u32, u32>(CacheConfig::new("handles")).unwrap();
//! cache.insert(1, 100);
//!
//! let mut first = cache.find(&1);
//! let second = first.clone();
//! assert_eq!(second.value().unwrap().ref_count(), 2);
//!
//! let moved = first.take();
//! assert!(!first.found());
//! assert_eq!(moved.get(), Some(&100));
//! ```

use std::hash::Hash;
use std::sync::Arc;

pub use cachelease_core::*;

/// Creates a cache over a [`ShardedTable`] registered with the process-wide
/// [`BudgetCoordinator`].
///
/// # Errors
///
/// Returns an error if `config` is invalid. A cache the global coordinator
/// has no room for is returned already shut down.
///
/// # Examples
///
/// ```rust
/// use cachelease::{sharded_cache, CacheConfig};
///
/// let sessions = sharded_cache::<String, Vec<u8>>(
///     CacheConfig::new("sessions").with_initial_limit(256 * 1024),
/// )
/// .unwrap();
/// assert!(sessions.is_operational());
/// ```
pub fn sharded_cache<K, V>(config: CacheConfig) -> Result<ShardedCache<K, V>, ConfigError>
where
    K: Eq + Hash + Clone + Send + Sync,
    V: Send + Sync,
{
    let coordinator: Arc<dyn Coordinator> = BudgetCoordinator::global();
    Cache::new(coordinator, ShardedTable::new(), config)
}

/// Returns a snapshot of the statistics of the live cache named `name`.
///
/// # Examples
///
/// ```rust
/// use cachelease::{cache_stats, sharded_cache, CacheConfig};
///
/// let cache = sharded_cache::<u32, u32>(CacheConfig::new("stats_lookup")).unwrap();
/// cache.insert(1, 1);
/// cache.find(&1);
///
/// let stats = cache_stats("stats_lookup").unwrap();
/// assert_eq!(stats.hits(), 1);
/// assert_eq!(stats.inserts(), 1);
/// ```
#[cfg(feature = "stats")]
pub fn cache_stats(name: &str) -> Option<CacheStats> {
    stats_registry::get(name)
}
