//! # Cachelease Core
//!
//! Building blocks for caches that share one memory budget.
//!
//! Each [`Cache`] registers with a [`Coordinator`] that hands out memory
//! limits. Lookups return leased [`Handle`]s that keep values alive across
//! eviction, and shutdown drains in-flight work before freeing anything.
//!
//! ## Features
//!
//! - **Leased Values**: Reference-counted entries that are only freed once
//!   every reader has let go
//! - **Budget Coordination**: Caches grow and shrink inside a shared budget
//!   through [`BudgetCoordinator`] or any custom [`Coordinator`]
//! - **Adaptive Growth**: A sample of recent outcomes drives requests for
//!   larger tables under eviction pressure, throttled by coordinator cooldowns
//! - **Graceful Shutdown**: New work is rejected, open operations drain, and
//!   only then are entries freed and the cache unregistered
//! - **Statistics**: Optional per-cache counters and a global registry
//!   (`stats` feature)
//!
//! ## Module Organization
//!
//! - [`guarded_flags`] - Spin lock packed with lifecycle flags in one atomic word
//! - [`sampler`] - Fixed-size ring of recent operation outcomes
//! - [`value`] - Leased entries and their retirement
//! - [`handle`] - RAII lease holder returned by lookups
//! - [`coordinator`] - The coordinator contract and a fixed-budget implementation
//! - [`table`] - Entry storage contract and a sharded hash map implementation
//! - [`cache`] - The cache instance tying it all together
//!
//! ## Example
//!
//! ```
//! use cachelease_core::{BudgetConfig, BudgetCoordinator, CacheConfig, ShardedCache, ShardedTable};
//! use std::sync::Arc;
//!
//! let coordinator = Arc::new(BudgetCoordinator::new(BudgetConfig::new(1 << 20)).unwrap());
//! let cache: ShardedCache<u64, String> = ShardedCache::new(
//!     coordinator.clone(),
//!     ShardedTable::new(),
//!     CacheConfig::new("crate_example"),
//! )
//! .unwrap();
//!
//! cache.insert(1, "one".to_string());
//! let handle = cache.find(&1);
//! assert_eq!(handle.copy(), Some("one".to_string()));
//! drop(handle);
//!
//! assert_eq!(coordinator.cache_count(), 1);
//! drop(cache);
//! assert_eq!(coordinator.cache_count(), 0);
//! ```
pub mod cache;
pub mod config;
pub mod coordinator;
mod error;
pub mod guarded_flags;
pub mod handle;
mod memory_estimator;
mod metadata;
pub mod sampler;
pub mod table;
pub mod value;

#[cfg(feature = "stats")]
mod stats;

#[cfg(feature = "stats")]
pub mod stats_registry;

pub use cache::{Cache, ShardedCache};
pub use config::{
    BudgetConfig, CacheConfig, DEFAULT_EVICTION_RATIO, DEFAULT_INTERNAL_LOCK_TRIES,
    DEFAULT_MIGRATE_CHECK_MASK, DEFAULT_SAMPLER_CAPACITY,
};
pub use coordinator::{BudgetCoordinator, Coordinator, RequestOutcome};
pub use error::{ConfigError, CoordinatorError};
pub use guarded_flags::{Flag, FlagsGuard, GuardedFlags};
pub use handle::Handle;
pub use memory_estimator::MemoryEstimator;
pub use metadata::{CacheId, Metadata, MetadataState};
pub use sampler::{Outcome, OutcomeSampler};
pub use table::{CacheTable, ShardedTable};
pub use value::{detach, retire, CachedValue};

#[cfg(feature = "stats")]
pub use stats::CacheStats;
