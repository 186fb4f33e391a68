use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Instant;
use tracing::{debug, info, trace, warn};

use crate::guarded_flags::FlagsGuard;
use crate::value::retire;
use crate::{
    CacheConfig, CacheTable, CachedValue, ConfigError, Coordinator, Flag, GuardedFlags, Handle,
    MemoryEstimator, Metadata, Outcome, OutcomeSampler, ShardedTable,
};
#[cfg(feature = "stats")]
use crate::{stats_registry, CacheStats};

/// A [`Cache`] over the default [`ShardedTable`].
pub type ShardedCache<K, V> = Cache<ShardedTable<K, V>>;

/// Everything guarded by the cache's state lock besides the flags.
#[derive(Debug)]
struct Lifecycle {
    metadata: Option<Arc<Metadata>>,
    next_resize: Instant,
    next_migrate: Instant,
}

/// Set once entries are freed and the cache is unregistered.
#[derive(Debug, Default)]
struct Teardown {
    done: Mutex<bool>,
    signal: Condvar,
}

impl Teardown {
    fn finish(&self) {
        *self.done.lock() = true;
        self.signal.notify_all();
    }

    fn wait(&self) {
        let mut done = self.done.lock();
        while !*done {
            self.signal.wait(&mut done);
        }
    }
}

/// Decrements the open operation count when dropped.
struct OpenOperation<'a> {
    count: &'a AtomicUsize,
}

impl Drop for OpenOperation<'_> {
    fn drop(&mut self) {
        self.count.fetch_sub(1, Ordering::AcqRel);
    }
}

/// One cache instance inside a memory budget shared with other caches.
///
/// `Cache` ties together a [`CacheTable`] holding the entries and a
/// [`Coordinator`] granting the memory, and provides:
///
/// - **Leased lookups**: [`find`](Self::find) returns a [`Handle`] that keeps
///   its value alive until dropped, even if the entry is evicted meanwhile.
/// - **Drained shutdown**: [`shutdown`](Self::shutdown) rejects new work,
///   waits for in-flight operations, unlinks every entry and unregisters.
/// - **Adaptive requests**: inserts feed an [`OutcomeSampler`]; when the
///   sample shows sustained eviction pressure a larger table is requested,
///   and when nothing is left to evict a larger budget is requested. Both
///   are throttled by the cooldowns the coordinator hands back.
///
/// # Lifecycle
///
/// The cache registers with its coordinator on construction. If registration
/// fails the cache is created already shut down: every query returns zero,
/// every request returns `false`, and it can be dropped safely.
///
/// # Thread Safety
///
/// All methods take `&self`. Coordinator requests are issued with the state
/// lock held, so at most one is in flight per cache. Table access, waits for
/// in-flight resizes and the final clearing of the table happen without it.
///
/// # Handles and blocking
///
/// Values evicted, replaced or removed are released with
/// [`retire`](crate::retire), which waits for their leases. A thread must
/// therefore not hold a [`Handle`] from this cache while it inserts or
/// removes, or it may wait on itself. Shutdown does not wait: entries still
/// leased at that point are freed by their last handle, so a cache can be
/// dropped while handles from it are alive.
///
/// # Examples
///
/// ```
/// use cachelease_core::{BudgetConfig, BudgetCoordinator, CacheConfig, ShardedCache, ShardedTable};
/// use std::sync::Arc;
///
/// let coordinator = Arc::new(BudgetCoordinator::new(BudgetConfig::new(1 << 20)).unwrap());
/// let cache: ShardedCache<String, String> = ShardedCache::new(
///     coordinator,
///     ShardedTable::new(),
///     CacheConfig::new("docs_example").with_initial_limit(64 * 1024),
/// )
/// .unwrap();
///
/// assert!(cache.insert("k".to_string(), "v".to_string()));
/// {
///     let handle = cache.find(&"k".to_string());
///     assert_eq!(handle.get().map(String::as_str), Some("v"));
/// }
///
/// cache.shutdown();
/// assert_eq!(cache.limit(), 0);
/// assert!(!cache.resize(1 << 16));
/// ```
pub struct Cache<T: CacheTable> {
    config: CacheConfig,
    state: GuardedFlags<Lifecycle>,
    open_operations: AtomicUsize,
    teardown: Teardown,
    sampler: OutcomeSampler,
    insertions: AtomicU64,
    coordinator: Arc<dyn Coordinator>,
    table: T,
    #[cfg(feature = "stats")]
    stats: Arc<CacheStats>,
}

impl<T: CacheTable> Cache<T> {
    /// Creates a cache and registers it with `coordinator`.
    ///
    /// Only an invalid `config` is reported as an error. A registration
    /// refused by the coordinator yields a cache that is already shut down.
    pub fn new(
        coordinator: Arc<dyn Coordinator>,
        table: T,
        config: CacheConfig,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        let now = Instant::now();
        let metadata = match coordinator.register(&config.name, config.initial_limit) {
            Ok(metadata) => Some(metadata),
            Err(e) => {
                warn!("Cache {} could not register: {}", config.name, e);
                None
            }
        };
        let registered = metadata.is_some();

        let cache = Self {
            sampler: OutcomeSampler::new(config.sampler_capacity),
            state: GuardedFlags::new(Lifecycle {
                metadata,
                next_resize: now,
                next_migrate: now,
            }),
            open_operations: AtomicUsize::new(0),
            teardown: Teardown::default(),
            insertions: AtomicU64::new(0),
            coordinator,
            table,
            #[cfg(feature = "stats")]
            stats: Arc::new(CacheStats::new()),
            config,
        };

        if registered {
            #[cfg(feature = "stats")]
            stats_registry::register(&cache.config.name, Arc::clone(&cache.stats));
        } else {
            cache.state.lock().set_flag(Flag::Shutdown);
            cache.teardown.finish();
        }
        Ok(cache)
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// The underlying table.
    pub fn table(&self) -> &T {
        &self.table
    }

    #[cfg(feature = "stats")]
    pub fn stats(&self) -> &Arc<CacheStats> {
        &self.stats
    }

    /// The coordinator-owned accounting record, until shutdown.
    pub fn metadata(&self) -> Option<Arc<Metadata>> {
        self.state.lock().metadata.clone()
    }

    #[inline]
    fn operational(state: &FlagsGuard<'_, Lifecycle>) -> bool {
        !state.is_set(Flag::Shutdown) && !state.is_set(Flag::ShuttingDown)
    }

    /// `true` until shutdown has been requested.
    pub fn is_operational(&self) -> bool {
        Self::operational(&self.state.lock())
    }

    /// `true` once shutdown has completed (or registration failed).
    pub fn is_shutdown(&self) -> bool {
        self.state.lock().is_set(Flag::Shutdown)
    }

    /// Number of operations currently in flight.
    pub fn open_operations(&self) -> usize {
        self.open_operations.load(Ordering::Acquire)
    }

    /// Admits a new operation if the cache is operational.
    ///
    /// The operation stays counted (and shutdown keeps waiting for it) until
    /// the returned guard is dropped.
    fn start_operation(&self) -> Option<(OpenOperation<'_>, Arc<Metadata>)> {
        let state = self.state.lock();
        if !Self::operational(&state) {
            return None;
        }
        let metadata = state.metadata.clone()?;
        self.open_operations.fetch_add(1, Ordering::AcqRel);
        Some((
            OpenOperation {
                count: &self.open_operations,
            },
            metadata,
        ))
    }

    /// Current soft limit in bytes, or 0 once shutdown has begun.
    pub fn limit(&self) -> u64 {
        let state = self.state.lock();
        match &state.metadata {
            Some(metadata) if Self::operational(&state) => metadata.lock().soft_limit(),
            _ => 0,
        }
    }

    /// Current usage in bytes, or 0 once shutdown has begun.
    pub fn usage(&self) -> u64 {
        let state = self.state.lock();
        match &state.metadata {
            Some(metadata) if Self::operational(&state) => metadata.lock().usage(),
            _ => 0,
        }
    }

    /// Asks the coordinator for a new memory limit.
    ///
    /// A `requested_limit` of 0 asks for twice the current hard limit. Waits
    /// for any resize already in flight for this cache, is never throttled by
    /// the adaptive cooldown, and returns whether the coordinator accepted.
    pub fn resize(&self, requested_limit: u64) -> bool {
        let Some((_operation, metadata)) = self.start_operation() else {
            return false;
        };

        while metadata.lock().is_set(Flag::Resizing) {
            thread::sleep(self.config.resize_poll);
        }

        self.issue_resize(requested_limit, false, true)
    }

    /// Forwards a resize request to the coordinator.
    ///
    /// External requests (`internal == false`) wait for the state lock and
    /// always reach the coordinator. Internal requests give up after
    /// `internal_lock_tries` attempts and are skipped unless growth is allowed
    /// and the resize cooldown has elapsed. The cooldown returned by the
    /// coordinator is stored either way. Nothing is requested once shutdown
    /// has begun.
    pub fn request_resize(&self, requested_limit: u64, internal: bool) -> bool {
        self.issue_resize(requested_limit, internal, false)
    }

    /// `admitted` callers already hold an open operation and may finish
    /// after shutdown has been signaled.
    fn issue_resize(&self, requested_limit: u64, internal: bool, admitted: bool) -> bool {
        let tries = if internal {
            self.config.internal_lock_tries
        } else {
            -1
        };
        let Some(mut state) = self.state.lock_with_tries(tries) else {
            trace!("Cache {} skipped resize: state lock busy", self.config.name);
            return false;
        };
        if !admitted && !Self::operational(&state) {
            return false;
        }
        let Some(metadata) = state.metadata.clone() else {
            return false;
        };

        if internal && !(self.config.allow_growth && Instant::now() >= state.next_resize) {
            trace!("Cache {} skipped adaptive resize", self.config.name);
            return false;
        }

        let new_limit = if requested_limit > 0 {
            requested_limit
        } else {
            metadata.lock().hard_limit().saturating_mul(2)
        };

        #[cfg(feature = "stats")]
        self.stats.record_resize_request();
        let outcome = self.coordinator.request_resize(&metadata, new_limit);
        state.next_resize = outcome.next_allowed;
        debug!(
            "Cache {} resize to {} (internal: {}) accepted: {}",
            self.config.name, new_limit, internal, outcome.accepted
        );
        outcome.accepted
    }

    /// Counts one insertion and, at every sampling interval, asks for a larger
    /// table if the recent outcomes show eviction pressure.
    ///
    /// A `requested_log_size` of 0 asks for one more bit of table size, that
    /// is, twice the slots. Returns whether a migration was accepted. Nothing
    /// is requested once shutdown has begun.
    pub fn request_migrate(&self, requested_log_size: u32) -> bool {
        self.issue_migrate(requested_log_size, false)
    }

    fn issue_migrate(&self, requested_log_size: u32, admitted: bool) -> bool {
        let insertions = self.insertions.fetch_add(1, Ordering::Relaxed).wrapping_add(1);
        if insertions & self.config.migrate_check_mask != 0 {
            return false;
        }

        if !self.under_eviction_pressure(&self.sampler.frequencies()) {
            return false;
        }

        let Some(mut state) = self.state.lock_with_tries(self.config.internal_lock_tries) else {
            trace!("Cache {} skipped migrate: state lock busy", self.config.name);
            return false;
        };
        if !admitted && !Self::operational(&state) {
            return false;
        }
        let Some(metadata) = state.metadata.clone() else {
            return false;
        };
        if Instant::now() < state.next_migrate {
            trace!("Cache {} skipped migrate: cooling down", self.config.name);
            return false;
        }

        let new_log_size = {
            let meta = metadata.lock();
            if meta.is_set(Flag::Migrating) {
                return false;
            }
            if requested_log_size > 0 {
                requested_log_size
            } else {
                meta.log_size() + 1
            }
        };

        #[cfg(feature = "stats")]
        self.stats.record_migrate_request();
        let outcome = self.coordinator.request_migrate(&metadata, new_log_size);
        state.next_migrate = outcome.next_allowed;
        if outcome.accepted {
            self.sampler.clear();
        }
        debug!(
            "Cache {} migrate to log size {} accepted: {}",
            self.config.name, new_log_size, outcome.accepted
        );
        outcome.accepted
    }

    /// Evictions alone, or evictions and exactly one other outcome with
    /// evictions ahead by more than `eviction_ratio` times. A sample led by
    /// anything but evictions never counts as pressure, whatever the ratio.
    fn under_eviction_pressure(&self, frequencies: &[(Outcome, u64)]) -> bool {
        match frequencies {
            [(Outcome::Eviction, _)] => true,
            [(Outcome::Eviction, top), (_, second)] => {
                *top > second.saturating_mul(self.config.eviction_ratio)
            }
            _ => false,
        }
    }

    /// Adds an outcome to the sample driving the migrate heuristic.
    #[inline]
    pub fn record_stat(&self, outcome: Outcome) {
        self.sampler.record(outcome);
    }

    /// Breakdown of the recent outcomes, most frequent first.
    pub fn outcome_frequencies(&self) -> Vec<(Outcome, u64)> {
        self.sampler.frequencies()
    }

    fn reclaim(metadata: &Metadata, size: usize) -> bool {
        let mut state = metadata.lock();
        state.adjust_usage_if_allowed(-(size as i64));
        state.soft_limit() >= state.usage()
    }

    /// Gives `size` bytes back to the usage budget.
    ///
    /// Returns whether usage is now at or under the soft limit.
    pub fn reclaim_memory(&self, size: usize) -> bool {
        match self.metadata() {
            Some(metadata) => Self::reclaim(&metadata, size),
            None => true,
        }
    }

    /// `true` if the cache is operational and no resize is in flight.
    pub fn can_resize(&self) -> bool {
        let state = self.state.lock();
        match &state.metadata {
            Some(metadata) if Self::operational(&state) => !metadata.lock().is_set(Flag::Resizing),
            _ => false,
        }
    }

    /// `true` if the cache is operational and no migration is in flight.
    pub fn can_migrate(&self) -> bool {
        let state = self.state.lock();
        match &state.metadata {
            Some(metadata) if Self::operational(&state) => {
                !metadata.lock().is_set(Flag::Migrating)
            }
            _ => false,
        }
    }

    /// Looks up `key`.
    ///
    /// Returns an empty handle once shutdown has begun.
    pub fn find(&self, key: &T::Key) -> Handle<T::Value> {
        let Some((_operation, _)) = self.start_operation() else {
            return Handle::empty();
        };

        let handle = self.table.find(key);
        if handle.found() {
            self.sampler.record(Outcome::Hit);
            #[cfg(feature = "stats")]
            self.stats.record_hit();
        } else {
            self.sampler.record(Outcome::Miss);
            #[cfg(feature = "stats")]
            self.stats.record_miss();
        }
        handle
    }

    /// Unlinks and frees the entry stored under `key`.
    pub fn remove(&self, key: &T::Key) -> bool {
        let Some((_operation, metadata)) = self.start_operation() else {
            return false;
        };

        match self.table.remove(key) {
            Some(value) => {
                let size = retire(value);
                Self::reclaim(&metadata, size);
                true
            }
            None => false,
        }
    }

    /// Signals that the cache is going away without waiting for anything.
    ///
    /// New operations are rejected from now on.
    pub fn begin_shutdown(&self) {
        let mut state = self.state.lock();
        if !state.is_set(Flag::Shutdown) && !state.is_set(Flag::ShuttingDown) {
            state.toggle_flag(Flag::ShuttingDown);
        }
    }

    /// Shuts the cache down.
    ///
    /// Rejects new operations, waits for those in flight, unlinks every entry
    /// and unregisters from the coordinator. Entries still leased are freed by
    /// their last handle. Idempotent: every caller returns only once the
    /// teardown has completed.
    pub fn shutdown(&self) {
        let mut state = self.state.lock();
        if state.is_set(Flag::Shutdown) {
            drop(state);
            self.teardown.wait();
            return;
        }
        if !state.is_set(Flag::ShuttingDown) {
            state.toggle_flag(Flag::ShuttingDown);
        }

        while self.open_operations.load(Ordering::Acquire) > 0 {
            drop(state);
            thread::sleep(self.config.drain_poll);
            state = self.state.lock();
        }
        // A concurrent shutdown may have taken over while we were waiting
        if state.is_set(Flag::Shutdown) {
            drop(state);
            self.teardown.wait();
            return;
        }

        state.clear();
        state.set_flag(Flag::Shutdown);
        let metadata = state.metadata.take();
        drop(state);

        let freed = self.table.clear_tables();
        if let Some(metadata) = metadata {
            self.coordinator.unregister(&metadata);
        }
        #[cfg(feature = "stats")]
        stats_registry::unregister(&self.config.name, &self.stats);
        self.teardown.finish();
        info!("Cache {} shut down, released {} entries", self.config.name, freed);
    }
}

impl<T> Cache<T>
where
    T: CacheTable,
    T::Value: MemoryEstimator,
{
    /// Stores `value` under `key`.
    ///
    /// Evicts entries while the value does not fit under the soft limit. If
    /// nothing is left to evict, or the value is larger than the whole soft
    /// limit, requests a larger budget from the coordinator (subject to the
    /// adaptive cooldown) and returns `false`. A value larger than the soft
    /// limit evicts nothing. Every insert counts towards the migrate
    /// heuristic.
    pub fn insert(&self, key: T::Key, value: T::Value) -> bool {
        let Some((_operation, metadata)) = self.start_operation() else {
            return false;
        };

        let value = Arc::new(CachedValue::new(value));
        let size = value.size() as i64;
        let mut evicted = false;
        let oversized = size as u64 > metadata.lock().soft_limit();
        let fits = !oversized
            && loop {
                if metadata.lock().adjust_usage_if_allowed(size) {
                    break true;
                }
                match self.table.evict_candidate() {
                    Some(victim) => {
                        let reclaimed = retire(victim);
                        Self::reclaim(&metadata, reclaimed);
                        evicted = true;
                        #[cfg(feature = "stats")]
                        self.stats.record_eviction();
                    }
                    None => break false,
                }
            };

        self.record_stat(if evicted {
            Outcome::Eviction
        } else {
            Outcome::NoEviction
        });

        if !fits {
            self.issue_resize(0, true, true);
            self.issue_migrate(0, true);
            return false;
        }

        if let Some(displaced) = self.table.insert(key, value) {
            let reclaimed = retire(displaced);
            Self::reclaim(&metadata, reclaimed);
        }
        #[cfg(feature = "stats")]
        self.stats.record_insert();

        self.issue_migrate(0, true);
        true
    }
}

impl<T: CacheTable> Drop for Cache<T> {
    fn drop(&mut self) {
        self.shutdown();
    }
}
