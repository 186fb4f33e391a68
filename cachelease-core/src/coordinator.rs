use dashmap::DashMap;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

use crate::{BudgetConfig, CacheId, ConfigError, CoordinatorError, Flag, Metadata};

/// Answer to a resize or migrate request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RequestOutcome {
    /// Whether the coordinator carried out the request.
    pub accepted: bool,
    /// Earliest time the cache may issue its next adaptive request of the
    /// same kind. Returned for rejected requests too.
    pub next_allowed: Instant,
}

impl RequestOutcome {
    pub fn accepted(next_allowed: Instant) -> Self {
        Self {
            accepted: true,
            next_allowed,
        }
    }

    pub fn rejected(next_allowed: Instant) -> Self {
        Self {
            accepted: false,
            next_allowed,
        }
    }
}

/// Arbitrates memory between many caches.
///
/// A cache registers once at construction and unregisters exactly once when
/// its shutdown has drained. Resize and migrate requests are synchronous and
/// must terminate; callers never hold the metadata lock while calling in.
pub trait Coordinator: Send + Sync {
    /// Registers a cache and hands back its accounting record.
    fn register(&self, name: &str, requested_limit: u64)
        -> Result<Arc<Metadata>, CoordinatorError>;

    /// Forgets a cache and reclaims its budget.
    fn unregister(&self, metadata: &Arc<Metadata>);

    /// Asks for the cache's hard limit to become `new_limit`.
    fn request_resize(&self, metadata: &Arc<Metadata>, new_limit: u64) -> RequestOutcome;

    /// Asks for the cache's table to be rehashed to `2^new_log_size` slots.
    fn request_migrate(&self, metadata: &Arc<Metadata>, new_log_size: u32) -> RequestOutcome;
}

static GLOBAL_COORDINATOR: Lazy<Arc<BudgetCoordinator>> =
    Lazy::new(|| Arc::new(BudgetCoordinator::with_config(BudgetConfig::default())));

/// A coordinator sharing one fixed byte budget between its caches.
///
/// Limits are granted first come, first served. Resizes are applied in place
/// while the cache's `Resizing` flag is set, and migrations only record the
/// new table size; the cache's table picks it up on its own schedule.
///
/// # Examples
///
/// ```
/// use cachelease_core::{BudgetConfig, BudgetCoordinator, Coordinator};
///
/// let coordinator = BudgetCoordinator::new(BudgetConfig::new(1 << 20)).unwrap();
/// let metadata = coordinator.register("users", 4096).unwrap();
/// assert_eq!(coordinator.allocated(), 4096);
///
/// let outcome = coordinator.request_resize(&metadata, 8192);
/// assert!(outcome.accepted);
/// assert_eq!(metadata.lock().hard_limit(), 8192);
///
/// coordinator.unregister(&metadata);
/// assert_eq!(coordinator.allocated(), 0);
/// ```
#[derive(Debug)]
pub struct BudgetCoordinator {
    config: BudgetConfig,
    caches: DashMap<CacheId, Arc<Metadata>>,
    allocated: Mutex<u64>,
    next_id: AtomicU64,
}

impl BudgetCoordinator {
    /// Creates a coordinator after checking `config`.
    pub fn new(config: BudgetConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::with_config(config))
    }

    fn with_config(config: BudgetConfig) -> Self {
        Self {
            config,
            caches: DashMap::new(),
            allocated: Mutex::new(0),
            next_id: AtomicU64::new(1),
        }
    }

    /// Process-wide coordinator with the default budget.
    pub fn global() -> Arc<BudgetCoordinator> {
        Arc::clone(&GLOBAL_COORDINATOR)
    }

    pub fn budget(&self) -> u64 {
        self.config.budget
    }

    /// Bytes currently granted to registered caches.
    pub fn allocated(&self) -> u64 {
        *self.allocated.lock()
    }

    pub fn cache_count(&self) -> usize {
        self.caches.len()
    }

    pub fn is_registered(&self, id: CacheId) -> bool {
        self.caches.contains_key(&id)
    }

    fn try_begin(&self, metadata: &Metadata, flag: Flag) -> bool {
        if !self.is_registered(metadata.id()) {
            return false;
        }
        let mut state = metadata.lock();
        if state.is_set(flag) {
            return false;
        }
        state.toggle_flag(flag);
        true
    }

    fn finish(&self, metadata: &Metadata, flag: Flag) {
        metadata.lock().toggle_flag(flag);
    }

    fn apply_resize(&self, metadata: &Metadata, new_limit: u64) -> bool {
        let target = new_limit.max(self.config.min_limit);
        let mut allocated = self.allocated.lock();
        let mut state = metadata.lock();
        let current = state.hard_limit();

        if target >= current {
            let growth = target - current;
            if growth > self.config.budget.saturating_sub(*allocated) {
                return false;
            }
            *allocated += growth;
        } else {
            if state.usage() > target {
                return false;
            }
            *allocated -= current - target;
        }
        state.set_limits(target, target);
        true
    }
}

impl Coordinator for BudgetCoordinator {
    fn register(
        &self,
        name: &str,
        requested_limit: u64,
    ) -> Result<Arc<Metadata>, CoordinatorError> {
        let limit = requested_limit.max(self.config.min_limit);
        let mut allocated = self.allocated.lock();
        let available = self.config.budget.saturating_sub(*allocated);
        if limit > available {
            return Err(CoordinatorError::OutOfMemory {
                requested: limit,
                available,
            });
        }
        *allocated += limit;

        let id = CacheId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let metadata = Arc::new(Metadata::new(id, limit, self.config.initial_log_size));
        self.caches.insert(id, Arc::clone(&metadata));
        debug!("Registered {} ({}) with limit {}", id, name, limit);
        Ok(metadata)
    }

    fn unregister(&self, metadata: &Arc<Metadata>) {
        if self.caches.remove(&metadata.id()).is_none() {
            debug!("Ignoring unregister of unknown {}", metadata.id());
            return;
        }
        let hard_limit = metadata.lock().hard_limit();
        let mut allocated = self.allocated.lock();
        *allocated = allocated.saturating_sub(hard_limit);
        debug!("Unregistered {}, released {} bytes", metadata.id(), hard_limit);
    }

    fn request_resize(&self, metadata: &Arc<Metadata>, new_limit: u64) -> RequestOutcome {
        let next_allowed = Instant::now() + self.config.resize_cooldown;
        if !self.try_begin(metadata, Flag::Resizing) {
            return RequestOutcome::rejected(next_allowed);
        }

        let accepted = self.apply_resize(metadata, new_limit);
        self.finish(metadata, Flag::Resizing);
        debug!(
            "Resize of {} to {} {}",
            metadata.id(),
            new_limit,
            if accepted { "accepted" } else { "rejected" }
        );

        if accepted {
            RequestOutcome::accepted(next_allowed)
        } else {
            RequestOutcome::rejected(next_allowed)
        }
    }

    fn request_migrate(&self, metadata: &Arc<Metadata>, new_log_size: u32) -> RequestOutcome {
        let next_allowed = Instant::now() + self.config.migrate_cooldown;
        if new_log_size > self.config.max_log_size {
            debug!(
                "Migrate of {} to log size {} exceeds maximum {}",
                metadata.id(),
                new_log_size,
                self.config.max_log_size
            );
            return RequestOutcome::rejected(next_allowed);
        }
        if !self.try_begin(metadata, Flag::Migrating) {
            return RequestOutcome::rejected(next_allowed);
        }

        metadata.lock().set_log_size(new_log_size);
        self.finish(metadata, Flag::Migrating);
        debug!("Migrated {} to log size {}", metadata.id(), new_log_size);
        RequestOutcome::accepted(next_allowed)
    }
}
