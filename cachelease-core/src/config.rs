use std::time::Duration;

use crate::ConfigError;

/// Default number of outcomes kept by a cache's sampler.
pub const DEFAULT_SAMPLER_CAPACITY: usize = 1024;
/// Default insertion mask: the migrate heuristic runs once every 4096 inserts.
pub const DEFAULT_MIGRATE_CHECK_MASK: u64 = 0xFFF;
/// Default dominance factor of evictions over the runner-up outcome.
pub const DEFAULT_EVICTION_RATIO: u64 = 16;
/// Default number of state lock attempts for adaptive requests.
pub const DEFAULT_INTERNAL_LOCK_TRIES: i64 = 10;

/// Per-cache configuration.
///
/// All adaptive heuristics are plain fields so that callers (and tests) can
/// tune trigger behavior without touching the algorithm.
///
/// # Examples
///
/// ```
/// use cachelease_core::CacheConfig;
///
/// let config = CacheConfig::new("sessions")
///     .with_initial_limit(4 * 1024 * 1024)
///     .with_allow_growth(false);
///
/// assert_eq!(config.name, "sessions");
/// assert_eq!(config.sampler_capacity, 1024);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CacheConfig {
    /// Name used to publish statistics.
    pub name: String,
    /// Memory limit requested from the coordinator at registration.
    pub initial_limit: u64,
    /// Whether adaptive (internal) resize requests may be issued.
    pub allow_growth: bool,
    /// Number of recent outcomes sampled for the migrate heuristic.
    pub sampler_capacity: usize,
    /// The migrate heuristic runs when `insertions & mask == 0`.
    pub migrate_check_mask: u64,
    /// Evictions must outnumber the runner-up outcome by more than this factor.
    pub eviction_ratio: u64,
    /// State lock attempts for adaptive resize and migrate requests.
    pub internal_lock_tries: i64,
    /// Pause between checks while shutdown drains open operations.
    pub drain_poll: Duration,
    /// Pause between checks while waiting for an in-flight resize.
    pub resize_poll: Duration,
}

impl CacheConfig {
    /// Default configuration under the given name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_initial_limit(mut self, limit: u64) -> Self {
        self.initial_limit = limit;
        self
    }

    pub fn with_allow_growth(mut self, allow_growth: bool) -> Self {
        self.allow_growth = allow_growth;
        self
    }

    pub fn with_sampler_capacity(mut self, capacity: usize) -> Self {
        self.sampler_capacity = capacity;
        self
    }

    pub fn with_migrate_check_mask(mut self, mask: u64) -> Self {
        self.migrate_check_mask = mask;
        self
    }

    pub fn with_eviction_ratio(mut self, ratio: u64) -> Self {
        self.eviction_ratio = ratio;
        self
    }

    pub fn with_internal_lock_tries(mut self, tries: i64) -> Self {
        self.internal_lock_tries = tries;
        self
    }

    pub fn with_drain_poll(mut self, poll: Duration) -> Self {
        self.drain_poll = poll;
        self
    }

    pub fn with_resize_poll(mut self, poll: Duration) -> Self {
        self.resize_poll = poll;
        self
    }

    /// Checks the heuristic parameters.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sampler_capacity == 0 {
            return Err(ConfigError::ZeroSamplerCapacity);
        }
        if self.eviction_ratio == 0 {
            return Err(ConfigError::ZeroEvictionRatio);
        }
        if self.migrate_check_mask & self.migrate_check_mask.wrapping_add(1) != 0 {
            return Err(ConfigError::InvalidCheckMask(self.migrate_check_mask));
        }
        Ok(())
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            name: String::from("cache"),
            initial_limit: 16 * 1024,
            allow_growth: true,
            sampler_capacity: DEFAULT_SAMPLER_CAPACITY,
            migrate_check_mask: DEFAULT_MIGRATE_CHECK_MASK,
            eviction_ratio: DEFAULT_EVICTION_RATIO,
            internal_lock_tries: DEFAULT_INTERNAL_LOCK_TRIES,
            drain_poll: Duration::from_micros(10),
            resize_poll: Duration::from_micros(1),
        }
    }
}

/// Configuration of a [`BudgetCoordinator`](crate::BudgetCoordinator).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BudgetConfig {
    /// Total bytes shared by all registered caches.
    pub budget: u64,
    /// Smallest limit a cache can be resized to.
    pub min_limit: u64,
    /// Table log-size assigned at registration.
    pub initial_log_size: u32,
    /// Largest table log-size a migrate may reach.
    pub max_log_size: u32,
    /// Cooldown handed back after every resize request.
    pub resize_cooldown: Duration,
    /// Cooldown handed back after every migrate request.
    pub migrate_cooldown: Duration,
}

impl BudgetConfig {
    pub fn new(budget: u64) -> Self {
        Self {
            budget,
            ..Self::default()
        }
    }

    pub fn with_min_limit(mut self, min_limit: u64) -> Self {
        self.min_limit = min_limit;
        self
    }

    pub fn with_log_sizes(mut self, initial: u32, max: u32) -> Self {
        self.initial_log_size = initial;
        self.max_log_size = max;
        self
    }

    pub fn with_cooldowns(mut self, resize: Duration, migrate: Duration) -> Self {
        self.resize_cooldown = resize;
        self.migrate_cooldown = migrate;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.initial_log_size > self.max_log_size {
            return Err(ConfigError::LogSizeTooLarge {
                log_size: self.initial_log_size,
                max: self.max_log_size,
            });
        }
        Ok(())
    }
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            budget: 256 * 1024 * 1024,
            min_limit: 1024,
            initial_log_size: 8,
            max_log_size: 32,
            resize_cooldown: Duration::from_millis(50),
            migrate_cooldown: Duration::from_millis(50),
        }
    }
}
