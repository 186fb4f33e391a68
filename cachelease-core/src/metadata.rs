use parking_lot::{Mutex, MutexGuard};
use std::fmt;

use crate::Flag;

/// Identifier assigned to a cache by its coordinator at registration.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheId(pub u64);

impl fmt::Display for CacheId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cache#{}", self.0)
    }
}

/// Coordinator-owned accounting record of one cache.
///
/// Guarded by its own lock, independent of the cache's state lock, so that
/// the coordinator can inspect and update many caches without going through
/// their state locks.
#[derive(Debug)]
pub struct Metadata {
    id: CacheId,
    state: Mutex<MetadataState>,
}

impl Metadata {
    pub fn new(id: CacheId, limit: u64, log_size: u32) -> Self {
        Self {
            id,
            state: Mutex::new(MetadataState {
                soft_limit: limit,
                hard_limit: limit,
                usage: 0,
                log_size,
                flags: 0,
            }),
        }
    }

    #[inline]
    pub fn id(&self) -> CacheId {
        self.id
    }

    /// Acquires the metadata lock.
    #[inline]
    pub fn lock(&self) -> MutexGuard<'_, MetadataState> {
        self.state.lock()
    }
}

/// Limits, usage and table size of a cache, as seen by its coordinator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataState {
    soft_limit: u64,
    hard_limit: u64,
    usage: u64,
    log_size: u32,
    flags: u32,
}

impl MetadataState {
    #[inline]
    pub fn soft_limit(&self) -> u64 {
        self.soft_limit
    }

    #[inline]
    pub fn hard_limit(&self) -> u64 {
        self.hard_limit
    }

    #[inline]
    pub fn usage(&self) -> u64 {
        self.usage
    }

    /// Base-2 logarithm of the table's slot count.
    #[inline]
    pub fn log_size(&self) -> u32 {
        self.log_size
    }

    #[inline]
    pub fn is_set(&self, flag: Flag) -> bool {
        self.flags & flag.bit() != 0
    }

    #[inline]
    pub fn toggle_flag(&mut self, flag: Flag) {
        self.flags ^= flag.bit();
    }

    /// Sets both limits at once.
    pub fn set_limits(&mut self, soft_limit: u64, hard_limit: u64) {
        self.soft_limit = soft_limit;
        self.hard_limit = hard_limit;
    }

    pub fn set_log_size(&mut self, log_size: u32) {
        self.log_size = log_size;
    }

    /// Applies a usage delta if allowed.
    ///
    /// Releasing memory (negative delta) always succeeds. Growing usage
    /// succeeds only if the result stays within the soft limit.
    pub fn adjust_usage_if_allowed(&mut self, delta: i64) -> bool {
        if delta < 0 {
            self.usage = self.usage.saturating_sub(delta.unsigned_abs());
            return true;
        }

        match self.usage.checked_add(delta as u64) {
            Some(new_usage) if new_usage <= self.soft_limit => {
                self.usage = new_usage;
                true
            }
            _ => false,
        }
    }
}
