use thiserror::Error;

/// Failures reported by a [`Coordinator`](crate::Coordinator).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoordinatorError {
    #[error("Out of memory: requested {requested} bytes, {available} available")]
    OutOfMemory { requested: u64, available: u64 },
}

/// Invalid [`CacheConfig`](crate::CacheConfig) or
/// [`BudgetConfig`](crate::BudgetConfig) parameters.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Sampler capacity must be non-zero")]
    ZeroSamplerCapacity,

    #[error("Eviction ratio must be non-zero")]
    ZeroEvictionRatio,

    #[error("Migrate check mask must be of the form 2^k - 1, got {0:#x}")]
    InvalidCheckMask(u64),

    #[error("Log size {log_size} exceeds the maximum of {max}")]
    LogSizeTooLarge { log_size: u32, max: u32 },
}
