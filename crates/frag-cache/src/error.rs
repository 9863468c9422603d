//! Error types for cache configuration

/// Rejected [`crate::CacheConfig`]
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CacheConfigError {
    /// Capacity must hold at least one entry
    #[error("cache capacity must be at least 1")]
    ZeroCapacity,

    /// New entries would be evictable immediately
    #[error("initial score must be at least 1")]
    ZeroInitialScore,

    /// A sweep must be allowed to evict something
    #[error("sweep batch must be at least 1")]
    ZeroSweepBatch,
}
