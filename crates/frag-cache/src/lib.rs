//! Fragment cache
//!
//! A bounded map from canonical fragments to their evaluation results,
//! evicting by decaying score rather than recency.
//!
//! # Example
//!
//! ```rust
//! use frag_cache::{CacheConfig, FragmentCache};
//!
//! let mut cache = FragmentCache::new(CacheConfig::new().with_capacity(2))?;
//! cache.put("a", 1);
//! assert_eq!(cache.get(&"a"), Some(&1));
//! # Ok::<(), frag_cache::CacheConfigError>(())
//! ```

#![warn(unreachable_pub)]

mod cache;
mod error;

pub use cache::{CacheConfig, CacheStats, FragmentCache};
pub use error::CacheConfigError;

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
