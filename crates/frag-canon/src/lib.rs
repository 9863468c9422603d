//! Fragment canonicalization
//!
//! Maps every fragment to a normal form so that fragments differing only in
//! dead code, slot numbering or the order of independent steps share one
//! cache key.
//!
//! # Passes
//!
//! | Pass | Effect |
//! |------|--------|
//! | [`DeadDefElimination`] | drops definitions nothing reads |
//! | [`StaticRepair`] | makes every read well defined |
//! | [`SingleAssignment`] | one slot per definition |
//! | [`CanonicalOrder`] | least linear extension of the dependency order |
//! | [`FirstUseRenumbering`] | slots numbered by first read, ids by position |
//!
//! [`Pipeline`] runs them in that order until nothing changes.
//!
//! # Example
//!
//! ```rust,ignore
//! let pipeline = Pipeline::new();
//! let key = pipeline.canonicalize(&fragment)?;
//! assert_eq!(key, pipeline.canonicalize(&key.to_fragment())?);
//! ```

#![warn(unreachable_pub)]

mod dead_def;
mod error;
mod order;
mod pass;
mod pipeline;
mod renumber;
mod repair;
mod ssa;

pub use dead_def::DeadDefElimination;
pub use error::CanonError;
pub use order::{independent, CanonicalOrder, SortKey};
pub use pass::Pass;
pub use pipeline::{CanonicalReport, Pipeline, DEFAULT_MAX_ROUNDS};
pub use renumber::FirstUseRenumbering;
pub use repair::StaticRepair;
pub use ssa::SingleAssignment;

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
