//! Fragment coalescing core
//!
//! Sits between a search-based test generator and its evaluator. Every
//! candidate test is split into independent fragments, each fragment is
//! canonicalized, and each distinct canonical fragment is evaluated at most
//! once no matter how many tests contain it or how many callers ask at the
//! same time.
//!
//! # Example
//!
//! ```rust,ignore
//! use frag_core::{AuxData, Coalescer, CoalescerConfig};
//!
//! # async fn example(evaluator: impl frag_core::Evaluator, test: frag_ir::Test) -> Result<(), Box<dyn std::error::Error>> {
//! let coalescer = Coalescer::new(evaluator, CoalescerConfig::new().with_observer_merging(true))?;
//!
//! let coverage = coalescer.evaluate(&test, AuxData::new(0))?.wait().await?;
//! println!("{coverage}");
//!
//! coalescer.age_cache();
//! println!("{}", coalescer.diagnostics());
//! # Ok(())
//! # }
//! ```

#![warn(unreachable_pub)]

pub mod coalescer;
pub mod config;
pub mod coverage;
pub mod diagnostics;
pub mod error;
pub mod evaluator;

pub use coalescer::{Coalescer, EvaluationHandle};
pub use config::CoalescerConfig;
pub use coverage::{CoverageKind, CoverageResult};
pub use diagnostics::{Diagnostics, StageTiming};
pub use error::{CoalesceError, ConfigError};
pub use evaluator::{AuxData, EvaluationFailure, Evaluator, FailureKind};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for working with the coalescer
    pub use crate::{
        AuxData, Coalescer, CoalescerConfig, CoverageKind, CoverageResult, EvaluationFailure,
        Evaluator,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
