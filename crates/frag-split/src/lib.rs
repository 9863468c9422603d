//! Fragment splitting
//!
//! Decomposes a candidate [`frag_ir::Test`] into the independent fragments
//! whose union reproduces its coverage-relevant effect.
//!
//! # Core Concepts
//!
//! - [`DependencyTracker`]: per-slot live sets and candidate flushing
//! - [`ObserverIndex`]: aliasing of repeated read-only calls
//! - [`Splitter`]: the driver walking a test once, in order
//!
//! A `Reset` is a hard barrier: no fragment spans it.

#![warn(unreachable_pub)]

mod observer;
mod splitter;
mod tracker;

pub use observer::{ObserverIndex, ObserverKey};
pub use splitter::{SplitOptions, SplitReport, Splitter};
pub use tracker::{DependencyTracker, LiveSet};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
