//! Simulator for the fragment coalescing core
//!
//! Drives a toy generational search over the demo `Stack` model and checks
//! that coalesced evaluation reports the same coverage as verbatim
//! evaluation while submitting each distinct fragment at most once.

#![warn(unreachable_pub)]

pub mod simulator;

pub use simulator::{
    explain, run_simulator, GenerationStats, SimulatorConfig, SimulatorReport, Violation,
};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
