//! Error types for canonicalization
//!
//! Malformed operations never fail the pipeline; they are passed through.
//! What remains are invariant violations between passes.

use frag_ir::{OpId, Reference};

/// Invariant violated inside the pipeline
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CanonError {
    /// A slot is read with no producer even after static repair
    #[error("{reference} is read by {op} before any producer")]
    UseBeforeDef {
        /// Reading step
        op: OpId,
        /// Unbound slot
        reference: Reference,
    },

    /// A pass produced more steps than an operation id can number
    #[error("fragment of {0} steps cannot be numbered")]
    TooManySteps(usize),
}
