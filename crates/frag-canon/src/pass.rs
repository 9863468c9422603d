//! Pass trait
//!
//! Provides the [`Pass`] trait implemented by every canonicalization stage.

use crate::error::CanonError;
use frag_ir::{Step, TypeModel};

/// One canonicalization stage
///
/// Implementations must be idempotent and total: a step the model does not
/// describe is passed through unchanged.
pub trait Pass: Send + Sync + std::fmt::Debug {
    /// Stage name (for logs)
    fn name(&self) -> &'static str;

    /// Rewrite `steps`
    ///
    /// # Errors
    /// [`CanonError`] when an invariant established by an earlier stage
    /// does not hold
    fn apply(&self, steps: Vec<Step>, model: &TypeModel) -> Result<Vec<Step>, CanonError>;
}

/// Step the model cannot describe
#[inline]
pub(crate) fn is_malformed(step: &Step, model: &TypeModel) -> bool {
    step.op.malformation(model).is_some()
}
