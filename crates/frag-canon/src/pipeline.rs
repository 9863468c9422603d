//! Canonicalization pipeline
//!
//! Runs the five passes in order and repeats whole rounds until a round
//! changes nothing. The result is the cache key of the fragment.

use crate::dead_def::DeadDefElimination;
use crate::error::CanonError;
use crate::order::CanonicalOrder;
use crate::pass::Pass;
use crate::renumber::FirstUseRenumbering;
use crate::repair::StaticRepair;
use crate::ssa::SingleAssignment;
use frag_ir::{CanonicalFragment, Fragment, Step, TypeModel};
use std::sync::Arc;

/// Default bound on pipeline rounds
pub const DEFAULT_MAX_ROUNDS: usize = 8;

/// Outcome of one canonicalization
#[derive(Debug, Clone)]
pub struct CanonicalReport {
    /// The canonical fragment
    pub fragment: CanonicalFragment,
    /// Rounds run, including the one that confirmed the fixed point
    pub rounds: usize,
    /// `false` if the round limit was reached first
    pub converged: bool,
}

/// Ordered canonicalization passes
#[derive(Debug)]
pub struct Pipeline {
    passes: Vec<Box<dyn Pass>>,
    max_rounds: usize,
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl Pipeline {
    /// The standard five-pass pipeline
    #[must_use]
    pub fn new() -> Self {
        Self::with_passes(vec![
            Box::new(DeadDefElimination::new()),
            Box::new(StaticRepair::new()),
            Box::new(SingleAssignment::new()),
            Box::new(CanonicalOrder::new()),
            Box::new(FirstUseRenumbering::new()),
        ])
    }

    /// Custom pass list
    #[must_use]
    pub fn with_passes(passes: Vec<Box<dyn Pass>>) -> Self {
        Self {
            passes,
            max_rounds: DEFAULT_MAX_ROUNDS,
        }
    }

    /// Bound the number of rounds (at least one round always runs)
    #[inline]
    #[must_use]
    pub fn with_max_rounds(mut self, rounds: usize) -> Self {
        self.max_rounds = rounds.max(1);
        self
    }

    /// Configured round bound
    #[inline]
    #[must_use]
    pub fn max_rounds(&self) -> usize {
        self.max_rounds
    }

    /// Pass names in execution order
    pub fn pass_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.passes.iter().map(|p| p.name())
    }

    /// Canonicalize a fragment
    ///
    /// # Errors
    /// [`CanonError`] if a pass finds an invariant violated
    pub fn canonicalize(&self, fragment: &Fragment) -> Result<CanonicalFragment, CanonError> {
        self.canonicalize_detailed(fragment).map(|r| r.fragment)
    }

    /// Canonicalize a fragment, reporting how many rounds it took
    ///
    /// # Errors
    /// [`CanonError`] if a pass finds an invariant violated
    pub fn canonicalize_detailed(&self, fragment: &Fragment) -> Result<CanonicalReport, CanonError> {
        let model = fragment.model();
        for step in fragment.steps() {
            if let Some(reason) = step.op.malformation(model) {
                tracing::warn!(op = %step.id, %reason, "malformed step passed through");
            }
        }

        let mut current = fragment.steps().to_vec();
        let mut rounds = 0;
        let mut converged = false;
        while rounds < self.max_rounds {
            rounds += 1;
            let next = self.round(current.clone(), model)?;
            if next == current {
                converged = true;
                break;
            }
            current = next;
        }
        if !converged {
            tracing::warn!(
                rounds,
                steps = current.len(),
                "canonicalization stopped at the round limit"
            );
        }
        tracing::debug!(
            input = fragment.len(),
            output = current.len(),
            rounds,
            "canonicalized fragment"
        );

        Ok(CanonicalReport {
            fragment: CanonicalFragment::from_canonical(Arc::clone(model), current),
            rounds,
            converged,
        })
    }

    fn round(&self, mut steps: Vec<Step>, model: &TypeModel) -> Result<Vec<Step>, CanonError> {
        for pass in &self.passes {
            steps = pass.apply(steps, model)?;
            tracing::trace!(pass = pass.name(), steps = steps.len(), "pass applied");
        }
        Ok(steps)
    }
}
