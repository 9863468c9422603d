//! Dead definition elimination
//!
//! Backward liveness scan. An assignment nobody reads is dropped unless it
//! assigns the subject type; a call whose result nobody reads keeps running
//! with its result binding stripped, and is dropped only when it has no
//! effect worth observing (pure, not on the subject, no recorded failure).

use crate::error::CanonError;
use crate::pass::{is_malformed, Pass};
use frag_ir::{Operation, Reference, Step, TypeModel};
use std::collections::HashSet;

/// Drops unread definitions
#[derive(Debug, Clone, Copy, Default)]
pub struct DeadDefElimination;

impl DeadDefElimination {
    /// Create pass
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Pass for DeadDefElimination {
    fn name(&self) -> &'static str {
        "dead-def-elimination"
    }

    fn apply(&self, steps: Vec<Step>, model: &TypeModel) -> Result<Vec<Step>, CanonError> {
        let subject = model.subject();
        let mut live: HashSet<Reference> = HashSet::new();
        let mut kept = Vec::with_capacity(steps.len());

        for mut step in steps.into_iter().rev() {
            if matches!(step.op, Operation::Reset) {
                live.clear();
                kept.push(step);
                continue;
            }
            if is_malformed(&step, model) {
                live.extend(step.op.uses());
                kept.push(step);
                continue;
            }

            let dead = step.op.target().map_or(true, |t| !live.contains(&t));
            if dead {
                let droppable = if step.op.is_call() {
                    step.op.is_pure(model)
                        && !step.op.touches_subject(model)
                        && step.failure.is_none()
                } else {
                    step.op.target().is_some_and(|t| t.ty != subject) && step.failure.is_none()
                };
                if droppable {
                    continue;
                }
                step.op.strip_target();
            }

            if let Some(t) = step.op.target() {
                live.remove(&t);
            }
            live.extend(step.op.uses());
            kept.push(step);
        }

        kept.reverse();
        Ok(kept)
    }
}
