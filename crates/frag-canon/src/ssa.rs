//! Single-assignment renumbering
//!
//! Every target gets a fresh slot of its type, so each slot is assigned
//! exactly once and slot reuse stops constraining the order of unrelated
//! steps. Counters keep running across `Reset`, bindings do not.

use crate::error::CanonError;
use crate::pass::{is_malformed, Pass};
use frag_ir::{Operation, Reference, Step, TypeIdx, TypeModel};
use std::collections::HashMap;

/// Gives every definition its own slot
#[derive(Debug, Clone, Copy, Default)]
pub struct SingleAssignment;

impl SingleAssignment {
    /// Create pass
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Pass for SingleAssignment {
    fn name(&self) -> &'static str {
        "single-assignment"
    }

    fn apply(&self, steps: Vec<Step>, model: &TypeModel) -> Result<Vec<Step>, CanonError> {
        let mut next: HashMap<TypeIdx, u32> = HashMap::new();
        let mut current: HashMap<Reference, Reference> = HashMap::new();
        let mut out = Vec::with_capacity(steps.len());

        for mut step in steps {
            if matches!(step.op, Operation::Reset) {
                current.clear();
                out.push(step);
                continue;
            }

            let malformed = is_malformed(&step, model);
            let mut unbound = None;
            step.op.map_uses(|r| match current.get(&r) {
                Some(&renamed) => renamed,
                None => {
                    unbound.get_or_insert(r);
                    r
                }
            });
            if let Some(reference) = unbound {
                if !malformed {
                    tracing::error!(op = %step.id, %reference, "read without producer after repair");
                    return Err(CanonError::UseBeforeDef {
                        op: step.id,
                        reference,
                    });
                }
            }

            step.op.map_target(|t| {
                let counter = next.entry(t.ty).or_insert(0);
                let fresh = t.with_slot(*counter);
                *counter += 1;
                current.insert(t, fresh);
                fresh
            });
            out.push(step);
        }
        Ok(out)
    }
}
