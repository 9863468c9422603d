//! Slot renumbering by first use
//!
//! Within each type, slots are numbered in the order they are first read;
//! slots that are only ever written follow, in order of definition. Step
//! ids become positions.

use crate::error::CanonError;
use crate::pass::Pass;
use frag_ir::{OpId, Reference, Step, TypeIdx, TypeModel};
use std::collections::HashMap;

/// Renumbers slots and step ids
#[derive(Debug, Clone, Copy, Default)]
pub struct FirstUseRenumbering;

impl FirstUseRenumbering {
    /// Create pass
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[derive(Default)]
struct Numbering {
    next: HashMap<TypeIdx, u32>,
    assigned: HashMap<Reference, Reference>,
}

impl Numbering {
    fn visit(&mut self, r: Reference) {
        if self.assigned.contains_key(&r) {
            return;
        }
        let counter = self.next.entry(r.ty).or_insert(0);
        self.assigned.insert(r, r.with_slot(*counter));
        *counter += 1;
    }

    fn get(&self, r: Reference) -> Reference {
        self.assigned.get(&r).copied().unwrap_or(r)
    }
}

impl Pass for FirstUseRenumbering {
    fn name(&self) -> &'static str {
        "first-use-renumbering"
    }

    fn apply(&self, mut steps: Vec<Step>, _model: &TypeModel) -> Result<Vec<Step>, CanonError> {
        let mut numbering = Numbering::default();
        for step in &steps {
            for r in step.op.uses() {
                numbering.visit(r);
            }
        }
        for step in &steps {
            if let Some(t) = step.op.target() {
                numbering.visit(t);
            }
        }

        for (position, step) in steps.iter_mut().enumerate() {
            step.op.map_uses(|r| numbering.get(r));
            step.op.map_target(|t| numbering.get(t));
            step.id = OpId(u32::try_from(position).map_err(|_| CanonError::TooManySteps(position))?);
        }
        Ok(steps)
    }
}
