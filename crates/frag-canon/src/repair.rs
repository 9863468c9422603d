//! Static repair
//!
//! Forward scan tracking which slots are bound, and whether to `null`.
//! Splitting and dead-def elimination can leave reads without a producer;
//! this pass makes every read well defined again:
//!
//! - a step passing an unbound or `null` value for a non-nullable primitive
//!   operand cannot run and is dropped, leaving `null` in a target that held
//!   a value;
//! - any other unbound read gets an explicit `null` assignment right before it.

use crate::error::CanonError;
use crate::pass::{is_malformed, Pass};
use frag_ir::{OpId, Operation, Reference, Step, TypeKind, TypeModel};
use std::collections::HashMap;

/// Makes every read well defined
#[derive(Debug, Clone, Copy, Default)]
pub struct StaticRepair;

impl StaticRepair {
    /// Create pass
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

/// Binding state of a slot: `true` when bound to `null`
type Bound = HashMap<Reference, bool>;

impl Pass for StaticRepair {
    fn name(&self) -> &'static str {
        "static-repair"
    }

    fn apply(&self, steps: Vec<Step>, model: &TypeModel) -> Result<Vec<Step>, CanonError> {
        let mut next_id = steps.iter().map(|s| s.id.0).max().map_or(0, |m| m.saturating_add(1));
        let mut bound = Bound::new();
        let mut out = Vec::with_capacity(steps.len());

        for step in steps {
            if matches!(step.op, Operation::Reset) {
                bound.clear();
                out.push(step);
                continue;
            }
            if is_malformed(&step, model) {
                if let Some(t) = step.op.target() {
                    bound.insert(t, false);
                }
                out.push(step);
                continue;
            }

            let uses = step.op.uses();
            let starved = uses.iter().any(|r| {
                model.kind_of(r.ty) == TypeKind::Primitive && bound.get(r).copied().unwrap_or(true)
            });
            if starved {
                tracing::trace!(op = %step.id, "dropped: primitive operand has no value");
                // The call never runs, so its target ends up null.
                if let Some(t) = step.op.target() {
                    if bound.get(&t) == Some(&false) {
                        out.push(Step::new(
                            step.id,
                            Operation::AssignConstant {
                                target: t,
                                value: None,
                            },
                        ));
                        bound.insert(t, true);
                    }
                }
                continue;
            }

            for r in uses {
                if bound.contains_key(&r) {
                    continue;
                }
                let id = OpId(next_id);
                next_id = next_id.saturating_add(1);
                out.push(Step::new(
                    id,
                    Operation::AssignConstant {
                        target: r,
                        value: None,
                    },
                ));
                bound.insert(r, true);
            }

            if let Some(t) = step.op.target() {
                bound.insert(t, is_null_assignment(&step.op));
            }
            out.push(step);
        }
        Ok(out)
    }
}

fn is_null_assignment(op: &Operation) -> bool {
    matches!(
        op,
        Operation::AssignConstant { value: None, .. } | Operation::AssignPrimitive { value: None, .. }
    )
}
